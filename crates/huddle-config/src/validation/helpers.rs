//! Shared range-validation helpers used by the section validators.

/// Push an error if `value` is outside `[min, max]` (integer).
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if `value` is outside `[min, max]` (float).
pub(crate) fn validate_range_f64(
    errors: &mut Vec<String>,
    name: &str,
    value: f64,
    min: f64,
    max: f64,
) {
    if !(min..=max).contains(&value) {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error unless `upper` is strictly greater than `lower`.
pub(crate) fn validate_ordered(
    errors: &mut Vec<String>,
    upper_name: &str,
    upper: f64,
    lower_name: &str,
    lower: f64,
) {
    if upper <= lower {
        errors.push(format!(
            "{upper_name} = {upper} must be greater than {lower_name} = {lower}"
        ));
    }
}
