//! Opaque media handles.
//!
//! The coordination layer never looks inside a stream or track; it only
//! passes them between the connection primitive and the audio backend.
//! Backends downcast the payload back to their own type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

macro_rules! media_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name {
            id: String,
            inner: Arc<dyn Any + Send + Sync>,
        }

        impl $name {
            pub fn new(id: impl Into<String>, inner: impl Any + Send + Sync) -> Self {
                Self {
                    id: id.into(),
                    inner: Arc::new(inner),
                }
            }

            pub fn id(&self) -> &str {
                &self.id
            }

            pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
                self.inner.downcast_ref::<T>()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).field("id", &self.id).finish()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }
    };
}

media_handle!(
    /// Remote media delivered by a peer connection.
    MediaStream
);

media_handle!(
    /// Outbound audio track fed by the local capture.
    LocalTrack
);

/// One snapshot of an analysis tap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFrame {
    /// Time-domain samples in [-1, 1].
    pub time_domain: Vec<f32>,
    /// Frequency-bin magnitudes normalised to [0, 1].
    pub frequency: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_recovers_payload() {
        let stream = MediaStream::new("s-1", 42u32);
        assert_eq!(stream.id(), "s-1");
        assert_eq!(stream.downcast_ref::<u32>(), Some(&42));
        assert!(stream.downcast_ref::<String>().is_none());
    }

    #[test]
    fn handles_compare_by_id() {
        let a = LocalTrack::new("t", 1u8);
        let b = LocalTrack::new("t", 2u8);
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), "LocalTrack { id: \"t\" }");
    }
}
