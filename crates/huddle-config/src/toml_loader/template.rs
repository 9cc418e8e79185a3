//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# huddle configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[room]
# max_participants = 8   # 2-32, local participant included

[audio]
# input_device = "default"   # rewritten after a successful acquisition
# output_device = "default"
# mic_gain = 1.0         # 0.0-1.0
# master_volume = 1.0    # 0.0-1.0
# start_muted = false

[detector]
# interval_ms = 100      # 16-1000, minimum time between sampling ticks
# on_rms = 0.04          # amplitude needed to start speaking
# off_rms = 0.02         # amplitude needed to keep speaking
# on_peak = 0.35         # peak bin magnitude needed to start speaking
# off_peak = 0.2         # peak bin magnitude needed to keep speaking

[relay]
# url = "wss://relay.huddle.chat/socket/websocket"
# heartbeat_interval = 25    # 5-120 seconds
# reconnect_delay = 1
# max_reconnect_delay = 30

[logging]
# level = "info"         # trace, debug, info, warn, error
"##
    .to_string()
}
