//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# Parley Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[connection]
# endpoint = "wss://assistant.example.dev"   # or set PARLEY_ENDPOINT
# socket_path = "/socket.io/"
# connect_timeout_secs = 10
# request_timeout_secs = 120
# poll_interval_ms = 50        # 10-100
# reconnection_attempts = 3    # 1-10
# reconnection_delay_ms = 500

[context]
# budget = 12000               # bytes of serialized history per question
# include_open_files = false

[followups]
# enabled = true
# code_languages = ["rust", "python"]
# companion_apps = []
# probe_timeout_secs = 15

[logging]
# level = "info"               # debug, info, warning, error
"##
    .to_string()
}
