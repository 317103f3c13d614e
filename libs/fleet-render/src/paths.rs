//! Fixed locations inside a worker container.

/// Durable data volume (trend cache, scratch frames).
pub const DATA_DIR: &str = "/app/data";

/// Generated media volume.
pub const MEDIA_DIR: &str = "/app/videos";

/// Instance-local log directory.
pub const LOGS_DIR: &str = "/app/logs";

pub const CONFIG_DIR: &str = "/app/config";
pub const CONFIG_FILE: &str = "config.json";
pub const CONFIG_PATH: &str = "/app/config/config.json";

/// Instance-local runtime directory holding the readiness marker.
pub const RUNTIME_DIR: &str = "/run/bot";
pub const READY_MARKER: &str = "/run/bot/ready";
