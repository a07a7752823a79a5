use std::path::PathBuf;
use std::sync::OnceLock;

static QISU_HOME: OnceLock<PathBuf> = OnceLock::new();

/// Returns the qisu home directory (`~/.qisu/`).
/// Supports `$QISU_HOME` env override. Cached via `OnceLock`.
pub fn qisu_home() -> &'static PathBuf {
    QISU_HOME.get_or_init(|| {
        if let Ok(val) = std::env::var("QISU_HOME") {
            let p = PathBuf::from(val);
            if !p.as_os_str().is_empty() {
                return p;
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".qisu")
    })
}

/// `~/.qisu/config/`
pub fn config_dir() -> PathBuf {
    qisu_home().join("config")
}

/// `~/.qisu/logs/`
pub fn logs_dir() -> PathBuf {
    qisu_home().join("logs")
}

/// `~/.qisu/state/`, where the questionnaire flow is kept between runs.
pub fn state_dir() -> PathBuf {
    qisu_home().join("state")
}
