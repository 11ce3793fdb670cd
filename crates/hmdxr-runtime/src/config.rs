use std::path::PathBuf;
use std::time::Duration;

/// Overrides the directory the runtime loads its assets from.
pub const INSTALL_DIR_ENV: &str = "HMDXR_INSTALL_DIR";

/// Static runtime configuration, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory holding `guardian.png`.
    pub install_dir: PathBuf,
    /// How long session teardown waits for the mirror window to report ready.
    pub mirror_ready_timeout: Duration,
    /// Cap on the spaces one session may hold, counting origin and view.
    pub max_spaces: Option<usize>,
}

impl RuntimeConfig {
    pub const DEFAULT_MIRROR_READY_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            mirror_ready_timeout: Self::DEFAULT_MIRROR_READY_TIMEOUT,
            max_spaces: None,
        }
    }

    /// `HMDXR_INSTALL_DIR`, else the directory of the running executable.
    pub fn from_env() -> Self {
        let install_dir = std::env::var_os(INSTALL_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(PathBuf::from))
            })
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(install_dir)
    }

    pub fn with_mirror_ready_timeout(mut self, timeout: Duration) -> Self {
        self.mirror_ready_timeout = timeout;
        self
    }

    pub fn with_max_spaces(mut self, limit: usize) -> Self {
        self.max_spaces = Some(limit);
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_install_dir() {
        let config = RuntimeConfig::new("/opt/hmdxr")
            .with_mirror_ready_timeout(Duration::from_millis(250));
        assert_eq!(config.install_dir, PathBuf::from("/opt/hmdxr"));
        assert_eq!(config.mirror_ready_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_default_timeout() {
        let config = RuntimeConfig::new(".");
        assert_eq!(
            config.mirror_ready_timeout,
            RuntimeConfig::DEFAULT_MIRROR_READY_TIMEOUT
        );
    }
}
