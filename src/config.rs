use anyhow::{Context, Result};
use std::{env, path::PathBuf, time::Duration};

pub const APP_NAME: &str = "Fast_Pratilogin";
pub const KEYRING_SERVICE_NAME: &str = "FastPratilogin_UNIPI";
pub const CONFIG_FILE_NAME: &str = "config.ini";
pub const LOG_FILE_NAME: &str = "autologin.log";

/// Application configuration loaded and validated at startup
///
/// Built once in `main` and handed to the components that need it.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Location of the settings file, log file and other state
    pub paths: PathConfig,

    /// Per-phase network timeouts
    pub timeouts: Timeouts,

    /// Forced login retry policy
    pub force: ForcePolicy,

    /// Service name of the keyring entries
    pub keyring_service: String,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Connectivity probe request
    pub probe: Duration,
    /// GET of the portal login page
    pub reach: Duration,
    /// POST to the portal auth api
    pub auth: Duration,
    /// Pause between a successful auth and the confirming probe
    pub settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(5),
            reach: Duration::from_millis(700),
            auth: Duration::from_millis(1500),
            settle: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForcePolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ForcePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    /// * `config_dir` - Explicit config directory, takes precedence over
    ///   `PRATILOGIN_CONFIG_DIR` and the platform default
    pub fn load(config_dir: Option<PathBuf>) -> Result<Self> {
        let paths = PathConfig::load(config_dir)?;
        let timeouts = Timeouts::load()?;
        let force = ForcePolicy::load()?;
        let keyring_service = env::var("PRATILOGIN_KEYRING_SERVICE")
            .unwrap_or_else(|_| KEYRING_SERVICE_NAME.to_string());

        Ok(Self {
            paths,
            timeouts,
            force,
            keyring_service,
        })
    }
}

impl PathConfig {
    fn load(config_dir: Option<PathBuf>) -> Result<Self> {
        let config_dir = match config_dir
            .or_else(|| env::var_os("PRATILOGIN_CONFIG_DIR").map(PathBuf::from))
        {
            Some(dir) => dir,
            None => Self::default_config_dir()?,
        };

        std::fs::create_dir_all(&config_dir)
            .context(format!("failed to create config directory: {config_dir:?}"))?;

        Ok(Self::in_dir(config_dir))
    }

    pub fn in_dir(config_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join(CONFIG_FILE_NAME),
            log_file: config_dir.join(LOG_FILE_NAME),
            config_dir,
        }
    }

    fn default_config_dir() -> Result<PathBuf> {
        let base = env::var_os("APPDATA")
            .or_else(|| env::var_os("XDG_CONFIG_HOME"))
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .context("failed to determine config directory: HOME is not set")?;

        Ok(base.join(APP_NAME))
    }
}

impl Timeouts {
    fn load() -> Result<Self> {
        let default = Self::default();

        Ok(Self {
            probe: millis_from_env("PRATILOGIN_PROBE_TIMEOUT_MS", default.probe)?,
            reach: millis_from_env("PRATILOGIN_REACH_TIMEOUT_MS", default.reach)?,
            auth: millis_from_env("PRATILOGIN_AUTH_TIMEOUT_MS", default.auth)?,
            settle: millis_from_env("PRATILOGIN_SETTLE_DELAY_MS", default.settle)?,
        })
    }
}

impl ForcePolicy {
    fn load() -> Result<Self> {
        let default = Self::default();

        let max_attempts = match env::var("PRATILOGIN_FORCE_ATTEMPTS") {
            Ok(value) => parse_attempts(&value)
                .context("failed to parse PRATILOGIN_FORCE_ATTEMPTS: invalid format")?,
            Err(_) => default.max_attempts,
        };

        Ok(Self {
            max_attempts,
            delay: millis_from_env("PRATILOGIN_FORCE_DELAY_MS", default.delay)?,
        })
    }
}

fn parse_attempts(value: &str) -> Result<u32> {
    let attempts = value.trim().parse::<u32>()?;
    anyhow::ensure!(attempts > 0, "attempts must be at least 1");
    Ok(attempts)
}

fn parse_millis(value: &str) -> Result<Duration> {
    Ok(Duration::from_millis(value.trim().parse::<u64>()?))
}

fn millis_from_env(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(value) => parse_millis(&value).context(format!("failed to parse {key}: invalid format")),
        Err(_) => Ok(default),
    }
}
