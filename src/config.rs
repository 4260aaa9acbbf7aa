use anyhow::{Context, Result};
use std::{env, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Local API server configuration
    pub ui: UiConfig,

    /// OpenLogger device configuration
    pub device: DeviceConfig,
}

#[derive(Clone, Debug)]
pub struct UiConfig {
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct DeviceConfig {
    /// Base url the device accepts JSON commands on
    pub url: String,

    /// Whether the device is reached through a network bridge, i.e. wifi
    /// reconfiguration does not drop the connection to this service
    pub bridge: bool,

    pub request_timeout: Duration,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// Returns a reference to the cached configuration. On first call, it loads
    /// and validates all configuration from environment variables. Subsequent
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. This is intentional as the
    /// application cannot function without valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    fn load_internal() -> Result<Self> {
        let ui = UiConfig::load()?;
        let device = DeviceConfig::load()?;

        Ok(Self { ui, device })
    }
}

impl UiConfig {
    fn load() -> Result<Self> {
        let port = env::var("UI_PORT")
            .unwrap_or_else(|_| "1977".to_string())
            .parse::<u16>()
            .context("failed to parse UI_PORT: invalid format")?;

        Ok(Self { port })
    }
}

impl DeviceConfig {
    fn load() -> Result<Self> {
        let url = env::var("OPENLOGGER_URL").unwrap_or_else(|_| "http://192.168.1.1".to_string());

        check_device_url(&url).context("failed to parse OPENLOGGER_URL")?;

        let bridge = parse_flag(
            &env::var("OPENLOGGER_BRIDGE").unwrap_or_else(|_| "false".to_string()),
        )
        .context("failed to parse OPENLOGGER_BRIDGE: expected true or false")?;

        let request_timeout = env::var("OPENLOGGER_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("failed to parse OPENLOGGER_REQUEST_TIMEOUT_SECS: invalid format")?;

        Ok(Self {
            url,
            bridge,
            request_timeout,
        })
    }
}

fn check_device_url(url: &str) -> Result<()> {
    anyhow::ensure!(
        url.starts_with("http://") || url.starts_with("https://"),
        "expected http(s) url but got {url}"
    );
    Ok(())
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("unexpected flag value: {other}"),
    }
}
