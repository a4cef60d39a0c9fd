//! Configuration management

use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub presence: PresenceConfig,

    #[serde(default)]
    pub zone: ZoneConfig,

    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub app: AppConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.presence.client_id.is_empty() {
            bail!("presence.client_id must not be empty");
        }
        if self.core.host.is_none() && !self.core.use_discovery {
            bail!("core.host is required unless core.use_discovery is enabled");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Discord application client id
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
        }
    }
}

fn default_client_id() -> String {
    "464873958232162353".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneConfig {
    /// Pin presence to this zone id; unset selects whichever zone plays
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    pub host: Option<String>,

    #[serde(default = "default_core_port")]
    pub port: u16,

    #[serde(default)]
    pub use_discovery: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_core_port(),
            use_discovery: false,
        }
    }
}

fn default_core_port() -> u16 {
    9100
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Exit the process after this many seconds, if set
    pub auto_shutdown_secs: Option<u64>,
}

pub fn load_config() -> Result<Config> {
    let config_dir = directories::ProjectDirs::from("com", "open-horizon-labs", "roon-discord-presence")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));

    let config = ::config::Config::builder()
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy())
                .required(false),
        )
        // Override with environment variables (RDP_CORE__HOST, RDP_ZONE__ZONE_ID, etc.)
        .add_source(
            ::config::Environment::with_prefix("RDP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
