//! Configuration management

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sip: SipConfig,
    pub stun: StunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    /// Address placed in Via, Contact and SDP
    pub local_ip: String,
    pub local_port: u16,
    /// "UDP" or "TCP"
    pub transport: String,
    pub user_id: String,
    pub domain: String,
    pub user_agent: String,
    /// Answer `Supported: 100rel` INVITEs with reliable provisional responses
    pub use_100rel: bool,
}

/// Long-term credential used to sign STUN messages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StunConfig {
    pub username: String,
    pub realm: String,
    pub password: String,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            local_ip: "127.0.0.1".to_string(),
            local_port: 5060,
            transport: "UDP".to_string(),
            user_id: "1000".to_string(),
            domain: "localhost".to_string(),
            user_agent: format!("sipua/{}", env!("CARGO_PKG_VERSION")),
            use_100rel: false,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then `SIPUA__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SIPUA").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
