//! Client configuration
//!
//! Parses the login client's settings from YAML with serde_yaml. Missing
//! optional fields fall back to the `default_*` functions below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::codec::MAX_PAYLOAD;

/// Version block sent with an MD5 login (0x17/0x02).
///
/// The server uses these to decide which features and memory-hash requests
/// the session gets, so they should describe a real client build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default = "default_client_string")]
    pub client_string: String,

    #[serde(default = "default_major2")]
    pub major2: u16,

    #[serde(default = "default_major")]
    pub major: u16,

    #[serde(default = "default_minor")]
    pub minor: u16,

    #[serde(default)]
    pub minor2: u16,

    #[serde(default = "default_build")]
    pub build: u16,

    /// TLV 0x0014. Sent only when set; WinAIM 5.1 uses 0xd2.
    #[serde(default)]
    pub distribution: Option<u32>,

    #[serde(default = "default_country")]
    pub country: String,

    #[serde(default = "default_lang")]
    pub lang: String,

    /// TLV 0x004a. Sent only when set.
    #[serde(default)]
    pub unknown4a: Option<u8>,
}

impl Default for ClientInfo {
    /// WinAIM 5.1.3036
    fn default() -> Self {
        Self {
            client_string: default_client_string(),
            major2: default_major2(),
            major: default_major(),
            minor: default_minor(),
            minor2: 0,
            build: default_build(),
            distribution: None,
            country: default_country(),
            lang: default_lang(),
            unknown4a: None,
        }
    }
}

/// Login client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    // ============================================
    // Authorizer
    // ============================================
    #[serde(default = "default_auth_host")]
    pub auth_host: String,

    #[serde(default = "default_auth_port")]
    pub auth_port: u16,

    // ============================================
    // Account
    // ============================================
    pub screen_name: String,

    pub password: String,

    #[serde(default)]
    pub client_info: ClientInfo,

    // ============================================
    // Connection tuning
    // ============================================
    /// Largest FLAP payload this client will send
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,

    /// Seconds between keepalive frames; 0 disables them
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Seconds to wait for the next frame before giving up
    #[serde(default = "default_frame_timeout_secs")]
    pub frame_timeout_secs: u64,
}

// ============================================
// Default value functions
// ============================================

fn default_client_string() -> String {
    "AOL Instant Messenger, version 5.1.3036/WIN32".to_string()
}

fn default_major2() -> u16 {
    0x0109
}

fn default_major() -> u16 {
    0x0005
}

fn default_minor() -> u16 {
    0x0001
}

fn default_build() -> u16 {
    0x0bdc
}

fn default_country() -> String {
    "us".to_string()
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_auth_host() -> String {
    "login.oscar.aol.com".to_string()
}

fn default_auth_port() -> u16 {
    5190
}

fn default_max_payload() -> usize {
    MAX_PAYLOAD
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_frame_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    /// Load configuration from a YAML file
    ///
    /// # Example
    /// ```no_run
    /// use oscar::config::ClientConfig;
    ///
    /// let config = ClientConfig::from_file("conf/client.yaml")
    ///     .expect("Failed to load config");
    /// println!("authorizer: {}", config.auth_addr());
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML in {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML")?;

        config.validate()?;

        Ok(config)
    }

    /// `host:port` of the authorizer
    pub fn auth_addr(&self) -> String {
        format!("{}:{}", self.auth_host, self.auth_port)
    }

    /// Check required fields and protocol limits
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.auth_host.is_empty(), "auth_host cannot be empty");
        anyhow::ensure!(self.auth_port != 0, "auth_port cannot be 0");
        anyhow::ensure!(!self.screen_name.is_empty(), "screen_name cannot be empty");
        anyhow::ensure!(!self.password.is_empty(), "password cannot be empty");

        anyhow::ensure!(
            self.client_info.country.len() == 2,
            "country must be 2 characters: {:?}",
            self.client_info.country
        );
        anyhow::ensure!(
            self.client_info.lang.len() == 2,
            "lang must be 2 characters: {:?}",
            self.client_info.lang
        );

        anyhow::ensure!(
            self.max_payload <= MAX_PAYLOAD,
            "max_payload too large: {} (max {})",
            self.max_payload,
            MAX_PAYLOAD
        );

        Ok(())
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self).context("Failed to serialize config to YAML")?;

        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write config to {}", path.as_ref().display()))?;

        Ok(())
    }
}
