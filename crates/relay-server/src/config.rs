use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk configuration, overridden field-by-field by whatever CLI flags
/// the operator passes explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_ssh_addr")]
    pub ssh_addr: String,
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_db")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_ssh_addr() -> String {
    "0.0.0.0:2222".to_string()
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_identity_db() -> PathBuf {
    PathBuf::from("./identities.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssh_addr: default_ssh_addr(),
            http_addr: default_http_addr(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            db_path: default_identity_db(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load `path` if given, falling back to built-in defaults otherwise.
    /// Unlike the identity store or host key, a missing config file is not
    /// an error; it simply means "use defaults, let the CLI flags win".
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject configurations that would leave the server unreachable.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.network.ssh_addr.parse::<std::net::SocketAddr>()?;
        self.network.http_addr.parse::<std::net::SocketAddr>()?;
        if self.network.ssh_addr == self.network.http_addr {
            anyhow::bail!("ssh_addr and http_addr must not be the same");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn same_addr_for_both_listeners_is_rejected() {
        let mut config = Config::default();
        config.network.http_addr = config.network.ssh_addr.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let reloaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(config.network.ssh_addr, reloaded.network.ssh_addr);
    }
}
