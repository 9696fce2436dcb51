//! configuration for the wirefire coordination server.
//!
//! loaded from a yaml file whose sections mirror the dotted option names
//! (`noise.private_key`, `server.url`, `dns.magic_dns_suffix`, ...).

use serde::{Deserialize, Serialize};

use crate::Error;

/// main configuration for wirefire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// noise identity of the coordination server.
    pub noise: NoiseConfig,

    /// http server settings.
    pub server: ServerConfig,

    /// embedded store settings.
    pub database: DatabaseConfig,

    /// relay directory settings.
    pub derp: DerpConfig,

    /// oidc provider settings.
    pub oidc: OidcConfig,

    /// magic dns settings.
    pub dns: DnsConfig,

    /// logging settings.
    pub log: LogConfig,
}

impl Config {
    /// load and validate configuration from a yaml file.
    pub fn load(path: &std::path::Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Config =
            serde_yaml::from_str(&raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// check that required options are present.
    pub fn validate(&self) -> crate::Result<()> {
        if self.noise.private_key.is_empty() {
            return Err(Error::InvalidConfig("noise.private_key is required".into()));
        }
        if self.server.url.is_empty() {
            return Err(Error::InvalidConfig("server.url is required".into()));
        }
        if self.database.url.is_empty() {
            return Err(Error::InvalidConfig("database.url is required".into()));
        }
        Ok(())
    }
}

/// noise identity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// the server's machine private key, in `privkey:<hex>` form. required.
    pub private_key: String,
}

/// http server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// base url (optionally public) on which the coordinator is reachable.
    /// used to build oidc redirect and follow-up urls. required.
    pub url: String,

    /// listen address for the http server.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            listen_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// embedded store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlite database url/path. required.
    pub url: String,
}

/// relay directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DerpConfig {
    /// urls to fetch relay maps from; merged in order, later sources win.
    pub sources: Vec<String>,
}

impl Default for DerpConfig {
    fn default() -> Self {
        Self {
            sources: vec!["https://login.tailscale.com/derpmap/default".to_string()],
        }
    }
}

/// oidc provider settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcConfig {
    /// issuer address; must serve /.well-known/openid-configuration.
    pub provider: String,

    /// oauth2 client id.
    pub client_id: String,

    /// oauth2 client secret.
    pub client_secret: String,
}

/// magic dns settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// whether magic dns is enabled.
    pub magic_dns: bool,

    /// dns suffix under which machines are named.
    pub magic_dns_suffix: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            magic_dns: true,
            magic_dns_suffix: "wirefire.net".to_string(),
        }
    }
}

/// logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// one of trace|debug|info|warn|error|fatal|panic.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.dns.magic_dns);
        assert_eq!(config.dns.magic_dns_suffix, "wirefire.net");
        assert_eq!(config.server.listen_addr, "127.0.0.1:8000");
        assert_eq!(
            config.derp.sources,
            vec!["https://login.tailscale.com/derpmap/default".to_string()]
        );
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn validate_requires_key_url_and_database() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.noise.private_key = "privkey:00".to_string();
        assert!(config.validate().is_err());

        config.server.url = "https://wirefire.example.com".to_string();
        assert!(config.validate().is_err());

        config.database.url = "wirefire.db".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_sections() {
        let yaml = r#"
noise:
  private_key: "privkey:aa"
server:
  url: "https://wirefire.example.com"
database:
  url: "/var/lib/wirefire/db.sqlite"
dns:
  magic_dns: false
log:
  level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.noise.private_key, "privkey:aa");
        assert!(!config.dns.magic_dns);
        // unset sections keep their defaults
        assert_eq!(config.dns.magic_dns_suffix, "wirefire.net");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.derp.sources.len(), 1);
    }
}
