use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub storage: Storage,
    pub http: Http,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub access_audience: String,
    pub refresh_audience: String,
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: u64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: u64,
    #[serde(default)]
    pub rotate_refresh: bool,
    /// Name of the environment variable holding the access-token key.
    pub access_key_env: String,
    /// Name of the environment variable holding the refresh-token key.
    pub refresh_key_env: String,
}

fn default_access_ttl_secs() -> u64 {
    30 * 60
}

fn default_refresh_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Deserialize)]
pub struct Storage {
    pub backend: String, // "memory" or "mysql"
    #[serde(default)]
    pub mysql_dsn: Option<String>,
    #[serde(default)]
    pub redis_dsn: Option<String>,
    #[serde(default = "default_credential_prefix")]
    pub credential_prefix: String,
}

fn default_credential_prefix() -> String {
    "marquee".to_string()
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Loads the settings file, then applies `MARQUEE__SECTION__KEY` overrides.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("MARQUEE").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_file_gets_default_ttls() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[auth]
issuer = "marquee.test"
access_audience = "marquee-access"
refresh_audience = "marquee-refresh"
access_key_env = "TEST_ACCESS_KEY"
refresh_key_env = "TEST_REFRESH_KEY"

[storage]
backend = "memory"

[http]
address = "127.0.0.1:0"

[log]
filter = "debug"
"#
        )
        .unwrap();

        let settings = parse_settings(file.path().to_str()).unwrap();
        assert_eq!(settings.auth.access_ttl_secs, 30 * 60);
        assert_eq!(settings.auth.refresh_ttl_secs, 24 * 60 * 60);
        assert!(!settings.auth.rotate_refresh);
        assert_eq!(settings.storage.credential_prefix, "marquee");
        assert!(settings.http.cert_path.is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("settings/does-not-exist.toml")).is_err());
    }
}
