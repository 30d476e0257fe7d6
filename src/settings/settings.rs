use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub auth: Auth,
    pub refresh: Refresh,
    pub store: Store,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    /// TLS is served in-process only when both paths are set.
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Deserialize)]
pub struct Auth {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub signing_key: String,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

#[derive(Deserialize)]
pub struct Refresh {
    pub ttl_secs: u64,
    pub digest_key: String,
    pub reuse_policy: String, // "revoke_user", "revoke_family" or "reject_only"
    pub channel: String,      // "cookie", "header" or "body"
    pub cookie_name: String,
    pub cookie_path: String,
    pub cookie_secure: bool,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "redis"
    pub redis_url: Option<String>,
    pub prefix: String,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub backend: String, // "memory" or "mysql"
    pub mysql_url: Option<String>,
}

// Keys stay out of logs.
impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("argon2_memory_kib", &self.argon2_memory_kib)
            .field("argon2_iterations", &self.argon2_iterations)
            .field("argon2_parallelism", &self.argon2_parallelism)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Refresh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refresh")
            .field("ttl_secs", &self.ttl_secs)
            .field("reuse_policy", &self.reuse_policy)
            .field("channel", &self.channel)
            .field("cookie_name", &self.cookie_name)
            .field("cookie_path", &self.cookie_path)
            .field("cookie_secure", &self.cookie_secure)
            .finish_non_exhaustive()
    }
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// Loads the TOML file, then applies `GATEHOUSE__<SECTION>__<KEY>`
/// environment overrides.
pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix("GATEHOUSE").separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_settings_load() {
        let settings = parse_settings(Some("settings/dev.toml")).unwrap();
        assert_eq!(settings.store.backend, "memory");
        assert_eq!(settings.user.backend, "memory");
        assert_eq!(settings.refresh.channel, "cookie");
        assert_eq!(settings.auth.access_ttl_secs, 15 * 60);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(parse_settings(Some("settings/does-not-exist.toml")).is_err());
    }

    #[test]
    fn debug_output_hides_keys() {
        let settings = parse_settings(Some("settings/dev.toml")).unwrap();
        let printed = format!("{:?}", settings);
        assert!(!printed.contains(&settings.auth.signing_key));
        assert!(!printed.contains(&settings.refresh.digest_key));
    }
}
