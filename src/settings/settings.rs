use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub http: Http,
    pub log: Log,
    pub token: Token,
    pub lock: Lock,
    pub store: Store,
    pub service: Service,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub tls: Option<Tls>,
}

#[derive(Debug, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Deserialize)]
pub struct Token {
    pub issuer: String,
    pub audience: String,
    pub algorithm: String, // "HS256", "HS384" or "HS512"
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    /// Age below which a superseded refresh token is treated as a request race
    /// rather than reuse. No default on purpose.
    pub leeway_secs: u64,
    pub signing_key_env: String,
    pub hash_key_env: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Lock {
    pub backend: String, // "local" or "redis"
    pub lease_ttl_ms: u64,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory", "redis" or "mysql"
    pub redis_dsn: Option<String>,
    pub mysql_dsn: Option<String>,
    pub prefix: String,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Service {
    pub key_env: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

/// Key material. Never part of the settings file; see [`Secrets::from_env`].
pub struct Secrets {
    pub signing_key: Vec<u8>,
    pub hash_key: Vec<u8>,
    pub service_key: String,
}

impl Secrets {
    /// Reads every secret from the environment variables named in `settings`.
    /// The hash key falls back to the signing key when not configured.
    pub fn from_env(settings: &Settings) -> Result<Self> {
        let signing_key = read_secret(&settings.token.signing_key_env)?;
        let hash_key = match settings.token.hash_key_env.as_deref() {
            Some(var) if std::env::var_os(var).is_some() => read_secret(var)?,
            _ => signing_key.clone(),
        };
        let service_key = String::from_utf8(read_secret(&settings.service.key_env)?)
            .map_err(|e| anyhow!(e))?;

        Ok(Secrets {
            signing_key,
            hash_key,
            service_key,
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secrets { .. }")
    }
}

fn read_secret(var: &str) -> Result<Vec<u8>> {
    let value =
        std::env::var(var).map_err(|_| anyhow!("environment variable {} is not set", var))?;
    if value.is_empty() {
        return Err(anyhow!("environment variable {} is empty", var));
    }
    Ok(value.into_bytes())
}
