use carrental_utils::version_info::RuntimeEnv;
use serde::Deserialize;
use std::env::vars;
use std::fmt::Display;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub enum Env {
    #[serde(rename = "local")]
    Local,
    #[serde(rename = "test")]
    Test,
    #[serde(rename = "staging")]
    Staging,
    #[serde(rename = "prod")]
    Prod,
}

impl From<&Env> for RuntimeEnv {
    fn from(env: &Env) -> Self {
        match env {
            Env::Local => RuntimeEnv::Local,
            Env::Test => RuntimeEnv::Test,
            Env::Staging => RuntimeEnv::Staging,
            Env::Prod => RuntimeEnv::Prod,
        }
    }
}

impl Display for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Env::Local => write!(f, "local"),
            Env::Test => write!(f, "test"),
            Env::Staging => write!(f, "staging"),
            Env::Prod => write!(f, "prod"),
        }
    }
}

/// Placeholder public endpoint used when `IMAGE_PUBLIC_URL` is not set.
const DEFAULT_IMAGE_PUBLIC_URL: &str = "http://localhost:8080/images";

// The final, validated configuration struct.
#[derive(Debug, Clone)]
pub struct Config {
    env: Env,
    database_url: String,
    server_addr: String,
    port: u16,
    // R2 image storage (optional outside prod/staging)
    cf_account_id: Option<String>,
    cf_access_key_id: Option<String>,
    cf_secret_access_key: Option<String>,
    cf_bucket: Option<String>,
    image_public_url: String,
    // Transactional mail API used for OTP delivery
    mail_api_url: Option<String>,
    mail_api_key: Option<String>,
    mail_from: String,
    cors_origin: Option<String>,
    // JWT secret for session tokens
    jwt_secret: String,
}

// An intermediate struct for deserializing environment variables
// where most fields are optional.
#[derive(Deserialize)]
struct RawConfig {
    env: Env,
    database_url: String,
    server_addr: Option<String>,
    port: Option<u16>,
    cf_account_id: Option<String>,
    cf_access_key_id: Option<String>,
    cf_secret_access_key: Option<String>,
    cf_bucket: Option<String>,
    image_public_url: Option<String>,
    mail_api_url: Option<String>,
    mail_api_key: Option<String>,
    mail_from: Option<String>,
    cors_origin: Option<String>,
    jwt_secret: Option<String>,
}

impl Config {
    /// Create a test configuration with default values.
    ///
    /// Available to both unit tests and integration tests. Not for production use.
    pub fn new_for_test() -> Self {
        Self {
            env: Env::Local,
            database_url: "postgres://localhost:5432/test".to_string(),
            server_addr: "127.0.0.1".to_string(),
            port: 8080,
            cf_account_id: None,
            cf_access_key_id: None,
            cf_secret_access_key: None,
            cf_bucket: None,
            image_public_url: DEFAULT_IMAGE_PUBLIC_URL.to_string(),
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "no-reply@carrental.local".to_string(),
            cors_origin: None,
            jwt_secret: "test-jwt-secret-key-for-local-development".to_string(),
        }
    }

    #[cfg(test)]
    pub fn new_for_test_with_env(env: Env) -> Self {
        Self {
            env,
            ..Self::new_for_test()
        }
    }

    pub fn environment(&self) -> &Env {
        &self.env
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn server_addr(&self) -> &str {
        &self.server_addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_local(&self) -> bool {
        matches!(self.env, Env::Local)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self.env, Env::Prod)
    }

    pub fn cf_account_id(&self) -> Option<&str> {
        self.cf_account_id.as_deref()
    }

    pub fn cf_access_key_id(&self) -> Option<&str> {
        self.cf_access_key_id.as_deref()
    }

    pub fn cf_secret_access_key(&self) -> Option<&str> {
        self.cf_secret_access_key.as_deref()
    }

    pub fn cf_bucket(&self) -> Option<&str> {
        self.cf_bucket.as_deref()
    }

    /// Base URL under which uploaded images are publicly served.
    pub fn image_public_url(&self) -> &str {
        &self.image_public_url
    }

    pub fn mail_api_url(&self) -> Option<&str> {
        self.mail_api_url.as_deref()
    }

    pub fn mail_api_key(&self) -> Option<&str> {
        self.mail_api_key.as_deref()
    }

    pub fn mail_from(&self) -> &str {
        &self.mail_from
    }

    pub fn cors_origin(&self) -> Option<&str> {
        self.cors_origin.as_deref()
    }

    /// Get the JWT secret for signing session tokens.
    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    /// Initializes configuration by reading from environment variables
    /// and applying environment-aware defaults.
    pub fn init() -> anyhow::Result<Self> {
        info!("Loading configuration from environment variables");

        let raw_config: RawConfig = serde_env::from_iter(vars())?;
        Self::from_raw(raw_config)
    }

    fn from_raw(raw_config: RawConfig) -> anyhow::Result<Self> {
        let RawConfig {
            env,
            database_url,
            server_addr,
            port,
            cf_account_id,
            cf_access_key_id,
            cf_secret_access_key,
            cf_bucket,
            image_public_url,
            mail_api_url,
            mail_api_key,
            mail_from,
            cors_origin,
            jwt_secret,
        } = raw_config;

        let server_addr = match server_addr {
            Some(addr) => {
                info!("Using provided SERVER_ADDR: {}", addr);
                addr
            }
            None => {
                let default_addr = match env {
                    Env::Local => "127.0.0.1",
                    _ => "0.0.0.0",
                };
                info!(
                    "SERVER_ADDR not set, defaulting to {} for {} environment",
                    default_addr, env
                );
                default_addr.to_string()
            }
        };

        let port = match port {
            Some(port) => port,
            None if matches!(env, Env::Local | Env::Test) => {
                info!("PORT not set, defaulting to 8080 for {} environment", env);
                8080
            }
            None => anyhow::bail!("PORT must be set for {} environment", env),
        };

        let jwt_secret = match jwt_secret {
            Some(secret) => secret,
            None if matches!(env, Env::Local | Env::Test) => {
                info!("JWT_SECRET not set, using default for {} environment", env);
                "default-jwt-secret-for-local-development-only".to_string()
            }
            None => anyhow::bail!("JWT_SECRET must be set for {} environment", env),
        };

        // R2 credentials are required once images have to survive a restart
        if !matches!(env, Env::Local | Env::Test) {
            if cf_account_id.is_none() {
                anyhow::bail!("CF_ACCOUNT_ID must be set for {} environment", env);
            }
            if cf_access_key_id.is_none() {
                anyhow::bail!("CF_ACCESS_KEY_ID must be set for {} environment", env);
            }
            if cf_secret_access_key.is_none() {
                anyhow::bail!("CF_SECRET_ACCESS_KEY must be set for {} environment", env);
            }
            if cf_bucket.is_none() {
                anyhow::bail!("CF_BUCKET must be set for {} environment", env);
            }
            if image_public_url.is_none() {
                anyhow::bail!("IMAGE_PUBLIC_URL must be set for {} environment", env);
            }
            info!("R2 storage credentials validated for {} environment", env);
        }

        if matches!(env, Env::Prod) && (mail_api_url.is_none() || mail_api_key.is_none()) {
            anyhow::bail!(
                "MAIL_API_URL and MAIL_API_KEY must be set for {} environment. \
                 Verification codes cannot be delivered otherwise.",
                env
            );
        }

        let image_public_url = image_public_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_IMAGE_PUBLIC_URL.to_string());

        let mail_from = mail_from.unwrap_or_else(|| "no-reply@carrental.local".to_string());

        Ok(Config {
            env,
            database_url,
            server_addr,
            port,
            cf_account_id,
            cf_access_key_id,
            cf_secret_access_key,
            cf_bucket,
            image_public_url,
            mail_api_url,
            mail_api_key,
            mail_from,
            cors_origin,
            jwt_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_env::from_iter;

    #[test]
    fn local_config_uses_defaults() {
        let raw: RawConfig = from_iter(vec![
            ("ENV", "local"),
            ("DATABASE_URL", "postgres://example"),
        ])
        .expect("RawConfig should deserialize");

        let config = Config::from_raw(raw).expect("local config should build");
        assert_eq!(config.server_addr(), "127.0.0.1");
        assert_eq!(config.port(), 8080);
        assert!(config.cf_account_id().is_none());
        assert_eq!(config.image_public_url(), DEFAULT_IMAGE_PUBLIC_URL);
    }

    #[test]
    fn staging_requires_port() {
        let raw: RawConfig = from_iter(vec![
            ("ENV", "staging"),
            ("DATABASE_URL", "postgres://example"),
            ("JWT_SECRET", "secret"),
        ])
        .expect("RawConfig should deserialize");

        let err = Config::from_raw(raw).unwrap_err().to_string();
        assert!(err.contains("PORT"));
    }

    #[test]
    fn r2_credentials_required_for_staging() {
        let raw: RawConfig = from_iter(vec![
            ("ENV", "staging"),
            ("DATABASE_URL", "postgres://example"),
            ("PORT", "8080"),
            ("JWT_SECRET", "test-jwt-secret"),
        ])
        .expect("RawConfig should deserialize");

        let err = Config::from_raw(raw).unwrap_err().to_string();
        assert!(err.contains("CF_ACCOUNT_ID"));
    }

    #[test]
    fn prod_requires_mail_api() {
        let raw: RawConfig = from_iter(vec![
            ("ENV", "prod"),
            ("DATABASE_URL", "postgres://example"),
            ("PORT", "8080"),
            ("JWT_SECRET", "test-jwt-secret"),
            ("CF_ACCOUNT_ID", "acct"),
            ("CF_ACCESS_KEY_ID", "key"),
            ("CF_SECRET_ACCESS_KEY", "secret"),
            ("CF_BUCKET", "bucket"),
            ("IMAGE_PUBLIC_URL", "https://img.example.com/"),
        ])
        .expect("RawConfig should deserialize");

        let err = Config::from_raw(raw).unwrap_err().to_string();
        assert!(err.contains("MAIL_API_URL"));
    }

    #[test]
    fn prod_config_builds_when_complete() {
        let raw: RawConfig = from_iter(vec![
            ("ENV", "prod"),
            ("DATABASE_URL", "postgres://example"),
            ("PORT", "9000"),
            ("JWT_SECRET", "test-jwt-secret"),
            ("CF_ACCOUNT_ID", "acct"),
            ("CF_ACCESS_KEY_ID", "key"),
            ("CF_SECRET_ACCESS_KEY", "secret"),
            ("CF_BUCKET", "bucket"),
            ("IMAGE_PUBLIC_URL", "https://img.example.com/"),
            ("MAIL_API_URL", "https://mail.example.com/send"),
            ("MAIL_API_KEY", "mail-key"),
        ])
        .expect("RawConfig should deserialize");

        let config = Config::from_raw(raw).expect("prod config should build");
        assert_eq!(config.server_addr(), "0.0.0.0");
        assert_eq!(config.port(), 9000);
        assert!(config.is_prod());
        assert_eq!(config.image_public_url(), "https://img.example.com");
        assert_eq!(config.mail_api_key(), Some("mail-key"));
    }

    #[test]
    fn env_converts_to_runtime_env() {
        assert_eq!(RuntimeEnv::from(&Env::Local), RuntimeEnv::Local);
        assert_eq!(RuntimeEnv::from(&Env::Test), RuntimeEnv::Test);
        assert_eq!(RuntimeEnv::from(&Env::Staging), RuntimeEnv::Staging);
        assert_eq!(RuntimeEnv::from(&Env::Prod), RuntimeEnv::Prod);
        assert_eq!(
            Config::new_for_test_with_env(Env::Staging)
                .environment()
                .to_string(),
            "staging"
        );
    }
}
