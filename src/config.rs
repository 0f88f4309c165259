use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|it| !it.trim().is_empty())
}

fn default_mongodb_uri() -> String {
    env_or("MONGODB_URI", "mongodb://localhost:27017")
}

fn default_mongodb_db() -> String {
    env_or("MONGODB_DB_NAME", "eduDb")
}

fn default_storage() -> StorageBackend {
    match env::var("STORAGE").as_deref() {
        Ok("memory") => StorageBackend::Memory,
        _ => StorageBackend::Mongo,
    }
}

fn default_jwt_secret() -> String {
    env_or("SECRET_KEY", "")
}

fn default_token_ttl_minutes() -> i64 {
    env::var("TOKEN_TTL_MINUTES")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(120)
}

fn default_admin_emails() -> Vec<String> {
    env::var("ADMIN_EMAILS")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|it| !it.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn default_server_url() -> String {
    env_or("SERVER_URL", "http://localhost:8000")
}

fn default_client_url() -> String {
    env_or("CLIENT_URL", "http://localhost:5173")
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default = "PaymentConfig::default_stripe_secret_key", skip_serializing)]
    pub stripe_secret_key: Option<String>,
    #[serde(default = "PaymentConfig::default_card_currency")]
    pub card_currency: String,

    #[serde(default = "PaymentConfig::default_store_id")]
    pub store_id: Option<String>,
    #[serde(default = "PaymentConfig::default_store_password", skip_serializing)]
    pub store_password: Option<String>,
    #[serde(default = "PaymentConfig::default_checkout_url")]
    pub checkout_url: String,
    #[serde(default = "PaymentConfig::default_checkout_currency")]
    pub checkout_currency: String,
}

impl PaymentConfig {
    fn default_stripe_secret_key() -> Option<String> {
        env_opt("STRIPE_SECRET_KEY")
    }
    fn default_card_currency() -> String {
        env_or("CARD_CURRENCY", "usd")
    }
    fn default_store_id() -> Option<String> {
        env_opt("STORE_ID")
    }
    fn default_store_password() -> Option<String> {
        env_opt("STORE_PASSWORD")
    }
    fn default_checkout_url() -> String {
        env_or("SSLCOMMERZ_URL", "https://sandbox.sslcommerz.com")
    }
    fn default_checkout_currency() -> String {
        env_or("CHECKOUT_CURRENCY", "BDT")
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        PaymentConfig {
            stripe_secret_key: Self::default_stripe_secret_key(),
            card_currency: Self::default_card_currency(),
            store_id: Self::default_store_id(),
            store_password: Self::default_store_password(),
            checkout_url: Self::default_checkout_url(),
            checkout_currency: Self::default_checkout_currency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "MailConfig::default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "MailConfig::default_username")]
    pub username: Option<String>,
    #[serde(default = "MailConfig::default_password", skip_serializing)]
    pub password: Option<String>,
    #[serde(default = "MailConfig::default_from")]
    pub from: Option<String>,
}

impl MailConfig {
    fn default_smtp_host() -> String {
        env_or("SMTP_HOST", "smtp.gmail.com")
    }
    fn default_username() -> Option<String> {
        env_opt("EMAIL_USER")
    }
    fn default_password() -> Option<String> {
        env_opt("EMAIL_PASS")
    }
    fn default_from() -> Option<String> {
        env_opt("EMAIL_FROM")
    }

    /// SMTP is only used when both credentials are present.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            smtp_host: Self::default_smtp_host(),
            username: Self::default_username(),
            password: Self::default_password(),
            from: Self::default_from(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    #[serde(default = "default_storage")]
    pub storage: StorageBackend,

    #[serde(default = "default_jwt_secret", skip_serializing)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,

    #[serde(default = "default_admin_emails")]
    pub admin_emails: Vec<String>,

    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_client_url")]
    pub client_url: String,

    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            storage: default_storage(),
            jwt_secret: default_jwt_secret(),
            token_ttl_minutes: default_token_ttl_minutes(),
            admin_emails: default_admin_emails(),
            server_url: default_server_url(),
            client_url: default_client_url(),
            payment: PaymentConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigurationError::Missing("SECRET_KEY"));
        }
        if self.token_ttl_minutes <= 0 {
            return Err(ConfigurationError::Missing("TOKEN_TTL_MINUTES"));
        }
        Ok(())
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|it| it.eq_ignore_ascii_case(email))
    }
}
