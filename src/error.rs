use std::path::PathBuf;
use thiserror::Error;

use crate::data::StoreError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error("required configuration value '{0}' is missing")]
    Missing(&'static str),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unable to configure CORS: {0}")]
    Cors(#[from] rocket_cors::Error),
    #[error("unable to configure mail transport: {0}")]
    Mail(#[from] crate::mail::MailError),
    #[error("unable to configure payment gateway: {0}")]
    Gateway(#[from] crate::payment::GatewayError),
}
