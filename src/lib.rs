#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;

use std::sync::Arc;

use rocket::fairing::AdHoc;
use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, StorageBackend};
use crate::data::memory::MemoryStore;
use crate::data::mongo::MongoStore;
use crate::data::Db;
use crate::error::{BackendError, ConfigurationError};
use crate::mail::Mailer;
use crate::payment::{CardGateway, CheckoutGateway, PendingCheckouts};
use crate::route::mount_api;
use crate::security::Security;

pub mod authz;
pub mod config;
pub mod data;
pub mod enrollment;
pub mod error;
pub mod mail;
pub mod middleware;
pub mod payment;
pub mod resp;
pub mod role;
pub mod route;
pub mod security;
pub mod util;

#[cfg(test)]
mod test_util;

/// Outside collaborators the server talks to.
pub struct Services {
    pub store: Db,
    pub mailer: Arc<dyn Mailer>,
    pub card: Arc<dyn CardGateway>,
    pub checkout: Arc<dyn CheckoutGateway>,
}

impl Services {
    async fn from_config(config: &Config) -> Result<Services, BackendError> {
        let store: Db = match config.storage {
            StorageBackend::Mongo => {
                tracing::info!("Connecting to MongoDB: {}", config.mongodb_uri);
                Arc::new(MongoStore::connect(&config.mongodb_uri, &config.mongodb_db).await?)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage, nothing will be persisted.");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Services {
            store,
            mailer: mail::from_config(&config.mail)?,
            card: payment::card_from_config(&config.payment)?,
            checkout: payment::checkout_from_config(&config.payment)?,
        })
    }
}

pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        let subscriber = FmtSubscriber::builder().with_max_level(l).finish();

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Unable to set global logger: {}", err);
        };
        if let Err(err) = tracing_log::LogTracer::init() {
            eprintln!("Unable to forward log records: {}", err);
        }
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            c
        }
        Err(ConfigurationError::NotFound(_)) => {
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            c
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            return Err(other.into());
        }
    };
    c.validate()?;

    let security = Security::from_config(&c)?;

    tracing::info!("Initializing services...");
    let services = Services::from_config(&c).await?;

    assemble(c, security, services)
}

/// Builds the server around already constructed services.
pub fn assemble(
    config: Config,
    security: Security,
    services: Services,
) -> Result<Rocket<Build>, BackendError> {
    tracing::info!("Starting HTTP server...");
    let mut r = rocket::build()
        .manage(config)
        .manage(security)
        .manage(services.store)
        .manage(services.mailer)
        .manage(services.card)
        .manage(services.checkout)
        .manage(PendingCheckouts::default());

    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::All,
        allowed_methods: vec![
            Method::Get,
            Method::Put,
            Method::Post,
            Method::Patch,
            Method::Delete,
        ]
        .into_iter()
        .map(From::from)
        .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    r = r.attach(cors);
    r = r.attach(AdHoc::on_shutdown("Storage shutdown", |rocket| {
        Box::pin(async move {
            if let Some(store) = rocket.state::<Db>() {
                store.disconnect().await;
            }
        })
    }));
    r = mount_api(r);

    Ok(r)
}
