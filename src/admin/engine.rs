//! Database engine access.
//!
//! [`DatabaseEngine`] is the seam between the gateway and the cluster the
//! broker provisions databases on. [`MongoEngine`] is the production
//! implementation on top of the official MongoDB driver.

use super::EngineError;
use async_trait::async_trait;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;
use tracing::debug;

/// Collection written to when materializing a new database.
pub const SENTINEL_COLLECTION: &str = "foobar";

/// Operations the broker needs from the database engine.
///
/// Implementations must not apply their own timeouts; the gateway bounds
/// every call.
#[async_trait]
pub trait DatabaseEngine: Send + Sync {
    async fn list_database_names(&self) -> Result<Vec<String>, EngineError>;

    /// Force the database into existence.
    ///
    /// MongoDB allocates databases lazily, so an implementation has to write
    /// at least one document before the database shows up in listings.
    async fn materialize_database(&self, name: &str) -> Result<(), EngineError>;

    /// Drop the database. Dropping a missing database is not an error.
    async fn drop_database(&self, name: &str) -> Result<(), EngineError>;

    /// Release connections. Called once at broker shutdown.
    async fn shutdown(&self) {}
}

/// MongoDB driver backed engine.
///
/// The driver's `Client` is internally pooled and cheap to clone; one
/// instance is created at startup and shared for the process lifetime.
#[derive(Clone)]
pub struct MongoEngine {
    client: Client,
}

impl MongoEngine {
    /// Build a client for `endpoint`.
    ///
    /// Resolves SRV records for `mongodb+srv` URIs but does not open a
    /// connection yet; the first operation does.
    pub async fn connect(endpoint: &str) -> Result<Self, EngineError> {
        let mut options = ClientOptions::parse(endpoint).await?;
        options.app_name = Some("atlas-broker".to_string());
        let client = Client::with_options(options)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DatabaseEngine for MongoEngine {
    async fn list_database_names(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.client.list_database_names().await?)
    }

    async fn materialize_database(&self, name: &str) -> Result<(), EngineError> {
        let collection = self
            .client
            .database(name)
            .collection::<Document>(SENTINEL_COLLECTION);
        collection.insert_one(doc! { "foo": "bar" }).await?;
        debug!("Materialized database {}", name);
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), EngineError> {
        self.client.database(name).drop().await?;
        Ok(())
    }

    async fn shutdown(&self) {
        self.client.clone().shutdown().await;
    }
}
