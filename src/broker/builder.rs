use super::{BindingLifecycleManager, InstanceLifecycleManager};
use crate::admin::{
    redact, AdminApi, AdminGateway, AtlasApiClient, DatabaseEngine, MongoEngine, RetryPolicy,
};
use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::state::{SqliteStateStore, StateStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Fully wired broker: both lifecycle managers over one store and gateway.
pub struct Broker {
    store: Arc<dyn StateStore>,
    gateway: Arc<AdminGateway>,
    instances: InstanceLifecycleManager,
    bindings: BindingLifecycleManager,
}

impl Broker {
    pub fn builder() -> BrokerBuilder {
        BrokerBuilder::new()
    }

    pub fn instances(&self) -> &InstanceLifecycleManager {
        &self.instances
    }

    pub fn bindings(&self) -> &BindingLifecycleManager {
        &self.bindings
    }

    pub fn gateway(&self) -> &Arc<AdminGateway> {
        &self.gateway
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Cancel in-flight gateway calls and close the engine client.
    pub async fn shutdown(&self) {
        self.gateway.shutdown().await;
        info!("Broker shut down");
    }
}

/// Builder for [`Broker`].
///
/// Anything not supplied explicitly is created from the config: the SQLite
/// store at `state_db`, a MongoDB client for `endpoint`, and a digest-auth
/// HTTP client for the admin API.
///
/// # Example
///
/// ```no_run
/// use atlas_broker::broker::Broker;
/// use atlas_broker::config::BrokerConfig;
///
/// # async fn example() -> Result<(), atlas_broker::Error> {
/// let broker = Broker::builder()
///     .config(BrokerConfig::from_env()?)
///     .build()
///     .await?;
/// # broker.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct BrokerBuilder {
    config: Option<BrokerConfig>,
    store: Option<Arc<dyn StateStore>>,
    engine: Option<Arc<dyn DatabaseEngine>>,
    api: Option<Arc<dyn AdminApi>>,
    retry: Option<RetryPolicy>,
    ephemeral: bool,
}

impl BrokerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration. Required.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an already initialized store instead of opening `state_db`.
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn engine(mut self, engine: Arc<dyn DatabaseEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn admin_api(mut self, api: Arc<dyn AdminApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Override the retry schedule derived from `retry_attempts`.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Keep state in memory instead of at `state_db`.
    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    pub async fn build(self) -> Result<Broker> {
        let config = self
            .config
            .ok_or_else(|| Error::Config("config is required".to_string()))?;

        let store: Arc<dyn StateStore> = match self.store {
            Some(store) => store,
            None => {
                let store = if self.ephemeral {
                    SqliteStateStore::new_ephemeral().await?
                } else {
                    SqliteStateStore::new(&config.state_db).await?
                };
                store.initialize().await?;
                debug!("Opened state store at {:?}", store.db_path());
                Arc::new(store)
            }
        };

        let engine: Arc<dyn DatabaseEngine> = match self.engine {
            Some(engine) => engine,
            None => Arc::new(MongoEngine::connect(&config.endpoint).await.map_err(
                |source| Error::DatabaseOperation {
                    operation: "connect",
                    resource: redact(&config.endpoint),
                    source,
                },
            )?),
        };

        let api: Arc<dyn AdminApi> = match self.api {
            Some(api) => api,
            None => Arc::new(
                AtlasApiClient::new(
                    config.api_user.clone(),
                    config.api_key.clone(),
                    config.request_timeout,
                )
                .map_err(|source| Error::RemoteAdmin {
                    operation: "configure client",
                    resource: config.api_base.clone(),
                    source,
                })?,
            ),
        };

        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::default().with_max_attempts(config.retry_attempts));
        let gateway = Arc::new(
            AdminGateway::new(engine, api)
                .with_timeout(config.request_timeout)
                .with_retry_policy(retry),
        );

        let instances = InstanceLifecycleManager::new(Arc::clone(&store), Arc::clone(&gateway));
        let bindings = BindingLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            config.api_target(),
            config.endpoint.clone(),
        );

        info!(
            "Broker ready (group {}, timeout {:?}, {} attempt(s))",
            config.group_id, config.request_timeout, retry.max_attempts
        );
        Ok(Broker {
            store,
            gateway,
            instances,
            bindings,
        })
    }
}
