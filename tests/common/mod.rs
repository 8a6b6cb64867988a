//! In-process fakes of the database engine and the Atlas admin API.
#![allow(dead_code)]

use async_trait::async_trait;
use atlas_broker::admin::{
    AdminApi, ApiTarget, DatabaseEngine, DatabaseUserPayload, EngineError, RemoteAdminError,
    RetryPolicy,
};
use atlas_broker::broker::{
    Broker, CreateServiceInstanceBindingRequest, CreateServiceInstanceRequest,
    DeleteServiceInstanceBindingRequest, DeleteServiceInstanceRequest,
};
use atlas_broker::config::BrokerConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ENDPOINT: &str =
    "mongodb://cluster0.example.net:27017,cluster1.example.net:27017/admin?ssl=true&replicaSet=rs0";

/// Engine ops, in call order, e.g. `"create:orders"`.
#[derive(Default)]
pub struct FakeEngine {
    databases: Mutex<BTreeSet<String>>,
    ops: Mutex<Vec<String>>,
    fail_create: Mutex<bool>,
    fail_drop: Mutex<bool>,
    list_delay: Option<Duration>,
}

impl FakeEngine {
    pub fn with_database(name: &str) -> Self {
        let engine = Self::default();
        engine.databases.lock().unwrap().insert(name.to_string());
        engine
    }

    /// Every catalog listing takes `delay`, widening the window in which a
    /// provision is in flight.
    pub fn slow_listing(delay: Duration) -> Self {
        Self {
            list_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.databases.lock().unwrap().contains(name)
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn fail_create(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }

    pub fn fail_drop(&self, fail: bool) {
        *self.fail_drop.lock().unwrap() = fail;
    }

    fn record(&self, op: &str, name: &str) {
        self.ops.lock().unwrap().push(format!("{}:{}", op, name));
    }
}

#[async_trait]
impl DatabaseEngine for FakeEngine {
    async fn list_database_names(&self) -> Result<Vec<String>, EngineError> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.databases.lock().unwrap().iter().cloned().collect())
    }

    async fn materialize_database(&self, name: &str) -> Result<(), EngineError> {
        self.record("create", name);
        if *self.fail_create.lock().unwrap() {
            return Err(EngineError::Unavailable("insert refused".to_string()));
        }
        self.databases.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), EngineError> {
        self.record("drop", name);
        if *self.fail_drop.lock().unwrap() {
            return Err(EngineError::Unavailable("drop refused".to_string()));
        }
        self.databases.lock().unwrap().remove(name);
        Ok(())
    }
}

/// A database user as the fake API stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub database: String,
    pub password: String,
}

/// Admin API keeping users in memory.
///
/// Queued failures are returned (one per call) before the call touches the
/// user table.
#[derive(Default)]
pub struct FakeAdminApi {
    users: Mutex<BTreeMap<String, RemoteUser>>,
    calls: Mutex<Vec<String>>,
    create_failures: Mutex<VecDeque<u16>>,
    delete_failures: Mutex<VecDeque<u16>>,
}

impl FakeAdminApi {
    pub fn user(&self, username: &str) -> Option<RemoteUser> {
        self.users.lock().unwrap().get(username).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_next_create(&self, status: u16) {
        self.create_failures.lock().unwrap().push_back(status);
    }

    pub fn fail_next_delete(&self, status: u16) {
        self.delete_failures.lock().unwrap().push_back(status);
    }

    fn status(status: u16) -> RemoteAdminError {
        RemoteAdminError::Status {
            status,
            body: String::new(),
        }
    }
}

#[async_trait]
impl AdminApi for FakeAdminApi {
    async fn create_database_user(
        &self,
        target: &ApiTarget,
        user: &DatabaseUserPayload,
    ) -> Result<(), RemoteAdminError> {
        self.calls.lock().unwrap().push(format!(
            "POST {}",
            target.users_url()?.path()
        ));
        if let Some(status) = self.create_failures.lock().unwrap().pop_front() {
            return Err(Self::status(status));
        }

        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.username) {
            return Err(Self::status(409));
        }
        let database = user
            .roles
            .first()
            .map(|r| r.database_name.clone())
            .unwrap_or_default();
        users.insert(
            user.username.clone(),
            RemoteUser {
                database,
                password: user.password.clone(),
            },
        );
        Ok(())
    }

    async fn delete_database_user(
        &self,
        target: &ApiTarget,
        username: &str,
    ) -> Result<(), RemoteAdminError> {
        self.calls.lock().unwrap().push(format!(
            "DELETE {}",
            target.user_url(username)?.path()
        ));
        if let Some(status) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(Self::status(status));
        }

        match self.users.lock().unwrap().remove(username) {
            Some(_) => Ok(()),
            None => Err(Self::status(404)),
        }
    }
}

pub fn test_config(state_db: &Path) -> BrokerConfig {
    let vars: HashMap<String, String> = [
        ("ATLAS_ENDPOINT", ENDPOINT),
        ("ATLAS_GROUPID", "5f1a0000"),
        ("ATLAS_API_USER", "ops"),
        ("ATLAS_API_KEY", "api-key"),
        ("ATLAS_API_BASE", "https://cloud.mongodb.com/api/atlas/v1.0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut config = BrokerConfig::from_map(&vars).expect("valid test config");
    config.state_db = state_db.to_path_buf();
    config
}

/// A broker over fakes with an in-memory store.
pub struct Harness {
    pub broker: Broker,
    pub engine: Arc<FakeEngine>,
    pub api: Arc<FakeAdminApi>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_engine(FakeEngine::default()).await
    }

    pub async fn with_engine(engine: FakeEngine) -> Self {
        let engine = Arc::new(engine);
        let api = Arc::new(FakeAdminApi::default());
        let broker = Broker::builder()
            .config(test_config(Path::new(":memory:")))
            .ephemeral(true)
            .engine(engine.clone())
            .admin_api(api.clone())
            .retry_policy(RetryPolicy::immediate(3))
            .build()
            .await
            .expect("broker builds");
        Self {
            broker,
            engine,
            api,
        }
    }
}

pub fn create_request(instance_id: &str) -> CreateServiceInstanceRequest {
    CreateServiceInstanceRequest {
        service_instance_id: instance_id.to_string(),
        service_definition_id: "mongodb-atlas".to_string(),
        plan_id: "shared".to_string(),
        organization_guid: Some("org-1".to_string()),
        space_guid: Some("space-1".to_string()),
        parameters: None,
    }
}

pub fn delete_request(instance_id: &str) -> DeleteServiceInstanceRequest {
    DeleteServiceInstanceRequest {
        service_instance_id: instance_id.to_string(),
        service_definition_id: None,
        plan_id: None,
    }
}

pub fn bind_request(instance_id: &str, binding_id: &str) -> CreateServiceInstanceBindingRequest {
    CreateServiceInstanceBindingRequest {
        service_instance_id: instance_id.to_string(),
        binding_id: binding_id.to_string(),
        service_definition_id: None,
        plan_id: None,
        bound_app_guid: Some("app-1".to_string()),
    }
}

pub fn unbind_request(instance_id: &str, binding_id: &str) -> DeleteServiceInstanceBindingRequest {
    DeleteServiceInstanceBindingRequest {
        service_instance_id: instance_id.to_string(),
        binding_id: binding_id.to_string(),
    }
}
