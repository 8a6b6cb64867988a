//! Bridge to the database engine and the Atlas administrative API.
//!
//! [`AdminGateway`] is the only component that touches external systems. It
//! bounds every call with a timeout, aborts in-flight calls once it is shut
//! down, and retries admin API calls that fail transiently.

mod api;
mod connection_string;
mod engine;
mod error;
mod retry;

pub use api::{AdminApi, ApiTarget, AtlasApiClient, DatabaseUserPayload, RoleGrant, ADMIN_DB};
pub use connection_string::{build_connection_string, parse_endpoint, redact};
pub use engine::{DatabaseEngine, MongoEngine, SENTINEL_COLLECTION};
pub use error::{EngineError, RemoteAdminError};
pub use retry::RetryPolicy;

use crate::error::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default bound on a single engine or admin API call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A database that exists on the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHandle {
    pub name: String,
}

/// Engine and admin API access shared by the lifecycle managers.
pub struct AdminGateway {
    engine: Arc<dyn DatabaseEngine>,
    api: Arc<dyn AdminApi>,
    timeout: Duration,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl AdminGateway {
    pub fn new(engine: Arc<dyn DatabaseEngine>, api: Arc<dyn AdminApi>) -> Self {
        Self {
            engine,
            api,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether a database with this name is listed by the engine.
    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .bounded_engine(self.engine.list_database_names())
            .await
            .map_err(|source| Error::DatabaseOperation {
                operation: "list",
                resource: name.to_string(),
                source,
            })?;
        Ok(names.iter().any(|n| n == name))
    }

    /// Create `name` by writing a sentinel document into it.
    pub async fn create_database(&self, name: &str) -> Result<DatabaseHandle> {
        self.bounded_engine(self.engine.materialize_database(name))
            .await
            .map_err(|source| Error::ResourceCreation {
                database: name.to_string(),
                source,
            })?;
        debug!("Created database {}", name);
        Ok(DatabaseHandle {
            name: name.to_string(),
        })
    }

    /// Drop `name`. Dropping a database that does not exist succeeds.
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        self.bounded_engine(self.engine.drop_database(name))
            .await
            .map_err(|source| Error::DatabaseOperation {
                operation: "drop",
                resource: name.to_string(),
                source,
            })?;
        debug!("Dropped database {}", name);
        Ok(())
    }

    /// Create a remote user authenticating against `admin` with `readWrite`
    /// on `database`.
    pub async fn create_database_user(
        &self,
        target: &ApiTarget,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let payload = DatabaseUserPayload::read_write(database, username, password);
        let api = Arc::clone(&self.api);

        // A 409 after a timed-out attempt means that attempt went through.
        // After a 503 it means someone else created the user.
        self.call_api("create user", username, Some(409), || {
            api.create_database_user(target, &payload)
        })
        .await
        .map_err(|source| Error::RemoteAdmin {
            operation: "create user",
            resource: username.to_string(),
            source,
        })?;

        info!("Created database user {} on {}", username, database);
        Ok(())
    }

    /// Delete the remote user, then drop `database`.
    ///
    /// A 404 from the API counts as already deleted. Any other failure is
    /// returned and the database is left in place.
    pub async fn delete_database_user_and_database(
        &self,
        target: &ApiTarget,
        database: &str,
        username: &str,
    ) -> Result<()> {
        let api = Arc::clone(&self.api);
        match self
            .call_api("delete user", username, Some(404), || {
                api.delete_database_user(target, username)
            })
            .await
        {
            Ok(()) => info!("Deleted database user {}", username),
            Err(e) if e.status() == Some(404) => {
                warn!("Database user {} was already gone", username);
            }
            Err(source) => {
                return Err(Error::RemoteAdmin {
                    operation: "delete user",
                    resource: username.to_string(),
                    source,
                });
            }
        }

        self.delete_database(database).await
    }

    /// See [`build_connection_string`].
    pub fn build_connection_string(
        &self,
        source_endpoint: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        build_connection_string(source_endpoint, database, username, password)
    }

    /// Abort in-flight calls and release engine connections.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.engine.shutdown().await;
    }

    async fn bounded_engine<T, F>(&self, fut: F) -> std::result::Result<T, EngineError>
    where
        F: Future<Output = std::result::Result<T, EngineError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EngineError::Cancelled),
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout(self.timeout)),
            },
        }
    }

    /// Run an admin API call under the timeout, retrying transient failures.
    ///
    /// `done_on_retry` is a status that, when returned after an attempt whose
    /// outcome is unknown, means that attempt already took effect.
    async fn call_api<F, Fut>(
        &self,
        operation: &'static str,
        resource: &str,
        done_on_retry: Option<u16>,
        mut call: F,
    ) -> std::result::Result<(), RemoteAdminError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<(), RemoteAdminError>>,
    {
        let mut attempt = 1;
        let mut maybe_applied = false;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RemoteAdminError::Cancelled),
                result = tokio::time::timeout(self.timeout, call()) => match result {
                    Ok(result) => result,
                    Err(_) => Err(RemoteAdminError::timeout(
                        format!("{} {}", operation, resource),
                        self.timeout,
                    )),
                },
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if maybe_applied && done_on_retry.is_some() && e.status() == done_on_retry => {
                    warn!(
                        "{} for {} returned {} on attempt {}; treating earlier attempt as applied",
                        operation, resource, e, attempt
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    maybe_applied |= e.outcome_unknown();
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{} for {} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation, resource, attempt, self.retry.max_attempts, e, delay
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(RemoteAdminError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
