//! Persistent state for service instances and bindings.
//!
//! This module provides the [`StateStore`] contract the lifecycle managers
//! depend on, and its SQLite-backed implementation.
//!
//! # Architecture
//!
//! Records are persisted in a SQLite database (`.broker/state.db` by default)
//! with WAL mode enabled for crash recovery. Ids are primary keys, and inserts
//! use insert-if-absent semantics so that two concurrent provisioning calls for
//! the same id cannot both succeed.
//!
//! An instance is first written as a reservation and only becomes visible to
//! lookups, deletes and replaces once its database exists.
//!
//! # Example
//!
//! ```ignore
//! use atlas_broker::state::{SqliteStateStore, StateStore};
//!
//! let store = SqliteStateStore::new(&db_path).await?;
//! store.initialize().await?;
//!
//! if store.reserve_instance(&instance).await? == InsertOutcome::Conflict {
//!     // someone else owns this id
//! }
//! // ... create the database ...
//! store.commit_instance(&instance.service_instance_id).await?;
//! ```

mod sqlite;
mod types;

pub use sqlite::SqliteStateStore;
pub use types::{
    Credentials, InsertOutcome, Parameters, ServiceInstance, ServiceInstanceBinding,
    CREDENTIALS_URI_KEY,
};

use crate::error::Result;
use async_trait::async_trait;

/// Keyed record storage for instances and bindings.
///
/// Inserts and reservations are the authoritative conflict detector: one for
/// an id that already exists returns [`InsertOutcome::Conflict`] and leaves the
/// existing record untouched. Deletes are idempotent and report whether a row existed.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Write `instance` as a reservation.
    ///
    /// A reservation conflicts with any record of the same id, but lookups,
    /// deletes and replaces do not see it until it is committed.
    async fn reserve_instance(&self, instance: &ServiceInstance) -> Result<InsertOutcome>;

    /// Make a reservation visible. Returns `false` if there is none.
    async fn commit_instance(&self, instance_id: &str) -> Result<bool>;

    /// Remove a reservation. Committed records are left alone.
    async fn release_instance(&self, instance_id: &str) -> Result<bool>;

    async fn find_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>>;

    async fn delete_instance(&self, instance_id: &str) -> Result<bool>;

    /// Delete and re-insert the instance in one transaction.
    ///
    /// Returns `false` (and writes nothing) if no record with the instance's
    /// id exists.
    async fn replace_instance(&self, instance: &ServiceInstance) -> Result<bool>;

    async fn insert_binding(&self, binding: &ServiceInstanceBinding) -> Result<InsertOutcome>;

    async fn find_binding(&self, binding_id: &str) -> Result<Option<ServiceInstanceBinding>>;

    async fn delete_binding(&self, binding_id: &str) -> Result<bool>;
}
