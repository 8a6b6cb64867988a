#![allow(unused_assignments)]

//! # Atlas Broker
//!
//! Provisioning backend that hands out MongoDB Atlas databases as service
//! instances and per-application database users as bindings.
//!
//! ## Features
//!
//! - **Instance lifecycle**: provision, update, deprovision, last-operation polling
//! - **Binding lifecycle**: per-binding database users with generated passwords
//! - **Connection strings**: derived from the cluster endpoint, carrying only the topology options consumers need
//! - **Persistent state**: SQLite (WAL) records with insert-if-absent conflict detection
//! - **Bounded remote calls**: per-call timeouts, cancellation on shutdown, retries for transient admin API faults
//!
//! ## Quick Start
//!
//! ```no_run
//! use atlas_broker::broker::{Broker, CreateServiceInstanceRequest, ServiceInstanceService};
//! use atlas_broker::config::BrokerConfig;
//!
//! # async fn example() -> Result<(), atlas_broker::Error> {
//! let broker = Broker::builder()
//!     .config(BrokerConfig::from_env()?)
//!     .build()
//!     .await?;
//!
//! broker
//!     .instances()
//!     .create_instance(CreateServiceInstanceRequest {
//!         service_instance_id: "orders-db".into(),
//!         service_definition_id: "mongodb-atlas".into(),
//!         plan_id: "shared".into(),
//!         organization_guid: None,
//!         space_guid: None,
//!         parameters: None,
//!     })
//!     .await?;
//!
//! broker.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod broker;
pub mod config;
pub mod error;
pub mod state;

pub use admin::{build_connection_string, AdminGateway};
pub use broker::{
    BindingLifecycleManager, Broker, BrokerBuilder, InstanceLifecycleManager,
    ServiceInstanceBindingService, ServiceInstanceService,
};
pub use config::BrokerConfig;
pub use error::{Error, Result};
pub use state::{ServiceInstance, ServiceInstanceBinding, SqliteStateStore, StateStore};
