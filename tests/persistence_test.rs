mod common;

use atlas_broker::admin::RetryPolicy;
use atlas_broker::broker::{Broker, ServiceInstanceBindingService, ServiceInstanceService};
use atlas_broker::Error;
use common::{bind_request, create_request, test_config, FakeAdminApi, FakeEngine};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn broker_at(state_db: &Path) -> Broker {
    Broker::builder()
        .config(test_config(state_db))
        .engine(Arc::new(FakeEngine::default()))
        .admin_api(Arc::new(FakeAdminApi::default()))
        .retry_policy(RetryPolicy::immediate(1))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_records_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let state_db = temp_dir.path().join("nested").join("state.db");

    let broker = broker_at(&state_db).await;
    broker
        .instances()
        .create_instance(create_request("orders"))
        .await
        .unwrap();
    let issued = broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();
    broker.shutdown().await;
    drop(broker);

    assert!(state_db.exists());

    let broker = broker_at(&state_db).await;
    let instance = broker.instances().get_instance("orders").await.unwrap().unwrap();
    assert_eq!(instance.space_guid.as_deref(), Some("space-1"));
    let binding = broker.bindings().get_binding("b1").await.unwrap().unwrap();
    assert_eq!(binding.credentials, issued.credentials);

    // The conflict check is the persisted record, not process memory.
    let err = broker
        .instances()
        .create_instance(create_request("orders"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InstanceAlreadyExists(_)));
}

#[tokio::test]
async fn test_builder_requires_config() {
    let err = match Broker::builder().ephemeral(true).build().await {
        Ok(_) => panic!("build without config should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, Error::Config(_)));
}
