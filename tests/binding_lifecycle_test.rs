mod common;

use atlas_broker::admin::RemoteAdminError;
use atlas_broker::broker::{ServiceInstanceBindingService, ServiceInstanceService};
use atlas_broker::state::{InsertOutcome, ServiceInstanceBinding, StateStore};
use atlas_broker::Error;
use chrono::Utc;
use common::{bind_request, create_request, unbind_request, Harness};

async fn provisioned(instance_id: &str) -> Harness {
    let h = Harness::new().await;
    h.broker
        .instances()
        .create_instance(create_request(instance_id))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn test_bind_creates_scoped_user_and_returns_uri() {
    let h = provisioned("orders").await;

    let response = h
        .broker
        .bindings()
        .create_binding(bind_request("orders", "app-binding"))
        .await
        .unwrap();

    let user = h.api.user("app-binding").expect("remote user created");
    assert_eq!(user.database, "orders");
    assert_eq!(user.password.len(), 32);
    assert!(user.password.chars().all(|c| c.is_ascii_alphanumeric()));

    assert_eq!(response.credentials.len(), 1);
    assert_eq!(
        response.credentials["uri"],
        format!(
            "mongodb://app-binding:{}@cluster0.example.net:27017,cluster1.example.net:27017/orders?ssl=true&replicaSet=rs0&authSource=admin",
            user.password
        )
    );

    let record = h
        .broker
        .bindings()
        .get_binding("app-binding")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.service_instance_id, "orders");
    assert_eq!(record.app_guid.as_deref(), Some("app-1"));
    assert_eq!(record.credentials, response.credentials);
}

#[tokio::test]
async fn test_admin_api_paths() {
    let h = provisioned("orders").await;
    h.broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();
    h.broker
        .bindings()
        .delete_binding(unbind_request("orders", "b1"))
        .await
        .unwrap();

    assert_eq!(
        h.api.calls(),
        vec![
            "POST /api/atlas/v1.0/groups/5f1a0000/databaseUsers".to_string(),
            "DELETE /api/atlas/v1.0/groups/5f1a0000/databaseUsers/admin/b1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_bind_twice_is_rejected_before_remote_call() {
    let h = provisioned("orders").await;
    h.broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();

    let err = h
        .broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::BindingAlreadyExists { ref instance_id, ref binding_id }
            if instance_id == "orders" && binding_id == "b1"
    ));
    assert_eq!(h.api.calls().len(), 1);
}

#[tokio::test]
async fn test_bindings_get_distinct_passwords() {
    let h = provisioned("orders").await;
    h.broker
        .instances()
        .create_instance(create_request("billing"))
        .await
        .unwrap();

    let a = h
        .broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();
    let b = h
        .broker
        .bindings()
        .create_binding(bind_request("billing", "b2"))
        .await
        .unwrap();

    assert_ne!(h.api.user("b1").unwrap().password, h.api.user("b2").unwrap().password);
    assert_ne!(a.credentials["uri"], b.credentials["uri"]);
}

#[tokio::test]
async fn test_rejected_user_creation_persists_nothing() {
    let h = provisioned("orders").await;
    h.api.fail_next_create(400);

    let err = h
        .broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::RemoteAdmin {
            operation: "create user",
            source: RemoteAdminError::Status { status: 400, .. },
            ..
        }
    ));
    assert!(h.broker.bindings().get_binding("b1").await.unwrap().is_none());
    assert_eq!(h.api.calls().len(), 1, "4xx must not be retried");
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let h = provisioned("orders").await;
    h.api.fail_next_create(503);

    h.broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();

    assert_eq!(h.api.calls().len(), 2);
    assert!(h.api.user("b1").is_some());
}

#[tokio::test]
async fn test_concurrent_bind_has_one_winner() {
    let h = provisioned("orders").await;

    // The loser is stopped by the pre-check, the remote 409 or the insert
    // conflict depending on interleaving; the winner's user must survive.
    let bindings = h.broker.bindings();
    let (a, b) = tokio::join!(
        bindings.create_binding(bind_request("orders", "b1")),
        bindings.create_binding(bind_request("orders", "b1")),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(h.api.user("b1").is_some());
    assert!(h.broker.bindings().get_binding("b1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_existing_record_wins_over_new_binding() {
    let h = provisioned("orders").await;
    let existing = ServiceInstanceBinding {
        binding_id: "b1".into(),
        service_instance_id: "orders".into(),
        credentials: [("uri".to_string(), "mongodb://old".to_string())].into(),
        syslog_drain_url: None,
        app_guid: None,
        created_at: Utc::now(),
    };
    assert_eq!(
        h.broker.store().insert_binding(&existing).await.unwrap(),
        InsertOutcome::Inserted
    );

    let err = h
        .broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BindingAlreadyExists { .. }));
    let record = h.broker.bindings().get_binding("b1").await.unwrap().unwrap();
    assert_eq!(record.uri(), Some("mongodb://old"));
    assert_eq!(h.api.user_count(), 0);
}

#[tokio::test]
async fn test_unbind_unknown_binding_has_no_remote_effect() {
    let h = provisioned("orders").await;

    let err = h
        .broker
        .bindings()
        .delete_binding(unbind_request("orders", "ghost"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BindingNotFound(ref id) if id == "ghost"));
    assert!(h.api.calls().is_empty());
    assert!(h.engine.has_database("orders"));
}

#[tokio::test]
async fn test_unbind_removes_user_database_and_record() {
    let h = provisioned("orders").await;
    h.broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();

    h.broker
        .bindings()
        .delete_binding(unbind_request("orders", "b1"))
        .await
        .unwrap();

    assert!(h.api.user("b1").is_none());
    assert!(!h.engine.has_database("orders"));
    assert!(h.broker.bindings().get_binding("b1").await.unwrap().is_none());
    // The instance record itself stays.
    assert!(h.broker.instances().get_instance("orders").await.unwrap().is_some());
}

#[tokio::test]
async fn test_remote_failure_blocks_unbind() {
    let h = provisioned("orders").await;
    h.broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();
    h.api.fail_next_delete(500);

    let err = h
        .broker
        .bindings()
        .delete_binding(unbind_request("orders", "b1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::RemoteAdmin {
            operation: "delete user",
            ..
        }
    ));
    assert!(h.api.user("b1").is_some());
    assert!(h.engine.has_database("orders"));
    assert!(h.broker.bindings().get_binding("b1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unbind_tolerates_user_already_gone() {
    let h = provisioned("orders").await;
    h.broker
        .bindings()
        .create_binding(bind_request("orders", "b1"))
        .await
        .unwrap();
    h.api.fail_next_delete(404);

    h.broker
        .bindings()
        .delete_binding(unbind_request("orders", "b1"))
        .await
        .unwrap();

    assert!(!h.engine.has_database("orders"));
    assert!(h.broker.bindings().get_binding("b1").await.unwrap().is_none());
}
