use super::{
    generate_secret, CreateServiceInstanceBindingRequest, CreateServiceInstanceBindingResponse,
    DeleteServiceInstanceBindingRequest, ServiceInstanceBindingService,
};
use crate::admin::{AdminGateway, ApiTarget};
use crate::error::{Error, Result};
use crate::state::{
    Credentials, InsertOutcome, ServiceInstanceBinding, StateStore, CREDENTIALS_URI_KEY,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Issues and revokes per-application credentials.
///
/// A binding is a remote database user named after the binding id with
/// `readWrite` on the owning instance's database. Unbinding drops that whole
/// database as well, so an instance supports one binding over its lifetime.
pub struct BindingLifecycleManager {
    store: Arc<dyn StateStore>,
    gateway: Arc<AdminGateway>,
    target: ApiTarget,
    endpoint: String,
}

impl BindingLifecycleManager {
    /// `endpoint` is the cluster connection string bindings' URIs are
    /// derived from.
    pub fn new(
        store: Arc<dyn StateStore>,
        gateway: Arc<AdminGateway>,
        target: ApiTarget,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            target,
            endpoint: endpoint.into(),
        }
    }

    async fn create_binding_impl(
        &self,
        req: CreateServiceInstanceBindingRequest,
    ) -> Result<CreateServiceInstanceBindingResponse> {
        let CreateServiceInstanceBindingRequest {
            service_instance_id: instance_id,
            binding_id,
            bound_app_guid,
            ..
        } = req;

        if self.store.find_binding(&binding_id).await?.is_some() {
            return Err(Error::BindingAlreadyExists {
                instance_id,
                binding_id,
            });
        }

        let password = generate_secret();
        // Built before any remote call so a bad endpoint leaves nothing behind.
        let uri =
            self.gateway
                .build_connection_string(&self.endpoint, &instance_id, &binding_id, &password)?;

        self.gateway
            .create_database_user(&self.target, &instance_id, &binding_id, &password)
            .await?;

        let mut credentials = Credentials::new();
        credentials.insert(CREDENTIALS_URI_KEY.to_string(), uri);

        let record = ServiceInstanceBinding {
            binding_id: binding_id.clone(),
            service_instance_id: instance_id.clone(),
            credentials: credentials.clone(),
            syslog_drain_url: None,
            app_guid: bound_app_guid,
            created_at: Utc::now(),
        };

        // The remote user is keyed by binding id too, so a losing racer
        // shares it with the winner and must not delete it.
        if self.store.insert_binding(&record).await? == InsertOutcome::Conflict {
            warn!("Binding record was written concurrently");
            return Err(Error::BindingAlreadyExists {
                instance_id,
                binding_id,
            });
        }

        info!("Created binding");
        Ok(CreateServiceInstanceBindingResponse { credentials })
    }

    async fn delete_binding_impl(&self, req: DeleteServiceInstanceBindingRequest) -> Result<()> {
        let binding = self
            .store
            .find_binding(&req.binding_id)
            .await?
            .ok_or_else(|| Error::BindingNotFound(req.binding_id.clone()))?;

        // The user was scoped to the recorded instance; trust it over the request.
        if binding.service_instance_id != req.service_instance_id {
            warn!(
                "Request names instance {} but binding belongs to {}",
                req.service_instance_id, binding.service_instance_id
            );
        }

        self.gateway
            .delete_database_user_and_database(
                &self.target,
                &binding.service_instance_id,
                &binding.binding_id,
            )
            .await?;
        debug!("Remote user and database removed");

        self.store.delete_binding(&binding.binding_id).await?;
        info!("Deleted binding");
        Ok(())
    }
}

#[async_trait]
impl ServiceInstanceBindingService for BindingLifecycleManager {
    async fn create_binding(
        &self,
        req: CreateServiceInstanceBindingRequest,
    ) -> Result<CreateServiceInstanceBindingResponse> {
        let span = tracing::info_span!(
            "create_binding",
            instance.id = %req.service_instance_id,
            binding.id = %req.binding_id
        );
        self.create_binding_impl(req).instrument(span).await
    }

    async fn delete_binding(&self, req: DeleteServiceInstanceBindingRequest) -> Result<()> {
        let span = tracing::info_span!(
            "delete_binding",
            instance.id = %req.service_instance_id,
            binding.id = %req.binding_id
        );
        self.delete_binding_impl(req).instrument(span).await
    }

    async fn get_binding(&self, binding_id: &str) -> Result<Option<ServiceInstanceBinding>> {
        self.store.find_binding(binding_id).await
    }
}
