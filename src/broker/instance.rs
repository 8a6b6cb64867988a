use super::{
    CreateServiceInstanceRequest, CreateServiceInstanceResponse, DeleteServiceInstanceRequest,
    DeleteServiceInstanceResponse, GetLastServiceOperationRequest,
    GetLastServiceOperationResponse, OperationState, ServiceInstanceService,
    UpdateServiceInstanceRequest, UpdateServiceInstanceResponse,
};
use crate::admin::AdminGateway;
use crate::error::{Error, Result};
use crate::state::{InsertOutcome, ServiceInstance, StateStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Provisions, updates and deprovisions service instances.
///
/// Each instance owns one database named after its id.
pub struct InstanceLifecycleManager {
    store: Arc<dyn StateStore>,
    gateway: Arc<AdminGateway>,
}

impl InstanceLifecycleManager {
    pub fn new(store: Arc<dyn StateStore>, gateway: Arc<AdminGateway>) -> Self {
        Self { store, gateway }
    }

    async fn create_instance_impl(
        &self,
        req: CreateServiceInstanceRequest,
    ) -> Result<CreateServiceInstanceResponse> {
        let id = req.service_instance_id.clone();
        let record = ServiceInstance::from(&req);

        // The reservation claims the id; of two concurrent requests only one
        // gets past this point. Until it is committed, deprovision, update
        // and lookups treat the instance as absent.
        if self.store.reserve_instance(&record).await? == InsertOutcome::Conflict {
            return Err(Error::InstanceAlreadyExists(id));
        }
        debug!("Reserved instance record");

        if let Err(e) = self.provision_database(&id).await {
            warn!("Provisioning failed, releasing reservation: {}", e);
            if let Err(cleanup) = self.store.release_instance(&id).await {
                // Invisible to lookups; the next startup drops it.
                warn!("Failed to release reservation for {}: {}", id, cleanup);
            }
            return Err(Error::Provisioning {
                instance_id: id,
                reason: e.to_string(),
            });
        }

        if !self.store.commit_instance(&id).await? {
            warn!("Reservation vanished before commit, dropping database");
            if let Err(cleanup) = self.gateway.delete_database(&id).await {
                warn!("Failed to drop database {}: {}", id, cleanup);
            }
            return Err(Error::Provisioning {
                instance_id: id,
                reason: "reservation was released before the database was ready".to_string(),
            });
        }

        info!("Provisioned service instance");
        Ok(CreateServiceInstanceResponse {
            service_instance_id: id,
            state: OperationState::Succeeded,
        })
    }

    /// Create the instance database from scratch, dropping any leftover.
    async fn provision_database(&self, id: &str) -> Result<()> {
        if self.gateway.database_exists(id).await? {
            warn!("Dropping stale database {}", id);
            self.gateway.delete_database(id).await?;
        }
        self.gateway.create_database(id).await?;
        Ok(())
    }

    async fn delete_instance_impl(
        &self,
        req: DeleteServiceInstanceRequest,
    ) -> Result<DeleteServiceInstanceResponse> {
        let id = req.service_instance_id;
        if self.store.find_instance(&id).await?.is_none() {
            return Err(Error::InstanceNotFound(id));
        }

        self.gateway.delete_database(&id).await?;
        self.store.delete_instance(&id).await?;

        info!("Deprovisioned service instance");
        Ok(DeleteServiceInstanceResponse {
            service_instance_id: id,
            state: OperationState::Succeeded,
        })
    }

    async fn update_instance_impl(
        &self,
        req: UpdateServiceInstanceRequest,
    ) -> Result<UpdateServiceInstanceResponse> {
        let id = req.service_instance_id.clone();
        if self.store.find_instance(&id).await?.is_none() {
            return Err(Error::InstanceNotFound(id));
        }

        // A concurrent deprovision can remove the record between the lookup
        // and the replace.
        if !self.store.replace_instance(&ServiceInstance::from(&req)).await? {
            return Err(Error::InstanceNotFound(id));
        }

        info!("Updated service instance to plan {}", req.plan_id);
        Ok(UpdateServiceInstanceResponse {
            service_instance_id: id,
            state: OperationState::Succeeded,
        })
    }
}

#[async_trait]
impl ServiceInstanceService for InstanceLifecycleManager {
    async fn create_instance(
        &self,
        req: CreateServiceInstanceRequest,
    ) -> Result<CreateServiceInstanceResponse> {
        let span = tracing::info_span!("create_instance", instance.id = %req.service_instance_id);
        self.create_instance_impl(req).instrument(span).await
    }

    async fn get_last_operation(
        &self,
        req: GetLastServiceOperationRequest,
    ) -> Result<GetLastServiceOperationResponse> {
        debug!(
            "Last operation for {} is always succeeded",
            req.service_instance_id
        );
        Ok(GetLastServiceOperationResponse {
            state: OperationState::Succeeded,
        })
    }

    async fn delete_instance(
        &self,
        req: DeleteServiceInstanceRequest,
    ) -> Result<DeleteServiceInstanceResponse> {
        let span = tracing::info_span!("delete_instance", instance.id = %req.service_instance_id);
        self.delete_instance_impl(req).instrument(span).await
    }

    async fn update_instance(
        &self,
        req: UpdateServiceInstanceRequest,
    ) -> Result<UpdateServiceInstanceResponse> {
        let span = tracing::info_span!("update_instance", instance.id = %req.service_instance_id);
        self.update_instance_impl(req).instrument(span).await
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>> {
        self.store.find_instance(instance_id).await
    }
}
