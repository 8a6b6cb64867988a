//! Instance and binding lifecycle orchestration.
//!
//! The two managers keep the local [`StateStore`](crate::state::StateStore)
//! consistent with the external resources the [`AdminGateway`] owns:
//!
//! | record          | external resource                               |
//! |-----------------|-------------------------------------------------|
//! | service instance| database named after the instance id            |
//! | binding         | remote database user named after the binding id |
//!
//! Every operation finishes before it returns; last-operation polling always
//! reports [`OperationState::Succeeded`].
//!
//! [`AdminGateway`]: crate::admin::AdminGateway

mod binding;
mod builder;
mod instance;
pub mod model;
mod secret;

pub use binding::BindingLifecycleManager;
pub use builder::{Broker, BrokerBuilder};
pub use instance::InstanceLifecycleManager;
pub use model::*;
pub use secret::generate_secret;

use crate::error::Result;
use crate::state::{ServiceInstance, ServiceInstanceBinding};
use async_trait::async_trait;

/// Provisioning operations on service instances.
#[async_trait]
pub trait ServiceInstanceService: Send + Sync {
    async fn create_instance(
        &self,
        req: CreateServiceInstanceRequest,
    ) -> Result<CreateServiceInstanceResponse>;

    async fn get_last_operation(
        &self,
        req: GetLastServiceOperationRequest,
    ) -> Result<GetLastServiceOperationResponse>;

    async fn delete_instance(
        &self,
        req: DeleteServiceInstanceRequest,
    ) -> Result<DeleteServiceInstanceResponse>;

    async fn update_instance(
        &self,
        req: UpdateServiceInstanceRequest,
    ) -> Result<UpdateServiceInstanceResponse>;

    async fn get_instance(&self, instance_id: &str) -> Result<Option<ServiceInstance>>;
}

/// Credential operations on bindings.
#[async_trait]
pub trait ServiceInstanceBindingService: Send + Sync {
    async fn create_binding(
        &self,
        req: CreateServiceInstanceBindingRequest,
    ) -> Result<CreateServiceInstanceBindingResponse>;

    async fn delete_binding(&self, req: DeleteServiceInstanceBindingRequest) -> Result<()>;

    async fn get_binding(&self, binding_id: &str) -> Result<Option<ServiceInstanceBinding>>;
}
