//! Request and response objects exchanged with the provisioning transport.

use crate::state::{Credentials, Parameters, ServiceInstance};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Terminal state reported by last-operation polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateServiceInstanceRequest {
    pub service_instance_id: String,
    pub service_definition_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: Option<String>,
    #[serde(default)]
    pub space_guid: Option<String>,
    #[serde(default)]
    pub parameters: Option<Parameters>,
}

impl From<&CreateServiceInstanceRequest> for ServiceInstance {
    fn from(req: &CreateServiceInstanceRequest) -> Self {
        ServiceInstance {
            service_instance_id: req.service_instance_id.clone(),
            service_definition_id: req.service_definition_id.clone(),
            plan_id: req.plan_id.clone(),
            organization_guid: req.organization_guid.clone(),
            space_guid: req.space_guid.clone(),
            parameters: req.parameters.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceInstanceResponse {
    pub service_instance_id: String,
    pub state: OperationState,
}

/// Update carries no organization or space; the replacement record has
/// neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateServiceInstanceRequest {
    pub service_instance_id: String,
    pub service_definition_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: Option<Parameters>,
}

impl From<&UpdateServiceInstanceRequest> for ServiceInstance {
    fn from(req: &UpdateServiceInstanceRequest) -> Self {
        ServiceInstance {
            service_instance_id: req.service_instance_id.clone(),
            service_definition_id: req.service_definition_id.clone(),
            plan_id: req.plan_id.clone(),
            organization_guid: None,
            space_guid: None,
            parameters: req.parameters.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServiceInstanceResponse {
    pub service_instance_id: String,
    pub state: OperationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteServiceInstanceRequest {
    pub service_instance_id: String,
    #[serde(default)]
    pub service_definition_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteServiceInstanceResponse {
    pub service_instance_id: String,
    pub state: OperationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLastServiceOperationRequest {
    pub service_instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetLastServiceOperationResponse {
    pub state: OperationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceInstanceBindingRequest {
    pub service_instance_id: String,
    pub binding_id: String,
    #[serde(default)]
    pub service_definition_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub bound_app_guid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceInstanceBindingResponse {
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteServiceInstanceBindingRequest {
    pub service_instance_id: String,
    pub binding_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_drops_org_and_space() {
        let req = UpdateServiceInstanceRequest {
            service_instance_id: "i".into(),
            service_definition_id: "svc".into(),
            plan_id: "large".into(),
            parameters: None,
        };
        let record = ServiceInstance::from(&req);
        assert_eq!(record.plan_id, "large");
        assert!(record.organization_guid.is_none());
        assert!(record.space_guid.is_none());
    }

    #[test]
    fn test_operation_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OperationState::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&OperationState::Succeeded).unwrap(),
            "\"succeeded\""
        );
    }

    #[test]
    fn test_create_request_optional_fields_default() {
        let req: CreateServiceInstanceRequest = serde_json::from_str(
            r#"{"service_instance_id":"i","service_definition_id":"s","plan_id":"p"}"#,
        )
        .unwrap();
        assert!(req.organization_guid.is_none());
        assert!(req.parameters.is_none());
    }
}
