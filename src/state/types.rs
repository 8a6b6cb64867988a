use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Arbitrary provisioning parameters passed through from the platform.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Credentials handed to a bound application. Always carries `uri`.
pub type Credentials = BTreeMap<String, String>;

/// Key under which the connection string is stored in [`Credentials`].
pub const CREDENTIALS_URI_KEY: &str = "uri";

/// Persisted record of a provisioned service instance.
///
/// The backing database is named after `service_instance_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub service_instance_id: String,

    pub service_definition_id: String,

    pub plan_id: String,

    /// Absent on records rebuilt from an update request.
    pub organization_guid: Option<String>,

    pub space_guid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,

    pub created_at: DateTime<Utc>,
}

/// Persisted record of a credential binding.
///
/// The remote database user is named after `binding_id`. The owning instance
/// is referenced by id only; nothing checks that it exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceBinding {
    pub binding_id: String,

    pub service_instance_id: String,

    pub credentials: Credentials,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syslog_drain_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_guid: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ServiceInstanceBinding {
    /// Connection string from the stored credentials.
    pub fn uri(&self) -> Option<&str> {
        self.credentials.get(CREDENTIALS_URI_KEY).map(String::as_str)
    }
}

/// Outcome of an insert-if-absent.
///
/// The store's uniqueness constraint decides; a prior lookup never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was newly written.
    Inserted,
    /// A record with the same id already existed and was left untouched.
    Conflict,
}
