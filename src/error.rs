// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use crate::admin::{EngineError, RemoteAdminError};
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Service instance '{0}' already exists")]
    #[diagnostic(
        code(broker::instance::exists),
        help("Deprovision the instance first, or use a different instance id")
    )]
    InstanceAlreadyExists(String),

    #[error("Service instance '{0}' does not exist")]
    #[diagnostic(code(broker::instance::not_found))]
    InstanceNotFound(String),

    #[error("Binding '{binding_id}' already exists for service instance '{instance_id}'")]
    #[diagnostic(code(broker::binding::exists))]
    BindingAlreadyExists {
        instance_id: String,
        binding_id: String,
    },

    #[error("Binding '{0}' does not exist")]
    #[diagnostic(code(broker::binding::not_found))]
    BindingNotFound(String),

    #[error("Failed to provision service instance '{instance_id}': {reason}")]
    #[diagnostic(code(broker::instance::provisioning_failed))]
    Provisioning { instance_id: String, reason: String },

    #[error("Failed to create database '{database}': {source}")]
    #[diagnostic(
        code(broker::engine::create_failed),
        help("Check that the configured ATLAS_ENDPOINT user may create databases")
    )]
    ResourceCreation {
        database: String,
        #[source]
        source: EngineError,
    },

    #[error("Atlas admin API {operation} for '{resource}' failed: {source}")]
    #[diagnostic(
        code(broker::admin_api::error),
        help("Verify ATLAS_API_BASE, ATLAS_GROUPID and the API key's project permissions")
    )]
    RemoteAdmin {
        operation: &'static str,
        resource: String,
        #[source]
        source: RemoteAdminError,
    },

    #[error("Database {operation} for '{resource}' failed: {source}")]
    #[diagnostic(code(broker::engine::error))]
    DatabaseOperation {
        operation: &'static str,
        resource: String,
        #[source]
        source: EngineError,
    },

    #[error("Invalid connection string: {0}")]
    #[diagnostic(
        code(broker::connection_string::invalid),
        help("Expected mongodb://host[:port][,host[:port]...][/db][?options]")
    )]
    InvalidConnectionString(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(broker::config::error))]
    Config(String),

    #[error("State store error: {0}")]
    #[diagnostic(
        code(broker::store::error),
        help("See recovery suggestions based on the specific error type")
    )]
    Store(#[from] tokio_rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error is a conflict caused by the request itself rather
    /// than a fault of the broker or its backends.
    ///
    /// A transport maps these to 4xx responses (409 for the `*AlreadyExists`
    /// variants, 410/404 for the `*NotFound` ones).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InstanceAlreadyExists(_)
                | Error::InstanceNotFound(_)
                | Error::BindingAlreadyExists { .. }
                | Error::BindingNotFound(_)
        )
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::InstanceAlreadyExists(id) => Some(format!(
                "Deprovision it first with: atlas-broker deprovision {}",
                id
            )),
            Error::InstanceNotFound(id) => Some(format!(
                "Provision it first with: atlas-broker provision {} --service <id> --plan <id>",
                id
            )),
            Error::BindingAlreadyExists { instance_id, binding_id } => Some(format!(
                "Unbind it first with: atlas-broker unbind {} {}",
                instance_id, binding_id
            )),
            Error::RemoteAdmin { source, .. } if source.is_transient() => Some(
                "The Atlas admin API looks unreachable or overloaded. Retry later, or raise ATLAS_REQUEST_TIMEOUT / ATLAS_RETRY_ATTEMPTS.".to_string()
            ),
            Error::RemoteAdmin { source: RemoteAdminError::Status { status: 401, .. }, .. } => Some(
                "Atlas rejected the credentials. Check ATLAS_API_USER and ATLAS_API_KEY.".to_string()
            ),
            Error::ResourceCreation { .. } | Error::DatabaseOperation { .. } => Some(
                "Check that ATLAS_ENDPOINT is reachable and its user has the readWriteAnyDatabase and dbAdminAnyDatabase roles.".to_string()
            ),
            Error::Config(_) => Some(
                "Required variables: ATLAS_ENDPOINT, ATLAS_GROUPID, ATLAS_API_USER, ATLAS_API_KEY, ATLAS_API_BASE".to_string()
            ),
            Error::Store(e) => {
                // tokio_rusqlite wraps the underlying rusqlite error opaquely,
                // so we can't match on error codes.
                let err_str = e.to_string();
                if err_str.contains("database is locked") || err_str.contains("SQLITE_BUSY") {
                    Some("Another broker process may be writing to the state database.".to_string())
                } else if err_str.contains("database disk image is malformed") || err_str.contains("SQLITE_CORRUPT") {
                    Some(
                        "State database corrupted. Back it up and try recovery:\n  sqlite3 .broker/state.db '.recover' | sqlite3 .broker/state.recovered.db".to_string()
                    )
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}
