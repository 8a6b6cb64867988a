use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "atlas-broker")]
#[command(version)]
#[command(about = "Atlas Broker - Provision MongoDB Atlas databases and credentials")]
pub struct Cli {
    /// Load variables from this .env file (defaults to ./.env when present)
    #[arg(long, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// State database path (overrides BROKER_STATE_DB)
    #[arg(long, value_name = "PATH")]
    pub state_db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision a service instance and its database
    Provision {
        /// Instance id; also the database name
        instance_id: String,

        /// Service definition id
        #[arg(long = "service")]
        service_definition_id: String,

        /// Plan id
        #[arg(long = "plan")]
        plan_id: String,

        /// Organization guid
        #[arg(long = "org")]
        organization_guid: Option<String>,

        /// Space guid
        #[arg(long = "space")]
        space_guid: Option<String>,

        /// Provisioning parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },
    /// Replace a service instance record
    Update {
        instance_id: String,

        #[arg(long = "service")]
        service_definition_id: String,

        #[arg(long = "plan")]
        plan_id: String,

        /// Provisioning parameters as a JSON object
        #[arg(long, value_name = "JSON")]
        params: Option<String>,
    },
    /// Drop a service instance's database and forget it
    Deprovision { instance_id: String },
    /// Report the state of the last operation on an instance
    LastOperation { instance_id: String },
    /// Create a database user for an instance and print its credentials
    Bind {
        instance_id: String,

        binding_id: String,

        /// Guid of the application being bound
        #[arg(long = "app")]
        bound_app_guid: Option<String>,
    },
    /// Delete a binding's database user and the instance database
    Unbind {
        instance_id: String,
        binding_id: String,
    },
    /// Print a stored service instance record
    ShowInstance { instance_id: String },
    /// Print a stored binding record (credentials included)
    ShowBinding { binding_id: String },
    /// Print the connection string a binding would receive
    ConnectionString {
        /// Cluster connection string to derive from
        #[arg(long, env = "ATLAS_ENDPOINT", hide_env_values = true)]
        endpoint: String,

        #[arg(long)]
        database: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,
    },
}
