mod cli;

use anyhow::Context;
use atlas_broker::broker::{
    CreateServiceInstanceBindingRequest, CreateServiceInstanceRequest,
    DeleteServiceInstanceBindingRequest, DeleteServiceInstanceRequest,
    GetLastServiceOperationRequest, UpdateServiceInstanceRequest,
};
use atlas_broker::state::Parameters;
use atlas_broker::{
    build_connection_string, Broker, BrokerConfig, Error as BrokerError,
    ServiceInstanceBindingService, ServiceInstanceService,
};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use serde_json::json;
use std::path::Path;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(broker_error) = e.downcast_ref::<BrokerError>() {
            eprintln!("Error: {}", broker_error);
            if let Some(suggestion) = broker_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
            // Conflicts and missing records are the caller's problem.
            std::process::exit(if broker_error.is_client_error() { 2 } else { 1 });
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    // Needs no config beyond the endpoint.
    if let Commands::ConnectionString {
        endpoint,
        database,
        username,
        password,
    } = &cli.command
    {
        let uri = build_connection_string(endpoint, database, username, password)?;
        println!("{}", uri);
        return Ok(());
    }

    let mut config = load_config(cli.env_file.as_deref())?;
    if let Some(state_db) = cli.state_db {
        config.state_db = state_db;
    }
    tracing::debug!("Loaded {:?}", config);

    let broker = Broker::builder().config(config).build().await?;
    let result = dispatch(&broker, cli.command).await;
    broker.shutdown().await;
    result
}

async fn dispatch(broker: &Broker, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Provision {
            instance_id,
            service_definition_id,
            plan_id,
            organization_guid,
            space_guid,
            params,
        } => {
            let response = broker
                .instances()
                .create_instance(CreateServiceInstanceRequest {
                    service_instance_id: instance_id,
                    service_definition_id,
                    plan_id,
                    organization_guid,
                    space_guid,
                    parameters: parse_params(params.as_deref())?,
                })
                .await?;
            print_json(&response)
        }
        Commands::Update {
            instance_id,
            service_definition_id,
            plan_id,
            params,
        } => {
            let response = broker
                .instances()
                .update_instance(UpdateServiceInstanceRequest {
                    service_instance_id: instance_id,
                    service_definition_id,
                    plan_id,
                    parameters: parse_params(params.as_deref())?,
                })
                .await?;
            print_json(&response)
        }
        Commands::Deprovision { instance_id } => {
            let response = broker
                .instances()
                .delete_instance(DeleteServiceInstanceRequest {
                    service_instance_id: instance_id,
                    service_definition_id: None,
                    plan_id: None,
                })
                .await?;
            print_json(&response)
        }
        Commands::LastOperation { instance_id } => {
            let response = broker
                .instances()
                .get_last_operation(GetLastServiceOperationRequest {
                    service_instance_id: instance_id,
                })
                .await?;
            print_json(&response)
        }
        Commands::Bind {
            instance_id,
            binding_id,
            bound_app_guid,
        } => {
            let response = broker
                .bindings()
                .create_binding(CreateServiceInstanceBindingRequest {
                    service_instance_id: instance_id,
                    binding_id,
                    service_definition_id: None,
                    plan_id: None,
                    bound_app_guid,
                })
                .await?;
            print_json(&response)
        }
        Commands::Unbind {
            instance_id,
            binding_id,
        } => {
            broker
                .bindings()
                .delete_binding(DeleteServiceInstanceBindingRequest {
                    service_instance_id: instance_id,
                    binding_id: binding_id.clone(),
                })
                .await?;
            print_json(&json!({ "binding_id": binding_id, "deleted": true }))
        }
        Commands::ShowInstance { instance_id } => {
            let instance = broker
                .instances()
                .get_instance(&instance_id)
                .await?
                .ok_or(BrokerError::InstanceNotFound(instance_id))?;
            print_json(&instance)
        }
        Commands::ShowBinding { binding_id } => {
            let binding = broker
                .bindings()
                .get_binding(&binding_id)
                .await?
                .ok_or(BrokerError::BindingNotFound(binding_id))?;
            print_json(&binding)
        }
        Commands::ConnectionString { .. } => unreachable!("handled before config is loaded"),
    }
}

fn load_config(env_file: Option<&Path>) -> anyhow::Result<BrokerConfig> {
    let config = match env_file {
        Some(path) => BrokerConfig::from_env_file(path)?,
        None if Path::new(".env").is_file() => BrokerConfig::from_env_file(Path::new(".env"))?,
        None => BrokerConfig::from_env()?,
    };
    Ok(config)
}

fn parse_params(params: Option<&str>) -> anyhow::Result<Option<Parameters>> {
    params
        .map(|raw| serde_json::from_str::<Parameters>(raw).context("--params must be a JSON object"))
        .transpose()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
