//! Stratus table administration CLI
//!
//! Creates, inspects and removes the DynamoDB tables behind Stratus tenants.
//!
//! # Usage
//!
//! ```bash
//! # Create a dedicated table for a tenant
//! stratus-tables create --tenant acme --read-capacity 10 --write-capacity 5
//!
//! # Create the table shared by all shared tenants
//! stratus-tables create-shared
//!
//! # Remove every row of a shared tenant
//! stratus-tables purge-shared-tenant --tenant " acme"
//!
//! # Against DynamoDB Local
//! STRATUS_ENDPOINT=http://localhost:8000 stratus-tables exists --tenant acme
//! ```
//!
//! # Environment Variables
//!
//! - `STRATUS_REGION` - Primary AWS region (default: us-east-1)
//! - `STRATUS_ENDPOINT` - Endpoint override
//! - `STRATUS_TABLE_PREFIX` - Prefix of dedicated table names (default: stratus)
//! - `STRATUS_ROOT_TENANT` - Root tenant id (default: stratus)
//! - `STRATUS_SHARED_TABLE` - Shared table name (default: stratus-shared)
//! - `STRATUS_REPLICA_REGIONS` - Comma-separated replica regions
//! - `STRATUS_PITR` - Enable point-in-time recovery on new tables
//! - `STRATUS_LOG_LEVEL` - Log level when `RUST_LOG` is unset (default: info)

use anyhow::Context;
use clap::{Parser, Subcommand};
use stratus_persistence::backends::dynamodb::{DynamoDbBackend, DynamoDbConfig};
use stratus_persistence::core::TableLifecycle;
use stratus_persistence::tenant::{RoutingConfig, TenantId};
use tracing::info;

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "stratus-tables")]
#[command(about = "Stratus DynamoDB table administration")]
struct Cli {
    /// Primary AWS region.
    #[arg(long, env = "STRATUS_REGION", default_value = "us-east-1")]
    region: String,

    /// Endpoint override, for example DynamoDB Local.
    #[arg(long, env = "STRATUS_ENDPOINT")]
    endpoint: Option<String>,

    /// Prefix of dedicated table names.
    #[arg(long, env = "STRATUS_TABLE_PREFIX", default_value = "stratus")]
    table_prefix: String,

    /// Root tenant id.
    #[arg(long, env = "STRATUS_ROOT_TENANT", default_value = "stratus")]
    root_tenant: String,

    /// Name of the shared table.
    #[arg(long, env = "STRATUS_SHARED_TABLE", default_value = "stratus-shared")]
    shared_table: String,

    /// Regions replicating every dedicated table.
    #[arg(long, env = "STRATUS_REPLICA_REGIONS", value_delimiter = ',')]
    replica_regions: Vec<String>,

    /// Enable point-in-time recovery on created tables.
    #[arg(long, env = "STRATUS_PITR", default_value = "false")]
    point_in_time_recovery: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "STRATUS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether a tenant's table exists.
    Exists {
        #[arg(long)]
        tenant: String,
    },
    /// Create a tenant's dedicated table.
    Create {
        #[arg(long)]
        tenant: String,
        #[arg(long, default_value = "10")]
        read_capacity: i64,
        #[arg(long, default_value = "5")]
        write_capacity: i64,
    },
    /// Delete a tenant's dedicated table and its replicas.
    Delete {
        #[arg(long)]
        tenant: String,
    },
    /// Create the table holding all shared tenants.
    CreateShared {
        #[arg(long, default_value = "10")]
        read_capacity: i64,
        #[arg(long, default_value = "5")]
        write_capacity: i64,
    },
    /// Delete every row of a shared tenant.
    PurgeSharedTenant {
        #[arg(long)]
        tenant: String,
    },
}

impl Cli {
    fn backend_config(&self) -> DynamoDbConfig {
        let mut config = DynamoDbConfig::default()
            .with_region(self.region.clone())
            .with_routing(RoutingConfig {
                table_prefix: self.table_prefix.clone(),
                root_tenant: self.root_tenant.clone(),
                shared_table: self.shared_table.clone(),
                ..Default::default()
            })
            .with_replica_regions(self.replica_regions.clone());
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        config.point_in_time_recovery = self.point_in_time_recovery;
        config
    }
}

/// Installs the tracing subscriber.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("stratus_persistence={level},stratus_tables={level}")));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let backend = DynamoDbBackend::new(cli.backend_config())
        .context("invalid DynamoDB configuration")?;
    info!(region = %cli.region, command = ?cli.command, "running table command");

    match cli.command {
        Command::Exists { tenant } => {
            let exists = backend.table_exists(&TenantId::new(tenant)).await?;
            println!("{exists}");
        }
        Command::Create {
            tenant,
            read_capacity,
            write_capacity,
        } => {
            let created = backend
                .create_table(&TenantId::new(tenant), read_capacity, write_capacity)
                .await?;
            backend.wait_for_replication().await;
            println!("{created}");
        }
        Command::Delete { tenant } => {
            let deleted = backend.delete_table(&TenantId::new(tenant)).await?;
            println!("{deleted}");
        }
        Command::CreateShared {
            read_capacity,
            write_capacity,
        } => {
            let created = backend
                .create_shared_table(read_capacity, write_capacity)
                .await?;
            println!("{created}");
        }
        Command::PurgeSharedTenant { tenant } => {
            let deleted = backend
                .delete_all_for_tenant(&TenantId::new(tenant))
                .await?;
            println!("{deleted}");
        }
    }
    Ok(())
}
