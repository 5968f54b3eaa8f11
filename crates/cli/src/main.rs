//! Hybrid scaler CLI
//!
//! Previews profile selection for a service, lists rollover progress
//! and prints the TrafficStat CRD.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{crd, plan, status};
use std::path::PathBuf;

/// Knative hybrid scaler CLI
#[derive(Parser)]
#[command(name = "hsctl")]
#[command(author, version, about = "CLI for the Knative hybrid scaler", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show every candidate profile for a traffic volume and the one that wins
    Plan {
        /// Knative service name
        service: String,

        /// Expected concurrent requests
        #[arg(long, short)]
        traffic: f64,

        /// Read the catalog from a JSON file instead of the cluster
        #[arg(long, conflicts_with = "namespace")]
        file: Option<PathBuf>,

        /// Namespace holding the service's catalog ConfigMap
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// List scaling requests and their rollover progress
    Status {
        /// Filter by namespace (all namespaces if not specified)
        #[arg(long, short)]
        namespace: Option<String>,
    },

    /// Print the TrafficStat CustomResourceDefinition
    Crd,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            service,
            traffic,
            file,
            namespace,
        } => {
            let catalog = match file {
                Some(path) => plan::catalog_from_file(&path)?,
                None => {
                    let client = config::client(cli.kubeconfig.as_deref()).await?;
                    let namespace = namespace.unwrap_or_else(|| config::DEFAULT_NAMESPACE.to_string());
                    plan::catalog_from_cluster(client, &namespace, &service).await?
                }
            };
            plan::show_plan(&service, traffic, &catalog, cli.format)?;
        }
        Commands::Status { namespace } => {
            let client = config::client(cli.kubeconfig.as_deref()).await?;
            status::show_status(client, namespace.as_deref(), cli.format).await?;
        }
        Commands::Crd => {
            crd::print_crd()?;
        }
    }

    Ok(())
}
