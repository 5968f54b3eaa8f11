//! Cluster connection settings for the CLI

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("KUBECONFIG") {
        return Ok(PathBuf::from(path));
    }

    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".kube").join("config"))
}

/// Build a client from the kubeconfig, falling back to in-cluster settings
/// when no kubeconfig file exists
pub async fn client(override_path: Option<&str>) -> Result<Client> {
    let path = kubeconfig_path(override_path)?;
    if !path.exists() {
        if override_path.is_some() {
            anyhow::bail!("kubeconfig {} does not exist", path.display());
        }
        return Client::try_default()
            .await
            .context("Failed to build in-cluster client");
    }

    let kubeconfig = Kubeconfig::read_from(&path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to load kubeconfig")?;
    Client::try_from(config).context("Failed to build Kubernetes client")
}
