// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use clap::Args;
use kube::Config;
use kube::config::{KubeConfigOptions, Kubeconfig};
use log::debug;

use crate::errors::ConfigError;

/// Cluster selection flags, mirroring the ones `kubectl` accepts.
#[derive(Debug, Default, Clone, Args)]
pub struct KubeConfigFlags {
    /// If present, the namespace scope for this request
    #[arg(short = 'n', long)]
    pub namespace: Option<String>,

    /// Path to the kubeconfig file to use
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// The name of the kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,

    /// The name of the kubeconfig cluster to use
    #[arg(long)]
    pub cluster: Option<String>,

    /// The name of the kubeconfig user to use
    #[arg(long)]
    pub user: Option<String>,
}

impl KubeConfigFlags {
    fn options(&self) -> KubeConfigOptions {
        KubeConfigOptions {
            context: self.context.clone(),
            cluster: self.cluster.clone(),
            user: self.user.clone(),
        }
    }

    fn has_overrides(&self) -> bool {
        self.context.is_some() || self.cluster.is_some() || self.user.is_some()
    }
}

/// Credentials and target namespace resolved from the ambient configuration.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub kube_config: Config,
    pub namespace: String,
}

/// Resolve cluster credentials and namespace.
///
/// An explicit `--kubeconfig` is read as-is. Without one, context/cluster/user
/// overrides are applied to the default kubeconfig, and with no flags at all
/// the configuration is inferred (kubeconfig first, then in-cluster).
pub async fn load(flags: &KubeConfigFlags) -> Result<ClusterConfig, ConfigError> {
    let kube_config = if let Some(path) = &flags.kubeconfig {
        debug!("reading kubeconfig from {}", path.display());
        let kubeconfig = Kubeconfig::read_from(path).map_err(ConfigError::Kubeconfig)?;
        Config::from_custom_kubeconfig(kubeconfig, &flags.options())
            .await
            .map_err(ConfigError::Kubeconfig)?
    } else if flags.has_overrides() {
        Config::from_kubeconfig(&flags.options())
            .await
            .map_err(ConfigError::Kubeconfig)?
    } else {
        Config::infer().await.map_err(ConfigError::Infer)?
    };

    let namespace = flags
        .namespace
        .clone()
        .unwrap_or_else(|| kube_config.default_namespace.clone());
    debug!(
        "using cluster {} in namespace {}",
        kube_config.cluster_url, namespace
    );

    Ok(ClusterConfig {
        kube_config,
        namespace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: dev
  cluster:
    server: https://10.1.2.3:6443
- name: staging
  cluster:
    server: https://10.9.9.9:6443
contexts:
- name: dev
  context:
    cluster: dev
    user: dev
    namespace: profiling
- name: staging
  context:
    cluster: staging
    user: dev
current-context: dev
users:
- name: dev
  user:
    token: not-a-real-token
"#;

    fn write_kubeconfig(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("config");
        fs::write(&path, KUBECONFIG).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_uses_context_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let flags = KubeConfigFlags {
            kubeconfig: Some(write_kubeconfig(&dir)),
            ..Default::default()
        };

        let cluster = load(&flags).await.unwrap();
        assert_eq!(cluster.namespace, "profiling");
        assert_eq!(cluster.kube_config.cluster_url.host(), Some("10.1.2.3"));
    }

    #[tokio::test]
    async fn test_load_namespace_flag_wins() {
        let dir = tempfile::tempdir().unwrap();
        let flags = KubeConfigFlags {
            kubeconfig: Some(write_kubeconfig(&dir)),
            namespace: Some("payments".to_string()),
            ..Default::default()
        };

        let cluster = load(&flags).await.unwrap();
        assert_eq!(cluster.namespace, "payments");
    }

    #[tokio::test]
    async fn test_load_context_override() {
        let dir = tempfile::tempdir().unwrap();
        let flags = KubeConfigFlags {
            kubeconfig: Some(write_kubeconfig(&dir)),
            context: Some("staging".to_string()),
            ..Default::default()
        };

        let cluster = load(&flags).await.unwrap();
        assert_eq!(cluster.kube_config.cluster_url.host(), Some("10.9.9.9"));
        assert_eq!(cluster.namespace, "default");
    }

    #[tokio::test]
    async fn test_load_missing_kubeconfig_file() {
        let dir = tempfile::tempdir().unwrap();
        let flags = KubeConfigFlags {
            kubeconfig: Some(dir.path().join("missing")),
            ..Default::default()
        };

        let err = load(&flags).await.unwrap_err();
        assert!(matches!(err, ConfigError::Kubeconfig(_)));
    }
}
