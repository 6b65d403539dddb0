// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, error};
use reqwest::Url;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::config::{self, KubeConfigFlags};
use crate::errors::{ConfigError, PortForwardError};
use crate::portforward::{PortForwardConfig, PortForwarder, TunnelHandle};
use crate::pprofgetter::{FetcherConfig, ProfileFetcher};
use crate::profile::ProfileKind;

pub const DEFAULT_PROFILE_SECONDS: u64 = 10;
pub const DEFAULT_PPROF_PORT: u16 = 8080;

const EXAMPLES: &str = "\
Examples:
  # collect a heap profile from a pod
  kubectl pprof <pod name> --profile heap --seconds 10

  # collect a cpu profile and output profile to /tmp/
  kubectl pprof <pod name> --port 8080 -n <namespace> --profile cpu --output /tmp/ --seconds 30

  # pass a profile directly to go tool pprof (suppress output with -q)
  kubectl pprof <pod> --port 8080 -n <namespace> --profile cpu -q | xargs go tool pprof -http=:8080
";

#[derive(Debug, Parser)]
#[command(
    name = "kubectl-pprof",
    version,
    about = "Collects the specified pprof profile from a pod",
    after_help = EXAMPLES
)]
pub struct PprofArgs {
    /// Pod to collect the profile from
    #[arg(value_name = "POD")]
    pub pods: Vec<String>,

    /// Type of profile to collect (heap, cpu, block, goroutine, mutex, or threadcreate)
    #[arg(long, default_value = "cpu")]
    pub profile: String,

    /// Amount of seconds to collect the profile
    #[arg(long, default_value_t = DEFAULT_PROFILE_SECONDS)]
    pub seconds: u64,

    /// pprof port
    #[arg(long, default_value_t = DEFAULT_PPROF_PORT)]
    pub port: u16,

    /// Path to a directory to write the profile
    #[arg(long, default_value = "./")]
    pub output: PathBuf,

    /// Suppresses output and only prints the output file
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    #[command(flatten)]
    pub kube: KubeConfigFlags,
}

impl PprofArgs {
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// Check everything that can be checked without talking to the cluster.
    pub fn validate(&self) -> Result<Invocation, ConfigError> {
        let [pod] = self.pods.as_slice() else {
            return Err(ConfigError::InvalidArgCount(self.pods.len()));
        };
        let profile: ProfileKind = self.profile.parse()?;

        let metadata =
            std::fs::metadata(&self.output).map_err(|source| ConfigError::OutputDir {
                path: self.output.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(ConfigError::NotADirectory(self.output.clone()));
        }

        Ok(Invocation {
            pod: pod.clone(),
            profile,
            seconds: self.seconds,
            port: self.port,
            out_dir: self.output.clone(),
            quiet: self.quiet,
        })
    }
}

/// A validated profile collection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub pod: String,
    pub profile: ProfileKind,
    pub seconds: u64,
    pub port: u16,
    pub out_dir: PathBuf,
    pub quiet: bool,
}

impl Invocation {
    /// `<pod>_<profile>_<unix timestamp>.out` inside the output directory.
    pub fn output_path(&self, timestamp: i64) -> PathBuf {
        output_file_path(&self.out_dir, &self.pod, self.profile, timestamp)
    }
}

pub fn output_file_path(
    out_dir: &Path,
    pod: &str,
    profile: ProfileKind,
    timestamp: i64,
) -> PathBuf {
    out_dir.join(format!("{pod}_{profile}_{timestamp}.out"))
}

/// Validate, resolve the cluster, open the tunnel and collect the profile with
/// `client`. Returns the path of the written profile.
pub async fn run<W: Write>(
    args: &PprofArgs,
    client: reqwest::Client,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<PathBuf> {
    let invocation = args.validate()?;

    let cluster = config::load(&args.kube)
        .await
        .context("failed to resolve cluster configuration")?;

    let forwarder = PortForwarder::new(PortForwardConfig {
        kube_config: Some(cluster.kube_config),
        progress: !invocation.quiet,
    })
    .context("failed to get port-forwarder")?;

    let tunnel = forwarder
        .establish(cancel, &cluster.namespace, &invocation.pod, invocation.port)
        .await
        .context("port-forwarding failed")?;

    collect_over_tunnel(&invocation, tunnel, client, cancel, out).await
}

/// Collect the profile through an established tunnel, then stop the tunnel
/// whatever the outcome.
pub async fn collect_over_tunnel<W: Write>(
    invocation: &Invocation,
    tunnel: TunnelHandle,
    client: reqwest::Client,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<PathBuf> {
    let fetched = collect(invocation, tunnel.local_addr(), client, cancel, out).await;
    let stopped = tunnel.stop().await;

    let path = settle(fetched, stopped)?;
    writeln!(out, "{}", path.display()).context("failed to output profile filename")?;
    Ok(path)
}

/// Combine the fetch and teardown outcomes. A teardown failure fails an
/// otherwise successful collection; after a failed fetch it is logged and the
/// fetch error wins.
fn settle(
    fetched: Result<PathBuf>,
    stopped: Result<(), PortForwardError>,
) -> Result<PathBuf> {
    match (fetched, stopped) {
        (Ok(path), Ok(())) => Ok(path),
        (Ok(_), Err(e)) => Err(e).context("failed to stop port-forward"),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(stop_err)) => {
            error!("failed to stop port-forward: {stop_err}");
            Err(e)
        }
    }
}

async fn collect<W: Write>(
    invocation: &Invocation,
    local_addr: SocketAddr,
    client: reqwest::Client,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<PathBuf> {
    if !invocation.quiet {
        writeln!(
            out,
            "collecting profile from {} (for {} secs)...",
            invocation.pod, invocation.seconds
        )
        .context("failed to write to output")?;
    }

    let path = invocation.output_path(OffsetDateTime::now_utc().unix_timestamp());
    let host_url = Url::parse(&format!("http://{local_addr}"))
        .context("failed to build pprof host url")?;
    debug!("collecting {} profile into {}", invocation.profile, path.display());

    let fetcher = ProfileFetcher::new(FetcherConfig {
        host_url: Some(host_url),
        client: Some(client),
    })
    .context("failed to build pprof getter")?;

    fetcher
        .fetch(cancel, invocation.profile, invocation.seconds, &path)
        .await
        .context("failed to collect profile")?;

    Ok(path)
}
