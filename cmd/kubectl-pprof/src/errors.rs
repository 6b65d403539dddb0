// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::PathBuf;

use kube::config::{InferConfigError, KubeconfigError};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Argument and cluster configuration errors. These are raised before any
/// tunnel is attempted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid number of arguments ({0}), use --help to see example usage")]
    InvalidArgCount(usize),

    #[error("must select type of profile to collect")]
    EmptyProfile,

    #[error("unknown profile: {0}")]
    UnknownProfile(String),

    #[error("failed to check if --output is a dir: {}", .path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("--output flag must be set to a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to load kubeconfig")]
    Kubeconfig(#[source] KubeconfigError),

    #[error("failed to infer cluster configuration")]
    Infer(#[source] InferConfigError),
}

#[derive(Error, Debug)]
pub enum PortForwardError {
    #[error("cluster configuration cannot be empty")]
    MissingConfig,

    #[error("failed to build cluster client")]
    Client(#[source] kube::Error),

    #[error("namespace and pod must be set (namespace: {namespace:?}, pod: {pod:?})")]
    InvalidTarget { namespace: String, pod: String },

    #[error("invalid remote port: {0}")]
    InvalidPort(u16),

    #[error("failed to find free port on host")]
    Bind(#[source] std::io::Error),

    #[error("port-forward to {target} failed")]
    Dial {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to accept local connection")]
    Accept(#[source] std::io::Error),

    #[error("error forwarding connection to remote port {port}: {reason}")]
    Forward { port: u16, reason: String },

    #[error("port-forward session exited before becoming ready")]
    Closed,

    #[error("port-forward session panicked: {0}")]
    Panicked(String),

    #[error("port-forward cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("url cannot be empty")]
    MissingHostUrl,

    #[error("url cannot be used as a base for profile paths: {0}")]
    InvalidUrl(String),

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("profile endpoint failed {url}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint was reached but answered with something other than 200.
    #[error("{url} returned status code {status}: pprof endpoint failed")]
    EndpointFailed { url: String, status: u16 },

    #[error("failed to read profile body from {url}")]
    ReadBody {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unable to create file {}", .path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write profile to file {}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile collection cancelled")]
    Cancelled,
}

impl FetchError {
    /// True when the server was reached and rejected the request, as opposed
    /// to the server being unreachable.
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(self, FetchError::EndpointFailed { .. })
    }
}
