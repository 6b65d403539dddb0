// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Local port-forward to a single pod port.
//!
//! A tunnel is a background session that owns an ephemeral local listener and
//! relays every accepted connection to the remote port over an upgraded
//! connection to the API server. The session is bound to a cancellation token
//! held by the [`TunnelHandle`]; [`TunnelHandle::stop`] waits for the listener
//! and all in-flight relays to be released.

use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};

use k8s_openapi::api::core::v1::Pod;
use kube::api::Portforwarder;
use kube::{Api, Client, Config};
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::errors::PortForwardError;

/// Opens upgraded connections to a remote port and relays local sockets
/// over them.
pub trait Dialer: Clone + Send + Sync + 'static {
    /// A negotiated connection able to carry one relayed socket.
    type Conn: Send + 'static;

    /// Negotiate a new connection to `remote_port`.
    fn dial(
        &self,
        remote_port: u16,
    ) -> impl Future<Output = Result<Self::Conn, PortForwardError>> + Send;

    /// Copy bytes between `local` and `conn` until either side closes.
    fn relay(
        &self,
        conn: Self::Conn,
        remote_port: u16,
        local: TcpStream,
    ) -> impl Future<Output = Result<(), PortForwardError>> + Send;
}

/// Dials the `portforward` subresource of a pod through the API server.
#[derive(Clone)]
pub struct PodDialer {
    pods: Api<Pod>,
    pod: String,
    target: String,
}

impl PodDialer {
    pub fn new(client: Client, target: &Target) -> Self {
        Self {
            pods: Api::namespaced(client, &target.namespace),
            pod: target.pod.clone(),
            target: target.to_string(),
        }
    }
}

impl Dialer for PodDialer {
    type Conn = Portforwarder;

    async fn dial(&self, remote_port: u16) -> Result<Portforwarder, PortForwardError> {
        self.pods
            .portforward(&self.pod, &[remote_port])
            .await
            .map_err(|e| PortForwardError::Dial {
                target: self.target.clone(),
                source: Box::new(e),
            })
    }

    async fn relay(
        &self,
        mut conn: Portforwarder,
        remote_port: u16,
        mut local: TcpStream,
    ) -> Result<(), PortForwardError> {
        let mut upstream =
            conn.take_stream(remote_port)
                .ok_or_else(|| PortForwardError::Forward {
                    port: remote_port,
                    reason: "port not found in forwarder".to_string(),
                })?;
        let copied = tokio::io::copy_bidirectional(&mut local, &mut upstream).await;
        drop(upstream);
        let joined = conn.join().await;

        copied.map_err(|e| PortForwardError::Forward {
            port: remote_port,
            reason: e.to_string(),
        })?;
        joined.map_err(|e| PortForwardError::Forward {
            port: remote_port,
            reason: e.to_string(),
        })
    }
}

/// The pod a tunnel points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub namespace: String,
    pub pod: String,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PortForwardConfig {
    /// Cluster credentials, including the API server URL.
    pub kube_config: Option<Config>,
    /// Log forwarding progress at info level, as `kubectl port-forward` prints it.
    pub progress: bool,
}

#[derive(Clone)]
pub struct PortForwarder {
    host: String,
    client: Client,
    progress: bool,
}

impl PortForwarder {
    /// Builds the cluster client from the credentials. Must be called from
    /// within a tokio runtime.
    pub fn new(config: PortForwardConfig) -> Result<Self, PortForwardError> {
        let kube_config = config.kube_config.ok_or(PortForwardError::MissingConfig)?;
        let host = kube_config.cluster_url.to_string();
        let client = Client::try_from(kube_config).map_err(PortForwardError::Client)?;
        Ok(Self {
            host,
            client,
            progress: config.progress,
        })
    }

    /// API server the tunnel is negotiated through.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Forward a local ephemeral port to `remote_port` on `pod`.
    ///
    /// Returns once the local listener is bound and the first upgraded
    /// connection has been negotiated, or with the first setup error.
    pub async fn establish(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        pod: &str,
        remote_port: u16,
    ) -> Result<TunnelHandle, PortForwardError> {
        if namespace.is_empty() || pod.is_empty() {
            return Err(PortForwardError::InvalidTarget {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
            });
        }
        if remote_port == 0 {
            return Err(PortForwardError::InvalidPort(remote_port));
        }

        let target = Target {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
        };
        debug!("port-forwarding to {target} through {}", self.host);

        let listener = bind_ephemeral().await?;
        let dialer = PodDialer::new(self.client.clone(), &target);
        forward_listener(dialer, listener, cancel, target, remote_port, self.progress).await
    }
}

impl fmt::Debug for PortForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortForwarder")
            .field("host", &self.host)
            .field("progress", &self.progress)
            .finish()
    }
}

async fn bind_ephemeral() -> Result<TcpListener, PortForwardError> {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .map_err(PortForwardError::Bind)
}

/// Bind an ephemeral local port and start a forwarding session using `dialer`,
/// reporting progress.
///
/// The session is stopped when `cancel` (or the returned handle) is cancelled.
pub async fn forward_ports<D: Dialer>(
    dialer: D,
    cancel: &CancellationToken,
    target: Target,
    remote_port: u16,
) -> Result<TunnelHandle, PortForwardError> {
    let listener = bind_ephemeral().await?;
    forward_listener(dialer, listener, cancel, target, remote_port, true).await
}

/// Start a forwarding session on an already bound `listener`. The listener is
/// closed once the session ends, including when setup fails or is cancelled.
pub async fn forward_listener<D: Dialer>(
    dialer: D,
    listener: TcpListener,
    cancel: &CancellationToken,
    target: Target,
    remote_port: u16,
    progress: bool,
) -> Result<TunnelHandle, PortForwardError> {
    let local_addr = listener.local_addr().map_err(PortForwardError::Bind)?;

    let session_cancel = cancel.child_token();
    let (ready_tx, ready_rx) = oneshot::channel();
    let task = tokio::spawn(run_session(
        dialer,
        listener,
        remote_port,
        progress,
        ready_tx,
        session_cancel.clone(),
    ));

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            session_cancel.cancel();
            let _ = task.await;
            Err(PortForwardError::Cancelled)
        }
        ready = ready_rx => match ready {
            Ok(()) => {
                if progress {
                    info!("Forwarding from {local_addr} -> {remote_port}");
                }
                Ok(TunnelHandle {
                    local_addr,
                    remote_port,
                    target,
                    cancel: session_cancel,
                    task: Some(task),
                })
            }
            // The session dropped the readiness sender without firing it.
            Err(_) => match task.await {
                Ok(Err(e)) => Err(e),
                Ok(Ok(())) => Err(PortForwardError::Closed),
                Err(e) => Err(PortForwardError::Panicked(e.to_string())),
            },
        },
    }
}

async fn run_session<D: Dialer>(
    dialer: D,
    listener: TcpListener,
    remote_port: u16,
    progress: bool,
    ready: oneshot::Sender<()>,
    cancel: CancellationToken,
) -> Result<(), PortForwardError> {
    let first = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        conn = dialer.dial(remote_port) => conn?,
    };
    if ready.send(()).is_err() {
        return Ok(());
    }

    let mut primed = Some(first);
    let mut relays: JoinSet<Result<(), PortForwardError>> = JoinSet::new();

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            Some(done) = relays.join_next() => match done {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{e}"),
                Err(e) => warn!("relay task for remote port {remote_port} failed: {e}"),
            },
            accepted = listener.accept() => {
                let (local, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => break Err(PortForwardError::Accept(e)),
                };
                if progress {
                    info!("Handling connection for {remote_port}");
                }
                debug!("accepted local connection from {peer}");

                let dialer = dialer.clone();
                let conn = primed.take();
                relays.spawn(async move {
                    let conn = match conn {
                        Some(conn) => conn,
                        None => dialer.dial(remote_port).await?,
                    };
                    dialer.relay(conn, remote_port, local).await
                });
            }
        }
    };

    drop(listener);
    relays.shutdown().await;
    debug!("port-forward session for remote port {remote_port} stopped");
    result
}

/// A live tunnel. Call [`TunnelHandle::stop`] when done with it; dropping the
/// handle cancels the session without waiting for it.
pub struct TunnelHandle {
    local_addr: SocketAddr,
    remote_port: u16,
    target: Target,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), PortForwardError>>>,
}

impl TunnelHandle {
    pub fn local_port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Stop the session and wait until the local listener is closed.
    pub async fn stop(mut self) -> Result<(), PortForwardError> {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => Err(PortForwardError::Panicked(e.to_string())),
            },
            None => Ok(()),
        }
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for TunnelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelHandle")
            .field("local_addr", &self.local_addr)
            .field("remote_port", &self.remote_port)
            .field("target", &self.target)
            .finish()
    }
}
