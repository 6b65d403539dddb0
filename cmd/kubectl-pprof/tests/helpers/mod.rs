// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use kubectl_pprof::PortForwardError;
use kubectl_pprof::portforward::Dialer;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A pprof endpoint stand-in answering every request with a fixed status
/// and body. Records the path and query of each request it sees.
pub struct PprofServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    received: Arc<Notify>,
    shutdown: CancellationToken,
}

impl PprofServer {
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        Self::serve(Some((status, body))).await
    }

    /// Records requests but never answers them.
    pub async fn start_stalled() -> Self {
        Self::serve(None).await
    }

    async fn serve(reply: Option<(StatusCode, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test server");
        let addr = listener.local_addr().expect("test server has no address");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let seen = Arc::clone(&requests);
        let notify = Arc::clone(&received);
        let stop = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = stop.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => break,
                    },
                };
                let seen = Arc::clone(&seen);
                let notify = Arc::clone(&notify);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let seen = Arc::clone(&seen);
                        let notify = Arc::clone(&notify);
                        async move {
                            let uri = req
                                .uri()
                                .path_and_query()
                                .map(|pq| pq.to_string())
                                .unwrap_or_default();
                            seen.lock().unwrap().push(uri);
                            notify.notify_one();
                            let Some((status, body)) = reply else {
                                return std::future::pending().await;
                            };
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                        }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            addr,
            requests,
            received,
            shutdown,
        }
    }

    /// Resolves once the server has seen a request.
    pub async fn wait_for_request(&self) {
        self.received.notified().await;
    }

    /// Path and query of every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn url(&self) -> reqwest::Url {
        reqwest::Url::parse(&format!("http://{}", self.addr)).unwrap()
    }
}

impl Drop for PprofServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Dials a local TCP address in place of a pod's port-forward subresource.
#[derive(Clone)]
pub struct TcpDialer {
    pub addr: SocketAddr,
}

impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, _remote_port: u16) -> Result<TcpStream, PortForwardError> {
        TcpStream::connect(self.addr)
            .await
            .map_err(|e| PortForwardError::Dial {
                target: self.addr.to_string(),
                source: Box::new(e),
            })
    }

    async fn relay(
        &self,
        mut conn: TcpStream,
        remote_port: u16,
        mut local: TcpStream,
    ) -> Result<(), PortForwardError> {
        tokio::io::copy_bidirectional(&mut local, &mut conn)
            .await
            .map(|_| ())
            .map_err(|e| PortForwardError::Forward {
                port: remote_port,
                reason: e.to_string(),
            })
    }
}

/// An address nothing is listening on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
