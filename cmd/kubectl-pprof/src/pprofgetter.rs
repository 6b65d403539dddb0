// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::path::Path;

use log::debug;
use reqwest::{Client, StatusCode, Url};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;
use crate::profile::ProfileKind;

#[derive(Debug, Default, Clone)]
pub struct FetcherConfig {
    /// Scheme, host and port of the pprof server, e.g. `http://localhost:8080`.
    pub host_url: Option<Url>,
    /// Shared HTTP client. One is built when absent.
    pub client: Option<Client>,
}

/// Downloads profiles from a pprof HTTP endpoint.
#[derive(Debug, Clone)]
pub struct ProfileFetcher {
    host_url: Url,
    client: Client,
}

impl ProfileFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let host_url = config.host_url.ok_or(FetchError::MissingHostUrl)?;
        if host_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl(host_url.to_string()));
        }

        let client = match config.client {
            Some(client) => client,
            None => default_client()?,
        };

        Ok(Self { host_url, client })
    }

    pub fn host_url(&self) -> &Url {
        &self.host_url
    }

    /// URL serving `kind`, with `seconds` always passed in the query even for
    /// kinds the server snapshots instantly.
    pub fn profile_url(&self, kind: ProfileKind, seconds: u64) -> Url {
        let mut url = self.host_url.clone();
        let base = self.host_url.path().trim_end_matches('/');
        url.set_path(&format!("{base}{}", kind.endpoint_path()));
        url.set_query(Some(&format!("seconds={seconds}")));
        url
    }

    /// Collect one profile and stream it to `destination`.
    ///
    /// Only a 200 response is written. The destination is truncated if it
    /// exists; a partially written file is left in place if the copy fails.
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        kind: ProfileKind,
        seconds: u64,
        destination: &Path,
    ) -> Result<(), FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_to_file(kind, seconds, destination) => result,
        }
    }

    async fn fetch_to_file(
        &self,
        kind: ProfileKind,
        seconds: u64,
        destination: &Path,
    ) -> Result<(), FetchError> {
        let url = self.profile_url(kind, seconds);
        debug!("requesting {url}");

        let mut response =
            self.client
                .get(url.clone())
                .send()
                .await
                .map_err(|source| FetchError::Request {
                    url: url.to_string(),
                    source,
                })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::EndpointFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(destination)
            .await
            .map_err(|source| FetchError::CreateFile {
                path: destination.to_path_buf(),
                source,
            })?;
        let write_err = |source: std::io::Error| FetchError::WriteFile {
            path: destination.to_path_buf(),
            source,
        };

        let mut written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| FetchError::ReadBody {
                url: url.to_string(),
                source,
            })?
        {
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;

        debug!("wrote {written} bytes to {}", destination.display());
        Ok(())
    }
}

/// Client used for profile collection. No request timeout is set: CPU
/// profiles block server-side for the requested duration.
pub fn default_client() -> Result<Client, FetchError> {
    Client::builder()
        .no_proxy()
        .build()
        .map_err(FetchError::Client)
}
