// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use kubectl_pprof::cmd::{self, PprofArgs};
use kubectl_pprof::pprofgetter;
use log::{LevelFilter, debug, info};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

fn init_logging(level: LevelFilter) -> Result<()> {
    // Dependencies (kube, hyper, rustls) only get to speak up on warnings.
    SimpleLogger::new()
        .with_level(level.min(LevelFilter::Warn))
        .with_module_level("kubectl_pprof", level)
        .without_timestamps()
        .init()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = PprofArgs::parse();
    init_logging(args.log_level())?;
    debug!(
        "kubectl-pprof starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let client = pprofgetter::default_client().context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, cancelling");
            on_interrupt.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    cmd::run(&args, client, &cancel, &mut stdout).await?;
    Ok(())
}
