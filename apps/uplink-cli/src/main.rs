//! uplink - resumable uploads and keepalive beacons.

mod beacon;
mod cli;
mod config;
mod upload;

use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use uplink_http::ReqwestTransport;
use uplink_upload::HttpTransport;

use crate::beacon::{BeaconArgs, BeaconOutcome};
use crate::cli::{Args, Command};
use crate::config::UplinkConfig;
use crate::upload::UploadOutcome;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match UplinkConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "failed to load configuration, using defaults");
            UplinkConfig::default()
        }
    };

    match args.command {
        Command::UploadFile {
            path,
            endpoint,
            metadata,
            force_sync,
        } => {
            let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
            let outcome = upload::upload_file(
                &config,
                transport,
                &path,
                &endpoint,
                metadata.as_deref(),
                force_sync,
            )
            .await?;
            report_upload(&outcome)
        }
        Command::UploadPage {
            capture,
            endpoint,
            metadata,
        } => {
            let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);
            let outcome =
                upload::upload_page(&config, transport, &capture, &endpoint, metadata.as_deref())
                    .await?;
            report_upload(&outcome)
        }
        Command::Beacon {
            url,
            method,
            body,
            retry,
            detach,
        } => {
            let outcome = beacon::send_beacon(
                &config,
                BeaconArgs {
                    url,
                    method,
                    body,
                    retry,
                    detach,
                },
            )
            .await?;
            match outcome {
                BeaconOutcome::Completed { status, error: None } => {
                    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
                    println!("beacon delivered: {status}");
                    Ok(())
                }
                BeaconOutcome::Completed {
                    error: Some(error), ..
                } => anyhow::bail!("beacon failed: {error}"),
                BeaconOutcome::Detached => {
                    println!("beacon settled after detach");
                    Ok(())
                }
            }
        }
    }
}

fn report_upload(outcome: &UploadOutcome) -> anyhow::Result<()> {
    println!("{}", outcome.info);
    if let Some(url) = &outcome.upload_url {
        println!("upload url: {url}");
    }
    if !outcome.result.is_success() {
        anyhow::bail!("upload failed: {:?}", outcome.result);
    }
    let status = outcome
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".into());
    let content = if outcome.content_sent {
        "content sent"
    } else {
        "metadata only"
    };
    println!("upload accepted: {status} ({content})");
    Ok(())
}
