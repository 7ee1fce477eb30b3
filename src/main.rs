//! CLI entry point.
//!
//! Grounded on `cmdline.py`: load flags, fall back to a netrc-style
//! config file for anything not passed on the command line, install a
//! SIGINT handler that tears the pool down cleanly, and report failures
//! as a single `[Error] <reason>` line on stderr with a non-zero exit.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use nzbstream::cli::Cli;
use nzbstream::config::load_config;
use nzbstream::manager::{Manager, ManagerConfig};
use nzbstream::nntp::{RealNntpConnector, ServerConfig};
use nzbstream::sink::MediaFileSink;
use nzbstream::{Result, StreamError};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[Error] {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let server_config = resolve_server_config(&cli)?;
    let nzb = load_nzb(&cli.nzb)?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&nzb));

    let connector = Arc::new(RealNntpConnector::new(server_config));
    let manager_config = ManagerConfig {
        connections: cli.connections,
        bandwidth_limit: None,
        output: output.clone(),
    };
    let manager = Manager::new(nzb, connector, manager_config);

    let result = drive(&manager, &output, cli.max_bitrate, cli.skip_verify).await;

    manager.shutdown().await;
    result
}

async fn drive<C: nzbstream::nntp::NntpConnector + 'static>(
    manager: &Manager<C>,
    output: &PathBuf,
    max_bitrate: Option<f64>,
    skip_verify: bool,
) -> Result<()> {
    let shutdown = tokio::signal::ctrl_c();
    tokio::select! {
        result = run_pipeline(manager, output, max_bitrate, skip_verify) => result,
        _ = shutdown => {
            tracing::info!("received interrupt, shutting down");
            Ok(())
        }
    }
}

/// Resolve the rar set, verify the target media file and (unless
/// `skip_verify`) reject a bitrate cap violation before the sink is ever
/// created, then stream the whole thing. Mirrors the external
/// interface's verify-before-stream contract.
async fn run_pipeline<C: nzbstream::nntp::NntpConnector + 'static>(
    manager: &Manager<C>,
    output: &PathBuf,
    max_bitrate: Option<f64>,
    skip_verify: bool,
) -> Result<()> {
    let initialized = manager.initialize().await?;

    let Some(first_volume_segments) = initialized.segment_lists.first() else {
        return Err(StreamError::NoRarArchives);
    };

    let first_volume_buf = manager.fetch_volume(first_volume_segments).await?;

    let verified = manager.verify(&first_volume_buf, !skip_verify)?;

    let known_bitrate = if skip_verify {
        None
    } else {
        match max_bitrate {
            Some(cap) => {
                manager
                    .probe_bitrate(
                        &initialized.segment_lists,
                        &verified.filename,
                        verified.declared_size,
                        &first_volume_buf,
                        cap,
                    )
                    .await?
            }
            None => None,
        }
    };

    let (target_filename, declared_size, seed) =
        (verified.filename, verified.declared_size, Some(first_volume_buf));

    let mut sink = MediaFileSink::create(output, declared_size).await?;
    manager
        .stream(
            &initialized.segment_lists,
            &target_filename,
            declared_size,
            seed,
            known_bitrate,
            &mut sink,
        )
        .await?;
    sink.flush().await?;

    Ok(())
}

fn resolve_server_config(cli: &Cli) -> Result<ServerConfig> {
    let file_config = load_config().ok();

    let host = cli
        .server
        .clone()
        .or_else(|| file_config.as_ref().and_then(|c| c.server.clone()))
        .ok_or_else(|| StreamError::OpenNzb("no NNTP server specified (-s or config file)".to_string()))?;

    let port = cli
        .port
        .or_else(|| file_config.as_ref().and_then(|c| c.port))
        .unwrap_or(if cli.use_tls { 563 } else { 119 });

    let password = if cli.prompt_password {
        Some(
            rpassword::prompt_password("NNTP password: ")
                .map_err(|err| StreamError::OpenNzb(format!("could not read password: {err}")))?,
        )
    } else {
        file_config.as_ref().and_then(|c| c.password.clone())
    };

    Ok(ServerConfig {
        host,
        port,
        username: cli
            .username
            .clone()
            .or_else(|| file_config.as_ref().and_then(|c| c.username.clone())),
        password,
        use_tls: cli.use_tls,
    })
}

fn load_nzb(path: &str) -> Result<nzb_rs::Nzb> {
    let contents = std::fs::read_to_string(path).map_err(|_| StreamError::OpenNzb(path.to_string()))?;
    nzb_rs::Nzb::parse(&contents).map_err(StreamError::from)
}

fn default_output_path(nzb: &nzb_rs::Nzb) -> PathBuf {
    nzb.files
        .first()
        .map(|f| PathBuf::from(nzbstream::yenc::extract_filename(&f.subject)))
        .unwrap_or_else(|| PathBuf::from("output.bin"))
}
