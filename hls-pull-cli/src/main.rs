use std::sync::Arc;

use clap::Parser;
use error::AppError;
use hls_pull::{PLUGIN_INFO, PublishRequest, RequestTemplate, SessionManager, TsDemuxer};
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;
mod error;
mod server;
mod utils;

use cli::CliArgs;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) -> Result<(), AppError> {
    let log_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let writer = match &args.log_file {
        Some(path) => {
            let log_file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(MakeWriterExt::and(std::io::stdout, log_file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(args.log_file.is_none())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();
    init_logging(&args)?;

    info!(
        plugin = PLUGIN_INFO.name,
        version = PLUGIN_INFO.version,
        "Live HLS pull host - part of the rust-srec project by hua0512"
    );

    let config = config::load(args.config.as_deref())?;
    debug!(?config, "Configuration loaded");
    let manager = SessionManager::start(config)?;

    let headers = utils::parse_headers(&args.headers);
    let video = RequestTemplate::parse(&args.video_url, headers.clone())?;
    let audio = args
        .audio_url
        .as_deref()
        .map(|url| RequestTemplate::parse(url, headers))
        .transpose()?;

    let cancel = CancellationToken::new();
    let demuxer = Arc::new(TsDemuxer::new(args.queue_capacity, cancel.clone()));
    let mut output = demuxer
        .take_output()
        .ok_or_else(|| AppError::Initialization("demuxer output already taken".to_string()))?;

    // Stand-in for a downstream track writer: drain and count.
    let drain = tokio::spawn(async move {
        let mut units = 0u64;
        let mut bytes = 0u64;
        while let Some(unit) = output.recv().await {
            units += 1;
            bytes += unit.data.len() as u64;
            if units % 1000 == 0 {
                debug!(units, bytes, "PES units received");
            }
        }
        info!(units, bytes, "Demuxer output closed");
    });

    let session = manager.publish(PublishRequest {
        stream_path: args.stream_path.clone(),
        video,
        audio,
        consumer: demuxer,
        cancel,
    })?;

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(addr = %args.listen, "Status server listening");
    let app = server::router(Arc::clone(manager.registry()));
    // Status listeners stream forever, so the server is aborted rather than drained.
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Interrupted, shutting down");
        }
        _ = session.closed() => {
            info!(reasons = ?session.exit_reasons(), "Session ended");
        }
    }

    manager.shutdown().await;
    if !server.is_finished() {
        server.abort();
    } else if let Ok(Err(e)) = server.await {
        error!(error = %e, "Status server failed");
    }
    if let Err(e) = drain.await {
        error!(error = %e, "Drain task failed");
    }
    Ok(())
}
