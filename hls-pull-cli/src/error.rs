use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),

    #[error("HLS error: {0}")]
    Hls(#[from] hls_pull::HlsPullError),

    #[error("Initialization failed: {0}")]
    Initialization(String),
}
