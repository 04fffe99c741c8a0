use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    author = "hua0512 <https://github.com/hua0512>",
    version,
    about = "Live HLS pull host",
    long_about = "Pulls a live HLS stream (video and optional audio playlist), demuxes the\n\
                  MPEG-TS segments and serves live session status over HTTP.\n\
                  \n\
                  GET /hls/list streams the status of every session as Server-Sent Events.\n\
                  GET /hls/save?streamPath=<path> saves the segments of a session to disk\n\
                  for as long as the request stays open."
)]
pub struct CliArgs {
    /// Path of the TOML configuration file
    #[arg(short, long, help = "TOML configuration file (defaults apply when absent)")]
    pub config: Option<PathBuf>,

    /// Stream path the session is published under
    #[arg(short, long, default_value = "live/hls")]
    pub stream_path: String,

    /// Media playlist URL of the video rendition
    #[arg(long, required = true)]
    pub video_url: String,

    /// Media playlist URL of the audio rendition
    #[arg(long)]
    pub audio_url: Option<String>,

    /// Custom HTTP headers
    #[arg(
        short = 'H',
        long = "header",
        help = "Add custom HTTP header (format: 'Name: Value'). Can be used multiple times."
    )]
    pub headers: Vec<String>,

    /// Address of the status server
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// Capacity of the demuxer output queue
    #[arg(short, long, default_value = "1024")]
    pub queue_capacity: usize,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
