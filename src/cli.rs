//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "opengled")]
#[command(about = "Drive an LED matrix from a rendered, audio-reactive frame", long_about = None)]
pub struct Args {
    /// JSON configuration file
    #[arg(short, long, value_name = "PATH", default_value = "opengled.json")]
    pub config: PathBuf,

    /// Ignore the audio section and run without a spectrum input
    #[arg(long)]
    pub no_audio: bool,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Write every frame to a PNG instead of logging it
    #[arg(long, value_name = "PATH")]
    pub dump_png: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}
