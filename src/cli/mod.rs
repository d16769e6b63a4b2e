use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::transcribe::ModelSize;

#[derive(Parser, Debug)]
#[command(
    name = "vidscribe",
    about = "vidscribe - Turn a video URL into a formatted transcript",
    version,
    long_about = "Fetches the audio track of a video with yt-dlp, transcribes it locally with whisper.cpp and writes the transcript as Markdown, plain text, SRT subtitles or JSON."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml, then the user config dir)
    #[arg(short, long, global = true, env = "VIDSCRIBE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe the audio of a video URL
    Transcribe {
        /// Video page URL (anything yt-dlp understands)
        #[arg(value_name = "URL")]
        url: String,

        /// Language code for transcription (auto-detect if not specified)
        #[arg(short, long, value_name = "LANG")]
        language: Option<String>,

        /// Whisper model size (defaults to the configured model)
        #[arg(short, long, value_enum)]
        model: Option<ModelSize>,

        /// Leave `[12.3s]` prefixes out of the text outputs
        #[arg(long)]
        no_timestamps: bool,

        /// Leave speaker labels out of the outputs
        #[arg(long)]
        no_speakers: bool,

        /// Netscape-format cookies file for sites that need a login
        #[arg(long, value_name = "FILE")]
        cookies: Option<PathBuf>,

        /// Directory for the generated transcripts
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the final job record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List suggested language codes
    Languages,

    /// List whisper model sizes
    Models,
}
