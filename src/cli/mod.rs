use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::summarize::Provider;

#[derive(Parser)]
#[command(
    name = "tubedigest",
    about = "Tube Digest - Summarize YouTube and Twitter/X videos with OpenAI or Gemini",
    version,
    long_about = "Summarize YouTube videos from their transcripts and Twitter/X videos from the raw video, using OpenAI or Gemini. Runs as a one-shot CLI or as an HTTP service that renders standalone HTML reports."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Address to bind (overrides configuration)
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Port to listen on (overrides configuration)
        #[arg(short, long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Summarize a single video and print the summary
    Summarize {
        /// YouTube URL or video id, or a Twitter/X status URL
        #[arg(value_name = "VIDEO")]
        video: String,

        /// LLM provider (Twitter/X videos always use Gemini)
        #[arg(long, value_enum)]
        provider: Option<Provider>,

        /// Directory for the transcript and HTML report (overrides configuration)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Print the summary without saving any files
        #[arg(long)]
        no_save: bool,
    },

    /// Write a default configuration file, or show the current one
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported platforms
    Platforms,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_summarize() {
        let cli = Cli::try_parse_from([
            "tubedigest",
            "summarize",
            "https://youtu.be/abc123",
            "--provider",
            "gemini",
            "--no-save",
        ])
        .unwrap();

        match cli.command {
            Commands::Summarize {
                video,
                provider,
                output_dir,
                no_save,
            } => {
                assert_eq!(video, "https://youtu.be/abc123");
                assert_eq!(provider, Some(Provider::Gemini));
                assert!(output_dir.is_none());
                assert!(no_save);
            }
            _ => panic!("expected summarize"),
        }
    }

    #[test]
    fn test_rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["tubedigest", "summarize", "abc", "--provider", "claude"]).is_err());
    }

    #[test]
    fn test_parses_serve_overrides() {
        let cli = Cli::try_parse_from(["tubedigest", "serve", "--host", "0.0.0.0", "-p", "9000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve { host: Some(ref h), port: Some(9000) } if h == "0.0.0.0"
        ));
    }
}
