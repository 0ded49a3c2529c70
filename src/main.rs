use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tube_digest::output::ArtifactStore;
use tube_digest::pipeline::{SummaryPipeline, SummaryRequest};
use tube_digest::utils::format_file_size;
use tube_digest::{server, Cli, Commands, Config};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tube_digest=debug,tower_http=debug"
    } else {
        "tube_digest=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn spinner(quiet: bool, message: &str) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load().await?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            server::serve(config).await?;
        }
        Commands::Summarize {
            video,
            provider,
            output_dir,
            no_save,
        } => {
            if let Some(dir) = output_dir {
                config.app.output_dir = dir;
            }
            let store = ArtifactStore::new(config.app.output_dir.clone());
            let pipeline = SummaryPipeline::new(config).context("Failed to create HTTP client")?;

            let request = SummaryRequest {
                provider,
                ..SummaryRequest::new(video)
            };

            let pb = spinner(cli.quiet, "Summarizing video...");
            let result = pipeline.run(&request).await;
            pb.finish_and_clear();

            let report = result.map_err(|e| anyhow::anyhow!(e.user_message()))?;

            println!("{} ({})", report.metadata.title, report.reference.source_url());
            println!("by {} · summarized with {}", report.metadata.author_name, report.result.provider);
            println!();
            println!("{}", report.result.summary_html);

            if !no_save {
                let (transcript_path, summary_path) = report
                    .persist(&store)
                    .context("Failed to save artifacts")?;
                println!();
                println!(
                    "Transcript saved to: {} ({})",
                    transcript_path.display(),
                    format_file_size(report.transcript.len() as u64)
                );
                println!("Report saved to: {}", summary_path.display());
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = config.save().await?;
                println!("Configuration written to: {}", path.display());
            }
        }
        Commands::Platforms => {
            println!("Supported platforms:");
            println!("  • YouTube (youtube.com/watch, youtu.be, shorts, embed, or a bare video id)");
            println!("  • Twitter/X status URLs (twitter.com, x.com) - summarized by Gemini from the video");
            println!();
            println!("Providers:");
            println!("  • openai - transcript summaries");
            println!("  • gemini - transcript and video summaries");
        }
    }

    Ok(())
}
