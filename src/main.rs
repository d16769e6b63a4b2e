use anyhow::Result;
use clap::{Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidscribe::cli::{Cli, Commands};
use vidscribe::config::Config;
use vidscribe::transcribe::whisper::GgmlModelLoader;
use vidscribe::utils::{self, format_file_size};
use vidscribe::{JobRecord, JobRequest, JobStatus, JobStep, ModelSize, Orchestrator};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Transcribe {
            url,
            language,
            model,
            no_timestamps,
            no_speakers,
            cookies,
            output_dir,
            json,
        } => {
            utils::validate_and_normalize_url(&url)?;

            // Non-fatal: the tools may live somewhere the lookup cannot see
            let missing_deps = utils::check_dependencies(
                &config.fetch.yt_dlp_path,
                &config.transcription.whisper_binary,
            )
            .await;
            if !missing_deps.is_empty() {
                eprintln!("{}", style("Dependency check warnings:").yellow());
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            let mut request = JobRequest::new(url)
                .with_model_size(model.unwrap_or(config.transcription.default_model_size))
                .with_timestamps(!no_timestamps)
                .with_speakers(!no_speakers);
            if let Some(language) = language {
                if !config.is_supported_language(&language) {
                    tracing::warn!(
                        "Language '{}' is not in the configured list; passing it to whisper anyway",
                        language
                    );
                }
                request = request.with_language(utils::normalize_language_code(&language));
            }
            if let Some(cookies) = cookies {
                request = request.with_cookies(cookies);
            }

            let orchestrator = Orchestrator::from_config(&config, output_dir);
            let record = run_job(&orchestrator, request, cli.quiet || json).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }

            match record.status {
                JobStatus::Completed => {
                    if !json {
                        print_artifacts(&record);
                    }
                }
                _ => {
                    anyhow::bail!(
                        "Transcription failed: {}",
                        record.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file to change settings:");
                println!("  {}", Config::config_path(cli.config.as_deref())?.display());
            }
        }
        Commands::Languages => {
            println!("Suggested languages (any code whisper knows is accepted):");
            for language in &config.app.supported_languages {
                println!("  • {}", language);
            }
        }
        Commands::Models => {
            let loader = GgmlModelLoader::new(config.models_dir(), config.transcription.compute_type);
            println!("Whisper models in {}:", config.models_dir().display());
            for size in ModelSize::value_variants() {
                let installed = loader.candidate_files(*size).iter().any(|p| p.exists());
                let marker = if installed {
                    style("installed").green()
                } else {
                    style("not downloaded").dim()
                };
                let default = if *size == config.transcription.default_model_size {
                    " (default)"
                } else {
                    ""
                };
                println!("  • {}{} - {}", size, default, marker);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "vidscribe=debug" } else { "vidscribe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Start the job and poll it to a terminal state. Ctrl-C cancels the job.
async fn run_job(orchestrator: &Orchestrator, request: JobRequest, quiet: bool) -> Result<JobRecord> {
    let job_id = orchestrator.start_job(request);
    tracing::debug!(%job_id, "Polling job");

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
                .progress_chars("#>-"),
        );
        bar
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    let record = loop {
        tokio::select! {
            _ = ticker.tick() => {}
            signal = &mut ctrl_c, if !cancel_requested => {
                signal?;
                cancel_requested = true;
                progress.set_message("Cancelling...");
                orchestrator.cancel_job(&job_id);
            }
        }

        let Some(record) = orchestrator.get_job_status(&job_id) else {
            anyhow::bail!("Job {} is no longer tracked", job_id);
        };

        progress.set_position(record.progress_percent as u64);
        if !cancel_requested {
            progress.set_message(step_label(record.current_step));
        }

        if record.is_terminal() {
            break record;
        }
    };

    match record.status {
        JobStatus::Completed => progress.finish_with_message("Done"),
        _ => progress.abandon_with_message("Failed"),
    }

    Ok(record)
}

fn step_label(step: JobStep) -> &'static str {
    match step {
        JobStep::Initialized => "Waiting to start...",
        JobStep::FetchingAudio => "Fetching audio...",
        JobStep::Transcribing => "Transcribing...",
        JobStep::Formatting => "Writing transcripts...",
        JobStep::Done => "Done",
    }
}

fn print_artifacts(record: &JobRecord) {
    println!("{}", style("Transcription complete").green().bold());
    for (kind, path) in &record.artifacts {
        let size = fs_err::metadata(path)
            .map(|m| format_file_size(m.len()))
            .unwrap_or_else(|_| "?".to_string());
        println!("  • {}: {} ({})", kind, path.display(), size);
    }
    for (kind, error) in &record.failed_artifacts {
        println!("  {} {}: {}", style("✗").red(), kind, error);
    }
}
