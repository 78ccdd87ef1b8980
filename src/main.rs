use anyhow::Context;
use clap::Parser;
use docreader::config::{Args, Command, Config};
use docreader::input::StagedUpload;
use docreader::server::{self, AppState};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = args.command.clone().unwrap_or(Command::Serve);
    let config = Config::try_from(args)?;

    match command {
        Command::Serve => {
            tracing::info!("Starting docreader-server v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Binding to {}:{}", config.host, config.port);
            server::run(config).await
        }
        Command::Extract {
            file,
            speak,
            audio_out,
        } => {
            tokio::task::spawn_blocking(move || extract_file(config, &file, speak, audio_out))
                .await
                .context("extraction task panicked")?
        }
    }
}

/// Print the text of one file, optionally reading it aloud
fn extract_file(
    config: Config,
    file: &Path,
    speak: bool,
    audio_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
    docreader::input::ensure_within_limit(data.len(), config.max_file_size)?;

    let state = AppState::from_config(config)?;
    let upload = StagedUpload::new(None, &data)?;
    let extracted = state.extractor.extract(&upload)?;

    tracing::info!(
        "Extracted {} chars from {} page(s) of {:?}",
        extracted.text.len(),
        extracted.pages.len(),
        file
    );
    println!("{}", extracted.text);

    // Speech is best effort: report failures without failing the extraction
    if let Some(path) = audio_out {
        match state.speech.render(&extracted.text, &path) {
            Ok(artifact) => eprintln!(
                "Wrote {} bytes of audio to {}",
                artifact.size_bytes,
                artifact.path.display()
            ),
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }
    if speak {
        if let Err(e) = state.speech.speak(&extracted.text) {
            eprintln!("{}", e.user_message());
        }
    }

    Ok(())
}
