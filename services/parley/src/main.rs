//! Terminal front-end for a single conversation session.
//!
//! Lines typed on stdin are submitted as user turns. `:mic <file.wav>` hands a
//! recorded utterance to the recognizer as if the microphone had been pressed,
//! and spoken replies are written to the output directory as WAV files.

mod console;

use anyhow::Context;
use clap::Parser;
use console::{Command, TranscriptPrinter};
use parley_core::{SessionInput, config::Config, orchestrator::Orchestrator};
use std::path::PathBuf;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Chat with a model by typing or by voice")]
struct Cli {
    /// Overrides SYSTEM_PROMPT.
    #[arg(long)]
    system_prompt: Option<String>,

    /// Overrides MAX_HISTORY.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_history: Option<u32>,

    /// Where spoken replies are written.
    #[arg(long, default_value = "parley-audio")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    if let Some(prompt) = cli.system_prompt {
        config.session.system_prompt = prompt;
    }
    if let Some(max_history) = cli.max_history {
        config.session.max_history = max_history as usize;
    }

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (inputs_tx, inputs_rx) = mpsc::channel(32);
    let mut orchestrator = Orchestrator::new(
        &config.session,
        config.completion_client(),
        config.speech_services(),
        events_tx,
    );
    info!(max_history = config.session.max_history, "Session started");

    let orchestrator_task = tokio::spawn(async move { orchestrator.run(inputs_rx).await });

    let mut printer = TranscriptPrinter::new(cli.output_dir);
    let printer_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Err(e) = printer.handle(event).await {
                warn!(error = %e, "Failed to render session event");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match Command::parse(&line) {
            Command::Submit(text) => SessionInput::TypedSubmit(text),
            Command::Microphone(path) => match tokio::fs::read(&path).await {
                Ok(audio) => SessionInput::MicrophonePressed(audio.into()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read recording");
                    continue;
                }
            },
            Command::Quit => break,
        };
        if inputs_tx.send(input).await.is_err() {
            break;
        }
    }

    // Let in-flight calls finish before exiting.
    drop(inputs_tx);
    orchestrator_task.await?;
    printer_task.await?;
    Ok(())
}
