use anyhow::{Context, Result};
use parley_core::{SessionEvent, conversation::Role};
use std::path::PathBuf;

/// One line of terminal input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    Microphone(PathBuf),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed == ":quit" || trimmed == ":q" {
            return Command::Quit;
        }
        match trimmed.strip_prefix(":mic ") {
            Some(path) if !path.trim().is_empty() => Command::Microphone(PathBuf::from(path.trim())),
            _ => Command::Submit(line.to_string()),
        }
    }
}

/// Renders session events to stdout and stores spoken replies.
pub struct TranscriptPrinter {
    output_dir: PathBuf,
    clips_written: usize,
}

impl TranscriptPrinter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            clips_written: 0,
        }
    }

    pub async fn handle(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::SpeechAudio(audio) => {
                let path = self.save_clip(&audio).await?;
                println!("  (reply audio: {})", path.display());
            }
            other => {
                if let Some(line) = render_line(&other) {
                    println!("{line}");
                }
            }
        }
        Ok(())
    }

    async fn save_clip(&mut self, audio: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;
        self.clips_written += 1;
        let path = self
            .output_dir
            .join(format!("reply-{:03}.wav", self.clips_written));
        tokio::fs::write(&path, audio)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

pub fn render_line(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::TurnAppended(turn) => match turn.role {
            Role::User => Some(format!("you: {}", turn.content)),
            Role::Assistant => Some(format!("ai:  {}", turn.content)),
            Role::System => None,
        },
        SessionEvent::ListeningStarted => Some("  (listening...)".to_string()),
        SessionEvent::ListeningEnded => Some("  (mic idle)".to_string()),
        SessionEvent::SpeechAudio(_) => None,
    }
}
