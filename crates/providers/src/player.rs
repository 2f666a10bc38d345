//! Audio playback by piping clips into an external program.
//!
//! Any player that reads encoded audio from stdin works, e.g.
//! `mpv --no-terminal -` or `ffplay -nodisp -autoexit -`.

use async_trait::async_trait;
use daisy_core::error::SpeechError;
use daisy_core::speech::{AudioClip, AudioPlayer};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Plays each clip by spawning `program args...` and writing the clip to its stdin.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full command line split into words.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(
        &self,
        clip: &AudioClip,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), SpeechError> {
        debug!(program = %self.program, bytes = clip.data.len(), "Playing clip");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Playback(format!("{}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(SpeechError::Cancelled);
                }
                written = stdin.write_all(&clip.data) => {
                    if let Err(e) = written {
                        // Players may exit before reading everything; the exit status decides.
                        debug!(error = %e, "Player closed stdin early");
                    }
                }
            }
            // stdin dropped here so the player sees EOF
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(SpeechError::Cancelled)
            }
            status = child.wait() => {
                let status = status.map_err(|e| SpeechError::Playback(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    warn!(program = %self.program, code = ?status.code(), "Player exited with failure");
                    Err(SpeechError::Playback(format!("{} exited with {status}", self.program)))
                }
            }
        }
    }
}
