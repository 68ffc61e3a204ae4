//! Speech output.
//!
//! [`SpeechSink::speak`] resolves when the utterance has finished playing.
//! Dropping the returned future stops playback.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Default text-to-speech program.
pub const DEFAULT_SPEECH_COMMAND: &str = "espeak";

/// Cap on captured stderr per utterance.
const MAX_STDERR_BYTES: u64 = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech command is empty")]
    NoCommand,

    #[error("Failed to run speech command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Speech command exited with code {code}: {stderr}")]
    Exited { code: i32, stderr: String },
}

#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Speaks by running an external program with the text as its last
/// argument, e.g. `espeak -s 160 "<text>"`.
#[derive(Debug, Clone)]
pub struct CommandSpeechSink {
    program: String,
    args: Vec<String>,
}

impl CommandSpeechSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Build from a whitespace-separated command line such as
    /// `"espeak -s 160"`.
    pub fn from_command_line(line: &str) -> Result<Self, SpeechError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SpeechError::NoCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for CommandSpeechSink {
    fn default() -> Self {
        Self::new(DEFAULT_SPEECH_COMMAND)
    }
}

#[async_trait]
impl SpeechSink for CommandSpeechSink {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Cancelling narration drops this future, which stops playback.
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| SpeechError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let mut stderr = Vec::new();
        if let Some(handle) = child.stderr.take() {
            let _ = handle.take(MAX_STDERR_BYTES).read_to_end(&mut stderr).await;
        }

        let status = child.wait().await.map_err(|source| SpeechError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(SpeechError::Exited {
                code: status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
