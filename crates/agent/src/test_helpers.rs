//! Shared test doubles for the engine tests.

use async_trait::async_trait;
use daisy_core::error::{ProviderError, SpeechError, ToolError};
use daisy_core::provider::{ChatProvider, ChatRequest, ChunkStream, StreamChunk};
use daisy_core::speech::{AudioClip, AudioPlayer, TtsProvider};
use daisy_core::tool::Tool;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted reply of [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Chunks followed by the end marker
    Chunks(Vec<String>),
    /// `stream` itself fails
    Error(ProviderError),
    /// Chunks, then an error mid-stream
    Broken(Vec<String>, ProviderError),
    /// Chunks, then the channel closes without an end marker
    Unterminated(Vec<String>),
    /// Chunks spaced out by a delay, then the end marker
    Slow(Vec<String>, Duration),
    /// Chunks, a pause, then an error
    Stalled(Vec<String>, Duration, ProviderError),
}

impl Scripted {
    pub fn text(text: &str) -> Self {
        Self::Chunks(vec![text.to_string()])
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self::Chunks(chunks.iter().map(|c| c.to_string()).collect())
    }
}

/// A chat provider that replays a script, one entry per `stream` call.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ChatRequest>>,
    call_count: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Each reply arrives as a single chunk.
    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Scripted::text(r)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn ok_chunks(chunks: Vec<String>) -> impl Iterator<Item = Result<StreamChunk, ProviderError>> {
    chunks.into_iter().map(|c| Ok(StreamChunk::text(c)))
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkStream, ProviderError> {
        let n = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no reply for call #{n}"));

        let (tx, rx) = mpsc::channel(64);
        match next {
            Scripted::Error(e) => return Err(e),
            Scripted::Chunks(chunks) => {
                for item in ok_chunks(chunks).chain([Ok(StreamChunk::done())]) {
                    tx.try_send(item).unwrap();
                }
            }
            Scripted::Broken(chunks, e) => {
                for item in ok_chunks(chunks).chain([Err(e)]) {
                    tx.try_send(item).unwrap();
                }
            }
            Scripted::Unterminated(chunks) => {
                for item in ok_chunks(chunks) {
                    tx.try_send(item).unwrap();
                }
            }
            Scripted::Slow(chunks, delay) => {
                tokio::spawn(async move {
                    for item in ok_chunks(chunks).chain([Ok(StreamChunk::done())]) {
                        tokio::time::sleep(delay).await;
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                });
            }
            Scripted::Stalled(chunks, pause, e) => {
                for item in ok_chunks(chunks) {
                    tx.try_send(item).unwrap();
                }
                tokio::spawn(async move {
                    tokio::time::sleep(pause).await;
                    let _ = tx.send(Err(e)).await;
                });
            }
        }
        Ok(rx)
    }
}

/// Records every sentence it is asked to speak.
///
/// Scripted failures are returned first, in order, one per call.
pub struct RecordingTts {
    requests: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<SpeechError>>,
}

impl RecordingTts {
    pub fn new() -> Self {
        Self::failing(vec![])
    }

    pub fn failing(failures: Vec<SpeechError>) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(failures.into()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TtsProvider for RecordingTts {
    async fn synthesize(&self, text: &str) -> Result<AudioClip, SpeechError> {
        self.requests.lock().unwrap().push(text.to_string());
        if let Some(e) = self.failures.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(AudioClip {
            text: text.to_string(),
            data: text.as_bytes().to_vec(),
        })
    }
}

/// Records the text of every clip it finishes playing.
pub struct RecordingPlayer {
    played: Mutex<Vec<String>>,
    started: AtomicUsize,
    delay: Duration,
    fail_on: Option<String>,
}

impl RecordingPlayer {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            delay,
            fail_on: None,
        }
    }

    pub fn failing_on(text: &str) -> Self {
        Self {
            fail_on: Some(text.to_string()),
            ..Self::new()
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, clip: &AudioClip, cancel: &CancellationToken) -> Result<(), SpeechError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(clip.text.as_str()) {
            return Err(SpeechError::Playback("device busy".into()));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(SpeechError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }
        self.played.lock().unwrap().push(clip.text.clone());
        Ok(())
    }
}

/// A tool with a fixed answer, counting its invocations.
pub struct StaticTool {
    name: String,
    output: Result<String, String>,
    calls: AtomicUsize,
}

impl StaticTool {
    pub fn ok(name: &str, output: &str) -> Self {
        Self {
            name: name.to_string(),
            output: Ok(output.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            output: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "A test tool"
    }

    fn argument_format(&self) -> &str {
        "<anything>"
    }

    async fn execute(&self, _argument: &str, _cancel: &CancellationToken) -> Result<String, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output.clone().map_err(|reason| ToolError::ExecutionFailed {
            tool_name: self.name.clone(),
            reason,
        })
    }
}
