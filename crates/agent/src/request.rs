//! The request channel: streaming chat completions with retry, timeout
//! and cancellation.
//!
//! Every chunk of a response goes through a [`SentenceSegmenter`] whose
//! snapshots are published on a `watch` channel. When narration is requested
//! the [`NarrationPipeline`] subscribes to those snapshots and speaks the
//! answer while it is still streaming.

use crate::narration::{NarrationHandle, NarrationPipeline, NarrationReport};
use crate::segmenter::{SentenceSegmenter, StreamSnapshot};
use chrono::Utc;
use daisy_config::RequestConfig;
use daisy_core::error::ProviderError;
use daisy_core::event::{DomainEvent, EventBus};
use daisy_core::provider::{ChatProvider, ChatRequest, ChunkStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives each raw text fragment as it arrives.
pub type ChunkObserver<'a> = dyn Fn(&str) + Send + Sync + 'a;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    #[error("Request cancelled before any text arrived")]
    Cancelled,

    #[error("Request failed: {0}")]
    Fatal(ProviderError),

    #[error("Request failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ProviderError },
}

/// The text of a finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,

    /// Cancellation stopped the stream early; `text` is what had arrived.
    pub partial: bool,

    /// Present when the response was narrated.
    pub narration: Option<NarrationReport>,
}

/// Optional side channels of a single request.
#[derive(Default, Clone, Copy)]
pub struct RequestHooks<'a> {
    /// Speak the answer while it streams
    pub narrator: Option<&'a NarrationPipeline>,

    /// Cancelled when the first sentence starts playing
    pub filler: Option<&'a CancellationToken>,

    pub on_chunk: Option<&'a ChunkObserver<'a>>,
}

/// How one attempt's stream ended, when it did not fail.
enum StreamEnd {
    Completed(String),
    Cancelled(String),
}

/// Wraps a [`ChatProvider`] with the retry and timeout policy.
pub struct RequestChannel {
    provider: Arc<dyn ChatProvider>,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl RequestChannel {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self::from_config(provider, &RequestConfig::default())
    }

    pub fn from_config(provider: Arc<dyn ChatProvider>, config: &RequestConfig) -> Self {
        Self {
            provider,
            timeout: config.timeout(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
            event_bus: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send a request and wait for the whole answer.
    pub async fn request(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<Completion, RequestError> {
        self.request_with(request, cancel, RequestHooks::default()).await
    }

    /// Send a request, feeding the stream to the given hooks.
    ///
    /// Transient failures are retried up to the attempt limit; anything else
    /// fails at once. Cancellation returns the partial answer when some text
    /// had arrived. With a narrator attached this returns only after the
    /// narration has finished or been cancelled.
    ///
    /// Narration and the chunk observer span all attempts: a retry that
    /// restreams the same answer is neither spoken nor shown twice.
    pub async fn request_with(
        &self,
        request: ChatRequest,
        cancel: &CancellationToken,
        hooks: RequestHooks<'_>,
    ) -> Result<Completion, RequestError> {
        let request = request.with_timeout(self.timeout);
        let mut last_error = None;

        let narration_cancel = cancel.child_token();
        let (snapshots, watcher) = watch::channel(StreamSnapshot::default());
        let mut narration = hooks
            .narrator
            .map(|n| n.start(watcher, narration_cancel.clone(), hooks.filler.cloned()));
        let mut echo = Echo::new(hooks.on_chunk);

        for attempt in 1..=self.max_attempts {
            if cancel.is_cancelled() {
                finish(narration.take()).await;
                return Err(RequestError::Cancelled);
            }

            debug!(attempt, provider = %self.provider.name(), model = %request.model, "Sending request");
            let outcome = self
                .consume(request.clone(), &snapshots, cancel, &mut echo)
                .await;

            match outcome {
                Ok(StreamEnd::Completed(text)) => {
                    let narration = finish(narration.take()).await;
                    return Ok(Completion {
                        text,
                        partial: false,
                        narration,
                    });
                }
                Ok(StreamEnd::Cancelled(text)) => {
                    let narration = finish(narration.take()).await;
                    if text.is_empty() {
                        return Err(RequestError::Cancelled);
                    }
                    info!(chars = text.len(), "Request cancelled, keeping partial answer");
                    return Ok(Completion {
                        text,
                        partial: true,
                        narration,
                    });
                }
                Err(e) => {
                    if !e.is_transient() {
                        warn!(error = %e, "Request failed");
                        narration_cancel.cancel();
                        finish(narration.take()).await;
                        return Err(RequestError::Fatal(e));
                    }

                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "Request attempt failed");
                    if attempt < self.max_attempts {
                        if let Some(bus) = &self.event_bus {
                            bus.publish(DomainEvent::RequestRetried {
                                attempt,
                                error: e.to_string(),
                                timestamp: Utc::now(),
                            });
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                finish(narration.take()).await;
                                return Err(RequestError::Cancelled);
                            }
                            _ = tokio::time::sleep(self.retry_delay) => {}
                        }
                    }
                    last_error = Some(e);
                }
            }
        }

        narration_cancel.cancel();
        finish(narration.take()).await;
        Err(RequestError::Exhausted {
            attempts: self.max_attempts,
            last: last_error
                .unwrap_or_else(|| ProviderError::StreamInterrupted("no attempt was made".into())),
        })
    }

    /// Open the stream and read it to the end.
    async fn consume(
        &self,
        request: ChatRequest,
        snapshots: &watch::Sender<StreamSnapshot>,
        cancel: &CancellationToken,
        echo: &mut Echo<'_>,
    ) -> Result<StreamEnd, ProviderError> {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled(String::new())),
            opened = tokio::time::timeout(self.timeout, self.provider.stream(request)) => opened,
        };
        let mut stream: ChunkStream = opened.map_err(|_| {
            ProviderError::Timeout(format!("no response within {}s", self.timeout.as_secs_f32()))
        })??;

        let mut segmenter = SentenceSegmenter::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled(segmenter.into_text())),
                next = tokio::time::timeout(self.timeout, stream.recv()) => next,
            };

            let chunk = match next {
                Err(_) => {
                    return Err(ProviderError::Timeout(format!(
                        "no data for {}s",
                        self.timeout.as_secs_f32()
                    )));
                }
                Ok(None) if segmenter.is_empty() => {
                    return Err(ProviderError::StreamInterrupted(
                        "stream closed before any content".into(),
                    ));
                }
                Ok(None) => {
                    warn!("Stream closed without an end marker, accepting the text received");
                    snapshots.send_replace(segmenter.snapshot(true));
                    return Ok(StreamEnd::Completed(segmenter.into_text()));
                }
                Ok(Some(chunk)) => chunk?,
            };

            if let Some(text) = chunk.content.as_deref().filter(|t| !t.is_empty()) {
                segmenter.push(text);
                echo.forward(segmenter.text());
                snapshots.send_replace(segmenter.snapshot(false));
            }

            if chunk.done {
                snapshots.send_replace(segmenter.snapshot(true));
                debug!(chars = segmenter.text().len(), "Stream complete");
                return Ok(StreamEnd::Completed(segmenter.into_text()));
            }
        }
    }
}

/// Passes streamed text to the observer, skipping what an earlier attempt
/// already showed.
struct Echo<'a> {
    observer: Option<&'a ChunkObserver<'a>>,
    shown: usize,
}

impl<'a> Echo<'a> {
    fn new(observer: Option<&'a ChunkObserver<'a>>) -> Self {
        Self { observer, shown: 0 }
    }

    /// `text` is everything the current attempt has received so far.
    fn forward(&mut self, text: &str) {
        if text.len() <= self.shown {
            return;
        }
        let mut start = self.shown;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        if let Some(observer) = self.observer {
            observer(&text[start..]);
        }
        self.shown = text.len();
    }
}

async fn finish(narration: Option<NarrationHandle>) -> Option<NarrationReport> {
    match narration {
        Some(handle) => Some(handle.finish().await),
        None => None,
    }
}
