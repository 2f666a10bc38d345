//! Spoken narration of a streaming response.
//!
//! Two workers run for the lifetime of one streaming call:
//!
//! - the **synthesizer** watches [`StreamSnapshot`]s and turns every newly
//!   finalized sentence into an [`AudioClip`], in order
//! - the **player** pulls clips from the [`AudioQueue`] and plays them one
//!   after another
//!
//! Both wait on notifications raced against the cancellation token, with the
//! configured intervals as an upper bound on each wait.

use crate::segmenter::StreamSnapshot;
use daisy_config::NarrationConfig;
use daisy_core::error::SpeechError;
use daisy_core::speech::{AudioClip, AudioPlayer, TtsProvider};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// FIFO hand-off between the synthesizer and the player.
#[derive(Default)]
pub struct AudioQueue {
    clips: Mutex<VecDeque<AudioClip>>,
    closed: AtomicBool,
    notify: Notify,
}

impl AudioQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AudioClip>> {
        self.clips.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, clip: AudioClip) {
        self.lock().push_back(clip);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<AudioClip> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard everything queued, returning how many clips were dropped.
    pub fn clear(&self) -> usize {
        let mut clips = self.lock();
        let dropped = clips.len();
        clips.clear();
        dropped
    }

    /// No more clips will be pushed.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn wait(&self, max: Duration) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(max) => {}
        }
    }
}

/// What one narrated response produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrationReport {
    pub sentences_synthesized: usize,
    pub clips_played: usize,
    pub cancelled: bool,
}

/// Speech backends plus timing, shared by every narrated request.
#[derive(Clone)]
pub struct NarrationPipeline {
    tts: Arc<dyn TtsProvider>,
    player: Arc<dyn AudioPlayer>,
    synth_interval: Duration,
    player_interval: Duration,
    tts_retries: u32,
}

impl NarrationPipeline {
    pub fn new(tts: Arc<dyn TtsProvider>, player: Arc<dyn AudioPlayer>) -> Self {
        Self::from_config(tts, player, &NarrationConfig::default())
    }

    pub fn from_config(
        tts: Arc<dyn TtsProvider>,
        player: Arc<dyn AudioPlayer>,
        config: &NarrationConfig,
    ) -> Self {
        Self {
            tts,
            player,
            synth_interval: config.synth_interval(),
            player_interval: config.player_interval(),
            tts_retries: config.tts_retries,
        }
    }

    /// Start both workers for one response.
    ///
    /// `filler` is cancelled as soon as the first clip is about to play, so a
    /// "please wait" sound never overlaps the answer.
    pub fn start(
        &self,
        snapshots: watch::Receiver<StreamSnapshot>,
        cancel: CancellationToken,
        filler: Option<CancellationToken>,
    ) -> NarrationHandle {
        let queue = Arc::new(AudioQueue::new());

        let synthesizer = tokio::spawn(synthesize(
            self.tts.clone(),
            queue.clone(),
            snapshots,
            cancel.clone(),
            self.synth_interval,
            self.tts_retries,
        ));
        let player = tokio::spawn(play(
            self.player.clone(),
            queue.clone(),
            cancel.clone(),
            self.player_interval,
            filler,
        ));

        NarrationHandle {
            synthesizer,
            player,
            queue,
            cancel,
        }
    }
}

/// The running workers of one narrated response.
pub struct NarrationHandle {
    synthesizer: JoinHandle<usize>,
    player: JoinHandle<usize>,
    queue: Arc<AudioQueue>,
    cancel: CancellationToken,
}

impl NarrationHandle {
    pub fn queue(&self) -> &Arc<AudioQueue> {
        &self.queue
    }

    /// Stop both workers and discard queued audio.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until both workers have ended.
    pub async fn finish(self) -> NarrationReport {
        let sentences_synthesized = self.synthesizer.await.unwrap_or_else(|e| {
            warn!(error = %e, "Synthesizer worker failed");
            0
        });
        let clips_played = self.player.await.unwrap_or_else(|e| {
            warn!(error = %e, "Player worker failed");
            0
        });

        let report = NarrationReport {
            sentences_synthesized,
            clips_played,
            cancelled: self.cancel.is_cancelled(),
        };
        debug!(?report, "Narration finished");
        report
    }
}

/// Speak finalized sentences in order until the response completes.
///
/// The last sentence is finalized only with the completed snapshot, so a
/// one-sentence answer is synthesized in a single call at completion.
/// `done` carries across snapshots: when a retried attempt restreams the
/// answer, sentences already spoken are skipped.
async fn synthesize(
    tts: Arc<dyn TtsProvider>,
    queue: Arc<AudioQueue>,
    mut snapshots: watch::Receiver<StreamSnapshot>,
    cancel: CancellationToken,
    interval: Duration,
    retries: u32,
) -> usize {
    let mut done = 0;
    let mut synthesized = 0;

    'outer: loop {
        let snapshot = snapshots.borrow_and_update().clone();
        let ready = snapshot.finalized();

        for sentence in ready.iter().skip(done) {
            if cancel.is_cancelled() {
                break 'outer;
            }
            if let Some(clip) = synthesize_sentence(tts.as_ref(), sentence, &cancel, retries).await {
                queue.push(clip);
                synthesized += 1;
            }
            done += 1;
        }

        if snapshot.complete {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("Stream ended without completing, synthesizer stopping");
                    break;
                }
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    queue.close();
    if cancel.is_cancelled() {
        let dropped = queue.clear();
        if dropped > 0 {
            debug!(dropped, "Discarded queued audio");
        }
    }
    synthesized
}

async fn synthesize_sentence(
    tts: &dyn TtsProvider,
    sentence: &str,
    cancel: &CancellationToken,
    retries: u32,
) -> Option<AudioClip> {
    let mut attempt = 0;
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = tts.synthesize(sentence) => result,
        };

        match result {
            Ok(clip) => return Some(clip),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                debug!(error = %e, attempt, "Retrying synthesis");
            }
            Err(SpeechError::Cancelled) => return None,
            Err(e) => {
                warn!(error = %e, sentence = %sentence, "Skipping sentence");
                return None;
            }
        }
    }
}

async fn play(
    player: Arc<dyn AudioPlayer>,
    queue: Arc<AudioQueue>,
    cancel: CancellationToken,
    interval: Duration,
    mut filler: Option<CancellationToken>,
) -> usize {
    let mut played = 0;

    while !cancel.is_cancelled() {
        let Some(clip) = queue.pop() else {
            if queue.is_closed() && queue.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = queue.wait(interval) => {}
            }
            continue;
        };

        if let Some(filler) = filler.take() {
            filler.cancel();
        }

        match player.play(&clip, &cancel).await {
            Ok(()) => played += 1,
            Err(SpeechError::Cancelled) => break,
            Err(e) => warn!(error = %e, "Playback failed, moving on"),
        }
    }

    if cancel.is_cancelled() {
        let dropped = queue.clear();
        if dropped > 0 {
            info!(dropped, "Narration cancelled");
        }
    }
    played
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::SentenceSegmenter;
    use crate::test_helpers::{RecordingPlayer, RecordingTts};

    fn fast_config() -> NarrationConfig {
        NarrationConfig {
            synth_interval_ms: 20,
            player_interval_ms: 5,
            ..NarrationConfig::default()
        }
    }

    fn pipeline(tts: Arc<RecordingTts>, player: Arc<RecordingPlayer>) -> NarrationPipeline {
        NarrationPipeline::from_config(tts, player, &fast_config())
    }

    #[tokio::test]
    async fn narrates_streamed_sentences_in_order() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::new());
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts.clone(), player.clone()).start(rx, CancellationToken::new(), None);

        let mut seg = SentenceSegmenter::new();
        for chunk in ["Hello", " world.", " Done."] {
            seg.push(chunk);
            tx.send_replace(seg.snapshot(false));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tx.send_replace(seg.snapshot(true));

        let report = handle.finish().await;
        assert_eq!(tts.requests(), ["Hello world.", "Done."]);
        assert_eq!(player.played(), ["Hello world.", "Done."]);
        assert_eq!(report.sentences_synthesized, 2);
        assert_eq!(report.clips_played, 2);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn trailing_sentence_is_not_spoken_early() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::new());
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts.clone(), player.clone()).start(rx, CancellationToken::new(), None);

        let mut seg = SentenceSegmenter::new();
        seg.push("First. Second");
        tx.send_replace(seg.snapshot(false));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(tts.requests(), ["First."]);

        seg.push(" part two.");
        tx.send_replace(seg.snapshot(true));
        handle.finish().await;
        assert_eq!(tts.requests(), ["First.", "Second part two."]);
    }

    #[tokio::test]
    async fn single_sentence_is_one_call_at_completion() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::new());
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts.clone(), player.clone()).start(rx, CancellationToken::new(), None);

        let mut seg = SentenceSegmenter::new();
        for chunk in ["It is ", "sunny."] {
            seg.push(chunk);
            tx.send_replace(seg.snapshot(false));
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(tts.requests().is_empty());

        tx.send_replace(seg.snapshot(true));
        let report = handle.finish().await;
        assert_eq!(tts.requests(), ["It is sunny."]);
        assert_eq!(report.clips_played, 1);
    }

    #[tokio::test]
    async fn restreamed_sentences_are_not_repeated() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::new());
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts.clone(), player.clone()).start(rx, CancellationToken::new(), None);

        let mut first = SentenceSegmenter::new();
        first.push("Good morning. The forecast");
        tx.send_replace(first.snapshot(false));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(tts.requests(), ["Good morning."]);

        // The retry starts over from an empty buffer
        let mut retry = SentenceSegmenter::new();
        tx.send_replace(retry.snapshot(false));
        retry.push("Good morning. The forecast is dry.");
        tx.send_replace(retry.snapshot(true));

        handle.finish().await;
        assert_eq!(tts.requests(), ["Good morning.", "The forecast is dry."]);
        assert_eq!(player.played(), ["Good morning.", "The forecast is dry."]);
    }

    #[tokio::test]
    async fn first_clip_cancels_filler() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::new());
        let filler = CancellationToken::new();
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts, player).start(rx, CancellationToken::new(), Some(filler.clone()));

        assert!(!filler.is_cancelled());
        let mut seg = SentenceSegmenter::new();
        seg.push("Ready.");
        tx.send_replace(seg.snapshot(true));
        handle.finish().await;
        assert!(filler.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_mid_playback_drains_queue() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::with_delay(Duration::from_millis(200)));
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts, player.clone()).start(rx, cancel.clone(), None);
        let queue = handle.queue().clone();

        let mut seg = SentenceSegmenter::new();
        seg.push("One. Two. Three. Four.");
        tx.send_replace(seg.snapshot(true));

        // Let the first clip start playing, then stop everything
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let report = handle.finish().await;

        assert!(report.cancelled);
        assert_eq!(queue.len(), 0);
        assert_eq!(report.clips_played, 0);
        let started = player.started();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(player.started(), started);
    }

    #[tokio::test]
    async fn transient_tts_failure_is_retried_once() {
        let tts = Arc::new(RecordingTts::failing(vec![SpeechError::Transient("busy".into())]));
        let player = Arc::new(RecordingPlayer::new());
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts.clone(), player.clone()).start(rx, CancellationToken::new(), None);

        let mut seg = SentenceSegmenter::new();
        seg.push("Try again.");
        tx.send_replace(seg.snapshot(true));

        let report = handle.finish().await;
        assert_eq!(tts.requests(), ["Try again.", "Try again."]);
        assert_eq!(report.clips_played, 1);
    }

    #[tokio::test]
    async fn permanent_tts_failure_skips_sentence() {
        let tts = Arc::new(RecordingTts::failing(vec![SpeechError::Permanent("bad voice".into())]));
        let player = Arc::new(RecordingPlayer::new());
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts.clone(), player.clone()).start(rx, CancellationToken::new(), None);

        let mut seg = SentenceSegmenter::new();
        seg.push("Skipped. Spoken.");
        tx.send_replace(seg.snapshot(true));

        let report = handle.finish().await;
        assert_eq!(player.played(), ["Spoken."]);
        assert_eq!(report.sentences_synthesized, 1);
    }

    #[tokio::test]
    async fn playback_failure_moves_on() {
        let tts = Arc::new(RecordingTts::new());
        let player = Arc::new(RecordingPlayer::failing_on("Broken."));
        let (tx, rx) = watch::channel(StreamSnapshot::default());
        let handle = pipeline(tts, player.clone()).start(rx, CancellationToken::new(), None);

        let mut seg = SentenceSegmenter::new();
        seg.push("Broken. Fine.");
        tx.send_replace(seg.snapshot(true));

        let report = handle.finish().await;
        assert_eq!(player.played(), ["Fine."]);
        assert_eq!(report.clips_played, 1);
    }

    #[tokio::test]
    async fn queue_is_fifo() {
        let queue = AudioQueue::new();
        for text in ["a", "b"] {
            queue.push(AudioClip {
                text: text.into(),
                data: vec![],
            });
        }
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().text, "a");
        assert_eq!(queue.clear(), 1);
        assert!(queue.pop().is_none());
    }
}
