//! Sequential, single-flight narration of a settled run.
//!
//! [`NarrationSequencer::narrate`] turns each successful result into one
//! short utterance and speaks them in result order on a background task,
//! one at a time. Starting a new narration first cancels the one in
//! progress and waits for it to stop, so utterances from two runs never
//! overlap or interleave.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dronelens_core::comparison::ComparisonResult;
use dronelens_core::summary::{is_error_text, spoken_summary};
use dronelens_events::{EventBus, EventKind};

use crate::speech::SpeechSink;

/// One line to speak, with the model it summarizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub model_id: String,
    pub text: String,
}

/// Utterances for `results`, in order. Failed results and any text that
/// reads as an error are skipped.
pub fn plan(results: &[ComparisonResult]) -> Vec<Utterance> {
    results
        .iter()
        .filter(|r| r.is_success() && !is_error_text(&r.text))
        .filter_map(|r| {
            spoken_summary(&r.text).map(|text| Utterance {
                model_id: r.model_id.clone(),
                text,
            })
        })
        .collect()
}

struct Narration {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct NarrationSequencer {
    sink: Arc<dyn SpeechSink>,
    bus: Option<Arc<EventBus>>,
    current: Option<Narration>,
}

impl NarrationSequencer {
    pub fn new(sink: Arc<dyn SpeechSink>) -> Self {
        Self {
            sink,
            bus: None,
            current: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Whether a narration is still speaking.
    pub fn is_speaking(&self) -> bool {
        self.current.as_ref().is_some_and(|n| !n.handle.is_finished())
    }

    /// Start narrating `results`, replacing any narration in progress.
    ///
    /// Returns once the previous narration has stopped and the new one has
    /// been scheduled; speaking continues in the background. Returns the
    /// number of utterances scheduled.
    pub async fn narrate(&mut self, results: &[ComparisonResult]) -> usize {
        self.cancel().await;

        let utterances = plan(results);
        let count = utterances.len();
        if count == 0 {
            tracing::debug!("Nothing to narrate");
            return 0;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(speak_all(
            Arc::clone(&self.sink),
            utterances,
            cancel.clone(),
            self.bus.clone(),
        ));
        self.current = Some(Narration { cancel, handle });
        count
    }

    /// Stop the narration in progress, if any, and wait until it has
    /// stopped. The utterance being spoken is cut off.
    pub async fn cancel(&mut self) {
        let Some(narration) = self.current.take() else {
            return;
        };
        if narration.handle.is_finished() {
            return;
        }

        narration.cancel.cancel();
        if let Err(e) = narration.handle.await {
            tracing::warn!(error = %e, "Narration task ended abnormally");
        }
        tracing::info!("Narration cancelled");
        if let Some(bus) = &self.bus {
            bus.publish(EventKind::NarrationCancelled);
        }
    }

    /// Wait for the current narration to finish on its own.
    pub async fn finished(&mut self) {
        if let Some(narration) = self.current.take() {
            if let Err(e) = narration.handle.await {
                tracing::warn!(error = %e, "Narration task ended abnormally");
            }
        }
    }
}

impl Drop for NarrationSequencer {
    fn drop(&mut self) {
        if let Some(narration) = self.current.take() {
            narration.cancel.cancel();
        }
    }
}

async fn speak_all(
    sink: Arc<dyn SpeechSink>,
    utterances: Vec<Utterance>,
    cancel: CancellationToken,
    bus: Option<Arc<EventBus>>,
) {
    for utterance in utterances {
        if cancel.is_cancelled() {
            return;
        }
        tracing::info!(model = %utterance.model_id, text = %utterance.text, "Speaking");
        if let Some(bus) = &bus {
            bus.publish(EventKind::Utterance {
                model_id: utterance.model_id.clone(),
                text: utterance.text.clone(),
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            spoken = sink.speak(&utterance.text) => {
                if let Err(e) = spoken {
                    tracing::warn!(model = %utterance.model_id, error = %e, "Speech failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::speech::SpeechError;

    /// Records start, end and cut-off of each utterance.
    struct RecordingSink {
        log: Arc<Mutex<Vec<String>>>,
        duration: Duration,
    }

    struct CutOff {
        log: Arc<Mutex<Vec<String>>>,
        text: String,
        done: bool,
    }

    impl Drop for CutOff {
        fn drop(&mut self) {
            if !self.done {
                self.log.lock().unwrap().push(format!("cut:{}", self.text));
            }
        }
    }

    #[async_trait]
    impl SpeechSink for RecordingSink {
        async fn speak(&self, text: &str) -> Result<(), SpeechError> {
            self.log.lock().unwrap().push(format!("start:{text}"));
            let mut guard = CutOff {
                log: Arc::clone(&self.log),
                text: text.to_string(),
                done: false,
            };
            tokio::time::sleep(self.duration).await;
            guard.done = true;
            self.log.lock().unwrap().push(format!("end:{text}"));
            Ok(())
        }
    }

    fn sink(ms: u64) -> (Arc<RecordingSink>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(RecordingSink {
            log: Arc::clone(&log),
            duration: Duration::from_millis(ms),
        });
        (sink, log)
    }

    fn success(model: &str, text: &str) -> ComparisonResult {
        ComparisonResult::success(model, text, Duration::from_millis(10))
    }

    #[test]
    fn plan_skips_failures_and_error_text() {
        let results = vec![
            success("a", "Lots of detail here. Summary: go left"),
            ComparisonResult::failure("b", "HTTP 500", Duration::ZERO),
            success("c", "An error occurred while loading the model."),
        ];
        assert_eq!(
            plan(&results),
            vec![Utterance {
                model_id: "a".into(),
                text: "go left".into(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn speaks_one_at_a_time_in_order() {
        let (sink, log) = sink(100);
        let mut narrator = NarrationSequencer::new(sink);

        let scheduled = narrator
            .narrate(&[success("a", "First one."), success("b", "Second one.")])
            .await;
        assert_eq!(scheduled, 2);
        narrator.finished().await;

        assert_eq!(
            *log.lock().unwrap(),
            ["start:First one", "end:First one", "start:Second one", "end:Second one"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn new_run_cuts_off_previous_before_speaking() {
        let (sink, log) = sink(1_000);
        let mut narrator = NarrationSequencer::new(sink);

        narrator
            .narrate(&[success("a", "Old first."), success("b", "Old second.")])
            .await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        narrator.narrate(&[success("a", "New one.")]).await;
        narrator.finished().await;

        assert_eq!(
            *log.lock().unwrap(),
            ["start:Old first", "cut:Old first", "start:New one", "end:New one"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_and_notifies() {
        let (sink, log) = sink(1_000);
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut narrator = NarrationSequencer::new(sink).with_event_bus(bus);

        narrator.narrate(&[success("a", "Something moved.")]).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(narrator.is_speaking());

        narrator.cancel().await;
        assert!(!narrator.is_speaking());
        assert_eq!(
            *log.lock().unwrap(),
            ["start:Something moved", "cut:Something moved"]
        );

        let mut saw_cancel = false;
        while let Ok(event) = rx.try_recv() {
            saw_cancel |= matches!(event.kind, EventKind::NarrationCancelled);
        }
        assert!(saw_cancel);
    }

    #[tokio::test]
    async fn nothing_to_say_schedules_nothing() {
        let (sink, log) = sink(0);
        let mut narrator = NarrationSequencer::new(sink);
        let scheduled = narrator
            .narrate(&[ComparisonResult::timeout("a", Duration::from_secs(300))])
            .await;
        assert_eq!(scheduled, 0);
        assert!(!narrator.is_speaking());
        assert!(log.lock().unwrap().is_empty());
    }
}
