//! One-line renderings of bus events for the console.

use tokio::sync::broadcast::{self, error::RecvError};

use dronelens_core::report::ReportOutcome;
use dronelens_events::{Event, EventKind};

/// Describe `event` for the operator, or `None` for events the console
/// reports elsewhere.
pub fn render_event(event: &Event) -> Option<String> {
    let line = match &event.kind {
        // The status line is printed as the command's reply.
        EventKind::SessionChanged(_) => return None,
        EventKind::TelemetryUpdated(t) => {
            let battery = t.battery.map_or_else(|| "?".to_string(), |b| format!("{b}%"));
            let signal = t.signal.map_or_else(|| "?".to_string(), |s| s.to_string());
            format!("telemetry: battery {battery}, signal {signal}")
        }
        EventKind::SlotChanged { slot, filled } => {
            let state = if *filled { "captured" } else { "live preview" };
            format!("photo {slot}: {state}")
        }
        EventKind::RunStarted { models, .. } => {
            format!("comparing on {} model(s): {}", models.len(), models.join(", "))
        }
        EventKind::RunSettled { outcome, results, .. } => {
            let ok = results.iter().filter(|r| r.is_success()).count();
            format!("comparison settled ({outcome:?}): {ok}/{} succeeded", results.len())
        }
        EventKind::RunDiscarded { .. } => "comparison discarded".to_string(),
        EventKind::ReportSubmitted(submission) => match &submission.outcome {
            ReportOutcome::Success {
                reference_url: Some(url),
            } => format!("report archived: {url}"),
            ReportOutcome::Success { reference_url: None } => "report archived".to_string(),
            ReportOutcome::Failed { reason } => format!("report failed: {reason}"),
        },
        EventKind::Utterance { model_id, text } => format!("[{model_id}] says: {text}"),
        EventKind::NarrationCancelled => "narration stopped".to_string(),
        EventKind::CommandCompleted {
            command,
            sent,
            error,
        } => match (sent, error) {
            (_, Some(e)) => format!("{command} failed: {e}"),
            (true, None) => format!("{command} acknowledged"),
            (false, None) => return None,
        },
    };
    Some(line)
}

/// Print events until the bus closes.
pub async fn print_events(mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = render_event(&event) {
                    println!("  * {line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
