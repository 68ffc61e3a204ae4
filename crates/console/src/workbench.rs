//! The workbench ties the session, comparison, narration, reporting and
//! flight paths together behind one controller.
//!
//! A single control task owns the [`Workbench`] and calls it one
//! operation at a time. Narration and automatic report submission run in
//! the background so the operator can keep working while they finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use dronelens_core::capture::{CaptureBuffer, Slot};
use dronelens_core::comparison::ComparisonRun;
use dronelens_core::error::{
    CaptureError, CommandError, ComparisonError, ConnectionError, StreamError,
};
use dronelens_core::flight::{FlightCommand, DEFAULT_MOVE_CM, DEFAULT_ROTATE_DEG};
use dronelens_core::report::{ReportOutcome, ReportPayload, ReportSubmission};
use dronelens_core::session::{BackendKind, SessionSnapshot};
use dronelens_device::control::RotationControl;
use dronelens_device::local::WebcamBackend;
use dronelens_device::remote::DroneBackend;
use dronelens_device::{
    Backends, CameraSessionManager, CommandOutcome, DeviceApi, DeviceApiError, FlightCommandDispatcher,
    FlightControl,
};
use dronelens_events::{submit_and_record, EventBus, EventKind, ExternalReportSubmitter, ReportSink};
use dronelens_inference::{ComparisonOrchestrator, InferenceApi, InferenceEndpoint, InferenceError};
use dronelens_narration::{CommandSpeechSink, NarrationSequencer, SpeechError, SpeechSink};

use crate::command::{ConsoleCommand, HELP};
use crate::config::ConsoleConfig;

#[derive(Debug, thiserror::Error)]
pub enum WorkbenchError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Comparison(#[from] ComparisonError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("No comparison to report yet")]
    NoRun,

    #[error("Reporting is not configured (set REPORT_URL)")]
    ReportingDisabled,

    #[error("Setup failed: {0}")]
    Setup(String),
}

impl From<DeviceApiError> for WorkbenchError {
    fn from(e: DeviceApiError) -> Self {
        Self::Setup(e.to_string())
    }
}

impl From<InferenceError> for WorkbenchError {
    fn from(e: InferenceError) -> Self {
        Self::Setup(e.to_string())
    }
}

impl From<SpeechError> for WorkbenchError {
    fn from(e: SpeechError) -> Self {
        Self::Setup(e.to_string())
    }
}

/// Collaborators the workbench drives. Tests swap in doubles here.
pub struct Components {
    pub backends: Backends,
    pub flight: Arc<dyn FlightControl>,
    pub endpoints: Vec<Arc<dyn InferenceEndpoint>>,
    pub speech: Arc<dyn SpeechSink>,
    pub reporter: Option<Arc<dyn ReportSink>>,
}

impl Components {
    /// Build the real device, inference, speech and report clients.
    pub fn from_config(config: &ConsoleConfig) -> Result<Self, WorkbenchError> {
        let device = Arc::new(DeviceApi::new(config.device_api_url.clone())?);
        let backends = Backends {
            drone: Arc::new(DroneBackend::new(Arc::clone(&device))),
            webcam: Arc::new(WebcamBackend::new(config.webcam_device.clone())),
        };

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(InferenceError::from)?;
        let endpoints = config
            .endpoints
            .iter()
            .map(|spec| {
                let api = InferenceApi::with_client(http.clone(), spec.base_url.clone(), spec.model.clone());
                Arc::new(api) as Arc<dyn InferenceEndpoint>
            })
            .collect();

        let speech = Arc::new(CommandSpeechSink::from_command_line(&config.speech_command)?);

        let reporter = match &config.report_url {
            Some(url) => {
                let submitter =
                    ExternalReportSubmitter::new(url.clone()).map_err(|e| WorkbenchError::Setup(e.to_string()))?;
                Some(Arc::new(submitter) as Arc<dyn ReportSink>)
            }
            None => None,
        };

        Ok(Self {
            backends,
            flight: device,
            endpoints,
            speech,
            reporter,
        })
    }
}

/// What a console command produced, for printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

pub struct Workbench {
    session: CameraSessionManager,
    orchestrator: ComparisonOrchestrator,
    narrator: NarrationSequencer,
    reporter: Option<Arc<dyn ReportSink>>,
    dispatcher: FlightCommandDispatcher,
    slider: RotationControl,
    last_run: Option<ComparisonRun>,
    reports: JoinSet<()>,
    bus: Arc<EventBus>,
}

impl Workbench {
    pub fn new(components: Components, bus: Arc<EventBus>) -> Self {
        Self {
            session: CameraSessionManager::new(components.backends, BackendKind::HardwareDrone)
                .with_event_bus(Arc::clone(&bus)),
            orchestrator: ComparisonOrchestrator::new(components.endpoints)
                .with_event_bus(Arc::clone(&bus)),
            narrator: NarrationSequencer::new(components.speech).with_event_bus(Arc::clone(&bus)),
            reporter: components.reporter,
            dispatcher: FlightCommandDispatcher::new(components.flight).with_event_bus(Arc::clone(&bus)),
            slider: RotationControl::default(),
            last_run: None,
            reports: JoinSet::new(),
            bus,
        }
    }

    /// Build a workbench with real clients and the configured settings.
    pub fn from_config(config: &ConsoleConfig, bus: Arc<EventBus>) -> Result<Self, WorkbenchError> {
        let components = Components::from_config(config)?;
        Ok(Self::new(components, bus)
            .with_prompt(config.prompt.clone())
            .with_inference_timeout(config.inference_timeout)
            .with_telemetry_interval(config.telemetry_interval)
            .with_rotate_reset(config.rotate_reset))
    }

    pub fn with_prompt(mut self, prompt: String) -> Self {
        self.orchestrator = self.orchestrator.with_prompt(prompt);
        self
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.orchestrator = self.orchestrator.with_timeout(timeout);
        self
    }

    pub fn with_telemetry_interval(mut self, interval: Duration) -> Self {
        self.session = self.session.with_telemetry_interval(interval);
        self
    }

    pub fn with_rotate_reset(mut self, delay: Duration) -> Self {
        self.slider = RotationControl::new(delay);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn buffer(&self) -> &CaptureBuffer {
        self.session.buffer()
    }

    pub fn last_run(&self) -> Option<&ComparisonRun> {
        self.last_run.as_ref()
    }

    pub fn is_narrating(&self) -> bool {
        self.narrator.is_speaking()
    }

    pub fn slider_position(&self) -> i32 {
        self.slider.position()
    }

    // ---- session ----

    pub async fn connect(&mut self, kind: BackendKind) -> Result<(), WorkbenchError> {
        Ok(self.session.connect(kind).await?)
    }

    pub async fn start_stream(&mut self) -> Result<(), WorkbenchError> {
        Ok(self.session.start_stream().await?)
    }

    pub async fn stop_stream(&mut self) -> Result<(), WorkbenchError> {
        Ok(self.session.stop_stream().await?)
    }

    pub async fn capture(&mut self, slot: Slot) -> Result<(), WorkbenchError> {
        Ok(self.session.capture(slot).await?)
    }

    pub fn clear(&mut self, slot: Slot) {
        self.session.clear(slot);
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }

    // ---- comparison ----

    /// Compare the two captured photos on every model.
    ///
    /// Once the run settles its results go to narration and, when a report
    /// endpoint is configured, to a background report submission. Neither
    /// can change the returned run.
    pub async fn compare(&mut self) -> Result<&ComparisonRun, WorkbenchError> {
        self.reap_reports();
        let run = self.orchestrator.trigger(self.session.buffer()).await?;

        self.narrator.narrate(run.results()).await;
        if let (Some(reporter), Some(payload)) = (&self.reporter, ReportPayload::from_run(&run)) {
            let reporter = Arc::clone(reporter);
            let bus = Arc::clone(&self.bus);
            self.reports.spawn(async move {
                let submission = submit_and_record(reporter.as_ref(), &payload).await;
                bus.publish(EventKind::ReportSubmitted(submission));
            });
        }

        let run = self.last_run.insert(run);
        Ok(&*run)
    }

    /// Report submissions still tracked by the workbench.
    pub fn pending_reports(&self) -> usize {
        self.reports.len()
    }

    fn reap_reports(&mut self) {
        while let Some(joined) = self.reports.try_join_next() {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Report task ended abnormally");
            }
        }
    }

    /// Submit the last run again and wait for the outcome.
    pub async fn report(&mut self) -> Result<ReportSubmission, WorkbenchError> {
        let reporter = self.reporter.as_ref().ok_or(WorkbenchError::ReportingDisabled)?;
        let payload = self
            .last_run
            .as_ref()
            .and_then(ReportPayload::from_run)
            .ok_or(WorkbenchError::NoRun)?;

        let submission = submit_and_record(reporter.as_ref(), &payload).await;
        self.bus.publish(EventKind::ReportSubmitted(submission.clone()));
        Ok(submission)
    }

    /// Empty both slots, drop the last run and stop narration.
    pub async fn reset(&mut self) {
        self.narrator.cancel().await;
        self.session.reset_captures();
        if let Some(run) = self.last_run.take() {
            tracing::info!(run_id = %run.id(), "Comparison discarded");
            self.bus.publish(EventKind::RunDiscarded { run_id: run.id() });
        }
    }

    // ---- flight ----

    pub async fn fly(&self, command: FlightCommand) -> Result<CommandOutcome, WorkbenchError> {
        Ok(self
            .dispatcher
            .dispatch(self.session.active_kind(), command)
            .await?)
    }

    /// Move the rotation slider. Nothing is sent until [`release`](Self::release).
    pub fn slide(&mut self, degrees: i32) -> i32 {
        self.slider.input(degrees)
    }

    /// Release the slider, sending one rotation for its position.
    pub async fn release(&mut self) -> Result<Option<CommandOutcome>, WorkbenchError> {
        match self.slider.release() {
            Some(command) => Ok(Some(self.fly(command).await?)),
            None => Ok(None),
        }
    }

    // ---- lifecycle ----

    /// Stop narration, disconnect and wait for pending report submissions.
    pub async fn shutdown(&mut self) {
        self.narrator.cancel().await;
        self.session.disconnect().await;
        while let Some(joined) = self.reports.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Report task ended abnormally");
            }
        }
    }

    /// Run one console command and describe the result.
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<Reply, WorkbenchError> {
        let text = match command {
            ConsoleCommand::Connect(kind) => {
                self.connect(kind).await?;
                self.session.status().to_string()
            }
            ConsoleCommand::Start => {
                self.start_stream().await?;
                match self.session.feed_url() {
                    Some(url) => format!("{} ({url})", self.session.status()),
                    None => self.session.status().to_string(),
                }
            }
            ConsoleCommand::Stop => {
                self.stop_stream().await?;
                self.session.status().to_string()
            }
            ConsoleCommand::Capture(slot) => {
                self.capture(slot).await?;
                self.session.status().to_string()
            }
            ConsoleCommand::Clear(slot) => {
                self.clear(slot);
                format!("Photo {slot} cleared")
            }
            ConsoleCommand::Compare => {
                let run = self.compare().await?;
                describe_run(run)
            }
            ConsoleCommand::Report => {
                let submission = self.report().await?;
                match submission.outcome {
                    ReportOutcome::Success {
                        reference_url: Some(url),
                    } => format!("Report submitted: {url}"),
                    ReportOutcome::Success { reference_url: None } => "Report submitted".to_string(),
                    ReportOutcome::Failed { reason } => format!("Report failed: {reason}"),
                }
            }
            ConsoleCommand::Reset => {
                self.reset().await;
                self.session.status().to_string()
            }
            ConsoleCommand::Takeoff => describe_flight(FlightCommand::Takeoff, self.fly(FlightCommand::Takeoff).await?),
            ConsoleCommand::Land => describe_flight(FlightCommand::Land, self.fly(FlightCommand::Land).await?),
            ConsoleCommand::Move {
                direction,
                distance_cm,
            } => {
                let command = FlightCommand::Move {
                    direction,
                    distance_cm: distance_cm.unwrap_or(DEFAULT_MOVE_CM),
                };
                describe_flight(command, self.fly(command).await?)
            }
            ConsoleCommand::Rotate {
                direction,
                angle_deg,
            } => {
                let command = FlightCommand::Rotate {
                    direction,
                    angle_deg: angle_deg.unwrap_or(DEFAULT_ROTATE_DEG),
                };
                describe_flight(command, self.fly(command).await?)
            }
            ConsoleCommand::Slide(degrees) => format!("Slider at {}°", self.slide(degrees)),
            ConsoleCommand::Release => match self.release().await? {
                Some(CommandOutcome::Sent) => "Rotation sent".to_string(),
                Some(CommandOutcome::Skipped) => "Rotation ignored: no drone connected".to_string(),
                None => "Slider at neutral, nothing sent".to_string(),
            },
            ConsoleCommand::Status => describe_status(&self.session.snapshot(), self.session.buffer()),
            ConsoleCommand::Disconnect => {
                self.disconnect().await;
                self.session.status().to_string()
            }
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Quit => return Ok(Reply::Quit),
        };
        Ok(Reply::Text(text))
    }
}

fn describe_flight(command: FlightCommand, outcome: CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Sent => format!("{command}: done"),
        CommandOutcome::Skipped => format!("{command}: ignored, no drone connected"),
    }
}

fn describe_run(run: &ComparisonRun) -> String {
    let mut out = String::new();
    for result in run.results() {
        out.push_str(&format!(
            "== {} [{}, {} ms]\n{}\n",
            result.model_id, result.status, result.elapsed_ms, result.text
        ));
    }
    let summary = if run.all_succeeded() {
        "Comparison complete"
    } else {
        match run.results().iter().filter(|r| r.is_success()).count() {
            0 => "Comparison failed on every model",
            _ => "Comparison complete with failures",
        }
    };
    out.push_str(summary);
    out
}

fn describe_status(snapshot: &SessionSnapshot, buffer: &CaptureBuffer) -> String {
    let slot = |s: Slot| if buffer.get(s).is_some() { "captured" } else { "live" };
    let mut out = format!(
        "{} | {} | {:?}\nphoto 1: {} | photo 2: {}",
        snapshot.backend_kind,
        snapshot.connection,
        snapshot.stream,
        slot(Slot::First),
        slot(Slot::Second),
    );
    if let Some(telemetry) = &snapshot.telemetry {
        if let Some(battery) = telemetry.battery {
            out.push_str(&format!("\nbattery: {battery}%"));
        }
        if let Some(signal) = telemetry.signal {
            out.push_str(&format!("\nsignal: {signal}"));
        }
    }
    out.push_str(&format!("\n{}", snapshot.status));
    out
}
