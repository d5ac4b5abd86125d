//! Session Manager - Generation Lifecycle
//!
//! Owns the file selection, the single in-flight request, the installed
//! result with its decoded resources, and the transient notification.
//!
//! Lifecycle: `Idle -> Validating -> Submitting -> (Succeeded | Failed |
//! Cancelled) -> Idle`. Validation runs synchronously inside [`Session::submit`].
//! Request tasks and timers report back through an event channel, and the
//! host drives the session with [`Session::step`] / [`Session::settle`].
//!
//! All session methods that spawn work must be called from within a Tokio
//! runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ApiAsset, ClientError, GenerateResponse, GenerationEngine, PaletteEntry};
use crate::codec::{CodecError, Resource, ResourceHandle, ResourceStore};
use crate::config::SessionConfig;
use crate::constraints::ConstraintTable;
use crate::notification::{cancel_timer, Notification, Timer};
use crate::submission::{CandidateFile, FormValues, Parameters, Submission};
use crate::validation::{validate_file, validate_form, ValidationIssue};

pub const GENERATING_MESSAGE: &str = "Generating your kit…";
pub const READY_MESSAGE: &str = "Your kit is ready to view and download.";
pub const FALLBACK_FAILURE_MESSAGE: &str = "Request failed. Try again.";

pub type RequestId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Submitting,
}

/// How the most recent request that was allowed to settle ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultTab {
    #[default]
    Outline,
    Preview,
    Palette,
    Legend,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Outline,
    Preview,
    Legend,
}

impl AssetKind {
    pub fn fallback_filename(&self) -> &'static str {
        match self {
            AssetKind::Outline => "outline.png",
            AssetKind::Preview => "preview.png",
            AssetKind::Legend => "legend.pdf",
        }
    }
}

/// A returned asset after its payload has been decoded into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledAsset {
    pub kind: AssetKind,
    pub filename: String,
    pub media_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub handle: ResourceHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub outline: InstalledAsset,
    pub preview: InstalledAsset,
    pub legend: InstalledAsset,
    pub palette: Vec<PaletteEntry>,
    pub parameters: Parameters,
    pub source_name: String,
    pub received_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn assets(&self) -> [&InstalledAsset; 3] {
        [&self.outline, &self.preview, &self.legend]
    }

    pub fn asset(&self, kind: AssetKind) -> &InstalledAsset {
        match kind {
            AssetKind::Outline => &self.outline,
            AssetKind::Preview => &self.preview,
            AssetKind::Legend => &self.legend,
        }
    }

    pub fn handles(&self) -> [&ResourceHandle; 3] {
        [&self.outline.handle, &self.preview.handle, &self.legend.handle]
    }
}

#[derive(Debug)]
pub enum SessionEvent {
    Settled {
        request_id: RequestId,
        outcome: Result<GenerateResponse, ClientError>,
    },
    NotificationExpired { id: Uuid },
    IndicatorReleased { request_id: RequestId },
}

#[derive(Debug)]
struct InFlight {
    id: RequestId,
    token: CancellationToken,
    task: JoinHandle<()>,
    engine_task: AbortHandle,
    parameters: Parameters,
    source_name: String,
}

pub struct Session<E: GenerationEngine> {
    engine: Arc<E>,
    config: SessionConfig,
    table: ConstraintTable,
    file: Option<CandidateFile>,
    form: FormValues,
    in_flight: Option<InFlight>,
    result: Option<GenerationResult>,
    resources: ResourceStore,
    active_tab: ResultTab,
    last_outcome: Option<Outcome>,
    notification: Option<Notification>,
    notification_timer: Option<Timer>,
    indicator: Option<RequestId>,
    indicator_timer: Option<Timer>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<E: GenerationEngine> Session<E> {
    pub fn new(engine: Arc<E>, config: SessionConfig) -> Self {
        Self::with_table(engine, config, ConstraintTable::standard())
    }

    pub fn with_table(engine: Arc<E>, config: SessionConfig, table: ConstraintTable) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let form = FormValues::defaults(&table);
        Self {
            engine,
            config,
            table,
            file: None,
            form,
            in_flight: None,
            result: None,
            resources: ResourceStore::new(),
            active_tab: ResultTab::default(),
            last_outcome: None,
            notification: None,
            notification_timer: None,
            indicator: None,
            indicator_timer: None,
            events_tx,
            events_rx,
        }
    }

    // --- Inputs ---

    /// Replace the file selection.
    ///
    /// An accepted file clears the displayed result. A rejected one clears the
    /// selection and is reported to the caller only.
    pub fn select_file(&mut self, candidate: Option<CandidateFile>) -> Result<(), ValidationIssue> {
        if let Some(issue) = validate_file(candidate.as_ref(), &self.table) {
            debug!(rule = %issue.rule, "file selection rejected");
            self.file = None;
            return Err(issue);
        }
        self.file = candidate;
        self.retire_result();
        Ok(())
    }

    pub fn set_form(&mut self, values: FormValues) {
        self.form = values;
    }

    pub fn set_num_colors(&mut self, value: f64) {
        self.form = FormValues { num_colors: value, ..self.form };
    }

    pub fn set_max_width(&mut self, value: f64) {
        self.form = FormValues { max_width: value, ..self.form };
    }

    pub fn set_min_region_size(&mut self, value: f64) {
        self.form = FormValues { min_region_size: value, ..self.form };
    }

    pub fn select_tab(&mut self, tab: ResultTab) {
        self.active_tab = tab;
    }

    // --- Lifecycle ---

    /// Validate the current inputs and, if they pass, start a new request.
    ///
    /// Any previous request is cancelled and the previous result's resources
    /// are released before the new request is issued.
    pub fn submit(&mut self) -> Result<RequestId, ValidationIssue> {
        let submission = match self.checked_submission() {
            Ok(submission) => submission,
            Err(issue) => return Err(self.reject(issue)),
        };

        self.cancel_in_flight();
        self.retire_result();
        self.notify(Notification::info(GENERATING_MESSAGE));

        let request_id = Uuid::new_v4();
        let token = CancellationToken::new();
        cancel_timer(&mut self.indicator_timer);
        self.indicator = Some(request_id);

        info!(
            request_id = %request_id,
            file = %submission.file.name,
            bytes = submission.file.size(),
            num_colors = submission.parameters.num_colors,
            max_width = submission.parameters.max_width,
            min_region_size = submission.parameters.min_region_size,
            "submitting generation request"
        );

        let parameters = submission.parameters;
        let source_name = submission.file.name.clone();
        let engine = Arc::clone(&self.engine);
        let events = self.events_tx.clone();
        let cancel = token.clone();
        // The engine runs in its own task so a panic still settles the request.
        let call = tokio::spawn(async move { engine.generate(submission, cancel).await });
        let engine_task = call.abort_handle();
        let task = tokio::spawn(async move {
            let outcome = match call.await {
                Ok(outcome) => outcome,
                Err(err) if err.is_cancelled() => Err(ClientError::Cancelled),
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "generation engine panicked");
                    Err(ClientError::EngineStopped)
                }
            };
            let _ = events.send(SessionEvent::Settled { request_id, outcome });
        });

        self.in_flight = Some(InFlight {
            id: request_id,
            token,
            task,
            engine_task,
            parameters,
            source_name,
        });
        Ok(request_id)
    }

    /// Snapshot the current inputs, fail-fast on the first violated rule.
    pub fn checked_submission(&self) -> Result<Submission, ValidationIssue> {
        let file = self.file.as_ref();
        if let Some(issue) = validate_file(file, &self.table)
            .or_else(|| validate_form(&self.form, &self.table))
        {
            return Err(issue);
        }
        let file = file.cloned().ok_or_else(ValidationIssue::missing_file)?;
        Ok(Submission {
            file,
            parameters: Parameters::from_validated(&self.form),
        })
    }

    /// Wait for the next event and apply it.
    pub async fn step(&mut self) {
        if let Some(event) = self.events_rx.recv().await {
            self.apply(event);
        }
    }

    /// Apply every event that is already queued. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Step until no request is in flight.
    pub async fn settle(&mut self) {
        while self.in_flight.is_some() {
            self.step().await;
        }
    }

    /// Step until no request is in flight and no timer is pending.
    pub async fn run_until_quiet(&mut self) {
        while !self.is_quiet() {
            self.step().await;
        }
    }

    /// Tear the session down: cancel the request, free resources, stop timers.
    pub fn shutdown(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.token.cancel();
            flight.engine_task.abort();
            flight.task.abort();
        }
        self.result = None;
        let freed = self.resources.release_all();
        cancel_timer(&mut self.notification_timer);
        cancel_timer(&mut self.indicator_timer);
        self.notification = None;
        self.indicator = None;
        while self.events_rx.try_recv().is_ok() {}
        debug!(freed, "session shut down");
    }

    fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Settled { request_id, outcome } => self.on_settled(request_id, outcome),
            SessionEvent::NotificationExpired { id } => {
                if self.notification.as_ref().is_some_and(|n| n.id == id) {
                    self.notification = None;
                    self.notification_timer = None;
                }
            }
            SessionEvent::IndicatorReleased { request_id } => {
                if self.indicator == Some(request_id) {
                    self.indicator = None;
                    self.indicator_timer = None;
                }
            }
        }
    }

    fn on_settled(&mut self, request_id: RequestId, outcome: Result<GenerateResponse, ClientError>) {
        let current = self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.id == request_id && !f.token.is_cancelled());
        if !current {
            debug!(request_id = %request_id, "discarding response for superseded request");
            return;
        }
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        self.schedule_indicator_release(request_id);

        match outcome {
            Ok(response) => match self.install(response, &flight) {
                Ok(()) => {
                    info!(request_id = %request_id, "generation succeeded");
                    self.last_outcome = Some(Outcome::Succeeded);
                    self.notify(Notification::success(READY_MESSAGE, self.config.success_ttl()));
                }
                Err(err) => self.fail(request_id, err.to_string()),
            },
            Err(ClientError::Cancelled) => {
                debug!(request_id = %request_id, "request cancelled");
            }
            Err(err) => self.fail(request_id, err.to_string()),
        }
    }

    fn install(&mut self, response: GenerateResponse, flight: &InFlight) -> Result<(), CodecError> {
        let outline = self.materialize(AssetKind::Outline, &response.image)?;
        let preview = match self.materialize(AssetKind::Preview, &response.preview) {
            Ok(asset) => asset,
            Err(err) => {
                self.resources.release([&outline.handle]);
                return Err(err);
            }
        };
        let legend = match self.materialize(AssetKind::Legend, &response.legend) {
            Ok(asset) => asset,
            Err(err) => {
                self.resources.release([&outline.handle, &preview.handle]);
                return Err(err);
            }
        };

        self.retire_result();
        self.result = Some(GenerationResult {
            outline,
            preview,
            legend,
            palette: response.palette,
            parameters: flight.parameters,
            source_name: flight.source_name.clone(),
            received_at: Utc::now(),
        });
        self.active_tab = ResultTab::Outline;
        Ok(())
    }

    fn materialize(&mut self, kind: AssetKind, asset: &ApiAsset) -> Result<InstalledAsset, CodecError> {
        let handle = self.resources.decode(&asset.data, &asset.content_type)?;
        Ok(InstalledAsset {
            kind,
            filename: asset.filename.clone(),
            media_type: asset.content_type.clone(),
            width: asset.width,
            height: asset.height,
            handle,
        })
    }

    fn fail(&mut self, request_id: RequestId, message: String) {
        let message = if message.trim().is_empty() {
            FALLBACK_FAILURE_MESSAGE.to_string()
        } else {
            message
        };
        warn!(request_id = %request_id, error = %message, "generation failed");
        self.last_outcome = Some(Outcome::Failed);
        self.notify(Notification::error(message, self.config.error_ttl()));
    }

    fn reject(&mut self, issue: ValidationIssue) -> ValidationIssue {
        debug!(rule = %issue.rule, "submission rejected");
        self.notify(Notification::error(issue.message.clone(), self.config.validation_ttl()));
        issue
    }

    fn cancel_in_flight(&mut self) {
        if let Some(prev) = self.in_flight.take() {
            debug!(request_id = %prev.id, "cancelling superseded request");
            prev.token.cancel();
        }
    }

    fn retire_result(&mut self) {
        if let Some(prev) = self.result.take() {
            let freed = self.resources.release(prev.handles());
            debug!(freed, "previous result released");
        }
    }

    /// Show `notification`, replacing the current one and its expiry timer.
    fn notify(&mut self, notification: Notification) {
        cancel_timer(&mut self.notification_timer);
        if let Some(expiry) = notification.expiry {
            let id = notification.id;
            let events = self.events_tx.clone();
            self.notification_timer = Some(Timer::schedule(expiry, async move {
                let _ = events.send(SessionEvent::NotificationExpired { id });
            }));
        }
        self.notification = Some(notification);
    }

    fn schedule_indicator_release(&mut self, request_id: RequestId) {
        let events = self.events_tx.clone();
        self.indicator_timer = Some(Timer::schedule(self.config.indicator_linger(), async move {
            let _ = events.send(SessionEvent::IndicatorReleased { request_id });
        }));
    }

    // --- Read access ---

    pub fn phase(&self) -> Phase {
        if self.in_flight.is_some() {
            Phase::Submitting
        } else {
            Phase::Idle
        }
    }

    pub fn in_flight_request(&self) -> Option<RequestId> {
        self.in_flight.as_ref().map(|f| f.id)
    }

    pub fn is_quiet(&self) -> bool {
        self.in_flight.is_none() && self.notification_timer.is_none() && self.indicator_timer.is_none()
    }

    /// Whether the "submitting" indicator should be shown.
    pub fn indicator_visible(&self) -> bool {
        self.indicator.is_some()
    }

    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn resolve(&self, kind: AssetKind) -> Option<&Resource> {
        let result = self.result.as_ref()?;
        self.resources.resolve(&result.asset(kind).handle)
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn active_tab(&self) -> ResultTab {
        self.active_tab
    }

    pub fn file(&self) -> Option<&CandidateFile> {
        self.file.as_ref()
    }

    pub fn form(&self) -> FormValues {
        self.form
    }

    pub fn table(&self) -> &ConstraintTable {
        &self.table
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl<E: GenerationEngine> Drop for Session<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
