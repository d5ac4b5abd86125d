//! Session Lifecycle Invariant Tests
//!
//! These tests drive a real `Session` against a scripted engine on a
//! paused Tokio clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use paintkit_core::{
    client::request_failed,
    codec::encode_payload,
    ApiAsset, CandidateFile, ClientError, FormValues, GenerateResponse, GenerationEngine,
    NotificationKind, Outcome, PaletteEntry, Phase, ResultTab, Session, SessionConfig, SessionView,
    Submission,
};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

const MIB: usize = 1024 * 1024;

enum Reply {
    Kit { colors: u32 },
    Failure(&'static str),
}

struct Script {
    delay: Duration,
    honor_cancel: bool,
    reply: Reply,
}

impl Script {
    fn kit(colors: u32, delay_ms: u64) -> Self {
        Self { delay: Duration::from_millis(delay_ms), honor_cancel: true, reply: Reply::Kit { colors } }
    }

    fn failure(message: &'static str, delay_ms: u64) -> Self {
        Self { delay: Duration::from_millis(delay_ms), honor_cancel: true, reply: Reply::Failure(message) }
    }

    fn ignoring_cancel(mut self) -> Self {
        self.honor_cancel = false;
        self
    }
}

#[derive(Default)]
struct ScriptedEngine {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    overlaps: AtomicUsize,
    live: Mutex<Vec<(usize, CancellationToken)>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedEngine {
    fn with(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self { scripts: Mutex::new(scripts.into()), ..Default::default() })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }
}

fn asset(filename: &str, content_type: &str, bytes: &[u8], dims: Option<(u32, u32)>) -> ApiAsset {
    ApiAsset {
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        width: dims.map(|d| d.0),
        height: dims.map(|d| d.1),
        data: encode_payload(bytes),
    }
}

fn kit(colors: u32) -> GenerateResponse {
    GenerateResponse {
        image: asset("photo_paint_by_numbers.png", "image/png", b"outline-png", Some((2000, 1500))),
        preview: asset("photo_painted_preview.png", "image/png", b"preview-png", Some((2000, 1500))),
        legend: asset("photo_palette_legend.pdf", "application/pdf", b"%PDF-1.4", None),
        palette: (1..=colors)
            .map(|n| PaletteEntry {
                number: n,
                rgb: [n as u8, 0, 0],
                hex: format!("#{:02x}0000", n),
            })
            .collect(),
    }
}

impl GenerationEngine for ScriptedEngine {
    async fn generate(
        &self,
        submission: Submission,
        cancel: CancellationToken,
    ) -> Result<GenerateResponse, ClientError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut live = self.live.lock().unwrap();
            if live.iter().any(|(_, t)| !t.is_cancelled()) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            live.push((call, cancel.clone()));
        }
        self.tokens.lock().unwrap().push(cancel.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::kit(submission.parameters.num_colors, 10));

        if script.honor_cancel {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(script.delay) => {}
            }
        } else {
            tokio::time::sleep(script.delay).await;
        }
        self.live.lock().unwrap().retain(|(id, _)| *id != call);

        if script.honor_cancel && cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        match script.reply {
            Reply::Kit { colors } => Ok(kit(colors)),
            Reply::Failure(body) => Err(request_failed(StatusCode::INTERNAL_SERVER_ERROR, body)),
        }
    }
}

fn png(size: usize) -> CandidateFile {
    CandidateFile::new("photo.png", "image/png", vec![7u8; size])
}

fn session_with(engine: &Arc<ScriptedEngine>) -> Session<ScriptedEngine> {
    let mut session = Session::new(Arc::clone(engine), SessionConfig::default());
    session.select_file(Some(png(2 * MIB))).unwrap();
    session.set_form(FormValues { num_colors: 8.0, max_width: 2000.0, min_region_size: 300.0 });
    session
}

#[tokio::test(start_paused = true)]
async fn invariant_oversized_upload_never_reaches_network() {
    let engine = ScriptedEngine::with(vec![]);
    let mut session = Session::new(Arc::clone(&engine), SessionConfig::default());

    let issue = session.select_file(Some(png(20 * MIB))).unwrap_err();
    assert_eq!(issue.message, "File is too large. Maximum size is 15 MB.");

    let issue = session.submit().unwrap_err();
    assert_eq!(issue.message, "Choose a PNG or JPEG image to continue.");
    let note = session.notification().unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
    assert_eq!(session.phase(), Phase::Idle);

    tokio::task::yield_now().await;
    assert_eq!(engine.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn invariant_form_issue_reported_without_request() {
    let engine = ScriptedEngine::with(vec![]);
    let mut session = session_with(&engine);
    session.set_num_colors(20.0);

    let issue = session.submit().unwrap_err();
    assert_eq!(issue.message, "Number of colors must be between 3 and 16.");
    assert_eq!(session.notification().unwrap().message, issue.message);
    assert!(session.in_flight_request().is_none());
    assert!(!session.indicator_visible());

    tokio::task::yield_now().await;
    assert_eq!(engine.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn invariant_successful_generation_installs_three_handles() {
    let engine = ScriptedEngine::with(vec![Script::kit(8, 50)]);
    let mut session = session_with(&engine);
    session.select_tab(ResultTab::Palette);

    session.submit().unwrap();
    assert_eq!(session.phase(), Phase::Submitting);
    assert!(session.indicator_visible());
    assert_eq!(session.notification().unwrap().kind, NotificationKind::Info);

    session.settle().await;
    assert_eq!(session.last_outcome(), Some(Outcome::Succeeded));
    assert_eq!(session.resources().live_count(), 3);
    assert_eq!(session.active_tab(), ResultTab::Outline);
    assert_eq!(session.notification().unwrap().kind, NotificationKind::Success);

    let view = SessionView::project(&session);
    let result = view.result.unwrap();
    assert_eq!(result.palette_summary.total, 8);
    assert_eq!(result.palette_summary.first.as_deref(), Some("#010000"));
    assert_eq!(result.palette_summary.last.as_deref(), Some("#080000"));
    assert_eq!(result.outline.dimensions, "2000 × 1500px");
    assert_eq!(result.legend.dimensions, "—");
    assert_eq!(view.file.unwrap().size, "2.0 MB");
    assert_eq!(engine.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn invariant_engine_failure_surfaces_body_verbatim() {
    let engine = ScriptedEngine::with(vec![Script::kit(5, 10), Script::failure("engine overloaded", 10)]);
    let mut session = session_with(&engine);

    session.submit().unwrap();
    session.settle().await;
    assert_eq!(session.resources().live_count(), 3);

    session.submit().unwrap();
    session.settle().await;
    assert_eq!(session.last_outcome(), Some(Outcome::Failed));
    let note = session.notification().unwrap();
    assert_eq!(note.kind, NotificationKind::Error);
    assert_eq!(note.message, "engine overloaded");
    assert_eq!(note.expiry, Some(Duration::from_millis(4500)));
    // The earlier kit was retired when the second request started.
    assert!(session.result().is_none());
    assert_eq!(session.resources().live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn invariant_validation_failure_keeps_prior_result() {
    let engine = ScriptedEngine::with(vec![Script::kit(6, 10)]);
    let mut session = session_with(&engine);
    session.submit().unwrap();
    session.settle().await;
    let before = session.result().cloned().unwrap();

    session.set_max_width(f64::NAN);
    let issue = session.submit().unwrap_err();
    assert_eq!(issue.message, "Max width must be between 400 and 4000px.");
    assert_eq!(session.result(), Some(&before));
    assert_eq!(session.resources().live_count(), 3);
    assert_eq!(engine.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn invariant_rapid_submissions_keep_one_request_and_one_result() {
    let engine = ScriptedEngine::with(vec![
        Script::kit(3, 100),
        Script::kit(4, 100),
        Script::kit(5, 100),
        Script::kit(6, 100),
        Script::kit(7, 100),
    ]);
    let mut session = session_with(&engine);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(session.submit().unwrap());
        assert_eq!(session.in_flight_request(), ids.last().copied());
        tokio::task::yield_now().await;
    }

    session.settle().await;
    session.drain();
    assert_eq!(engine.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(engine.calls(), 5);
    let tokens = engine.tokens();
    assert!(tokens[..4].iter().all(|t| t.is_cancelled()));
    assert!(!tokens[4].is_cancelled());

    assert_eq!(session.resources().live_count(), 3);
    assert_eq!(session.result().unwrap().palette.len(), 7);
    assert_eq!(session.last_outcome(), Some(Outcome::Succeeded));
}

#[tokio::test(start_paused = true)]
async fn invariant_superseded_response_changes_nothing() {
    let engine = ScriptedEngine::with(vec![
        Script::kit(9, 100).ignoring_cancel(),
        Script::failure("second failed", 300).ignoring_cancel(),
    ]);
    let mut session = session_with(&engine);

    session.submit().unwrap();
    tokio::task::yield_now().await;
    let second = session.submit().unwrap();
    let info_id = session.notification().unwrap().id;

    // The first call resolves with a full kit, but it was superseded.
    session.step().await;
    assert_eq!(session.in_flight_request(), Some(second));
    assert!(session.result().is_none());
    assert_eq!(session.resources().live_count(), 0);
    assert_eq!(session.notification().unwrap().id, info_id);
    assert_eq!(session.last_outcome(), None);

    session.settle().await;
    assert_eq!(session.notification().unwrap().message, "second failed");
    assert_eq!(session.last_outcome(), Some(Outcome::Failed));
    assert_eq!(session.resources().live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn invariant_superseded_failure_changes_nothing() {
    let engine = ScriptedEngine::with(vec![
        Script::failure("first failed", 300).ignoring_cancel(),
        Script::kit(6, 100),
    ]);
    let mut session = session_with(&engine);

    session.submit().unwrap();
    tokio::task::yield_now().await;
    session.submit().unwrap();

    session.settle().await;
    assert_eq!(session.last_outcome(), Some(Outcome::Succeeded));
    let success = session.notification().unwrap().clone();
    assert_eq!(success.kind, NotificationKind::Success);
    let installed = session.result().unwrap().clone();

    // The superseded call fails late, after the newer kit is installed.
    session.step().await;
    assert_eq!(engine.calls(), 2);
    assert_eq!(session.notification(), Some(&success));
    assert_eq!(session.result(), Some(&installed));
    assert_eq!(session.last_outcome(), Some(Outcome::Succeeded));
    assert_eq!(session.resources().live_count(), 3);
    assert!(session.indicator_visible());
}

#[tokio::test(start_paused = true)]
async fn invariant_notifications_expire_and_replace() {
    let engine = ScriptedEngine::with(vec![Script::kit(4, 10)]);
    let mut session = session_with(&engine);

    session.set_num_colors(1.0);
    session.submit().unwrap_err();
    assert_eq!(session.notification().unwrap().kind, NotificationKind::Error);

    tokio::time::sleep(Duration::from_secs(1)).await;
    session.set_num_colors(4.0);
    session.submit().unwrap();

    // The info notice replaced the validation error; its expiry must not fire.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    session.drain();
    assert_eq!(session.notification().map(|n| n.kind), Some(NotificationKind::Success));

    let start = tokio::time::Instant::now();
    session.run_until_quiet().await;
    assert!(session.notification().is_none());
    assert!(!session.indicator_visible());
    assert!(start.elapsed() <= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn invariant_indicator_outlives_instant_response() {
    let engine = ScriptedEngine::with(vec![Script::kit(4, 0)]);
    let mut session = session_with(&engine);

    session.submit().unwrap();
    session.settle().await;
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.indicator_visible());

    tokio::time::sleep(Duration::from_millis(1999)).await;
    session.drain();
    assert!(session.indicator_visible());

    tokio::time::sleep(Duration::from_millis(2)).await;
    session.drain();
    assert!(!session.indicator_visible());
}

#[tokio::test(start_paused = true)]
async fn invariant_teardown_cancels_and_releases() {
    let engine = ScriptedEngine::with(vec![Script::kit(4, 10), Script::kit(5, 1000)]);
    let mut session = session_with(&engine);

    session.submit().unwrap();
    session.settle().await;
    assert_eq!(session.resources().live_count(), 3);

    session.submit().unwrap();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(engine.tokens().len(), 2);
    drop(session);

    let tokens = engine.tokens();
    assert!(!tokens[0].is_cancelled());
    assert!(tokens[1].is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn invariant_shutdown_is_idempotent() {
    let engine = ScriptedEngine::with(vec![Script::kit(4, 10)]);
    let mut session = session_with(&engine);
    session.submit().unwrap();
    session.settle().await;

    session.shutdown();
    session.shutdown();
    assert_eq!(session.resources().live_count(), 0);
    assert!(session.result().is_none());
    assert!(session.notification().is_none());
    assert!(session.is_quiet());
}
