use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::{FullscreenSurface, SessionLoad, SessionPlatform, Stage};
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::face::{BoxPercent, FaceMonitor, FaceStatus, ScanMode, ScanPhase};
use crate::gateway::{AnswerUpload, Gateway};
use crate::guard::{GuardDecision, Redirect, RedirectReason, SessionGuard};
use crate::interview::Interview;
use crate::media::{DeviceSessionManager, Recorder, RecordingArtifact};
use crate::proctor::{Banner, GateMode, ProctorEngine};
use crate::progress::{ledger_from_answer_meta, record_now, ProgressStore};

const DEVICE_START_MESSAGE: &str = "Unable to start camera/mic. Check permissions.";
const UPLOAD_FAILED_MESSAGE: &str = "Upload failed. Please try again.";

/// Coordinates one candidate's interview: the per-question
/// record/review/upload cycle, face scans, proctoring, and progress
/// persistence. The host drives it with events and a 1s clock tick and
/// renders from its accessors.
pub struct InterviewSession<G: Gateway> {
    cfg: AppConfig,
    gateway: Arc<G>,
    device: DeviceSessionManager,
    monitor: FaceMonitor,
    proctor: Arc<Mutex<ProctorEngine>>,
    progress: ProgressStore,
    fullscreen: Box<dyn FullscreenSurface>,
    interview: Interview,
    candidate_id: String,
    candidate_token: String,
    stage: Stage,
    idx: usize,
    recording: bool,
    starting: bool,
    time_left: u32,
    artifact: Option<RecordingArtifact>,
    recorder: Option<Box<dyn Recorder>>,
    discovery_done: bool,
    shutting_down: bool,
}

impl<G: Gateway> InterviewSession<G> {
    /// Authorizes the link, fetches the interview, and restores any saved
    /// progress. A refused link resolves to a redirect, not an error; only
    /// an unreachable interviews endpoint is fatal.
    pub async fn load(
        cfg: AppConfig,
        gateway: Arc<G>,
        platform: SessionPlatform,
        interview_id: &str,
        candidate_id: &str,
        token: Option<&str>,
    ) -> AppResult<SessionLoad<G>> {
        let progress = ProgressStore::new(platform.store.clone(), interview_id, candidate_id);

        let guard = SessionGuard::new(cfg.proctor.fail_closed_token);
        if let GuardDecision::Redirect(redirect) = guard
            .authorize(gateway.as_ref(), interview_id, candidate_id, token)
            .await
        {
            progress.clear();
            return Ok(SessionLoad::Redirect(redirect));
        }

        let interview = gateway.fetch_interview(interview_id).await?;
        info!(
            "loaded interview {} with {} questions",
            interview.interview_id,
            interview.len()
        );

        let mut proctor = ProctorEngine::new(cfg.proctor.clone());
        let mut idx = 0;
        if let Some(record) = progress.restore(interview.len()) {
            idx = record.current_index;
            proctor.restore(
                record.tab_switch_count,
                ledger_from_answer_meta(&record.answer_meta),
            );
            info!("restored progress at question {}", idx + 1);
        }
        let time_left = interview.question(idx).map_or(0, |q| q.time_limit);
        proctor.set_current_question(
            interview
                .question(idx)
                .map(|q| q.id.clone())
                .unwrap_or_else(|| format!("q{}", idx + 1)),
        );

        let device = DeviceSessionManager::new(
            platform.media,
            platform.sink,
            cfg.capture.clone(),
        );
        let monitor = FaceMonitor::new(platform.detector, cfg.face.clone());

        Ok(SessionLoad::Ready(Box::new(Self {
            cfg,
            gateway,
            device,
            monitor,
            proctor: Arc::new(Mutex::new(proctor)),
            progress,
            fullscreen: platform.fullscreen,
            interview,
            candidate_id: candidate_id.to_string(),
            candidate_token: token.unwrap_or_default().to_string(),
            stage: Stage::Question,
            idx,
            recording: false,
            starting: false,
            time_left,
            artifact: None,
            recorder: None,
            discovery_done: false,
            shutting_down: false,
        })))
    }

    /// Brings the preview up and runs the one-time discovery scan.
    pub async fn begin(&mut self) {
        self.device.ensure_preview().await;
        if !self.discovery_done {
            self.discovery_done = true;
            let locked = self
                .monitor
                .run_scan(ScanMode::Discovery, &mut self.device)
                .await;
            debug!("discovery scan locked={locked}");
        }
    }

    /// Starts recording the current question. Refused outside fullscreen
    /// (the enter gate goes up instead) and while another start is in
    /// flight.
    pub async fn start_recording(&mut self, now: DateTime<Utc>) -> bool {
        if self.stage != Stage::Question || self.recording || self.starting {
            return false;
        }
        if !self.fullscreen.is_active() {
            self.proctor.lock().raise_enter_gate();
            return false;
        }

        self.starting = true;
        let started = self.try_start(now).await;
        self.starting = false;
        started
    }

    async fn try_start(&mut self, now: DateTime<Utc>) -> bool {
        // a blocked or failed preview refuses the start; the gesture
        // fallback may repair it before the next attempt
        if !self.device.ensure_preview().await || self.device.tracks_ended() {
            self.proctor.lock().push_banner(DEVICE_START_MESSAGE, now);
            return false;
        }

        // quick framing check; recording proceeds even if it never locks
        let _ = self.monitor.run_scan(ScanMode::Mini, &mut self.device).await;

        let mime = self.device.pick_mime();
        let mut recorder = match self.device.make_recorder(&mime) {
            Ok(r) => r,
            Err(err) => {
                warn!("recorder creation failed: {err}");
                self.proctor.lock().push_banner(DEVICE_START_MESSAGE, now);
                return false;
            }
        };
        if let Err(err) = recorder.start(self.cfg.capture.chunk_interval) {
            warn!("recorder start failed: {err:#}");
            self.proctor.lock().push_banner(DEVICE_START_MESSAGE, now);
            return false;
        }

        let (qid, limit) = self
            .interview
            .question(self.idx)
            .map(|q| (q.id.clone(), q.time_limit))
            .unwrap_or_else(|| {
                (
                    format!("q{}", self.idx + 1),
                    crate::interview::DEFAULT_TIME_LIMIT_SECS,
                )
            });
        self.recorder = Some(recorder);
        self.artifact = None;
        self.time_left = limit;
        self.recording = true;
        self.monitor.start_continuous(self.proctor.clone());
        info!("⏺️ recording started for question {qid} ({mime})");
        true
    }

    /// One-second clock tick: flushes ledger entries the monitor task
    /// appended since the last save, and drives the countdown; recording
    /// stops itself at zero.
    pub fn tick_second(&mut self, now: DateTime<Utc>) {
        if self.proctor.lock().ledger_dirty() {
            self.save_progress();
        }
        if !self.recording {
            return;
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            info!("time limit reached, stopping recording");
            self.stop_recording(now);
        }
    }

    /// Finalizes capture and switches the surface to review playback.
    pub fn stop_recording(&mut self, now: DateTime<Utc>) {
        if !self.recording {
            return;
        }
        self.recording = false;
        self.monitor.stop_timers();
        // last-moment monitor warnings must not be lost on a reload
        // between stop and upload
        if self.proctor.lock().ledger_dirty() {
            self.save_progress();
        }

        let Some(mut recorder) = self.recorder.take() else {
            return;
        };
        match recorder.stop() {
            Ok(artifact) => {
                if let Err(err) = self.device.sink().show_playback(&artifact) {
                    debug!("playback surface switch failed: {err:#}");
                }
                self.artifact = Some(artifact);
                self.device.stop_stream();
                self.stage = Stage::Review;
            }
            Err(err) => {
                warn!("recorder stop failed: {err:#}");
                self.proctor
                    .lock()
                    .push_banner("Recording failed. Please try again.", now);
            }
        }
    }

    /// Discards the review take and returns to the question.
    pub async fn re_record(&mut self) {
        if self.stage != Stage::Review {
            return;
        }
        self.artifact = None;
        self.device.ensure_preview().await;
        self.time_left = self
            .interview
            .question(self.idx)
            .map_or(0, |q| q.time_limit);
        self.stage = Stage::Question;
    }

    /// Uploads the reviewed answer. On success the session advances to the
    /// next question, or finishes with a completed redirect after the last
    /// one. On failure the artifact is kept so the candidate can retry.
    pub async fn upload_answer(&mut self, now: DateTime<Utc>) -> AppResult<Option<Redirect>> {
        if self.stage != Stage::Review {
            return Ok(None);
        }
        let Some(artifact) = self.artifact.take() else {
            return Ok(None);
        };
        self.stage = Stage::Uploading;

        let qid = self
            .interview
            .question(self.idx)
            .map(|q| q.id.clone())
            .unwrap_or_else(|| format!("q{}", self.idx + 1));
        let (tab_switch_count, total_warnings, question_warnings) = {
            let engine = self.proctor.lock();
            (
                engine.tab_switch_count(),
                engine.total_warning_count(),
                engine.warnings_for(&qid).to_vec(),
            )
        };

        let result = self
            .gateway
            .upload_answer(AnswerUpload {
                interview_id: &self.interview.interview_id,
                question_id: &qid,
                candidate_token: &self.candidate_token,
                artifact: &artifact,
                tab_switch_count,
                total_warnings,
                question_warnings: &question_warnings,
                user_agent: &self.cfg.api.user_agent,
            })
            .await;

        match result {
            Ok(()) => {
                let next = self.idx + 1;
                if next < self.interview.len() {
                    self.advance_to(next).await;
                    Ok(None)
                } else {
                    info!("✅ all answers uploaded");
                    self.progress.clear();
                    Ok(Some(self.finish(RedirectReason::Completed)))
                }
            }
            Err(err) => {
                warn!("answer upload failed: {err}");
                self.artifact = Some(artifact);
                self.stage = Stage::Review;
                self.proctor.lock().push_banner(UPLOAD_FAILED_MESSAGE, now);
                Err(err)
            }
        }
    }

    async fn advance_to(&mut self, next: usize) {
        self.idx = next;
        let (qid, limit) = self
            .interview
            .question(next)
            .map(|q| (q.id.clone(), q.time_limit))
            .unwrap_or_else(|| (format!("q{}", next + 1), 0));
        self.proctor.lock().set_current_question(qid);
        self.save_progress();

        self.device.ensure_preview().await;
        let _ = self.monitor.run_scan(ScanMode::Mini, &mut self.device).await;
        self.time_left = limit;
        self.stage = Stage::Question;
        info!("✅ answer uploaded, now on question {}", next + 1);
    }

    /// Terminal transition; everything after this is a no-op.
    fn finish(&mut self, reason: RedirectReason) -> Redirect {
        self.shutting_down = true;
        self.proctor.lock().begin_shutdown();
        self.stage = Stage::Done;
        self.teardown();
        Redirect::new(
            self.interview.interview_id.clone(),
            self.candidate_id.clone(),
            reason,
        )
    }

    fn teardown(&mut self) {
        self.monitor.shutdown();
        if let Some(mut recorder) = self.recorder.take() {
            let _ = recorder.stop();
        }
        self.recording = false;
        self.device.release();
        if self.fullscreen.is_active() {
            self.fullscreen.exit();
        }
        self.progress.clear();
    }

    fn save_progress(&self) {
        let mut engine = self.proctor.lock();
        self.progress.save(&record_now(
            self.idx,
            engine.tab_switch_count(),
            engine.ledger(),
        ));
        engine.mark_ledger_saved();
    }

    // ---- proctoring events from the host ----

    pub fn handle_visibility_hidden(&mut self, now: DateTime<Utc>) {
        if self.shutting_down {
            return;
        }
        self.proctor.lock().on_visibility_hidden(now);
        self.save_progress();
    }

    pub fn handle_window_blur(&mut self, now: DateTime<Utc>) {
        if self.shutting_down {
            return;
        }
        self.proctor.lock().on_window_blur(now);
        self.save_progress();
    }

    pub fn handle_fullscreen_change(&mut self, active: bool, now: DateTime<Utc>) {
        if self.shutting_down {
            return;
        }
        self.proctor.lock().on_fullscreen_change(active, now);
        self.save_progress();
    }

    /// Attempts to (re)enter fullscreen from a user gesture.
    pub fn return_to_fullscreen(&mut self, now: DateTime<Utc>) -> bool {
        match self.fullscreen.request() {
            Ok(()) => {
                self.proctor.lock().on_fullscreen_change(true, now);
                true
            }
            Err(err) => {
                debug!("fullscreen request refused: {err:#}");
                false
            }
        }
    }

    // ---- render accessors ----

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn question_index(&self) -> usize {
        self.idx
    }

    pub fn current_question(&self) -> Option<&crate::interview::Question> {
        self.interview.question(self.idx)
    }

    pub fn interview(&self) -> &Interview {
        &self.interview
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn artifact(&self) -> Option<&RecordingArtifact> {
        self.artifact.as_ref()
    }

    pub fn banners(&self, now: DateTime<Utc>) -> Vec<Banner> {
        self.proctor.lock().banners(now)
    }

    pub fn face_status(&self) -> FaceStatus {
        self.monitor.status()
    }

    pub fn face_box(&self) -> Option<BoxPercent> {
        self.monitor.face_box()
    }

    pub fn scan_phase(&self) -> ScanPhase {
        self.monitor.phase()
    }

    pub fn fullscreen_gate(&self) -> Option<GateMode> {
        self.proctor.lock().fullscreen_gate()
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.proctor.lock().tab_switch_count()
    }

    pub fn total_warnings(&self) -> usize {
        self.proctor.lock().total_warning_count()
    }

    /// Face detection could not initialize; the interview continues
    /// without face proctoring.
    pub fn proctoring_degraded(&self) -> bool {
        self.monitor.degraded()
    }

    pub fn permission_error(&self) -> Option<String> {
        self.device.permission_error().map(str::to_string)
    }

    pub fn overall_pct(&self) -> u32 {
        self.interview.overall_pct(self.idx)
    }

    /// Fraction of the current question's time remaining, for the clock
    /// ring.
    pub fn time_fraction(&self) -> f32 {
        match self.current_question() {
            Some(q) if q.time_limit > 0 => self.time_left as f32 / q.time_limit as f32,
            _ => 0.0,
        }
    }
}
