use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::{evaluate, BoxPercent, DetectorFactory, FaceDetector, FaceKind};
use crate::cancel::{RunGuard, RunToken};
use crate::config::FaceConfig;
use crate::media::DeviceSessionManager;
use crate::proctor::ProctorEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// One-time, longer scan run once per session before the first question.
    Discovery,
    /// Short check run before each question's recording starts.
    Mini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Discover,
    Mini,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Neutral,
    Ok,
    Warn,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceStatus {
    pub tone: StatusTone,
    pub text: String,
}

impl FaceStatus {
    fn new(tone: StatusTone, text: &str) -> Self {
        Self {
            tone,
            text: text.to_string(),
        }
    }

    fn neutral() -> Self {
        Self::new(StatusTone::Neutral, "")
    }
}

/// Rolling sample window deciding when a scan has "locked" onto the face.
pub(crate) struct LockWindow {
    samples: VecDeque<bool>,
    cap: usize,
    min_samples: usize,
    min_ok: usize,
}

impl LockWindow {
    pub(crate) fn new(cap: usize, min_samples: usize, min_ok: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(cap + 1),
            cap,
            min_samples,
            min_ok,
        }
    }

    /// Records one sample and reports whether the window is stable.
    pub(crate) fn push(&mut self, ok: bool) -> bool {
        self.samples.push_back(ok);
        while self.samples.len() > self.cap {
            self.samples.pop_front();
        }
        let ok_count = self.samples.iter().filter(|s| **s).count();
        self.samples.len() >= self.min_samples && ok_count >= self.min_ok
    }
}

struct FaceShared {
    phase: ScanPhase,
    status: FaceStatus,
    face_box: Option<BoxPercent>,
}

/// Wraps the external detector and runs the three sampling modes: the
/// discovery scan, the per-question mini scan, and continuous monitoring
/// while recording. The modes are mutually exclusive; starting one tears
/// down any other active timer through the shared run token.
pub struct FaceMonitor {
    factory: Arc<dyn DetectorFactory>,
    detector: Arc<Mutex<Option<Box<dyn FaceDetector>>>>,
    init_failed: bool,
    run: RunToken,
    monitor_task: Option<JoinHandle<()>>,
    cfg: FaceConfig,
    shared: Arc<Mutex<FaceShared>>,
}

impl FaceMonitor {
    pub fn new(factory: Arc<dyn DetectorFactory>, cfg: FaceConfig) -> Self {
        Self {
            factory,
            detector: Arc::new(Mutex::new(None)),
            init_failed: false,
            run: RunToken::new(),
            monitor_task: None,
            cfg,
            shared: Arc::new(Mutex::new(FaceShared {
                phase: ScanPhase::Idle,
                status: FaceStatus::neutral(),
                face_box: None,
            })),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.shared.lock().phase
    }

    pub fn status(&self) -> FaceStatus {
        self.shared.lock().status.clone()
    }

    pub fn face_box(&self) -> Option<BoxPercent> {
        self.shared.lock().face_box
    }

    /// Detector initialization failed; proctoring is skipped for the
    /// session rather than blocking the interview.
    pub fn degraded(&self) -> bool {
        self.init_failed
    }

    fn ensure_detector(&mut self) -> bool {
        if self.init_failed {
            return false;
        }
        let mut slot = self.detector.lock();
        if slot.is_some() {
            return true;
        }
        match self.factory.create() {
            Ok(detector) => {
                *slot = Some(detector);
                true
            }
            Err(err) => {
                warn!("face detector init failed, proctoring disabled: {err:#}");
                self.init_failed = true;
                false
            }
        }
    }

    fn begin_run(&mut self) -> RunGuard {
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
        self.run.issue()
    }

    fn set_phase(&self, phase: ScanPhase) {
        self.shared.lock().phase = phase;
    }

    fn set_status(&self, status: FaceStatus) {
        let mut shared = self.shared.lock();
        if shared.status != status {
            shared.status = status;
        }
    }

    /// Runs a bounded face scan and reports whether it locked. Failure is
    /// never an error to the caller; recording proceeds either way.
    pub async fn run_scan(&mut self, mode: ScanMode, device: &mut DeviceSessionManager) -> bool {
        let (duration, phase, text) = match mode {
            ScanMode::Discovery => (
                self.cfg.discovery_duration,
                ScanPhase::Discover,
                "Finding your face…",
            ),
            ScanMode::Mini => (self.cfg.mini_duration, ScanPhase::Mini, "Checking face…"),
        };

        let guard = self.begin_run();
        self.set_phase(phase);
        self.set_status(FaceStatus::new(StatusTone::Neutral, text));

        device.ensure_preview().await;
        if !device.wait_for_video_ready(self.cfg.ready_timeout).await {
            self.set_phase(ScanPhase::Idle);
            return false;
        }
        if !self.ensure_detector() {
            self.set_phase(ScanPhase::Idle);
            return false;
        }

        let mut window = LockWindow::new(
            self.cfg.lock_window,
            self.cfg.lock_min_samples,
            self.cfg.lock_min_ok,
        );
        let started = Instant::now();
        let mut tick = interval(self.cfg.scan_tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tick.tick().await;
            if !guard.is_current() {
                return false;
            }

            let snap = {
                let mut slot = self.detector.lock();
                let Some(detector) = slot.as_mut() else {
                    return false;
                };
                match detector.detect() {
                    Ok(snap) => snap,
                    Err(err) => {
                        debug!("face sample failed: {err:#}");
                        None
                    }
                }
            };
            if let Some(snap) = snap {
                let eval = evaluate(
                    &snap.detections,
                    snap.frame_width,
                    snap.frame_height,
                    &self.cfg,
                );
                if eval.box_pct.is_some() {
                    self.shared.lock().face_box = eval.box_pct;
                }
                self.set_status(status_for(eval.kind, true));

                if window.push(eval.kind == FaceKind::Ok) {
                    self.set_phase(ScanPhase::Locked);
                    self.set_status(FaceStatus::new(StatusTone::Ok, "Locked ✓"));
                    let shared = self.shared.clone();
                    let settle = guard.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(650)).await;
                        if settle.is_current() {
                            shared.lock().phase = ScanPhase::Idle;
                        }
                    });
                    return true;
                }
            }

            if started.elapsed() >= duration {
                self.set_phase(ScanPhase::Idle);
                return false;
            }
        }
    }

    /// Starts continuous monitoring; active only while actively recording.
    /// Samples feed the policy engine; per-tick failures skip the tick.
    pub fn start_continuous(&mut self, engine: Arc<Mutex<ProctorEngine>>) {
        let guard = self.begin_run();
        if !self.ensure_detector() {
            return;
        }

        let detector = self.detector.clone();
        let shared = self.shared.clone();
        let cfg = self.cfg.clone();
        self.monitor_task = Some(tokio::spawn(async move {
            let mut tick = interval(cfg.monitor_tick);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if !guard.is_current() {
                    break;
                }

                let snap = {
                    let mut slot = detector.lock();
                    let Some(detector) = slot.as_mut() else {
                        break;
                    };
                    match detector.detect() {
                        Ok(snap) => snap,
                        Err(err) => {
                            debug!("face sample failed: {err:#}");
                            None
                        }
                    }
                };
                let Some(snap) = snap else {
                    continue;
                };

                let eval = evaluate(&snap.detections, snap.frame_width, snap.frame_height, &cfg);
                {
                    let mut sh = shared.lock();
                    sh.face_box = eval.box_pct;
                    let status = status_for(eval.kind, false);
                    if sh.status != status {
                        sh.status = status;
                    }
                }
                engine.lock().observe_face(eval.kind, Utc::now());
            }
        }));
    }

    /// Clears any scan or monitor timers. Safe to call repeatedly.
    pub fn stop_timers(&mut self) {
        self.run.cancel_all();
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
        let mut shared = self.shared.lock();
        shared.status = FaceStatus::neutral();
        shared.face_box = None;
    }

    /// Stops timers and closes the detector capability. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_timers();
        if let Some(mut detector) = self.detector.lock().take() {
            detector.close();
        }
    }
}

fn status_for(kind: FaceKind, scanning: bool) -> FaceStatus {
    match kind {
        FaceKind::Ok => FaceStatus::new(StatusTone::Ok, "Face OK"),
        FaceKind::NoFace => FaceStatus::new(StatusTone::Danger, "No face"),
        FaceKind::MultipleFaces => FaceStatus::new(StatusTone::Danger, "Multiple faces"),
        _ if scanning => FaceStatus::new(StatusTone::Warn, "Adjust your face"),
        _ => FaceStatus::new(StatusTone::Warn, "Adjust face"),
    }
}
