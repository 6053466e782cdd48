pub mod banner;
pub mod limiter;

pub use banner::{Banner, BannerQueue};
pub use limiter::{RateLimiter, StreakGate};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProctorConfig;
use crate::face::FaceKind;

/// Ledger-counted violation kinds, serialized the way the upload webhook
/// expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    Visibility,
    Blur,
    FsExit,
    NoFace,
    MultipleFaces,
}

/// Append-only ledger entry for one violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningEntry {
    #[serde(rename = "type")]
    pub kind: WarningKind,
    pub ts: i64,
}

pub type WarningLedger = HashMap<String, Vec<WarningEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Fullscreen must be entered before recording may start.
    Enter,
    /// The candidate exited fullscreen and must return.
    Exit,
}

/// Per-signal-source proctoring state machines: visibility/focus,
/// fullscreen, and the three face conditions. Feed it wall-clock events;
/// it maintains the warning ledger, the tab-switch count, the fullscreen
/// gate, and the transient banners.
pub struct ProctorEngine {
    cfg: ProctorConfig,
    current_question: String,
    ledger: WarningLedger,
    ledger_dirty: bool,
    tab_switch_count: u32,
    fs_active: bool,
    fs_ever_entered: bool,
    fs_gate: Option<GateMode>,
    fs_exit_throttle: RateLimiter,
    no_face: StreakGate,
    multi_face: StreakGate,
    framing: StreakGate,
    banners: BannerQueue,
    shutting_down: bool,
}

impl ProctorEngine {
    pub fn new(cfg: ProctorConfig) -> Self {
        let no_face = StreakGate::new(cfg.persist, cfg.warn_cooldown);
        let multi_face = StreakGate::new(cfg.persist, cfg.warn_cooldown);
        let framing = StreakGate::new(cfg.persist, cfg.frame_cooldown);
        let fs_exit_throttle = RateLimiter::new(cfg.fs_exit_throttle);
        let banners = BannerQueue::new(cfg.warning_autohide);
        Self {
            cfg,
            current_question: "q1".to_string(),
            ledger: WarningLedger::new(),
            ledger_dirty: false,
            tab_switch_count: 0,
            fs_active: false,
            fs_ever_entered: false,
            fs_gate: None,
            fs_exit_throttle,
            no_face,
            multi_face,
            framing,
            banners,
            shutting_down: false,
        }
    }

    pub fn set_current_question(&mut self, qid: impl Into<String>) {
        self.current_question = qid.into();
    }

    /// Page hidden: immediate warning, no debounce.
    pub fn on_visibility_hidden(&mut self, now: DateTime<Utc>) {
        self.add_warning(WarningKind::Visibility, now);
    }

    /// Window lost focus: immediate warning, no debounce.
    pub fn on_window_blur(&mut self, now: DateTime<Utc>) {
        self.add_warning(WarningKind::Blur, now);
    }

    /// Fullscreen entered/exited. Exits only gate after the first real
    /// entry (browsers may block the initial programmatic request), and
    /// rapid exit event storms are throttled.
    pub fn on_fullscreen_change(&mut self, active: bool, now: DateTime<Utc>) {
        if active {
            self.fs_active = true;
            self.fs_ever_entered = true;
            self.fs_gate = None;
            return;
        }

        self.fs_active = false;
        if !self.fs_ever_entered || self.shutting_down {
            return;
        }
        if !self.fs_exit_throttle.try_fire(now.timestamp_millis()) {
            return;
        }
        self.fs_gate = Some(GateMode::Exit);
        self.add_warning(WarningKind::FsExit, now);
    }

    /// Recording was attempted outside fullscreen.
    pub fn raise_enter_gate(&mut self) {
        self.fs_gate = Some(GateMode::Enter);
    }

    pub fn fullscreen_gate(&self) -> Option<GateMode> {
        self.fs_gate
    }

    pub fn fullscreen_active(&self) -> bool {
        self.fs_active
    }

    /// One face evaluation from continuous monitoring. `Ok` resets every
    /// streak; each bad condition runs its own persistence/cooldown gate.
    /// Framing issues raise a banner only and never touch the ledger.
    pub fn observe_face(&mut self, kind: FaceKind, now: DateTime<Utc>) {
        if self.shutting_down {
            return;
        }
        let now_ms = now.timestamp_millis();
        match kind {
            FaceKind::Ok => {
                self.no_face.reset();
                self.multi_face.reset();
                self.framing.reset();
            }
            FaceKind::NoFace => {
                self.multi_face.reset();
                self.framing.reset();
                if self.no_face.observe_bad(now_ms) {
                    self.add_warning(WarningKind::NoFace, now);
                }
            }
            FaceKind::MultipleFaces => {
                self.no_face.reset();
                self.framing.reset();
                if self.multi_face.observe_bad(now_ms) {
                    self.add_warning(WarningKind::MultipleFaces, now);
                }
            }
            FaceKind::TooClose | FaceKind::TooFar | FaceKind::Cropped => {
                self.no_face.reset();
                self.multi_face.reset();
                if self.framing.observe_bad(now_ms) {
                    self.banners.push(framing_message(kind), now_ms);
                }
            }
        }
    }

    fn add_warning(&mut self, kind: WarningKind, now: DateTime<Utc>) {
        if self.shutting_down {
            return;
        }
        self.ledger
            .entry(self.current_question.clone())
            .or_default()
            .push(WarningEntry {
                kind,
                ts: now.timestamp_millis(),
            });
        self.ledger_dirty = true;
        if matches!(kind, WarningKind::Visibility | WarningKind::Blur) {
            self.tab_switch_count += 1;
        }
        self.banners.push(warning_message(kind), now.timestamp_millis());
    }

    /// Non-proctoring notice, e.g. a device failure at recording start.
    pub fn push_banner(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.banners.push(message, now.timestamp_millis());
    }

    /// Currently visible banners; expired ones are swept first.
    pub fn banners(&mut self, now: DateTime<Utc>) -> Vec<Banner> {
        self.banners.sweep(now.timestamp_millis());
        self.banners.active().to_vec()
    }

    pub fn dismiss_banner(&mut self, id: uuid::Uuid) {
        self.banners.dismiss(id);
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switch_count
    }

    pub fn total_warning_count(&self) -> usize {
        self.ledger.values().map(Vec::len).sum()
    }

    pub fn warnings_for(&self, qid: &str) -> &[WarningEntry] {
        self.ledger.get(qid).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ledger(&self) -> &WarningLedger {
        &self.ledger
    }

    /// The ledger has entries not yet persisted. Warnings appended by the
    /// monitor task surface here; the session flushes them on its clock
    /// tick.
    pub fn ledger_dirty(&self) -> bool {
        self.ledger_dirty
    }

    pub fn mark_ledger_saved(&mut self) {
        self.ledger_dirty = false;
    }

    /// Reinstates persisted state on interview load, before any new
    /// warnings have been recorded.
    pub fn restore(&mut self, tab_switch_count: u32, ledger: WarningLedger) {
        self.tab_switch_count = tab_switch_count;
        self.ledger = ledger;
    }

    /// Suppresses all further gating and warnings during teardown.
    pub fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        self.fs_gate = None;
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.cfg
    }
}

fn warning_message(kind: WarningKind) -> &'static str {
    match kind {
        WarningKind::Visibility => {
            "We detected a tab/app switch. Please stay focused on the interview."
        }
        WarningKind::Blur => "Window focus lost. Please return to the interview.",
        WarningKind::FsExit => {
            "Exiting Full Screen is not allowed. Click \u{201c}Return to Full Screen\u{201d} to continue."
        }
        WarningKind::NoFace => "No face detected. Please stay in frame.",
        WarningKind::MultipleFaces => "Multiple faces detected. Continue solo to avoid flags.",
    }
}

fn framing_message(kind: FaceKind) -> &'static str {
    match kind {
        FaceKind::TooClose => "You are too close. Please move slightly back.",
        FaceKind::TooFar => "You are too far. Please move closer so your face is clear.",
        _ => "Your face is not fully in frame. Please center your face.",
    }
}
