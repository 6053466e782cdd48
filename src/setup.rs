use std::sync::Arc;

use log::info;

use crate::config::{AudioConstraints, VideoConstraints};
use crate::error::{AppError, AppResult};
use crate::gateway::{Gateway, SetupSubmission, SetupValidation};
use crate::interview::Candidate;
use crate::media::{MediaBackend, MediaError};

pub const RESUME_EXTENSIONS: [&str; 3] = [".pdf", ".doc", ".docx"];

/// RMS mic level above which the microphone counts as working.
pub const MIC_LEVEL_THRESHOLD: f32 = 0.03;

pub fn resume_extension_allowed(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    RESUME_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Resolves a setup link to its interview before the form is shown.
/// The validation may carry the invitee's email for prefilling.
pub async fn validate_link<G: Gateway>(
    gateway: &G,
    token: Option<&str>,
) -> AppResult<SetupValidation> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Err(AppError::validation("setup", "Setup link is missing its token"));
    };
    gateway.validate_setup(token).await
}

/// Live microphone level source for the setup meter.
pub trait AudioLevelProbe: Send {
    fn rms_level(&mut self) -> f32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceTestReport {
    pub cam_ok: bool,
    pub mic_ok: bool,
    /// Display level in 0..=1, boosted for visibility on quiet mics.
    pub audio_level: f32,
}

/// Camera/mic smoke test run on the setup page before submission.
pub struct DeviceTest {
    backend: Arc<dyn MediaBackend>,
    report: DeviceTestReport,
}

impl DeviceTest {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            report: DeviceTestReport::default(),
        }
    }

    /// Acquires a low-resolution stream and records which device kinds
    /// came up. The stream is stopped immediately; the interview page does
    /// its own acquisition.
    pub fn run(&mut self) -> Result<DeviceTestReport, MediaError> {
        let video = VideoConstraints {
            width: 1280,
            height: 720,
        };
        let mut stream = self.backend.acquire(&video, &AudioConstraints::default())?;
        self.report.cam_ok = stream.has_video();
        self.report.mic_ok = stream.has_audio();
        stream.stop_all();
        info!(
            "device test: cam_ok={} mic_ok={}",
            self.report.cam_ok, self.report.mic_ok
        );
        Ok(self.report)
    }

    /// Feeds one mic sample into the report. The raw RMS is tiny for
    /// normal speech, so the display level is boosted 4x and capped.
    pub fn sample_mic(&mut self, probe: &mut dyn AudioLevelProbe) -> f32 {
        let level = (probe.rms_level() * 4.0).min(1.0);
        self.report.audio_level = level;
        if level > MIC_LEVEL_THRESHOLD {
            self.report.mic_ok = true;
        }
        level
    }

    pub fn report(&self) -> DeviceTestReport {
        self.report
    }
}

#[derive(Debug, Clone, Default)]
pub struct SetupForm {
    pub name: String,
    pub email: String,
    pub resume_file_name: String,
    pub resume: Vec<u8>,
}

/// Client-side validation mirroring what the backend enforces. Returns the
/// message to show inline, or `None` when the form may be submitted.
pub fn validate_form(form: &SetupForm) -> Option<&'static str> {
    if form.name.trim().is_empty() {
        return Some("Please enter your full name.");
    }
    let email = form.email.trim();
    if email.is_empty() || !email.contains('@') || !email.contains('.') {
        return Some("Please enter a valid email address.");
    }
    if form.resume.is_empty() {
        return Some("Please attach your resume.");
    }
    if !resume_extension_allowed(&form.resume_file_name) {
        return Some("Resume must be a PDF, DOC, or DOCX file.");
    }
    None
}

/// Submits the validated setup form and returns the registered candidate.
pub async fn submit<G: Gateway>(
    gateway: &G,
    form: SetupForm,
    interview_id: &str,
    report: DeviceTestReport,
    user_agent: &str,
) -> AppResult<Candidate> {
    if let Some(message) = validate_form(&form) {
        return Err(AppError::validation("setup", message));
    }

    gateway
        .submit_setup(SetupSubmission {
            name: form.name.trim().to_string(),
            email: form.email.trim().to_string(),
            interview_id: interview_id.to_string(),
            cam_ok: report.cam_ok,
            mic_ok: report.mic_ok,
            user_agent: user_agent.to_string(),
            resume_file_name: form.resume_file_name,
            resume: form.resume,
        })
        .await
}
