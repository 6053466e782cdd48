use std::env;
use std::time::Duration;

use log::debug;

/// Complete runtime configuration. Endpoints come from the environment
/// with production defaults; timings and thresholds are compiled in and
/// overridable by the host before session start.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub capture: CaptureConfig,
    pub proctor: ProctorConfig,
    pub face: FaceConfig,
}

impl AppConfig {
    /// Loads endpoint overrides from the process environment. A `.env`
    /// file is honored when present.
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded environment from .env");
        }

        let mut cfg = Self::default();
        if let Ok(v) = env::var("INTERVIEWS_API") {
            cfg.api.interviews_endpoint = v;
        }
        if let Ok(v) = env::var("INTERVIEWS_API_KEY") {
            cfg.api.interviews_api_key = Some(v);
        }
        if let Ok(v) = env::var("CONSUME_TOKEN_API") {
            cfg.api.consume_token_endpoint = v;
        }
        if let Ok(v) = env::var("SETUP_VALIDATE_API") {
            cfg.api.setup_validate_endpoint = v;
        }
        if let Ok(v) = env::var("UPLOAD_WEBHOOK") {
            cfg.api.upload_webhook = v;
        }
        if let Ok(v) = env::var("SETUP_WEBHOOK") {
            cfg.api.setup_webhook = v;
        }
        if let Ok(v) = env::var("TOKEN_FAIL_CLOSED") {
            cfg.proctor.fail_closed_token = v == "1" || v.eq_ignore_ascii_case("true");
        }
        cfg
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub interviews_endpoint: String,
    pub interviews_api_key: Option<String>,
    pub consume_token_endpoint: String,
    pub setup_validate_endpoint: String,
    pub upload_webhook: String,
    pub setup_webhook: String,
    /// Redirect target base for terminal session outcomes.
    pub thank_you_base: String,
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            interviews_endpoint: "https://hirexpert.co/api/interviews".into(),
            interviews_api_key: None,
            consume_token_endpoint: "https://hirexpert.co/api/consume-token".into(),
            setup_validate_endpoint: "https://hirexpert.co/api/setup-validate".into(),
            upload_webhook: "https://hirexpert.co/api/answer-upload".into(),
            setup_webhook: "https://hirexpert.co/api/setup-submit".into(),
            thank_you_base: "/thank-you".into(),
            user_agent: concat!("hirexpert-proctor/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
    /// Container/codec candidates in preference order.
    pub mime_preferences: Vec<String>,
    pub fallback_mime: String,
    /// Recorder data-callback timeslice.
    pub chunk_interval: Duration,
    pub play_attempts: u32,
    pub video_ready_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video: VideoConstraints::default(),
            audio: AudioConstraints::default(),
            mime_preferences: vec![
                "video/webm;codecs=vp9,opus".into(),
                "video/webm;codecs=vp8,opus".into(),
                "video/webm".into(),
                "video/mp4;codecs=h264,aac".into(),
            ],
            fallback_mime: "video/webm".into(),
            chunk_interval: Duration::from_secs(3),
            play_attempts: 3,
            video_ready_timeout: Duration::from_millis(2500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProctorConfig {
    /// How long a warning banner stays visible.
    pub warning_autohide: Duration,
    /// How long a face condition must persist before it counts.
    pub persist: Duration,
    /// Cooldown between ledger warnings from the same face condition.
    pub warn_cooldown: Duration,
    /// Cooldown between framing banners.
    pub frame_cooldown: Duration,
    /// Throttle on fullscreen-exit event storms.
    pub fs_exit_throttle: Duration,
    /// Refuse the session when the token check itself errors.
    pub fail_closed_token: bool,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            warning_autohide: Duration::from_millis(3500),
            persist: Duration::from_millis(2000),
            warn_cooldown: Duration::from_millis(15000),
            frame_cooldown: Duration::from_millis(10000),
            fs_exit_throttle: Duration::from_millis(800),
            fail_closed_token: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FaceConfig {
    /// Detections below this confidence count as no face.
    pub min_confidence: f32,
    /// Face-to-frame area ratio below which the face is too far.
    pub min_area_ratio: f32,
    /// Area ratio above which the face is too close.
    pub max_area_ratio: f32,
    /// Safe margin, as a fraction of each frame dimension.
    pub inset_ratio: f32,
    pub scan_tick: Duration,
    pub monitor_tick: Duration,
    pub discovery_duration: Duration,
    pub mini_duration: Duration,
    pub lock_window: usize,
    pub lock_min_samples: usize,
    pub lock_min_ok: usize,
    pub ready_timeout: Duration,
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_area_ratio: 0.08,
            max_area_ratio: 0.45,
            inset_ratio: 0.05,
            scan_tick: Duration::from_millis(140),
            monitor_tick: Duration::from_millis(200),
            discovery_duration: Duration::from_millis(5600),
            mini_duration: Duration::from_millis(1500),
            lock_window: 10,
            lock_min_samples: 6,
            lock_min_ok: 5,
            ready_timeout: Duration::from_millis(3000),
        }
    }
}
