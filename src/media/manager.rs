use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::time::{sleep, Instant};

use super::{CaptureStream, MediaBackend, MediaError, Recorder, VideoSink};
use crate::config::CaptureConfig;

const PERMISSION_MESSAGE: &str =
    "Camera/mic blocked. Allow permissions in your browser and refresh.";

/// Owns the capture stream and its render sink. Other components read
/// status through it but never touch the stream directly.
pub struct DeviceSessionManager {
    backend: Arc<dyn MediaBackend>,
    sink: Box<dyn VideoSink>,
    stream: Option<Box<dyn CaptureStream>>,
    capture: CaptureConfig,
    perm_error: Option<String>,
}

impl DeviceSessionManager {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        sink: Box<dyn VideoSink>,
        capture: CaptureConfig,
    ) -> Self {
        Self {
            backend,
            sink,
            stream: None,
            capture,
            perm_error: None,
        }
    }

    /// Persistent inline message when acquisition was refused.
    pub fn permission_error(&self) -> Option<&str> {
        self.perm_error.as_deref()
    }

    pub fn tracks_ended(&self) -> bool {
        self.stream.as_ref().map_or(true, |s| s.tracks_ended())
    }

    /// Starts or repairs the preview. Re-acquires when no stream exists or
    /// all of its tracks have ended, attaches the sink if needed, then
    /// retries playback a bounded number of times before arming a one-time
    /// gesture fallback.
    pub async fn ensure_preview(&mut self) -> bool {
        if self.tracks_ended() {
            match self
                .backend
                .acquire(&self.capture.video, &self.capture.audio)
            {
                Ok(stream) => {
                    self.perm_error = None;
                    self.stream = Some(stream);
                }
                Err(err) => {
                    warn!("capture acquisition failed: {err}");
                    self.perm_error = Some(PERMISSION_MESSAGE.to_string());
                    return false;
                }
            }
        }

        if let Some(stream) = &self.stream {
            if self.sink.attached_stream() != Some(stream.id()) {
                self.sink.attach(stream.as_ref());
            }
        }

        let mut attempts = 0;
        while attempts < self.capture.play_attempts {
            attempts += 1;
            if !self.sink.is_ready() {
                // wait for metadata
                sleep(Duration::from_millis(120)).await;
            }
            match self.sink.play() {
                Ok(()) => return true,
                Err(err) => {
                    debug!("preview play attempt {attempts} failed: {err:#}");
                    sleep(Duration::from_millis(150)).await;
                }
            }
        }

        // autoplay policy may block until the user interacts
        self.sink.arm_gesture_playback();
        false
    }

    /// Polls sink readiness until `timeout` elapses.
    pub async fn wait_for_video_ready(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.sink.is_ready() {
                return true;
            }
            sleep(Duration::from_millis(100)).await;
        }
        false
    }

    /// First supported container from the preference list.
    pub fn pick_mime(&self) -> String {
        for mime in &self.capture.mime_preferences {
            if self.backend.is_type_supported(mime) {
                return mime.clone();
            }
        }
        self.capture.fallback_mime.clone()
    }

    pub fn make_recorder(&self, mime: &str) -> Result<Box<dyn Recorder>, MediaError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or(MediaError::DeviceUnavailable)?;
        self.backend.recorder(stream.as_ref(), mime)
    }

    pub fn sink(&mut self) -> &mut dyn VideoSink {
        self.sink.as_mut()
    }

    /// Stops the live tracks without detaching the sink; used when the
    /// surface has just been switched to playback.
    pub fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all();
        }
    }

    /// Full teardown: stop all tracks and detach the sink. Idempotent.
    pub fn release(&mut self) {
        self.stop_stream();
        self.sink.pause();
        self.sink.detach();
    }
}
