pub mod manager;

pub use manager::DeviceSessionManager;

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::config::{AudioConstraints, VideoConstraints};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("device unavailable")]
    DeviceUnavailable,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::PermissionDenied => AppError::PermissionDenied,
            MediaError::DeviceUnavailable | MediaError::Other(_) => AppError::DeviceUnavailable,
        }
    }
}

/// Platform capture layer: camera/mic acquisition plus recorder creation.
pub trait MediaBackend: Send + Sync {
    fn acquire(
        &self,
        video: &VideoConstraints,
        audio: &AudioConstraints,
    ) -> Result<Box<dyn CaptureStream>, MediaError>;

    /// Whether the platform recorder supports the given container/codec.
    fn is_type_supported(&self, mime: &str) -> bool;

    fn recorder(
        &self,
        stream: &dyn CaptureStream,
        mime: &str,
    ) -> Result<Box<dyn Recorder>, MediaError>;
}

/// A live camera+microphone capture stream.
pub trait CaptureStream: Send {
    fn id(&self) -> Uuid;
    fn has_video(&self) -> bool;
    fn has_audio(&self) -> bool;
    /// All tracks have ended; the stream must be re-acquired.
    fn tracks_ended(&self) -> bool;
    fn stop_all(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
}

/// Platform recorder bound to one capture stream and container type.
pub trait Recorder: Send {
    /// Begins chunked capture with periodic data callbacks at `timeslice`.
    fn start(&mut self, timeslice: Duration) -> anyhow::Result<()>;
    /// Finalizes capture into a single artifact.
    fn stop(&mut self) -> anyhow::Result<RecordingArtifact>;
    fn state(&self) -> RecorderState;
}

/// The recorded answer for the current question. At most one exists at a
/// time; it lives between stop-of-capture and successful upload.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl RecordingArtifact {
    pub fn file_ext(&self) -> &'static str {
        if self.mime_type.contains("mp4") {
            "mp4"
        } else {
            "webm"
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Render target for the live preview and the recorded playback.
pub trait VideoSink: Send {
    fn attached_stream(&self) -> Option<Uuid>;
    fn attach(&mut self, stream: &dyn CaptureStream);
    fn detach(&mut self);
    fn play(&mut self) -> anyhow::Result<()>;
    fn pause(&mut self);
    /// Metadata loaded and nonzero dimensions.
    fn is_ready(&self) -> bool;
    /// Autoplay fallback: play on the next user gesture.
    fn arm_gesture_playback(&mut self);
    /// Switches the surface into played-back review mode.
    fn show_playback(&mut self, artifact: &RecordingArtifact) -> anyhow::Result<()>;
}
