pub mod evaluate;
pub mod monitor;

pub use evaluate::{
    evaluate, BoundingBox, BoxPercent, Detection, FaceEvaluation, FaceKind, FrameSnapshot,
};
pub use monitor::{FaceMonitor, FaceStatus, ScanMode, ScanPhase, StatusTone};

/// External face-detection capability, lazily initialized once per session.
///
/// `detect` returns the current frame's detections and dimensions, or
/// `None` while the video is not ready. Per-tick failures are swallowed by
/// the callers; `detect` never needs to be retried by implementations.
pub trait FaceDetector: Send {
    fn detect(&mut self) -> anyhow::Result<Option<FrameSnapshot>>;
    fn close(&mut self) {}
}

pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Box<dyn FaceDetector>>;
}
