pub mod flow;

pub use flow::InterviewSession;

use std::sync::Arc;

use crate::face::DetectorFactory;
use crate::guard::Redirect;
use crate::media::{MediaBackend, VideoSink};
use crate::progress::StateStore;

/// Where the candidate is within each question's record/review/upload
/// cycle, plus the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Question,
    Review,
    Uploading,
    Done,
}

/// Host fullscreen control. Requests may be refused by platform policy,
/// in which case the gate stays up until the candidate acts.
pub trait FullscreenSurface: Send {
    fn is_active(&self) -> bool;
    fn request(&mut self) -> anyhow::Result<()>;
    fn exit(&mut self);
}

/// Everything the host environment provides to a session.
pub struct SessionPlatform {
    pub media: Arc<dyn MediaBackend>,
    pub sink: Box<dyn VideoSink>,
    pub detector: Arc<dyn DetectorFactory>,
    pub fullscreen: Box<dyn FullscreenSurface>,
    pub store: Arc<dyn StateStore>,
}

/// Outcome of loading a session: either a live session or an immediate
/// redirect because the link was refused.
pub enum SessionLoad<G: crate::gateway::Gateway> {
    Ready(Box<InterviewSession<G>>),
    Redirect(Redirect),
}
