use serde::Serialize;

use crate::config::FaceConfig;

/// One raw detection from the capability, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Bounding box in percent-of-frame coordinates for overlay rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxPercent {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Detections for the current frame, with the frame dimensions they were
/// computed against.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub detections: Vec<Detection>,
    pub frame_width: f32,
    pub frame_height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceKind {
    Ok,
    NoFace,
    MultipleFaces,
    TooClose,
    TooFar,
    Cropped,
}

impl FaceKind {
    /// Framing issues surface as a transient banner only.
    pub fn is_framing(&self) -> bool {
        matches!(self, FaceKind::TooClose | FaceKind::TooFar | FaceKind::Cropped)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceEvaluation {
    pub kind: FaceKind,
    pub box_pct: Option<BoxPercent>,
}

impl FaceEvaluation {
    fn bare(kind: FaceKind) -> Self {
        Self {
            kind,
            box_pct: None,
        }
    }
}

/// Pure classification of one frame's detections.
///
/// Zero detections or a single low-confidence one classify as no-face;
/// more than one as multiple-faces. A single confident detection is judged
/// by its area ratio (too far / too close) and by whether it intersects the
/// safe inset margin (cropped); otherwise it is ok.
pub fn evaluate(
    detections: &[Detection],
    frame_w: f32,
    frame_h: f32,
    cfg: &FaceConfig,
) -> FaceEvaluation {
    if detections.is_empty() {
        return FaceEvaluation::bare(FaceKind::NoFace);
    }
    if detections.len() > 1 {
        return FaceEvaluation::bare(FaceKind::MultipleFaces);
    }

    let det = &detections[0];
    if det.confidence < cfg.min_confidence {
        return FaceEvaluation::bare(FaceKind::NoFace);
    }

    let bb = det.bounding_box;
    let box_pct = Some(BoxPercent {
        left: (bb.x / frame_w * 100.0).max(0.0),
        top: (bb.y / frame_h * 100.0).max(0.0),
        width: (bb.width / frame_w * 100.0).max(0.0),
        height: (bb.height / frame_h * 100.0).max(0.0),
    });

    let inset_x = cfg.inset_ratio * frame_w;
    let inset_y = cfg.inset_ratio * frame_h;
    let clipped = bb.x < inset_x
        || bb.y < inset_y
        || bb.x + bb.width > frame_w - inset_x
        || bb.y + bb.height > frame_h - inset_y;

    let ratio = (bb.width * bb.height) / (frame_w * frame_h);
    let kind = if ratio < cfg.min_area_ratio {
        FaceKind::TooFar
    } else if ratio > cfg.max_area_ratio {
        FaceKind::TooClose
    } else if clipped {
        FaceKind::Cropped
    } else {
        FaceKind::Ok
    };

    FaceEvaluation { kind, box_pct }
}
