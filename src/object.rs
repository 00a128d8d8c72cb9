use crate::rect::Rect;

/*------------------------------------------------------------------------------
DetectionId
------------------------------------------------------------------------------*/

/// Position of a detection in the slice handed to `Tracker::update`. Only
/// meaningful for the frame it was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetectionId(pub usize);

/*------------------------------------------------------------------------------
Object struct
------------------------------------------------------------------------------*/

/// One detector output for one frame.
#[derive(Debug, Clone)]
pub struct Object {
    pub rect: Rect<f32>,
    pub label: usize,
    pub prob: f32,
}

impl Object {
    pub fn new(rect: Rect<f32>, label: usize, prob: f32) -> Self {
        Self { rect, label, prob }
    }

    pub fn get_rect(&self) -> Rect<f32> {
        self.rect.clone()
    }

    pub fn get_label(&self) -> usize {
        self.label
    }

    pub fn get_prob(&self) -> f32 {
        self.prob
    }

    /// Boundary check applied before a frame enters the tracker.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.rect.is_finite() {
            return Err(format!("non-finite box {:?}", self.rect));
        }
        if self.rect.width() <= 0.0 || self.rect.height() <= 0.0 {
            return Err(format!(
                "box must have positive size, got {}x{}",
                self.rect.width(),
                self.rect.height()
            ));
        }
        if !(0.0..=1.0).contains(&self.prob) {
            return Err(format!("confidence {} is outside [0, 1]", self.prob));
        }
        Ok(())
    }
}

/*------------------------------------------------------------------------------
TrackedObject struct
------------------------------------------------------------------------------*/

/// One confirmed track as reported for a frame.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub track_id: usize,
    pub label: usize,
    pub rect: Rect<f32>,
    pub prob: f32,
    pub age: usize,
    /// Detection absorbed by this track in the reported frame, if any.
    pub detection: Option<DetectionId>,
}

impl TrackedObject {
    pub fn get_track_id(&self) -> usize {
        self.track_id
    }

    pub fn get_label(&self) -> usize {
        self.label
    }

    pub fn get_rect(&self) -> Rect<f32> {
        self.rect.clone()
    }

    pub fn get_prob(&self) -> f32 {
        self.prob
    }

    pub fn get_age(&self) -> usize {
        self.age
    }

    pub fn get_detection(&self) -> Option<DetectionId> {
        self.detection
    }
}
