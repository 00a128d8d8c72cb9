//! Tracker configuration.

use crate::error::TrackError;
use crate::rect::Rect;
use serde::{Deserialize, Serialize};

/// Everything a [`Tracker`](crate::Tracker) needs to know about one stream.
///
/// Deserializes with every field optional; missing fields take the values
/// of [`TrackerConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Frame size in pixels, used for the edge checks and output clipping.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Detections at or above this score are "high", the rest "low".
    pub track_thresh: f32,
    /// Minimum score for a leftover detection to start a new track.
    pub high_thresh: f32,
    pub match_thresh: f32,
    pub match_thresh_low: f32,
    pub match_thresh_unconfirmed: f32,
    pub frame_rate: u32,
    pub track_buffer: u32,
    /// Report the raw detection box instead of the filtered one when the
    /// track absorbed a detection in the reported frame.
    pub using_det_bbox: bool,
    /// Worker threads for the IoU cost matrix.
    pub num_threads: usize,
    /// Boxes closer than this to a frame border reset the motion filter.
    pub edge_margin: f32,
    /// Predicted/observed area ratio below which the motion filter resets.
    pub reset_area_ratio: f32,
    /// Tracked/lost pairs closer than this IoU distance are duplicates.
    pub duplicate_distance: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            frame_width: 416,
            frame_height: 416,
            track_thresh: 0.3,
            high_thresh: 0.5,
            match_thresh: 0.8,
            match_thresh_low: 0.5,
            match_thresh_unconfirmed: 0.7,
            frame_rate: 30,
            track_buffer: 60,
            using_det_bbox: false,
            num_threads: 2,
            edge_margin: 64.0,
            reset_area_ratio: 0.8,
            duplicate_distance: 0.15,
        }
    }
}

impl TrackerConfig {
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            ..Default::default()
        }
    }

    /// Set the score thresholds.
    ///
    /// # Arguments
    /// * `track_thresh` - high/low detection split
    /// * `high_thresh` - floor for starting a new track
    pub fn with_thresholds(self, track_thresh: f32, high_thresh: f32) -> Self {
        Self {
            track_thresh,
            high_thresh,
            ..self
        }
    }

    /// Set the gating threshold of each matching stage.
    pub fn with_match_thresholds(
        self,
        match_thresh: f32,
        match_thresh_low: f32,
        match_thresh_unconfirmed: f32,
    ) -> Self {
        Self {
            match_thresh,
            match_thresh_low,
            match_thresh_unconfirmed,
            ..self
        }
    }

    pub fn with_track_buffer(self, frame_rate: u32, track_buffer: u32) -> Self {
        Self {
            frame_rate,
            track_buffer,
            ..self
        }
    }

    pub fn with_det_bbox(self, using_det_bbox: bool) -> Self {
        Self {
            using_det_bbox,
            ..self
        }
    }

    pub fn with_num_threads(self, num_threads: usize) -> Self {
        Self {
            num_threads,
            ..self
        }
    }

    /// Frames a lost track is kept before it is removed.
    pub fn max_time_lost(&self) -> usize {
        (self.frame_rate as f64 / 30.0 * self.track_buffer as f64) as usize
    }

    /// True when `rect` comes within `edge_margin` of any frame border.
    pub fn is_near_edge(&self, rect: &Rect<f32>) -> bool {
        let margin = self.edge_margin;
        rect.x() < margin
            || rect.y() < margin
            || rect.right() >= self.frame_width as f32 - margin
            || rect.bottom() >= self.frame_height as f32 - margin
    }

    /// True when `rect` lies outside the frame or covers all of it.
    pub fn is_out_of_frame(&self, rect: &Rect<f32>) -> bool {
        let width = self.frame_width as f32;
        let height = self.frame_height as f32;
        rect.x() >= width - 1.0
            || rect.y() >= height - 1.0
            || rect.right() <= 0.0
            || rect.bottom() <= 0.0
            || rect.width() >= width
            || rect.height() >= height
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        let unit = [
            ("track_thresh", self.track_thresh),
            ("high_thresh", self.high_thresh),
            ("match_thresh", self.match_thresh),
            ("match_thresh_low", self.match_thresh_low),
            ("match_thresh_unconfirmed", self.match_thresh_unconfirmed),
            ("reset_area_ratio", self.reset_area_ratio),
            ("duplicate_distance", self.duplicate_distance),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrackError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(TrackError::InvalidConfig(format!(
                "frame size must be non-zero, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.frame_rate == 0 {
            return Err(TrackError::InvalidConfig(
                "frame_rate must be non-zero".to_string(),
            ));
        }
        if self.num_threads == 0 {
            return Err(TrackError::InvalidConfig(
                "num_threads must be non-zero".to_string(),
            ));
        }
        if !self.edge_margin.is_finite() || self.edge_margin < 0.0 {
            return Err(TrackError::InvalidConfig(format!(
                "edge_margin must be a non-negative number, got {}",
                self.edge_margin
            )));
        }
        Ok(())
    }
}
