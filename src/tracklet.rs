use crate::{
    config::TrackerConfig,
    kalman_filter::{KalmanFilter, KalmanState},
    object::{DetectionId, Object},
    rect::Rect,
};
use log::trace;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Index of the height velocity in the filter mean, frozen while a track is
/// not observed.
const HEIGHT_VELOCITY: usize = 7;

/*----------------------------------------------------------------------------
Tracklet State enums
----------------------------------------------------------------------------*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackletState {
    New,
    Tracked,
    Lost,
    Removed,
}

/*----------------------------------------------------------------------------
Label smoothing
----------------------------------------------------------------------------*/

/// Running confidence sum per class. The reported label is the class with
/// the largest sum.
#[derive(Debug, Clone, Default)]
pub struct ClassScores {
    sums: BTreeMap<usize, f32>,
}

impl ClassScores {
    pub fn add(&mut self, label: usize, prob: f32) {
        *self.sums.entry(label).or_insert(0.0) += prob;
    }

    /// Class with the highest running sum. On a tie `current` is kept if it
    /// is one of the leaders, otherwise the smallest class id wins.
    pub fn best(&self, current: usize) -> usize {
        let mut best: Option<(usize, f32)> = None;
        for (&label, &sum) in self.sums.iter() {
            let replace = match best {
                None => true,
                Some((_, best_sum)) => {
                    sum > best_sum || (sum == best_sum && label == current)
                }
            };
            if replace {
                best = Some((label, sum));
            }
        }
        best.map_or(current, |(label, _)| label)
    }

    pub fn sum(&self, label: usize) -> f32 {
        self.sums.get(&label).copied().unwrap_or(0.0)
    }
}

/*----------------------------------------------------------------------------
Tracklet struct
----------------------------------------------------------------------------*/

#[derive(Clone)]
pub struct Tracklet {
    kalman: KalmanState,
    rect: Rect<f32>,
    observed_rect: Rect<f32>,
    observed_label: usize,
    label: usize,
    class_scores: ClassScores,
    prob: f32,
    state: TrackletState,
    activated: bool,
    track_id: usize,
    frame_id: usize,
    start_frame: usize,
    age: usize,
    /// last absorbed detection and the frame it was absorbed in
    detection: Option<(DetectionId, usize)>,
}

impl Debug for Tracklet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tracklet {{ track_id: {}, frame_id: {}, start_frame: {}, age: {}, state: {:?}, activated: {}, label: {}, prob: {}, rect: {:?} }}",
            self.track_id, self.frame_id, self.start_frame, self.age, self.state, self.activated, self.label, self.prob, self.rect
        )
    }
}

impl Tracklet {
    /// Wraps a detection of the current frame. The tracklet has no identity
    /// until it is activated.
    pub fn from_detection(object: &Object, detection: DetectionId) -> Self {
        let mut class_scores = ClassScores::default();
        class_scores.add(object.label, object.prob);
        Self {
            kalman: KalmanState::zeros(),
            rect: object.get_rect(),
            observed_rect: object.get_rect(),
            observed_label: object.label,
            label: object.label,
            class_scores,
            prob: object.prob,
            state: TrackletState::New,
            activated: false,
            track_id: 0,
            frame_id: 0,
            start_frame: 0,
            age: 0,
            detection: Some((detection, 0)),
        }
    }

    pub fn get_rect(&self) -> Rect<f32> {
        self.rect.clone()
    }

    /// Box of the last absorbed detection, before filtering.
    pub fn get_observed_rect(&self) -> Rect<f32> {
        self.observed_rect.clone()
    }

    pub fn get_state(&self) -> TrackletState {
        self.state
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn get_track_id(&self) -> usize {
        self.track_id
    }

    pub fn get_label(&self) -> usize {
        self.label
    }

    pub fn get_observed_label(&self) -> usize {
        self.observed_label
    }

    pub fn get_prob(&self) -> f32 {
        self.prob
    }

    pub fn get_frame_id(&self) -> usize {
        self.frame_id
    }

    pub fn get_start_frame(&self) -> usize {
        self.start_frame
    }

    pub fn get_age(&self) -> usize {
        self.age
    }

    pub fn get_kalman_state(&self) -> &KalmanState {
        &self.kalman
    }

    pub fn get_class_scores(&self) -> &ClassScores {
        &self.class_scores
    }

    /// Frames between activation and the last update.
    pub fn duration(&self) -> usize {
        self.frame_id.saturating_sub(self.start_frame)
    }

    /// Detection absorbed in `frame_id`, if any.
    pub fn detection_in(&self, frame_id: usize) -> Option<DetectionId> {
        match self.detection {
            Some((id, frame)) if frame == frame_id => Some(id),
            _ => None,
        }
    }

    pub(crate) fn activate(
        &mut self,
        kalman_filter: &KalmanFilter,
        track_id: usize,
        frame_id: usize,
    ) {
        self.track_id = track_id;
        self.kalman = kalman_filter.initiate(&self.rect.get_xyah());
        self.state = TrackletState::Tracked;
        self.activated = true;
        self.age = 0;
        self.frame_id = frame_id;
        self.start_frame = frame_id;
        if let Some((_, frame)) = self.detection.as_mut() {
            *frame = frame_id;
        }
    }

    pub(crate) fn re_activate(
        &mut self,
        kalman_filter: &KalmanFilter,
        new_track: &Tracklet,
        frame_id: usize,
    ) {
        self.absorb(new_track, frame_id);
        self.kalman =
            kalman_filter.update(&self.kalman, &self.rect.get_xyah());
        self.update_rect();

        self.age = 0;
        self.state = TrackletState::Tracked;
        self.activated = true;
        self.frame_id = frame_id;
    }

    pub(crate) fn update(
        &mut self,
        kalman_filter: &KalmanFilter,
        new_track: &Tracklet,
        frame_id: usize,
        config: &TrackerConfig,
    ) {
        self.frame_id = frame_id;
        self.age += 1;
        self.absorb(new_track, frame_id);

        let xyah = self.rect.get_xyah();
        let reset = if config.is_near_edge(&self.rect) {
            trace!("track {}: box near frame edge, resetting filter", self.track_id);
            true
        } else {
            let predicted = self.kalman.area();
            let observed = self.rect.area();
            let ratio = predicted.min(observed) / predicted.max(observed);
            if ratio < config.reset_area_ratio {
                trace!(
                    "track {}: area changed by ratio {}, resetting filter",
                    self.track_id,
                    ratio
                );
                true
            } else {
                false
            }
        };

        self.kalman = if reset {
            kalman_filter.initiate(&xyah)
        } else {
            kalman_filter.update(&self.kalman, &xyah)
        };

        self.update_rect();
        self.state = TrackletState::Tracked;
        self.activated = true;
    }

    pub(crate) fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if self.state != TrackletState::Tracked {
            self.kalman.mean[HEIGHT_VELOCITY] = 0.0;
        }
        self.kalman = kalman_filter.predict(&self.kalman);
    }

    pub(crate) fn mark_as_lost(&mut self) {
        self.state = TrackletState::Lost;
    }

    pub(crate) fn mark_as_removed(&mut self) {
        self.state = TrackletState::Removed;
    }

    /// Takes over the observation carried by `new_track`.
    fn absorb(&mut self, new_track: &Tracklet, frame_id: usize) {
        self.rect = new_track.get_observed_rect();
        self.observed_rect = new_track.get_observed_rect();
        self.observed_label = new_track.observed_label;
        self.prob = new_track.prob;
        self.class_scores.add(new_track.observed_label, new_track.prob);
        self.label = self.class_scores.best(self.label);
        self.detection = new_track.detection.map(|(id, _)| (id, frame_id));
    }

    fn update_rect(&mut self) {
        self.rect = Rect::from_xyah(&self.kalman.xyah());
    }

    #[cfg(test)]
    pub(crate) fn set_frames(&mut self, start_frame: usize, frame_id: usize) {
        self.start_frame = start_frame;
        self.frame_id = frame_id;
    }

    #[cfg(test)]
    pub(crate) fn set_unconfirmed(&mut self) {
        self.activated = false;
    }
}

impl PartialEq for Tracklet {
    fn eq(&self, other: &Self) -> bool {
        self.track_id == other.track_id
    }
}
