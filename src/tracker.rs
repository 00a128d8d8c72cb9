//! Per-stream tracking session.
//!
//! Tracklets live in one arena keyed by track id. The tracked, lost and
//! removed sets hold ids into that arena, so moving a tracklet between sets
//! never copies or aliases its state.

use crate::{
    assignment::linear_assignment,
    config::TrackerConfig,
    cost::{build_worker_pool, iou_distance},
    error::TrackError,
    kalman_filter::KalmanFilter,
    object::{DetectionId, Object, TrackedObject},
    rect::Rect,
    tracklet::{Tracklet, TrackletState},
};
use log::{debug, info, trace};
use rayon::ThreadPool;
use std::collections::{HashMap, HashSet};

/*-----------------------------------------------------------------------------
TrackIdAllocator
-----------------------------------------------------------------------------*/

/// Hands out track ids starting at 1. Ids are never reused within a session.
#[derive(Debug, Clone, Default)]
pub struct TrackIdAllocator {
    last_id: usize,
}

impl TrackIdAllocator {
    pub fn next_id(&mut self) -> usize {
        self.last_id += 1;
        self.last_id
    }

    pub fn last_id(&self) -> usize {
        self.last_id
    }

    pub fn reset(&mut self) {
        self.last_id = 0;
    }
}

/*-----------------------------------------------------------------------------
Tracker
-----------------------------------------------------------------------------*/

#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    max_time_lost: usize,
    kalman_filter: KalmanFilter,
    workers: ThreadPool,

    frame_id: usize,
    id_allocator: TrackIdAllocator,

    tracklets: HashMap<usize, Tracklet>,
    tracked: Vec<usize>,
    lost: Vec<usize>,
    removed: Vec<usize>,
}

impl Tracker {
    /// Create a tracker for one video stream.
    ///
    /// # Example
    /// ```
    /// use cascadetrack_rs::{Tracker, TrackerConfig};
    /// let tracker = Tracker::new(TrackerConfig::new(640, 480)).unwrap();
    /// assert!(tracker.is_empty());
    /// ```
    pub fn new(config: TrackerConfig) -> Result<Self, TrackError> {
        config.validate()?;
        let workers = build_worker_pool(config.num_threads)?;
        let max_time_lost = config.max_time_lost();
        info!(
            "tracker for {}x{} frames, max_time_lost {} frames, {} workers",
            config.frame_width, config.frame_height, max_time_lost, config.num_threads
        );
        Ok(Self {
            config,
            max_time_lost,
            kalman_filter: KalmanFilter::default(),
            workers,

            frame_id: 0,
            id_allocator: TrackIdAllocator::default(),

            tracklets: HashMap::new(),
            tracked: Vec::new(),
            lost: Vec::new(),
            removed: Vec::new(),
        })
    }

    pub fn get_config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn max_time_lost(&self) -> usize {
        self.max_time_lost
    }

    /// Number of frames processed so far.
    pub fn frame_id(&self) -> usize {
        self.frame_id
    }

    /// True when no tracklet is currently tracked.
    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn tracked(&self) -> impl Iterator<Item = &Tracklet> + '_ {
        self.view(&self.tracked)
    }

    pub fn lost(&self) -> impl Iterator<Item = &Tracklet> + '_ {
        self.view(&self.lost)
    }

    /// Tracklets removed during the last update.
    pub fn removed(&self) -> impl Iterator<Item = &Tracklet> + '_ {
        self.view(&self.removed)
    }

    /// Forget every track and restart frame and id numbering.
    pub fn reset(&mut self) {
        self.frame_id = 0;
        self.id_allocator.reset();
        self.tracklets.clear();
        self.tracked.clear();
        self.lost.clear();
        self.removed.clear();
    }

    /// Run one frame through the tracker.
    ///
    /// # Arguments
    /// * `objects` - detections of the frame, in detector order. The index of
    ///   a detection in this slice is its [`DetectionId`].
    ///
    /// # Returns
    /// The confirmed tracks of this frame, in tracked-set order.
    ///
    /// # Errors
    /// Invalid detections are rejected before anything changes, and the frame
    /// counter does not advance. A [`TrackError::LapjvError`] means the solver
    /// broke its own invariants; the session is then half-updated and should
    /// be [`reset`](Tracker::reset).
    pub fn update(
        &mut self,
        objects: &[Object],
    ) -> Result<Vec<TrackedObject>, TrackError> {
        for (index, object) in objects.iter().enumerate() {
            object
                .validate()
                .map_err(|reason| TrackError::InvalidDetection { index, reason })?;
        }

        let frame_id = self.frame_id + 1;
        let sets = self.step(frame_id, objects)?;

        self.frame_id = frame_id;
        self.tracked = sets.tracked;
        self.lost = sets.lost;
        self.removed = sets.removed;

        debug!(
            "frame {}: {} tracked, {} lost, {} removed",
            self.frame_id,
            self.tracked.len(),
            self.lost.len(),
            self.removed.len()
        );

        Ok(self.output())
    }

    fn step(
        &mut self,
        frame_id: usize,
        objects: &[Object],
    ) -> Result<SessionSets, TrackError> {
        let kalman_filter = &self.kalman_filter;
        let config = &self.config;
        let tracklets = &mut self.tracklets;
        let id_allocator = &mut self.id_allocator;

        /* ------------------ Step 1: Split detections by score ------------------ */
        let mut high_dets = Vec::new();
        let mut low_dets = Vec::new();
        for (i, object) in objects.iter().enumerate() {
            let det = Tracklet::from_detection(object, DetectionId(i));
            if object.get_prob() >= config.track_thresh {
                high_dets.push(det);
            } else {
                low_dets.push(det);
            }
        }
        debug!(
            "frame {}: {} high, {} low detections",
            frame_id,
            high_dets.len(),
            low_dets.len()
        );

        /* ------------------ Step 2: Split tracked tracklets ------------------ */
        let mut confirmed = Vec::new();
        let mut unconfirmed = Vec::new();
        for &id in self.tracked.iter() {
            if arena(tracklets, id)?.is_activated() {
                confirmed.push(id);
            } else {
                unconfirmed.push(id);
            }
        }

        /* ------------------ Step 3: Predict the pool ------------------ */
        let pool = joint_ids(&confirmed, &self.lost);
        for &id in pool.iter() {
            arena_mut(tracklets, id)?.predict(kalman_filter);
        }

        let mut accepted = Vec::new();
        let mut pending_lost = Vec::new();
        let mut pending_removed = Vec::new();

        /* ------------------ Step 4: First association, high scores ------------------ */
        let cost = iou_distance(
            &rects_of(tracklets, &pool)?,
            &det_rects(&high_dets, None),
            &self.workers,
        );
        let first = linear_assignment(&cost, Some(config.match_thresh as f64))?;
        for &(pi, di) in first.matches.iter() {
            let id = pool[pi];
            absorb(
                arena_mut(tracklets, id)?,
                kalman_filter,
                &high_dets[di],
                frame_id,
                config,
            );
            accepted.push(id);
        }
        debug!("frame {}: stage 1 matched {}", frame_id, first.matches.len());

        /* ------------------ Step 5: Second association, low scores ------------------ */
        let mut remain_pool = Vec::new();
        for &pi in first.unmatched_rows.iter() {
            let id = pool[pi];
            if arena(tracklets, id)?.get_state() == TrackletState::Tracked {
                remain_pool.push(id);
            }
        }
        let cost = iou_distance(
            &rects_of(tracklets, &remain_pool)?,
            &det_rects(&low_dets, None),
            &self.workers,
        );
        let second =
            linear_assignment(&cost, Some(config.match_thresh_low as f64))?;
        for &(pi, di) in second.matches.iter() {
            let id = remain_pool[pi];
            absorb(
                arena_mut(tracklets, id)?,
                kalman_filter,
                &low_dets[di],
                frame_id,
                config,
            );
            accepted.push(id);
        }
        for &pi in second.unmatched_rows.iter() {
            let id = remain_pool[pi];
            let track = arena_mut(tracklets, id)?;
            if track.get_state() != TrackletState::Lost {
                track.mark_as_lost();
                pending_lost.push(id);
            }
        }
        debug!(
            "frame {}: stage 2 matched {}, {} newly lost",
            frame_id,
            second.matches.len(),
            pending_lost.len()
        );

        /* ------------------ Step 6: Unconfirmed tracklets ------------------ */
        let left_high: &[usize] = &first.unmatched_cols;
        let cost = iou_distance(
            &rects_of(tracklets, &unconfirmed)?,
            &det_rects(&high_dets, Some(left_high)),
            &self.workers,
        );
        let third = linear_assignment(
            &cost,
            Some(config.match_thresh_unconfirmed as f64),
        )?;
        for &(ui, di) in third.matches.iter() {
            let id = unconfirmed[ui];
            arena_mut(tracklets, id)?.update(
                kalman_filter,
                &high_dets[left_high[di]],
                frame_id,
                config,
            );
            accepted.push(id);
        }
        for &ui in third.unmatched_rows.iter() {
            let id = unconfirmed[ui];
            arena_mut(tracklets, id)?.mark_as_removed();
            pending_removed.push(id);
        }

        /* ------------------ Step 7: Start new tracklets ------------------ */
        let mut started = 0;
        for &di in third.unmatched_cols.iter() {
            let det = &high_dets[left_high[di]];
            if det.get_prob() < config.high_thresh {
                continue;
            }
            let mut track = det.clone();
            track.activate(kalman_filter, id_allocator.next_id(), frame_id);
            let id = track.get_track_id();
            tracklets.insert(id, track);
            accepted.push(id);
            started += 1;
        }
        debug!(
            "frame {}: stage 3 matched {}, {} new tracks",
            frame_id,
            third.matches.len(),
            started
        );

        /* ------------------ Step 8: Time out lost tracklets ------------------ */
        for &id in self.lost.iter() {
            let track = arena_mut(tracklets, id)?;
            if frame_id.saturating_sub(track.get_frame_id()) > self.max_time_lost {
                track.mark_as_removed();
                pending_removed.push(id);
            }
        }

        /* ------------------ Step 9: Commit ------------------ */
        let mut tracked = Vec::new();
        for &id in self.tracked.iter() {
            if arena(tracklets, id)?.get_state() == TrackletState::Tracked {
                tracked.push(id);
            }
        }
        let tracked = joint_ids(&tracked, &accepted);
        let lost = sub_ids(&self.lost, &tracked);
        let lost = joint_ids(&lost, &pending_lost);
        let lost = sub_ids(&sub_ids(&lost, &self.removed), &pending_removed);
        let removed = pending_removed;

        /* ------------------ Step 10: Duplicate suppression ------------------ */
        let (tracked, lost) = remove_duplicate_tracklets(
            tracklets,
            &tracked,
            &lost,
            config.duplicate_distance as f64,
            &self.workers,
        )?;

        let live: HashSet<usize> = tracked
            .iter()
            .chain(lost.iter())
            .chain(removed.iter())
            .copied()
            .collect();
        tracklets.retain(|id, _| live.contains(id));

        Ok(SessionSets {
            tracked,
            lost,
            removed,
        })
    }

    /* ------------------ Step 11: Output ------------------ */
    fn output(&self) -> Vec<TrackedObject> {
        let mut outputs = Vec::new();
        for track in self.tracked() {
            if !track.is_activated() {
                continue;
            }
            let detection = track.detection_in(self.frame_id);
            let rect = match detection {
                Some(_) if self.config.using_det_bbox => track.get_observed_rect(),
                _ => track.get_rect(),
            };
            if self.config.is_out_of_frame(&rect) {
                continue;
            }
            let label = match detection {
                Some(_) => track.get_observed_label(),
                None => track.get_label(),
            };
            outputs.push(TrackedObject {
                track_id: track.get_track_id(),
                label,
                rect,
                prob: track.get_prob(),
                age: track.get_age(),
                detection,
            });
        }
        outputs
    }

    fn view<'a>(&'a self, ids: &'a [usize]) -> impl Iterator<Item = &'a Tracklet> + 'a {
        ids.iter().filter_map(move |id| self.tracklets.get(id))
    }
}

struct SessionSets {
    tracked: Vec<usize>,
    lost: Vec<usize>,
    removed: Vec<usize>,
}

/*-----------------------------------------------------------------------------
Helpers
-----------------------------------------------------------------------------*/

fn arena(
    tracklets: &HashMap<usize, Tracklet>,
    id: usize,
) -> Result<&Tracklet, TrackError> {
    tracklets.get(&id).ok_or(TrackError::UnknownTrack(id))
}

fn arena_mut(
    tracklets: &mut HashMap<usize, Tracklet>,
    id: usize,
) -> Result<&mut Tracklet, TrackError> {
    tracklets.get_mut(&id).ok_or(TrackError::UnknownTrack(id))
}

/// Tracked entries are corrected, anything else is re-activated.
fn absorb(
    track: &mut Tracklet,
    kalman_filter: &KalmanFilter,
    det: &Tracklet,
    frame_id: usize,
    config: &TrackerConfig,
) {
    if track.get_state() == TrackletState::Tracked {
        track.update(kalman_filter, det, frame_id, config);
    } else {
        track.re_activate(kalman_filter, det, frame_id);
    }
}

fn rects_of(
    tracklets: &HashMap<usize, Tracklet>,
    ids: &[usize],
) -> Result<Vec<Rect<f32>>, TrackError> {
    ids.iter()
        .map(|&id| arena(tracklets, id).map(|t| t.get_rect()))
        .collect()
}

fn det_rects(dets: &[Tracklet], subset: Option<&[usize]>) -> Vec<Rect<f32>> {
    match subset {
        Some(indices) => indices.iter().map(|&i| dets[i].get_rect()).collect(),
        None => dets.iter().map(|d| d.get_rect()).collect(),
    }
}

/// `a` followed by the ids of `b` not already present, order preserved.
pub(crate) fn joint_ids(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut exists = HashSet::new();
    let mut res = Vec::with_capacity(a.len() + b.len());
    for &id in a.iter().chain(b.iter()) {
        if exists.insert(id) {
            res.push(id);
        }
    }
    res
}

/// Ids of `a` that are not in `b`, order preserved.
pub(crate) fn sub_ids(a: &[usize], b: &[usize]) -> Vec<usize> {
    let exclude: HashSet<usize> = b.iter().copied().collect();
    a.iter().copied().filter(|id| !exclude.contains(id)).collect()
}

/// Drops one tracklet of every tracked/lost pair whose boxes are closer than
/// `max_distance`. The one that has been alive for fewer frames goes.
fn remove_duplicate_tracklets(
    tracklets: &HashMap<usize, Tracklet>,
    tracked: &[usize],
    lost: &[usize],
    max_distance: f64,
    workers: &ThreadPool,
) -> Result<(Vec<usize>, Vec<usize>), TrackError> {
    let distances = iou_distance(
        &rects_of(tracklets, tracked)?,
        &rects_of(tracklets, lost)?,
        workers,
    );

    let mut dup_tracked = HashSet::new();
    let mut dup_lost = HashSet::new();
    for (i, &tid) in tracked.iter().enumerate() {
        for (j, &lid) in lost.iter().enumerate() {
            if distances.at(i, j) >= max_distance {
                continue;
            }
            let tracked_time = arena(tracklets, tid)?.duration();
            let lost_time = arena(tracklets, lid)?.duration();
            if tracked_time > lost_time {
                trace!("duplicate: dropping lost {} for tracked {}", lid, tid);
                dup_lost.insert(lid);
            } else {
                trace!("duplicate: dropping tracked {} for lost {}", tid, lid);
                dup_tracked.insert(tid);
            }
        }
    }

    let tracked = tracked
        .iter()
        .copied()
        .filter(|id| !dup_tracked.contains(id))
        .collect();
    let lost = lost
        .iter()
        .copied()
        .filter(|id| !dup_lost.contains(id))
        .collect();
    Ok((tracked, lost))
}
