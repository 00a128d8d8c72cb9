pub mod assignment;
pub mod config;
pub mod cost;
pub mod error;
pub mod kalman_filter;
pub mod object;
pub mod rect;
pub mod tracker;
pub mod tracklet;

mod lapjv;

pub use assignment::{linear_assignment, AssignmentResult};
pub use config::TrackerConfig;
pub use cost::{iou_distance, CostMatrix};
pub use error::TrackError;
pub use kalman_filter::{KalmanFilter, KalmanState};
pub use object::{DetectionId, Object, TrackedObject};
pub use rect::Rect;
pub use tracker::{TrackIdAllocator, Tracker};
pub use tracklet::{ClassScores, Tracklet, TrackletState};
