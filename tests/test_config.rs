use cascadetrack_rs::{TrackError, Tracker, TrackerConfig};

#[test]
fn test_partial_json_takes_defaults() {
    let json = r#"{ "frame_width": 1280, "frame_height": 720, "track_buffer": 30 }"#;
    let config: TrackerConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.frame_width, 1280);
    assert_eq!(config.frame_height, 720);
    assert_eq!(config.track_buffer, 30);
    assert_eq!(config.frame_rate, 30);
    assert_eq!(config.track_thresh, 0.3);
    assert_eq!(config.high_thresh, 0.5);
    assert_eq!(config.match_thresh, 0.8);
    assert!(!config.using_det_bbox);
    assert_eq!(config.max_time_lost(), 30);

    let tracker = Tracker::new(config).unwrap();
    assert_eq!(tracker.max_time_lost(), 30);
}

#[test]
fn test_empty_json_is_default() {
    let config: TrackerConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, TrackerConfig::default());
}

#[test]
fn test_serialized_config_loads_back() {
    let config = TrackerConfig::new(640, 480)
        .with_thresholds(0.4, 0.6)
        .with_det_bbox(true);
    let json = serde_json::to_string(&config).unwrap();
    let loaded: TrackerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_invalid_config_is_rejected_by_tracker() {
    let config: TrackerConfig =
        serde_json::from_str(r#"{ "match_thresh": 2.0 }"#).unwrap();
    match Tracker::new(config) {
        Err(TrackError::InvalidConfig(msg)) => assert!(msg.contains("match_thresh")),
        other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_frame_rate_scales_time_lost() {
    let config = TrackerConfig::default().with_track_buffer(15, 30);
    let tracker = Tracker::new(config).unwrap();
    assert_eq!(tracker.max_time_lost(), 15);
}
