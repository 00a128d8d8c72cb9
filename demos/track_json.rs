use cascadetrack_rs::{Object, Rect, Tracker, TrackerConfig};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::{collections::BTreeMap, env, error::Error, fs, path::PathBuf};

#[derive(Debug, Deserialize)]
struct Detection {
    frame_id: usize,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    prob: f32,
    #[serde(default)]
    class_id: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_usage();
        return Ok(());
    }

    let detections_path = PathBuf::from(&args[1]);
    let config = match args.get(2) {
        Some(path) => serde_json::from_str::<TrackerConfig>(&fs::read_to_string(path)?)?,
        None => TrackerConfig::default(),
    };

    let frames = load_frames(&detections_path)?;
    let last_frame = frames.keys().next_back().copied().unwrap_or(0);
    let mut tracker = Tracker::new(config)?;

    let progress = ProgressBar::new(last_frame as u64);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
    )?
    .progress_chars("=>-");
    progress.set_style(style);
    progress.set_message("tracking");

    // frames without detections still advance the tracker
    let empty = Vec::new();
    for frame_id in 1..=last_frame {
        let objects = frames.get(&frame_id).unwrap_or(&empty);
        let tracked = tracker.update(objects)?;
        for track in tracked.iter() {
            let rect = track.get_rect();
            progress.println(format!(
                "{},{},{},{:.2},{:.2},{:.2},{:.2},{:.3}",
                frame_id,
                track.get_track_id(),
                track.get_label(),
                rect.x(),
                rect.y(),
                rect.width(),
                rect.height(),
                track.get_prob()
            ));
        }
        progress.inc(1);
    }

    progress.finish_with_message("done");
    Ok(())
}

fn print_usage() {
    println!(
        "Usage: cargo run --example track_json <detections.json> [config.json]\n\
The detections file holds a list of\n\
  {{\"frame_id\": 1, \"x\": .., \"y\": .., \"width\": .., \"height\": .., \"prob\": .., \"class_id\": ..}}\n\
with frame ids starting at 1. Prints frame,track_id,class_id,x,y,width,height,prob per track."
    );
}

fn load_frames(path: &PathBuf) -> Result<BTreeMap<usize, Vec<Object>>, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    let detections: Vec<Detection> = serde_json::from_str(&data)?;
    let mut frames: BTreeMap<usize, Vec<Object>> = BTreeMap::new();
    for det in detections {
        let rect = Rect::new(det.x, det.y, det.width, det.height);
        frames
            .entry(det.frame_id)
            .or_default()
            .push(Object::new(rect, det.class_id, det.prob));
    }
    Ok(frames)
}
