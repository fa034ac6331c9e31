use super::forward;
use crate::acquisition::{ListenerHandle, SourceEvent};
use crate::types::RawMotionEvent;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::time::{sleep_until, Duration, Instant};

/// Recorded raw event, `t_ms` after the start of the recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub t_ms: u64,
    #[serde(flatten)]
    pub event: RawMotionEvent,
}

/// Load a trace from `.json` or `.json.gz`. Events are sorted by offset.
pub fn load_trace(path: &Path) -> anyhow::Result<Vec<TimedEvent>> {
    let file = File::open(path)?;
    let mut events: Vec<TimedEvent> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    events.sort_by_key(|e| e.t_ms);
    Ok(events)
}

/// Replay with the recorded spacing, starting from the first offset.
pub async fn run(trace: Arc<Vec<TimedEvent>>, listener: ListenerHandle, tx: Sender<SourceEvent>) {
    let started = Instant::now();
    let origin = trace.first().map(|e| e.t_ms).unwrap_or(0);

    for timed in trace.iter() {
        sleep_until(started + Duration::from_millis(timed.t_ms.saturating_sub(origin))).await;
        let event = SourceEvent {
            listener,
            event: timed.event.clone(),
        };
        if !forward(&tx, event) {
            return;
        }
    }
    log::info!("[ACQ] Replay finished ({} events)", trace.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tokio::sync::mpsc;

    const TRACE: &str = r#"[
        {"t_ms": 40, "acceleration_including_gravity": {"x": 0.0, "y": 0.0, "z": 9.8}},
        {"t_ms": 0, "acceleration": {"x": 0.0, "y": null, "z": 0.1}}
    ]"#;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("motion_lab_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_load_plain_trace_sorted() {
        let path = temp_path("trace.json");
        std::fs::write(&path, TRACE).unwrap();
        let trace = load_trace(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].t_ms, 0);
        assert!(trace[0].event.acceleration_including_gravity.is_none());
        assert_eq!(trace[1].event.channel(false).and_then(|c| c.z), Some(9.8));
    }

    #[test]
    fn test_load_gz_trace() {
        let path = temp_path("trace.json.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(TRACE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let trace = load_trace(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(trace.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_keeps_spacing() {
        let path = temp_path("spacing.json");
        std::fs::write(&path, TRACE).unwrap();
        let trace = Arc::new(load_trace(&path).unwrap());
        std::fs::remove_file(&path).ok();

        let (tx, mut rx) = mpsc::channel(8);
        let start = Instant::now();
        tokio::spawn(run(trace, ListenerHandle::new(3), tx));
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.listener, ListenerHandle::new(3));
        assert!(second.event.acceleration_including_gravity.is_some());
        assert!(Instant::now() - start >= Duration::from_millis(40));
        assert!(rx.recv().await.is_none());
    }
}
