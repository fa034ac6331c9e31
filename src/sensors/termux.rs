//! Termux:API accelerometer feed.
//!
//! Polls `termux-sensor -n 1` for the accelerometer (gravity included) and the
//! linear-acceleration sensor (gravity removed). Output is JSON keyed by the
//! vendor sensor name, each with a `values` array.

use super::forward;
use crate::acquisition::{ListenerHandle, SourceEvent};
use crate::types::{AxisReading, RawMotionEvent};
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration, MissedTickBehavior};

const SENSOR_BINARY: &str = "termux-sensor";

/// Whether `termux-sensor` is on `PATH`.
pub fn is_available() -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(SENSOR_BINARY).is_file()))
        .unwrap_or(false)
}

fn axis(values: Option<&Value>) -> AxisReading {
    let get = |i: usize| values.and_then(|v| v.get(i)).and_then(Value::as_f64);
    AxisReading {
        x: get(0),
        y: get(1),
        z: get(2),
    }
}

/// Parse one `termux-sensor` JSON dump. Sensors missing from the output leave
/// the matching channel empty.
pub fn parse_sensor_output(text: &str) -> Option<RawMotionEvent> {
    let root: Value = serde_json::from_str(text.trim()).ok()?;
    let sensors = root.as_object()?;

    let mut event = RawMotionEvent::default();
    for (name, reading) in sensors {
        let channel = axis(reading.get("values"));
        if name.to_lowercase().contains("linear") {
            event.acceleration = Some(channel);
        } else if name.to_lowercase().contains("accelerometer") {
            event.acceleration_including_gravity = Some(channel);
        }
    }
    Some(event)
}

/// Run `program` to completion and capture stdout. The child is killed if
/// the future is dropped, so an aborted feed leaves no process behind.
async fn capture_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn read_once() -> Option<RawMotionEvent> {
    let text = capture_stdout(SENSOR_BINARY, &["-s", "accelerometer,linear_acceleration", "-n", "1"]).await?;
    parse_sensor_output(&text)
}

pub async fn run(period_ms: u64, listener: ListenerHandle, tx: Sender<SourceEvent>) {
    let mut ticker = interval(Duration::from_millis(period_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sample_count = 0u64;

    loop {
        ticker.tick().await;
        // Unreadable output produces nothing; the watchdog covers a dead sensor.
        let Some(event) = read_once().await else {
            continue;
        };
        if !forward(&tx, SourceEvent { listener, event }) {
            log::debug!("[ACQ] Termux feed closed after {} samples", sample_count);
            break;
        }
        sample_count += 1;
        if sample_count % 100 == 0 {
            log::debug!("[ACQ] Termux: {} samples", sample_count);
        }
    }
}
