use super::forward;
use crate::acquisition::{ListenerHandle, SourceEvent};
use crate::types::{AxisReading, RawMotionEvent, GRAVITY};
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

/// Synthetic event spacing (~100 Hz, faster than any experiment's throttle).
pub const SAMPLE_PERIOD_MS: u64 = 10;

/// Deterministic synthetic motion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Profile {
    /// Rest, launch spike, near-zero flight, landing spike, rest. Repeats every 8 s.
    Throw,
    /// Alternating up and down impulses around zero.
    Bounce,
    /// Device lying still.
    Idle,
    /// Listens but never produces anything.
    Silent,
    /// Produces events whose y axis is always missing.
    Broken,
}

// ─── Profile shapes ────────────────────────────────────────────────────────

const THROW_CYCLE_MS: u64 = 8000;
const BOUNCE_CYCLE_MS: u64 = 1200;

fn jitter(t_ms: u64) -> f64 {
    0.05 * (t_ms as f64 * 0.013).sin()
}

/// Vertical gravity-free acceleration of the profile at `t_ms`.
fn linear_z(profile: Profile, t_ms: u64) -> f64 {
    match profile {
        Profile::Throw => {
            let phase = t_ms % THROW_CYCLE_MS;
            let including = match phase {
                1000..=1199 => 19.0,
                1200..=1499 => 0.3,
                1500..=1599 => 22.0,
                _ => GRAVITY + jitter(t_ms),
            };
            including - GRAVITY
        }
        Profile::Bounce => match t_ms % BOUNCE_CYCLE_MS {
            0..=199 => 4.0,
            600..=799 => -4.0,
            _ => jitter(t_ms),
        },
        Profile::Idle | Profile::Silent | Profile::Broken => jitter(t_ms),
    }
}

impl Profile {
    /// Raw event the profile emits `t_ms` after listening started.
    pub fn event_at(self, t_ms: u64) -> RawMotionEvent {
        let z = linear_z(self, t_ms);
        let x = 0.5 * jitter(t_ms + 7);
        let y = 0.5 * jitter(t_ms + 13);
        if self == Profile::Broken {
            let broken = AxisReading {
                x: Some(x),
                y: None,
                z: Some(z),
            };
            return RawMotionEvent {
                acceleration: Some(broken),
                acceleration_including_gravity: Some(AxisReading { z: Some(z + GRAVITY), ..broken }),
            };
        }
        RawMotionEvent::new(AxisReading::new(x, y, z), AxisReading::new(x, y, z + GRAVITY))
    }
}

pub async fn run(profile: Profile, listener: ListenerHandle, tx: Sender<SourceEvent>) {
    if profile == Profile::Silent {
        log::debug!("[ACQ] Silent profile, listener {} stays quiet", listener.id());
        return;
    }

    let mut ticker = interval(Duration::from_millis(SAMPLE_PERIOD_MS));
    let mut elapsed = 0u64;
    loop {
        ticker.tick().await;
        let event = SourceEvent {
            listener,
            event: profile.event_at(elapsed),
        };
        if !forward(&tx, event) {
            log::debug!("[ACQ] Simulated feed closed after {} ms", elapsed);
            break;
        }
        elapsed += SAMPLE_PERIOD_MS;
    }
}
