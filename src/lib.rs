// Motion Lab core library
// Sensor acquisition, free-fall / vertical-motion analysis and a rolling terminal graph

pub mod acquisition;
pub mod analysis;
pub mod canvas;
pub mod display;
pub mod error;
pub mod graph;
pub mod live_status;
pub mod rerun_logger;
pub mod sensors;
pub mod session;
pub mod timing;
pub mod types;

pub use acquisition::{AcquisitionConfig, ListenerHandle, MotionSource, SensorAcquisition, SourceEvent};
pub use analysis::{Analyzer, DistanceEstimate, ExperimentKind, ExperimentState, MotionSign};
pub use error::{AcqResult, AcquisitionError};
pub use graph::{GraphConfig, RealtimeGraph, RenderSurface};
pub use session::{Command, Session, SessionConfig};
pub use types::{AccelerationSeries, RawMotionEvent, Sample};
