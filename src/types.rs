pub mod errors;
pub mod models;

pub use errors::{Error, Warning};
pub use models::{
    Arc, BOUNDARY, BlockExclusion, Disposition, EventKind, Granularity, LineNo, SessionConfig,
    TraceEvent, TracerKind,
};
