pub mod fast;
pub mod reference;
pub mod session;

pub use fast::FastTracer;
pub use reference::ReferenceTracer;
pub use session::TraceSession;

use crate::data::CoverageData;
use crate::disposition::FileDisposition;
use crate::types::errors::Error;
use crate::types::models::{Arc, LineNo, TraceEvent};
use std::collections::HashSet;

/// Receives execution events and records lines or arcs for traced files.
///
/// Two implementations share this contract: [`ReferenceTracer`] is the
/// portable correctness canon, [`FastTracer`] minimizes per-event cost. Any
/// output divergence between them for the same event stream is a defect.
pub trait Tracer {
    /// Handle one execution event. Must never block on I/O and must contain
    /// its own faults: after an internal error the tracer disables itself
    /// and reports through [`Tracer::fault`].
    fn on_event(&mut self, event: &TraceEvent, files: &mut FileDisposition);

    /// Union the in-memory accumulator into `data` under its current
    /// context, draining the accumulator. Re-flushing is harmless.
    fn flush(&mut self, data: &mut CoverageData) -> Result<(), Error>;

    /// The diagnostic of a contained internal fault, if one occurred.
    fn fault(&self) -> Option<&str>;
}

/// Per-file in-memory accumulator. Only one of the two sets is populated,
/// according to the session granularity.
#[derive(Debug, Default)]
pub struct Measure {
    pub lines: HashSet<LineNo>,
    pub arcs: HashSet<Arc>,
}

impl Measure {
    pub(crate) fn flush_into(
        &mut self,
        file: &str,
        branch: bool,
        data: &mut CoverageData,
    ) -> Result<(), Error> {
        if branch {
            if !self.arcs.is_empty() {
                data.add_arcs(file, self.arcs.drain())?;
            }
        } else if !self.lines.is_empty() {
            data.add_lines(file, self.lines.drain())?;
        }
        Ok(())
    }
}
