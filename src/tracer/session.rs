use crate::data::CoverageData;
use crate::disposition::FileDisposition;
use crate::tracer::{FastTracer, ReferenceTracer, Tracer};
use crate::types::errors::Error;
use crate::types::models::{SessionConfig, TraceEvent, TracerKind};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

/// One measurement session: a tracer backend, its disposition cache, and
/// the `CoverageData` accumulator it exclusively owns.
///
/// Sessions replace any notion of a process-wide active tracer; nested or
/// concurrent measurement composes by creating more sessions, with the
/// resulting stores reconciled afterwards by the combiner. A session serves
/// one thread; threads that must share one serialize access with a `Mutex`
/// around it. Tracing can be stopped and started again without losing
/// recorded data, and stopping early is a valid terminal state, not an
/// error.
pub struct TraceSession {
    files: FileDisposition,
    tracer: Box<dyn Tracer>,
    data: CoverageData,
    active: bool,
    fault: Option<String>,
    warned: bool,
}

impl TraceSession {
    pub fn new(config: &SessionConfig) -> Result<Self, Error> {
        let files = FileDisposition::new(config)?;
        let mut data = CoverageData::new();
        data.begin(config.granularity)?;
        let tracer: Box<dyn Tracer> = match config.tracer {
            TracerKind::Reference => Box::new(ReferenceTracer::new(config.granularity)),
            TracerKind::Fast => Box::new(FastTracer::new(config.granularity)),
        };
        Ok(TraceSession {
            files,
            tracer,
            data,
            active: false,
            fault: None,
            warned: false,
        })
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active && self.fault.is_none()
    }

    /// Feed one execution event to the tracer.
    ///
    /// A fault inside the tracer — including a panic — is contained here:
    /// the tracer is disabled for the remainder of the session, a single
    /// diagnostic is logged, and the caller (the traced program) continues
    /// unaffected.
    pub fn record(&mut self, event: &TraceEvent) {
        if !self.active || self.fault.is_some() {
            return;
        }
        let TraceSession { files, tracer, .. } = self;
        if catch_unwind(AssertUnwindSafe(|| tracer.on_event(event, files))).is_err() {
            self.fault = Some("tracer panicked".to_string());
        } else if let Some(diagnostic) = self.tracer.fault() {
            self.fault = Some(diagnostic.to_string());
        }
        if let Some(diagnostic) = &self.fault {
            if !self.warned {
                log::warn!("coverage tracing disabled for this session: {}", diagnostic);
                self.warned = true;
            }
        }
    }

    /// Stop tracing, flushing accumulated state. Recorded data is kept and
    /// tracing may be started again.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.active = false;
        self.tracer.flush(&mut self.data)
    }

    /// Flush the tracer's accumulator into the session store without
    /// stopping.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.tracer.flush(&mut self.data)
    }

    /// Attribute subsequent measurement to `label`. Pending accumulations
    /// are flushed first so they stay with the previous context.
    pub fn set_context(&mut self, label: &str) -> Result<(), Error> {
        self.tracer.flush(&mut self.data)?;
        self.data.set_context(label);
        Ok(())
    }

    /// Flush and persist the session store. Persistence happens only at
    /// checkpoints like this one, never on the tracing hot path.
    pub fn save(&mut self, path: &Path) -> Result<(), Error> {
        self.tracer.flush(&mut self.data)?;
        self.data.write(path)
    }

    /// The diagnostic of a contained tracer fault, if any.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn data(&self) -> &CoverageData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut CoverageData {
        &mut self.data
    }

    /// Finish the session, yielding its store.
    pub fn into_data(mut self) -> Result<CoverageData, Error> {
        self.tracer.flush(&mut self.data)?;
        Ok(self.data)
    }
}
