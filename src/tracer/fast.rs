use crate::data::CoverageData;
use crate::disposition::FileDisposition;
use crate::tracer::{Measure, Tracer};
use crate::types::errors::Error;
use crate::types::models::{Arc, BOUNDARY, EventKind, Granularity, LineNo, TraceEvent};
use std::collections::HashMap;

struct Frame {
    /// Index into `slots`; `None` when the frame's file is skipped.
    slot: Option<usize>,
    last_line: LineNo,
    id: u64,
}

struct Suspended {
    slot: Option<usize>,
    last_line: LineNo,
}

struct FileSlot {
    path: String,
    measure: Measure,
}

/// The performance-optimized backend. File paths are interned into `slots`
/// the first time a file is called, so the per-line hot path is a vector
/// index instead of a string hash. Observable output is identical to
/// [`crate::tracer::ReferenceTracer`] by contract.
pub struct FastTracer {
    branch: bool,
    frames: Vec<Frame>,
    suspended: HashMap<u64, Suspended>,
    slots: Vec<FileSlot>,
    /// Cached disposition per path: `None` means skip.
    index: HashMap<String, Option<usize>>,
    fault: Option<String>,
}

impl FastTracer {
    pub fn new(granularity: Granularity) -> Self {
        FastTracer {
            branch: granularity == Granularity::Arcs,
            frames: Vec::new(),
            suspended: HashMap::new(),
            slots: Vec::new(),
            index: HashMap::new(),
            fault: None,
        }
    }

    fn slot_for(&mut self, event: &TraceEvent, files: &mut FileDisposition) -> Option<usize> {
        if let Some(cached) = self.index.get(&event.file) {
            return *cached;
        }
        let slot = files.disposition_for(&event.file).is_traced().then(|| {
            self.slots.push(FileSlot {
                path: event.file.clone(),
                measure: Measure::default(),
            });
            self.slots.len() - 1
        });
        self.index.insert(event.file.clone(), slot);
        slot
    }
}

impl Tracer for FastTracer {
    fn on_event(&mut self, event: &TraceEvent, files: &mut FileDisposition) {
        if self.fault.is_some() {
            return;
        }
        match event.kind {
            EventKind::Call => {
                if let Some(resumed) = self.suspended.remove(&event.frame) {
                    self.frames.push(Frame {
                        slot: resumed.slot,
                        last_line: resumed.last_line,
                        id: event.frame,
                    });
                } else {
                    let slot = self.slot_for(event, files);
                    self.frames.push(Frame {
                        slot,
                        last_line: BOUNDARY,
                        id: event.frame,
                    });
                }
            }
            EventKind::Line => {
                let Some(frame) = self.frames.last_mut() else {
                    self.fault = Some(format!(
                        "line event with no open frame ({}:{})",
                        event.file, event.line
                    ));
                    return;
                };
                if let Some(slot) = frame.slot {
                    let measure = &mut self.slots[slot].measure;
                    if self.branch {
                        measure.arcs.insert(Arc::new(frame.last_line, event.line));
                    } else {
                        measure.lines.insert(event.line);
                    }
                }
                frame.last_line = event.line;
            }
            EventKind::Return { suspended } => {
                let Some(frame) = self.frames.pop() else {
                    self.fault = Some(format!(
                        "return event with no open frame ({}:{})",
                        event.file, event.line
                    ));
                    return;
                };
                if frame.id != event.frame {
                    self.fault = Some(format!(
                        "unbalanced frame stack: returned frame {} while frame {} is open",
                        event.frame, frame.id
                    ));
                    return;
                }
                if suspended {
                    self.suspended.insert(
                        frame.id,
                        Suspended {
                            slot: frame.slot,
                            last_line: frame.last_line,
                        },
                    );
                } else if self.branch && frame.last_line >= 0 {
                    if let Some(slot) = frame.slot {
                        self.slots[slot].measure.arcs.insert(Arc::exit(frame.last_line));
                    }
                }
            }
            EventKind::Exception => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.last_line = event.line;
                }
            }
        }
    }

    fn flush(&mut self, data: &mut CoverageData) -> Result<(), Error> {
        let branch = self.branch;
        for slot in self.slots.iter_mut() {
            slot.measure.flush_into(&slot.path, branch, data)?;
        }
        Ok(())
    }

    fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }
}
