use crate::data::CoverageData;
use crate::disposition::FileDisposition;
use crate::tracer::{Measure, Tracer};
use crate::types::errors::Error;
use crate::types::models::{Arc, BOUNDARY, EventKind, Granularity, LineNo, TraceEvent};
use std::collections::HashMap;

struct Frame {
    /// `None` when the frame's file is skipped.
    file: Option<String>,
    last_line: LineNo,
    id: u64,
}

struct Suspended {
    file: Option<String>,
    last_line: LineNo,
}

/// The portable reference backend: a frame stack over a map of per-file
/// accumulators, with every decision looked up by file path. Higher
/// per-event overhead, correctness-canonical.
pub struct ReferenceTracer {
    branch: bool,
    frames: Vec<Frame>,
    suspended: HashMap<u64, Suspended>,
    measures: HashMap<String, Measure>,
    decisions: HashMap<String, bool>,
    fault: Option<String>,
}

impl ReferenceTracer {
    pub fn new(granularity: Granularity) -> Self {
        ReferenceTracer {
            branch: granularity == Granularity::Arcs,
            frames: Vec::new(),
            suspended: HashMap::new(),
            measures: HashMap::new(),
            decisions: HashMap::new(),
            fault: None,
        }
    }

    fn traced_file(&mut self, event: &TraceEvent, files: &mut FileDisposition) -> Option<String> {
        let traced = match self.decisions.get(&event.file) {
            Some(cached) => *cached,
            None => {
                let decision = files.disposition_for(&event.file).is_traced();
                self.decisions.insert(event.file.clone(), decision);
                decision
            }
        };
        traced.then(|| event.file.clone())
    }
}

impl Tracer for ReferenceTracer {
    fn on_event(&mut self, event: &TraceEvent, files: &mut FileDisposition) {
        if self.fault.is_some() {
            return;
        }
        match event.kind {
            EventKind::Call => {
                if let Some(resumed) = self.suspended.remove(&event.frame) {
                    // A resumed frame keeps its last line: no fresh entry arc.
                    self.frames.push(Frame {
                        file: resumed.file,
                        last_line: resumed.last_line,
                        id: event.frame,
                    });
                } else {
                    let file = self.traced_file(event, files);
                    self.frames.push(Frame {
                        file,
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
                if let Some(file) = &frame.file {
                    let measure = self.measures.entry(file.clone()).or_default();
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
                            file: frame.file,
                            last_line: frame.last_line,
                        },
                    );
                } else if self.branch && frame.last_line >= 0 {
                    if let Some(file) = &frame.file {
                        self.measures
                            .entry(file.clone())
                            .or_default()
                            .arcs
                            .insert(Arc::exit(frame.last_line));
                    }
                }
            }
            EventKind::Exception => {
                // The raising line becomes the origin of the eventual exit arc.
                if let Some(frame) = self.frames.last_mut() {
                    frame.last_line = event.line;
                }
            }
        }
    }

    fn flush(&mut self, data: &mut CoverageData) -> Result<(), Error> {
        for (file, measure) in self.measures.iter_mut() {
            measure.flush_into(file, self.branch, data)?;
        }
        Ok(())
    }

    fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }
}
