use serde::{Deserialize, Serialize};

/// A physical source line number. Negative values are reserved for sentinels.
pub type LineNo = i64;

/// Sentinel endpoint for arcs that enter or leave a function body.
///
/// An arc `(-1, n)` records entry at line `n`; an arc `(n, -1)` records the
/// function being left (return or unwinding exception) from line `n`. Using a
/// negative value keeps exits distinct from every real line number.
pub const BOUNDARY: LineNo = -1;

/// An executed transition between two source lines, or between a line and
/// function entry/exit. The unit of measurement in branch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(LineNo, LineNo)", into = "(LineNo, LineNo)")]
pub struct Arc {
    pub from: LineNo,
    pub to: LineNo,
}

impl Arc {
    pub fn new(from: LineNo, to: LineNo) -> Self {
        Arc { from, to }
    }

    /// The arc taken when execution enters a body at `line`.
    pub fn entry(line: LineNo) -> Self {
        Arc {
            from: BOUNDARY,
            to: line,
        }
    }

    /// The arc taken when execution leaves a body from `line`.
    pub fn exit(line: LineNo) -> Self {
        Arc {
            from: line,
            to: BOUNDARY,
        }
    }

    pub fn is_entry(&self) -> bool {
        self.from < 0
    }

    pub fn is_exit(&self) -> bool {
        self.to < 0
    }
}

impl From<(LineNo, LineNo)> for Arc {
    fn from((from, to): (LineNo, LineNo)) -> Self {
        Arc { from, to }
    }
}

impl From<Arc> for (LineNo, LineNo) {
    fn from(arc: Arc) -> Self {
        (arc.from, arc.to)
    }
}

impl std::fmt::Display for Arc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.from, self.to)
    }
}

/// Whether a store records executed lines only, or executed arcs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Lines,
    Arcs,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Lines => write!(f, "lines"),
            Granularity::Arcs => write!(f, "arcs"),
        }
    }
}

/// Which tracer backend a session instantiates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracerKind {
    /// Portable map-of-sets backend; the correctness canon.
    Reference,
    /// Path-interning backend with cached per-file handles.
    #[default]
    Fast,
}

impl std::fmt::Display for TracerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TracerKind::Reference => write!(f, "reference"),
            TracerKind::Fast => write!(f, "fast"),
        }
    }
}

/// How far a block-level exclusion marker propagates into nested blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockExclusion {
    /// Exclude the marked block's full extent, nested blocks included.
    #[default]
    Transitive,
    /// Exclude only the marked block's own lines; nested block bodies are
    /// retained unless they carry their own marker.
    Immediate,
}

/// The per-file trace decision, made once per session and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Record execution and surface the file in diagnostics.
    Trace,
    /// Record execution without per-file diagnostics (the file was swept in
    /// by default rather than explicitly included).
    TraceQuiet,
    /// Do not record anything for this file.
    Skip,
}

impl Disposition {
    pub fn is_traced(&self) -> bool {
        !matches!(self, Disposition::Skip)
    }
}

/// What kind of execution event the host runtime observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new frame was entered, or a suspended frame resumed.
    Call,
    /// A line of the current frame is about to execute.
    Line,
    /// The current frame was left. `suspended` marks a coroutine yield whose
    /// frame will resume later under the same frame id.
    Return { suspended: bool },
    /// An exception was raised at the carried line.
    Exception,
}

/// One execution event, delivered synchronously on the thread that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: EventKind,
    /// Canonical path of the file the current frame executes.
    pub file: String,
    pub line: LineNo,
    /// Host-assigned identifier, unique among live frames.
    pub frame: u64,
}

impl TraceEvent {
    pub fn call(file: &str, line: LineNo, frame: u64) -> Self {
        TraceEvent {
            kind: EventKind::Call,
            file: file.to_string(),
            line,
            frame,
        }
    }

    pub fn line(file: &str, line: LineNo, frame: u64) -> Self {
        TraceEvent {
            kind: EventKind::Line,
            file: file.to_string(),
            line,
            frame,
        }
    }

    pub fn ret(file: &str, line: LineNo, frame: u64) -> Self {
        TraceEvent {
            kind: EventKind::Return { suspended: false },
            file: file.to_string(),
            line,
            frame,
        }
    }

    pub fn yield_(file: &str, line: LineNo, frame: u64) -> Self {
        TraceEvent {
            kind: EventKind::Return { suspended: true },
            file: file.to_string(),
            line,
            frame,
        }
    }

    pub fn exception(file: &str, line: LineNo, frame: u64) -> Self {
        TraceEvent {
            kind: EventKind::Exception,
            file: file.to_string(),
            line,
            frame,
        }
    }
}

fn default_exclude_patterns() -> Vec<String> {
    vec![r"pragma[:\s]?\s*no\s*cover".to_string()]
}

/// Configuration for one measurement session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Glob-style patterns selecting files to trace fully. Empty means every
    /// non-omitted file is traced (quietly).
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob-style patterns for files never to trace.
    #[serde(default)]
    pub omit: Vec<String>,
    #[serde(default)]
    pub granularity: Granularity,
    #[serde(default)]
    pub tracer: TracerKind,
    /// Regexes marking lines (and blocks they open) as excluded.
    #[serde(default = "default_exclude_patterns")]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub block_exclusion: BlockExclusion,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            include: Vec::new(),
            omit: Vec::new(),
            granularity: Granularity::Lines,
            tracer: TracerKind::Fast,
            exclude: default_exclude_patterns(),
            block_exclusion: BlockExclusion::Transitive,
        }
    }
}
