use crate::data::CoverageData;
use crate::disposition::FileDisposition;
use crate::types::errors::{Error, Warning};
use crate::types::models::{Arc, LineNo, SessionConfig};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Source content together with its content hash.
#[derive(Debug, Clone)]
pub struct SourceText {
    pub content: String,
    pub hash: String,
}

/// Hex-encoded SHA-256 of source content; the merge key across runs.
pub fn content_hash(content: &str) -> String {
    Sha256::digest(content.as_bytes())
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Supplies source text by path. Must be pure and deterministic for
/// identical content.
pub trait SourceProvider {
    fn source(&self, path: &str) -> Result<SourceText, Error>;
}

/// Reads source files from the local filesystem.
#[derive(Debug, Default)]
pub struct FsSourceProvider;

impl SourceProvider for FsSourceProvider {
    fn source(&self, path: &str) -> Result<SourceText, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NoSource(path.to_string())
            } else {
                Error::Io(e)
            }
        })?;
        Ok(SourceText {
            hash: content_hash(&content),
            content,
        })
    }
}

/// A syntactic block: a header line opening a body spanning `start..=end`.
/// `parent` indexes the immediately enclosing block, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub header: LineNo,
    pub start: LineNo,
    pub end: LineNo,
    pub parent: Option<usize>,
}

/// Static structure of one source file, supplied by an external parser.
#[derive(Debug, Clone, Default)]
pub struct SourceStructure {
    /// Lines capable of executing. Blank lines, comments, and continuation
    /// lines of multi-line statements are not in this set.
    pub executable_lines: BTreeSet<LineNo>,
    /// Physical line → first physical line of the statement it belongs to.
    /// Lines absent from the map are their own statement start.
    pub statement_starts: HashMap<LineNo, LineNo>,
    pub blocks: Vec<BlockSpan>,
    /// Decision line → statically possible target lines.
    pub branch_arcs: BTreeMap<LineNo, BTreeSet<LineNo>>,
}

impl SourceStructure {
    /// Collapse a physical line to the first line of its statement.
    pub fn statement_start(&self, line: LineNo) -> LineNo {
        self.statement_starts.get(&line).copied().unwrap_or(line)
    }
}

/// Turns source content into structure. Must be pure and deterministic for
/// identical content; a changed content hash invalidates any cached result.
pub trait StructuralParser {
    fn parse(&self, content: &str) -> Result<SourceStructure, Error>;
}

/// Per-file coverage result, derived, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedFile {
    pub path: String,
    pub executable_lines: BTreeSet<LineNo>,
    pub excluded_lines: BTreeSet<LineNo>,
    pub executed_lines: BTreeSet<LineNo>,
    pub missing_lines: BTreeSet<LineNo>,
    /// Branching lines that executed but did not exercise every possible
    /// arc, mapped to the arcs they missed. Distinct from fully-missing
    /// branching lines, which appear in `missing_lines` instead.
    pub partial_branch_lines: BTreeMap<LineNo, BTreeSet<Arc>>,
    /// Statically possible branch outcomes on considered lines.
    pub n_branches: usize,
    pub n_missing_branches: usize,
    pub warnings: Vec<Warning>,
}

impl AnalyzedFile {
    /// Lines that count toward coverage: executable minus excluded.
    pub fn n_statements(&self) -> usize {
        self.executable_lines.len() - self.excluded_lines.len()
    }

    /// Percentage of considered lines executed; 100 when nothing is
    /// considered.
    pub fn percent_covered(&self) -> f64 {
        let denominator = self.n_statements();
        if denominator == 0 {
            return 100.0;
        }
        self.executed_lines.len() as f64 * 100.0 / denominator as f64
    }

    pub fn totals(&self) -> Totals {
        Totals {
            n_files: 1,
            n_statements: self.n_statements(),
            n_missing: self.missing_lines.len(),
            n_branches: self.n_branches,
            n_missing_branches: self.n_missing_branches,
            n_partial_branches: self.partial_branch_lines.len(),
        }
    }
}

/// Aggregated measurement summary across files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub n_files: usize,
    pub n_statements: usize,
    pub n_missing: usize,
    pub n_branches: usize,
    pub n_missing_branches: usize,
    pub n_partial_branches: usize,
}

impl Totals {
    pub fn n_executed(&self) -> usize {
        self.n_statements - self.n_missing
    }

    /// Covered ratio over lines and branch outcomes together; 100 when
    /// there is nothing to cover.
    pub fn percent_covered(&self) -> f64 {
        let denominator = self.n_statements + self.n_branches;
        if denominator == 0 {
            return 100.0;
        }
        let covered = self.n_executed() + (self.n_branches - self.n_missing_branches);
        covered as f64 * 100.0 / denominator as f64
    }
}

impl std::ops::Add for Totals {
    type Output = Totals;

    fn add(self, other: Totals) -> Totals {
        Totals {
            n_files: self.n_files + other.n_files,
            n_statements: self.n_statements + other.n_statements,
            n_missing: self.n_missing + other.n_missing,
            n_branches: self.n_branches + other.n_branches,
            n_missing_branches: self.n_missing_branches + other.n_missing_branches,
            n_partial_branches: self.n_partial_branches + other.n_partial_branches,
        }
    }
}

impl std::iter::Sum for Totals {
    fn sum<I: Iterator<Item = Totals>>(iter: I) -> Totals {
        iter.fold(Totals::default(), |acc, t| acc + t)
    }
}

struct CachedParse {
    hash: String,
    structure: SourceStructure,
    excluded: BTreeSet<LineNo>,
}

/// Reconciles recorded execution data against static source structure to
/// produce per-file results. Parses are cached by content hash; exclusion
/// sets come from the shared [`FileDisposition`] logic.
pub struct Analyzer<S, P> {
    provider: S,
    parser: P,
    files: FileDisposition,
    cache: HashMap<String, CachedParse>,
}

impl<S: SourceProvider, P: StructuralParser> Analyzer<S, P> {
    pub fn new(provider: S, parser: P, config: &SessionConfig) -> Result<Self, Error> {
        Ok(Analyzer {
            provider,
            parser,
            files: FileDisposition::new(config)?,
            cache: HashMap::new(),
        })
    }

    fn parsed(&mut self, path: &str) -> Result<&CachedParse, Error> {
        let text = self.provider.source(path)?;
        let fresh = self
            .cache
            .get(path)
            .map(|cached| cached.hash == text.hash)
            .unwrap_or(false);
        if !fresh {
            let structure = self.parser.parse(&text.content)?;
            self.files.invalidate(path);
            let excluded = self
                .files
                .excluded_lines(path, &text.content, &structure.blocks)
                .clone();
            self.cache.insert(
                path.to_string(),
                CachedParse {
                    hash: text.hash,
                    structure,
                    excluded,
                },
            );
        }
        Ok(&self.cache[path])
    }

    /// Analyze one file against the (possibly combined) store.
    pub fn analyze(&mut self, data: &CoverageData, path: &str) -> Result<AnalyzedFile, Error> {
        let parse = self.parsed(path)?;

        let mut warnings = Vec::new();
        if let Some(entry) = data.file_entry(path) {
            let changed = entry
                .hash
                .as_ref()
                .map(|hash| *hash != parse.hash)
                .unwrap_or(false);
            if entry.stale || changed {
                warnings.push(Warning::StaleSource {
                    file: path.to_string(),
                });
            }
        }

        let executable_lines = parse.structure.executable_lines.clone();
        let excluded_lines: BTreeSet<LineNo> = parse
            .excluded
            .intersection(&executable_lines)
            .copied()
            .collect();

        // A multi-line statement is covered by its first physical line alone.
        let recorded = data.lines_for(path, None).unwrap_or_default();
        let started: BTreeSet<LineNo> = recorded
            .iter()
            .map(|line| parse.structure.statement_start(*line))
            .collect();

        let executed_lines: BTreeSet<LineNo> = executable_lines
            .intersection(&started)
            .filter(|line| !excluded_lines.contains(line))
            .copied()
            .collect();
        let missing_lines: BTreeSet<LineNo> = executable_lines
            .iter()
            .filter(|line| !excluded_lines.contains(line) && !executed_lines.contains(line))
            .copied()
            .collect();

        let mut partial_branch_lines = BTreeMap::new();
        let mut n_branches = 0;
        let mut n_missing_branches = 0;
        if let Some(recorded_arcs) = data.arcs_for(path, None) {
            for (line, targets) in &parse.structure.branch_arcs {
                if excluded_lines.contains(line) {
                    continue;
                }
                n_branches += targets.len();
                let missing_arcs: BTreeSet<Arc> = targets
                    .iter()
                    .map(|target| Arc::new(*line, *target))
                    .filter(|arc| !recorded_arcs.contains(arc))
                    .collect();
                n_missing_branches += missing_arcs.len();
                if executed_lines.contains(line) && !missing_arcs.is_empty() {
                    partial_branch_lines.insert(*line, missing_arcs);
                }
            }
        }

        if executable_lines.len() == excluded_lines.len() {
            warnings.push(Warning::NoExecutableLines {
                file: path.to_string(),
            });
        }

        Ok(AnalyzedFile {
            path: path.to_string(),
            executable_lines,
            excluded_lines,
            executed_lines,
            missing_lines,
            partial_branch_lines,
            n_branches,
            n_missing_branches,
            warnings,
        })
    }

    /// Analyze every measured, reportable file. Files whose source can no
    /// longer be found are skipped with a debug note; other failures
    /// propagate.
    pub fn analyze_all(&mut self, data: &CoverageData) -> Result<Vec<AnalyzedFile>, Error> {
        let mut results = Vec::new();
        for file in data.measured_files() {
            let file = file.to_string();
            if !self.files.disposition_for(&file).is_traced() {
                continue;
            }
            match self.analyze(data, &file) {
                Ok(analyzed) => results.push(analyzed),
                Err(Error::NoSource(path)) => {
                    log::debug!("skipping '{}': source not available", path);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}
