use crate::types::errors::Error;
use crate::types::models::{Arc, Granularity, LineNo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

pub const FORMAT_NAME: &str = "tracecov";
pub const FORMAT_VERSION: u32 = 1;

fn is_false(b: &bool) -> bool {
    !*b
}

/// Lines or arcs recorded under one context label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextData {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub lines: BTreeSet<LineNo>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub arcs: BTreeSet<Arc>,
}

impl ContextData {
    fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.arcs.is_empty()
    }
}

/// Everything recorded for one measured file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Content hash of the source at measurement time, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Set when inputs to a combine disagreed on the content hash.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stale: bool,
    pub contexts: BTreeMap<String, ContextData>,
}

impl FileEntry {
    /// Union `other` into `self`. The hash rule keeps combination
    /// associative and commutative: once stale the hash stays unknown, a
    /// fresh disagreement marks stale, and a known hash beats an unrecorded
    /// one.
    fn merge(&mut self, other: &FileEntry) {
        if self.stale || other.stale {
            self.stale = true;
            self.hash = None;
        } else {
            match (&self.hash, &other.hash) {
                (Some(a), Some(b)) if a != b => {
                    self.stale = true;
                    self.hash = None;
                }
                (None, Some(b)) => self.hash = Some(b.clone()),
                _ => {}
            }
        }
        for (context, data) in &other.contexts {
            let slot = self.contexts.entry(context.clone()).or_default();
            slot.lines.extend(data.lines.iter().copied());
            slot.arcs.extend(data.arcs.iter().copied());
        }
    }
}

/// The persisted document: a versioned header plus the per-file records.
#[derive(Serialize, Deserialize)]
struct StoreDoc {
    format: String,
    version: u32,
    granularity: Granularity,
    files: BTreeMap<String, FileEntry>,
}

/// In-memory store of recorded lines or arcs, partitioned by context.
///
/// Grows only by union: adding a line or arc already present is a no-op, so
/// every mutation is idempotent and safe to repeat. A store holds a single
/// granularity for its whole life; the first `begin`/`add_*` call fixes it.
#[derive(Debug, Default)]
pub struct CoverageData {
    granularity: Option<Granularity>,
    files: BTreeMap<String, FileEntry>,
    context: String,
    path: Option<PathBuf>,
}

impl PartialEq for CoverageData {
    fn eq(&self, other: &Self) -> bool {
        self.granularity == other.granularity && self.files == other.files
    }
}

impl CoverageData {
    pub fn new() -> Self {
        CoverageData::default()
    }

    /// Fix the store's granularity up front.
    pub fn begin(&mut self, granularity: Granularity) -> Result<(), Error> {
        self.ensure_granularity(granularity)
    }

    pub fn granularity(&self) -> Option<Granularity> {
        self.granularity
    }

    pub fn is_empty(&self) -> bool {
        self.files.values().all(|entry| {
            entry.contexts.values().all(|data| data.is_empty())
        })
    }

    /// Change the context attributed to subsequent `add_*` calls.
    pub fn set_context(&mut self, label: &str) {
        self.context = label.to_string();
    }

    pub fn current_context(&self) -> &str {
        &self.context
    }

    fn ensure_granularity(&mut self, requested: Granularity) -> Result<(), Error> {
        match self.granularity {
            None => {
                self.granularity = Some(requested);
                Ok(())
            }
            Some(existing) if existing == requested => Ok(()),
            Some(existing) => Err(Error::GranularityMismatch {
                existing,
                requested,
            }),
        }
    }

    /// Record executed lines for `file` under the current context.
    pub fn add_lines<I>(&mut self, file: &str, lines: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = LineNo>,
    {
        let context = self.context.clone();
        self.add_lines_in(file, &context, lines)
    }

    /// Record executed lines for `file` under an explicit context.
    pub fn add_lines_in<I>(&mut self, file: &str, context: &str, lines: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = LineNo>,
    {
        self.ensure_granularity(Granularity::Lines)?;
        let slot = self
            .files
            .entry(file.to_string())
            .or_default()
            .contexts
            .entry(context.to_string())
            .or_default();
        slot.lines.extend(lines);
        Ok(())
    }

    /// Record executed arcs for `file` under the current context.
    pub fn add_arcs<I>(&mut self, file: &str, arcs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Arc>,
    {
        let context = self.context.clone();
        self.add_arcs_in(file, &context, arcs)
    }

    /// Record executed arcs for `file` under an explicit context.
    pub fn add_arcs_in<I>(&mut self, file: &str, context: &str, arcs: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Arc>,
    {
        self.ensure_granularity(Granularity::Arcs)?;
        let slot = self
            .files
            .entry(file.to_string())
            .or_default()
            .contexts
            .entry(context.to_string())
            .or_default();
        slot.arcs.extend(arcs);
        Ok(())
    }

    /// Attach the content hash of `file` at measurement time.
    pub fn set_file_hash(&mut self, file: &str, hash: &str) {
        self.files.entry(file.to_string()).or_default().hash = Some(hash.to_string());
    }

    pub fn file_entry(&self, file: &str) -> Option<&FileEntry> {
        self.files.get(file)
    }

    pub fn measured_files(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    /// Executed lines for `file`, optionally restricted to one context.
    ///
    /// In arcs mode the lines are derived from the recorded arcs: every
    /// non-sentinel endpoint was executed.
    pub fn lines_for(&self, file: &str, context: Option<&str>) -> Option<BTreeSet<LineNo>> {
        let entry = self.files.get(file)?;
        let mut lines = BTreeSet::new();
        for (label, data) in &entry.contexts {
            if let Some(wanted) = context {
                if label != wanted {
                    continue;
                }
            }
            lines.extend(data.lines.iter().copied());
            for arc in &data.arcs {
                if arc.from >= 0 {
                    lines.insert(arc.from);
                }
                if arc.to >= 0 {
                    lines.insert(arc.to);
                }
            }
        }
        Some(lines)
    }

    /// Executed arcs for `file`, optionally restricted to one context.
    pub fn arcs_for(&self, file: &str, context: Option<&str>) -> Option<BTreeSet<Arc>> {
        if self.granularity != Some(Granularity::Arcs) {
            return None;
        }
        let entry = self.files.get(file)?;
        let mut arcs = BTreeSet::new();
        for (label, data) in &entry.contexts {
            if let Some(wanted) = context {
                if label != wanted {
                    continue;
                }
            }
            arcs.extend(data.arcs.iter().copied());
        }
        Some(arcs)
    }

    /// Reverse index: which contexts touched `line` of `file`.
    pub fn contexts_for(&self, file: &str, line: LineNo) -> Vec<String> {
        let Some(entry) = self.files.get(file) else {
            return Vec::new();
        };
        entry
            .contexts
            .iter()
            .filter(|(_, data)| {
                data.lines.contains(&line)
                    || data
                        .arcs
                        .iter()
                        .any(|arc| arc.from == line || arc.to == line)
            })
            .map(|(label, _)| label.clone())
            .collect()
    }

    /// Count of distinct executed lines per measured file.
    pub fn line_counts(&self) -> BTreeMap<String, usize> {
        self.files
            .keys()
            .map(|file| {
                let count = self
                    .lines_for(file, None)
                    .map(|lines| lines.len())
                    .unwrap_or(0);
                (file.clone(), count)
            })
            .collect()
    }

    /// Union another store into this one. Granularity is checked before any
    /// merge work happens, so a failed call leaves `self` untouched.
    pub(crate) fn merge_from(&mut self, other: &CoverageData) -> Result<(), Error> {
        if let (Some(existing), Some(requested)) = (self.granularity, other.granularity) {
            if existing != requested {
                return Err(Error::GranularityMismatch {
                    existing,
                    requested,
                });
            }
        }
        if self.granularity.is_none() {
            self.granularity = other.granularity;
        }
        for (file, entry) in &other.files {
            self.files.entry(file.clone()).or_default().merge(entry);
        }
        Ok(())
    }

    /// Persist atomically: serialize to a temporary sibling, then rename into
    /// place, so a crash mid-write never leaves a corrupt file at `path`.
    pub fn write(&mut self, path: &Path) -> Result<(), Error> {
        let doc = StoreDoc {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            granularity: self.granularity.unwrap_or_default(),
            files: self.files.clone(),
        };
        let json = serde_json::to_string_pretty(&doc)?;

        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Load a persisted store. A malformed document or one whose payload
    /// disagrees with its declared granularity is rejected outright.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let corrupt = |detail: String| Error::CorruptStore {
            path: path.display().to_string(),
            detail,
        };

        let content = fs::read_to_string(path)?;
        let doc: StoreDoc =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;

        if doc.format != FORMAT_NAME {
            return Err(corrupt(format!("unrecognized format '{}'", doc.format)));
        }
        if doc.version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion {
                path: path.display().to_string(),
                found: doc.version,
                expected: FORMAT_VERSION,
            });
        }
        for (file, entry) in &doc.files {
            for data in entry.contexts.values() {
                let bad = match doc.granularity {
                    Granularity::Lines => !data.arcs.is_empty(),
                    Granularity::Arcs => !data.lines.is_empty(),
                };
                if bad {
                    return Err(corrupt(format!(
                        "file '{}' holds data of the wrong granularity",
                        file
                    )));
                }
            }
        }

        Ok(CoverageData {
            granularity: Some(doc.granularity),
            files: doc.files,
            context: String::new(),
            path: Some(path.to_path_buf()),
        })
    }

    /// Clear all in-memory state and delete the backing file, if any.
    pub fn erase(&mut self) -> Result<(), Error> {
        self.granularity = None;
        self.files.clear();
        self.context.clear();
        if let Some(path) = self.path.take() {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}
