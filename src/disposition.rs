use crate::analysis::BlockSpan;
use crate::types::errors::Error;
use crate::types::models::{BlockExclusion, Disposition, LineNo, SessionConfig};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use wildmatch::WildMatch;

/// Ordered text patterns identifying lines (and the blocks they open) to
/// exclude from consideration, independent of runtime behavior.
#[derive(Debug)]
pub struct ExclusionRuleSet {
    regex: Option<Regex>,
}

impl ExclusionRuleSet {
    /// Compile the configured patterns into one alternation, the same way
    /// each pattern would match on its own.
    pub fn new(patterns: &[String]) -> Result<Self, Error> {
        if patterns.is_empty() {
            return Ok(ExclusionRuleSet { regex: None });
        }
        let joined = patterns
            .iter()
            .map(|p| format!("(?:{})", p))
            .collect::<Vec<_>>()
            .join("|");
        Ok(ExclusionRuleSet {
            regex: Some(Regex::new(&joined)?),
        })
    }

    /// Pass one: lines of `source` whose text matches a pattern. Line
    /// numbers are 1-based.
    pub fn matched_lines(&self, source: &str) -> BTreeSet<LineNo> {
        let Some(regex) = &self.regex else {
            return BTreeSet::new();
        };
        source
            .lines()
            .enumerate()
            .filter(|(_, text)| regex.is_match(text))
            .map(|(idx, _)| idx as LineNo + 1)
            .collect()
    }

    /// Pass two: propagate marked block headers to their block's extent.
    ///
    /// `blocks` come from the structural parser; this never does line-range
    /// arithmetic of its own. `mode` decides how far a marked header
    /// reaches into nested blocks.
    pub fn excluded_lines(
        &self,
        source: &str,
        blocks: &[BlockSpan],
        mode: BlockExclusion,
    ) -> BTreeSet<LineNo> {
        let mut excluded = self.matched_lines(source);
        for marked in excluded.clone() {
            for (idx, block) in blocks.iter().enumerate() {
                if block.header != marked {
                    continue;
                }
                match mode {
                    BlockExclusion::Transitive => {
                        excluded.extend(block.start..=block.end);
                    }
                    BlockExclusion::Immediate => {
                        let mut span: BTreeSet<LineNo> = (block.start..=block.end).collect();
                        for child in blocks {
                            if child.parent == Some(idx) {
                                for line in child.start..=child.end {
                                    span.remove(&line);
                                }
                            }
                        }
                        excluded.extend(span);
                    }
                }
            }
        }
        excluded
    }
}

/// Per-file include/omit/trace decision plus the derived exclusion sets.
/// Decisions are computed once per file per session and cached.
pub struct FileDisposition {
    include: Vec<WildMatch>,
    omit: Vec<WildMatch>,
    exclusions: ExclusionRuleSet,
    block_mode: BlockExclusion,
    decisions: HashMap<String, Disposition>,
    excluded: HashMap<String, BTreeSet<LineNo>>,
}

impl FileDisposition {
    pub fn new(config: &SessionConfig) -> Result<Self, Error> {
        Ok(FileDisposition {
            include: config.include.iter().map(|p| WildMatch::new(p)).collect(),
            omit: config.omit.iter().map(|p| WildMatch::new(p)).collect(),
            exclusions: ExclusionRuleSet::new(&config.exclude)?,
            block_mode: config.block_exclusion,
            decisions: HashMap::new(),
            excluded: HashMap::new(),
        })
    }

    /// Decide whether `path` should be traced. Cached for the session.
    pub fn disposition_for(&mut self, path: &str) -> Disposition {
        if let Some(decision) = self.decisions.get(path) {
            return *decision;
        }
        let decision = self.decide(path);
        match decision {
            Disposition::Trace => log::debug!("tracing '{}'", path),
            Disposition::Skip => log::debug!("not tracing '{}'", path),
            Disposition::TraceQuiet => {}
        }
        self.decisions.insert(path.to_string(), decision);
        decision
    }

    fn decide(&self, path: &str) -> Disposition {
        // Pseudo-files such as "<string>" have no source to analyze.
        if path.starts_with('<') {
            return Disposition::Skip;
        }
        if self.omit.iter().any(|pattern| pattern.matches(path)) {
            return Disposition::Skip;
        }
        if self.include.is_empty() {
            return Disposition::TraceQuiet;
        }
        if self.include.iter().any(|pattern| pattern.matches(path)) {
            Disposition::Trace
        } else {
            Disposition::Skip
        }
    }

    /// Lines of `path` permanently excluded from both "missing" and
    /// "executed" classification. Computed once per file and cached.
    pub fn excluded_lines(
        &mut self,
        path: &str,
        source: &str,
        blocks: &[BlockSpan],
    ) -> &BTreeSet<LineNo> {
        if !self.excluded.contains_key(path) {
            let lines = self
                .exclusions
                .excluded_lines(source, blocks, self.block_mode);
            self.excluded.insert(path.to_string(), lines);
        }
        &self.excluded[path]
    }

    /// Drop the cached exclusion set for `path`, e.g. after its content
    /// hash changed.
    pub fn invalidate(&mut self, path: &str) {
        self.excluded.remove(path);
    }

    pub fn exclusions(&self) -> &ExclusionRuleSet {
        &self.exclusions
    }

    pub fn block_mode(&self) -> BlockExclusion {
        self.block_mode
    }
}
