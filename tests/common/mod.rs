#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use tracecov::{
    Arc, BlockSpan, Error, LineNo, SourceProvider, SourceStructure, SourceText, StructuralParser,
    content_hash,
};

/// In-memory source provider for tests. Clones share the same file map so a
/// test can change a file after handing the provider to an analyzer.
#[derive(Clone, Default)]
pub struct MemorySource {
    files: Rc<RefCell<HashMap<String, String>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn insert(&self, path: &str, content: &str) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_string());
    }
}

impl SourceProvider for MemorySource {
    fn source(&self, path: &str) -> Result<SourceText, Error> {
        let files = self.files.borrow();
        let content = files
            .get(path)
            .ok_or_else(|| Error::NoSource(path.to_string()))?;
        Ok(SourceText {
            hash: content_hash(content),
            content: content.clone(),
        })
    }
}

/// Parser that returns a fixed structure regardless of content, counting
/// how often it was invoked.
pub struct FixedParser {
    structure: SourceStructure,
    pub calls: Rc<Cell<usize>>,
}

impl FixedParser {
    pub fn new(structure: SourceStructure) -> Self {
        FixedParser {
            structure,
            calls: Rc::new(Cell::new(0)),
        }
    }
}

impl StructuralParser for FixedParser {
    fn parse(&self, _content: &str) -> Result<SourceStructure, Error> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.structure.clone())
    }
}

/// Minimal structural parser for an indentation-based toy language:
/// `#` starts a comment, a trailing `\` continues a statement onto the next
/// physical line, and a line whose code ends in `:` opens a block containing
/// the more-indented lines that follow.
pub struct ToyParser;

impl StructuralParser for ToyParser {
    fn parse(&self, content: &str) -> Result<SourceStructure, Error> {
        let mut structure = SourceStructure::default();
        let mut open: Vec<(usize, usize)> = Vec::new(); // (indent, block index)
        let mut chain_start: Option<LineNo> = None;
        let mut continuing = false;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx as LineNo + 1;
            let code = raw.split('#').next().unwrap_or("").trim_end();
            if code.trim().is_empty() {
                continuing = false;
                chain_start = None;
                continue;
            }
            let indent = code.len() - code.trim_start().len();
            while let Some((block_indent, _)) = open.last() {
                if indent <= *block_indent {
                    open.pop();
                } else {
                    break;
                }
            }
            for (_, block_idx) in &open {
                structure.blocks[*block_idx].end = line_no;
            }

            if continuing {
                if let Some(start) = chain_start {
                    structure.statement_starts.insert(line_no, start);
                }
            } else {
                structure.executable_lines.insert(line_no);
                chain_start = Some(line_no);
            }
            continuing = code.ends_with('\\');

            if !continuing && code.ends_with(':') {
                let parent = open.last().map(|(_, block_idx)| *block_idx);
                structure.blocks.push(BlockSpan {
                    header: line_no,
                    start: line_no,
                    end: line_no,
                    parent,
                });
                open.push((indent, structure.blocks.len() - 1));
            }
        }
        Ok(structure)
    }
}

pub fn line_set(lines: &[LineNo]) -> BTreeSet<LineNo> {
    lines.iter().copied().collect()
}

pub fn arc_set(pairs: &[(LineNo, LineNo)]) -> BTreeSet<Arc> {
    pairs.iter().map(|(from, to)| Arc::new(*from, *to)).collect()
}
