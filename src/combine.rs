use crate::data::CoverageData;
use crate::types::errors::Error;
use crate::types::models::Granularity;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Merge a collection of stores into a fresh one.
///
/// Granularity agreement is verified before any merge work occurs. The
/// merge is a pure function of its inputs and is associative and
/// commutative: any grouping or ordering of the same stores yields an
/// identical result, which is what lets uncoordinated parallel workers
/// each write their own store.
pub fn combine_stores(stores: &[&CoverageData]) -> Result<CoverageData, Error> {
    let mut seen: Option<Granularity> = None;
    for store in stores {
        if let Some(granularity) = store.granularity() {
            match seen {
                None => seen = Some(granularity),
                Some(existing) if existing != granularity => {
                    return Err(Error::GranularityMismatch {
                        existing,
                        requested: granularity,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let mut combined = CoverageData::new();
    for store in stores {
        combined.merge_from(store)?;
    }
    log::info!(
        "combined {} stores covering {} files",
        stores.len(),
        combined.measured_files().len()
    );
    Ok(combined)
}

/// Load persisted stores in parallel, then combine them.
pub fn combine_files(paths: &[PathBuf]) -> Result<CoverageData, Error> {
    let stores = paths
        .par_iter()
        .map(|path| CoverageData::read(path))
        .collect::<Result<Vec<_>, Error>>()?;
    combine_stores(&stores.iter().collect::<Vec<_>>())
}

/// Find the per-worker store files named `<stem>.<suffix>` directly under
/// `dir`, sorted for determinism. In-flight temporaries are ignored.
pub fn find_store_files(dir: &Path, stem: &str) -> Result<Vec<PathBuf>, Error> {
    let prefix = format!("{}.", stem);
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            Error::Io(e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("unreadable directory entry")))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&prefix) && !name.ends_with(".tmp") {
                found.push(entry.into_path());
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Combine every `<stem>.<suffix>` store found under `dir`.
pub fn combine_directory(dir: &Path, stem: &str) -> Result<CoverageData, Error> {
    let paths = find_store_files(dir, stem)?;
    combine_files(&paths)
}
