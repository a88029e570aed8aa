//! Artifact naming and all-or-nothing file writes.
//!
//! Per iteration `k` (parsed from the candidates file name) and backend `b`:
//! - `<candidates parent>/<rel out>/primitives_it<k>.<b>.csv`
//! - `<candidates parent>/<rel out>/diag_it<k>.gv`
//!
//! Every write goes to a temp file in the target directory and is renamed into
//! place. An existing primitives file is moved aside to a backup first.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::backend::Backend;
use crate::error::BoxError;
use crate::primitive::{PrimitiveIo, PrimitiveSet};
use crate::problem::EnergyBreakdown;

/// Iteration number encoded as `_it<k>` in the file name; 0 if absent.
pub fn parse_iteration(path: &Path) -> u32 {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return 0,
    };
    name.rmatch_indices("it")
        .filter_map(|(idx, _)| {
            let digits: String = name[idx + 2..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let preceded = idx == 0 || !name[..idx].ends_with(|c: char| c.is_ascii_alphanumeric());
            (preceded && !digits.is_empty()).then_some(digits)
        })
        .find_map(|d| d.parse::<u32>().ok())
        .unwrap_or(0)
}

/// Output locations for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub iteration: u32,
    pub primitives: PathBuf,
    pub diagnostics: PathBuf,
}

impl ArtifactPaths {
    pub fn new(candidates: &Path, rel_out_dir: &Path, backend: Backend) -> Self {
        let iteration = parse_iteration(candidates);
        let parent = candidates
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let out_dir = parent.join(rel_out_dir);
        Self {
            iteration,
            primitives: out_dir.join(format!("primitives_it{iteration}.{}.csv", backend.name())),
            diagnostics: out_dir.join(format!("diag_it{iteration}.gv")),
        }
    }
}

fn target_dir(path: &Path) -> io::Result<PathBuf> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = target_dir(path)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Move an existing file to the first free `<name>.bak`, `<name>.bak.1`, ...
pub fn backup_existing(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut candidate = path.with_file_name(format!("{name}.bak"));
    let mut k = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{name}.bak.{k}"));
        k += 1;
    }
    fs::rename(path, &candidate)?;
    Ok(Some(candidate))
}

/// Back up any previous file, then save `prims` atomically through `io`.
pub fn write_primitives(
    io: &dyn PrimitiveIo,
    prims: &PrimitiveSet,
    path: &Path,
) -> Result<Option<PathBuf>, BoxError> {
    let dir = target_dir(path)?;
    let tmp = tempfile::Builder::new()
        .prefix(".primitives")
        .suffix(".tmp")
        .tempfile_in(&dir)?
        .into_temp_path();
    io.save_primitives(prims, &tmp)?;
    let backup = backup_existing(path)?;
    tmp.persist(path)?;
    Ok(backup)
}

/// One ledger row: `total,data,pairwise,0`.
pub fn ledger_row(e: &EnergyBreakdown) -> String {
    format!("{},{},{},{}\n", e.total(), e.data, e.pairwise, 0)
}

/// Append one row to the energy ledger, rewriting the file atomically.
pub fn append_ledger_row(path: &Path, e: &EnergyBreakdown) -> io::Result<()> {
    let mut contents = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(err),
    };
    if contents.last().is_some_and(|&b| b != b'\n') {
        contents.push(b'\n');
    }
    contents.extend_from_slice(ledger_row(e).as_bytes());
    write_atomic(path, &contents)
}
