//! Text serialization of sparse matrices.
//!
//! Format
//! - Lines starting with `#` and blank lines are ignored.
//! - First data line: `rows,cols`.
//! - Every further line: `row,col,value` (zero-based). Commas or whitespace separate fields.
//! - Duplicate `(row, col)` triplets are summed.
//!
//! The same format carries problem matrices, warm-start vectors and solutions.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use sprs::{CsMat, TriMat};

use crate::error::ProblemError;

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

/// Parse matrix text; `origin` only labels error messages.
pub fn parse_sparse(text: &str, origin: &Path) -> Result<CsMat<f64>, ProblemError> {
    let err = |line: usize, msg: String| ProblemError::Parse {
        path: origin.to_path_buf(),
        line,
        msg,
    };
    let mut shape: Option<(usize, usize)> = None;
    let mut tri: Option<TriMat<f64>> = None;

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let toks: Vec<&str> = fields(line).collect();
        match shape {
            None => {
                if toks.len() != 2 {
                    return Err(err(lineno, format!("expected `rows,cols`, got `{line}`")));
                }
                let rows = toks[0]
                    .parse::<usize>()
                    .map_err(|e| err(lineno, format!("rows: {e}")))?;
                let cols = toks[1]
                    .parse::<usize>()
                    .map_err(|e| err(lineno, format!("cols: {e}")))?;
                shape = Some((rows, cols));
                tri = Some(TriMat::new((rows, cols)));
            }
            Some((rows, cols)) => {
                if toks.len() != 3 {
                    return Err(err(lineno, format!("expected `row,col,value`, got `{line}`")));
                }
                let r = toks[0]
                    .parse::<usize>()
                    .map_err(|e| err(lineno, format!("row: {e}")))?;
                let c = toks[1]
                    .parse::<usize>()
                    .map_err(|e| err(lineno, format!("col: {e}")))?;
                let v = toks[2]
                    .parse::<f64>()
                    .map_err(|e| err(lineno, format!("value: {e}")))?;
                if r >= rows || c >= cols {
                    return Err(err(
                        lineno,
                        format!("entry ({r},{c}) outside {rows}x{cols} matrix"),
                    ));
                }
                if let Some(t) = tri.as_mut() {
                    t.add_triplet(r, c, v);
                }
            }
        }
    }

    match tri {
        Some(t) => Ok(t.to_csc()),
        None => Err(err(0, "missing `rows,cols` header".to_string())),
    }
}

/// Read a matrix file.
pub fn read_sparse(path: &Path) -> Result<CsMat<f64>, ProblemError> {
    let text = fs::read_to_string(path).map_err(|source| ProblemError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_sparse(&text, path)
}

/// Read a column vector file as a dense vector of length `rows`.
pub fn read_dense_column(path: &Path) -> Result<Vec<f64>, ProblemError> {
    let m = read_sparse(path)?;
    if m.cols() != 1 {
        return Err(ProblemError::Dimension(format!(
            "{} is {}x{}, expected a column vector",
            path.display(),
            m.rows(),
            m.cols()
        )));
    }
    let mut x = vec![0.0; m.rows()];
    for (&v, (r, _)) in m.iter() {
        x[r] += v;
    }
    Ok(x)
}

/// Render a matrix, entries in storage order.
pub fn format_sparse(m: &CsMat<f64>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# rows,cols then row,col,value");
    let _ = writeln!(out, "{},{}", m.rows(), m.cols());
    for (&v, (r, c)) in m.iter() {
        let _ = writeln!(out, "{r},{c},{v}");
    }
    out
}

/// Parse constraint bounds: one `lo,hi` line per constraint; `inf`/`-inf` allowed.
pub fn parse_bounds(text: &str, origin: &Path) -> Result<Vec<(f64, f64)>, ProblemError> {
    let mut bounds = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let toks: Vec<&str> = fields(line).collect();
        let parsed = match toks.as_slice() {
            [lo, hi] => lo.parse::<f64>().ok().zip(hi.parse::<f64>().ok()),
            _ => None,
        };
        match parsed {
            Some((lo, hi)) if lo <= hi => bounds.push((lo, hi)),
            _ => {
                return Err(ProblemError::Parse {
                    path: origin.to_path_buf(),
                    line: idx + 1,
                    msg: format!("expected `lo,hi` with lo <= hi, got `{line}`"),
                })
            }
        }
    }
    Ok(bounds)
}
