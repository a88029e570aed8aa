//! Shared fixtures for unit tests.

use std::fs;
use std::path::Path;

use nalgebra::Vector3;

use crate::error::BoxError;
use crate::primitive::{group_by_gid, Primitive, PrimitiveIo, PrimitiveSet, Status};

/// Plane anchored at `(gid, dir_gid, 0)`.
pub fn prim(gid: i64, dir_gid: i64, status: Status) -> Primitive {
    Primitive::plane(
        gid,
        dir_gid,
        Vector3::new(gid as f64, dir_gid as f64, 0.0),
        Vector3::z(),
    )
    .with_status(status)
}

/// Minimal `gid,dir_gid,status` line format.
pub struct LineIo;

impl PrimitiveIo for LineIo {
    fn read_primitives(&self, path: &Path) -> Result<PrimitiveSet, BoxError> {
        let text = fs::read_to_string(path)?;
        let mut flat = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let f: Vec<i64> = line
                .split(',')
                .map(|t| t.trim().parse::<i64>())
                .collect::<Result<_, _>>()?;
            let status = Status::from_code(f[2]).ok_or("bad status")?;
            flat.push(prim(f[0], f[1], status));
        }
        Ok(group_by_gid(flat))
    }

    fn save_primitives(&self, prims: &PrimitiveSet, path: &Path) -> Result<(), BoxError> {
        let mut out = String::new();
        for p in prims.iter().flatten() {
            out.push_str(&format!("{},{},{}\n", p.gid, p.dir_gid, p.status.code()));
        }
        fs::write(path, out)?;
        Ok(())
    }
}
