//! Candidate primitives and the two-level collection they live in.
//!
//! Outer index is the source patch (grouped by `gid`), inner index is the order
//! of primitives inside that patch. This enumeration order is the order decision
//! variables were created in, so everything downstream walks it the same way.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use nalgebra::Vector3;

use crate::error::BoxError;

/// Status tag carried across iterations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Unset,
    /// Too small to be decided yet; carried over without a decision variable.
    Small,
    Active,
    Inactive,
}

impl Status {
    /// Integer code used in candidate files.
    pub fn code(self) -> i64 {
        match self {
            Status::Unset => -1,
            Status::Inactive => 0,
            Status::Active => 1,
            Status::Small => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Status::Unset),
            0 => Some(Status::Inactive),
            1 => Some(Status::Active),
            2 => Some(Status::Small),
            _ => None,
        }
    }
}

/// Shape family of a primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Plane,
    Cone,
}

impl ShapeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeKind::Plane => "plane",
            ShapeKind::Cone => "cone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plane" => Some(ShapeKind::Plane),
            "cone" => Some(ShapeKind::Cone),
            _ => None,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fitted candidate shape.
///
/// `pos` is the spatial anchor (plane point, cone apex); `dir` is the plane
/// normal or cone axis; `param` is the cone opening angle and unused for planes.
#[derive(Clone, Debug, PartialEq)]
pub struct Primitive {
    pub kind: ShapeKind,
    pub gid: i64,
    pub dir_gid: i64,
    pub status: Status,
    pub pos: Vector3<f64>,
    pub dir: Vector3<f64>,
    pub param: f64,
}

impl Primitive {
    pub fn plane(gid: i64, dir_gid: i64, pos: Vector3<f64>, normal: Vector3<f64>) -> Self {
        Self {
            kind: ShapeKind::Plane,
            gid,
            dir_gid,
            status: Status::Unset,
            pos,
            dir: normal,
            param: 0.0,
        }
    }

    pub fn cone(gid: i64, dir_gid: i64, apex: Vector3<f64>, axis: Vector3<f64>, angle: f64) -> Self {
        Self {
            kind: ShapeKind::Cone,
            gid,
            dir_gid,
            status: Status::Unset,
            pos: apex,
            dir: axis,
            param: angle,
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    #[inline]
    pub fn is_small(&self) -> bool {
        self.status == Status::Small
    }

    /// Display name used in diagnostics graphs: `p<gid>,<dir_gid>`.
    pub fn display_name(&self) -> String {
        format!("p{},{}", self.gid, self.dir_gid)
    }
}

/// Two-level collection: patches of primitives.
pub type PrimitiveSet = Vec<Vec<Primitive>>;

/// Group a flat list by `gid` (ascending), keeping input order inside a group.
pub fn group_by_gid(flat: impl IntoIterator<Item = Primitive>) -> PrimitiveSet {
    let mut groups: BTreeMap<i64, Vec<Primitive>> = BTreeMap::new();
    for p in flat {
        groups.entry(p.gid).or_default().push(p);
    }
    groups.into_values().collect()
}

/// Number of primitives that own a decision variable.
pub fn decided_count(set: &PrimitiveSet) -> usize {
    set.iter().flatten().filter(|p| !p.is_small()).count()
}

/// Reads and writes candidate files. Implemented by the CLI (CSV via polars).
pub trait PrimitiveIo {
    fn read_primitives(&self, path: &Path) -> Result<PrimitiveSet, BoxError>;
    fn save_primitives(&self, prims: &PrimitiveSet, path: &Path) -> Result<(), BoxError>;
}
