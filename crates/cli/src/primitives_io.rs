//! Candidate primitive CSV files, read and written with polars.
//!
//! Header: `gid,dir_gid,status,kind,pos_x,pos_y,pos_z,dir_x,dir_y,dir_z,param`.

use std::fs::File;
use std::path::Path;

use nalgebra::Vector3;
use polars::prelude::*;
use primsel::error::BoxError;
use primsel::primitive::group_by_gid;
use primsel::{Primitive, PrimitiveIo, PrimitiveSet, ShapeKind, Status};

const FLOAT_COLS: [&str; 7] = [
    "pos_x", "pos_y", "pos_z", "dir_x", "dir_y", "dir_z", "param",
];

pub struct CsvPrimitiveIo;

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, BoxError> {
    df.column(name)?
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| format!("row {row}: missing `{name}`").into()))
        .collect()
}

fn int_column(df: &DataFrame, name: &str) -> Result<Vec<i64>, BoxError> {
    df.column(name)?
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| v.ok_or_else(|| format!("row {row}: missing `{name}`").into()))
        .collect()
}

impl PrimitiveIo for CsvPrimitiveIo {
    fn read_primitives(&self, path: &Path) -> Result<PrimitiveSet, BoxError> {
        let mut exprs = vec![
            col("gid").cast(DataType::Int64),
            col("dir_gid").cast(DataType::Int64),
            col("status").cast(DataType::Int64),
            col("kind").cast(DataType::String),
        ];
        exprs.extend(FLOAT_COLS.iter().map(|c| col(*c).cast(DataType::Float64)));
        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()?
            .select(exprs)
            .collect()?;
        tracing::debug!(rows = df.height(), path = %path.display(), "candidates read");

        let gid = int_column(&df, "gid")?;
        let dir_gid = int_column(&df, "dir_gid")?;
        let status = int_column(&df, "status")?;
        let floats = FLOAT_COLS
            .iter()
            .map(|c| float_column(&df, c))
            .collect::<Result<Vec<_>, _>>()?;
        let kinds = df.column("kind")?.str()?;

        let mut flat = Vec::with_capacity(df.height());
        for (row, kind) in kinds.into_iter().enumerate() {
            let kind = kind
                .and_then(ShapeKind::parse)
                .ok_or_else(|| format!("row {row}: unknown primitive kind"))?;
            let status = Status::from_code(status[row])
                .ok_or_else(|| format!("row {row}: unknown status {}", status[row]))?;
            let f = |k: usize| floats[k][row];
            flat.push(Primitive {
                kind,
                gid: gid[row],
                dir_gid: dir_gid[row],
                status,
                pos: Vector3::new(f(0), f(1), f(2)),
                dir: Vector3::new(f(3), f(4), f(5)),
                param: f(6),
            });
        }
        Ok(group_by_gid(flat))
    }

    fn save_primitives(&self, prims: &PrimitiveSet, path: &Path) -> Result<(), BoxError> {
        let all: Vec<&Primitive> = prims.iter().flatten().collect();
        let pick = |f: fn(&Primitive) -> f64| all.iter().map(|p| f(p)).collect::<Vec<f64>>();
        let mut df = df!(
            "gid" => all.iter().map(|p| p.gid).collect::<Vec<i64>>(),
            "dir_gid" => all.iter().map(|p| p.dir_gid).collect::<Vec<i64>>(),
            "status" => all.iter().map(|p| p.status.code()).collect::<Vec<i64>>(),
            "kind" => all.iter().map(|p| p.kind.as_str()).collect::<Vec<&str>>(),
            "pos_x" => pick(|p| p.pos.x),
            "pos_y" => pick(|p| p.pos.y),
            "pos_z" => pick(|p| p.pos.z),
            "dir_x" => pick(|p| p.dir.x),
            "dir_y" => pick(|p| p.dir.y),
            "dir_z" => pick(|p| p.dir.z),
            "param" => pick(|p| p.param),
        )?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        Ok(())
    }
}
