//! Whitespace-separated numeric text exports. Missing values are `NaN`.

use planar_kinematics_motion::KinematicsReport;
use planar_kinematics_plane::DenseWorldMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn num(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.6}"),
        _ => "NaN".to_string(),
    }
}

/// One `x y X Y` line per pixel, row-major. `X Y` are grid units.
pub fn write_dense_map<W: Write>(mut out: W, map: &DenseWorldMap) -> std::io::Result<()> {
    for y in 0..map.height {
        for x in 0..map.width {
            let (wx, wy) = match map.get(x, y) {
                Some([wx, wy]) => (Some(wx), Some(wy)),
                None => (None, None),
            };
            writeln!(out, "{x} {y} {} {}", num(wx), num(wy))?;
        }
    }
    out.flush()
}

/// Per-frame samples preceded by `#` summary lines.
///
/// Columns: `frame px py X Y speed acceleration`, with pixel coordinates in
/// the undistorted image and `X Y` in the report unit.
pub fn write_kinematics<W: Write>(mut out: W, report: &KinematicsReport) -> std::io::Result<()> {
    let s = &report.summary;
    let unit = report.unit;
    writeln!(
        out,
        "# frames {}..={} at {} fps, unit {unit}",
        report.range.start, report.range.end, report.frame_rate
    )?;
    writeln!(out, "# valid_positions {}/{}", s.valid_positions, s.frames)?;
    writeln!(out, "# duration_s {:.6}", s.duration)?;
    writeln!(out, "# mean_speed_{unit}_per_s {}", num(s.mean_speed))?;
    writeln!(out, "# mean_acceleration_{unit}_per_s2 {}", num(s.mean_acceleration))?;
    writeln!(out, "# path_length_{unit} {}", num(s.path_length))?;
    writeln!(out, "# net_displacement_{unit} {}", num(s.net_displacement))?;
    writeln!(out, "# frame px py X Y speed acceleration")?;
    for sample in &report.samples {
        writeln!(
            out,
            "{} {} {} {} {} {} {}",
            sample.frame_index,
            num(sample.pixel.map(|p| p.x)),
            num(sample.pixel.map(|p| p.y)),
            num(sample.position.map(|p| p.x)),
            num(sample.position.map(|p| p.y)),
            num(sample.speed),
            num(sample.acceleration),
        )?;
    }
    out.flush()
}

fn to_file(
    path: &Path,
    write: impl FnOnce(BufWriter<File>) -> std::io::Result<()>,
) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    write(BufWriter::new(file)).map_err(io_err)
}

pub fn write_dense_map_file(path: impl AsRef<Path>, map: &DenseWorldMap) -> Result<(), ExportError> {
    to_file(path.as_ref(), |out| write_dense_map(out, map))
}

pub fn write_kinematics_file(
    path: impl AsRef<Path>,
    report: &KinematicsReport,
) -> Result<(), ExportError> {
    to_file(path.as_ref(), |out| write_kinematics(out, report))
}
