//! RAW import/export of per-column fields (surface elevation, water depth).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::terrain::TerrainSnapshot;

/// Errors that can occur during RAW import or export.
#[derive(Error, Debug)]
pub enum RawIoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid height range: min ({0}) >= max ({1})")]
    InvalidHeightRange(f32, f32),
    #[error("RAW file has {actual} bytes, expected {expected} for a {side_length}x{side_length} R32 heightmap")]
    SizeMismatch { expected: u64, actual: u64, side_length: u32 },
}

/// RAW export format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RawFormat {
    /// 16-bit unsigned integer, little-endian (Unity default).
    #[default]
    R16LittleEndian,
    /// 16-bit unsigned integer, big-endian.
    R16BigEndian,
    /// 32-bit float, little-endian (high precision).
    R32Float,
}

/// Writes a row-major field as RAW.
///
/// R16 formats normalise `[min_height, max_height]` onto `0..=65535`; R32
/// writes the values unchanged.
pub fn export_field_raw(
    values: &[f32],
    path: &Path,
    format: RawFormat,
    min_height: f32,
    max_height: f32,
) -> Result<(), RawIoError> {
    if format != RawFormat::R32Float && min_height >= max_height {
        return Err(RawIoError::InvalidHeightRange(min_height, max_height));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let range = max_height - min_height;
    let quantize = |height: f32| (((height - min_height) / range).clamp(0.0, 1.0) * 65535.0) as u16;

    match format {
        RawFormat::R16LittleEndian => {
            for &height in values {
                writer.write_all(&quantize(height).to_le_bytes())?;
            }
        }
        RawFormat::R16BigEndian => {
            for &height in values {
                writer.write_all(&quantize(height).to_be_bytes())?;
            }
        }
        RawFormat::R32Float => {
            for &height in values {
                writer.write_all(&height.to_le_bytes())?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Value range of a field, widened so R16 export always has a non-empty range.
pub fn field_range(values: &[f32]) -> (f32, f32) {
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min > max {
        (0.0, 1.0)
    } else if max - min <= f32::EPSILON {
        (min, min + 1.0)
    } else {
        (min, max)
    }
}

/// Exports the surface elevation and water depth of a snapshot as
/// `{base_name}_surface.raw` and `{base_name}_water.raw`, each normalised to
/// its own range. Returns the written paths.
pub fn export_snapshot_raw(
    snapshot: &TerrainSnapshot,
    output_dir: &Path,
    base_name: &str,
    format: RawFormat,
) -> Result<Vec<PathBuf>, RawIoError> {
    std::fs::create_dir_all(output_dir)?;

    let fields = [
        ("surface", snapshot.surface_elevations()),
        ("water", snapshot.water_depths()),
    ];
    let mut written = Vec::with_capacity(fields.len());
    for (name, values) in &fields {
        let path = output_dir.join(format!("{base_name}_{name}.raw"));
        let (min, max) = field_range(values);
        export_field_raw(values, &path, format, min, max)?;
        written.push(path);
    }
    Ok(written)
}

/// Reads a little-endian R32 heightmap of `side_length²` values.
pub fn import_heightmap_r32(path: &Path, side_length: u32) -> Result<Vec<f32>, RawIoError> {
    let bytes = std::fs::read(path)?;
    let expected = expected_file_size(side_length, RawFormat::R32Float);
    if bytes.len() as u64 != expected {
        return Err(RawIoError::SizeMismatch {
            expected,
            actual: bytes.len() as u64,
            side_length,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Returns the expected file size for a RAW export.
pub fn expected_file_size(side_length: u32, format: RawFormat) -> u64 {
    let pixels = (side_length as u64) * (side_length as u64);
    match format {
        RawFormat::R16LittleEndian | RawFormat::R16BigEndian => pixels * 2,
        RawFormat::R32Float => pixels * 4,
    }
}
