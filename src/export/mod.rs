//! RAW import and export of simulation fields.

mod raw;

pub use raw::{
    expected_file_size, export_field_raw, export_snapshot_raw, field_range, import_heightmap_r32, RawFormat,
    RawIoError,
};
