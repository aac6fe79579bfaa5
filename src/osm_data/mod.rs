use std::{io, path::PathBuf};

pub mod data_reader;
pub mod json_reader;
pub mod pbf_reader;

#[derive(Debug, thiserror::Error)]
pub enum OsmDataReaderError {
    #[error("File error: {error}")]
    FileError { error: io::Error },

    #[error("Failed to parse OSM JSON: {error}")]
    JsonParseError { error: serde_json::Error },

    #[error("Failed to open PBF file: {error}")]
    PbfFileOpenError { error: io::Error },

    #[error("Failed to read PBF file: {error}")]
    PbfFileReadError { error: osmpbfreader::Error },

    #[error("PBF file error: {error}")]
    PbfFileError { error: String },
}

#[derive(Debug, PartialEq, Clone)]
pub enum DataSource {
    JsonFile { file: PathBuf },
    PbfFile { file: PathBuf },
}

pub fn node_id(id: i64) -> String {
    format!("n{id}")
}

pub fn way_id(id: i64) -> String {
    format!("w{id}")
}

pub fn relation_id(id: i64) -> String {
    format!("r{id}")
}
