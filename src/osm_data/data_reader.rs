use std::time::Instant;

use tracing::info;

use crate::map_data::graph::Graph;

use super::{json_reader::JsonReader, pbf_reader::PbfReader, DataSource, OsmDataReaderError};

pub struct OsmDataReader {
    source: DataSource,
}

impl OsmDataReader {
    pub fn new(data_source: DataSource) -> Self {
        Self {
            source: data_source,
        }
    }

    /// Reads every entity of the source into the base layer of a new graph.
    #[tracing::instrument(skip(self))]
    pub fn read_data(self) -> Result<Graph, OsmDataReaderError> {
        let read_start = Instant::now();
        let entities = match self.source {
            DataSource::JsonFile { ref file } => JsonReader::new(file).read()?,
            DataSource::PbfFile { ref file } => PbfReader::new(file).read()?,
        };
        let entity_count = entities.len();
        let graph = Graph::new(entities);

        info!(
            entities = entity_count,
            read_duration_secs = read_start.elapsed().as_secs(),
            "map data loaded"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use super::*;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let mut file = std::env::temp_dir();
        file.push(format!("ridi-junction-{}-{name}", std::process::id()));
        fs::write(&file, contents).unwrap();
        file
    }

    #[test]
    fn reads_json_file_into_graph() {
        let file = temp_file(
            "reader.json",
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 0.0, "lon": 0.0},
                {"type": "node", "id": 2, "lat": 0.0, "lon": 1.0},
                {"type": "way", "id": 3, "nodes": [1, 2], "tags": {"highway": "residential"}}
            ]}"#,
        );
        let graph = OsmDataReader::new(DataSource::JsonFile { file: file.clone() })
            .read_data()
            .unwrap();
        fs::remove_file(file).unwrap();

        assert_eq!(graph.way("w3").unwrap().nodes, vec!["n1", "n2"]);
        assert_eq!(graph.parent_way_ids("n2"), ["w3"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = OsmDataReader::new(DataSource::JsonFile {
            file: PathBuf::from("/nonexistent/ridi-junction.json"),
        })
        .read_data();
        assert!(matches!(result, Err(OsmDataReaderError::FileError { .. })));
    }
}
