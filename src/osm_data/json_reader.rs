use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
    time::Instant,
};

use serde::Deserialize;
use tracing::{debug, trace};

use crate::map_data::osm::{
    OsmEntity, OsmNode, OsmRelation, OsmRelationMember, OsmRelationMemberType, OsmWay, Tags,
};

use super::{node_id, relation_id, way_id, OsmDataReaderError};

fn default_visible() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct OverpassDocument {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OverpassElement {
    Node {
        id: i64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: Tags,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    Way {
        id: i64,
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: Tags,
        #[serde(default = "default_visible")]
        visible: bool,
    },
    Relation {
        id: i64,
        #[serde(default)]
        members: Vec<OverpassMember>,
        #[serde(default)]
        tags: Tags,
        #[serde(default = "default_visible")]
        visible: bool,
    },
}

#[derive(Debug, Deserialize)]
struct OverpassMember {
    #[serde(rename = "type")]
    member_type: OsmRelationMemberType,
    #[serde(rename = "ref")]
    member_ref: i64,
    #[serde(default)]
    role: String,
}

impl OverpassElement {
    fn into_entity(self) -> Option<OsmEntity> {
        match self {
            OverpassElement::Node {
                id,
                lat,
                lon,
                tags,
                visible,
            } => visible.then(|| {
                let mut node = OsmNode::new(node_id(id), lon, lat);
                node.tags = tags;
                node.into()
            }),
            OverpassElement::Way {
                id,
                nodes,
                tags,
                visible,
            } => visible.then(|| {
                let mut way = OsmWay::new(way_id(id), nodes.into_iter().map(node_id).collect());
                way.tags = tags;
                way.into()
            }),
            OverpassElement::Relation {
                id,
                members,
                tags,
                visible,
            } => visible.then(|| {
                OsmRelation {
                    id: relation_id(id),
                    members: members
                        .into_iter()
                        .map(|member| {
                            let member_ref = match member.member_type {
                                OsmRelationMemberType::Node => node_id(member.member_ref),
                                OsmRelationMemberType::Way => way_id(member.member_ref),
                                OsmRelationMemberType::Relation => relation_id(member.member_ref),
                            };
                            OsmRelationMember::new(member.member_type, member.role, member_ref)
                        })
                        .collect(),
                    tags,
                }
                .into()
            }),
        }
    }
}

/// Reads Overpass API JSON (`out body;` output) into entities.
pub struct JsonReader<'a> {
    file_name: &'a PathBuf,
}

impl<'a> JsonReader<'a> {
    pub fn new(file_name: &'a PathBuf) -> Self {
        Self { file_name }
    }

    pub fn read(self) -> Result<Vec<OsmEntity>, OsmDataReaderError> {
        let read_start = Instant::now();

        let file =
            File::open(self.file_name).map_err(|error| OsmDataReaderError::FileError { error })?;
        let entities = read_entities(BufReader::new(file))?;

        let read_duration = read_start.elapsed();
        trace!(
            entities = entities.len(),
            read_duration_secs = read_duration.as_secs(),
            "File read done"
        );

        Ok(entities)
    }
}

pub fn read_entities<R: Read>(reader: R) -> Result<Vec<OsmEntity>, OsmDataReaderError> {
    let document: OverpassDocument = serde_json::from_reader(reader)
        .map_err(|error| OsmDataReaderError::JsonParseError { error })?;

    let element_count = document.elements.len();
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut entities: Vec<OsmEntity> = Vec::with_capacity(element_count);
    for entity in document
        .elements
        .into_iter()
        .filter_map(OverpassElement::into_entity)
    {
        // a later copy of an element replaces the earlier one
        match seen.get(entity.id()) {
            Some(&index) => entities[index] = entity,
            None => {
                seen.insert(entity.id().clone(), entities.len());
                entities.push(entity);
            }
        }
    }

    if entities.len() < element_count {
        debug!(
            skipped = element_count - entities.len(),
            "dropped hidden or duplicate elements"
        );
    }
    Ok(entities)
}
