use std::{path::PathBuf, time::Instant};

use tracing::trace;

use crate::map_data::osm::{
    OsmEntity, OsmNode, OsmRelation, OsmRelationMember, OsmRelationMemberType, OsmWay, Tags,
};

use super::{node_id, relation_id, way_id, OsmDataReaderError};

fn tags(tags: &osmpbfreader::Tags) -> Tags {
    tags.iter()
        .map(|v| (v.0.to_string(), v.1.to_string()))
        .collect()
}

/// Reads highways and restriction relations, with everything they reference,
/// from an OSM PBF extract.
pub struct PbfReader<'a> {
    file_name: &'a PathBuf,
}

impl<'a> PbfReader<'a> {
    pub fn new(file_name: &'a PathBuf) -> Self {
        Self { file_name }
    }

    pub fn read(self) -> Result<Vec<OsmEntity>, OsmDataReaderError> {
        let read_start = Instant::now();

        let r = std::fs::File::open(self.file_name)
            .map_err(|error| OsmDataReaderError::PbfFileOpenError { error })?;
        let mut pbf = osmpbfreader::OsmPbfReader::new(r);

        let elements = pbf
            .get_objs_and_deps(|obj| {
                (obj.is_way() && obj.tags().iter().any(|t| t.0 == "highway"))
                    || (obj.is_relation()
                        && obj
                            .tags()
                            .iter()
                            .any(|t| t.0 == "type" && t.1.starts_with("restriction")))
            })
            .map_err(|error| OsmDataReaderError::PbfFileReadError { error })?;

        let mut entities: Vec<OsmEntity> = Vec::with_capacity(elements.len());
        for (_id, element) in elements {
            if element.is_node() {
                let node = element.node().ok_or(OsmDataReaderError::PbfFileError {
                    error: String::from("expected node, did not get it"),
                })?;
                let mut osm_node = OsmNode::new(node_id(node.id.0), node.lon(), node.lat());
                osm_node.tags = tags(&node.tags);
                entities.push(osm_node.into());
            } else if element.is_way() {
                let way = element.way().ok_or(OsmDataReaderError::PbfFileError {
                    error: String::from("expected way, did not get it"),
                })?;
                let mut osm_way = OsmWay::new(
                    way_id(way.id.0),
                    way.nodes.iter().map(|v| node_id(v.0)).collect(),
                );
                osm_way.tags = tags(&way.tags);
                entities.push(osm_way.into());
            } else if element.is_relation() {
                let relation = element.relation().ok_or(OsmDataReaderError::PbfFileError {
                    error: String::from("expected relation, did not get it"),
                })?;
                entities.push(
                    OsmRelation {
                        id: relation_id(relation.id.0),
                        members: relation
                            .refs
                            .iter()
                            .map(|v| {
                                let (member_type, member_ref) = match v.member {
                                    osmpbfreader::OsmId::Way(id) => {
                                        (OsmRelationMemberType::Way, way_id(id.0))
                                    }
                                    osmpbfreader::OsmId::Node(id) => {
                                        (OsmRelationMemberType::Node, node_id(id.0))
                                    }
                                    osmpbfreader::OsmId::Relation(id) => {
                                        (OsmRelationMemberType::Relation, relation_id(id.0))
                                    }
                                };
                                OsmRelationMember::new(member_type, v.role.as_str(), member_ref)
                            })
                            .collect(),
                        tags: tags(&relation.tags),
                    }
                    .into(),
                );
            }
        }

        let read_duration = read_start.elapsed();
        trace!(
            entities = entities.len(),
            read_duration_secs = read_duration.as_secs(),
            "File read done"
        );

        Ok(entities)
    }
}
