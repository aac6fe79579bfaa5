use self::osm::{EntityId, OsmRelationMemberType};

pub mod graph;
pub mod osm;
pub mod pmap;
pub mod rule;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("Entity not found: {id}")]
    EntityNotFound { id: EntityId },

    #[error("Entity {id} is not a {expected:?}")]
    UnexpectedEntityType {
        id: EntityId,
        expected: OsmRelationMemberType,
    },
}
