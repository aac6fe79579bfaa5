use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub type EntityId = String;
pub type Tags = HashMap<String, String>;

const UNINTERESTING_TAGS: [&str; 4] = ["attribution", "created_by", "odbl", "source"];

const AREA_KEYS: [&str; 12] = [
    "amenity",
    "area:highway",
    "building",
    "historic",
    "landuse",
    "leisure",
    "man_made",
    "natural",
    "parking",
    "place",
    "shop",
    "tourism",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OsmNode {
    pub id: EntityId,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: Tags,
}

impl OsmNode {
    pub fn new(id: impl Into<EntityId>, lon: f64, lat: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
            tags: Tags::new(),
        }
    }

    /// `[lon, lat]`, the order OSM tooling passes coordinates around in.
    pub fn loc(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    pub fn has_interesting_tags(&self) -> bool {
        self.tags.keys().any(|key| {
            !UNINTERESTING_TAGS.contains(&key.as_str())
                && !key.starts_with("source:")
                && !key.starts_with("tiger:")
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OsmWay {
    pub id: EntityId,
    pub nodes: Vec<EntityId>,
    #[serde(default)]
    pub tags: Tags,
}

impl OsmWay {
    pub fn new(id: impl Into<EntityId>, nodes: Vec<EntityId>) -> Self {
        Self {
            id: id.into(),
            nodes,
            tags: Tags::new(),
        }
    }

    pub fn first(&self) -> Option<&EntityId> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&EntityId> {
        self.nodes.last()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|id| id == node_id)
    }

    pub fn is_closed(&self) -> bool {
        self.nodes.len() > 2 && self.first() == self.last()
    }

    pub fn is_area(&self) -> bool {
        match self.tags.get("area").map(String::as_str) {
            Some("yes") => return true,
            Some("no") => return false,
            _ => {}
        }
        self.is_closed() && AREA_KEYS.iter().any(|key| self.tags.contains_key(*key))
    }

    /// Fewer distinct nodes than needed to draw the way: 2 for a line, 3 for an area.
    pub fn is_degenerate(&self) -> bool {
        let mut distinct: Vec<&EntityId> = Vec::with_capacity(self.nodes.len());
        for id in &self.nodes {
            if !distinct.contains(&id) {
                distinct.push(id);
            }
        }
        distinct.len() < if self.is_area() { 3 } else { 2 }
    }

    pub fn is_one_way(&self) -> bool {
        match self.tags.get("oneway").map(String::as_str) {
            Some("yes" | "1" | "true" | "-1") => true,
            Some("no") => false,
            _ => self.is_roundabout(),
        }
    }

    pub fn is_roundabout(&self) -> bool {
        self.tags
            .get("junction")
            .map_or(false, |junction| junction == "roundabout")
    }

    pub fn is_reverse_one_way(&self) -> bool {
        self.tags.get("oneway").map_or(false, |one_way| one_way == "-1")
    }

    /// Same way drawn forward: node order reversed and `oneway=-1` rewritten as `yes`.
    pub fn reversed_one_way(&self) -> Self {
        let mut way = self.clone();
        way.nodes.reverse();
        way.tags.insert("oneway".to_string(), "yes".to_string());
        way
    }

    pub fn highway(&self) -> Option<&str> {
        self.tags
            .get("highway")
            .map(String::as_str)
            .filter(|highway| !highway.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmRelationMemberType {
    Way,
    Node,
    Relation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OsmRelationMemberRole {
    From,
    To,
    Via,
    Other(String),
}

impl From<String> for OsmRelationMemberRole {
    fn from(role: String) -> Self {
        match role.as_str() {
            "from" => Self::From,
            "to" => Self::To,
            "via" => Self::Via,
            _ => Self::Other(role),
        }
    }
}

impl From<&str> for OsmRelationMemberRole {
    fn from(role: &str) -> Self {
        Self::from(role.to_string())
    }
}

impl From<OsmRelationMemberRole> for String {
    fn from(role: OsmRelationMemberRole) -> Self {
        match role {
            OsmRelationMemberRole::From => "from".to_string(),
            OsmRelationMemberRole::To => "to".to_string(),
            OsmRelationMemberRole::Via => "via".to_string(),
            OsmRelationMemberRole::Other(role) => role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmRelationMember {
    pub member_type: OsmRelationMemberType,
    pub role: OsmRelationMemberRole,
    pub member_ref: EntityId,
}

impl OsmRelationMember {
    pub fn new(
        member_type: OsmRelationMemberType,
        role: impl Into<OsmRelationMemberRole>,
        member_ref: impl Into<EntityId>,
    ) -> Self {
        Self {
            member_type,
            role: role.into(),
            member_ref: member_ref.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OsmRelation {
    pub id: EntityId,
    pub members: Vec<OsmRelationMember>,
    #[serde(default)]
    pub tags: Tags,
}

impl OsmRelation {
    pub fn is_restriction(&self) -> bool {
        self.tags
            .get("type")
            .map_or(false, |kind| kind.starts_with("restriction"))
    }

    pub fn is_multipolygon(&self) -> bool {
        self.tags
            .get("type")
            .map_or(false, |kind| kind == "multipolygon")
    }

    pub fn member_by_role(&self, role: &OsmRelationMemberRole) -> Option<&OsmRelationMember> {
        self.members.iter().find(|member| &member.role == role)
    }

    pub fn members_by_role(&self, role: &OsmRelationMemberRole) -> Vec<&OsmRelationMember> {
        self.members
            .iter()
            .filter(|member| &member.role == role)
            .collect()
    }

    /// Exactly one `from` way, one `to` way and at least one `via`; several vias must all be ways.
    pub fn is_valid_restriction(&self) -> bool {
        let from = self.members_by_role(&OsmRelationMemberRole::From);
        let to = self.members_by_role(&OsmRelationMemberRole::To);
        let via = self.members_by_role(&OsmRelationMemberRole::Via);

        if from.len() != 1 || from[0].member_type != OsmRelationMemberType::Way {
            return false;
        }
        if to.len() != 1 || to[0].member_type != OsmRelationMemberType::Way {
            return false;
        }
        match via.len() {
            0 => false,
            1 => via[0].member_type != OsmRelationMemberType::Relation,
            _ => via
                .iter()
                .all(|member| member.member_type == OsmRelationMemberType::Way),
        }
    }

    pub fn replace_member(&mut self, old_id: &str, new_id: &str) {
        for member in self.members.iter_mut() {
            if member.member_ref == old_id {
                member.member_ref = new_id.to_string();
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OsmEntity {
    Node(OsmNode),
    Way(OsmWay),
    Relation(OsmRelation),
}

impl OsmEntity {
    pub fn id(&self) -> &EntityId {
        match self {
            Self::Node(node) => &node.id,
            Self::Way(way) => &way.id,
            Self::Relation(relation) => &relation.id,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Self::Node(node) => &node.tags,
            Self::Way(way) => &way.tags,
            Self::Relation(relation) => &relation.tags,
        }
    }

    pub fn kind(&self) -> OsmRelationMemberType {
        match self {
            Self::Node(_) => OsmRelationMemberType::Node,
            Self::Way(_) => OsmRelationMemberType::Way,
            Self::Relation(_) => OsmRelationMemberType::Relation,
        }
    }

    pub fn as_node(&self) -> Option<&OsmNode> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_way(&self) -> Option<&OsmWay> {
        match self {
            Self::Way(way) => Some(way),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&OsmRelation> {
        match self {
            Self::Relation(relation) => Some(relation),
            _ => None,
        }
    }
}

impl From<OsmNode> for OsmEntity {
    fn from(node: OsmNode) -> Self {
        Self::Node(node)
    }
}

impl From<OsmWay> for OsmEntity {
    fn from(way: OsmWay) -> Self {
        Self::Way(way)
    }
}

impl From<OsmRelation> for OsmEntity {
    fn from(relation: OsmRelation) -> Self {
        Self::Relation(relation)
    }
}
