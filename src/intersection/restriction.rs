use serde::Serialize;

use crate::map_data::{
    graph::Graph,
    osm::{EntityId, OsmRelation, OsmRelationMemberRole, OsmRelationMemberType, OsmWay},
    rule::{MapDataRuleType, RestrictionKind},
    GraphError,
};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestrictionError {
    #[error("Relation {id} is not a valid turn restriction")]
    Invalid { id: EntityId },

    #[error("Relation {id} is missing its {role} member")]
    MissingMember { id: EntityId, role: String },

    #[error("Relation {id}: via node {via} is not shared by the from and to ways")]
    ViaNodeNotShared { id: EntityId, via: EntityId },

    #[error("Relation {id}: via ways do not connect the from and to ways")]
    ViaChainBroken { id: EntityId },

    #[error("Relation {id}: {error}")]
    Graph { id: EntityId, error: GraphError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionVia {
    Node(EntityId),
    /// Ordered from the `from` way towards the `to` way.
    Ways(Vec<EntityId>),
}

impl RestrictionVia {
    pub fn contains_way(&self, way_id: &str) -> bool {
        match self {
            RestrictionVia::Node(_) => false,
            RestrictionVia::Ways(ways) => ways.iter().any(|id| id == way_id),
        }
    }
}

/// How a restriction applies to the way being stepped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestrictionMatch<'a> {
    pub id: &'a str,
    pub from: &'a str,
    /// The restriction starts on the way the walk started from.
    pub direct: bool,
    pub no: bool,
    pub only: bool,
    /// The walk must not continue past this way.
    pub end: bool,
}

/// A restriction relation checked against the intersection's local graph,
/// with its via ways put in travel order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnRestriction {
    pub id: EntityId,
    pub restriction: Option<String>,
    pub rule_type: MapDataRuleType,
    pub from: EntityId,
    pub via: RestrictionVia,
    pub to: EntityId,
    /// Node of the `from` way where the restricted movement begins.
    pub entry_node: EntityId,
}

impl TurnRestriction {
    pub fn resolve(graph: &Graph, relation: &OsmRelation) -> Result<Self, RestrictionError> {
        let id = relation.id.clone();
        if !relation.is_restriction() || !relation.is_valid_restriction() {
            return Err(RestrictionError::Invalid { id });
        }

        let from = member_way(graph, relation, OsmRelationMemberRole::From)?;
        let to = member_way(graph, relation, OsmRelationMemberRole::To)?;
        let via = relation.members_by_role(&OsmRelationMemberRole::Via);

        let (via, entry_node) = match via.as_slice() {
            [member] if member.member_type == OsmRelationMemberType::Node => {
                if !from.contains(&member.member_ref) || !to.contains(&member.member_ref) {
                    return Err(RestrictionError::ViaNodeNotShared {
                        id,
                        via: member.member_ref.clone(),
                    });
                }
                (
                    RestrictionVia::Node(member.member_ref.clone()),
                    member.member_ref.clone(),
                )
            }
            members => {
                let via_ways = members
                    .iter()
                    .map(|member| way(graph, &id, &member.member_ref, OsmRelationMemberRole::Via))
                    .collect::<Result<Vec<_>, _>>()?;
                let (entry_node, chain) = order_via_ways(from, &via_ways, to)
                    .ok_or_else(|| RestrictionError::ViaChainBroken { id: id.clone() })?;
                (RestrictionVia::Ways(chain), entry_node)
            }
        };

        Ok(Self {
            restriction: restriction_value(relation),
            rule_type: MapDataRuleType::from_restriction(restriction_value(relation).as_deref()),
            from: from.id.clone(),
            to: to.id.clone(),
            via,
            entry_node,
            id,
        })
    }

    pub fn kind(&self) -> Option<RestrictionKind> {
        self.restriction.as_deref()?.parse().ok()
    }

    pub fn is_only(&self) -> bool {
        self.rule_type == MapDataRuleType::OnlyAllowed
    }

    /// `only_*` restrictions bind a single direction of travel along the `from` way.
    pub fn leads_towards(&self, node_id: &str) -> bool {
        !self.is_only() || self.entry_node == node_id
    }

    /// Checks the restriction against stepping from `node_id` onto `way_id`.
    ///
    /// `path` alternates way and node ids, starting with the `start` way and
    /// ending with `node_id`.
    pub fn check(
        &self,
        start: &str,
        path: &[&str],
        way_id: &str,
        node_id: &str,
    ) -> Option<RestrictionMatch<'_>> {
        let only = self.is_only();
        let matched = |direct, no, only, end| RestrictionMatch {
            id: &self.id,
            from: &self.from,
            direct,
            no,
            only,
            end,
        };

        if self.to == way_id {
            let matches_via = match &self.via {
                RestrictionVia::Node(via) => {
                    via == node_id
                        && path.len() >= 2
                        && path[path.len() - 2] == self.from
                }
                RestrictionVia::Ways(chain) => {
                    path.iter().position(|id| *id == self.from).map_or(false, |pos| {
                        path.iter()
                            .skip(pos + 2)
                            .step_by(2)
                            .copied()
                            .eq(chain.iter().map(String::as_str))
                    })
                }
            };
            if matches_via {
                return Some(matched(self.from == start, !only, only, true));
            }
        } else if only && self.via.contains_way(way_id) {
            return Some(matched(false, false, true, false));
        }

        only.then(|| matched(false, true, false, true))
    }
}

fn restriction_value(relation: &OsmRelation) -> Option<String> {
    relation.tags.get("restriction").cloned().or_else(|| {
        // `type=restriction:hgv` carries its value in `restriction:hgv`
        let key = relation.tags.get("type")?;
        relation.tags.get(key).cloned()
    })
}

fn member_way<'a>(
    graph: &'a Graph,
    relation: &OsmRelation,
    role: OsmRelationMemberRole,
) -> Result<&'a OsmWay, RestrictionError> {
    let member = relation
        .member_by_role(&role)
        .ok_or_else(|| RestrictionError::MissingMember {
            id: relation.id.clone(),
            role: String::from(role.clone()),
        })?;
    way(graph, &relation.id, &member.member_ref, role)
}

fn way<'a>(
    graph: &'a Graph,
    relation_id: &str,
    way_id: &str,
    role: OsmRelationMemberRole,
) -> Result<&'a OsmWay, RestrictionError> {
    graph.way(way_id).map_err(|error| match error {
        GraphError::EntityNotFound { .. } => RestrictionError::MissingMember {
            id: relation_id.to_string(),
            role: String::from(role),
        },
        error => RestrictionError::Graph {
            id: relation_id.to_string(),
            error,
        },
    })
}

/// Puts the via ways in travel order: starting at an end of `from`, each way
/// continues from the end of the previous one and the last touches `to`.
/// Returns the `from` node the chain starts at together with the ordered ids.
fn order_via_ways(
    from: &OsmWay,
    via_ways: &[&OsmWay],
    to: &OsmWay,
) -> Option<(EntityId, Vec<EntityId>)> {
    fn extend(
        current: &EntityId,
        via_ways: &[&OsmWay],
        to: &OsmWay,
        chain: &mut Vec<usize>,
    ) -> bool {
        if chain.len() == via_ways.len() {
            return to.first() == Some(current) || to.last() == Some(current);
        }
        for (index, way) in via_ways.iter().enumerate() {
            if chain.contains(&index) {
                continue;
            }
            let next = if way.first() == Some(current) {
                way.last()
            } else if way.last() == Some(current) {
                way.first()
            } else {
                None
            };
            let Some(next) = next else {
                continue;
            };
            chain.push(index);
            if extend(next, via_ways, to, chain) {
                return true;
            }
            chain.pop();
        }
        false
    }

    let mut starts: Vec<&EntityId> = from.first().into_iter().collect();
    if let Some(last) = from.last() {
        if !starts.contains(&last) {
            starts.push(last);
        }
    }

    for start in starts {
        let mut chain = Vec::with_capacity(via_ways.len());
        if extend(start, via_ways, to, &mut chain) {
            let ids = chain.into_iter().map(|index| via_ways[index].id.clone()).collect();
            return Some((start.clone(), ids));
        }
    }
    None
}
