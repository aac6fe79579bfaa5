use serde::Serialize;
use tracing::trace;

use crate::{
    gps_utils::get_distance,
    map_data::{
        graph::Graph,
        osm::{EntityId, OsmEntity, OsmWay},
        rule::RestrictionKind,
        GraphError,
    },
};

use super::{
    infer::{infer_restriction, Projection},
    restriction::{RestrictionMatch, TurnRestriction},
    Intersection,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnLeg {
    /// Node next to the vertex along the way, used for the turn angle.
    pub node: EntityId,
    pub way: EntityId,
    pub vertex: EntityId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnVia {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<EntityId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ways: Vec<EntityId>,
}

/// One way to leave the intersection after entering it on `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Ids along the path joined with `_`, e.g. `=_*_-`.
    pub key: String,
    pub from: TurnLeg,
    pub via: TurnVia,
    pub to: TurnLeg,
    pub u: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restriction_id: Option<EntityId>,
    /// The restriction starts on the `from` way of this turn.
    pub direct: bool,
    pub no: bool,
    pub only: bool,
}

impl Turn {
    pub fn infer_restriction<P: Projection>(
        &self,
        graph: &Graph,
        projection: &P,
    ) -> Result<RestrictionKind, GraphError> {
        infer_restriction(graph, &self.from, &self.to, projection)
    }
}

impl Intersection {
    /// Every turn reachable from `from_way_id` passing through at most
    /// `max_via_ways` ways, annotated with the restrictions that govern it.
    pub fn turns(&self, from_way_id: &str, max_via_ways: usize) -> Vec<Turn> {
        let Some(start) = self
            .graph()
            .has_entity(from_way_id)
            .and_then(OsmEntity::as_way)
        else {
            return Vec::new();
        };
        let Some(roles) = self.roles(from_way_id) else {
            return Vec::new();
        };
        if !roles.from && !roles.via {
            return Vec::new();
        }

        let mut walker = TurnWalker {
            intersection: self,
            start: &start.id,
            max_path_len: max_via_ways.saturating_mul(2).saturating_add(3),
            turns: Vec::new(),
        };
        walker.step_way(start, &[], &[], None);

        trace!(
            from_way_id = from_way_id,
            max_via_ways = max_via_ways,
            turns = walker.turns.len(),
            "turns enumerated"
        );
        walker.turns
    }
}

/// Depth first walk over alternating way and node ids.
struct TurnWalker<'a> {
    intersection: &'a Intersection,
    start: &'a str,
    max_path_len: usize,
    turns: Vec<Turn>,
}

impl<'a> TurnWalker<'a> {
    fn step_way(
        &mut self,
        way: &'a OsmWay,
        path: &[&'a str],
        restrictions: &[&'a TurnRestriction],
        matched: Option<RestrictionMatch<'a>>,
    ) {
        if path.len() >= self.max_path_len {
            return;
        }
        let mut path = path.to_vec();
        path.push(&way.id);

        if path.len() >= 3 {
            let mut turn_path = path.as_slice();
            if let Some(matched) = matched.filter(|matched| !matched.direct) {
                // indirect restrictions report the turn from their own `from` way
                if let Some(position) = path.iter().position(|id| *id == matched.from) {
                    turn_path = &path[position..];
                }
            }
            if let Some(turn) = self.path_to_turn(turn_path, matched) {
                self.turns.push(turn);
            }
            if path[0] == path[2] {
                return;
            }
        }
        if matched.map_or(false, |matched| matched.end) {
            return;
        }

        let intersection = self.intersection;
        let graph = intersection.graph();
        let Some(roles) = intersection.roles(&way.id) else {
            return;
        };
        if path.len() > 1 {
            if !roles.via {
                return;
            }
            let ends = way
                .first()
                .zip(way.last())
                .and_then(|(first, last)| graph.node(first).ok().zip(graph.node(last).ok()));
            let Some((first, last)) = ends else {
                return;
            };
            if get_distance(first, last) > intersection.max_distance() {
                return;
            }
        }

        let mut next_nodes: Vec<&'a str> = Vec::with_capacity(2);
        let candidates = [way.first().filter(|_| !roles.one_way), way.last()];
        for node_id in candidates.into_iter().flatten() {
            if intersection.is_key_vertex(node_id)
                && !path.contains(&node_id.as_str())
                && !next_nodes.contains(&node_id.as_str())
            {
                next_nodes.push(node_id);
            }
        }

        for next in next_nodes {
            let mut carried = restrictions.to_vec();
            carried.extend(
                graph
                    .parent_relation_ids(&way.id)
                    .iter()
                    .filter_map(|id| {
                        intersection
                            .restrictions()
                            .iter()
                            .find(|restriction| &restriction.id == id)
                    })
                    .filter(|restriction| {
                        restriction.from == way.id && restriction.leads_towards(next)
                    }),
            );
            self.step_node(next, &path, &carried);
        }
    }

    fn step_node(
        &mut self,
        node_id: &'a str,
        path: &[&'a str],
        restrictions: &[&'a TurnRestriction],
    ) {
        if path.len() >= self.max_path_len {
            return;
        }
        let mut path = path.to_vec();
        path.push(node_id);

        let intersection = self.intersection;
        let mut next_ways = Vec::new();
        for way in intersection.graph().parent_ways(node_id) {
            let Some(roles) = intersection.roles(&way.id) else {
                continue;
            };
            // oneways can only be entered at their first node
            if roles.one_way && way.first().map(String::as_str) != Some(node_id) {
                continue;
            }
            // no way twice, except for the u-turn back onto the start
            if path.len() >= 3 && path.contains(&way.id.as_str()) {
                continue;
            }

            let mut matched = None;
            for &restriction in restrictions {
                if let Some(found) = restriction.check(self.start, &path, &way.id, node_id) {
                    matched = Some(found);
                    if found.direct {
                        break;
                    }
                }
            }
            next_ways.push((way, matched));
        }

        for (way, matched) in next_ways {
            self.step_way(way, &path, restrictions, matched);
        }
    }

    fn path_to_turn(
        &self,
        path: &[&'a str],
        matched: Option<RestrictionMatch<'a>>,
    ) -> Option<Turn> {
        if path.len() < 3 {
            return None;
        }
        let graph = self.intersection.graph();
        let from_way = path[0];
        let to_way = path[path.len() - 1];

        let u = path.len() == 3 && from_way == to_way;
        let (from, via, to) = if u {
            if self.intersection.roles(from_way).map_or(false, |roles| roles.one_way) {
                return None;
            }
            let vertex = path[1];
            let node = adjacent_node(graph, from_way, vertex)?;
            let leg = TurnLeg {
                node: node.clone(),
                way: from_way.to_string(),
                vertex: vertex.to_string(),
            };
            let via = TurnVia {
                node: Some(vertex.to_string()),
                ways: Vec::new(),
            };
            (leg.clone(), via, leg)
        } else {
            let from_vertex = path[1];
            let to_vertex = path[path.len() - 2];
            let via = if path.len() == 3 {
                TurnVia {
                    node: Some(from_vertex.to_string()),
                    ways: Vec::new(),
                }
            } else {
                TurnVia {
                    node: None,
                    ways: path[2..path.len() - 2]
                        .iter()
                        .step_by(2)
                        .map(|id| id.to_string())
                        .collect(),
                }
            };
            let from = TurnLeg {
                node: adjacent_node(graph, from_way, from_vertex)?.clone(),
                way: from_way.to_string(),
                vertex: from_vertex.to_string(),
            };
            let to = TurnLeg {
                node: adjacent_node(graph, to_way, to_vertex)?.clone(),
                way: to_way.to_string(),
                vertex: to_vertex.to_string(),
            };
            (from, via, to)
        };

        Some(Turn {
            key: path.join("_"),
            from,
            via,
            to,
            u,
            restriction_id: matched.map(|matched| matched.id.to_string()),
            direct: matched.map_or(false, |matched| matched.direct),
            no: matched.map_or(false, |matched| matched.no),
            only: matched.map_or(false, |matched| matched.only),
        })
    }
}

/// The way's node right next to `vertex`, which is one of its ends.
fn adjacent_node<'g>(graph: &'g Graph, way_id: &str, vertex: &str) -> Option<&'g EntityId> {
    let nodes = &graph.way(way_id).ok()?.nodes;
    let adjacent = if nodes.first().map(String::as_str) == Some(vertex) {
        nodes.get(1)
    } else {
        nodes.len().checked_sub(2).and_then(|index| nodes.get(index))
    };
    adjacent.filter(|id| graph.has_entity(id).is_some())
}
