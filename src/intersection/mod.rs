use std::{collections::HashMap, time::Instant};

use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    config::IntersectionConfig,
    gps_utils::get_distance,
    map_data::{
        graph::Graph,
        osm::{EntityId, OsmEntity, OsmNode, OsmWay},
        GraphError,
    },
};

use self::{restriction::TurnRestriction, split::WayIdAllocator};

pub mod infer;
pub mod restriction;
mod split;
pub mod turn;

/// What a way can be used for when walking through the intersection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WayRoles {
    /// The first node is a key vertex.
    pub first: bool,
    /// The last node is a key vertex.
    pub last: bool,
    pub from: bool,
    pub via: bool,
    pub to: bool,
    pub one_way: bool,
}

impl WayRoles {
    pub fn new(way: &OsmWay, key_vertices: &[EntityId]) -> Self {
        let one_way = way.is_one_way();
        let first = way.first().map_or(false, |id| key_vertices.contains(id));
        let last = way.last().map_or(false, |id| key_vertices.contains(id));
        Self {
            first,
            last,
            from: (first && !one_way) || last,
            via: first && last,
            to: first || (last && !one_way),
            one_way,
        }
    }
}

/// The road network around one vertex, normalized for turn enumeration.
///
/// Holds its own small graph: only the routable ways found around the
/// vertex, their nodes and their valid restriction relations. In that graph
/// `oneway=-1` ways are stored forward and every way is split at the key
/// vertices, so each way touches the junction at its ends only.
#[derive(Debug, Clone)]
pub struct Intersection {
    graph: Graph,
    vertex_id: EntityId,
    vertices: Vec<EntityId>,
    ways: Vec<OsmWay>,
    roles: HashMap<EntityId, WayRoles>,
    restrictions: Vec<TurnRestriction>,
    max_distance: f64,
}

impl Intersection {
    pub fn new(graph: &Graph, vertex_id: &str, max_distance: f64) -> Result<Self, GraphError> {
        let config = IntersectionConfig {
            max_distance_m: Some(max_distance),
            ..IntersectionConfig::default()
        };
        Self::build(graph, vertex_id, &config)
    }

    #[tracing::instrument(skip(source, config))]
    pub fn build(
        source: &Graph,
        vertex_id: &str,
        config: &IntersectionConfig,
    ) -> Result<Self, GraphError> {
        let build_start = Instant::now();
        let max_distance = config.max_distance();

        let (vertices, way_ids) = collect(source, vertex_id, config, max_distance)?;
        trace!(
            vertices = vertices.len(),
            ways = way_ids.len(),
            "intersection search done"
        );

        let mut graph = reverse_one_ways(local_graph(source, &way_ids), &way_ids);

        let mut ids = WayIdAllocator::new(source);
        for vertex in &vertices {
            for way_id in split::splittable_ways(&graph, vertex) {
                graph = split::split_at_vertex(graph, &way_id, vertex, &mut ids)?;
            }
        }

        let mut way_ids: Vec<EntityId> = Vec::new();
        for vertex in &vertices {
            for way_id in graph.parent_way_ids(vertex) {
                push_unique(&mut way_ids, way_id);
            }
        }
        let mut roles = HashMap::new();
        for way_id in &way_ids {
            roles.insert(way_id.clone(), WayRoles::new(graph.way(way_id)?, &vertices));
        }

        let simplified = simplify(graph, &vertices, &mut roles)?;
        let graph = simplified.graph;
        let vertices: Vec<EntityId> = vertices
            .into_iter()
            .filter(|id| !simplified.removed_vertices.contains(id))
            .collect();
        let ways: Vec<OsmWay> = way_ids
            .iter()
            .filter(|id| !simplified.removed_ways.contains(id))
            .filter_map(|id| graph.has_entity(id).and_then(OsmEntity::as_way).cloned())
            .collect();
        roles.retain(|id, _| ways.iter().any(|way| &way.id == id));

        let restrictions = resolve_restrictions(&graph, &ways);

        debug!(
            vertices = vertices.len(),
            ways = ways.len(),
            restrictions = restrictions.len(),
            build_duration_ms = build_start.elapsed().as_millis() as u64,
            "intersection built"
        );

        Ok(Self {
            graph,
            vertex_id: vertex_id.to_string(),
            vertices,
            ways,
            roles,
            restrictions,
            max_distance,
        })
    }

    /// The local graph the intersection was normalized into.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn vertex_id(&self) -> &EntityId {
        &self.vertex_id
    }

    /// Key vertices, the starting vertex first.
    pub fn vertices(&self) -> &[EntityId] {
        &self.vertices
    }

    pub fn ways(&self) -> &[OsmWay] {
        &self.ways
    }

    pub fn roles(&self, way_id: &str) -> Option<WayRoles> {
        self.roles.get(way_id).copied()
    }

    pub fn restrictions(&self) -> &[TurnRestriction] {
        &self.restrictions
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn is_key_vertex(&self, node_id: &str) -> bool {
        self.vertices.iter().any(|id| id == node_id)
    }
}

fn is_road(way: &OsmWay, config: &IntersectionConfig) -> bool {
    way.highway()
        .map_or(false, |highway| config.is_routable_highway(highway))
        && !way.is_area()
        && !way.is_degenerate()
}

fn push_unique(ids: &mut Vec<EntityId>, id: &EntityId) {
    if !ids.contains(id) {
        ids.push(id.clone());
    }
}

fn unique_nodes<'a>(graph: &'a Graph, way: &OsmWay) -> Vec<&'a OsmNode> {
    let mut nodes: Vec<&OsmNode> = Vec::with_capacity(way.nodes.len());
    for node in way
        .nodes
        .iter()
        .filter_map(|id| graph.has_entity(id).and_then(OsmEntity::as_node))
    {
        if !nodes.iter().any(|seen| seen.id == node.id) {
            nodes.push(node);
        }
    }
    nodes
}

/// Walks outwards from the vertex. A node of a collected way becomes a key
/// vertex when another, not yet collected, road starts from it.
fn collect(
    source: &Graph,
    vertex_id: &str,
    config: &IntersectionConfig,
    max_distance: f64,
) -> Result<(Vec<EntityId>, Vec<EntityId>), GraphError> {
    let start = source.node(vertex_id)?;
    let mut vertices: Vec<EntityId> = Vec::new();
    let mut ways: Vec<EntityId> = Vec::new();
    let mut pending: Vec<EntityId> = vec![start.id.clone()];

    while let Some(current) = pending.pop() {
        let mut has_ways = false;
        for way in source.parent_ways(&current) {
            if !is_road(way, config) {
                continue;
            }
            push_unique(&mut ways, &way.id);
            has_ways = true;

            for node in unique_nodes(source, way) {
                if node.id == current || vertices.contains(&node.id) {
                    continue;
                }
                if get_distance(start, node) > max_distance {
                    continue;
                }
                let branches = source.parent_ways(&node.id).into_iter().any(|parent| {
                    parent.id != way.id && !ways.contains(&parent.id) && is_road(parent, config)
                });
                if branches {
                    pending.push(node.id.clone());
                }
            }
        }
        if has_ways {
            push_unique(&mut vertices, &current);
        }
    }

    Ok((vertices, ways))
}

fn local_graph(source: &Graph, way_ids: &[EntityId]) -> Graph {
    let mut graph = Graph::default();
    for way_id in way_ids {
        let Some(way) = source.has_entity(way_id).and_then(OsmEntity::as_way) else {
            continue;
        };
        for node_id in &way.nodes {
            if let Some(node) = source.has_entity(node_id).and_then(OsmEntity::as_node) {
                graph = graph.replace(node.clone());
            }
        }
        graph = graph.replace(way.clone());
        for relation in source.parent_relations(way_id) {
            if relation.is_restriction() && relation.is_valid_restriction() {
                graph = graph.replace(relation.clone());
            }
        }
    }
    graph
}

fn reverse_one_ways(mut graph: Graph, way_ids: &[EntityId]) -> Graph {
    for way_id in way_ids {
        let reversed = match graph.has_entity(way_id).and_then(OsmEntity::as_way) {
            Some(way) if way.is_reverse_one_way() => way.reversed_one_way(),
            _ => continue,
        };
        graph = graph.replace(reversed);
    }
    graph
}

struct Simplified {
    graph: Graph,
    removed_vertices: Vec<EntityId>,
    removed_ways: Vec<EntityId>,
}

/// Trims leaf ways hanging off vertices that only join two ways, until
/// nothing changes. A vertex left with fewer than two ways stops being a
/// key vertex.
fn simplify(
    mut graph: Graph,
    vertices: &[EntityId],
    roles: &mut HashMap<EntityId, WayRoles>,
) -> Result<Simplified, GraphError> {
    let mut check_ids = vertices.to_vec();
    let mut removed_vertices: Vec<EntityId> = Vec::new();
    let mut removed_ways: Vec<EntityId> = Vec::new();

    loop {
        let mut keep_going = false;

        for vertex_id in check_ids.clone() {
            if graph.has_entity(&vertex_id).is_none() {
                check_ids.retain(|id| id != &vertex_id);
                push_unique(&mut removed_vertices, &vertex_id);
                continue;
            }

            let parents = graph.parent_way_ids(&vertex_id).to_vec();
            if parents.len() < 3 {
                check_ids.retain(|id| id != &vertex_id);
            }

            if let [a, b] = parents.as_slice() {
                let is_leaf = |id: &EntityId| !roles.get(id).map_or(false, |roles| roles.via);
                let trim = match (is_leaf(a), is_leaf(b)) {
                    (true, false) => Some((a, b)),
                    (false, true) => Some((b, a)),
                    _ => None,
                };
                if let Some((leaf, survivor)) = trim {
                    let survivor_roles = WayRoles::new(graph.way(survivor)?, &check_ids);
                    roles.insert(survivor.clone(), survivor_roles);
                    graph = graph.remove(leaf);
                    push_unique(&mut removed_ways, leaf);
                    trace!(
                        vertex_id = %vertex_id,
                        leaf = %leaf,
                        survivor = %survivor,
                        "trimmed leaf way"
                    );
                    keep_going = true;
                }
            }

            let parent_count = graph.parent_way_ids(&vertex_id).len();
            if parent_count < 2 {
                check_ids.retain(|id| id != &vertex_id);
                push_unique(&mut removed_vertices, &vertex_id);
                keep_going = true;
            }
            if parent_count < 1 {
                graph = graph.remove(&vertex_id);
            }
        }

        if !keep_going {
            break;
        }
    }

    Ok(Simplified {
        graph,
        removed_vertices,
        removed_ways,
    })
}

fn resolve_restrictions(graph: &Graph, ways: &[OsmWay]) -> Vec<TurnRestriction> {
    let mut seen: Vec<EntityId> = Vec::new();
    let mut restrictions = Vec::new();
    for way in ways {
        for relation_id in graph.parent_relation_ids(&way.id) {
            if seen.contains(relation_id) {
                continue;
            }
            seen.push(relation_id.clone());
            let Ok(relation) = graph.relation(relation_id) else {
                continue;
            };
            match TurnRestriction::resolve(graph, relation) {
                Ok(restriction) => restrictions.push(restriction),
                Err(error) => {
                    debug!(relation_id = %relation_id, error = %error, "skipping restriction")
                }
            }
        }
    }
    restrictions
}
