use crate::{
    gps_utils::get_distance,
    map_data::{
        graph::Graph,
        osm::{
            EntityId, OsmEntity, OsmRelation, OsmRelationMember, OsmRelationMemberRole,
            OsmRelationMemberType, OsmWay,
        },
        GraphError,
    },
};

/// Hands out `w-<n>` ids for ways created while splitting. Lives for one
/// intersection build, so ids are stable across builds of the same data.
pub struct WayIdAllocator<'a> {
    source: &'a Graph,
    next: u64,
}

impl<'a> WayIdAllocator<'a> {
    pub fn new(source: &'a Graph) -> Self {
        Self { source, next: 1 }
    }

    pub fn next_id(&mut self, local: &Graph) -> EntityId {
        loop {
            let id = format!("w-{}", self.next);
            self.next += 1;
            if self.source.has_entity(&id).is_none() && local.has_entity(&id).is_none() {
                return id;
            }
        }
    }
}

fn needs_split(way: &OsmWay, vertex_id: &str) -> bool {
    if way.is_closed() {
        return way.contains(vertex_id);
    }
    way.nodes.len() > 2 && way.nodes[1..way.nodes.len() - 1].iter().any(|id| id == vertex_id)
}

/// Parent ways of the vertex that pass through it or loop back onto themselves.
pub fn splittable_ways(graph: &Graph, vertex_id: &str) -> Vec<EntityId> {
    graph
        .parent_ways(vertex_id)
        .into_iter()
        .filter(|way| needs_split(way, vertex_id))
        .map(|way| way.id.clone())
        .collect()
}

/// Splits the way at the vertex, then keeps splitting the parts for as long
/// as the vertex is still inside one of them.
pub fn split_at_vertex(
    mut graph: Graph,
    way_id: &str,
    vertex_id: &str,
    ids: &mut WayIdAllocator,
) -> Result<Graph, GraphError> {
    // each split shortens a part, so twice the node count covers every re-check
    let mut budget = graph.way(way_id)?.nodes.len() * 2;
    let mut pending = vec![way_id.to_string()];

    while let Some(current) = pending.pop() {
        if budget == 0 {
            break;
        }
        budget -= 1;

        if let Some((next, new_id)) = split_way(&graph, &current, vertex_id, ids)? {
            graph = next;
            pending.push(new_id);
            pending.push(current);
        }
    }
    Ok(graph)
}

/// The first part keeps the way id, the second gets a new one.
fn split_way(
    graph: &Graph,
    way_id: &str,
    vertex_id: &str,
    ids: &mut WayIdAllocator,
) -> Result<Option<(Graph, EntityId)>, GraphError> {
    let way = graph.way(way_id)?;
    if !needs_split(way, vertex_id) {
        return Ok(None);
    }
    let Some((nodes_a, nodes_b)) = split_nodes(graph, way, vertex_id) else {
        return Ok(None);
    };

    let way_a = OsmWay {
        nodes: nodes_a,
        ..way.clone()
    };
    let way_b = OsmWay {
        id: ids.next_id(graph),
        nodes: nodes_b,
        tags: way.tags.clone(),
    };

    let mut graph = graph.replace(way_a.clone()).replace(way_b.clone());
    for relation_id in graph.parent_relation_ids(way_id).to_vec() {
        let updated = match graph.relation(&relation_id) {
            Ok(relation) if relation.is_restriction() => {
                update_restriction(&graph, relation, &way_a, &way_b)
            }
            _ => None,
        };
        if let Some(relation) = updated {
            graph = graph.replace(relation);
        }
    }

    Ok(Some((graph, way_b.id)))
}

fn split_nodes(
    graph: &Graph,
    way: &OsmWay,
    vertex_id: &str,
) -> Option<(Vec<EntityId>, Vec<EntityId>)> {
    if way.is_closed() {
        let nodes = &way.nodes[..way.nodes.len() - 1];
        if nodes.len() < 2 {
            return None;
        }
        let idx_a = nodes.iter().position(|id| id == vertex_id)?;
        let idx_b = opposite_index(graph, nodes, idx_a);
        if idx_b < idx_a {
            Some((
                [&nodes[idx_a..], &nodes[..=idx_b]].concat(),
                nodes[idx_b..=idx_a].to_vec(),
            ))
        } else {
            Some((
                nodes[idx_a..=idx_b].to_vec(),
                [&nodes[idx_b..], &nodes[..=idx_a]].concat(),
            ))
        }
    } else {
        let idx = way.nodes.iter().skip(1).position(|id| id == vertex_id)? + 1;
        if idx + 1 >= way.nodes.len() {
            return None;
        }
        Some((way.nodes[..=idx].to_vec(), way.nodes[idx..].to_vec()))
    }
}

/// Index of the ring node "across" from `idx_a`: the one with the largest
/// ratio of distance around the ring to straight-line distance.
fn opposite_index(graph: &Graph, nodes: &[EntityId], idx_a: usize) -> usize {
    let len = nodes.len();
    let distance = |a: &str, b: &str| match (graph.node(a), graph.node(b)) {
        (Ok(a), Ok(b)) => get_distance(a, b),
        _ => 0.,
    };

    let mut lengths = vec![0.; len];
    let mut length = 0.;
    for step in 1..len {
        let i = (idx_a + step) % len;
        length += distance(&nodes[i], &nodes[(i + len - 1) % len]);
        lengths[i] = length;
    }
    length = 0.;
    for step in 1..len {
        let i = (idx_a + len - step) % len;
        length += distance(&nodes[i], &nodes[(i + 1) % len]);
        if length < lengths[i] {
            lengths[i] = length;
        }
    }

    let mut best = 0.;
    let mut idx_b = (idx_a + len / 2) % len;
    for (i, node_id) in nodes.iter().enumerate() {
        if i == idx_a {
            continue;
        }
        // coincident nodes would divide by zero
        let direct = distance(&nodes[idx_a], node_id);
        if direct <= 0. {
            continue;
        }
        let cost = lengths[i] / direct;
        if cost > best {
            best = cost;
            idx_b = i;
        }
    }
    idx_b
}

/// Keeps a restriction pointing at the right part of a split way. A split
/// `from`/`to` member follows the part still touching the via; a split via
/// way gets the new part added right after it.
fn update_restriction(
    graph: &Graph,
    relation: &OsmRelation,
    way_a: &OsmWay,
    way_b: &OsmWay,
) -> Option<OsmRelation> {
    let from = relation.member_by_role(&OsmRelationMemberRole::From)?;
    let to = relation.member_by_role(&OsmRelationMemberRole::To)?;
    let via = relation.members_by_role(&OsmRelationMemberRole::Via);
    if via.is_empty() {
        return None;
    }

    if from.member_ref == way_a.id || to.member_ref == way_a.id {
        let keep_b = match via.as_slice() {
            [via] if via.member_type == OsmRelationMemberType::Node => {
                way_b.contains(&via.member_ref)
            }
            _ => via
                .iter()
                .filter(|member| member.member_type == OsmRelationMemberType::Way)
                .filter_map(|member| graph.has_entity(&member.member_ref))
                .filter_map(OsmEntity::as_way)
                .any(|via_way| via_way.nodes.iter().any(|id| way_b.contains(id))),
        };
        if !keep_b {
            return None;
        }
        let mut relation = relation.clone();
        relation.replace_member(&way_a.id, &way_b.id);
        return Some(relation);
    }

    let index = relation.members.iter().position(|member| {
        member.role == OsmRelationMemberRole::Via
            && member.member_type == OsmRelationMemberType::Way
            && member.member_ref == way_a.id
    })?;
    let mut relation = relation.clone();
    relation.members.insert(
        index + 1,
        OsmRelationMember::new(
            OsmRelationMemberType::Way,
            OsmRelationMemberRole::Via,
            way_b.id.clone(),
        ),
    );
    Some(relation)
}
