use std::sync::Arc;

use tracing::trace;

use super::{
    osm::{EntityId, OsmEntity, OsmNode, OsmRelation, OsmRelationMemberType, OsmWay},
    pmap::PersistentMap,
    GraphError,
};

type ParentIndex = PersistentMap<EntityId, Arc<Vec<EntityId>>>;

#[derive(Clone, Debug, Default)]
struct GraphLayer {
    /// `None` marks an entity deleted in this layer.
    entities: PersistentMap<EntityId, Option<Arc<OsmEntity>>>,
    parent_ways: ParentIndex,
    parent_relations: ParentIndex,
}

/// Immutable snapshot of map data.
///
/// A graph is a shared `base` layer (the data as loaded) plus a `local` layer
/// of edits. Every edit returns a new graph; the receiver is left untouched and
/// shares all unchanged structure with the result.
///
/// Parent lists keep insertion order and never hold duplicates, so anything
/// iterating them (turn enumeration included) is deterministic.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    base: Arc<GraphLayer>,
    local: GraphLayer,
}

impl Graph {
    /// Graph whose base layer holds `entities`. The first entity wins on duplicate ids.
    pub fn new(entities: impl IntoIterator<Item = OsmEntity>) -> Self {
        Graph::rebase(&[Graph::default()], entities, false)
            .pop()
            .unwrap_or_default()
    }

    pub fn has_entity(&self, id: &str) -> Option<&OsmEntity> {
        match self.local.entities.get(id) {
            Some(entity) => entity.as_deref(),
            None => self
                .base
                .entities
                .get(id)
                .and_then(|entity| entity.as_deref()),
        }
    }

    pub fn entity(&self, id: &str) -> Result<&OsmEntity, GraphError> {
        self.has_entity(id).ok_or_else(|| GraphError::EntityNotFound {
            id: id.to_string(),
        })
    }

    pub fn node(&self, id: &str) -> Result<&OsmNode, GraphError> {
        self.entity(id)?
            .as_node()
            .ok_or_else(|| GraphError::UnexpectedEntityType {
                id: id.to_string(),
                expected: OsmRelationMemberType::Node,
            })
    }

    pub fn way(&self, id: &str) -> Result<&OsmWay, GraphError> {
        self.entity(id)?
            .as_way()
            .ok_or_else(|| GraphError::UnexpectedEntityType {
                id: id.to_string(),
                expected: OsmRelationMemberType::Way,
            })
    }

    pub fn relation(&self, id: &str) -> Result<&OsmRelation, GraphError> {
        self.entity(id)?
            .as_relation()
            .ok_or_else(|| GraphError::UnexpectedEntityType {
                id: id.to_string(),
                expected: OsmRelationMemberType::Relation,
            })
    }

    /// Every visible entity, local edits first.
    pub fn iter(&self) -> impl Iterator<Item = &OsmEntity> + '_ {
        let local = self
            .local
            .entities
            .iter()
            .filter_map(|(_, entity)| entity.as_deref());
        let base = self
            .base
            .entities
            .iter()
            .filter(|(id, _)| !self.local.entities.contains_key(id.as_str()))
            .filter_map(|(_, entity)| entity.as_deref());
        local.chain(base)
    }

    pub fn parent_way_ids(&self, id: &str) -> &[EntityId] {
        self.local
            .parent_ways
            .get(id)
            .or_else(|| self.base.parent_ways.get(id))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_ways(&self, id: &str) -> Vec<&OsmWay> {
        self.parent_way_ids(id)
            .iter()
            .filter_map(|way_id| self.has_entity(way_id).and_then(OsmEntity::as_way))
            .collect()
    }

    pub fn parent_relation_ids(&self, id: &str) -> &[EntityId] {
        self.local
            .parent_relations
            .get(id)
            .or_else(|| self.base.parent_relations.get(id))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent_relations(&self, id: &str) -> Vec<&OsmRelation> {
        self.parent_relation_ids(id)
            .iter()
            .filter_map(|relation_id| {
                self.has_entity(relation_id)
                    .and_then(OsmEntity::as_relation)
            })
            .collect()
    }

    pub fn parent_multipolygons(&self, id: &str) -> Vec<&OsmRelation> {
        self.parent_relations(id)
            .into_iter()
            .filter(|relation| relation.is_multipolygon())
            .collect()
    }

    pub fn child_nodes(&self, way: &OsmWay) -> Result<Vec<&OsmNode>, GraphError> {
        way.nodes.iter().map(|id| self.node(id)).collect()
    }

    /// A tagged node that belongs to no way.
    pub fn is_poi(&self, entity: &OsmEntity) -> bool {
        entity.as_node().map_or(false, OsmNode::has_interesting_tags)
            && self.parent_way_ids(entity.id()).is_empty()
    }

    /// A node with several parent ways, or appearing twice in its only parent.
    pub fn is_shared(&self, entity: &OsmEntity) -> bool {
        if !matches!(entity, OsmEntity::Node(_)) {
            return false;
        }
        let parent_ids = self.parent_way_ids(entity.id());
        match parent_ids {
            [] => false,
            [parent_id] => {
                let Some(parent) = self.has_entity(parent_id).and_then(OsmEntity::as_way) else {
                    return false;
                };
                // the closing node of a loop is not a second connection
                let end = if parent.is_closed() {
                    parent.nodes.len() - 1
                } else {
                    parent.nodes.len()
                };
                parent.nodes[..end]
                    .iter()
                    .filter(|id| *id == entity.id())
                    .count()
                    > 1
            }
            _ => true,
        }
    }

    /// Graph holding only the base layer.
    pub fn base(&self) -> Graph {
        Graph {
            base: self.base.clone(),
            local: GraphLayer::default(),
        }
    }

    pub fn replace(&self, replacement: impl Into<OsmEntity>) -> Graph {
        let replacement = replacement.into();
        let current = self.entity_arc(replacement.id());
        if current.as_deref() == Some(&replacement) {
            return self.clone();
        }

        let mut graph = self.clone();
        graph.update_local(current.as_deref(), Some(&replacement));
        graph
            .local
            .entities
            .insert(replacement.id().clone(), Some(Arc::new(replacement)));
        graph
    }

    pub fn remove(&self, id: &str) -> Graph {
        let Some(current) = self.entity_arc(id) else {
            return self.clone();
        };

        let mut graph = self.clone();
        graph.update_local(Some(current.as_ref()), None);
        graph.local.entities.insert(id.to_string(), None);
        graph
    }

    /// Drops the local edit of `id`, bringing back the base version (or nothing).
    pub fn revert(&self, id: &str) -> Graph {
        let original = self.base.entities.get(id).cloned().flatten();
        let current = self.entity_arc(id);
        if original == current {
            return self.clone();
        }

        let mut graph = self.clone();
        graph.update_local(current.as_deref(), original.as_deref());
        graph.local.entities.remove(id);
        graph
    }

    /// Merges newly loaded `entities` into the base shared by `stack`.
    ///
    /// Returns the stack rebuilt on the new base, in the same order. Entities
    /// already in the base are skipped unless `force` is set. Local edits keep
    /// precedence; nodes deleted in the last graph of the stack but referenced
    /// by an incoming way are restored in every graph.
    pub fn rebase(
        stack: &[Graph],
        entities: impl IntoIterator<Item = OsmEntity>,
        force: bool,
    ) -> Vec<Graph> {
        let Some(head) = stack.last() else {
            return Vec::new();
        };

        let mut base = head.base.as_ref().clone();
        let mut restore_ids: Vec<EntityId> = Vec::new();
        let mut merged = 0usize;
        for entity in entities {
            let previous = base.entities.get(entity.id()).cloned().flatten();
            if previous.is_some() && !force {
                continue;
            }

            update_parents(&mut base, None, previous.as_deref(), Some(&entity));
            if let OsmEntity::Way(way) = &entity {
                for node_id in &way.nodes {
                    let deleted = matches!(head.local.entities.get(node_id), Some(None));
                    if deleted && !restore_ids.contains(node_id) {
                        restore_ids.push(node_id.clone());
                    }
                }
            }
            base.entities
                .insert(entity.id().clone(), Some(Arc::new(entity)));
            merged += 1;
        }
        trace!(merged, restored = restore_ids.len(), "rebase done");

        let base = Arc::new(base);
        stack
            .iter()
            .map(|graph| graph.rebased_onto(base.clone(), &restore_ids))
            .collect()
    }

    fn rebased_onto(&self, base: Arc<GraphLayer>, restore_ids: &[EntityId]) -> Graph {
        let mut local = self.local.clone();
        for id in restore_ids {
            if matches!(local.entities.get(id), Some(None)) {
                local.entities.remove(id);
            }
        }
        local.parent_ways =
            top_up_parents(&local.parent_ways, &base.parent_ways, &local);
        local.parent_relations =
            top_up_parents(&local.parent_relations, &base.parent_relations, &local);

        Graph { base, local }
    }

    fn entity_arc(&self, id: &str) -> Option<Arc<OsmEntity>> {
        match self.local.entities.get(id) {
            Some(entity) => entity.clone(),
            None => self.base.entities.get(id).cloned().flatten(),
        }
    }

    fn update_local(&mut self, previous: Option<&OsmEntity>, current: Option<&OsmEntity>) {
        update_parents(&mut self.local, Some(self.base.as_ref()), previous, current);
    }
}

/// Parent overrides held locally get every base parent that was not edited locally.
fn top_up_parents(
    local_index: &ParentIndex,
    base_index: &ParentIndex,
    local: &GraphLayer,
) -> ParentIndex {
    let mut index = local_index.clone();
    for (child_id, parent_ids) in local_index.iter() {
        let Some(base_ids) = base_index.get(child_id) else {
            continue;
        };
        let mut ids = parent_ids.as_ref().clone();
        for parent_id in base_ids.iter() {
            if !local.entities.contains_key(parent_id) && !ids.contains(parent_id) {
                ids.push(parent_id.clone());
            }
        }
        if ids.len() != parent_ids.len() {
            index.insert(child_id.clone(), Arc::new(ids));
        }
    }
    index
}

fn child_ids(entity: Option<&OsmEntity>) -> Vec<&EntityId> {
    match entity {
        Some(OsmEntity::Way(way)) => way.nodes.iter().collect(),
        Some(OsmEntity::Relation(relation)) => relation
            .members
            .iter()
            .map(|member| &member.member_ref)
            .collect(),
        _ => Vec::new(),
    }
}

/// Unique ids of `a` missing from `b`, in `a` order.
fn difference<'a>(a: &[&'a EntityId], b: &[&EntityId]) -> Vec<&'a EntityId> {
    let mut result: Vec<&EntityId> = Vec::new();
    for &id in a {
        if !b.contains(&id) && !result.contains(&id) {
            result.push(id);
        }
    }
    result
}

/// Applies the child diff between `previous` and `current` to the parent
/// index of `target`. Missing entries are seeded from `fallback`.
fn update_parents(
    target: &mut GraphLayer,
    fallback: Option<&GraphLayer>,
    previous: Option<&OsmEntity>,
    current: Option<&OsmEntity>,
) {
    let Some(entity) = current.or(previous) else {
        return;
    };
    let (index, fallback_index) = match entity {
        OsmEntity::Node(_) => return,
        OsmEntity::Way(_) => (
            &mut target.parent_ways,
            fallback.map(|layer| &layer.parent_ways),
        ),
        OsmEntity::Relation(_) => (
            &mut target.parent_relations,
            fallback.map(|layer| &layer.parent_relations),
        ),
    };

    let previous_ids = child_ids(previous);
    let current_ids = child_ids(current);
    for child_id in difference(&previous_ids, &current_ids) {
        patch_parents(index, fallback_index, child_id, entity.id(), false);
    }
    for child_id in difference(&current_ids, &previous_ids) {
        patch_parents(index, fallback_index, child_id, entity.id(), true);
    }
}

fn patch_parents(
    index: &mut ParentIndex,
    fallback: Option<&ParentIndex>,
    child_id: &EntityId,
    parent_id: &EntityId,
    add: bool,
) {
    let mut ids: Vec<EntityId> = index
        .get(child_id)
        .or_else(|| fallback.and_then(|fallback| fallback.get(child_id)))
        .map(|ids| ids.as_ref().clone())
        .unwrap_or_default();
    if add {
        if !ids.contains(parent_id) {
            ids.push(parent_id.clone());
        }
    } else {
        ids.retain(|id| id != parent_id);
    }
    index.insert(child_id.clone(), Arc::new(ids));
}

#[cfg(test)]
mod tests {
    use crate::{
        map_data::osm::OsmRelationMember,
        test_utils::{node, relation, way},
    };

    use super::*;

    fn ids(ways: Vec<&OsmWay>) -> Vec<&str> {
        ways.iter().map(|way| way.id.as_str()).collect()
    }

    #[test]
    fn entity_lookup() {
        let graph = Graph::new([node("n1", 0., 0.).into()]);
        assert!(graph.has_entity("n1").is_some());
        assert!(graph.has_entity("n2").is_none());
        assert_eq!(
            graph.entity("n2"),
            Err(GraphError::EntityNotFound {
                id: "n2".to_string()
            })
        );
        assert_eq!(
            graph.way("n1"),
            Err(GraphError::UnexpectedEntityType {
                id: "n1".to_string(),
                expected: OsmRelationMemberType::Way
            })
        );
    }

    #[test]
    fn replace_is_persistent() {
        let n1 = node("n1", 0., 0.);
        let graph = Graph::new([n1.clone().into()]);
        let moved = node("n1", 1., 1.);
        let edited = graph.replace(moved.clone());

        assert_eq!(graph.node("n1").unwrap(), &n1);
        assert_eq!(edited.node("n1").unwrap(), &moved);
        assert_eq!(edited.base().node("n1").unwrap(), &n1);
    }

    #[test]
    fn replace_updates_parent_ways() {
        let graph = Graph::new([
            node("n1", 0., 0.).into(),
            node("n2", 0., 1.).into(),
            node("n3", 0., 2.).into(),
            way("w1", &["n1", "n2"], &[]).into(),
        ]);
        assert_eq!(ids(graph.parent_ways("n1")), vec!["w1"]);

        let graph = graph
            .replace(way("w1", &["n2", "n3"], &[]))
            .replace(way("w2", &["n1", "n2"], &[]));
        assert_eq!(ids(graph.parent_ways("n1")), vec!["w2"]);
        assert_eq!(ids(graph.parent_ways("n2")), vec!["w1", "w2"]);
        assert_eq!(ids(graph.parent_ways("n3")), vec!["w1"]);
    }

    #[test]
    fn parent_ways_have_no_duplicates() {
        let graph = Graph::default()
            .replace(way("w1", &["n1", "n2", "n3", "n1"], &[]))
            .replace(way("w1", &["n1", "n2", "n3", "n1"], &[("highway", "residential")]));
        assert_eq!(graph.parent_way_ids("n1").to_vec(), vec!["w1".to_string()]);
    }

    #[test]
    fn remove_updates_parents_and_keeps_receiver() {
        let r1 = relation(
            "r1",
            &[("type", "multipolygon")],
            vec![OsmRelationMember::new(OsmRelationMemberType::Way, "outer", "w1")],
        );
        let graph = Graph::new([
            node("n1", 0., 0.).into(),
            node("n2", 0., 1.).into(),
            way("w1", &["n1", "n2"], &[]).into(),
            r1.into(),
        ]);
        assert_eq!(graph.parent_multipolygons("w1").len(), 1);

        let removed = graph.remove("w1").remove("r1");
        assert!(removed.has_entity("w1").is_none());
        assert!(removed.parent_ways("n1").is_empty());
        assert!(removed.parent_relations("w1").is_empty());
        assert!(graph.has_entity("w1").is_some());
        assert_eq!(ids(graph.parent_ways("n1")), vec!["w1"]);

        let same = graph.remove("missing");
        assert!(same.has_entity("w1").is_some());
    }

    #[test]
    fn revert_restores_base() {
        let graph = Graph::new([
            node("n1", 0., 0.).into(),
            node("n2", 0., 1.).into(),
            way("w1", &["n1", "n2"], &[]).into(),
        ]);
        let edited = graph.remove("w1").replace(way("w2", &["n2", "n1"], &[]));

        let reverted = edited.revert("w1").revert("w2");
        assert!(reverted.has_entity("w1").is_some());
        assert!(reverted.has_entity("w2").is_none());
        assert_eq!(ids(reverted.parent_ways("n1")), vec!["w1"]);
        assert_eq!(ids(reverted.parent_ways("n2")), vec!["w1"]);
    }

    #[test]
    fn child_nodes_fail_on_missing_node() {
        let graph = Graph::new([
            node("n1", 0., 0.).into(),
            way("w1", &["n1", "n2"], &[]).into(),
        ]);
        let w1 = graph.way("w1").unwrap();
        assert!(graph.child_nodes(w1).is_err());

        let graph = graph.replace(node("n2", 1., 1.));
        let w1 = graph.way("w1").unwrap();
        let nodes = graph.child_nodes(w1).unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn poi_and_shared() {
        let mut poi = node("p", 5., 5.);
        poi.tags.insert("amenity".to_string(), "cafe".to_string());
        let graph = Graph::new([
            node("a", 0., 0.).into(),
            node("b", 0., 1.).into(),
            node("c", 1., 1.).into(),
            poi.into(),
            node("q", 6., 6.).into(),
            way("loop", &["a", "b", "c", "a"], &[]).into(),
            way("figure", &["c", "b"], &[]).into(),
        ]);
        assert!(graph.is_poi(graph.entity("p").unwrap()));
        assert!(!graph.is_poi(graph.entity("a").unwrap()));
        // lone but untagged
        assert!(!graph.is_poi(graph.entity("q").unwrap()));
        assert!(!graph.is_shared(graph.entity("a").unwrap()));
        assert!(graph.is_shared(graph.entity("b").unwrap()));

        let graph = graph.replace(way("lasso", &["a", "b", "c", "b"], &[]));
        let graph = graph.remove("loop").remove("figure");
        assert!(graph.is_shared(graph.entity("b").unwrap()));
        assert!(!graph.is_shared(graph.entity("c").unwrap()));
    }

    #[test]
    fn iter_skips_deleted() {
        let graph = Graph::new([node("n1", 0., 0.).into(), node("n2", 0., 0.).into()])
            .remove("n1")
            .replace(node("n3", 0., 0.));
        let mut ids: Vec<&str> = graph.iter().map(|e| e.id().as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["n2", "n3"]);
    }

    #[test]
    fn rebase_preserves_and_adds() {
        let graph = Graph::new([node("n1", 0., 0.).into()]);
        let edited = graph.replace(node("n2", 0., 0.));
        let rebased = Graph::rebase(
            &[graph, edited],
            [node("n1", 9., 9.).into(), node("n3", 0., 0.).into()],
            false,
        );
        let edited = &rebased[1];

        assert_eq!(edited.node("n1").unwrap().lon, 0.);
        assert!(edited.has_entity("n2").is_some());
        assert!(edited.has_entity("n3").is_some());
        assert!(rebased[0].has_entity("n3").is_some());
        assert!(edited.base().has_entity("n3").is_some());
        assert!(edited.base().has_entity("n2").is_none());
    }

    #[test]
    fn rebase_force_overwrites_base() {
        let graph = Graph::new([node("n1", 0., 0.).into()]);
        let rebased = Graph::rebase(&[graph], [node("n1", 9., 9.).into()], true);
        assert_eq!(rebased[0].node("n1").unwrap().lon, 9.);
    }

    #[test]
    fn rebase_updates_parent_ways() {
        let graph = Graph::new([
            node("n", 0., 0.).into(),
            way("w1", &["n"], &[]).into(),
        ]);
        let edited = graph.replace(way("w2", &["n"], &[]));
        let rebased = Graph::rebase(
            &[graph, edited],
            [way("w3", &["n"], &[]).into(), way("w1", &["n"], &[]).into()],
            false,
        );

        assert_eq!(ids(rebased[0].parent_ways("n")), vec!["w1", "w3"]);
        assert_eq!(ids(rebased[1].parent_ways("n")), vec!["w1", "w2", "w3"]);
    }

    #[test]
    fn rebase_does_not_readd_edited_way() {
        let graph = Graph::new([
            node("n1", 0., 0.).into(),
            node("n2", 0., 0.).into(),
            way("w1", &["n1", "n2"], &[]).into(),
        ]);
        let edited = graph.replace(way("w1", &["n1"], &[]));
        let rebased = Graph::rebase(&[edited], [way("w2", &["n1"], &[]).into()], false);

        assert!(rebased[0].parent_ways("n2").is_empty());
        assert_eq!(ids(rebased[0].parent_ways("n1")), vec!["w1", "w2"]);

        let graph = Graph::new([
            node("n1", 0., 0.).into(),
            way("w1", &["n1"], &[]).into(),
        ]);
        let edited = graph.remove("w1");
        let rebased = Graph::rebase(&[edited], [way("w2", &["n1"], &[]).into()], false);
        assert_eq!(ids(rebased[0].parent_ways("n1")), vec!["w2"]);
    }

    #[test]
    fn rebase_restores_deleted_node_with_new_parent() {
        let graph = Graph::new([node("n", 0., 0.).into(), way("w1", &["n"], &[]).into()]);
        let edited = graph.remove("w1").remove("n");
        assert!(edited.has_entity("n").is_none());

        let rebased = Graph::rebase(
            &[graph, edited],
            [way("w2", &["n"], &[]).into()],
            false,
        );
        assert!(rebased[1].has_entity("n").is_some());
        assert_eq!(ids(rebased[1].parent_ways("n")), vec!["w2"]);
    }

    #[test]
    fn rebase_updates_parent_relations() {
        let member = |id: &str| OsmRelationMember::new(OsmRelationMemberType::Node, "", id);
        let graph = Graph::new([
            node("n", 0., 0.).into(),
            relation("r1", &[], vec![member("n")]).into(),
        ]);
        let edited = graph.replace(relation("r2", &[], vec![member("n")]));
        let rebased = Graph::rebase(
            &[graph, edited],
            [relation("r3", &[], vec![member("n")]).into()],
            false,
        );

        let relation_ids = |graph: &Graph| {
            graph
                .parent_relations("n")
                .iter()
                .map(|relation| relation.id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(relation_ids(&rebased[0]), vec!["r1", "r3"]);
        assert_eq!(relation_ids(&rebased[1]), vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn replace_relation_members_updates_parents() {
        let member =
            |role: &str, id: &str| OsmRelationMember::new(OsmRelationMemberType::Node, role, id);
        let graph = Graph::new([
            node("a", 0., 0.).into(),
            node("b", 1., 0.).into(),
            node("c", 2., 0.).into(),
            relation("r", &[], vec![member("from", "a"), member("via", "b")]).into(),
        ]);

        let moved = graph.replace(relation(
            "r",
            &[],
            vec![member("via", "b"), member("to", "c"), member("", "b")],
        ));
        assert!(moved.parent_relation_ids("a").is_empty());
        assert_eq!(moved.parent_relation_ids("b"), ["r"]);
        assert_eq!(moved.parent_relation_ids("c"), ["r"]);
        assert_eq!(graph.parent_relation_ids("a"), ["r"]);
        assert!(graph.parent_relation_ids("c").is_empty());

        let shrunk = moved.replace(relation("r", &[], vec![member("to", "c")]));
        assert!(shrunk.parent_relation_ids("b").is_empty());
        assert_eq!(shrunk.parent_relation_ids("c"), ["r"]);
        assert_eq!(moved.parent_relation_ids("b"), ["r"]);
    }
}
