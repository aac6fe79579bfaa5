use crate::{
    intersection::turn::Turn,
    map_data::osm::{
        OsmEntity, OsmNode, OsmRelation, OsmRelationMember, OsmRelationMemberRole,
        OsmRelationMemberType, OsmWay, Tags,
    },
};

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub fn node(id: &str, lon: f64, lat: f64) -> OsmNode {
    OsmNode::new(id, lon, lat)
}

pub fn way(id: &str, nodes: &[&str], pairs: &[(&str, &str)]) -> OsmWay {
    OsmWay {
        id: id.to_string(),
        nodes: nodes.iter().map(|id| id.to_string()).collect(),
        tags: tags(pairs),
    }
}

pub fn relation(id: &str, pairs: &[(&str, &str)], members: Vec<OsmRelationMember>) -> OsmRelation {
    OsmRelation {
        id: id.to_string(),
        members,
        tags: tags(pairs),
    }
}

/// `type=restriction` relation; `kind` goes into the `restriction` tag.
pub fn restriction(
    id: &str,
    kind: Option<&str>,
    from: &str,
    via: &[(OsmRelationMemberType, &str)],
    to: &str,
) -> OsmRelation {
    let mut members = vec![OsmRelationMember::new(
        OsmRelationMemberType::Way,
        OsmRelationMemberRole::From,
        from,
    )];
    members.extend(
        via.iter()
            .map(|(kind, id)| OsmRelationMember::new(*kind, OsmRelationMemberRole::Via, *id)),
    );
    members.push(OsmRelationMember::new(
        OsmRelationMemberType::Way,
        OsmRelationMemberRole::To,
        to,
    ));

    let mut pairs = vec![("type", "restriction")];
    if let Some(kind) = kind {
        pairs.push(("restriction", kind));
    }
    relation(id, &pairs, members)
}

pub fn turn_keys(turns: &[Turn]) -> Vec<&str> {
    turns.iter().map(|turn| turn.key.as_str()).collect()
}

const ROAD: (&str, &str) = ("highway", "residential");
const ONE_WAY: (&str, &str) = ("oneway", "yes");

pub fn get_test_dual_carriageway() -> Vec<OsmEntity> {
    // Oneways c-b-a and d-e-f crossed by the two way road g-b-e-h.
    //
    //           g
    //          /
    //  a <--- b <=== c
    //         |
    //  d ~~~> e ≈≈≈> f
    //          \
    //           h
    vec![
        node("a", 0., 1.).into(),
        node("b", 1., 1.).into(),
        node("c", 2., 1.).into(),
        node("d", 0., -1.).into(),
        node("e", 1., -1.).into(),
        node("f", 2., -1.).into(),
        node("g", 2., 2.).into(),
        node("h", 2., -2.).into(),
        way("-", &["b", "a"], &[ROAD, ONE_WAY]).into(),
        way("=", &["c", "b"], &[ROAD, ONE_WAY]).into(),
        way("~", &["d", "e"], &[ROAD, ONE_WAY]).into(),
        way("≈", &["e", "f"], &[ROAD, ONE_WAY]).into(),
        way("|", &["b", "e"], &[ROAD]).into(),
        way("/", &["b", "g"], &[ROAD]).into(),
        way("\\", &["e", "h"], &[ROAD]).into(),
    ]
}

pub fn get_test_dual_carriageway_with_spur() -> Vec<OsmEntity> {
    // The dual carriageway with g turned into a junction of its own.
    //
    //           j
    //           ‖
    //     i ≃≃≃ g
    //          /
    //  a <--- b <=== c
    //         |
    //  d ~~~> e ≈≈≈> f
    //          \
    //           h
    let mut entities = get_test_dual_carriageway();
    entities.extend([
        OsmEntity::from(node("i", 0., 2.)),
        OsmEntity::from(node("j", 2., 3.)),
        OsmEntity::from(way("≃", &["g", "i"], &[ROAD])),
        OsmEntity::from(way("‖", &["j", "g"], &[ROAD])),
    ]);
    entities
}

pub fn get_test_split_connector() -> Vec<OsmEntity> {
    // The connector between the carriageways passes through *.
    //
    //  a <--- b <=== c
    //         |
    //         *
    //         ‖
    //  d ~~~> e ≈≈≈> f
    vec![
        node("a", 0., 2.).into(),
        node("b", 1., 2.).into(),
        node("c", 2., 2.).into(),
        node("d", 0., 0.).into(),
        node("e", 1., 0.).into(),
        node("f", 2., 0.).into(),
        node("*", 1., 1.).into(),
        way("-", &["b", "a"], &[ROAD, ONE_WAY]).into(),
        way("=", &["c", "b"], &[ROAD, ONE_WAY]).into(),
        way("~", &["d", "e"], &[ROAD, ONE_WAY]).into(),
        way("≈", &["e", "f"], &[ROAD, ONE_WAY]).into(),
        way("|", &["b", "*"], &[ROAD]).into(),
        way("‖", &["*", "e"], &[ROAD]).into(),
    ]
}

pub fn get_test_triangle() -> Vec<OsmEntity> {
    // Two junctions b and c joined directly and around e.
    //
    //            e
    //           / \
    //          /   \
    //   a --- b === c ~~~ d
    vec![
        node("a", 0., 0.).into(),
        node("b", 1., 0.).into(),
        node("c", 3., 0.).into(),
        node("d", 4., 0.).into(),
        node("e", 2., 2.).into(),
        way("-", &["a", "b"], &[ROAD]).into(),
        way("=", &["b", "c"], &[ROAD]).into(),
        way("~", &["c", "d"], &[ROAD]).into(),
        way("/", &["b", "e"], &[ROAD]).into(),
        way("\\", &["e", "c"], &[ROAD]).into(),
    ]
}
