use std::f64::consts::FRAC_PI_4;

use crate::{
    gps_utils::screen_angle,
    map_data::{graph::Graph, osm::OsmWay, rule::RestrictionKind, GraphError},
};

use super::turn::TurnLeg;

/// Maps `[lon, lat]` to screen pixels, y growing downwards.
pub trait Projection {
    fn project(&self, loc: [f64; 2]) -> (f64, f64);
}

/// Spherical Mercator with scale `k` and a pixel translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorViewport {
    pub k: f64,
    pub x: f64,
    pub y: f64,
}

impl MercatorViewport {
    pub fn new(k: f64) -> Self {
        Self { k, x: 0., y: 0. }
    }
}

impl Projection for MercatorViewport {
    fn project(&self, loc: [f64; 2]) -> (f64, f64) {
        let lambda = loc[0].to_radians();
        let phi = loc[1].to_radians();
        (
            lambda * self.k + self.x,
            self.y - (FRAC_PI_4 + phi / 2.).tan().ln() * self.k,
        )
    }
}

fn is_forward_one_way(way: &OsmWay) -> bool {
    way.tags.get("oneway").map_or(false, |one_way| one_way == "yes")
}

/// Guesses the `no_*` restriction a user most likely means for the turn
/// `from` -> `to`, from the angle between the two legs on screen.
pub fn infer_restriction<P: Projection>(
    graph: &Graph,
    from: &TurnLeg,
    to: &TurnLeg,
    projection: &P,
) -> Result<RestrictionKind, GraphError> {
    let point = |id: &str| -> Result<(f64, f64), GraphError> {
        Ok(projection.project(graph.node(id)?.loc()))
    };
    let from_angle = screen_angle(point(&from.vertex)?, point(&from.node)?);
    let to_angle = screen_angle(point(&to.vertex)?, point(&to.node)?);
    let angle = (from_angle - to_angle).to_degrees().rem_euclid(360.);

    if from.node == to.node {
        return Ok(RestrictionKind::NoUTurn);
    }

    let one_ways =
        is_forward_one_way(graph.way(&from.way)?) && is_forward_one_way(graph.way(&to.way)?);
    if one_ways && !(23. ..=336.).contains(&angle) {
        return Ok(RestrictionKind::NoUTurn);
    }
    // two oneways joined through a via way read as a u-turn at a wider angle
    if one_ways && from.vertex != to.vertex && !(40. ..=319.).contains(&angle) {
        return Ok(RestrictionKind::NoUTurn);
    }

    Ok(if angle < 158. {
        RestrictionKind::NoRightTurn
    } else if angle > 202. {
        RestrictionKind::NoLeftTurn
    } else {
        RestrictionKind::NoStraightOn
    })
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use crate::{
        map_data::osm::OsmEntity,
        test_utils::{node, way},
    };

    use super::*;

    const ONE_WAY: (&str, &str) = ("oneway", "yes");

    fn viewport() -> MercatorViewport {
        MercatorViewport::new(250. / PI)
    }

    fn leg(node: &str, way: &str, vertex: &str) -> TurnLeg {
        TurnLeg {
            node: node.to_string(),
            way: way.to_string(),
            vertex: vertex.to_string(),
        }
    }

    fn infer(graph: &Graph, from: TurnLeg, to: TurnLeg) -> RestrictionKind {
        infer_restriction(graph, &from, &to, &viewport()).unwrap()
    }

    #[test]
    fn projection_puts_north_up() {
        let (x, y) = viewport().project([0., 0.]);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
        let (_, north) = viewport().project([0., 10.]);
        assert!(north < 0.);
        let (east, _) = viewport().project([10., 0.]);
        assert!(east > 0.);
    }

    #[test]
    fn classifies_by_turn_angle() {
        //  u === * ~~~ w
        //        |
        //        x
        let graph = Graph::new([
            node("u", -1., 0.).into(),
            node("*", 0., 0.).into(),
            node("w", 1., 0.).into(),
            node("x", 0., -1.).into(),
            way("=", &["u", "*"], &[]).into(),
            way("-", &["*", "x"], &[]).into(),
            way("~", &["*", "w"], &[]).into(),
        ]);

        let cases = [
            (leg("u", "=", "*"), leg("x", "-", "*"), RestrictionKind::NoRightTurn),
            (leg("x", "-", "*"), leg("w", "~", "*"), RestrictionKind::NoRightTurn),
            (leg("x", "-", "*"), leg("u", "=", "*"), RestrictionKind::NoLeftTurn),
            (leg("w", "~", "*"), leg("x", "-", "*"), RestrictionKind::NoLeftTurn),
            (leg("u", "=", "*"), leg("w", "~", "*"), RestrictionKind::NoStraightOn),
            (leg("u", "=", "*"), leg("u", "=", "*"), RestrictionKind::NoUTurn),
        ];
        for (from, to, expected) in cases {
            let label = format!("{} -> {}", from.node, to.node);
            assert_eq!(infer(&graph, from, to), expected, "{label}");
        }
    }

    fn one_way_fork(spread: f64) -> Vec<OsmEntity> {
        //      *
        //     / \
        //    /   \
        //   u     x
        vec![
            node("u", 0., -spread).into(),
            node("*", 1., 0.).into(),
            node("x", 2., -spread).into(),
            way("w1", &["x", "*"], &[ONE_WAY]).into(),
            way("w2", &["*", "u"], &[ONE_WAY]).into(),
        ]
    }

    #[test]
    fn sharp_one_way_fork_is_a_u_turn() {
        // about 22.6 degrees between the legs
        let graph = Graph::new(one_way_fork(5.));
        assert_eq!(
            infer(&graph, leg("x", "w1", "*"), leg("u", "w2", "*")),
            RestrictionKind::NoUTurn
        );
    }

    #[test]
    fn wide_one_way_fork_is_a_left_turn() {
        // about 36.9 degrees between the legs
        let graph = Graph::new(one_way_fork(3.));
        assert_eq!(
            infer(&graph, leg("x", "w1", "*"), leg("u", "w2", "*")),
            RestrictionKind::NoLeftTurn
        );
    }

    fn one_way_fork_with_via(spread: f64) -> Vec<OsmEntity> {
        //      * -- +
        //     /      \
        //    /        \
        //   u          x
        vec![
            node("u", 0., -spread).into(),
            node("*", 1., 0.).into(),
            node("+", 2., 0.).into(),
            node("x", 3., -spread).into(),
            way("w1", &["x", "+"], &[ONE_WAY]).into(),
            way("w2", &["*", "u"], &[ONE_WAY]).into(),
            way("-", &["*", "+"], &[]).into(),
        ]
    }

    #[test]
    fn one_way_forks_joined_by_via_way_are_u_turns() {
        for spread in [5., 3.] {
            let graph = Graph::new(one_way_fork_with_via(spread));
            assert_eq!(
                infer(&graph, leg("x", "w1", "+"), leg("u", "w2", "*")),
                RestrictionKind::NoUTurn,
                "spread {spread}"
            );
        }
    }

    #[test]
    fn missing_node_is_an_error() {
        let graph = Graph::new(one_way_fork(5.));
        assert_eq!(
            infer_restriction(
                &graph,
                &leg("nope", "w1", "*"),
                &leg("u", "w2", "*"),
                &viewport()
            ),
            Err(GraphError::EntityNotFound {
                id: "nope".to_string()
            })
        );
    }
}
