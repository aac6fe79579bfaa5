use geo::{Distance, Haversine, Point};

use crate::map_data::osm::OsmNode;

/// Great-circle distance in meters.
pub fn get_distance(from: &OsmNode, to: &OsmNode) -> f64 {
    Haversine::distance(Point::new(from.lon, from.lat), Point::new(to.lon, to.lat))
}

/// Angle of the vector `from -> to` in radians, measured in screen space (y grows downwards).
pub fn screen_angle(from: (f64, f64), to: (f64, f64)) -> f64 {
    (to.1 - from.1).atan2(to.0 - from.0)
}
