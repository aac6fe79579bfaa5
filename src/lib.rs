//! Turn enumeration and turn restriction analysis around OpenStreetMap road
//! junctions, on top of a persistent, layered entity graph.

pub mod config;
pub mod gps_utils;
pub mod intersection;
pub mod map_data;
pub mod osm_data;
pub mod runner;
#[cfg(test)]
mod test_utils;
