use std::{
    f64::consts::PI,
    io::{self, Write},
    path::PathBuf,
    time::Instant,
};

use clap::{Parser, Subcommand};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::info;

use crate::{
    config::{ConfigError, IntersectionConfig},
    intersection::{
        infer::{infer_restriction, MercatorViewport},
        restriction::TurnRestriction,
        turn::{Turn, TurnLeg},
        Intersection, WayRoles,
    },
    map_data::{graph::Graph, osm::EntityId, rule::RestrictionKind, GraphError},
    osm_data::{data_reader::OsmDataReader, DataSource, OsmDataReaderError},
};

/// Zoom level 0 of a 256px web map tile.
const DEFAULT_SCALE: f64 = 256. / (2. * PI);

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Input file format not supported: {filename:?}")]
    InputFileFormatIncorrect { filename: PathBuf },

    #[error("Config error: {error}")]
    Config { error: ConfigError },

    #[error("Failed to read map data: {error}")]
    DataRead { error: OsmDataReaderError },

    #[error("Map data error: {error}")]
    Graph { error: GraphError },

    #[error("Failed to write result: {error}")]
    ResultWrite { error: serde_json::Error },

    #[error("Failed to write result: {error}")]
    Output { error: io::Error },
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log more; repeat for trace output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub mode: CliMode,
}

#[derive(Subcommand, Debug)]
pub enum CliMode {
    /// Key vertices, normalized ways and restrictions around a vertex
    Ways {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "ID")]
        vertex: String,

        #[arg(long, value_name = "METERS")]
        max_distance: Option<f64>,
    },
    /// Turns through the intersection around a vertex
    Turns {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "ID")]
        vertex: String,

        #[arg(long, value_name = "WAY", required_unless_present = "all")]
        from: Option<String>,

        /// Turns from every way of the intersection
        #[arg(long, conflicts_with = "from")]
        all: bool,

        #[arg(long, value_name = "N")]
        max_via_ways: Option<usize>,

        #[arg(long, value_name = "METERS")]
        max_distance: Option<f64>,
    },
    /// Restriction type suggested by the angle of a turn
    Infer {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        #[arg(long, value_name = "ID")]
        from_node: String,

        #[arg(long, value_name = "ID")]
        from_way: String,

        #[arg(long, value_name = "ID")]
        from_vertex: String,

        #[arg(long, value_name = "ID")]
        to_node: String,

        #[arg(long, value_name = "ID")]
        to_way: String,

        #[arg(long, value_name = "ID")]
        to_vertex: String,

        /// Mercator scale, pixels per radian
        #[arg(long, value_name = "K")]
        scale: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
struct WaySummary<'a> {
    id: &'a EntityId,
    nodes: &'a [EntityId],
    roles: Option<WayRoles>,
}

#[derive(Debug, Serialize)]
struct IntersectionSummary<'a> {
    vertex_id: &'a EntityId,
    vertices: &'a [EntityId],
    ways: Vec<WaySummary<'a>>,
    restrictions: &'a [TurnRestriction],
}

#[derive(Debug, Serialize)]
struct TurnsFrom {
    from: EntityId,
    turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct Inference {
    restriction: RestrictionKind,
}

pub fn get_data_source(input: PathBuf) -> Result<DataSource, RunnerError> {
    match input.extension().and_then(|extension| extension.to_str()) {
        Some("json") => Ok(DataSource::JsonFile { file: input }),
        Some("pbf") => Ok(DataSource::PbfFile { file: input }),
        _ => Err(RunnerError::InputFileFormatIncorrect { filename: input }),
    }
}

pub struct Runner {
    cli: Cli,
}

impl Runner {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub fn run(&self) -> Result<(), RunnerError> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.run_to(&mut out)
    }

    #[tracing::instrument(skip_all)]
    pub fn run_to<W: Write>(&self, out: &mut W) -> Result<(), RunnerError> {
        let mut config = IntersectionConfig::read(self.cli.config.clone())
            .map_err(|error| RunnerError::Config { error })?;

        match &self.cli.mode {
            CliMode::Ways {
                input,
                vertex,
                max_distance,
            } => {
                if max_distance.is_some() {
                    config.max_distance_m = *max_distance;
                }
                let graph = read_graph(input)?;
                let intersection = build(&graph, vertex, &config)?;
                write_result(out, &summarize(&intersection))
            }
            CliMode::Turns {
                input,
                vertex,
                from,
                all,
                max_via_ways,
                max_distance,
            } => {
                if max_distance.is_some() {
                    config.max_distance_m = *max_distance;
                }
                if let Some(max_via_ways) = max_via_ways {
                    config.max_via_ways = *max_via_ways;
                }
                let graph = read_graph(input)?;
                let intersection = build(&graph, vertex, &config)?;
                match from {
                    Some(from) if !*all => write_result(
                        out,
                        &intersection.turns(from, config.max_via_ways),
                    ),
                    _ => write_result(out, &all_turns(&intersection, config.max_via_ways)),
                }
            }
            CliMode::Infer {
                input,
                from_node,
                from_way,
                from_vertex,
                to_node,
                to_way,
                to_vertex,
                scale,
            } => {
                let graph = read_graph(input)?;
                let from = TurnLeg {
                    node: from_node.clone(),
                    way: from_way.clone(),
                    vertex: from_vertex.clone(),
                };
                let to = TurnLeg {
                    node: to_node.clone(),
                    way: to_way.clone(),
                    vertex: to_vertex.clone(),
                };
                let projection = MercatorViewport::new(scale.unwrap_or(DEFAULT_SCALE));
                let restriction = infer_restriction(&graph, &from, &to, &projection)
                    .map_err(|error| RunnerError::Graph { error })?;
                write_result(out, &Inference { restriction })
            }
        }
    }
}

fn read_graph(input: &PathBuf) -> Result<Graph, RunnerError> {
    let data_source = get_data_source(input.clone())?;
    OsmDataReader::new(data_source)
        .read_data()
        .map_err(|error| RunnerError::DataRead { error })
}

fn build(
    graph: &Graph,
    vertex: &str,
    config: &IntersectionConfig,
) -> Result<Intersection, RunnerError> {
    let build_start = Instant::now();
    let intersection = Intersection::build(graph, vertex, config)
        .map_err(|error| RunnerError::Graph { error })?;
    info!(
        vertex = vertex,
        vertices = intersection.vertices().len(),
        ways = intersection.ways().len(),
        build_duration_ms = build_start.elapsed().as_millis() as u64,
        "intersection ready"
    );
    Ok(intersection)
}

fn summarize(intersection: &Intersection) -> IntersectionSummary<'_> {
    IntersectionSummary {
        vertex_id: intersection.vertex_id(),
        vertices: intersection.vertices(),
        ways: intersection
            .ways()
            .iter()
            .map(|way| WaySummary {
                id: &way.id,
                nodes: &way.nodes,
                roles: intersection.roles(&way.id),
            })
            .collect(),
        restrictions: intersection.restrictions(),
    }
}

/// Turns from every way that traffic can leave the intersection's ways on.
fn all_turns(intersection: &Intersection, max_via_ways: usize) -> Vec<TurnsFrom> {
    let starts: Vec<&EntityId> = intersection
        .ways()
        .iter()
        .filter(|way| {
            intersection
                .roles(&way.id)
                .map_or(false, |roles| roles.from)
        })
        .map(|way| &way.id)
        .collect();

    starts
        .par_iter()
        .map(|from| TurnsFrom {
            from: from.to_string(),
            turns: intersection.turns(from, max_via_ways),
        })
        .collect()
}

fn write_result<W: Write, T: Serialize>(out: &mut W, result: &T) -> Result<(), RunnerError> {
    serde_json::to_writer_pretty(&mut *out, result)
        .map_err(|error| RunnerError::ResultWrite { error })?;
    writeln!(out).map_err(|error| RunnerError::Output { error })
}
