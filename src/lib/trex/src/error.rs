use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Place in the domain where an error was detected: an overland grid cell
/// or a channel node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    Cell { row: usize, col: usize },
    Node { link: usize, node: usize },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Cell { row, col } => write!(f, "row {} col {}", row, col),
            Location::Node { link, node } => write!(f, "link {} node {}", link, node),
        }
    }
}

/// Fatal simulation errors.  None of these are retried: either a step
/// completes cleanly or the run aborts after the diagnostic is written.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Input not openable or output not creatable.
    #[error("can't open {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An on-disk count disagrees with the configured count.
    #[error("{file}: {detail}")]
    ConfigMismatch { file: String, detail: String },

    /// Malformed time series, negative reference volumes, empty stacks, and
    /// other configuration problems caught before the time loop starts.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Push on a full stack with the collapse option disabled.
    #[error(
        "stack full at {location} (time = {simtime:.4} h): exceeded {max_stack} layers \
         with collapse disabled"
    )]
    StackFull {
        location: Location,
        simtime: f64,
        max_stack: usize,
    },

    /// Channel bank height went non-positive after a stack mutation.
    #[error(
        "channel geometry invalid at {location} (time = {simtime:.4} h): \
         bank height = {bank_height} m"
    )]
    GeometryInvalid {
        location: Location,
        simtime: f64,
        bank_height: f64,
    },

    /// Malformed content in a data file (bad number, truncated record).
    #[error("{path}: {detail}")]
    Parse { path: PathBuf, detail: String },
}

impl SimulationError {
    /// Process exit code reported when this error aborts the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimulationError::FileIo { .. } => 2,
            SimulationError::ConfigMismatch { .. } => 3,
            SimulationError::ConfigInvalid(_) => 4,
            SimulationError::Parse { .. } => 5,
            SimulationError::GeometryInvalid { .. } => 8,
            SimulationError::StackFull { .. } => 10,
        }
    }

    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SimulationError::FileIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
