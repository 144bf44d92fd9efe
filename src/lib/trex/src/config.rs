use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::chem::{ChemicalProperties, SoilProperties, SolidsProperties, YieldEntry};
use crate::error::{Result, SimulationError};
use crate::grid::{GridGeometry, MaskValue};
use crate::stack::StackOptions;
use crate::store::{CellClimate, MediumState};
use crate::transport::{LoadTarget, LoadUnits};

/// Raster domain configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    pub nrows: usize,
    pub ncols: usize,
    /// Cell edge length w [m]
    pub cell_size: f64,
    pub xllcorner: f64,
    pub yllcorner: f64,
    pub nodata_value: i32,
    /// Mask values row-major: 0 = outside, 1 = overland, 2 = channel
    pub mask: Vec<Vec<i8>>,
    /// Ground surface elevation [m]
    pub elevation: SpatialConfig,
}

/// A spatially distributed scalar in configuration form.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpatialConfig {
    Uniform(f64),
    Grid(Vec<Vec<f64>>),
}

impl SpatialConfig {
    pub fn at(&self, row: usize, col: usize) -> f64 {
        match self {
            SpatialConfig::Uniform(v) => *v,
            SpatialConfig::Grid(g) => g[row][col],
        }
    }
}

/// Time-step schedule: `dt_seconds` applies until `until_hours`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DtBreak {
    pub until_hours: f64,
    pub dt_seconds: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeConfig {
    pub end_time_hours: f64,
    pub schedule: Vec<DtBreak>,
}

/// Soil/sediment stack sizing and mutation options.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StackConfig {
    pub max_stack: usize,
    pub collapse_enabled: bool,
    /// Pop trigger as a fraction of the reference layer volume
    pub min_fraction: f64,
    /// Push trigger as a fraction of the reference layer volume
    pub max_fraction: f64,
}

impl StackConfig {
    pub fn options(&self) -> StackOptions {
        StackOptions {
            collapse_enabled: self.collapse_enabled,
            min_fraction: self.min_fraction,
            max_fraction: self.max_fraction,
        }
    }
}

/// Initial state of one stack layer, listed bottom-up.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerInit {
    /// Layer thickness [m]
    pub thickness: f64,
    pub soil_type: usize,
    /// Solids concentration per class [g/m³ bulk]
    pub csed: Vec<f64>,
    /// Chemical concentration per chemical [g/m³ bulk]
    pub cchem: Vec<f64>,
}

/// Overland compartment initial conditions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OverlandConfig {
    /// Initial water depth [m]
    pub initial_depth: f64,
    /// Initial suspended solids [g/m³]
    pub initial_csed: Vec<f64>,
    /// Initial water-column chemicals [g/m³]
    pub initial_cchem: Vec<f64>,
    /// Soil stack layers, bottom-up
    pub layers: Vec<LayerInit>,
}

/// One channel node's geometry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub row: usize,
    pub col: usize,
    /// Bottom width [m]
    pub bottom_width: f64,
    /// Top width at top of bank [m]
    pub top_width: f64,
    /// Bank height [m]
    pub bank_height: f64,
    /// Channel length through the cell, sinuosity included [m]
    pub length: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Outlet number this link exits through (0 = interior link)
    pub outlet: usize,
    pub nodes: Vec<NodeConfig>,
}

/// Channel compartment configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub links: Vec<LinkConfig>,
    pub initial_depth: f64,
    pub initial_csed: Vec<f64>,
    pub initial_cchem: Vec<f64>,
    /// Sediment stack layers, bottom-up
    pub layers: Vec<LayerInit>,
}

/// A domain outlet with optional chemical boundary concentrations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutletConfig {
    pub row: usize,
    pub col: usize,
    /// Per-chemical boundary series as (time [h], concentration [g/m³])
    pub boundary: Option<Vec<Vec<(f64, f64)>>>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadUnitsConfig {
    KgPerDay,
    Concentration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadTargetConfig {
    Cell { row: usize, col: usize },
    CellDistributed { row: usize, col: usize },
    Node { link: usize, node: usize },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadConfig {
    pub chem: usize,
    pub target: LoadTargetConfig,
    pub units: LoadUnitsConfig,
    /// (time [h], value) breaks
    pub series: Vec<(f64, f64)>,
}

/// Uniform environmental defaults; spatially and temporally distributed
/// forcing is attached through the library API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub climate: CellClimate,
    pub water: MediumState,
    pub bed: MediumState,
    /// Light extinction coefficient of the water column [1/m]
    pub extinction: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            climate: CellClimate::default(),
            water: MediumState::default(),
            bed: MediumState::default(),
            extinction: 0.0,
        }
    }
}

/// Output controls for the driver binary.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root path for grid snapshot files (root + `_` + group + `.seq`)
    #[serde(default)]
    pub grid_root: Option<String>,
    #[serde(default)]
    pub grid_interval_hours: Option<f64>,
    /// Directory for per-chemical CSV export files
    #[serde(default)]
    pub export_dir: Option<String>,
    #[serde(default)]
    pub export_interval_hours: Option<f64>,
    /// true = kg/day (concentration times discharge); false = g/m³
    #[serde(default)]
    pub export_mass_rate: bool,
    #[serde(default)]
    pub stations: Vec<StationConfig>,
    /// Restart snapshot written at the end of the run
    #[serde(default)]
    pub restart_file: Option<String>,
    /// Simulation-error file mirrored alongside stdout diagnostics
    #[serde(default)]
    pub error_file: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StationConfig {
    pub row: usize,
    pub col: usize,
}

/// Steady hydraulic forcing for one overland cell, applied by the driver
/// before every step.  Stands in for the external hydraulic module in
/// scenarios with stationary flow fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SteadyFlowConfig {
    pub row: usize,
    pub col: usize,
    /// Water depth at t + dt [m]; omitted = hold the initial depth
    #[serde(default)]
    pub depth: Option<f64>,
    /// (source index, m³/s) inflows
    #[serde(default)]
    pub inflow: Vec<(usize, f64)>,
    /// (source index, m³/s) outflows
    #[serde(default)]
    pub outflow: Vec<(usize, f64)>,
    /// Infiltration rate [m/s]
    #[serde(default)]
    pub infiltration: f64,
}

/// Everything needed to build a `Simulation`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub title: String,
    pub grid: GridConfig,
    pub time: TimeConfig,
    pub stack: StackConfig,
    pub solids: Vec<SolidsProperties>,
    pub chemicals: Vec<ChemicalProperties>,
    pub soils: Vec<SoilProperties>,
    #[serde(default)]
    pub yields: Vec<YieldEntry>,
    pub overland: OverlandConfig,
    #[serde(default)]
    pub channel: Option<ChannelConfig>,
    #[serde(default)]
    pub outlets: Vec<OutletConfig>,
    #[serde(default)]
    pub loads: Vec<LoadConfig>,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub hydrology: Vec<SteadyFlowConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Validate the configuration before any state is allocated.
    pub fn validate(&self) -> Result<()> {
        if self.grid.nrows == 0 || self.grid.ncols == 0 {
            return Err(SimulationError::ConfigInvalid(
                "grid must have at least one row and one column".into(),
            ));
        }
        if self.grid.mask.len() != self.grid.nrows
            || self.grid.mask.iter().any(|r| r.len() != self.grid.ncols)
        {
            return Err(SimulationError::ConfigMismatch {
                file: "mask".into(),
                detail: format!(
                    "mask shape disagrees with grid ({} x {})",
                    self.grid.nrows, self.grid.ncols
                ),
            });
        }
        if self.stack.max_stack == 0 {
            return Err(SimulationError::ConfigInvalid(
                "max_stack must be positive; empty-stack scenarios are rejected".into(),
            ));
        }
        if self.stack.min_fraction <= 0.0 || self.stack.max_fraction <= self.stack.min_fraction {
            return Err(SimulationError::ConfigInvalid(format!(
                "volume trigger fractions must satisfy 0 < min < max, got {} and {}",
                self.stack.min_fraction, self.stack.max_fraction
            )));
        }
        if self.overland.layers.is_empty() {
            return Err(SimulationError::ConfigInvalid(
                "overland stack needs at least one initial layer".into(),
            ));
        }
        if self.overland.layers.len() > self.stack.max_stack {
            return Err(SimulationError::ConfigInvalid(format!(
                "overland stack starts with {} layers but max_stack is {}",
                self.overland.layers.len(),
                self.stack.max_stack
            )));
        }
        if self.time.schedule.is_empty() {
            return Err(SimulationError::ConfigInvalid(
                "time-step schedule is empty".into(),
            ));
        }
        for brk in &self.time.schedule {
            if brk.dt_seconds <= 0.0 {
                return Err(SimulationError::ConfigInvalid(format!(
                    "non-positive time step {} s in schedule",
                    brk.dt_seconds
                )));
            }
        }

        let nsolids = self.solids.len();
        let nchems = self.chemicals.len();
        for (k, layer) in self.overland.layers.iter().enumerate() {
            if layer.thickness <= 0.0 {
                return Err(SimulationError::ConfigInvalid(format!(
                    "overland layer {} has non-positive thickness",
                    k
                )));
            }
            if layer.csed.len() != nsolids || layer.cchem.len() != nchems {
                return Err(SimulationError::ConfigMismatch {
                    file: "overland.layers".into(),
                    detail: format!(
                        "layer {} carries {} solids and {} chemicals, expected {} and {}",
                        k,
                        layer.csed.len(),
                        layer.cchem.len(),
                        nsolids,
                        nchems
                    ),
                });
            }
            if layer.soil_type >= self.soils.len() {
                return Err(SimulationError::ConfigInvalid(format!(
                    "overland layer {} references undefined soil type {}",
                    k, layer.soil_type
                )));
            }
        }
        if self.overland.initial_csed.len() != nsolids
            || self.overland.initial_cchem.len() != nchems
        {
            return Err(SimulationError::ConfigMismatch {
                file: "overland".into(),
                detail: "initial water-column concentration counts disagree with the \
                         configured species"
                    .into(),
            });
        }

        if let Some(channel) = &self.channel {
            if channel.layers.is_empty() {
                return Err(SimulationError::ConfigInvalid(
                    "channel stack needs at least one initial layer".into(),
                ));
            }
            if channel.layers.len() > self.stack.max_stack {
                return Err(SimulationError::ConfigInvalid(format!(
                    "channel stack starts with {} layers but max_stack is {}",
                    channel.layers.len(),
                    self.stack.max_stack
                )));
            }
            for (l, link) in channel.links.iter().enumerate() {
                for (n, node) in link.nodes.iter().enumerate() {
                    if node.row >= self.grid.nrows || node.col >= self.grid.ncols {
                        return Err(SimulationError::ConfigInvalid(format!(
                            "link {} node {} lies outside the grid",
                            l, n
                        )));
                    }
                    if node.bank_height <= 0.0 {
                        return Err(SimulationError::ConfigInvalid(format!(
                            "link {} node {} has non-positive bank height",
                            l, n
                        )));
                    }
                }
            }
        }

        for load in &self.loads {
            if load.chem >= nchems {
                return Err(SimulationError::ConfigInvalid(format!(
                    "load references undefined chemical {}",
                    load.chem
                )));
            }
        }

        for entry in &self.yields {
            let from_bound = if entry.process == crate::chem::Process::Dissolution {
                nsolids
            } else {
                nchems
            };
            if entry.from >= from_bound || entry.to >= nchems {
                return Err(SimulationError::ConfigInvalid(format!(
                    "yield entry {:?} -> {} references an undefined species",
                    entry.from, entry.to
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn geometry(&self) -> GridGeometry {
        GridGeometry {
            nrows: self.grid.nrows,
            ncols: self.grid.ncols,
            cell_size: self.grid.cell_size,
            xllcorner: self.grid.xllcorner,
            yllcorner: self.grid.yllcorner,
            nodata_value: self.grid.nodata_value,
        }
    }

    pub(crate) fn mask_values(&self) -> Array2<MaskValue> {
        let mut mask = Array2::from_elem((self.grid.nrows, self.grid.ncols), MaskValue::Outside);
        for (r, row) in self.grid.mask.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                mask[(r, c)] = match v {
                    1 => MaskValue::Overland,
                    2 => MaskValue::Channel,
                    _ => MaskValue::Outside,
                };
            }
        }
        mask
    }
}

impl From<LoadUnitsConfig> for LoadUnits {
    fn from(v: LoadUnitsConfig) -> Self {
        match v {
            LoadUnitsConfig::KgPerDay => LoadUnits::KgPerDay,
            LoadUnitsConfig::Concentration => LoadUnits::Concentration,
        }
    }
}

impl From<LoadTargetConfig> for LoadTarget {
    fn from(v: LoadTargetConfig) -> Self {
        match v {
            LoadTargetConfig::Cell { row, col } => LoadTarget::Cell { row, col },
            LoadTargetConfig::CellDistributed { row, col } => {
                LoadTarget::CellDistributed { row, col }
            }
            LoadTargetConfig::Node { link, node } => LoadTarget::Node { link, node },
        }
    }
}


#[cfg(test)]
mod tests {
    use super::tests_support::minimal;
    use super::*;

    #[test]
    fn minimal_config_validates() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn empty_stack_is_rejected_at_config_time() {
        let mut cfg = minimal();
        cfg.stack.max_stack = 0;
        assert!(matches!(
            cfg.validate(),
            Err(SimulationError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn species_count_mismatch_is_config_mismatch() {
        let mut cfg = minimal();
        cfg.overland.layers[0].csed = vec![1.0, 2.0];
        assert!(matches!(
            cfg.validate(),
            Err(SimulationError::ConfigMismatch { .. })
        ));
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = minimal();
        let text = toml::to_string(&cfg).unwrap();
        let back: SimulationConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.grid.nrows, 1);
        assert_eq!(back.solids[0].name, "silt");
    }
}
