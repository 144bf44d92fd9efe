use serde::{Deserialize, Serialize};

use crate::ledger::{ChemicalLedger, SolidsLedger, NSOURCES};
use crate::partition::PhaseDistribution;
use crate::stack::MaterialStack;

/// The water column above one overland cell or channel node.
///
/// This is a distinct compartment, not "layer zero" of the stack:
/// suspended solids and chemicals here are carried by flow, while the
/// stack below holds bedded material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaterColumn {
    /// Water depth at time t [m]
    pub depth: f64,
    /// Water depth at time t + dt [m]
    pub depth_new: f64,
    /// Suspended solids concentration per particle class [g/m³]
    pub csed: Vec<f64>,
    pub csed_new: Vec<f64>,
    /// Chemical concentration per chemical [g/m³]
    pub cchem: Vec<f64>,
    pub cchem_new: Vec<f64>,
}

impl WaterColumn {
    pub fn new(depth: f64, nsolids: usize, nchems: usize) -> Self {
        WaterColumn {
            depth,
            depth_new: depth,
            csed: vec![0.0; nsolids],
            csed_new: vec![0.0; nsolids],
            cchem: vec![0.0; nchems],
            cchem_new: vec![0.0; nchems],
        }
    }

    /// Sum of suspended solids over all particle classes [g/m³].
    pub fn total_solids(&self) -> f64 {
        self.csed.iter().sum()
    }
}

/// General (meteorological) conditions at one cell.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CellClimate {
    /// Wind speed [m/s]
    pub wind_speed: f64,
    /// Air temperature [°C], lapsed to the cell elevation
    pub air_temperature: f64,
    /// Incident solar radiation [W/m²]
    pub solar_radiation: f64,
    /// Cloud cover [fraction 0-1]
    pub cloud_cover: f64,
    /// Albedo [fraction 0-1]
    pub albedo: f64,
}

impl Default for CellClimate {
    fn default() -> Self {
        CellClimate {
            wind_speed: 0.0,
            air_temperature: 20.0,
            solar_radiation: 0.0,
            cloud_cover: 0.0,
            albedo: 0.0,
        }
    }
}

/// Chemistry-relevant conditions of one medium (a water column or one bed
/// layer).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MediumState {
    /// DOC concentration [g/m³]
    pub cdoc: f64,
    /// Effective binding fraction of the DOC [dimensionless]
    pub fdoc: f64,
    /// Hardness [g/m³]
    pub hardness: f64,
    /// pH [s.u.]
    pub ph: f64,
    /// Water / soil / sediment temperature [°C]
    pub temperature: f64,
    /// Oxidant/radical concentration [g/m³]
    pub oxidant: f64,
    /// Bacterial count [cells/100 mL]
    pub bacteria: f64,
    /// User-defined reaction property
    pub user_property: f64,
}

impl Default for MediumState {
    fn default() -> Self {
        MediumState {
            cdoc: 0.0,
            fdoc: 1.0,
            hardness: 0.0,
            ph: 7.0,
            temperature: 20.0,
            oxidant: 0.0,
            bacteria: 0.0,
            user_property: 0.0,
        }
    }
}

/// Per-step reaction fluxes for one chemical in one compartment [g/s].
/// Outfluxes are first-order losses; influxes arrive through yields and
/// dissolution.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ReactionFluxes {
    pub biodegradation_out: f64,
    pub hydrolysis_out: f64,
    pub oxidation_out: f64,
    pub photolysis_out: f64,
    pub radioactive_out: f64,
    pub volatilization_out: f64,
    pub user_defined_out: f64,
    /// Influx from dissolving pure-phase solids
    pub dissolution_in: f64,
    /// Influx from yields of other chemicals' reactions
    pub yield_in: f64,
}

impl ReactionFluxes {
    pub fn total_out(&self) -> f64 {
        self.biodegradation_out
            + self.hydrolysis_out
            + self.oxidation_out
            + self.photolysis_out
            + self.radioactive_out
            + self.volatilization_out
            + self.user_defined_out
    }

    pub fn total_in(&self) -> f64 {
        self.dissolution_in + self.yield_in
    }

    pub fn clear(&mut self) {
        *self = ReactionFluxes::default();
    }
}

/// Per-step transport fluxes for one solids class at one column [g/s].
/// Advective and dispersive registers are indexed by flow source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolidsFluxes {
    pub adv_in: [f64; NSOURCES],
    pub adv_out: [f64; NSOURCES],
    pub dsp_in: [f64; NSOURCES],
    pub dsp_out: [f64; NSOURCES],
    /// Settling out of the water column onto the surface layer
    pub deposition: f64,
    /// Entrainment out of the surface layer into the water column
    pub erosion: f64,
    /// Dissolution loss of this (pure-phase) solid in the water column
    pub dissolution_water: f64,
    /// Dissolution loss in the surface bed layer
    pub dissolution_bed: f64,
}

impl Default for SolidsFluxes {
    fn default() -> Self {
        SolidsFluxes {
            adv_in: [0.0; NSOURCES],
            adv_out: [0.0; NSOURCES],
            dsp_in: [0.0; NSOURCES],
            dsp_out: [0.0; NSOURCES],
            deposition: 0.0,
            erosion: 0.0,
            dissolution_water: 0.0,
            dissolution_bed: 0.0,
        }
    }
}

/// Per-step transport and reaction fluxes for one chemical at one column
/// [g/s].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChemicalFluxes {
    pub adv_in: [f64; NSOURCES],
    pub adv_out: [f64; NSOURCES],
    pub dsp_in: [f64; NSOURCES],
    pub dsp_out: [f64; NSOURCES],
    /// Particulate chemical settling with its carrier solids
    pub deposition: f64,
    /// Particulate chemical entrained with eroding bed material
    pub erosion: f64,
    /// Dissolved + bound chemical released from eroded porewater
    pub porewater: f64,
    /// Dissolved + bound chemical infiltrating out of the water column
    pub infiltration: f64,
    /// Reactions in the water column
    pub rxn_water: ReactionFluxes,
    /// Reactions in the surface bed layer
    pub rxn_bed: ReactionFluxes,
}

impl Default for ChemicalFluxes {
    fn default() -> Self {
        ChemicalFluxes {
            adv_in: [0.0; NSOURCES],
            adv_out: [0.0; NSOURCES],
            dsp_in: [0.0; NSOURCES],
            dsp_out: [0.0; NSOURCES],
            deposition: 0.0,
            erosion: 0.0,
            porewater: 0.0,
            infiltration: 0.0,
            rxn_water: ReactionFluxes::default(),
            rxn_bed: ReactionFluxes::default(),
        }
    }
}

/// All per-step transport state of one column.  Water and solids entries
/// are inputs supplied by the external hydraulic and erosion modules; the
/// chemical entries are assembled by the transport-flux assembler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnTransport {
    /// Water depth at t + dt supplied by the hydraulic module [m]
    pub depth_new: f64,
    /// Water inflow by source [m³/s]
    pub flow_in: [f64; NSOURCES],
    /// Water outflow by source [m³/s]
    pub flow_out: [f64; NSOURCES],
    /// Dispersive exchange flow by source [m³/s]
    pub dsp_flow: [f64; NSOURCES],
    /// Infiltration / transmission-loss rate [m/s]
    pub infiltration_rate: f64,
    pub solids: Vec<SolidsFluxes>,
    pub chems: Vec<ChemicalFluxes>,
}

impl ColumnTransport {
    pub fn new(nsolids: usize, nchems: usize) -> Self {
        ColumnTransport {
            depth_new: 0.0,
            flow_in: [0.0; NSOURCES],
            flow_out: [0.0; NSOURCES],
            dsp_flow: [0.0; NSOURCES],
            infiltration_rate: 0.0,
            solids: vec![SolidsFluxes::default(); nsolids],
            chems: vec![ChemicalFluxes::default(); nchems],
        }
    }

    /// Clear the assembled chemical fluxes ahead of a new step.  Solids and
    /// water entries are overwritten by the external modules.
    pub fn clear_chem_fluxes(&mut self) {
        for f in &mut self.chems {
            *f = ChemicalFluxes::default();
        }
    }
}

/// Dynamic state of one column: the water above, the stack below, the
/// environment around them, and the per-step scratch registers.
#[derive(Clone, Debug)]
pub struct ColumnState {
    pub water: WaterColumn,
    pub stack: MaterialStack,
    pub env_water: MediumState,
    /// Light extinction coefficient of the water column [1/m]
    pub extinction: f64,
    /// Environment per stack slot (slot-indexed, sized max_stack)
    pub env_bed: Vec<MediumState>,
    /// Particulate organic-carbon fraction per solids class, water column
    pub fpoc_water: Vec<f64>,
    /// fpoc per stack slot, per solids class
    pub fpoc_bed: Vec<Vec<f64>>,
    /// Phase split per chemical, water column
    pub phases_water: Vec<PhaseDistribution>,
    /// Phase split per stack slot, per chemical
    pub phases_bed: Vec<Vec<PhaseDistribution>>,
    pub transport: ColumnTransport,
    pub solids_ledger: Vec<SolidsLedger>,
    pub chem_ledger: Vec<ChemicalLedger>,
}

impl ColumnState {
    pub fn new(water: WaterColumn, stack: MaterialStack, nsolids: usize, nchems: usize) -> Self {
        let max_stack = stack.max_stack();
        ColumnState {
            water,
            stack,
            env_water: MediumState::default(),
            extinction: 0.0,
            env_bed: vec![MediumState::default(); max_stack],
            fpoc_water: vec![0.0; nsolids],
            fpoc_bed: vec![vec![0.0; nsolids]; max_stack],
            phases_water: vec![PhaseDistribution::all_dissolved(nsolids); nchems],
            phases_bed: vec![vec![PhaseDistribution::all_dissolved(nsolids); nchems]; max_stack],
            transport: ColumnTransport::new(nsolids, nchems),
            solids_ledger: vec![SolidsLedger::new(max_stack); nsolids],
            chem_ledger: vec![ChemicalLedger::new(max_stack); nchems],
        }
    }
}

/// One in-domain overland cell.
#[derive(Clone, Debug)]
pub struct OverlandCell {
    pub row: usize,
    pub col: usize,
    /// Ground surface elevation [m] (top of the surface soil layer)
    pub ground_elevation: f64,
    /// Plan area available to overland flow [m²]: cell area minus any
    /// channel surface area
    pub ground_area: f64,
    pub climate: CellClimate,
    pub state: ColumnState,
}

impl OverlandCell {
    /// Water volume at the current depth [m³].
    pub fn water_volume(&self) -> f64 {
        self.state.water.depth * self.ground_area
    }

    /// Water volume at the integrated depth [m³], read from the hydraulic
    /// module's input for the step in progress.
    pub fn water_volume_new(&self) -> f64 {
        self.state.transport.depth_new * self.ground_area
    }
}

/// One channel node's dynamic state.  Geometry lives in the
/// `ChannelNetwork`; this record carries the water column and the sediment
/// stack.
#[derive(Clone, Debug)]
pub struct ChannelNode {
    pub link: usize,
    pub node: usize,
    pub state: ColumnState,
}
