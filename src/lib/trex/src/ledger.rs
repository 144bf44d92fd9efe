use serde::{Deserialize, Serialize};

/// Number of advective flow sources tracked per cell.  Index 0 is reserved
/// for external loads, 1..=9 are directional sources, 10 is the domain
/// outlet/boundary.
pub const NSOURCES: usize = 11;

/// Source index reserved for external loads.
pub const SOURCE_LOAD: usize = 0;

/// Source index reserved for the domain outlet/boundary.
pub const SOURCE_OUTLET: usize = 10;

/// A cumulative in/out mass register [kg].  Accumulators only grow; signs
/// are carried by which side of the register is credited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MassTally {
    pub in_kg: f64,
    pub out_kg: f64,
}

impl MassTally {
    pub fn credit_in(&mut self, kg: f64) {
        self.in_kg += kg;
    }

    pub fn credit_out(&mut self, kg: f64) {
        self.out_kg += kg;
    }

    pub fn net_in(&self) -> f64 {
        self.in_kg - self.out_kg
    }
}

/// Water-column / bed pair of registers for a reaction channel.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CompartmentTally {
    pub water: MassTally,
    pub bed: MassTally,
}

/// Reaction-channel registers for one chemical at one cell.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReactionTallies {
    pub biodegradation: CompartmentTally,
    pub hydrolysis: CompartmentTally,
    pub oxidation: CompartmentTally,
    pub photolysis: CompartmentTally,
    pub radioactive: CompartmentTally,
    pub volatilization: CompartmentTally,
    pub user_defined: CompartmentTally,
    /// Mass gained from dissolving pure-phase solids (influx only)
    pub dissolution: CompartmentTally,
    /// Mass gained as the reaction product of other chemicals
    pub yield_gain: CompartmentTally,
}

/// Transport and reaction registers for one chemical at one cell or node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChemicalLedger {
    /// Advective transfers by flow source (water column)
    pub advection: [MassTally; NSOURCES],
    /// Dispersive transfers by flow source (water column)
    pub dispersion: [MassTally; NSOURCES],
    /// Settling out of the water column into the surface layer
    pub deposition: MassTally,
    /// Entrainment out of the surface layer into the water column
    pub erosion: MassTally,
    /// Porewater released to the water column during erosion
    pub porewater: MassTally,
    /// Infiltration out of the water column into the surface layer
    pub infiltration: MassTally,
    /// Burial transfers per stack slot (0 = deepest)
    pub burial: Vec<MassTally>,
    pub reactions: ReactionTallies,
}

impl ChemicalLedger {
    pub fn new(max_stack: usize) -> Self {
        ChemicalLedger {
            advection: [MassTally::default(); NSOURCES],
            dispersion: [MassTally::default(); NSOURCES],
            deposition: MassTally::default(),
            erosion: MassTally::default(),
            porewater: MassTally::default(),
            infiltration: MassTally::default(),
            burial: vec![MassTally::default(); max_stack],
            reactions: ReactionTallies::default(),
        }
    }
}

/// Transport registers for one solids class at one cell or node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolidsLedger {
    pub advection: [MassTally; NSOURCES],
    pub dispersion: [MassTally; NSOURCES],
    pub deposition: MassTally,
    pub erosion: MassTally,
    pub burial: Vec<MassTally>,
    /// Mass lost to dissolution (pure-phase solids only)
    pub dissolution: CompartmentTally,
}

impl SolidsLedger {
    pub fn new(max_stack: usize) -> Self {
        SolidsLedger {
            advection: [MassTally::default(); NSOURCES],
            dispersion: [MassTally::default(); NSOURCES],
            deposition: MassTally::default(),
            erosion: MassTally::default(),
            burial: vec![MassTally::default(); max_stack],
            dissolution: CompartmentTally::default(),
        }
    }
}

/// The burial registers a stack mutation is allowed to touch: per-species,
/// per-slot tallies for one cell or node.
pub struct BurialLedger<'a> {
    pub solids: &'a mut [SolidsLedger],
    pub chems: &'a mut [ChemicalLedger],
}

impl BurialLedger<'_> {
    /// Record a symmetric burial transfer of `kg` of solids class `s` from
    /// stack slot `from` into slot `to`.
    pub fn transfer_solid(&mut self, s: usize, from: usize, to: usize, kg: f64) {
        self.solids[s].burial[from].credit_out(kg);
        self.solids[s].burial[to].credit_in(kg);
    }

    /// Record a symmetric burial transfer of `kg` of chemical `c` from
    /// stack slot `from` into slot `to`.
    pub fn transfer_chem(&mut self, c: usize, from: usize, to: usize, kg: f64) {
        self.chems[c].burial[from].credit_out(kg);
        self.chems[c].burial[to].credit_in(kg);
    }
}

/// Per-outlet cumulative registers for one chemical.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct OutletRegister {
    pub advection: MassTally,
    pub dispersion: MassTally,
    /// Peak advective export rate [g/s] and the time it occurred [h]
    pub peak_flux: f64,
    pub peak_time: f64,
}

impl OutletRegister {
    pub fn observe_flux(&mut self, flux: f64, simtime: f64) {
        if flux > self.peak_flux {
            self.peak_flux = flux;
            self.peak_time = simtime;
        }
    }
}

/// Concentration extrema for one chemical, split by compartment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConcentrationExtrema {
    pub min_water: f64,
    pub max_water: f64,
    pub min_bed: f64,
    pub max_bed: f64,
}

impl Default for ConcentrationExtrema {
    fn default() -> Self {
        ConcentrationExtrema {
            min_water: f64::INFINITY,
            max_water: f64::NEG_INFINITY,
            min_bed: f64::INFINITY,
            max_bed: f64::NEG_INFINITY,
        }
    }
}

impl ConcentrationExtrema {
    pub fn observe_water(&mut self, c: f64) {
        self.min_water = self.min_water.min(c);
        self.max_water = self.max_water.max(c);
    }

    pub fn observe_bed(&mut self, c: f64) {
        self.min_bed = self.min_bed.min(c);
        self.max_bed = self.max_bed.max(c);
    }
}

/// Whole-domain mass snapshot for one chemical [kg], split by compartment.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MassSnapshot {
    pub overland_water: f64,
    pub overland_bed: f64,
    pub channel_water: f64,
    pub channel_bed: f64,
}

impl MassSnapshot {
    pub fn total(&self) -> f64 {
        self.overland_water + self.overland_bed + self.channel_water + self.channel_bed
    }
}

/// Closing mass balance for one chemical.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct MassBalance {
    pub initial_kg: f64,
    pub ingress_kg: f64,
    pub final_kg: f64,
    pub egress_kg: f64,
}

impl MassBalance {
    /// {initial + ingress} - {final + egress}
    pub fn residual_kg(&self) -> f64 {
        (self.initial_kg + self.ingress_kg) - (self.final_kg + self.egress_kg)
    }

    /// Residual divided by {initial + ingress}, as percent.
    pub fn percent_error(&self) -> f64 {
        let basis = self.initial_kg + self.ingress_kg;
        if basis == 0.0 {
            0.0
        } else {
            100.0 * self.residual_kg() / basis
        }
    }
}
