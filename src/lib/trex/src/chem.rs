use serde::{Deserialize, Serialize};

/// Reaction process channels.  Discriminants match the process numbers used
/// in yield entries (dissolution is process 8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Process {
    Biodegradation = 1,
    Hydrolysis = 2,
    Oxidation = 3,
    Photolysis = 4,
    Radioactive = 5,
    Volatilization = 6,
    UserDefined = 7,
    Dissolution = 8,
}

/// How the solids partition coefficient for a chemical is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SorptionBasis {
    /// A single distribution coefficient kp applied to every solid class.
    DistributionCoefficient,
    /// koc scaled by the particulate organic-carbon fraction of each solid.
    OrganicCarbon,
}

/// Equilibrium partitioning parameters for one chemical.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionParams {
    /// Solids partition coefficient kp [m³/g]
    pub kp: f64,
    /// DOC binding coefficient kb [m³/g]
    pub kb: f64,
    /// Organic-carbon coefficient koc [m³/g]
    pub koc: f64,
    /// Particle interaction parameter for solids-dependent partitioning
    /// [dimensionless]; large values disable the correction
    pub nu_x: f64,
    pub basis: SorptionBasis,
}

impl Default for PartitionParams {
    fn default() -> Self {
        PartitionParams {
            kp: 0.0,
            kb: 0.0,
            koc: 0.0,
            nu_x: 1.0e20,
            basis: SorptionBasis::DistributionCoefficient,
        }
    }
}

/// First-order rate constants by compartment [1/s].
///
/// Water and soil/sediment carry separate constants, overland and channel
/// likewise.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CompartmentRates {
    pub overland_water: f64,
    pub overland_soil: f64,
    pub channel_water: f64,
    pub channel_sediment: f64,
}

impl CompartmentRates {
    pub fn uniform(k: f64) -> Self {
        CompartmentRates {
            overland_water: k,
            overland_soil: k,
            channel_water: k,
            channel_sediment: k,
        }
    }
}

/// Which phases a first-order reaction acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseSubset {
    /// Dissolved only
    Dissolved,
    /// Dissolved plus DOC-bound
    Mobile,
    /// All phases (dissolved, bound, particulate)
    Total,
}

/// A generic first-order loss process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FirstOrderParams {
    pub rates: CompartmentRates,
    pub phases: PhaseSubset,
}

/// Dissolution of a pure-phase solid into a chemical.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DissolutionParams {
    /// Dissolution rate in the water column [m/s]
    pub k_water: f64,
    /// Dissolution rate in the soil/sediment bed [m/s]
    pub k_bed: f64,
    /// Solubility limit C_sat [g/m³]
    pub solubility: f64,
}

/// Everything the kernel needs to know about one chemical.  Process
/// switches are the presence of the parameter record; there are no parallel
/// option arrays to mis-index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChemicalProperties {
    pub name: String,
    pub partition: Option<PartitionParams>,
    pub biodegradation: Option<CompartmentRates>,
    pub hydrolysis: Option<FirstOrderParams>,
    pub oxidation: Option<FirstOrderParams>,
    pub photolysis: Option<FirstOrderParams>,
    pub radioactive: Option<FirstOrderParams>,
    pub volatilization: Option<FirstOrderParams>,
    pub user_reaction: Option<FirstOrderParams>,
    pub dissolution: Option<DissolutionParams>,
    /// Chemical group membership for reporting (1-based; 0 = ungrouped)
    pub report_group: usize,
}

impl ChemicalProperties {
    /// An inert chemical: no partitioning, no reactions.
    pub fn inert(name: impl Into<String>) -> Self {
        ChemicalProperties {
            name: name.into(),
            partition: None,
            biodegradation: None,
            hydrolysis: None,
            oxidation: None,
            photolysis: None,
            radioactive: None,
            volatilization: None,
            user_reaction: None,
            dissolution: None,
            report_group: 0,
        }
    }
}

/// Physical properties of one solids (particle) class.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolidsProperties {
    pub name: String,
    /// Particle diameter d_s [m]
    pub diameter: f64,
    /// Specific gravity relative to water [dimensionless]
    pub specific_gravity: f64,
}

/// A reaction yield rule: mass converted out of `from` by `process` is
/// scheduled into chemical `to`, scaled by `yield_factor` (g product per g
/// reactant).  For dissolution (process 8) `from` indexes a solids class;
/// for every other process it indexes a chemical.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct YieldEntry {
    pub from: usize,
    pub to: usize,
    pub process: Process,
    pub yield_factor: f64,
}

/// Soil/sediment material properties, indexed by the per-layer soil type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoilProperties {
    pub name: String,
    /// Porosity [dimensionless, 0-1]
    pub porosity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inert_chemical_has_no_processes() {
        let c = ChemicalProperties::inert("tracer");
        assert!(c.partition.is_none());
        assert!(c.dissolution.is_none());
    }

    #[test]
    fn default_partition_disables_particle_interaction() {
        let p = PartitionParams::default();
        // nu_x / (nu_x + M) ~ 1 for any realistic solids load
        let phi = p.nu_x / (p.nu_x + 1.0e6);
        assert!(phi > 0.999_999);
    }
}
