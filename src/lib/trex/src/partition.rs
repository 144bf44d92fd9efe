use serde::{Deserialize, Serialize};

use crate::chem::{PartitionParams, SorptionBasis};

/// Equilibrium phase split of a chemical at one cell and layer.  The three
/// fractions partition total chemical mass: dissolved + bound + sum of
/// particulate fractions is identically one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseDistribution {
    /// Truly dissolved fraction
    pub dissolved: f64,
    /// DOC-bound fraction (mobile, but distinguished for reporting and
    /// kinetics eligibility)
    pub bound: f64,
    /// Fraction sorbed to each solids class
    pub particulate: Vec<f64>,
}

impl PhaseDistribution {
    /// All dissolved: the state of a non-partitioning chemical.
    pub fn all_dissolved(nsolids: usize) -> Self {
        PhaseDistribution {
            dissolved: 1.0,
            bound: 0.0,
            particulate: vec![0.0; nsolids],
        }
    }

    /// Dissolved plus DOC-bound: the phases that move with water.
    pub fn mobile(&self) -> f64 {
        self.dissolved + self.bound
    }

    pub fn particulate_total(&self) -> f64 {
        self.particulate.iter().sum()
    }
}

/// Compute the three-phase equilibrium split for one chemical.
///
/// `csed` are the solids concentrations of the cell/layer [g/m³], `cdoc`
/// the DOC concentration [g/m³], `fdoc` the effective binding fraction of
/// that DOC, and `fpoc` the particulate organic-carbon fraction of each
/// solids class (used when the chemical sorbs on an organic-carbon basis).
///
/// The solids coefficients carry a non-linear particle-interaction
/// correction phi = nu_x / (nu_x + M) where M is the total solids
/// concentration.  A chemical without partitioning parameters is entirely
/// dissolved regardless of its coefficients.
pub fn partition(
    params: Option<&PartitionParams>,
    csed: &[f64],
    cdoc: f64,
    fdoc: f64,
    fpoc: &[f64],
) -> PhaseDistribution {
    let Some(p) = params else {
        return PhaseDistribution::all_dissolved(csed.len());
    };

    // total suspended/bedded solids concentration M [g/m³]
    let m_total: f64 = csed.iter().sum();

    // particle interaction correction [dimensionless]
    let phi = p.nu_x / (p.nu_x + m_total);

    // effective DOC binding coefficient times DOC [dimensionless]
    let bound_term = p.kb * fdoc * cdoc;

    // effective sorption terms per solids class [dimensionless]
    let mut sorbed_terms = Vec::with_capacity(csed.len());
    for (s, &conc) in csed.iter().enumerate() {
        let kp_s = match p.basis {
            SorptionBasis::DistributionCoefficient => p.kp,
            SorptionBasis::OrganicCarbon => p.koc * fpoc.get(s).copied().unwrap_or(0.0),
        };
        sorbed_terms.push(phi * kp_s * conc);
    }

    let denominator = 1.0 + bound_term + sorbed_terms.iter().sum::<f64>();

    PhaseDistribution {
        dissolved: 1.0 / denominator,
        bound: bound_term / denominator,
        particulate: sorbed_terms.iter().map(|t| t / denominator).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_partitioning_is_all_dissolved_even_with_nonzero_kp() {
        // partopt == 0 with a nonzero kp still reports fdissolved == 1
        let d = partition(None, &[500.0, 100.0], 10.0, 1.0, &[]);
        assert_eq!(d.dissolved, 1.0);
        assert_eq!(d.bound, 0.0);
        assert_eq!(d.particulate_total(), 0.0);
    }

    #[test]
    fn fractions_sum_to_unity() {
        let p = PartitionParams {
            kp: 1.0e-4,
            kb: 1.0e-6,
            koc: 0.0,
            nu_x: 1.0e5,
            basis: SorptionBasis::DistributionCoefficient,
        };
        let d = partition(Some(&p), &[50.0, 20.0], 5.0, 1.0, &[]);
        let sum = d.dissolved + d.bound + d.particulate_total();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(d.dissolved > 0.0 && d.dissolved < 1.0);
    }

    #[test]
    fn matches_closed_form_mass_law() {
        let p = PartitionParams {
            kp: 1.0e-4,
            kb: 1.0e-6,
            koc: 0.0,
            nu_x: 1.0e5,
            basis: SorptionBasis::DistributionCoefficient,
        };
        let csed = [50.0, 20.0];
        let d = partition(Some(&p), &csed, 5.0, 1.0, &[]);

        let m: f64 = csed.iter().sum();
        let phi = p.nu_x / (p.nu_x + m);
        let den = 1.0 + p.kb * 5.0 + phi * p.kp * m;
        assert!((d.dissolved - 1.0 / den).abs() < 1e-12);
        assert!((d.bound - p.kb * 5.0 / den).abs() < 1e-12);
        assert!((d.particulate[0] - phi * p.kp * 50.0 / den).abs() < 1e-12);
        assert!((d.particulate[1] - phi * p.kp * 20.0 / den).abs() < 1e-12);
    }

    #[test]
    fn organic_carbon_basis_scales_by_fpoc() {
        let p = PartitionParams {
            kp: 0.0,
            kb: 0.0,
            koc: 1.0e-3,
            nu_x: 1.0e20,
            basis: SorptionBasis::OrganicCarbon,
        };
        let d = partition(Some(&p), &[100.0, 100.0], 0.0, 1.0, &[0.05, 0.0]);
        assert!(d.particulate[0] > 0.0);
        assert_eq!(d.particulate[1], 0.0);
    }

    #[test]
    fn particle_interaction_suppresses_sorption_at_high_solids() {
        let p = PartitionParams {
            kp: 1.0e-4,
            kb: 0.0,
            koc: 0.0,
            nu_x: 1.0e3,
            basis: SorptionBasis::DistributionCoefficient,
        };
        let low = partition(Some(&p), &[100.0], 0.0, 1.0, &[]);
        let high = partition(Some(&p), &[1.0e6], 0.0, 1.0, &[]);
        // phi shrinks with solids load, so the effective kp drops
        let phi_low = 1.0e3 / (1.0e3 + 100.0);
        let phi_high = 1.0e3 / (1.0e3 + 1.0e6);
        assert!((low.particulate[0] / low.dissolved - phi_low * 1.0e-4 * 100.0).abs() < 1e-9);
        assert!((high.particulate[0] / high.dissolved - phi_high * 1.0e-4 * 1.0e6).abs() < 1e-9);
    }
}
