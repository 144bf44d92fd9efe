use crate::chem::{
    ChemicalProperties, CompartmentRates, FirstOrderParams, PhaseSubset, Process,
    SolidsProperties, YieldEntry,
};
use crate::store::{ColumnState, ReactionFluxes};

/// Density of water [kg/m³] used in the dissolution surface-area term.
const DENSITY_WATER: f64 = 1000.0;

/// Counters for available-mass limiter activations.  Recovered locally;
/// surfaced only through these diagnostics.
#[derive(Clone, Copy, Debug, Default)]
pub struct LimiterDiagnostics {
    pub water_hits: u64,
    pub bed_hits: u64,
    pub dissolution_hits: u64,
}

/// Which physical compartment a rate constant is drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Compartment {
    OverlandWater,
    OverlandSoil,
    ChannelWater,
    ChannelSediment,
}

fn rate_of(rates: &CompartmentRates, c: Compartment) -> f64 {
    match c {
        Compartment::OverlandWater => rates.overland_water,
        Compartment::OverlandSoil => rates.overland_soil,
        Compartment::ChannelWater => rates.channel_water,
        Compartment::ChannelSediment => rates.channel_sediment,
    }
}

/// Depth-averaged light attenuation factor for photolysis:
/// (1 - exp(-ke·h)) / (ke·h), approaching 1 as the optical depth vanishes.
fn light_attenuation(extinction: f64, depth: f64) -> f64 {
    let optical_depth = extinction * depth;
    if optical_depth < 1.0e-8 {
        1.0
    } else {
        (1.0 - (-optical_depth).exp()) / optical_depth
    }
}

/// Compute all reaction fluxes for one column (water column plus surface
/// bed layer) at the current time, then limit them against the
/// post-transport mass estimates.
///
/// Ordering within the kernel: first-order outfluxes from current state,
/// per-chemical total limiter against `cchem_new · V_new`, dissolution of
/// pure-phase solids (with its own solids-mass limiter), then
/// inter-chemical yields computed from the limited outfluxes.
#[allow(clippy::too_many_arguments)]
pub fn compute_column_reactions(
    chems: &[ChemicalProperties],
    solids: &[SolidsProperties],
    yields: &[YieldEntry],
    state: &mut ColumnState,
    water_volume: f64,
    water_volume_new: f64,
    is_channel: bool,
    dt: f64,
    diagnostics: &mut LimiterDiagnostics,
) {
    let (water_compartment, bed_compartment) = if is_channel {
        (Compartment::ChannelWater, Compartment::ChannelSediment)
    } else {
        (Compartment::OverlandWater, Compartment::OverlandSoil)
    };

    let surface = state.stack.surface_slot();
    let bed_volume = state.stack.surface().volume;
    let bed_volume_new = state.stack.surface().new_volume;
    let attenuation = light_attenuation(state.extinction, state.water.depth);

    // First-order outfluxes from state at time t
    for (ichem, props) in chems.iter().enumerate() {
        let water_flux = first_order_fluxes(
            props,
            state.water.cchem[ichem],
            water_volume,
            &state.phases_water[ichem],
            water_compartment,
            attenuation,
        );
        let bed_flux = first_order_fluxes(
            props,
            state.stack.surface().cchem[ichem],
            bed_volume,
            &state.phases_bed[surface][ichem],
            bed_compartment,
            // no light reaches the bed
            0.0,
        );
        state.transport.chems[ichem].rxn_water = water_flux;
        state.transport.chems[ichem].rxn_bed = bed_flux;
    }

    // Per-chemical total limiter against the post-transport estimate
    for ichem in 0..chems.len() {
        let available_water = (state.water.cchem_new[ichem] * water_volume_new).max(0.0);
        if limit_fluxes(
            &mut state.transport.chems[ichem].rxn_water,
            available_water,
            dt,
        ) {
            diagnostics.water_hits += 1;
        }

        let available_bed =
            (state.stack.surface().cchem_new[ichem] * bed_volume_new).max(0.0);
        if limit_fluxes(&mut state.transport.chems[ichem].rxn_bed, available_bed, dt) {
            diagnostics.bed_hits += 1;
        }
    }

    // Dissolution of pure-phase solids: an outflux from the solids state
    // and an influx to the yielded chemical
    for (ichem, props) in chems.iter().enumerate() {
        let Some(dsl) = &props.dissolution else {
            continue;
        };
        for entry in yields {
            if entry.process != Process::Dissolution || entry.to != ichem {
                continue;
            }
            let isolid = entry.from;
            let Some(sp) = solids.get(isolid) else {
                continue;
            };

            // Water column dissolution
            {
                let csed = state.water.csed[isolid];
                // surface area available for dissolution
                let alpha =
                    6.0 * csed * water_volume / (sp.diameter * sp.specific_gravity * DENSITY_WATER);
                let driving = dsl.solubility
                    - state.phases_water[ichem].dissolved * state.water.cchem[ichem];
                let mut flux = dsl.k_water * alpha * driving;

                let potential = flux * dt;
                let available = (state.water.csed_new[isolid] * water_volume_new).max(0.0);
                if potential > available {
                    flux = available / dt;
                    diagnostics.dissolution_hits += 1;
                }

                state.transport.solids[isolid].dissolution_water = flux;
                state.transport.chems[ichem].rxn_water.dissolution_in +=
                    flux * entry.yield_factor;

                // recompute the new solids concentration after dissolution
                let new_mass = available - flux * dt;
                if new_mass >= 0.0 && water_volume_new > 0.0 {
                    state.water.csed_new[isolid] = new_mass / water_volume_new;
                }
            }

            // Surface bed layer dissolution
            {
                let csed = state.stack.surface().csed[isolid];
                let alpha =
                    6.0 * csed * bed_volume / (sp.diameter * sp.specific_gravity * DENSITY_WATER);
                let driving = dsl.solubility
                    - state.phases_bed[surface][ichem].dissolved
                        * state.stack.surface().cchem[ichem];
                let mut flux = dsl.k_bed * alpha * driving;

                let potential = flux * dt;
                let available =
                    (state.stack.surface().csed_new[isolid] * bed_volume_new).max(0.0);
                if potential > available {
                    flux = available / dt;
                    diagnostics.dissolution_hits += 1;
                }

                state.transport.solids[isolid].dissolution_bed = flux;
                state.transport.chems[ichem].rxn_bed.dissolution_in += flux * entry.yield_factor;

                let new_mass = available - flux * dt;
                if new_mass >= 0.0 && bed_volume_new > 0.0 {
                    state.stack.surface_mut().csed_new[isolid] = new_mass / bed_volume_new;
                }
            }
        }
    }

    // Inter-chemical yields from the limited outfluxes
    for entry in yields {
        if entry.process == Process::Dissolution {
            continue;
        }
        let from = entry.from;
        let to = entry.to;
        if from >= chems.len() || to >= chems.len() {
            continue;
        }
        let water_out = process_outflux(&state.transport.chems[from].rxn_water, entry.process);
        let bed_out = process_outflux(&state.transport.chems[from].rxn_bed, entry.process);
        state.transport.chems[to].rxn_water.yield_in += water_out * entry.yield_factor;
        state.transport.chems[to].rxn_bed.yield_in += bed_out * entry.yield_factor;
    }
}

/// First-order loss fluxes [g/s] for one chemical in one compartment.
fn first_order_fluxes(
    props: &ChemicalProperties,
    cchem: f64,
    volume: f64,
    phases: &crate::partition::PhaseDistribution,
    compartment: Compartment,
    light_factor: f64,
) -> ReactionFluxes {
    let mut flux = ReactionFluxes::default();
    let mass_rate = cchem * volume; // g, scaled by 1/s rates below

    if let Some(rates) = &props.biodegradation {
        // biodegradation acts on the dissolved plus bound phases
        flux.biodegradation_out = rate_of(rates, compartment) * phases.mobile() * mass_rate;
    }
    if let Some(p) = &props.hydrolysis {
        flux.hydrolysis_out = first_order(p, compartment, phases, mass_rate);
    }
    if let Some(p) = &props.oxidation {
        flux.oxidation_out = first_order(p, compartment, phases, mass_rate);
    }
    if let Some(p) = &props.photolysis {
        flux.photolysis_out = first_order(p, compartment, phases, mass_rate) * light_factor;
    }
    if let Some(p) = &props.radioactive {
        flux.radioactive_out = first_order(p, compartment, phases, mass_rate);
    }
    if let Some(p) = &props.volatilization {
        // volatilization only escapes from the water column
        if matches!(
            compartment,
            Compartment::OverlandWater | Compartment::ChannelWater
        ) {
            flux.volatilization_out = first_order(p, compartment, phases, mass_rate);
        }
    }
    if let Some(p) = &props.user_reaction {
        flux.user_defined_out = first_order(p, compartment, phases, mass_rate);
    }
    flux
}

fn first_order(
    p: &FirstOrderParams,
    compartment: Compartment,
    phases: &crate::partition::PhaseDistribution,
    mass_rate: f64,
) -> f64 {
    let phase_factor = match p.phases {
        PhaseSubset::Dissolved => phases.dissolved,
        PhaseSubset::Mobile => phases.mobile(),
        PhaseSubset::Total => 1.0,
    };
    rate_of(&p.rates, compartment) * phase_factor * mass_rate
}

/// Scale every outflux so the total potential over one step does not
/// exceed the available mass.  Returns true when the limiter fired.
fn limit_fluxes(flux: &mut ReactionFluxes, available: f64, dt: f64) -> bool {
    let total_out = flux.total_out();
    let potential = total_out * dt;
    if potential <= available || total_out <= 0.0 {
        return false;
    }
    let scale = available / potential;
    flux.biodegradation_out *= scale;
    flux.hydrolysis_out *= scale;
    flux.oxidation_out *= scale;
    flux.photolysis_out *= scale;
    flux.radioactive_out *= scale;
    flux.volatilization_out *= scale;
    flux.user_defined_out *= scale;
    true
}

/// The outflux of one process channel, for yield scheduling.
fn process_outflux(flux: &ReactionFluxes, process: Process) -> f64 {
    match process {
        Process::Biodegradation => flux.biodegradation_out,
        Process::Hydrolysis => flux.hydrolysis_out,
        Process::Oxidation => flux.oxidation_out,
        Process::Photolysis => flux.photolysis_out,
        Process::Radioactive => flux.radioactive_out,
        Process::Volatilization => flux.volatilization_out,
        Process::UserDefined => flux.user_defined_out,
        Process::Dissolution => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::DissolutionParams;
    use crate::stack::{MaterialStack, SoilLayer};
    use crate::store::WaterColumn;

    fn column(nsolids: usize, nchems: usize) -> ColumnState {
        let layer = SoilLayer {
            volume: 1.0,
            new_volume: 1.0,
            thickness: 0.1,
            elevation: 0.0,
            area: 10.0,
            bottom_width: 0.0,
            min_volume: 0.1,
            max_volume: 1.5,
            soil_type: 0,
            csed: vec![0.0; nsolids],
            csed_new: vec![0.0; nsolids],
            cchem: vec![0.0; nchems],
            cchem_new: vec![0.0; nchems],
        };
        let mut water = WaterColumn::new(0.1, nsolids, nchems);
        water.depth_new = 0.1;
        ColumnState::new(water, MaterialStack::new(vec![layer], 3), nsolids, nchems)
    }

    #[test]
    fn attenuation_factor_limits() {
        assert!((light_attenuation(0.0, 1.0) - 1.0).abs() < 1e-12);
        // deep, murky water transmits little light
        assert!(light_attenuation(10.0, 10.0) < 0.011);
    }

    #[test]
    fn radioactive_decay_is_first_order_on_total_mass() {
        let mut chem = ChemicalProperties::inert("cs137");
        chem.radioactive = Some(FirstOrderParams {
            rates: CompartmentRates::uniform(1.0e-6),
            phases: PhaseSubset::Total,
        });
        let chems = vec![chem];

        let mut state = column(1, 1);
        state.water.cchem[0] = 10.0;
        state.water.cchem_new[0] = 10.0;

        let mut diag = LimiterDiagnostics::default();
        compute_column_reactions(
            &chems,
            &[],
            &[],
            &mut state,
            100.0,
            100.0,
            false,
            1.0,
            &mut diag,
        );
        // k * c * V = 1e-6 * 10 * 100
        assert!((state.transport.chems[0].rxn_water.radioactive_out - 1.0e-3).abs() < 1e-15);
        assert_eq!(diag.water_hits, 0);
    }

    #[test]
    fn limiter_scales_competing_outfluxes_proportionally() {
        let mut chem = ChemicalProperties::inert("x");
        chem.radioactive = Some(FirstOrderParams {
            rates: CompartmentRates::uniform(1.0),
            phases: PhaseSubset::Total,
        });
        chem.hydrolysis = Some(FirstOrderParams {
            rates: CompartmentRates::uniform(3.0),
            phases: PhaseSubset::Total,
        });
        let chems = vec![chem];

        let mut state = column(1, 1);
        state.water.cchem[0] = 1.0;
        state.water.cchem_new[0] = 1.0;

        let mut diag = LimiterDiagnostics::default();
        compute_column_reactions(
            &chems,
            &[],
            &[],
            &mut state,
            1.0,
            1.0,
            false,
            10.0,
            &mut diag,
        );
        let f = &state.transport.chems[0].rxn_water;
        // unlimited potential would be 4 g/s * 10 s = 40 g against 1 g
        assert_eq!(diag.water_hits, 1);
        assert!((f.total_out() * 10.0 - 1.0).abs() < 1e-12);
        // 1:3 split preserved
        assert!((f.hydrolysis_out / f.radioactive_out - 3.0).abs() < 1e-9);
    }

    #[test]
    fn dissolution_flux_approaches_solubility() {
        let mut chem = ChemicalProperties::inert("salt");
        chem.dissolution = Some(DissolutionParams {
            k_water: 1.0e-7,
            k_bed: 0.0,
            solubility: 5.0,
        });
        let chems = vec![chem];
        let solids = vec![SolidsProperties {
            name: "grain".into(),
            diameter: 100.0e-6,
            specific_gravity: 2.65,
        }];
        let yields = vec![YieldEntry {
            from: 0,
            to: 0,
            process: Process::Dissolution,
            yield_factor: 1.0,
        }];

        let mut state = column(1, 1);
        state.water.csed[0] = 1000.0;
        state.water.csed_new[0] = 1000.0;

        let mut diag = LimiterDiagnostics::default();
        compute_column_reactions(
            &chems,
            &solids,
            &yields,
            &mut state,
            1.0,
            1.0,
            false,
            1.0,
            &mut diag,
        );
        let alpha = 6.0 * 1000.0 * 1.0 / (100.0e-6 * 2.65 * 1000.0);
        let expected = 1.0e-7 * alpha * 5.0;
        assert!(
            (state.transport.solids[0].dissolution_water - expected).abs() < 1e-12 * expected
        );
        assert!(
            (state.transport.chems[0].rxn_water.dissolution_in - expected).abs()
                < 1e-12 * expected
        );
        // the dissolved solids leave the solids state
        assert!(state.water.csed_new[0] < 1000.0);
    }

    #[test]
    fn yields_route_limited_outflux_to_product() {
        let mut parent = ChemicalProperties::inert("parent");
        parent.radioactive = Some(FirstOrderParams {
            rates: CompartmentRates::uniform(1.0e-3),
            phases: PhaseSubset::Total,
        });
        let child = ChemicalProperties::inert("child");
        let chems = vec![parent, child];
        let yields = vec![YieldEntry {
            from: 0,
            to: 1,
            process: Process::Radioactive,
            yield_factor: 0.5,
        }];

        let mut state = column(1, 2);
        state.water.cchem[0] = 2.0;
        state.water.cchem_new[0] = 2.0;

        let mut diag = LimiterDiagnostics::default();
        compute_column_reactions(
            &chems,
            &[],
            &yields,
            &mut state,
            10.0,
            10.0,
            false,
            1.0,
            &mut diag,
        );
        let parent_out = state.transport.chems[0].rxn_water.radioactive_out;
        assert!((parent_out - 1.0e-3 * 2.0 * 10.0).abs() < 1e-15);
        assert!(
            (state.transport.chems[1].rxn_water.yield_in - 0.5 * parent_out).abs() < 1e-15
        );
    }
}
