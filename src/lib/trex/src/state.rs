use tracing::warn;

use crate::error::{Location, Result, SimulationError};
use crate::ledger::{BurialLedger, MassSnapshot, SOURCE_LOAD, SOURCE_OUTLET};
use crate::stack::{StackChange, StackOptions};
use crate::store::ColumnState;
use crate::Simulation;

impl Simulation {
    /// Integrate the reaction fluxes into the post-transport estimates.
    /// This is the final contribution to the "new" concentrations before
    /// they are committed.
    pub(crate) fn integrate_reactions(&mut self) {
        let dt = self.dt;
        for idx in 0..self.cells.len() {
            let volume_new = self.cells[idx].water_volume_new();
            integrate_column_reactions(&mut self.cells[idx].state, volume_new, dt);
        }
        for idx in 0..self.nodes.len() {
            let (link, node) = (self.nodes[idx].link, self.nodes[idx].node);
            let geometry = self.network.node(link, node).expect("geometry exists");
            let volume_new = geometry.water_volume(self.nodes[idx].state.transport.depth_new);
            integrate_column_reactions(&mut self.nodes[idx].state, volume_new, dt);
        }
    }

    /// Accumulate this step's fluxes into the cumulative mass registers,
    /// the per-outlet registers, and the concentration extrema.
    pub(crate) fn update_ledgers(&mut self) {
        let dt = self.dt;
        let simtime = self.simtime;

        for cell in &mut self.cells {
            tally_column(&mut cell.state, dt);
        }
        for nd in &mut self.nodes {
            tally_column(&mut nd.state, dt);
        }

        // per-outlet export registers and peaks
        for (iout, outlet) in self.outlets.iter().enumerate() {
            let Some(&idx) = self.cell_index.get(&(outlet.row, outlet.col)) else {
                continue;
            };
            // overland export through the outlet cell
            for ichem in 0..self.chems.len() {
                let fx = &self.cells[idx].state.transport.chems[ichem];
                let reg = &mut self.outlet_registers[iout][ichem];
                reg.advection.credit_out(fx.adv_out[SOURCE_OUTLET] * dt / 1000.0);
                reg.advection.credit_in(fx.adv_in[SOURCE_OUTLET] * dt / 1000.0);
                reg.dispersion
                    .credit_out(fx.dsp_out[SOURCE_OUTLET] * dt / 1000.0);
                reg.dispersion
                    .credit_in(fx.dsp_in[SOURCE_OUTLET] * dt / 1000.0);
                reg.observe_flux(fx.adv_out[SOURCE_OUTLET], simtime);
            }
            // channel export through the exit node resident in the outlet
            // cell (dispersion exits are tallied whenever channels are
            // simulated)
            if let Some((link, node)) = self.mask.channel_at(outlet.row, outlet.col) {
                if let Some(&nidx) = self.node_index.get(&(link, node)) {
                    for ichem in 0..self.chems.len() {
                        let fx = &self.nodes[nidx].state.transport.chems[ichem];
                        let reg = &mut self.outlet_registers[iout][ichem];
                        reg.advection.credit_out(fx.adv_out[SOURCE_OUTLET] * dt / 1000.0);
                        reg.advection.credit_in(fx.adv_in[SOURCE_OUTLET] * dt / 1000.0);
                        reg.dispersion
                            .credit_out(fx.dsp_out[SOURCE_OUTLET] * dt / 1000.0);
                        reg.dispersion
                            .credit_in(fx.dsp_in[SOURCE_OUTLET] * dt / 1000.0);
                        reg.observe_flux(fx.adv_out[SOURCE_OUTLET], simtime);
                    }
                }
            }
        }

        // concentration extrema per compartment
        for ichem in 0..self.chems.len() {
            for cell in &self.cells {
                self.extrema_overland[ichem].observe_water(cell.state.water.cchem_new[ichem]);
                self.extrema_overland[ichem]
                    .observe_bed(cell.state.stack.surface().cchem_new[ichem]);
            }
            for nd in &self.nodes {
                self.extrema_channel[ichem].observe_water(nd.state.water.cchem_new[ichem]);
                self.extrema_channel[ichem]
                    .observe_bed(nd.state.stack.surface().cchem_new[ichem]);
            }
        }
    }

    /// Commit the "new" state into "current" and apply the stack
    /// mutations.  This is the sole committing write of a step and the
    /// sole structural mutation.
    pub(crate) fn advance_state(&mut self) -> Result<()> {
        let simtime = self.simtime;
        let options = self.stack_options;

        // overland commit, then pop before push
        for idx in 0..self.cells.len() {
            commit_column(&mut self.cells[idx].state);
            let location = Location::Cell {
                row: self.cells[idx].row,
                col: self.cells[idx].col,
            };
            let change =
                mutate_stack(&mut self.cells[idx].state, &options, location, simtime)?;
            if change != StackChange::None {
                // the ground surface follows the stack surface
                self.cells[idx].ground_elevation =
                    self.cells[idx].state.stack.surface_elevation();
            }
        }

        // channel commit, pop before push, then bank geometry consistency
        for idx in 0..self.nodes.len() {
            commit_column(&mut self.nodes[idx].state);
            let (link, node) = (self.nodes[idx].link, self.nodes[idx].node);
            let location = Location::Node { link, node };
            let change =
                mutate_stack(&mut self.nodes[idx].state, &options, location, simtime)?;
            if change != StackChange::None {
                let bed_elevation = self.nodes[idx].state.stack.surface_elevation();
                let (row, col) = self
                    .network
                    .cell_of(link, node)
                    .expect("node is hosted by a cell");
                let host = self.cell_index.get(&(row, col)).copied();
                let overland_elevation = host
                    .map(|h| self.cells[h].ground_elevation)
                    .unwrap_or(bed_elevation);

                let geometry = self
                    .network
                    .node_mut(link, node)
                    .expect("geometry exists");
                geometry.bed_elevation = bed_elevation;
                // surface layer width follows the stack
                geometry.bottom_width = self.nodes[idx].state.stack.surface().bottom_width;
                geometry.update_bank_geometry(overland_elevation);
                if geometry.bank_height <= 0.0 {
                    return Err(SimulationError::GeometryInvalid {
                        location,
                        simtime,
                        bank_height: geometry.bank_height,
                    });
                }
            }
        }

        Ok(())
    }

    /// Whole-domain mass per chemical [kg], split by compartment.
    pub fn mass_snapshot(&self) -> Vec<MassSnapshot> {
        let mut snap = vec![MassSnapshot::default(); self.chems.len()];
        for cell in &self.cells {
            let volume = cell.water_volume();
            for ichem in 0..self.chems.len() {
                snap[ichem].overland_water += cell.state.water.cchem[ichem] * volume / 1000.0;
                for layer in cell.state.stack.layers() {
                    snap[ichem].overland_bed += layer.cchem[ichem] * layer.volume / 1000.0;
                }
            }
        }
        for nd in &self.nodes {
            let geometry = self
                .network
                .node(nd.link, nd.node)
                .expect("geometry exists");
            let volume = geometry.water_volume(nd.state.water.depth);
            for ichem in 0..self.chems.len() {
                snap[ichem].channel_water += nd.state.water.cchem[ichem] * volume / 1000.0;
                for layer in nd.state.stack.layers() {
                    snap[ichem].channel_bed += layer.cchem[ichem] * layer.volume / 1000.0;
                }
            }
        }
        snap
    }

    /// Domain ingress this far [kg] per chemical: external loads, boundary
    /// inflows, and reaction gains (dissolution and yields).
    pub fn ingress(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.chems.len()];
        for state in self.iter_states() {
            for (ichem, t) in total.iter_mut().enumerate() {
                let led = &state.chem_ledger[ichem];
                *t += led.advection[SOURCE_LOAD].in_kg
                    + led.advection[SOURCE_OUTLET].in_kg
                    + led.dispersion[SOURCE_OUTLET].in_kg
                    + led.reactions.dissolution.water.in_kg
                    + led.reactions.dissolution.bed.in_kg
                    + led.reactions.yield_gain.water.in_kg
                    + led.reactions.yield_gain.bed.in_kg;
            }
        }
        total
    }

    /// Domain egress this far [kg] per chemical: boundary exports and
    /// reaction losses.
    pub fn egress(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.chems.len()];
        for state in self.iter_states() {
            for (ichem, t) in total.iter_mut().enumerate() {
                let led = &state.chem_ledger[ichem];
                *t += led.advection[SOURCE_OUTLET].out_kg + led.dispersion[SOURCE_OUTLET].out_kg;
                for tally in [
                    &led.reactions.biodegradation,
                    &led.reactions.hydrolysis,
                    &led.reactions.oxidation,
                    &led.reactions.photolysis,
                    &led.reactions.radioactive,
                    &led.reactions.volatilization,
                    &led.reactions.user_defined,
                ] {
                    *t += tally.water.out_kg + tally.bed.out_kg;
                }
            }
        }
        total
    }

    fn iter_states(&self) -> impl Iterator<Item = &ColumnState> {
        self.cells
            .iter()
            .map(|c| &c.state)
            .chain(self.nodes.iter().map(|n| &n.state))
    }
}

/// Add the reaction fluxes to the post-transport estimates of one column.
fn integrate_column_reactions(state: &mut ColumnState, water_volume_new: f64, dt: f64) {
    let bed_volume_new = state.stack.surface().new_volume;
    for ichem in 0..state.water.cchem.len() {
        let fx = &state.transport.chems[ichem];
        let net_water = (fx.rxn_water.total_in() - fx.rxn_water.total_out()) * dt;
        let net_bed = (fx.rxn_bed.total_in() - fx.rxn_bed.total_out()) * dt;
        if water_volume_new > 0.0 {
            state.water.cchem_new[ichem] =
                (state.water.cchem_new[ichem] + net_water / water_volume_new).max(0.0);
        }
        if bed_volume_new > 0.0 {
            let c = state.stack.surface().cchem_new[ichem];
            state.stack.surface_mut().cchem_new[ichem] =
                (c + net_bed / bed_volume_new).max(0.0);
        }
    }
}

/// Fold one step's fluxes into the cumulative per-column registers.
fn tally_column(state: &mut ColumnState, dt: f64) {
    let kg = |flux: f64| flux * dt / 1000.0;

    for (isolid, fx) in state.transport.solids.iter().enumerate() {
        let led = &mut state.solids_ledger[isolid];
        for source in 0..fx.adv_in.len() {
            led.advection[source].credit_in(kg(fx.adv_in[source]));
            led.advection[source].credit_out(kg(fx.adv_out[source]));
            led.dispersion[source].credit_in(kg(fx.dsp_in[source]));
            led.dispersion[source].credit_out(kg(fx.dsp_out[source]));
        }
        led.deposition.credit_out(kg(fx.deposition));
        led.deposition.credit_in(kg(fx.deposition));
        led.erosion.credit_out(kg(fx.erosion));
        led.erosion.credit_in(kg(fx.erosion));
        led.dissolution.water.credit_out(kg(fx.dissolution_water));
        led.dissolution.bed.credit_out(kg(fx.dissolution_bed));
    }

    for (ichem, fx) in state.transport.chems.iter().enumerate() {
        let led = &mut state.chem_ledger[ichem];
        for source in 0..fx.adv_in.len() {
            led.advection[source].credit_in(kg(fx.adv_in[source]));
            led.advection[source].credit_out(kg(fx.adv_out[source]));
            led.dispersion[source].credit_in(kg(fx.dsp_in[source]));
            led.dispersion[source].credit_out(kg(fx.dsp_out[source]));
        }
        led.deposition.credit_out(kg(fx.deposition));
        led.deposition.credit_in(kg(fx.deposition));
        led.erosion.credit_out(kg(fx.erosion));
        led.erosion.credit_in(kg(fx.erosion));
        led.porewater.credit_out(kg(fx.porewater));
        led.porewater.credit_in(kg(fx.porewater));
        led.infiltration.credit_out(kg(fx.infiltration));
        led.infiltration.credit_in(kg(fx.infiltration));

        let r = &mut led.reactions;
        r.biodegradation.water.credit_out(kg(fx.rxn_water.biodegradation_out));
        r.biodegradation.bed.credit_out(kg(fx.rxn_bed.biodegradation_out));
        r.hydrolysis.water.credit_out(kg(fx.rxn_water.hydrolysis_out));
        r.hydrolysis.bed.credit_out(kg(fx.rxn_bed.hydrolysis_out));
        r.oxidation.water.credit_out(kg(fx.rxn_water.oxidation_out));
        r.oxidation.bed.credit_out(kg(fx.rxn_bed.oxidation_out));
        r.photolysis.water.credit_out(kg(fx.rxn_water.photolysis_out));
        r.photolysis.bed.credit_out(kg(fx.rxn_bed.photolysis_out));
        r.radioactive.water.credit_out(kg(fx.rxn_water.radioactive_out));
        r.radioactive.bed.credit_out(kg(fx.rxn_bed.radioactive_out));
        r.volatilization
            .water
            .credit_out(kg(fx.rxn_water.volatilization_out));
        r.volatilization.bed.credit_out(kg(fx.rxn_bed.volatilization_out));
        r.user_defined.water.credit_out(kg(fx.rxn_water.user_defined_out));
        r.user_defined.bed.credit_out(kg(fx.rxn_bed.user_defined_out));
        r.dissolution.water.credit_in(kg(fx.rxn_water.dissolution_in));
        r.dissolution.bed.credit_in(kg(fx.rxn_bed.dissolution_in));
        r.yield_gain.water.credit_in(kg(fx.rxn_water.yield_in));
        r.yield_gain.bed.credit_in(kg(fx.rxn_bed.yield_in));
    }
}

/// Commit new water depths, concentrations, and the surface-layer volume
/// for one column.
fn commit_column(state: &mut ColumnState) {
    state.water.depth_new = state.transport.depth_new;
    state.water.depth = state.water.depth_new;
    state.water.csed.clone_from(&state.water.csed_new);
    state.water.cchem.clone_from(&state.water.cchem_new);

    let surface = state.stack.surface_mut();
    surface.volume = surface.new_volume;
    surface.thickness = surface.volume / surface.area;
    surface.csed.clone_from(&surface.csed_new);
    surface.cchem.clone_from(&surface.cchem_new);
}

/// Dispatch pop (first) and push for one stack, with ledger accounting.
fn mutate_stack(
    state: &mut ColumnState,
    options: &StackOptions,
    location: Location,
    simtime: f64,
) -> Result<StackChange> {
    let mut ledger = BurialLedger {
        solids: &mut state.solids_ledger,
        chems: &mut state.chem_ledger,
    };

    // pop before push; a cell may do both in one step
    let popped = state.stack.try_pop(&mut ledger);

    match state.stack.try_push(options, &mut ledger) {
        Ok(StackChange::None) => Ok(popped),
        Ok(pushed) => {
            if let StackChange::Pushed { collapsed: true, .. } = pushed {
                warn!(%location, simtime, "stack collapse: bottom layers merged");
            }
            Ok(pushed)
        }
        Err(_) => Err(SimulationError::StackFull {
            location,
            simtime,
            max_stack: state.stack.max_stack(),
        }),
    }
}
