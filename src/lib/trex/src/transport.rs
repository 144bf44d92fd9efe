use crate::chem::SolidsProperties;
use crate::ledger::{NSOURCES, SOURCE_LOAD, SOURCE_OUTLET};
use crate::store::ColumnState;
use crate::timefunc::TimeFunction;
use crate::Simulation;

/// Density of water [g/m³] used for solids volume bookkeeping.
const DENSITY_WATER_G_M3: f64 = 1.0e6;

/// Source index for the overland/channel floodplain exchange.
pub const SOURCE_EXCHANGE: usize = 9;

/// How an external load series is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadUnits {
    /// Series value is a mass rate [kg/day]
    KgPerDay,
    /// Series value is a concentration [g/m³] applied to the concurrent
    /// external inflow
    Concentration,
}

/// Where an external chemical load is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadTarget {
    /// Point load at one overland cell
    Cell { row: usize, col: usize },
    /// Distributed (per-area) load at one overland cell
    CellDistributed { row: usize, col: usize },
    /// Load at one channel node
    Node { link: usize, node: usize },
}

/// One external chemical forcing load.
#[derive(Clone, Debug)]
pub struct ChemicalLoad {
    pub chem: usize,
    pub target: LoadTarget,
    pub units: LoadUnits,
    pub series: TimeFunction,
}

impl ChemicalLoad {
    /// Convert the interpolated series value to a mass rate [g/s].
    fn mass_rate(&self, value: f64, inflow: f64, area: f64) -> f64 {
        let base = match self.units {
            // kg/day -> g/s
            LoadUnits::KgPerDay => value * 1000.0 / 86400.0,
            // g/m³ on the concurrent external inflow [m³/s]
            LoadUnits::Concentration => value * inflow,
        };
        match self.target {
            LoadTarget::CellDistributed { .. } => base * area,
            _ => base,
        }
    }
}

/// A domain outlet: the cell water leaves through, optionally with
/// chemical boundary concentrations that override the outgoing advective
/// concentration.
#[derive(Clone, Debug)]
pub struct Outlet {
    pub row: usize,
    pub col: usize,
    /// Per-chemical boundary concentration series [g/m³]
    pub boundary: Option<Vec<TimeFunction>>,
}

impl Outlet {
    /// Boundary concentration for chemical `chem` at `simtime`, when one
    /// is specified.
    pub fn boundary_concentration(&self, chem: usize, simtime: f64) -> Option<f64> {
        self.boundary
            .as_ref()
            .and_then(|series| series.get(chem))
            .map(|f| f.value(simtime))
    }
}

/// Offsets for overland flow sources 1..=8 (N, NE, E, SE, S, SW, W, NW).
const DIRECTIONS: [(isize, isize); 8] = [
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
];

impl Simulation {
    /// Compose transport fluxes for the current step and produce the
    /// post-transport "new" concentration estimates the reaction kernel
    /// reads.  Water and solids fluxes are external inputs already written
    /// into the per-column transport registers; chemical fluxes are
    /// assembled here.
    pub(crate) fn transport_step(&mut self) {
        let simtime = self.simtime;
        let dt = self.dt;

        // advance load and boundary-condition series
        for load in &mut self.loads {
            load.series.refresh(simtime);
        }
        for outlet in &mut self.outlets {
            if let Some(series) = &mut outlet.boundary {
                for f in series.iter_mut() {
                    f.refresh(simtime);
                }
            }
        }

        // water-column chemical snapshot for donor lookups
        let cell_chem: Vec<Vec<f64>> = self
            .cells
            .iter()
            .map(|c| c.state.water.cchem.clone())
            .collect();
        let node_chem: Vec<Vec<f64>> = self
            .nodes
            .iter()
            .map(|n| n.state.water.cchem.clone())
            .collect();

        for idx in 0..self.cells.len() {
            // donor concentrations per source, resolved before mutation
            let mut donors: Vec<Option<Vec<f64>>> = vec![None; NSOURCES];
            for (source, donor) in donors.iter_mut().enumerate() {
                *donor = self.overland_donor_chem(idx, source, &cell_chem, &node_chem);
            }

            let cell = &self.cells[idx];
            let ground_area = cell.ground_area;
            let volume = cell.water_volume();
            let volume_new = ground_area * cell.state.transport.depth_new;

            let load_rates = self.cell_load_rates(idx, simtime);
            let bc = self.cell_boundary(idx, simtime);

            let porosities: &[f64] = &self.soil_porosities;
            let solids_props = &self.solids_props;
            assemble_column(
                &mut self.cells[idx].state,
                &donors,
                &load_rates,
                &bc,
                volume,
                volume_new,
                ground_area,
                solids_props,
                porosities,
                dt,
            );
        }

        for idx in 0..self.nodes.len() {
            let mut donors: Vec<Option<Vec<f64>>> = vec![None; NSOURCES];
            for (source, donor) in donors.iter_mut().enumerate() {
                *donor = self.channel_donor_chem(idx, source, &cell_chem, &node_chem);
            }

            let (link, node) = (self.nodes[idx].link, self.nodes[idx].node);
            let geometry = self
                .network
                .node(link, node)
                .expect("node state always has geometry")
                .clone();
            let volume = geometry.water_volume(self.nodes[idx].state.water.depth);
            let volume_new = geometry.water_volume(self.nodes[idx].state.transport.depth_new);

            let load_rates = self.node_load_rates(idx, &geometry, simtime);
            let bc = self.node_boundary(idx, simtime);

            let porosities: &[f64] = &self.soil_porosities;
            let solids_props = &self.solids_props;
            let bed_area = geometry.bottom_width * geometry.length;
            assemble_column(
                &mut self.nodes[idx].state,
                &donors,
                &load_rates,
                &bc,
                volume,
                volume_new,
                bed_area,
                solids_props,
                porosities,
                dt,
            );
        }
    }

    /// Donor water-column chemical concentrations for an overland source.
    fn overland_donor_chem(
        &self,
        idx: usize,
        source: usize,
        cell_chem: &[Vec<f64>],
        node_chem: &[Vec<f64>],
    ) -> Option<Vec<f64>> {
        let cell = &self.cells[idx];
        if (1..=8).contains(&source) {
            let (dr, dc) = DIRECTIONS[source - 1];
            let row = cell.row.checked_add_signed(dr)?;
            let col = cell.col.checked_add_signed(dc)?;
            let donor = *self.cell_index.get(&(row, col))?;
            Some(cell_chem[donor].clone())
        } else if source == SOURCE_EXCHANGE {
            let (link, node) = self.mask.channel_at(cell.row, cell.col)?;
            let donor = *self.node_index.get(&(link, node))?;
            Some(node_chem[donor].clone())
        } else {
            None
        }
    }

    /// Donor water-column chemical concentrations for a channel source:
    /// 1 = upstream node, 2 = downstream node, 9 = host overland cell.
    fn channel_donor_chem(
        &self,
        idx: usize,
        source: usize,
        cell_chem: &[Vec<f64>],
        node_chem: &[Vec<f64>],
    ) -> Option<Vec<f64>> {
        let nd = &self.nodes[idx];
        match source {
            1 if nd.node > 0 => {
                let donor = *self.node_index.get(&(nd.link, nd.node - 1))?;
                Some(node_chem[donor].clone())
            }
            2 => {
                let donor = *self.node_index.get(&(nd.link, nd.node + 1))?;
                Some(node_chem[donor].clone())
            }
            SOURCE_EXCHANGE => {
                let (row, col) = self.network.cell_of(nd.link, nd.node)?;
                let donor = *self.cell_index.get(&(row, col))?;
                Some(cell_chem[donor].clone())
            }
            _ => None,
        }
    }

    /// External load mass rates [g/s] landing on one overland cell.
    fn cell_load_rates(&self, idx: usize, simtime: f64) -> Vec<f64> {
        let cell = &self.cells[idx];
        let mut rates = vec![0.0; self.chems.len()];
        for load in &self.loads {
            let applies = match load.target {
                LoadTarget::Cell { row, col } | LoadTarget::CellDistributed { row, col } => {
                    row == cell.row && col == cell.col
                }
                LoadTarget::Node { .. } => false,
            };
            if applies {
                let inflow = cell.state.transport.flow_in[SOURCE_LOAD];
                rates[load.chem] +=
                    load.mass_rate(load.series.value(simtime), inflow, cell.ground_area);
            }
        }
        rates
    }

    /// External load mass rates [g/s] landing on one channel node.
    fn node_load_rates(
        &self,
        idx: usize,
        geometry: &crate::channel::NodeGeometry,
        simtime: f64,
    ) -> Vec<f64> {
        let nd = &self.nodes[idx];
        let mut rates = vec![0.0; self.chems.len()];
        for load in &self.loads {
            if let LoadTarget::Node { link, node } = load.target {
                if link == nd.link && node == nd.node {
                    let inflow = nd.state.transport.flow_in[SOURCE_LOAD];
                    rates[load.chem] += load.mass_rate(
                        load.series.value(simtime),
                        inflow,
                        geometry.surface_area(),
                    );
                }
            }
        }
        rates
    }

    /// Per-chemical outlet boundary concentrations for an overland cell,
    /// None when the cell is not an outlet or carries no BC.
    fn cell_boundary(&self, idx: usize, simtime: f64) -> Vec<Option<f64>> {
        let cell = &self.cells[idx];
        let outlet = self
            .outlets
            .iter()
            .find(|o| o.row == cell.row && o.col == cell.col);
        (0..self.chems.len())
            .map(|ichem| outlet.and_then(|o| o.boundary_concentration(ichem, simtime)))
            .collect()
    }

    /// Outlet boundary concentrations for a channel node (the last node of
    /// an outlet link exports through the outlet cell's BC).
    fn node_boundary(&self, idx: usize, simtime: f64) -> Vec<Option<f64>> {
        let nd = &self.nodes[idx];
        let is_exit = self.network.outlet_of_link(nd.link).is_some()
            && nd.node + 1 == self.network.nnodes(nd.link);
        if !is_exit {
            return vec![None; self.chems.len()];
        }
        let host = self.network.cell_of(nd.link, nd.node);
        let outlet = host.and_then(|(row, col)| {
            self.outlets
                .iter()
                .find(|o| o.row == row && o.col == col)
        });
        (0..self.chems.len())
            .map(|ichem| outlet.and_then(|o| o.boundary_concentration(ichem, simtime)))
            .collect()
    }
}

/// Assemble the chemical fluxes of one column and integrate the
/// post-transport estimates for solids and chemicals.
#[allow(clippy::too_many_arguments)]
fn assemble_column(
    state: &mut ColumnState,
    donors: &[Option<Vec<f64>>],
    load_rates: &[f64],
    outlet_bc: &[Option<f64>],
    volume: f64,
    volume_new: f64,
    plan_area: f64,
    solids_props: &[SolidsProperties],
    soil_porosities: &[f64],
    dt: f64,
) {
    state.transport.clear_chem_fluxes();
    let nsolids = state.water.csed.len();
    let nchems = state.water.cchem.len();
    let surface = state.stack.surface_slot();

    // --- Solids: limit outfluxes, integrate the water column estimate ---
    for s in 0..nsolids {
        let available = (state.water.csed[s] * volume).max(0.0);
        let bed_available = (state.stack.surface().csed[s] * state.stack.surface().volume).max(0.0);
        let fx = &mut state.transport.solids[s];

        // outfluxes are limited to the mass present at step start
        let total_out: f64 =
            fx.adv_out.iter().sum::<f64>() + fx.dsp_out.iter().sum::<f64>() + fx.deposition;
        if total_out * dt > available && total_out > 0.0 {
            let scale = available / (total_out * dt);
            for v in fx.adv_out.iter_mut() {
                *v *= scale;
            }
            for v in fx.dsp_out.iter_mut() {
                *v *= scale;
            }
            fx.deposition *= scale;
        }

        // bed erosion outflux limited to surface-layer mass
        if fx.erosion * dt > bed_available && fx.erosion > 0.0 {
            fx.erosion = bed_available / dt;
        }

        let influx: f64 =
            fx.adv_in.iter().sum::<f64>() + fx.dsp_in.iter().sum::<f64>() + fx.erosion;
        let outflux: f64 =
            fx.adv_out.iter().sum::<f64>() + fx.dsp_out.iter().sum::<f64>() + fx.deposition;
        let new_mass = (state.water.csed[s] * volume + (influx - outflux) * dt).max(0.0);
        state.water.csed_new[s] = if volume_new > 0.0 {
            new_mass / volume_new
        } else {
            0.0
        };
    }

    // --- Bed surface layer: volume and solids updates from dep/erosion ---
    {
        let soil = state.stack.surface().soil_type;
        let porosity = soil_porosities.get(soil).copied().unwrap_or(0.0);
        let mut dvolume = 0.0;
        for s in 0..nsolids {
            let fx = &state.transport.solids[s];
            let grain_density = solids_props[s].specific_gravity * DENSITY_WATER_G_M3;
            // bulk bed volume per unit solids mass accounts for porosity
            let bulk = (1.0 - porosity) * grain_density;
            if bulk > 0.0 {
                dvolume += (fx.deposition - fx.erosion) * dt / bulk;
            }
        }
        let bed_volume = state.stack.surface().volume;
        let bed_volume_new = (bed_volume + dvolume).max(0.0);
        state.stack.surface_mut().new_volume = bed_volume_new;

        for s in 0..nsolids {
            let fx = &state.transport.solids[s];
            let mass =
                state.stack.surface().csed[s] * bed_volume + (fx.deposition - fx.erosion) * dt;
            state.stack.surface_mut().csed_new[s] = if bed_volume_new > 0.0 {
                (mass / bed_volume_new).max(0.0)
            } else {
                0.0
            };
        }
    }

    // --- Chemicals ---
    let bed_total_solids = state.stack.surface().total_solids();
    // eroded bulk volume rate [m³/s] for porewater release
    let eroded_volume_rate = if bed_total_solids > 0.0 {
        state
            .transport
            .solids
            .iter()
            .map(|fx| fx.erosion)
            .sum::<f64>()
            / bed_total_solids
    } else {
        0.0
    };

    for ichem in 0..nchems {
        let c_water = state.water.cchem[ichem];
        let c_bed = state.stack.surface().cchem[ichem];
        let phases_water = state.phases_water[ichem].clone();
        let phases_bed = state.phases_bed[surface][ichem].clone();

        let flow_in = state.transport.flow_in;
        let flow_out = state.transport.flow_out;
        let dsp_flow = state.transport.dsp_flow;
        let infiltration_rate = state.transport.infiltration_rate;

        // deposition and erosion ride the solids fluxes, weighted by the
        // particulate fraction of the carrier class
        let mut deposition = 0.0;
        let mut erosion = 0.0;
        for s in 0..nsolids {
            let sed = &state.transport.solids[s];
            let csed_water = state.water.csed[s];
            if csed_water > 0.0 {
                deposition += sed.deposition * phases_water.particulate[s] * c_water / csed_water;
            }
            let csed_bed = state.stack.surface().csed[s];
            if csed_bed > 0.0 {
                erosion += sed.erosion * phases_bed.particulate[s] * c_bed / csed_bed;
            }
        }

        let bed_volume = state.stack.surface().volume;
        let bed_volume_new = state.stack.surface().new_volume;

        let fx = &mut state.transport.chems[ichem];

        // advection and dispersion: all phases in the water column ride
        // the flow
        fx.adv_in[SOURCE_LOAD] = load_rates[ichem];
        for source in 1..NSOURCES {
            if let Some(donor_chem) = &donors[source] {
                fx.adv_in[source] = flow_in[source] * donor_chem[ichem];
                fx.dsp_in[source] = dsp_flow[source] * donor_chem[ichem];
            }
            let out_conc = if source == SOURCE_OUTLET {
                outlet_bc[ichem].unwrap_or(c_water)
            } else {
                c_water
            };
            fx.adv_out[source] = flow_out[source] * out_conc;
            fx.dsp_out[source] = dsp_flow[source] * c_water;
        }
        // boundary inflow carries the boundary concentration when one is
        // specified
        if let Some(cbc) = outlet_bc[ichem] {
            fx.adv_in[SOURCE_OUTLET] = flow_in[SOURCE_OUTLET] * cbc;
        }

        fx.deposition = deposition;
        fx.erosion = erosion;

        // porewater release carries mobile-phase bed chemical upward
        fx.porewater = eroded_volume_rate * c_bed * phases_bed.mobile();

        // infiltration carries mobile-phase water-column chemical downward
        fx.infiltration = infiltration_rate * plan_area * c_water * phases_water.mobile();

        // Limit water-column outfluxes to the mass present at step start.
        // A boundary-overridden outlet outflux is exempt: its mass is
        // prescribed at the domain edge, not drawn from the donor cell.
        let bc_present = outlet_bc[ichem].is_some();
        let available = (c_water * volume).max(0.0);
        let mut total_out: f64 = fx.dsp_out.iter().sum::<f64>() + fx.deposition + fx.infiltration;
        for (source, v) in fx.adv_out.iter().enumerate() {
            if !(bc_present && source == SOURCE_OUTLET) {
                total_out += *v;
            }
        }
        if total_out * dt > available && total_out > 0.0 {
            let scale = available / (total_out * dt);
            for (source, v) in fx.adv_out.iter_mut().enumerate() {
                if !(bc_present && source == SOURCE_OUTLET) {
                    *v *= scale;
                }
            }
            for v in fx.dsp_out.iter_mut() {
                *v *= scale;
            }
            fx.deposition *= scale;
            fx.infiltration *= scale;
        }

        // limit bed outfluxes to the surface-layer mass
        let bed_available = (c_bed * bed_volume).max(0.0);
        let bed_out = fx.erosion + fx.porewater;
        if bed_out * dt > bed_available && bed_out > 0.0 {
            let scale = bed_available / (bed_out * dt);
            fx.erosion *= scale;
            fx.porewater *= scale;
        }

        // post-transport estimates (reactions integrate on top of these)
        let influx: f64 = fx.adv_in.iter().sum::<f64>()
            + fx.dsp_in.iter().sum::<f64>()
            + fx.erosion
            + fx.porewater;
        let outflux: f64 = fx.adv_out.iter().sum::<f64>()
            + fx.dsp_out.iter().sum::<f64>()
            + fx.deposition
            + fx.infiltration;
        let new_water_mass = c_water * volume + (influx - outflux) * dt;
        let new_bed_mass =
            c_bed * bed_volume + (fx.deposition + fx.infiltration - fx.erosion - fx.porewater) * dt;

        state.water.cchem_new[ichem] = if volume_new > 0.0 {
            (new_water_mass / volume_new).max(0.0)
        } else {
            0.0
        };
        state.stack.surface_mut().cchem_new[ichem] = if bed_volume_new > 0.0 {
            (new_bed_mass / bed_volume_new).max(0.0)
        } else {
            0.0
        };
    }
}
