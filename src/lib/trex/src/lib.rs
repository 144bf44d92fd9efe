// UNIT SYSTEM: SI WATERSHED UNITS (CONSISTENT THROUGHOUT)
// =======================================================
// Simulation clock: hour (h); integration step: second (s)
// Distance: meter (m)
// Volume: cubic meter (m³)
// Flow: cubic meter per second (m³/s)
// Concentration: gram per cubic meter (g/m³) [equals mg/L]
// Mass fluxes: gram per second (g/s)
// Mass registers: kilogram (kg)
//
// CONVERSIONS USED:
// - flux [g/s] * dt [s] / 1000 -> register mass [kg]
// - kg/day load option -> g/s via * 1000 / 86400
// - All calculations stay in these base units with no hidden conversions

pub mod ascii_grid;
pub mod channel;
pub mod chem;
pub mod config;
pub mod environment;
pub mod error;
pub mod export;
pub mod grid;
pub mod kinetics;
pub mod ledger;
pub mod partition;
pub mod restart;
pub mod stack;
pub mod state;
pub mod store;
pub mod timefunc;
pub mod transport;

use std::collections::HashMap;

use tracing::{info, warn};

use crate::channel::{ChannelNetwork, NodeGeometry};
use crate::chem::{ChemicalProperties, SoilProperties, SolidsProperties, YieldEntry};
use crate::config::SimulationConfig;
use crate::environment::EnvironmentalForcing;
use crate::error::Result;
use crate::grid::{DomainMask, GridGeometry};
use crate::kinetics::LimiterDiagnostics;
use crate::ledger::{ConcentrationExtrema, MassBalance, MassSnapshot, OutletRegister};
use crate::partition::partition;
use crate::stack::{MaterialStack, SoilLayer, StackOptions};
use crate::store::{ChannelNode, ColumnState, ColumnTransport, OverlandCell, WaterColumn};
use crate::timefunc::TimeFunction;
use crate::transport::{ChemicalLoad, Outlet};

/// The complete live state of one watershed simulation.  Every array is
/// owned here; components receive references or indices, never copies.
pub struct Simulation {
    pub(crate) geometry: GridGeometry,
    pub(crate) mask: DomainMask,
    pub(crate) network: ChannelNetwork,
    pub(crate) cells: Vec<OverlandCell>,
    pub(crate) nodes: Vec<ChannelNode>,
    /// (row, col) -> index into `cells`
    pub(crate) cell_index: HashMap<(usize, usize), usize>,
    /// (link, node) -> index into `nodes`
    pub(crate) node_index: HashMap<(usize, usize), usize>,

    pub(crate) chems: Vec<ChemicalProperties>,
    pub(crate) solids_props: Vec<SolidsProperties>,
    pub(crate) soils: Vec<SoilProperties>,
    pub(crate) soil_porosities: Vec<f64>,
    pub(crate) yields: Vec<YieldEntry>,

    pub forcing: EnvironmentalForcing,
    pub(crate) loads: Vec<ChemicalLoad>,
    pub(crate) outlets: Vec<Outlet>,
    pub(crate) stack_options: StackOptions,

    /// Simulation clock [h]
    pub(crate) simtime: f64,
    /// Current integration step [s]
    pub(crate) dt: f64,
    schedule: Vec<config::DtBreak>,
    end_time: f64,
    steps: u64,

    pub(crate) outlet_registers: Vec<Vec<OutletRegister>>,
    pub(crate) extrema_overland: Vec<ConcentrationExtrema>,
    pub(crate) extrema_channel: Vec<ConcentrationExtrema>,
    pub(crate) limiter: LimiterDiagnostics,
    initial_mass: Vec<MassSnapshot>,
    dump_warned: bool,
    /// Monotone sequence number appended to grid snapshot files
    pub(crate) grid_sequence: u32,
}

impl Simulation {
    /// Build a simulation from a validated configuration.
    pub fn new(cfg: SimulationConfig) -> Result<Self> {
        cfg.validate()?;

        let geometry = cfg.geometry();
        let mut mask = DomainMask::new(cfg.mask_values());

        // channel network and reverse index maps
        let mut links = Vec::new();
        let mut outlet_of_link = Vec::new();
        if let Some(channel) = &cfg.channel {
            for link in &channel.links {
                let mut nodes = Vec::new();
                for nc in &link.nodes {
                    let ground = cfg.grid.elevation.at(nc.row, nc.col);
                    let bank_height = nc.bank_height;
                    nodes.push(NodeGeometry {
                        bottom_width: nc.bottom_width,
                        bank_height,
                        side_slope: 0.5 * (nc.top_width - nc.bottom_width) / bank_height,
                        length: nc.length,
                        top_width: nc.top_width,
                        bed_elevation: ground - bank_height,
                        row: nc.row,
                        col: nc.col,
                    });
                }
                links.push(nodes);
                outlet_of_link.push(link.outlet);
            }
        }
        let network = ChannelNetwork::new(links, outlet_of_link);
        for (l, n) in network.iter_nodes() {
            let g = network.node(l, n).expect("just iterated");
            mask.set_channel_at(g.row, g.col, l, n);
        }

        let nsolids = cfg.solids.len();
        let nchems = cfg.chemicals.len();
        let cell_area = geometry.cell_area();
        let options = cfg.stack.options();

        // overland cells
        let mut cells = Vec::new();
        let mut cell_index = HashMap::new();
        for (row, col) in mask.iter_domain().collect::<Vec<_>>() {
            let channel_surface = mask
                .channel_at(row, col)
                .and_then(|(l, n)| network.node(l, n))
                .map(|g| g.surface_area())
                .unwrap_or(0.0);
            let ground_area = (cell_area - channel_surface).max(0.0);
            let ground_elevation = cfg.grid.elevation.at(row, col);

            let stack = build_stack(
                &cfg.overland.layers,
                ground_area,
                0.0,
                ground_elevation,
                cfg.stack.max_stack,
                &options,
            );
            let mut water = WaterColumn::new(cfg.overland.initial_depth, nsolids, nchems);
            water.csed.clone_from(&cfg.overland.initial_csed);
            water.csed_new.clone_from(&cfg.overland.initial_csed);
            water.cchem.clone_from(&cfg.overland.initial_cchem);
            water.cchem_new.clone_from(&cfg.overland.initial_cchem);

            let mut state = ColumnState::new(water, stack, nsolids, nchems);
            apply_environment_defaults(&mut state, &cfg.environment);
            state.transport.depth_new = cfg.overland.initial_depth;

            cell_index.insert((row, col), cells.len());
            cells.push(OverlandCell {
                row,
                col,
                ground_elevation,
                ground_area,
                climate: cfg.environment.climate,
                state,
            });
        }

        // channel nodes
        let mut nodes = Vec::new();
        let mut node_index = HashMap::new();
        if let Some(channel) = &cfg.channel {
            for (l, n) in network.iter_nodes() {
                let g = network.node(l, n).expect("just iterated");
                let bed_area = g.bottom_width * g.length;
                let stack = build_stack(
                    &channel.layers,
                    bed_area,
                    g.bottom_width,
                    g.bed_elevation,
                    cfg.stack.max_stack,
                    &options,
                );
                let mut water = WaterColumn::new(channel.initial_depth, nsolids, nchems);
                water.csed.clone_from(&channel.initial_csed);
                water.csed_new.clone_from(&channel.initial_csed);
                water.cchem.clone_from(&channel.initial_cchem);
                water.cchem_new.clone_from(&channel.initial_cchem);

                let mut state = ColumnState::new(water, stack, nsolids, nchems);
                apply_environment_defaults(&mut state, &cfg.environment);
                state.transport.depth_new = channel.initial_depth;

                node_index.insert((l, n), nodes.len());
                nodes.push(ChannelNode {
                    link: l,
                    node: n,
                    state,
                });
            }
        }

        // forcing loads and outlet boundaries
        let mut loads = Vec::new();
        for lc in &cfg.loads {
            loads.push(ChemicalLoad {
                chem: lc.chem,
                target: lc.target.clone().into(),
                units: lc.units.into(),
                series: TimeFunction::new(lc.series.clone())?,
            });
        }
        let mut outlets = Vec::new();
        for oc in &cfg.outlets {
            let boundary = match &oc.boundary {
                Some(series) => {
                    let mut fns = Vec::new();
                    for points in series {
                        fns.push(TimeFunction::new(points.clone())?);
                    }
                    Some(fns)
                }
                None => None,
            };
            outlets.push(Outlet {
                row: oc.row,
                col: oc.col,
                boundary,
            });
        }

        let soil_porosities = cfg.soils.iter().map(|s| s.porosity).collect();
        let first_dt = cfg.time.schedule[0].dt_seconds;
        let noutlets = outlets.len();

        let mut sim = Simulation {
            geometry,
            mask,
            network,
            cells,
            nodes,
            cell_index,
            node_index,
            chems: cfg.chemicals,
            solids_props: cfg.solids,
            soils: cfg.soils,
            soil_porosities,
            yields: cfg.yields,
            forcing: EnvironmentalForcing::default(),
            loads,
            outlets,
            stack_options: options,
            simtime: 0.0,
            dt: first_dt,
            schedule: cfg.time.schedule,
            end_time: cfg.time.end_time_hours,
            steps: 0,
            outlet_registers: Vec::new(),
            extrema_overland: Vec::new(),
            extrema_channel: Vec::new(),
            limiter: LimiterDiagnostics::default(),
            initial_mass: Vec::new(),
            dump_warned: false,
            grid_sequence: 0,
        };
        sim.outlet_registers = vec![vec![OutletRegister::default(); sim.chems.len()]; noutlets];
        sim.extrema_overland = vec![ConcentrationExtrema::default(); sim.chems.len()];
        sim.extrema_channel = vec![ConcentrationExtrema::default(); sim.chems.len()];
        sim.initial_mass = sim.mass_snapshot();

        info!(
            cells = sim.cells.len(),
            nodes = sim.nodes.len(),
            chems = sim.chems.len(),
            solids = sim.solids_props.len(),
            "simulation initialized"
        );
        Ok(sim)
    }

    /// Current simulation time [h].
    pub fn simtime(&self) -> f64 {
        self.simtime
    }

    /// Configured end time [h].
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Current integration step [s] from the schedule.
    fn current_dt(&self) -> f64 {
        for brk in &self.schedule {
            if self.simtime < brk.until_hours {
                return brk.dt_seconds;
            }
        }
        self.schedule.last().expect("validated: non-empty").dt_seconds
    }

    /// Advance one step: environment, partitioning, transport, reactions,
    /// commit, stack mutations, ledgers.
    pub fn step(&mut self) -> Result<()> {
        self.dt = self.current_dt();

        // 1-2: time functions advance, environment fields update
        let simtime = self.simtime;
        let (cells, nodes, forcing) = (&mut self.cells, &mut self.nodes, &mut self.forcing);
        forcing.apply(simtime, cells, nodes);
        if forcing.meteorology_update && simtime > forcing.next_meteorology {
            environment::compute_solar_radiation(cells, simtime);
            forcing.next_meteorology += 0.25;
        }

        // 3: phase fractions from current concentrations
        self.partition_step();

        // 4: transport fluxes compose
        self.transport_step();

        // 5: reaction fluxes against post-transport estimates
        self.kinetics_step();
        self.integrate_reactions();

        // 6-7: the committing write, then the structural mutations
        self.advance_state()?;

        // 8: ledger registers
        self.update_ledgers();

        self.simtime += self.dt / 3600.0;
        self.steps += 1;
        Ok(())
    }

    /// Run to the configured end time.
    pub fn run(&mut self) -> Result<()> {
        while self.simtime < self.end_time {
            self.step()?;
        }
        info!(
            steps = self.steps,
            simtime = self.simtime,
            "simulation complete"
        );
        Ok(())
    }

    fn partition_step(&mut self) {
        let chems = &self.chems;
        for cell in &mut self.cells {
            partition_column(chems, &mut cell.state);
        }
        for nd in &mut self.nodes {
            partition_column(chems, &mut nd.state);
        }
    }

    fn kinetics_step(&mut self) {
        let dt = self.dt;
        for idx in 0..self.cells.len() {
            let volume = self.cells[idx].water_volume();
            let volume_new = self.cells[idx].water_volume_new();
            kinetics::compute_column_reactions(
                &self.chems,
                &self.solids_props,
                &self.yields,
                &mut self.cells[idx].state,
                volume,
                volume_new,
                false,
                dt,
                &mut self.limiter,
            );
        }
        for idx in 0..self.nodes.len() {
            let (link, node) = (self.nodes[idx].link, self.nodes[idx].node);
            let geometry = self.network.node(link, node).expect("geometry exists");
            let volume = geometry.water_volume(self.nodes[idx].state.water.depth);
            let volume_new = geometry.water_volume(self.nodes[idx].state.transport.depth_new);
            kinetics::compute_column_reactions(
                &self.chems,
                &self.solids_props,
                &self.yields,
                &mut self.nodes[idx].state,
                volume,
                volume_new,
                true,
                dt,
                &mut self.limiter,
            );
        }
    }

    /// Closing mass balance per chemical.
    pub fn mass_balances(&self) -> Vec<MassBalance> {
        let finals = self.mass_snapshot();
        let ingress = self.ingress();
        let egress = self.egress();
        (0..self.chems.len())
            .map(|ichem| MassBalance {
                initial_kg: self.initial_mass[ichem].total(),
                ingress_kg: ingress[ichem],
                final_kg: finals[ichem].total(),
                egress_kg: egress[ichem],
            })
            .collect()
    }

    /// Mass snapshot captured at initialization.
    pub fn initial_mass(&self) -> &[MassSnapshot] {
        &self.initial_mass
    }

    /// Limiter diagnostics (recovered MASS-LIMIT-HIT events).
    pub fn limiter_diagnostics(&self) -> LimiterDiagnostics {
        self.limiter
    }

    /// Concentration extrema per chemical for the overland compartments.
    pub fn extrema_overland(&self) -> &[ConcentrationExtrema] {
        &self.extrema_overland
    }

    /// Concentration extrema per chemical for the channel compartments.
    pub fn extrema_channel(&self) -> &[ConcentrationExtrema] {
        &self.extrema_channel
    }

    /// Per-outlet export registers, indexed [outlet][chem].
    pub fn outlet_registers(&self) -> &[Vec<OutletRegister>] {
        &self.outlet_registers
    }

    // --- Grid & stack store contract -------------------------------------

    /// Number of layers beneath a cell; None outside the domain.
    pub fn layer_count(&self, row: usize, col: usize) -> Option<usize> {
        self.cell_index
            .get(&(row, col))
            .map(|&i| self.cells[i].state.stack.nstack())
    }

    /// Bulk properties of one layer; None outside the domain or past the
    /// current surface.
    pub fn layer_bulk(&self, row: usize, col: usize, slot: usize) -> Option<stack::LayerBulk> {
        let &i = self.cell_index.get(&(row, col))?;
        self.cells[i]
            .state
            .stack
            .layer(slot)
            .map(SoilLayer::bulk_props)
    }

    /// Chemical concentration in one layer [g/m³]; None when absent.
    pub fn layer_chem(&self, row: usize, col: usize, slot: usize, chem: usize) -> Option<f64> {
        let &i = self.cell_index.get(&(row, col))?;
        self.cells[i]
            .state
            .stack
            .layer(slot)
            .and_then(|l| l.cchem.get(chem).copied())
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&OverlandCell> {
        self.cell_index.get(&(row, col)).map(|&i| &self.cells[i])
    }

    pub fn node(&self, link: usize, node: usize) -> Option<&ChannelNode> {
        self.node_index.get(&(link, node)).map(|&i| &self.nodes[i])
    }

    pub fn network(&self) -> &ChannelNetwork {
        &self.network
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn mask(&self) -> &DomainMask {
        &self.mask
    }

    pub fn chemicals(&self) -> &[ChemicalProperties] {
        &self.chems
    }

    pub fn solids(&self) -> &[SolidsProperties] {
        &self.solids_props
    }

    /// Per-step transport inputs for an overland cell.  The external
    /// hydraulic and erosion modules write depths, flows, and solids
    /// fluxes here before each step.
    pub fn transport_mut(&mut self, row: usize, col: usize) -> Option<&mut ColumnTransport> {
        let &i = self.cell_index.get(&(row, col))?;
        Some(&mut self.cells[i].state.transport)
    }

    /// Per-step transport inputs for a channel node.
    pub fn node_transport_mut(
        &mut self,
        link: usize,
        node: usize,
    ) -> Option<&mut ColumnTransport> {
        let &i = self.node_index.get(&(link, node))?;
        Some(&mut self.nodes[i].state.transport)
    }

    /// Mutable state of one overland cell, for initial-condition loaders.
    pub fn cell_state_mut(&mut self, row: usize, col: usize) -> Option<&mut ColumnState> {
        let &i = self.cell_index.get(&(row, col))?;
        Some(&mut self.cells[i].state)
    }

    /// Mutable state of one channel node, for initial-condition loaders.
    pub fn node_state_mut(&mut self, link: usize, node: usize) -> Option<&mut ColumnState> {
        let &i = self.node_index.get(&(link, node))?;
        Some(&mut self.nodes[i].state)
    }

    /// Write one set of grid snapshots (water depth, total suspended
    /// solids, and each chemical's water-column concentration) and
    /// increment the shared grid-print index.
    pub fn write_grid_snapshots(&mut self, root: &std::path::Path) -> Result<()> {
        use ndarray::Array2;

        let shape = (self.geometry.nrows, self.geometry.ncols);
        let seq = self.grid_sequence;

        let mut depth = Array2::zeros(shape);
        let mut solids = Array2::zeros(shape);
        for cell in &self.cells {
            depth[(cell.row, cell.col)] = cell.state.water.depth;
            solids[(cell.row, cell.col)] = cell.state.water.total_solids();
        }
        ascii_grid::write_grid(
            &ascii_grid::snapshot_path(root, "hov", seq),
            &self.geometry,
            &self.mask,
            &depth,
            1.0,
        )?;
        ascii_grid::write_grid(
            &ascii_grid::snapshot_path(root, "csedov", seq),
            &self.geometry,
            &self.mask,
            &solids,
            1.0,
        )?;

        for ichem in 0..self.chems.len() {
            let mut conc = Array2::zeros(shape);
            for cell in &self.cells {
                conc[(cell.row, cell.col)] = cell.state.water.cchem[ichem];
            }
            let group = format!("cchemov_{}", self.chems[ichem].name);
            ascii_grid::write_grid(
                &ascii_grid::snapshot_path(root, &group, seq),
                &self.geometry,
                &self.mask,
                &conc,
                1.0,
            )?;
        }

        self.grid_sequence += 1;
        Ok(())
    }

    /// Retained from a stubbed predecessor output path; writes nothing.
    pub fn write_dump_file(&mut self) {
        if !self.dump_warned {
            warn!("dump-file output is deprecated and disabled; no file written");
            self.dump_warned = true;
        }
    }
}

fn partition_column(chems: &[ChemicalProperties], state: &mut ColumnState) {
    for (ichem, props) in chems.iter().enumerate() {
        state.phases_water[ichem] = partition(
            props.partition.as_ref(),
            &state.water.csed,
            state.env_water.cdoc,
            state.env_water.fdoc,
            &state.fpoc_water,
        );
        for slot in 0..state.stack.nstack() {
            let layer = state.stack.layer(slot).expect("slot < nstack");
            state.phases_bed[slot][ichem] = partition(
                props.partition.as_ref(),
                &layer.csed,
                state.env_bed[slot].cdoc,
                state.env_bed[slot].fdoc,
                &state.fpoc_bed[slot],
            );
        }
    }
}

/// Build an initial stack from bottom-up layer specifications.  Layer
/// elevations descend from the surface elevation; reference volumes and
/// triggers derive from the initial volumes.
fn build_stack(
    layers: &[config::LayerInit],
    area: f64,
    bottom_width: f64,
    surface_elevation: f64,
    max_stack: usize,
    options: &StackOptions,
) -> MaterialStack {
    let total_thickness: f64 = layers.iter().map(|l| l.thickness).sum();
    let base_elevation = surface_elevation - total_thickness;

    let mut built = Vec::with_capacity(layers.len());
    let mut top = base_elevation;
    for init in layers {
        top += init.thickness;
        let volume = init.thickness * area;
        built.push(SoilLayer {
            volume,
            new_volume: volume,
            thickness: init.thickness,
            elevation: top,
            area,
            bottom_width,
            min_volume: options.min_fraction * volume,
            max_volume: options.max_fraction * volume,
            soil_type: init.soil_type,
            csed: init.csed.clone(),
            csed_new: init.csed.clone(),
            cchem: init.cchem.clone(),
            cchem_new: init.cchem.clone(),
        });
    }
    MaterialStack::new(built, max_stack)
}

fn apply_environment_defaults(state: &mut ColumnState, env: &config::EnvironmentConfig) {
    state.env_water = env.water;
    state.extinction = env.extinction;
    for bed in &mut state.env_bed {
        *bed = env.bed;
    }
}

/// Convenience constructor used by the driver binary: build, run, report.
pub fn run_scenario(cfg: SimulationConfig) -> Result<Simulation> {
    let mut sim = Simulation::new(cfg)?;
    sim.run()?;
    Ok(sim)
}

// Re-export the error type at the crate root; every fallible operation in
// the library returns it.
pub use crate::error::Result as SimResult;
