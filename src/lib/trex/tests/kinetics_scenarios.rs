//! Reaction and partitioning scenarios driven through full steps: pure-
//! phase dissolution against the analytic saturation approach, and the
//! closed-form three-phase split.

use trex::chem::{
    ChemicalProperties, DissolutionParams, PartitionParams, Process, SoilProperties,
    SolidsProperties, SorptionBasis, YieldEntry,
};
use trex::config::{
    DtBreak, EnvironmentConfig, GridConfig, LayerInit, OutputConfig, OverlandConfig,
    SimulationConfig, SpatialConfig, StackConfig, TimeConfig,
};
use trex::Simulation;

fn single_cell(chems: Vec<ChemicalProperties>, yields: Vec<YieldEntry>) -> SimulationConfig {
    let nchems = chems.len();
    SimulationConfig {
        title: "kinetics".into(),
        grid: GridConfig {
            nrows: 1,
            ncols: 1,
            cell_size: 10.0,
            xllcorner: 0.0,
            yllcorner: 0.0,
            nodata_value: -9999,
            mask: vec![vec![1]],
            elevation: SpatialConfig::Uniform(100.0),
        },
        time: TimeConfig {
            end_time_hours: 1.0,
            schedule: vec![DtBreak {
                until_hours: 1.0,
                dt_seconds: 5.0,
            }],
        },
        stack: StackConfig {
            max_stack: 3,
            collapse_enabled: true,
            min_fraction: 0.1,
            max_fraction: 1.5,
        },
        solids: vec![
            SolidsProperties {
                name: "grain".into(),
                diameter: 100.0e-6,
                specific_gravity: 2.65,
            },
            SolidsProperties {
                name: "clay".into(),
                diameter: 2.0e-6,
                specific_gravity: 2.65,
            },
        ],
        chemicals: chems,
        soils: vec![SoilProperties {
            name: "loam".into(),
            porosity: 0.4,
        }],
        yields,
        overland: OverlandConfig {
            initial_depth: 1.0,
            initial_csed: vec![0.0, 0.0],
            initial_cchem: vec![0.0; nchems],
            layers: vec![LayerInit {
                thickness: 0.1,
                soil_type: 0,
                csed: vec![1.59e6, 0.0],
                cchem: vec![0.0; nchems],
            }],
        },
        channel: None,
        outlets: vec![],
        loads: vec![],
        environment: EnvironmentConfig::default(),
        hydrology: vec![],
        output: OutputConfig::default(),
    }
}

/// Pure-phase dissolution: 1000 g/m³ of 100 μm grains dissolving toward a
/// 5 g/m³ solubility limit.  After one hour the dissolved concentration
/// sits within 5% of the analytic exponential approach to saturation.
#[test]
fn dissolution_approaches_saturation_exponentially() {
    let mut chem = ChemicalProperties::inert("product");
    // k = 1e-5 cm/s = 1e-7 m/s
    chem.dissolution = Some(DissolutionParams {
        k_water: 1.0e-7,
        k_bed: 0.0,
        solubility: 5.0,
    });
    let yields = vec![YieldEntry {
        from: 0,
        to: 0,
        process: Process::Dissolution,
        yield_factor: 1.0,
    }];
    let mut cfg = single_cell(vec![chem], yields);
    cfg.overland.initial_csed = vec![1000.0, 0.0];

    let mut sim = Simulation::new(cfg).unwrap();
    while sim.simtime() < 1.0 {
        sim.step().unwrap();
    }

    let c = sim.cell(0, 0).unwrap().state.water.cchem[0];
    // first-order rate constant k·alpha/V = k·6·csed/(d·sg·rho_w)
    let k_eff: f64 = 1.0e-7 * 6.0 * 1000.0 / (100.0e-6 * 2.65 * 1000.0);
    let analytic = 5.0 * (1.0 - (-k_eff * 3600.0).exp());
    assert!(
        (c - analytic).abs() / analytic < 0.05,
        "dissolved {} g/m³, analytic {} g/m³",
        c,
        analytic
    );

    // the dissolved mass left the solids state
    let csed = sim.cell(0, 0).unwrap().state.water.csed[0];
    let dissolved_mass = c * sim.cell(0, 0).unwrap().water_volume();
    let solids_lost = (1000.0 - csed) * sim.cell(0, 0).unwrap().water_volume();
    assert!((dissolved_mass - solids_lost).abs() / dissolved_mass < 1e-6);

    // ledger closes: dissolution ingress balances the chemical inventory
    let balance = &sim.mass_balances()[0];
    assert!(balance.percent_error().abs() < 1e-6);
}

/// Three-phase partitioning through a full step: kp = 1e-4 m³/g,
/// kb = 1e-6 m³/g, nu_x = 1e5, DOC = 5 g/m³, two solids classes at 50 and
/// 20 g/m³.  The fractions sum to one and match the closed-form mass law.
#[test]
fn three_phase_partitioning_matches_the_mass_law() {
    let mut chem = ChemicalProperties::inert("hoc");
    chem.partition = Some(PartitionParams {
        kp: 1.0e-4,
        kb: 1.0e-6,
        koc: 0.0,
        nu_x: 1.0e5,
        basis: SorptionBasis::DistributionCoefficient,
    });
    let mut cfg = single_cell(vec![chem], vec![]);
    cfg.overland.initial_csed = vec![50.0, 20.0];
    cfg.overland.initial_cchem = vec![1.0];
    cfg.environment.water.cdoc = 5.0;
    cfg.environment.water.fdoc = 1.0;

    let mut sim = Simulation::new(cfg).unwrap();
    sim.step().unwrap();

    let phases = &sim.cell(0, 0).unwrap().state.phases_water[0];
    let sum = phases.dissolved + phases.bound + phases.particulate_total();
    assert!((sum - 1.0).abs() < 1e-6, "fractions sum to {}", sum);

    let m = 70.0;
    let phi = 1.0e5 / (1.0e5 + m);
    let den = 1.0 + 1.0e-6 * 5.0 + phi * 1.0e-4 * m;
    assert!((phases.dissolved - 1.0 / den).abs() < 1e-9);
    assert!((phases.bound - 1.0e-6 * 5.0 / den).abs() < 1e-9);
    assert!((phases.particulate[0] - phi * 1.0e-4 * 50.0 / den).abs() < 1e-9);
    assert!((phases.particulate[1] - phi * 1.0e-4 * 20.0 / den).abs() < 1e-9);
}

/// A chemical with partitioning disabled reports fully dissolved even
/// when its record carries a nonzero kp.
#[test]
fn disabled_partitioning_reports_all_dissolved() {
    let chem = ChemicalProperties::inert("tracer");
    let mut cfg = single_cell(vec![chem], vec![]);
    cfg.overland.initial_csed = vec![500.0, 100.0];
    cfg.overland.initial_cchem = vec![1.0];

    let mut sim = Simulation::new(cfg).unwrap();
    sim.step().unwrap();

    let phases = &sim.cell(0, 0).unwrap().state.phases_water[0];
    assert_eq!(phases.dissolved, 1.0);
    assert_eq!(phases.bound, 0.0);
    assert_eq!(phases.particulate_total(), 0.0);
}
