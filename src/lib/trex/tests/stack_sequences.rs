//! Stack mutation sequences driven through full simulation steps: erosion
//! to the pop threshold and deposition through repeated push-with-collapse
//! events.

use trex::chem::{
    ChemicalProperties, PartitionParams, SoilProperties, SolidsProperties, SorptionBasis,
};
use trex::config::{
    DtBreak, EnvironmentConfig, GridConfig, LayerInit, OutputConfig, OverlandConfig,
    SimulationConfig, SpatialConfig, StackConfig, TimeConfig,
};
use trex::Simulation;

/// Bulk density of the bed material in these scenarios [g/m³ of bulk
/// volume]: (1 - porosity) * specific gravity * density of water.
const BULK: f64 = 0.6 * 2.65 * 1.0e6;

fn strongly_sorbed() -> ChemicalProperties {
    let mut chem = ChemicalProperties::inert("sorbed");
    chem.partition = Some(PartitionParams {
        kp: 1.0,
        kb: 0.0,
        koc: 0.0,
        nu_x: 1.0e20,
        basis: SorptionBasis::DistributionCoefficient,
    });
    chem
}

fn stack_config(nlayers: usize, max_stack: usize) -> SimulationConfig {
    // cell area 100 m², thickness 0.01 m -> 1 m³ per layer
    let layer = LayerInit {
        thickness: 0.01,
        soil_type: 0,
        csed: vec![BULK],
        cchem: vec![10.0],
    };
    SimulationConfig {
        title: "stack".into(),
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
                dt_seconds: 1.0,
            }],
        },
        stack: StackConfig {
            max_stack,
            collapse_enabled: true,
            min_fraction: 0.1,
            max_fraction: 1.5,
        },
        solids: vec![SolidsProperties {
            name: "silt".into(),
            diameter: 50.0e-6,
            specific_gravity: 2.65,
        }],
        chemicals: vec![strongly_sorbed()],
        soils: vec![SoilProperties {
            name: "loam".into(),
            porosity: 0.4,
        }],
        yields: vec![],
        overland: OverlandConfig {
            initial_depth: 1.0,
            initial_csed: vec![0.0],
            initial_cchem: vec![0.0],
            layers: vec![layer; nlayers],
        },
        channel: None,
        outlets: vec![],
        loads: vec![],
        environment: EnvironmentConfig::default(),
        hydrology: vec![],
        output: OutputConfig::default(),
    }
}

fn bed_chem_mass(sim: &Simulation) -> f64 {
    sim.cell(0, 0).unwrap().state.stack.chem_mass(0)
}

fn bed_volume(sim: &Simulation) -> f64 {
    sim.cell(0, 0).unwrap().state.stack.total_volume()
}

/// Erode 0.45 m³ of bed per step from a five-layer stack.  After two
/// steps the surface layer is below its minimum-volume trigger and pops
/// into the layer below; the residual mass is recorded symmetrically in
/// the burial registers.
#[test]
fn erosion_to_threshold_pops_the_surface_layer() {
    let mut cfg = stack_config(5, 5);
    cfg.stack.min_fraction = 0.12;
    let mut sim = Simulation::new(cfg).unwrap();
    let initial_bed_chem = bed_chem_mass(&sim);

    // 0.45 m³ of bulk bed per 1 s step
    let erosion_flux = 0.45 * BULK;
    sim.transport_mut(0, 0).unwrap().solids[0].erosion = erosion_flux;

    sim.step().unwrap();
    assert_eq!(sim.layer_count(0, 0), Some(5));
    sim.step().unwrap();
    assert_eq!(sim.layer_count(0, 0), Some(4));

    let cell = sim.cell(0, 0).unwrap();

    // burial out of the eroded slot equals burial into the new surface
    let burial = &cell.state.chem_ledger[0].burial;
    assert!(burial[4].out_kg > 0.0);
    assert!(
        (burial[4].out_kg - burial[3].in_kg).abs() < 1e-12,
        "burial accounting is not symmetric"
    );
    let sed_burial = &cell.state.solids_ledger[0].burial;
    assert!(sed_burial[4].out_kg > 0.0);
    assert!((sed_burial[4].out_kg - sed_burial[3].in_kg).abs() < 1e-12);

    // bed chemical mass equals the initial sum minus what erosion and
    // porewater exported to the water column
    let exported_g = (cell.state.chem_ledger[0].erosion.out_kg
        + cell.state.chem_ledger[0].porewater.out_kg)
        * 1000.0;
    let remaining = bed_chem_mass(&sim);
    assert!(
        (remaining - (initial_bed_chem - exported_g)).abs() < 1e-6 * initial_bed_chem,
        "bed chemical mass {} vs expected {}",
        remaining,
        initial_bed_chem - exported_g
    );

    // 0.9 m³ of bed was removed in total
    assert!((bed_volume(&sim) - 4.1).abs() < 1e-9);
}

/// Deposit 0.3 m³ of bed per step onto a full three-layer stack.  Each
/// overflow collapses the two bottom layers and splits the surface; two
/// full cycles leave the merged bottom layer holding three initial layers'
/// volume while total mass is conserved.
#[test]
fn deposition_pushes_twice_with_collapse() {
    let mut sim = Simulation::new(stack_config(3, 3)).unwrap();
    let initial_bed_chem = bed_chem_mass(&sim);

    // ample suspended solids so the deposition flux is never limited
    {
        let state = sim.cell_state_mut(0, 0).unwrap();
        state.water.csed[0] = 1.0e5;
        state.water.csed_new[0] = 1.0e5;
    }
    let deposition_flux = 0.3 * BULK;
    sim.transport_mut(0, 0).unwrap().solids[0].deposition = deposition_flux;

    for _ in 0..6 {
        sim.step().unwrap();
    }

    let cell = sim.cell(0, 0).unwrap();
    let stack = &cell.state.stack;

    // two collapse events folded three original layers into the bottom slot
    assert_eq!(stack.nstack(), 3);
    assert!((stack.layer(0).unwrap().volume - 3.0).abs() < 1e-9);
    assert!((stack.layer(1).unwrap().volume - 1.0).abs() < 1e-9);
    assert!((stack.surface().volume - 0.8).abs() < 1e-9);

    // total bed volume equals the initial volume plus six deposits
    assert!((bed_volume(&sim) - (3.0 + 6.0 * 0.3)).abs() < 1e-9);

    // no chemical rides the (chemical-free) water column, so the bed
    // chemical mass is exactly conserved through both events
    assert!(
        (bed_chem_mass(&sim) - initial_bed_chem).abs() < 1e-9 * initial_bed_chem,
        "bed chemical mass drifted across push-with-collapse"
    );

    // each collapse recorded a symmetric burial transfer into the bottom
    // slot, and each split recorded one into the restored surface slot
    let burial = &cell.state.chem_ledger[0].burial;
    assert!(burial[0].in_kg > 0.0);
    assert!(burial[1].out_kg > 0.0);
    assert!((burial[1].out_kg - burial[0].in_kg).abs() < 1e-12);
}

/// A full stack with collapse disabled aborts with the STACK-FULL error.
#[test]
fn push_on_full_stack_without_collapse_is_fatal() {
    let mut cfg = stack_config(3, 3);
    cfg.stack.collapse_enabled = false;
    let mut sim = Simulation::new(cfg).unwrap();
    {
        let state = sim.cell_state_mut(0, 0).unwrap();
        state.water.csed[0] = 1.0e5;
        state.water.csed_new[0] = 1.0e5;
    }
    sim.transport_mut(0, 0).unwrap().solids[0].deposition = 0.6 * BULK;

    let mut failed = false;
    for _ in 0..4 {
        if let Err(err) = sim.step() {
            assert!(matches!(err, trex::error::SimulationError::StackFull { .. }));
            assert_eq!(err.exit_code(), 10);
            failed = true;
            break;
        }
    }
    assert!(failed, "stack never filled");
}
