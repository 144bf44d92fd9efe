use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use trex::config::{OutputConfig, SimulationConfig, SteadyFlowConfig};
use trex::error::SimulationError;
use trex::export::{ChemicalExporter, ExportStation, ExportUnits};
use trex::restart;
use trex::Simulation;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // mirror the diagnostic to stdout; the error file (when
            // configured) was written where the failure was caught
            println!("Simulation error: {:#}", err);
            let code = err
                .downcast_ref::<SimulationError>()
                .map(|e| e.exit_code())
                .unwrap_or(1);
            ExitCode::from(code.clamp(1, 255) as u8)
        }
    }
}

fn run() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: trex <scenario.toml>")?;

    let text = fs::read_to_string(&path)
        .with_context(|| format!("can't open scenario file {}", path))?;
    let cfg: SimulationConfig =
        toml::from_str(&text).with_context(|| format!("malformed scenario file {}", path))?;

    info!(title = %cfg.title, "scenario loaded");
    let output = cfg.output.clone();

    match drive(cfg, &output) {
        Ok(()) => Ok(()),
        Err(err) => {
            mirror_error(&output, &err);
            Err(err.into())
        }
    }
}

/// Build and run the scenario, interleaving exports, grid snapshots, and
/// the closing restart/summary outputs.
fn drive(cfg: SimulationConfig, output: &OutputConfig) -> Result<(), SimulationError> {
    let steady: Vec<SteadyFlowConfig> = cfg.hydrology.clone();
    let mut sim = Simulation::new(cfg)?;

    let mut exporter = match (&output.export_dir, output.export_interval_hours) {
        (Some(dir), Some(_)) => {
            let stations = output
                .stations
                .iter()
                .map(|s| ExportStation {
                    row: s.row,
                    col: s.col,
                })
                .collect();
            let units = if output.export_mass_rate {
                ExportUnits::MassRate
            } else {
                ExportUnits::Concentration
            };
            fs::create_dir_all(dir).map_err(|e| SimulationError::file_io(dir, e))?;
            Some(ChemicalExporter::create(
                Path::new(dir),
                &sim,
                stations,
                units,
            )?)
        }
        _ => None,
    };

    let mut next_export = 0.0;
    let mut next_grid = 0.0;
    let mut last_progress = 0.0;

    while sim.simtime() < sim.end_time() {
        apply_steady_flow(&mut sim, &steady);
        sim.step()?;

        if let (Some(exp), Some(interval)) = (exporter.as_mut(), output.export_interval_hours) {
            if sim.simtime() >= next_export {
                exp.append(&sim)?;
                next_export += interval;
            }
        }
        if let (Some(root), Some(interval)) = (&output.grid_root, output.grid_interval_hours) {
            if sim.simtime() >= next_grid {
                sim.write_grid_snapshots(Path::new(root))?;
                next_grid += interval;
            }
        }
        if sim.simtime() - last_progress >= 1.0 {
            info!(simtime = sim.simtime(), steps = sim.steps(), "advancing");
            last_progress = sim.simtime();
        }
    }

    if let Some(restart_file) = &output.restart_file {
        restart::write_restart(Path::new(restart_file), &sim)?;
    }

    // closing mass balance summary
    for (chem, balance) in sim.chemicals().iter().zip(sim.mass_balances()) {
        println!(
            "{}: initial {:.6} kg, ingress {:.6} kg, final {:.6} kg, egress {:.6} kg, \
             error {:.4} %",
            chem.name,
            balance.initial_kg,
            balance.ingress_kg,
            balance.final_kg,
            balance.egress_kg,
            balance.percent_error()
        );
    }
    let limiter = sim.limiter_diagnostics();
    if limiter.water_hits + limiter.bed_hits + limiter.dissolution_hits > 0 {
        info!(
            water = limiter.water_hits,
            bed = limiter.bed_hits,
            dissolution = limiter.dissolution_hits,
            "mass limiter activations"
        );
    }

    Ok(())
}

/// Write the steady hydraulic forcing into the transport registers, the
/// way the external hydraulic module would each step.
fn apply_steady_flow(sim: &mut Simulation, steady: &[SteadyFlowConfig]) {
    for flow in steady {
        if let Some(t) = sim.transport_mut(flow.row, flow.col) {
            if let Some(depth) = flow.depth {
                t.depth_new = depth;
            }
            for &(source, q) in &flow.inflow {
                if source < t.flow_in.len() {
                    t.flow_in[source] = q;
                }
            }
            for &(source, q) in &flow.outflow {
                if source < t.flow_out.len() {
                    t.flow_out[source] = q;
                }
            }
            t.infiltration_rate = flow.infiltration;
        }
    }
}

/// Mirror a fatal diagnostic to the simulation-error file.
fn mirror_error(output: &OutputConfig, err: &SimulationError) {
    error!("{}", err);
    if let Some(error_file) = &output.error_file {
        if let Ok(mut f) = fs::File::create(error_file) {
            let _ = writeln!(f, "Simulation error:");
            let _ = writeln!(f, "  {}", err);
        }
    }
}
