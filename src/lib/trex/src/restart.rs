use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Result, SimulationError};
use crate::Simulation;

/// Write the restart snapshot: per channel node, the current water depth
/// and the water-column solids and chemical concentrations.  Re-reading
/// this file restores the surface water state bit-identically for storms
/// run in sequence.
pub fn write_restart(path: &Path, sim: &Simulation) -> Result<()> {
    let file = File::create(path).map_err(|e| SimulationError::file_io(path, e))?;
    let mut out = BufWriter::new(file);
    let write = |out: &mut BufWriter<File>, text: String| -> Result<()> {
        out.write_all(text.as_bytes())
            .map_err(|e| SimulationError::file_io(path, e))
    };

    write(&mut out, format!("Restart snapshot: {:.6} h\n", sim.simtime()))?;

    for link in 0..sim.network().nlinks() {
        write(
            &mut out,
            format!("Link {}  NumNodes {}\n", link + 1, sim.network().nnodes(link)),
        )?;
        for node in 0..sim.network().nnodes(link) {
            let state = &sim
                .node(link, node)
                .expect("network nodes all have state")
                .state;
            write(&mut out, format!("  Node {}\n", node + 1))?;
            // full precision so a round trip is exact
            write(&mut out, format!("    Hch {:e}\n", state.water.depth))?;
            let mut line = String::from("    Csedch");
            for v in &state.water.csed {
                line.push_str(&format!(" {:e}", v));
            }
            line.push('\n');
            write(&mut out, line)?;
            let mut line = String::from("    Cchemch");
            for v in &state.water.cchem {
                line.push_str(&format!(" {:e}", v));
            }
            line.push('\n');
            write(&mut out, line)?;
        }
    }
    out.flush().map_err(|e| SimulationError::file_io(path, e))
}

/// Read a restart snapshot back into the simulation.  Link, node, solids,
/// and chemical counts must match the configured network exactly.
pub fn read_restart(path: &Path, sim: &mut Simulation) -> Result<()> {
    let file = File::open(path).map_err(|e| SimulationError::file_io(path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut next_line = || -> Result<String> {
        lines
            .next()
            .transpose()
            .map_err(|e| SimulationError::file_io(path, e))?
            .ok_or_else(|| SimulationError::Parse {
                path: path.to_path_buf(),
                detail: "unexpected end of restart file".into(),
            })
    };

    // header line
    let _ = next_line()?;

    let nlinks = sim.network().nlinks();
    let nsolids = sim.solids().len();
    let nchems = sim.chemicals().len();

    for link in 0..nlinks {
        let line = next_line()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 || fields[0] != "Link" {
            return Err(SimulationError::Parse {
                path: path.to_path_buf(),
                detail: format!("malformed link record: {:?}", line),
            });
        }
        let link_read: usize = fields[1].parse().unwrap_or(0);
        let nodes_read: usize = fields[3].parse().unwrap_or(0);
        if link_read != link + 1 {
            return Err(SimulationError::ConfigMismatch {
                file: path.display().to_string(),
                detail: format!("link read = {}  link expected = {}", link_read, link + 1),
            });
        }
        if nodes_read != sim.network().nnodes(link) {
            return Err(SimulationError::ConfigMismatch {
                file: path.display().to_string(),
                detail: format!(
                    "link = {}  nodes read = {}  nodes expected = {}",
                    link + 1,
                    nodes_read,
                    sim.network().nnodes(link)
                ),
            });
        }

        for node in 0..sim.network().nnodes(link) {
            let line = next_line()?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let node_read: usize = fields.get(1).and_then(|v| v.parse().ok()).unwrap_or(0);
            if fields.first() != Some(&"Node") || node_read != node + 1 {
                return Err(SimulationError::Parse {
                    path: path.to_path_buf(),
                    detail: format!("expected Node {} record, found {:?}", node + 1, line),
                });
            }

            let depth = parse_tagged_values(path, &next_line()?, "Hch", 1)?[0];
            let csed = parse_tagged_values(path, &next_line()?, "Csedch", nsolids)?;
            let cchem = parse_tagged_values(path, &next_line()?, "Cchemch", nchems)?;

            let state = sim.node_state_mut(link, node).expect("node exists");
            state.water.depth = depth;
            state.water.depth_new = depth;
            state.transport.depth_new = depth;
            state.water.csed.clone_from(&csed);
            state.water.csed_new.clone_from(&csed);
            state.water.cchem.clone_from(&cchem);
            state.water.cchem_new.clone_from(&cchem);
        }
    }

    Ok(())
}

/// Parse a line of the form `Tag v1 v2 ...` with an exact value count.
fn parse_tagged_values(path: &Path, line: &str, tag: &str, expected: usize) -> Result<Vec<f64>> {
    let mut parts = line.split_whitespace();
    let found = parts.next().unwrap_or_default();
    if found != tag {
        return Err(SimulationError::Parse {
            path: path.to_path_buf(),
            detail: format!("expected {} record, found {:?}", tag, line),
        });
    }
    let values: Vec<f64> = parts.filter_map(|v| v.parse().ok()).collect();
    if values.len() != expected {
        return Err(SimulationError::ConfigMismatch {
            file: path.display().to_string(),
            detail: format!(
                "{} record carries {} values, expected {}",
                tag,
                values.len(),
                expected
            ),
        });
    }
    Ok(values)
}

/// Read a bed initial-condition file: per link/node blocks with one row
/// per layer (surface-first on disk) of per-chemical concentrations
/// [g/m³].  Counts are checked strictly against the configured network.
pub fn read_bed_chemical_file(path: &Path, sim: &mut Simulation) -> Result<()> {
    read_bed_file(path, sim, true)
}

/// As `read_bed_chemical_file`, for per-solids-class concentrations.
pub fn read_bed_solids_file(path: &Path, sim: &mut Simulation) -> Result<()> {
    read_bed_file(path, sim, false)
}

fn read_bed_file(path: &Path, sim: &mut Simulation, chems: bool) -> Result<()> {
    let file = File::open(path).map_err(|e| SimulationError::file_io(path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut next_line = || -> Result<String> {
        lines
            .next()
            .transpose()
            .map_err(|e| SimulationError::file_io(path, e))?
            .ok_or_else(|| SimulationError::Parse {
                path: path.to_path_buf(),
                detail: "unexpected end of initial-condition file".into(),
            })
    };

    // header line
    let _ = next_line()?;

    // Record 2: Links <n> Species <n>
    let line = next_line()?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(SimulationError::Parse {
            path: path.to_path_buf(),
            detail: format!("malformed count record: {:?}", line),
        });
    }
    let links_read: usize = fields[1].parse().unwrap_or(0);
    let species_read: usize = fields[3].parse().unwrap_or(0);
    let nspecies = if chems {
        sim.chemicals().len()
    } else {
        sim.solids().len()
    };
    if links_read != sim.network().nlinks() {
        return Err(SimulationError::ConfigMismatch {
            file: path.display().to_string(),
            detail: format!(
                "links read = {}  links expected = {}",
                links_read,
                sim.network().nlinks()
            ),
        });
    }
    if species_read != nspecies {
        return Err(SimulationError::ConfigMismatch {
            file: path.display().to_string(),
            detail: format!(
                "species read = {}  species expected = {}",
                species_read, nspecies
            ),
        });
    }

    for link in 0..sim.network().nlinks() {
        let line = next_line()?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        let link_read: usize = fields.get(1).and_then(|v| v.parse().ok()).unwrap_or(0);
        let nodes_read: usize = fields.get(3).and_then(|v| v.parse().ok()).unwrap_or(0);
        if link_read != link + 1 || nodes_read != sim.network().nnodes(link) {
            return Err(SimulationError::ConfigMismatch {
                file: path.display().to_string(),
                detail: format!(
                    "link record {:?} disagrees with link {} ({} nodes)",
                    line,
                    link + 1,
                    sim.network().nnodes(link)
                ),
            });
        }

        for node in 0..sim.network().nnodes(link) {
            let line = next_line()?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let node_read: usize = fields.get(1).and_then(|v| v.parse().ok()).unwrap_or(0);
            let nstack_read: usize = fields.get(3).and_then(|v| v.parse().ok()).unwrap_or(0);
            let nstack0 = sim
                .node(link, node)
                .expect("node exists")
                .state
                .stack
                .nstack0();
            if node_read != node + 1 || nstack_read != nstack0 {
                return Err(SimulationError::ConfigMismatch {
                    file: path.display().to_string(),
                    detail: format!(
                        "link = {}  node = {}  nstack = {}  nstack0 = {}",
                        link + 1,
                        node + 1,
                        nstack_read,
                        nstack0
                    ),
                });
            }

            // layers are surface-first on disk
            for slot in (0..nstack0).rev() {
                let line = next_line()?;
                let values = parse_tagged_values(path, &line, "Layer", nspecies + 1)?;
                let layer_read = values[0] as usize;
                if layer_read != slot + 1 {
                    return Err(SimulationError::ConfigMismatch {
                        file: path.display().to_string(),
                        detail: format!(
                            "layer read = {}  layer expected = {}",
                            layer_read,
                            slot + 1
                        ),
                    });
                }
                let state = sim.node_state_mut(link, node).expect("node exists");
                let layer = state.stack.layer_mut(slot).expect("slot < nstack0");
                for (k, v) in values[1..].iter().enumerate() {
                    if chems {
                        layer.cchem[k] = *v;
                        layer.cchem_new[k] = *v;
                    } else {
                        layer.csed[k] = *v;
                        layer.csed_new[k] = *v;
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests_support::channelized;

    #[test]
    fn restart_round_trip_is_exact() {
        let mut sim = Simulation::new(channelized()).unwrap();
        {
            let state = sim.node_state_mut(0, 0).unwrap();
            state.water.depth = 0.123456789012345;
            state.water.csed[0] = 42.4242424242;
            state.water.cchem[0] = 7.77777777777e-3;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restart.txt");
        write_restart(&path, &sim).unwrap();

        let mut other = Simulation::new(channelized()).unwrap();
        read_restart(&path, &mut other).unwrap();

        let a = &sim.node(0, 0).unwrap().state.water;
        let b = &other.node(0, 0).unwrap().state.water;
        assert_eq!(a.depth.to_bits(), b.depth.to_bits());
        assert_eq!(a.csed[0].to_bits(), b.csed[0].to_bits());
        assert_eq!(a.cchem[0].to_bits(), b.cchem[0].to_bits());
    }

    #[test]
    fn bed_chemical_file_rejects_wrong_stack_depth() {
        let mut sim = Simulation::new(channelized()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed_chem.txt");
        std::fs::write(
            &path,
            "bed chemical ic\nLinks 1 Chems 1\nLink 1 NumNodes 1\nNode 1 NumLayers 5\n",
        )
        .unwrap();
        assert!(matches!(
            read_bed_chemical_file(&path, &mut sim),
            Err(SimulationError::ConfigMismatch { .. })
        ));
    }

    #[test]
    fn bed_chemical_file_loads_surface_first_layers() {
        let mut sim = Simulation::new(channelized()).unwrap();
        let nstack0 = sim.node(0, 0).unwrap().state.stack.nstack0();
        assert_eq!(nstack0, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bed_chem.txt");
        // surface layer (2) first, bottom layer (1) second
        std::fs::write(
            &path,
            "bed chemical ic\n\
             Links 1 Chems 1\n\
             Link 1 NumNodes 1\n\
             Node 1 NumLayers 2\n\
             Layer 2 11.0\n\
             Layer 1 22.0\n",
        )
        .unwrap();
        read_bed_chemical_file(&path, &mut sim).unwrap();
        let stack = &sim.node(0, 0).unwrap().state.stack;
        assert_eq!(stack.layer(1).unwrap().cchem[0], 11.0);
        assert_eq!(stack.layer(0).unwrap().cchem[0], 22.0);
    }
}
