use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{Result, SimulationError};
use crate::grid::{DomainMask, GridGeometry};

/// Write one ESRI-ASCII grid.  Every in-domain cell emits
/// `value * conversion`; masked-out cells emit the nodata value.
pub fn write_grid(
    path: &Path,
    geometry: &GridGeometry,
    mask: &DomainMask,
    values: &Array2<f64>,
    conversion: f64,
) -> Result<()> {
    let file = File::create(path).map_err(|e| SimulationError::file_io(path, e))?;
    let mut out = BufWriter::new(file);

    let write = |out: &mut BufWriter<File>, text: String| -> Result<()> {
        out.write_all(text.as_bytes())
            .map_err(|e| SimulationError::file_io(path, e))
    };

    write(&mut out, format!("ncols\t\t{}\n", geometry.ncols))?;
    write(&mut out, format!("nrows\t\t{}\n", geometry.nrows))?;
    write(&mut out, format!("xllcorner\t{:.2}\n", geometry.xllcorner))?;
    write(&mut out, format!("yllcorner\t{:.2}\n", geometry.yllcorner))?;
    write(&mut out, format!("cellsize\t{:.2}\n", geometry.cell_size))?;
    write(
        &mut out,
        format!("NODATA_value\t{}\n", geometry.nodata_value),
    )?;

    for row in 0..geometry.nrows {
        let mut line = String::new();
        for col in 0..geometry.ncols {
            if mask.in_domain(row, col) {
                line.push_str(&format!("{:e} ", values[(row, col)] * conversion));
            } else {
                line.push_str(&format!("{} ", geometry.nodata_value));
            }
        }
        line.push('\n');
        write(&mut out, line)?;
    }
    out.flush().map_err(|e| SimulationError::file_io(path, e))
}

/// Read an ESRI-ASCII grid.  Returns the parsed header and the cell
/// values; nodata cells read as the nodata value itself.
pub fn read_grid(path: &Path) -> Result<(GridGeometry, Array2<f64>)> {
    let file = File::open(path).map_err(|e| SimulationError::file_io(path, e))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut header = |name: &str| -> Result<f64> {
        let line = lines
            .next()
            .transpose()
            .map_err(|e| SimulationError::file_io(path, e))?
            .ok_or_else(|| SimulationError::Parse {
                path: path.to_path_buf(),
                detail: format!("missing header line {}", name),
            })?;
        let mut parts = line.split_whitespace();
        let key = parts.next().unwrap_or_default();
        if !key.eq_ignore_ascii_case(name) {
            return Err(SimulationError::Parse {
                path: path.to_path_buf(),
                detail: format!("expected header {}, found {}", name, key),
            });
        }
        parts
            .next()
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| SimulationError::Parse {
                path: path.to_path_buf(),
                detail: format!("bad value for header {}", name),
            })
    };

    let ncols = header("ncols")? as usize;
    let nrows = header("nrows")? as usize;
    let xllcorner = header("xllcorner")?;
    let yllcorner = header("yllcorner")?;
    let cell_size = header("cellsize")?;
    let nodata_value = header("NODATA_value")? as i32;

    let geometry = GridGeometry {
        nrows,
        ncols,
        cell_size,
        xllcorner,
        yllcorner,
        nodata_value,
    };

    let mut values = Array2::zeros((nrows, ncols));
    let mut row = 0;
    for line in lines {
        let line = line.map_err(|e| SimulationError::file_io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        if row >= nrows {
            return Err(SimulationError::Parse {
                path: path.to_path_buf(),
                detail: format!("more than {} data rows", nrows),
            });
        }
        for (col, token) in line.split_whitespace().enumerate() {
            if col >= ncols {
                return Err(SimulationError::Parse {
                    path: path.to_path_buf(),
                    detail: format!("row {} has more than {} columns", row, ncols),
                });
            }
            values[(row, col)] = token.parse::<f64>().map_err(|_| SimulationError::Parse {
                path: path.to_path_buf(),
                detail: format!("bad number {:?} at row {} col {}", token, row, col),
            })?;
        }
        row += 1;
    }
    if row != nrows {
        return Err(SimulationError::Parse {
            path: path.to_path_buf(),
            detail: format!("expected {} data rows, found {}", nrows, row),
        });
    }

    Ok((geometry, values))
}

/// Path for one grid snapshot: root name + `_` + group name, with the
/// monotone grid-print index appended as the extension.
pub fn snapshot_path(root: &Path, group: &str, sequence: u32) -> PathBuf {
    let stem = root.to_string_lossy();
    PathBuf::from(format!("{}_{}.{}", stem, group, sequence))
}
