use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Classification of a raster cell by the domain mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskValue {
    /// Outside the watershed (nodata).
    Outside,
    /// Overland-only cell.
    Overland,
    /// Overland cell that also hosts a channel node.
    Channel,
}

/// Geo-referencing for the raster domain.
///
/// The grid is anchored at its lower-left corner; `cell_size` is the edge
/// length `w` of the square cells (dx must equal dy).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub nrows: usize,
    pub ncols: usize,
    /// Cell edge length w [m]
    pub cell_size: f64,
    /// x of grid lower-left corner [m] (GIS projection)
    pub xllcorner: f64,
    /// y of grid lower-left corner [m] (GIS projection)
    pub yllcorner: f64,
    /// Null value written for out-of-domain cells
    pub nodata_value: i32,
}

impl GridGeometry {
    /// Plan area of one cell [m²]
    pub fn cell_area(&self) -> f64 {
        self.cell_size * self.cell_size
    }
}

/// The domain mask plus the two index maps tying overland cells to channel
/// nodes.  The maps are independent dictionaries, never reciprocal pointers:
/// a channel cell looks up its `(link, node)` here, and a node looks up its
/// `(row, col)` in the channel network.
#[derive(Clone, Debug)]
pub struct DomainMask {
    cells: Array2<MaskValue>,
    /// (row, col) -> (link, node) for cells that host a channel
    channel_at: HashMap<(usize, usize), (usize, usize)>,
}

impl DomainMask {
    pub fn new(cells: Array2<MaskValue>) -> Self {
        DomainMask {
            cells,
            channel_at: HashMap::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.cells.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.cells.ncols()
    }

    /// Mask value at (row, col); out-of-range indices read as Outside.
    pub fn value(&self, row: usize, col: usize) -> MaskValue {
        self.cells
            .get((row, col))
            .copied()
            .unwrap_or(MaskValue::Outside)
    }

    /// True when the cell participates in the simulation.
    pub fn in_domain(&self, row: usize, col: usize) -> bool {
        self.value(row, col) != MaskValue::Outside
    }

    /// Register the channel resident in cell (row, col).
    pub fn set_channel_at(&mut self, row: usize, col: usize, link: usize, node: usize) {
        self.cells[(row, col)] = MaskValue::Channel;
        self.channel_at.insert((row, col), (link, node));
    }

    /// The (link, node) of the channel resident in this cell, if any.
    pub fn channel_at(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        self.channel_at.get(&(row, col)).copied()
    }

    /// Iterate (row, col) over all in-domain cells in row-major order.
    pub fn iter_domain(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let ncols = self.ncols();
        (0..self.nrows())
            .flat_map(move |r| (0..ncols).map(move |c| (r, c)))
            .filter(|&(r, c)| self.in_domain(r, c))
    }

    /// Count of in-domain cells.
    pub fn domain_cell_count(&self) -> usize {
        self.iter_domain().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_by_three() -> DomainMask {
        let mut cells = Array2::from_elem((3, 3), MaskValue::Overland);
        cells[(0, 0)] = MaskValue::Outside;
        DomainMask::new(cells)
    }

    #[test]
    fn out_of_range_reads_as_outside() {
        let mask = three_by_three();
        assert_eq!(mask.value(7, 7), MaskValue::Outside);
        assert!(!mask.in_domain(7, 7));
    }

    #[test]
    fn channel_registration_updates_mask_and_map() {
        let mut mask = three_by_three();
        mask.set_channel_at(1, 2, 0, 3);
        assert_eq!(mask.value(1, 2), MaskValue::Channel);
        assert_eq!(mask.channel_at(1, 2), Some((0, 3)));
        assert_eq!(mask.channel_at(1, 1), None);
    }

    #[test]
    fn domain_iteration_skips_nodata() {
        let mask = three_by_three();
        let cells: Vec<_> = mask.iter_domain().collect();
        assert_eq!(cells.len(), 8);
        assert!(!cells.contains(&(0, 0)));
    }
}
