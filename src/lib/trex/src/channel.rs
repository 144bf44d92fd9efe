use serde::{Deserialize, Serialize};

/// Geometry of one channel node (one position along a link).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeGeometry {
    /// Channel bottom width [m]
    pub bottom_width: f64,
    /// Bank height [m]: overland elevation minus channel bed elevation
    pub bank_height: f64,
    /// Side slope of the channel bank (run per unit rise) [dimensionless]
    pub side_slope: f64,
    /// Channel length through the cell [m] (includes sinuosity)
    pub length: f64,
    /// Top width at the top of the bank [m]
    pub top_width: f64,
    /// Bed elevation [m] (top of the surface sediment layer)
    pub bed_elevation: f64,
    /// Row of the overland cell hosting this node
    pub row: usize,
    /// Column of the overland cell hosting this node
    pub col: usize,
}

impl NodeGeometry {
    /// Cross-sectional flow area [m²] at water depth `h`.
    ///
    /// Trapezoidal below the bank, rectangular (at top width) above it once
    /// the cell is flooded.
    pub fn cross_section_area(&self, h: f64) -> f64 {
        if h <= self.bank_height {
            (self.bottom_width + self.side_slope * h) * h
        } else {
            (self.bottom_width + self.side_slope * self.bank_height) * self.bank_height
                + (h - self.bank_height) * self.top_width
        }
    }

    /// Water volume of the node [m³] at depth `h`.
    pub fn water_volume(&self, h: f64) -> f64 {
        self.cross_section_area(h) * self.length
    }

    /// Plan surface area of the channel portion of the host cell [m²].
    pub fn surface_area(&self) -> f64 {
        self.top_width * self.length
    }

    /// Recompute bank height and side slope against the current overland
    /// and channel bed elevations.  Called after every stack mutation.
    ///
    /// side_slope = 0.5 * (top_width - bottom_width) / bank_height
    pub fn update_bank_geometry(&mut self, overland_elevation: f64) {
        self.bank_height = overland_elevation - self.bed_elevation;
        if self.bank_height > 0.0 {
            self.side_slope = 0.5 * (self.top_width - self.bottom_width) / self.bank_height;
        }
    }
}

/// The channel network: an ordered sequence of links, each an ordered
/// sequence of nodes.  Node geometry lives here; the per-node water column
/// and sediment stack live in the store alongside the overland cells.
#[derive(Clone, Debug, Default)]
pub struct ChannelNetwork {
    /// Per-link node geometry; `links[l][n]` is node n of link l.
    links: Vec<Vec<NodeGeometry>>,
    /// Outlet number (1-based) for links that terminate at a domain outlet;
    /// zero for interior links.
    outlet_of_link: Vec<usize>,
}

impl ChannelNetwork {
    pub fn new(links: Vec<Vec<NodeGeometry>>, outlet_of_link: Vec<usize>) -> Self {
        ChannelNetwork {
            links,
            outlet_of_link,
        }
    }

    pub fn nlinks(&self) -> usize {
        self.links.len()
    }

    pub fn nnodes(&self, link: usize) -> usize {
        self.links.get(link).map_or(0, |l| l.len())
    }

    pub fn node(&self, link: usize, node: usize) -> Option<&NodeGeometry> {
        self.links.get(link).and_then(|l| l.get(node))
    }

    pub fn node_mut(&mut self, link: usize, node: usize) -> Option<&mut NodeGeometry> {
        self.links.get_mut(link).and_then(|l| l.get_mut(node))
    }

    /// The (row, col) of the overland cell hosting a node.
    pub fn cell_of(&self, link: usize, node: usize) -> Option<(usize, usize)> {
        self.node(link, node).map(|g| (g.row, g.col))
    }

    /// Outlet number for a link, if the link terminates at a domain outlet.
    pub fn outlet_of_link(&self, link: usize) -> Option<usize> {
        match self.outlet_of_link.get(link) {
            Some(&o) if o > 0 => Some(o),
            _ => None,
        }
    }

    /// Iterate (link, node) over the whole network in link order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.links
            .iter()
            .enumerate()
            .flat_map(|(l, nodes)| (0..nodes.len()).map(move |n| (l, n)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeGeometry {
        NodeGeometry {
            bottom_width: 2.0,
            bank_height: 1.0,
            side_slope: 1.0,
            length: 50.0,
            top_width: 4.0,
            bed_elevation: 10.0,
            row: 0,
            col: 0,
        }
    }

    #[test]
    fn cross_section_below_bank_is_trapezoidal() {
        let g = node();
        // (b + m h) h = (2 + 1*0.5)*0.5
        assert!((g.cross_section_area(0.5) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn cross_section_above_bank_adds_rectangle() {
        let g = node();
        // full trapezoid (2+1)*1 = 3 plus 0.5 m of flood at top width 4
        assert!((g.cross_section_area(1.5) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn bank_geometry_follows_elevations() {
        let mut g = node();
        g.update_bank_geometry(11.5);
        assert!((g.bank_height - 1.5).abs() < 1e-12);
        assert!((g.side_slope - 0.5 * 2.0 / 1.5).abs() < 1e-12);
    }
}
