use ndarray::Array2;

use crate::store::{ChannelNode, ColumnState, MediumState, OverlandCell};
use crate::timefunc::TimeFunctionGroup;

/// General (meteorological) property identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneralProperty {
    WindSpeed = 1,
    AirTemperature = 2,
    SolarRadiation = 3,
    CloudCover = 4,
    Albedo = 5,
}

/// Overland/channel property identifiers (per cell, per layer; the water
/// column is position 0).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BedProperty {
    Doc = 1,
    DocBindingFraction = 2,
    Hardness = 3,
    Ph = 4,
    Temperature = 5,
    Oxidant = 6,
    Bacteria = 7,
    /// Water column only
    LightExtinction = 8,
    UserProperty = 9,
}

/// A location in the domain a forcing is being evaluated at.
#[derive(Clone, Copy, Debug)]
enum Site {
    Cell { row: usize, col: usize },
    Node { link: usize, node: usize },
}

/// A spatially distributed value: uniform, gridded by (row, col), or
/// ragged by (link, node).
#[derive(Clone, Debug)]
pub enum Spatial<T: Copy> {
    Uniform(T),
    Grid(Array2<T>),
    Nodes(Vec<Vec<T>>),
}

impl<T: Copy> Spatial<T> {
    fn at(&self, site: Site) -> T {
        match (self, site) {
            (Spatial::Uniform(v), _) => *v,
            (Spatial::Grid(g), Site::Cell { row, col }) => g[(row, col)],
            (Spatial::Nodes(n), Site::Node { link, node }) => n[link][node],
            (Spatial::Grid(_), Site::Node { .. }) => {
                panic!("cell-distributed field queried by node")
            }
            (Spatial::Nodes(_), Site::Cell { .. }) => {
                panic!("node-distributed field queried by cell")
            }
        }
    }
}

/// Air-temperature lapse with elevation.
#[derive(Clone, Debug)]
pub struct Lapse {
    /// Lapse rate per time-function id (index 0 covers cells without a
    /// function) [°C/m]
    pub rates: Vec<f64>,
    /// Elevation of the reference station [m]
    pub station_elevation: f64,
}

impl Lapse {
    fn rate(&self, tfid: usize) -> f64 {
        self.rates.get(tfid).copied().unwrap_or(0.0)
    }
}

/// One general environmental forcing: a spatial constant scaled by an
/// interpolated time function per cell, `E(x,y,t) = Econst(x,y) · Etime(t)`.
/// A time-function id of zero means the constant applies unscaled.
#[derive(Clone, Debug)]
pub struct GeneralForcing {
    pub property: GeneralProperty,
    pub constant: Spatial<f64>,
    pub tf_id: Spatial<usize>,
    pub functions: TimeFunctionGroup,
    /// Elevation lapse, air temperature only
    pub lapse: Option<Lapse>,
}

/// One overland or channel forcing, distributed over layer positions:
/// position 0 is the water column, positions 1..=max_stack address stack
/// slots bottom-up.  A single-entry list applies to every position.
#[derive(Clone, Debug)]
pub struct BedForcing {
    pub property: BedProperty,
    pub constant: Vec<Spatial<f64>>,
    pub tf_id: Vec<Spatial<usize>>,
    pub functions: TimeFunctionGroup,
}

/// Particulate organic-carbon forcing for one solids class.
#[derive(Clone, Debug)]
pub struct FpocForcing {
    pub solid: usize,
    pub constant: Vec<Spatial<f64>>,
    pub tf_id: Vec<Spatial<usize>>,
    pub functions: TimeFunctionGroup,
}

fn positional<T: Copy>(list: &[Spatial<T>], pos: usize) -> &Spatial<T> {
    if list.len() == 1 { &list[0] } else { &list[pos] }
}

/// All environmental forcing for a scenario.
#[derive(Clone, Debug, Default)]
pub struct EnvironmentalForcing {
    pub general: Vec<GeneralForcing>,
    pub overland: Vec<BedForcing>,
    pub channel: Vec<BedForcing>,
    pub fpoc_overland: Vec<FpocForcing>,
    pub fpoc_channel: Vec<FpocForcing>,
    /// Recompute solar radiation on the meteorology tick
    pub meteorology_update: bool,
    /// Next meteorology update time [h]
    pub next_meteorology: f64,
}

impl EnvironmentalForcing {
    /// Advance every forcing to `simtime` and recompose the per-cell and
    /// per-node fields.
    pub fn apply(&mut self, simtime: f64, cells: &mut [OverlandCell], nodes: &mut [ChannelNode]) {
        for f in &mut self.general {
            f.functions.update(simtime);
        }
        for f in self.overland.iter_mut().chain(self.channel.iter_mut()) {
            f.functions.update(simtime);
        }
        for f in self
            .fpoc_overland
            .iter_mut()
            .chain(self.fpoc_channel.iter_mut())
        {
            f.functions.update(simtime);
        }

        for f in &self.general {
            for cell in cells.iter_mut() {
                let site = Site::Cell {
                    row: cell.row,
                    col: cell.col,
                };
                let tfid = f.tf_id.at(site);
                let mut value = f.constant.at(site) * f.functions.value(tfid, simtime);
                if let Some(lapse) = &f.lapse {
                    value -= lapse.rate(tfid) * (cell.ground_elevation - lapse.station_elevation);
                }
                match f.property {
                    GeneralProperty::WindSpeed => cell.climate.wind_speed = value,
                    GeneralProperty::AirTemperature => cell.climate.air_temperature = value,
                    GeneralProperty::SolarRadiation => cell.climate.solar_radiation = value,
                    GeneralProperty::CloudCover => cell.climate.cloud_cover = value,
                    GeneralProperty::Albedo => cell.climate.albedo = value,
                }
            }
        }

        for f in &self.overland {
            for cell in cells.iter_mut() {
                let site = Site::Cell {
                    row: cell.row,
                    col: cell.col,
                };
                apply_bed_forcing(f, simtime, site, &mut cell.state);
            }
        }
        for f in &self.channel {
            for nd in nodes.iter_mut() {
                let site = Site::Node {
                    link: nd.link,
                    node: nd.node,
                };
                apply_bed_forcing(f, simtime, site, &mut nd.state);
            }
        }

        for f in &self.fpoc_overland {
            for cell in cells.iter_mut() {
                let site = Site::Cell {
                    row: cell.row,
                    col: cell.col,
                };
                apply_fpoc_forcing(f, simtime, site, &mut cell.state);
            }
        }
        for f in &self.fpoc_channel {
            for nd in nodes.iter_mut() {
                let site = Site::Node {
                    link: nd.link,
                    node: nd.node,
                };
                apply_fpoc_forcing(f, simtime, site, &mut nd.state);
            }
        }
    }
}

fn apply_bed_forcing(f: &BedForcing, simtime: f64, site: Site, state: &mut ColumnState) {
    let max_stack = state.env_bed.len();
    // extinction applies to the water column only
    let positions = if f.property == BedProperty::LightExtinction {
        1
    } else {
        max_stack + 1
    };
    for pos in 0..positions {
        let tfid = positional(&f.tf_id, pos).at(site);
        let value = positional(&f.constant, pos).at(site) * f.functions.value(tfid, simtime);
        if pos == 0 {
            if f.property == BedProperty::LightExtinction {
                state.extinction = value;
            } else {
                set_medium(&mut state.env_water, f.property, value);
            }
        } else {
            set_medium(&mut state.env_bed[pos - 1], f.property, value);
        }
    }
}

fn apply_fpoc_forcing(f: &FpocForcing, simtime: f64, site: Site, state: &mut ColumnState) {
    let max_stack = state.env_bed.len();
    for pos in 0..=max_stack {
        let tfid = positional(&f.tf_id, pos).at(site);
        let value = positional(&f.constant, pos).at(site) * f.functions.value(tfid, simtime);
        if pos == 0 {
            state.fpoc_water[f.solid] = value;
        } else {
            state.fpoc_bed[pos - 1][f.solid] = value;
        }
    }
}

fn set_medium(m: &mut MediumState, p: BedProperty, value: f64) {
    match p {
        BedProperty::Doc => m.cdoc = value,
        BedProperty::DocBindingFraction => m.fdoc = value,
        BedProperty::Hardness => m.hardness = value,
        BedProperty::Ph => m.ph = value,
        BedProperty::Temperature => m.temperature = value,
        BedProperty::Oxidant => m.oxidant = value,
        BedProperty::Bacteria => m.bacteria = value,
        BedProperty::UserProperty => m.user_property = value,
        BedProperty::LightExtinction => unreachable!("extinction handled by caller"),
    }
}

/// Clear-sky diurnal solar radiation with cloud attenuation, following the
/// modified temperature-index treatment of Liston and Elder (2006).
/// Overwrites the solar-radiation field of every cell; runs on the 0.25 h
/// meteorology tick when enabled.
pub fn compute_solar_radiation(cells: &mut [OverlandCell], simtime: f64) {
    // solar constant [W/m²]
    const S0: f64 = 1367.0;

    let hour_of_day = simtime % 24.0;
    // daylight half-sine between 06:00 and 18:00
    let sun = (std::f64::consts::PI * (hour_of_day - 6.0) / 12.0)
        .sin()
        .max(0.0);

    for cell in cells.iter_mut() {
        let cloud = cell.climate.cloud_cover.clamp(0.0, 1.0);
        let transmissivity = 1.0 - 0.65 * cloud * cloud;
        cell.climate.solar_radiation = S0 * sun * transmissivity * (1.0 - cell.climate.albedo);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{MaterialStack, SoilLayer};
    use crate::store::WaterColumn;
    use crate::timefunc::TimeFunction;

    fn cell() -> OverlandCell {
        let layer = SoilLayer {
            volume: 1.0,
            new_volume: 1.0,
            thickness: 0.1,
            elevation: 100.0,
            area: 10.0,
            bottom_width: 0.0,
            min_volume: 0.1,
            max_volume: 1.5,
            soil_type: 0,
            csed: vec![0.0],
            csed_new: vec![0.0],
            cchem: vec![0.0],
            cchem_new: vec![0.0],
        };
        OverlandCell {
            row: 0,
            col: 0,
            ground_elevation: 100.0,
            ground_area: 100.0,
            climate: Default::default(),
            state: ColumnState::new(
                WaterColumn::new(0.1, 1, 1),
                MaterialStack::new(vec![layer], 3),
                1,
                1,
            ),
        }
    }

    #[test]
    fn constant_times_function_composes() {
        let mut forcing = EnvironmentalForcing {
            general: vec![GeneralForcing {
                property: GeneralProperty::WindSpeed,
                constant: Spatial::Uniform(2.0),
                tf_id: Spatial::Uniform(1),
                functions: TimeFunctionGroup::new(vec![
                    TimeFunction::new(vec![(0.0, 1.0), (10.0, 3.0)]).unwrap(),
                ]),
                lapse: None,
            }],
            ..Default::default()
        };
        let mut cells = vec![cell()];
        forcing.apply(5.0, &mut cells, &mut []);
        assert!((cells[0].climate.wind_speed - 4.0).abs() < 1e-12);
    }

    #[test]
    fn tfid_zero_uses_constant_directly() {
        let mut forcing = EnvironmentalForcing {
            general: vec![GeneralForcing {
                property: GeneralProperty::SolarRadiation,
                constant: Spatial::Uniform(800.0),
                tf_id: Spatial::Uniform(0),
                functions: TimeFunctionGroup::new(vec![]),
                lapse: None,
            }],
            ..Default::default()
        };
        let mut cells = vec![cell()];
        forcing.apply(3.0, &mut cells, &mut []);
        assert_eq!(cells[0].climate.solar_radiation, 800.0);
    }

    #[test]
    fn air_temperature_lapses_with_elevation() {
        let mut forcing = EnvironmentalForcing {
            general: vec![GeneralForcing {
                property: GeneralProperty::AirTemperature,
                constant: Spatial::Uniform(10.0),
                tf_id: Spatial::Uniform(0),
                functions: TimeFunctionGroup::new(vec![]),
                lapse: Some(Lapse {
                    rates: vec![0.0065],
                    station_elevation: 0.0,
                }),
            }],
            ..Default::default()
        };
        let mut cells = vec![cell()];
        forcing.apply(0.0, &mut cells, &mut []);
        assert!((cells[0].climate.air_temperature - (10.0 - 0.0065 * 100.0)).abs() < 1e-12);
    }

    #[test]
    fn bed_forcing_reaches_water_column_and_layers() {
        let mut forcing = EnvironmentalForcing {
            overland: vec![BedForcing {
                property: BedProperty::Doc,
                constant: vec![Spatial::Uniform(5.0)],
                tf_id: vec![Spatial::Uniform(0)],
                functions: TimeFunctionGroup::new(vec![]),
            }],
            ..Default::default()
        };
        let mut cells = vec![cell()];
        forcing.apply(0.0, &mut cells, &mut []);
        assert_eq!(cells[0].state.env_water.cdoc, 5.0);
        for bed in &cells[0].state.env_bed {
            assert_eq!(bed.cdoc, 5.0);
        }
    }

    #[test]
    fn extinction_stays_in_the_water_column() {
        let mut forcing = EnvironmentalForcing {
            overland: vec![BedForcing {
                property: BedProperty::LightExtinction,
                constant: vec![Spatial::Uniform(1.2)],
                tf_id: vec![Spatial::Uniform(0)],
                functions: TimeFunctionGroup::new(vec![]),
            }],
            ..Default::default()
        };
        let mut cells = vec![cell()];
        forcing.apply(0.0, &mut cells, &mut []);
        assert_eq!(cells[0].state.extinction, 1.2);
    }

    #[test]
    fn solar_hook_peaks_at_noon_and_dims_with_cloud() {
        let mut cells = vec![cell(), cell()];
        cells[1].climate.cloud_cover = 1.0;
        compute_solar_radiation(&mut cells, 12.0);
        assert!(cells[0].climate.solar_radiation > 1300.0);
        assert!(cells[1].climate.solar_radiation < cells[0].climate.solar_radiation);
        compute_solar_radiation(&mut cells, 0.0);
        assert_eq!(cells[0].climate.solar_radiation, 0.0);
    }
}
