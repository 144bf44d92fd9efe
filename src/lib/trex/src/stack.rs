use serde::{Deserialize, Serialize};

use crate::ledger::BurialLedger;

/// One material layer in a soil or sediment stack.
///
/// Layers are numbered from the bottom: slot 0 is the deepest, the last
/// slot is the current surface.  Concentrations are bulk-volume based
/// [g/m³ of layer].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoilLayer {
    /// Layer volume at time t [m³]
    pub volume: f64,
    /// Layer volume integrated to time t + dt [m³]
    pub new_volume: f64,
    /// Layer thickness [m]
    pub thickness: f64,
    /// Elevation of the layer top [m]
    pub elevation: f64,
    /// Ground (overland) or bed (channel) area of the layer [m²]
    pub area: f64,
    /// Channel bottom width at this layer [m]; unused (zero) overland
    pub bottom_width: f64,
    /// Pop trigger: erosion to or below this volume removes the layer [m³]
    pub min_volume: f64,
    /// Push trigger: deposition above this volume splits the layer [m³]
    pub max_volume: f64,
    /// Index into the soil/sediment property table
    pub soil_type: usize,
    /// Solids concentration per particle class [g/m³]
    pub csed: Vec<f64>,
    pub csed_new: Vec<f64>,
    /// Chemical concentration per chemical [g/m³]
    pub cchem: Vec<f64>,
    pub cchem_new: Vec<f64>,
}

impl SoilLayer {
    /// Sum of solids concentrations over all particle classes [g/m³].
    pub fn total_solids(&self) -> f64 {
        self.csed.iter().sum()
    }

    /// Bulk properties of the layer as one record.
    pub fn bulk_props(&self) -> LayerBulk {
        LayerBulk {
            volume: self.volume,
            thickness: self.thickness,
            area: self.area,
            elevation: self.elevation,
        }
    }
}

/// Value-typed view of a layer's bulk state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerBulk {
    pub volume: f64,
    pub thickness: f64,
    pub area: f64,
    pub elevation: f64,
}

/// Pre-disturbance reference state for one stack position, used to restore
/// a split layer and to size the volume triggers of re-grown layers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LayerReference {
    pub volume: f64,
    pub thickness: f64,
    pub soil_type: usize,
}

/// Options controlling stack mutation.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct StackOptions {
    /// Merge the two deepest layers when a push finds the stack full
    pub collapse_enabled: bool,
    /// Pop trigger as a fraction of the reference volume
    pub min_fraction: f64,
    /// Push trigger as a fraction of the reference volume
    pub max_fraction: f64,
}

impl Default for StackOptions {
    fn default() -> Self {
        StackOptions {
            collapse_enabled: true,
            min_fraction: 0.1,
            max_fraction: 1.5,
        }
    }
}

/// What a mutation pass did to a stack.  The caller zeroes the erosion and
/// deposition fluxes of the affected slot and, for channel stacks,
/// recomputes bank geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackChange {
    None,
    /// The surface layer at `removed_slot` merged into the layer below.
    Popped { removed_slot: usize },
    /// The surface split; `buried_slot` holds the restored former surface.
    Pushed { buried_slot: usize, collapsed: bool },
}

/// Marker error: push on a full stack that cannot collapse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackFull;

/// The layered soil/sediment column beneath one overland cell or channel
/// node.
///
/// The stack remembers its pristine height `nstack0` and the reference
/// state of every original position, so that after erosion below the
/// original surface and later redeposition, restored layers recover their
/// pre-disturbance properties, and layers grown above the original ground
/// inherit the initial surface layer's soil type and reference volume.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterialStack {
    layers: Vec<SoilLayer>,
    reference: Vec<LayerReference>,
    nstack0: usize,
    max_stack: usize,
}

impl MaterialStack {
    pub fn new(layers: Vec<SoilLayer>, max_stack: usize) -> Self {
        let reference = layers
            .iter()
            .map(|l| LayerReference {
                volume: l.volume,
                thickness: l.thickness,
                soil_type: l.soil_type,
            })
            .collect();
        let nstack0 = layers.len();
        MaterialStack {
            layers,
            reference,
            nstack0,
            max_stack,
        }
    }

    /// Current number of layers (1 ≤ nstack ≤ max_stack).
    pub fn nstack(&self) -> usize {
        self.layers.len()
    }

    /// Pristine layer count remembered from initialization.
    pub fn nstack0(&self) -> usize {
        self.nstack0
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// The surface layer (top element).
    pub fn surface(&self) -> &SoilLayer {
        self.layers.last().expect("stack never empties below 1 layer")
    }

    pub fn surface_mut(&mut self) -> &mut SoilLayer {
        self.layers.last_mut().expect("stack never empties below 1 layer")
    }

    /// Slot index of the surface layer.
    pub fn surface_slot(&self) -> usize {
        self.layers.len() - 1
    }

    /// Layer at `slot` (0 = deepest); None past the current surface, never
    /// a stale zero-initialized record.
    pub fn layer(&self, slot: usize) -> Option<&SoilLayer> {
        self.layers.get(slot)
    }

    pub(crate) fn layer_mut(&mut self, slot: usize) -> Option<&mut SoilLayer> {
        self.layers.get_mut(slot)
    }

    pub fn layers(&self) -> &[SoilLayer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [SoilLayer] {
        &mut self.layers
    }

    /// Elevation of the stack surface [m].
    pub fn surface_elevation(&self) -> f64 {
        self.surface().elevation
    }

    /// Total material volume in the stack [m³].
    pub fn total_volume(&self) -> f64 {
        self.layers.iter().map(|l| l.volume).sum()
    }

    /// Total mass of chemical `c` across all layers [g].
    pub fn chem_mass(&self, c: usize) -> f64 {
        self.layers.iter().map(|l| l.cchem[c] * l.volume).sum()
    }

    /// Total mass of solids class `s` across all layers [g].
    pub fn solid_mass(&self, s: usize) -> f64 {
        self.layers.iter().map(|l| l.csed[s] * l.volume).sum()
    }

    /// Pop: upward re-indexing on erosion to the minimum-volume trigger.
    ///
    /// The eroded surface layer merges into the layer below it.  Volume
    /// combines additively and concentrations combine mass-weighted.  The
    /// residual mass of the eroded layer is recorded symmetrically as a
    /// burial transfer (out of the eroded slot, into the incoming slot)
    /// for consistency with the stack's frame of reference, even though
    /// the physical motion is scour-ward.
    ///
    /// The new surface thickness is recomputed from the incoming layer's
    /// area; a thickness/elevation discontinuity is expected when areas
    /// differ between the two layers.
    pub fn try_pop(&mut self, ledger: &mut BurialLedger<'_>) -> StackChange {
        let s = self.surface_slot();
        let surface = &self.layers[s];
        // trigger is inclusive: a volume exactly at the minimum pops
        if surface.volume > surface.min_volume || self.layers.len() <= 1 {
            return StackChange::None;
        }

        let total_volume = self.layers[s].volume + self.layers[s - 1].volume;

        let nsolids = self.layers[s].csed.len();
        for isolid in 0..nsolids {
            let residual_mass = self.layers[s].csed[isolid] * self.layers[s].volume;
            let incoming_mass = self.layers[s - 1].csed[isolid] * self.layers[s - 1].volume;
            let conc = (residual_mass + incoming_mass) / total_volume;
            self.layers[s - 1].csed[isolid] = conc;
            self.layers[s - 1].csed_new[isolid] = conc;
            ledger.transfer_solid(isolid, s, s - 1, residual_mass / 1000.0);
        }

        let nchems = self.layers[s].cchem.len();
        for ichem in 0..nchems {
            let residual_mass = self.layers[s].cchem[ichem] * self.layers[s].volume;
            let incoming_mass = self.layers[s - 1].cchem[ichem] * self.layers[s - 1].volume;
            let conc = (residual_mass + incoming_mass) / total_volume;
            self.layers[s - 1].cchem[ichem] = conc;
            self.layers[s - 1].cchem_new[ichem] = conc;
            ledger.transfer_chem(ichem, s, s - 1, residual_mass / 1000.0);
        }

        let incoming = &mut self.layers[s - 1];
        incoming.volume = total_volume;
        incoming.new_volume = total_volume;
        incoming.thickness = total_volume / incoming.area;

        // wipe the old surface layer from the stack
        self.layers.pop();

        StackChange::Popped { removed_slot: s }
    }

    /// Push: downward re-indexing on deposition above the maximum-volume
    /// trigger.  The overflowed surface splits into a restored former
    /// surface (pushed down) and a new surface carrying the excess volume.
    ///
    /// When the stack is already at `max_stack`, the two deepest layers
    /// first collapse into one (if the collapse option is enabled and
    /// `max_stack > 2`); otherwise the push fails with `StackFull`.
    pub fn try_push(
        &mut self,
        opts: &StackOptions,
        ledger: &mut BurialLedger<'_>,
    ) -> Result<StackChange, StackFull> {
        let s = self.surface_slot();
        // trigger is strict: push fires only above the maximum
        if self.layers[s].volume <= self.layers[s].max_volume {
            return Ok(StackChange::None);
        }

        let mut collapsed = false;
        if self.layers.len() == self.max_stack {
            if opts.collapse_enabled && self.max_stack > 2 {
                self.collapse_bottom(opts, ledger);
                collapsed = true;
            } else {
                return Err(StackFull);
            }
        }

        // there is now room for another layer
        let s = self.surface_slot();
        let new_slot = s + 1;

        // Reference parameters depend on the new layer's position: at or
        // below the original ground surface the position's own reference
        // applies; above it, the initial surface layer's reference (and
        // soil type) is inherited.
        let (old_ref, new_ref) = if new_slot < self.nstack0 {
            (self.reference[s].clone(), self.reference[new_slot].clone())
        } else {
            let r0 = self.reference[self.nstack0 - 1].clone();
            (r0.clone(), r0)
        };

        let old_surface = &self.layers[s];
        let excess_volume = old_surface.volume - old_ref.volume;
        let thickness = excess_volume / old_surface.area;

        let new_surface = SoilLayer {
            volume: excess_volume,
            new_volume: excess_volume,
            thickness,
            elevation: old_surface.elevation + thickness,
            area: old_surface.area,
            bottom_width: old_surface.bottom_width,
            min_volume: opts.min_fraction * new_ref.volume,
            max_volume: opts.max_fraction * new_ref.volume,
            soil_type: new_ref.soil_type,
            // the split is compositionally homogeneous
            csed: old_surface.csed.clone(),
            csed_new: old_surface.csed.clone(),
            cchem: old_surface.cchem.clone(),
            cchem_new: old_surface.cchem.clone(),
        };

        // restore the pushed-down layer to its reference state
        let buried = &mut self.layers[s];
        buried.volume = old_ref.volume;
        buried.new_volume = old_ref.volume;
        buried.thickness = old_ref.thickness;
        buried.min_volume = opts.min_fraction * old_ref.volume;
        buried.max_volume = opts.max_fraction * old_ref.volume;

        // mass pushed down the stack is the mass remaining in the restored
        // layer, recorded as burial out of the new surface into it
        for isolid in 0..buried.csed.len() {
            let kg = buried.csed[isolid] * buried.volume / 1000.0;
            ledger.transfer_solid(isolid, new_slot, s, kg);
        }
        for ichem in 0..buried.cchem.len() {
            let kg = buried.cchem[ichem] * buried.volume / 1000.0;
            ledger.transfer_chem(ichem, new_slot, s, kg);
        }

        self.layers.push(new_surface);

        Ok(StackChange::Pushed {
            buried_slot: s,
            collapsed,
        })
    }

    /// Collapse the two deepest layers into one and shift the rest of the
    /// stack down a slot.  Every transfer is recorded as a symmetric
    /// burial.
    fn collapse_bottom(&mut self, opts: &StackOptions, ledger: &mut BurialLedger<'_>) {
        let v1 = self.layers[0].volume;
        let v2 = self.layers[1].volume;
        let combined_volume = v1 + v2;

        for isolid in 0..self.layers[0].csed.len() {
            let m2 = self.layers[1].csed[isolid] * v2;
            let m1 = self.layers[0].csed[isolid] * v1;
            let conc = (m1 + m2) / combined_volume;
            self.layers[0].csed[isolid] = conc;
            self.layers[0].csed_new[isolid] = conc;
            ledger.transfer_solid(isolid, 1, 0, m2 / 1000.0);
        }
        for ichem in 0..self.layers[0].cchem.len() {
            let m2 = self.layers[1].cchem[ichem] * v2;
            let m1 = self.layers[0].cchem[ichem] * v1;
            let conc = (m1 + m2) / combined_volume;
            self.layers[0].cchem[ichem] = conc;
            self.layers[0].cchem_new[ichem] = conc;
            ledger.transfer_chem(ichem, 1, 0, m2 / 1000.0);
        }

        let merged = &mut self.layers[0];
        merged.volume = combined_volume;
        merged.new_volume = combined_volume;
        merged.thickness = combined_volume / merged.area;
        merged.min_volume = opts.min_fraction * combined_volume;
        merged.max_volume = opts.max_fraction * combined_volume;
        let top_of_merged = self.layers[1].elevation;
        self.layers[0].elevation = top_of_merged;

        // every layer above the void moves down one slot
        for k in 2..self.layers.len() {
            for isolid in 0..self.layers[k].csed.len() {
                let kg = self.layers[k].csed[isolid] * self.layers[k].volume / 1000.0;
                ledger.transfer_solid(isolid, k, k - 1, kg);
            }
            for ichem in 0..self.layers[k].cchem.len() {
                let kg = self.layers[k].cchem[ichem] * self.layers[k].volume / 1000.0;
                ledger.transfer_chem(ichem, k, k - 1, kg);
            }
        }
        self.layers.remove(1);
    }
}
