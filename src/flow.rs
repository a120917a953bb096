//! Vertical soil water movement: saturated and unsaturated percolation with
//! saturation push-back, and removal of evaporated or transpired water.
//!
//! Layers flagged frozen conduct at 1% of their unfrozen rate and lose no
//! water to evaporation or transpiration.

use serde::Deserialize;

use crate::soil_hydra::SoilProfile;

// Relative conductivity of a frozen layer (Parton et al. 1998)
const FROZEN_K_REL: f64 = 0.01;

fn k_rel(frozen: bool) -> f64 {
    if frozen { FROZEN_K_REL } else { 1.0 }
}

// Slow (unsaturated) drainage parameters
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DrainageParams {
    pub sdrainpar: f64,  // Slow drainage rate at field capacity [cm/day]
    pub sdraindpth: f64, // Decay of slow drainage below field capacity [-]
}

impl Default for DrainageParams {
    fn default() -> Self {
        DrainageParams {
            sdrainpar: 0.02,
            sdraindpth: 6.0,
        }
    }
}

// Per-layer water content and the day's drainage fluxes [cm]
#[derive(Clone, Debug, PartialEq)]
pub struct SoilWaterState {
    pub swc: Vec<f64>,
    pub drain: Vec<f64>,     // Net drainage out of the bottom of each layer
    pub drain_out: f64,      // Deep drainage out of the profile
    pub standing_water: f64, // Ponded water the profile could not take
}

impl SoilWaterState {
    pub fn new(swc: Vec<f64>) -> Self {
        let n = swc.len();
        SoilWaterState {
            swc,
            drain: vec![0.0; n],
            drain_out: 0.0,
            standing_water: 0.0,
        }
    }

    // Start a new day's drainage accounting
    pub fn reset_fluxes(&mut self) {
        self.drain.iter_mut().for_each(|d| *d = 0.0);
        self.drain_out = 0.0;
    }

    pub fn total(&self) -> f64 {
        self.swc.iter().sum()
    }
}

// Push any water above saturation up to the layer above, bottom to top.
// Returns what the top layer could not hold.
fn push_back_saturated(state: &mut SoilWaterState, swc_sat: &[f64]) -> f64 {
    let mut excess_top = 0.0;
    for j in (0..state.swc.len()).rev() {
        if state.swc[j] > swc_sat[j] {
            let push = state.swc[j] - swc_sat[j];
            state.swc[j] -= push;
            if j > 0 {
                state.drain[j - 1] -= push;
                state.swc[j - 1] += push;
            } else {
                excess_top = push;
            }
        }
    }
    excess_top
}

/// Infiltrate `ppt_left` under high water conditions: saturated percolation
/// of everything above field capacity, then saturation push-back.
///
/// Overwrites `drain`, `drain_out` and `standing_water`.
pub fn infiltrate_water_high(
    state: &mut SoilWaterState,
    ppt_left: f64,
    profile: &SoilProfile,
    frozen: &[bool],
) {
    let n = profile.n_layers();
    state.swc[0] += ppt_left;
    state.standing_water = 0.0;

    for (i, layer) in profile.layers.iter().enumerate() {
        let d = (k_rel(frozen[i])
            * (1.0 - layer.texture.impermeability)
            * (state.swc[i] - layer.swc_fc))
            .max(0.0);
        state.drain[i] = d;
        state.swc[i] -= d;
        if i + 1 < n {
            state.swc[i + 1] += d;
        } else {
            state.drain_out = d;
        }
    }

    state.standing_water = push_back_saturated(state, &profile.swc_sat());
}

/// Unsaturated percolation of layers above their minimum water content.
///
/// Adds to `drain`, `drain_out` and `standing_water`.
pub fn infiltrate_water_low(
    state: &mut SoilWaterState,
    params: &DrainageParams,
    profile: &SoilProfile,
    frozen: &[bool],
) {
    let n = profile.n_layers();

    for (i, layer) in profile.layers.iter().enumerate() {
        let swc = state.swc[i];
        let d = if swc <= layer.swc_min {
            0.0
        } else {
            let swc_avail = (swc - layer.swc_min).max(0.0);
            let drainpot = if swc > layer.swc_fc {
                params.sdrainpar
            } else {
                params.sdrainpar * ((swc - layer.swc_fc) * params.sdraindpth / layer.width()).exp()
            };
            k_rel(frozen[i]) * (1.0 - layer.texture.impermeability) * swc_avail.min(drainpot)
        };

        state.drain[i] += d;
        state.swc[i] -= d;
        if i + 1 < n {
            state.swc[i + 1] += d;
        } else {
            state.drain_out += d.max(0.0);
        }
    }

    state.standing_water += push_back_saturated(state, &profile.swc_sat());
}

/// Remove water for evaporation or transpiration from the first
/// `coeff.len()` layers.
///
/// Each layer's share is its coefficient divided by its matric potential,
/// normalised over all layers. Frozen layers keep their share in the
/// normalisation but lose nothing. Removal stops at `swc_min`. Writes the
/// removed amounts to `qty` and returns their total.
pub fn remove_from_soil(
    swc: &mut [f64],
    qty: &mut [f64],
    coeff: &[f64],
    rate: f64,
    profile: &SoilProfile,
    frozen: &[bool],
) -> f64 {
    let n = coeff.len();
    let swpfrac: Vec<f64> = (0..n)
        .map(|i| {
            let swp = profile.layers[i].swp(swc[i]);
            if coeff[i] == 0.0 || swp <= 0.0 {
                0.0
            } else {
                coeff[i] / swp
            }
        })
        .collect();
    let sumswp: f64 = swpfrac.iter().sum();

    qty[..n].iter_mut().for_each(|q| *q = 0.0);
    if sumswp == 0.0 {
        return 0.0;
    }

    let mut removed = 0.0;
    for i in 0..n {
        if frozen[i] {
            continue;
        }
        let q = swpfrac[i] / sumswp * rate;
        let swc_avail = (swc[i] - profile.layers[i].swc_min).max(0.0);
        qty[i] = q.min(swc_avail);
        swc[i] -= qty[i];
        removed += qty[i];
    }
    removed
}
