//! Daily soil temperature profile (Parton 1978, 1984) solved with an
//! explicit finite difference scheme on an evenly spaced regression grid,
//! and the frozen status of soil layers derived from it (Parton et al. 1998).
//!
//! Soil layers and grid cells do not line up. A correspondence table holds,
//! for every grid cell and soil layer, how many cm of the cell fall into the
//! layer. A negative entry in the extra last column marks the part of a cell
//! below the deepest layer, which takes its properties from that layer.

use nalgebra::DMatrix;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::boundary_cond::{SurfaceTempParams, surface_temperature};
use crate::error::SoilTemperatureError;
use crate::soil_hydra::SoilProfile;

const SEC_PER_DAY: f64 = 86400.0;

// Layers at or below this temperature [C] may freeze
pub const FREEZING_TEMP_C: f64 = -1.0;
// A layer needs theta_sat - theta < this to freeze [cm3/cm3]
pub const MIN_VWC_TO_FREEZE: f64 = 0.13;

// Grid temperatures outside this range [C] are flagged
const EXTREME_TEMP_C: f64 = 100.0;

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SoilTempParams {
    pub enabled: bool,
    pub cs_param1: f64,   // Thermal conductivity at wilting point
    pub cs_param2: f64,   // Increase of conductivity towards field capacity
    pub sh_param: f64,    // Specific heat of dry soil [cal/g/C]
    pub delta_x: f64,     // Grid spacing [cm]
    pub max_depth: f64,   // Depth of the constant bottom temperature [cm]
    pub bottom_temp: f64, // Constant temperature at max_depth [C]
    #[serde(flatten)]
    pub surface: SurfaceTempParams,
}

impl Default for SoilTempParams {
    fn default() -> Self {
        SoilTempParams {
            enabled: true,
            cs_param1: 0.0007,
            cs_param2: 0.0003,
            sh_param: 0.18,
            delta_x: 15.0,
            max_depth: 990.0,
            bottom_temp: 4.15,
            surface: SurfaceTempParams::default(),
        }
    }
}

// Linear interpolation at x between (x1, y1) and (x2, y2)
fn interpolation(x1: f64, x2: f64, y1: f64, y2: f64, x: f64) -> f64 {
    if x2 == x1 {
        y1
    } else {
        y1 + (y2 - y1) * (x - x1) / (x2 - x1)
    }
}

/// Fixed-spacing depth discretization of the heat equation and its mapping
/// onto the soil layers.
#[derive(Clone, Debug, PartialEq)]
pub struct RegressionGrid {
    delta_x: f64,
    max_depth: f64,
    n_rgr: usize,
    depths: Vec<f64>,     // Bottom of each cell, n_rgr + 1 entries [cm]
    cor: DMatrix<f64>,    // (n_rgr + 1) x (n_layers + 1) correspondence table [cm]
    layer_depths: Vec<f64>,
    layer_widths: Vec<f64>,
    fc: Vec<f64>,           // [cm3/cm3]
    wp: Vec<f64>,           // [cm3/cm3]
    bulk_density: Vec<f64>, // [g/cm3]
}

impl RegressionGrid {
    pub fn new(
        profile: &SoilProfile,
        delta_x: f64,
        max_depth: f64,
    ) -> Result<Self, SoilTemperatureError> {
        let profile_depth = profile.total_depth();
        if max_depth < profile_depth {
            return Err(SoilTemperatureError::MaxDepthTooShallow {
                max_depth,
                profile_depth,
            });
        }
        let cells = if delta_x > 0.0 { (max_depth / delta_x).floor() } else { 0.0 };
        if cells < 2.0 {
            return Err(SoilTemperatureError::GridTooSmall { max_depth, delta_x });
        }
        let n_rgr = cells as usize - 1;

        let depths: Vec<f64> = (0..=n_rgr).map(|i| (i + 1) as f64 * delta_x).collect();
        let layer_depths = profile.depths().to_vec();
        let widths = profile.widths();
        let cor = correspondence(&layer_depths, &widths, &depths, delta_x);

        let mut grid = RegressionGrid {
            delta_x,
            max_depth,
            n_rgr,
            depths,
            cor,
            layer_depths,
            layer_widths: widths,
            fc: vec![],
            wp: vec![],
            bulk_density: vec![],
        };

        let per_width = |v: Vec<f64>| -> Vec<f64> {
            v.iter()
                .zip(&grid.layer_widths)
                .map(|(x, w)| x / w)
                .collect()
        };
        let fc = per_width(profile.swc_fc());
        let wp = per_width(profile.swc_wp());
        let bd: Vec<f64> = profile
            .layers
            .iter()
            .map(|l| l.texture.bulk_density)
            .collect();

        grid.fc = grid.layers_to_grid(&fc);
        grid.wp = grid.layers_to_grid(&wp);
        grid.bulk_density = grid.layers_to_grid(&bd);
        Ok(grid)
    }

    /// Index of the deepest grid cell; the grid has `n_rgr() + 1` cells.
    pub fn n_rgr(&self) -> usize {
        self.n_rgr
    }

    pub fn depths(&self) -> &[f64] {
        &self.depths
    }

    /// cm of grid cell `i` in soil layer `j`, negative past the deepest
    /// layer, 0 outside the table.
    pub fn correspondence(&self, i: usize, j: usize) -> f64 {
        self.cor.get((i, j)).copied().unwrap_or(0.0)
    }

    fn n_layers(&self) -> usize {
        self.layer_depths.len()
    }

    /// Average a per-layer property onto the grid cells, weighted by the
    /// fraction of each layer inside the cell.
    pub fn layers_to_grid(&self, var: &[f64]) -> Vec<f64> {
        let n = self.n_layers();
        let w = &self.layer_widths;
        let mut res = vec![0.0; self.n_rgr + 1];
        let mut j = 0;

        for (i, r) in res.iter_mut().enumerate() {
            let (mut acc, mut sum) = (0.0, 0.0);
            while acc < self.delta_x && j <= n {
                let c = self.correspondence(i, j);
                if c >= 0.0 {
                    if j == n {
                        break;
                    }
                    let ratio = c / w[j];
                    *r += var[j] * ratio;
                    sum += ratio;
                    acc += c;
                    if acc < self.delta_x {
                        j += 1;
                    }
                } else {
                    // below the profile: copy the deepest layer
                    let ratio = -c / w[j - 1];
                    *r += var[j - 1] * ratio;
                    sum += ratio;
                    acc -= c;
                }
            }
            if sum > 0.0 {
                *r /= sum;
            }
        }
        res
    }

    /// Interpolate layer temperatures to the grid nodes. Index 0 of the
    /// result is the surface and is left at 0; the last node is `end_temp`.
    /// Above the first layer's depth the first layer's temperature is used.
    pub fn layer_temps_to_grid(&self, temps: &[f64], end_temp: f64) -> Vec<f64> {
        let n = self.n_layers();
        let mut depth2 = self.layer_depths.clone();
        depth2.push(self.max_depth);
        let mut temp2 = temps.to_vec();
        temp2.push(end_temp);

        let mut res = vec![0.0; self.n_rgr + 2];
        let mut j1 = 0;
        for i in 0..self.n_rgr {
            let d = self.depths[i];
            if d <= depth2[0] {
                res[i + 1] = temp2[0];
                continue;
            }
            while j1 + 1 < n && depth2[j1 + 1] < d {
                j1 += 1;
            }
            let mut j2 = j1 + 1;
            while j2 + 1 < n + 1 && depth2[j2 + 1] <= d {
                j2 += 1;
            }
            res[i + 1] = interpolation(depth2[j1], depth2[j2], temp2[j1], temp2[j2], d);
        }
        res[self.n_rgr + 1] = end_temp;
        res
    }

    /// Average the grid node temperatures `temps_r` over each soil layer.
    ///
    /// The surface node is only used for a layer if no deeper node falls
    /// within it.
    pub fn grid_to_layer_temps(&self, temps_r: &[f64]) -> Vec<f64> {
        let last = self.n_rgr + 1;
        let mut i = 0;
        let mut out = Vec::with_capacity(self.n_layers());

        for (j, (&width, &depth)) in self.layer_widths.iter().zip(&self.layer_depths).enumerate() {
            let (mut acc, mut sum, mut n) = (0.0, 0.0, 0usize);
            let mut surface = None;
            while acc < width && i <= last {
                if self.correspondence(i, j) == 0.0 {
                    i += 1;
                }
                let c = self.correspondence(i, j);
                if c > 0.0 {
                    let top = if i > 0 { self.depths[i - 1] } else { 0.0 };
                    let t = interpolation(top, self.depths[i], temps_r[i], temps_r[i + 1], depth);
                    if i == 0 && acc + c < width {
                        surface = Some(t);
                    } else {
                        sum += t;
                        n += 1;
                    }
                    acc += c;
                    if acc < width {
                        i += 1;
                    }
                } else if c < 0.0 {
                    break;
                }
            }
            out.push(if n > 0 {
                sum / n as f64
            } else {
                surface.unwrap_or(temps_r[0])
            });
        }
        out
    }
}

// Walk layer and cell boundaries together, filling the correspondence table
fn correspondence(
    layer_depths: &[f64],
    widths: &[f64],
    cell_depths: &[f64],
    delta_x: f64,
) -> DMatrix<f64> {
    let n = layer_depths.len();
    let mut cor = DMatrix::zeros(cell_depths.len(), n + 1);
    let (mut x1, mut x2) = (0, 0);
    let mut d1 = 0.0; // Part of layer x1 not yet assigned to a cell

    for (i, &cell_depth) in cell_depths.iter().enumerate() {
        let mut acc = 0.0;
        while x2 < n && acc < delta_x {
            let (j, d2);
            if d1 > 0.0 {
                j = x1;
                if d1 > delta_x {
                    d2 = delta_x;
                    d1 -= delta_x;
                } else {
                    d2 = d1;
                    d1 = 0.0;
                    x2 += 1;
                }
            } else {
                j = x2;
                if cell_depth < layer_depths[x2] {
                    d2 = (delta_x - acc).max(0.0);
                    d1 = widths[x2] - d2;
                } else {
                    d2 = widths[x2];
                    d1 = 0.0;
                    x2 += 1;
                }
            }
            acc += d2;
            cor[(i, j)] = d2;
        }
        x1 = x2;

        if x2 >= n && acc < delta_x {
            cor[(i, n)] = -(delta_x - acc);
        }
    }
    cor
}

/// Daily forcing of the soil temperature model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SoilTempForcing {
    pub air_temp: f64,   // Mean air temperature [C]
    pub pet: f64,        // [cm]
    pub aet: f64,        // [cm]
    pub biomass: f64,    // Live and dead aboveground biomass [g/m2]
    pub snow_depth: f64, // [cm]
    pub swe: f64,        // Snow water equivalent [cm]
}

#[derive(Clone, Debug)]
enum TempState {
    Uninitialized,
    Ready { grid: RegressionGrid, temps_r: Vec<f64> },
    Errored,
}

/// Soil temperature state carried from one day to the next.
///
/// Set up on the first call to `advance`. A failed setup disables the model
/// for the rest of the run; later calls leave temperatures and frozen flags
/// unchanged.
#[derive(Clone, Debug)]
pub struct SoilTemperatureModel {
    params: SoilTempParams,
    state: TempState,
    layer_temps: Vec<f64>,
    frozen: Vec<bool>,
    surface_temp: [f64; 2], // Yesterday, today [C]
    fusion_pool: Vec<f64>,
    error: Option<SoilTemperatureError>,
}

impl SoilTemperatureModel {
    pub fn new(params: SoilTempParams, profile: &SoilProfile) -> Self {
        let layer_temps: Vec<f64> = profile.layers.iter().map(|l| l.texture.init_temp).collect();
        let n = layer_temps.len();
        SoilTemperatureModel {
            params,
            state: TempState::Uninitialized,
            layer_temps,
            frozen: vec![false; n],
            surface_temp: [0.0; 2],
            fusion_pool: vec![0.0; n],
            error: None,
        }
    }

    pub fn layer_temps(&self) -> &[f64] {
        &self.layer_temps
    }

    pub fn frozen(&self) -> &[bool] {
        &self.frozen
    }

    pub fn surface_temp(&self) -> f64 {
        self.surface_temp[1]
    }

    /// First error met during the run, if any.
    pub fn error(&self) -> Option<&SoilTemperatureError> {
        self.error.as_ref()
    }

    pub fn grid(&self) -> Option<&RegressionGrid> {
        match &self.state {
            TempState::Ready { grid, .. } => Some(grid),
            _ => None,
        }
    }

    fn flag(&mut self, err: SoilTemperatureError) {
        if self.error.is_none() {
            error!(%err, "soil temperature");
            self.error = Some(err);
        }
    }

    /// Advance the temperature profile by one day given today's forcing and
    /// soil water content, then update the frozen status of each layer.
    pub fn advance(&mut self, forcing: &SoilTempForcing, swc: &[f64], profile: &SoilProfile) {
        let p = self.params;
        if !p.enabled {
            return;
        }

        if matches!(self.state, TempState::Uninitialized) {
            self.surface_temp[1] = forcing.air_temp;
            self.set_frozen_unfrozen(swc, profile);
            self.state = match RegressionGrid::new(profile, p.delta_x, p.max_depth) {
                Ok(grid) => {
                    let mut temps_r = grid.layer_temps_to_grid(&self.layer_temps, p.bottom_temp);
                    temps_r[0] = forcing.air_temp;
                    info!(cells = grid.n_rgr() + 1, delta_x = p.delta_x, "soil temperature grid ready");
                    TempState::Ready { grid, temps_r }
                }
                Err(err) => {
                    self.flag(err);
                    TempState::Errored
                }
            };
        }

        let TempState::Ready { grid, temps_r: old } = &self.state else {
            return;
        };

        let t1 = surface_temperature(
            forcing.air_temp,
            forcing.snow_depth,
            forcing.swe,
            forcing.biomass,
            forcing.pet,
            forcing.aet,
            &p.surface,
        );

        let vwc: Vec<f64> = swc
            .iter()
            .zip(&profile.layers)
            .map(|(w, l)| w / l.width())
            .collect();
        let vwc_r = grid.layers_to_grid(&vwc);

        let n_rgr = grid.n_rgr();
        let part1 = SEC_PER_DAY / (grid.delta_x * grid.delta_x);
        let mut temps_r = vec![0.0; n_rgr + 2];
        temps_r[0] = t1;
        let mut issues = Vec::new();
        for i in 1..=n_rgr {
            let k = i - 1;
            let pe = (vwc_r[k] - grid.wp[k]) / (grid.fc[k] - grid.wp[k]);
            let cs = p.cs_param1 + pe * p.cs_param2;
            let sh = vwc_r[k] + p.sh_param * (1.0 - vwc_r[k]);
            let parts = part1 * cs / (sh * grid.bulk_density[k]);
            if parts > 1.0 {
                issues.push(SoilTemperatureError::Unstable { cell: k, parts });
            }
            temps_r[i] = old[i] + parts * (temps_r[i - 1] - 2.0 * old[i] + old[i + 1]);
            if !(temps_r[i].abs() < EXTREME_TEMP_C) {
                issues.push(SoilTemperatureError::ExtremeTemperature { cell: k, value: temps_r[i] });
            }
        }
        temps_r[n_rgr + 1] = p.bottom_temp;

        let mut layer_temps = grid.grid_to_layer_temps(&temps_r);
        let old_layer_temps = std::mem::take(&mut self.layer_temps);
        if self.adjust_for_freeze_thaw(&old_layer_temps, &mut layer_temps) {
            let TempState::Ready { grid, .. } = &self.state else {
                return;
            };
            temps_r = grid.layer_temps_to_grid(&layer_temps, p.bottom_temp);
            temps_r[0] = t1;
        }

        debug!(surface = t1, layers = ?layer_temps, "soil temperature");
        self.surface_temp = [self.surface_temp[1], t1];
        self.layer_temps = layer_temps;
        for err in issues {
            self.flag(err);
        }
        self.set_frozen_unfrozen(swc, profile);
        if let TempState::Ready { temps_r: old, .. } = &mut self.state {
            *old = temps_r;
        }
    }

    // A layer is frozen when at or below freezing and close to saturation
    fn set_frozen_unfrozen(&mut self, swc: &[f64], profile: &SoilProfile) {
        for (i, layer) in profile.layers.iter().enumerate() {
            self.frozen[i] = self.layer_temps[i] <= FREEZING_TEMP_C
                && swc[i] > layer.swc_sat - layer.width() * MIN_VWC_TO_FREEZE;
        }
    }

    // Latent heat of freezing and thawing (Eitzinger et al. 2000). The fusion
    // pools are carried but do not yet alter temperatures; returns whether
    // `temps` was changed.
    fn adjust_for_freeze_thaw(&mut self, _old_temps: &[f64], _temps: &mut [f64]) -> bool {
        self.fusion_pool.iter_mut().for_each(|p| *p = 0.0);
        false
    }
}
