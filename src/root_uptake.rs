//! Transpiration demand of a vegetation type and hydraulic redistribution
//! of soil water through its roots (Ryel et al. 2002).

use nalgebra::DMatrix;
use serde::Deserialize;

use crate::evapotranspiration::{WatrateParams, tanfunc, watrate};
use crate::soil_hydra::SoilProfile;
use crate::vegetation::VegType;

// Shading of live canopy by standing dead biomass
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShadeParams {
    pub scale: f64,   // Minimum shade factor [-]
    pub deadmax: f64, // Dead biomass below which there is no shading [g/m2]
    pub xinflex: f64,
    pub yinflex: f64,
    pub range: f64,
    pub slope: f64,
}

impl Default for ShadeParams {
    fn default() -> Self {
        ShadeParams {
            scale: 0.3,
            deadmax: 150.0,
            xinflex: 300.0,
            yinflex: 12.0,
            range: 34.0,
            slope: 0.002,
        }
    }
}

// Root conductance for hydraulic redistribution
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct HydRedParams {
    pub enabled: bool,
    pub max_cond_root: f64, // Max radial soil-root conductance [cm/bar/day]
    pub swp50: f64,         // Potential halving conductance [bar]
    pub shape_cond: f64,    // Shape of the relative conductance curve [-]
}

impl Default for HydRedParams {
    fn default() -> Self {
        HydRedParams {
            enabled: false,
            max_cond_root: 0.2328,
            swp50: 10.0,
            shape_cond: 3.22,
        }
    }
}

/// Weighted average soil water potential [bar] seen by the roots of `veg`.
///
/// Potentials are averaged by transpiration coefficient within each
/// transpiration region and the smallest regional average is returned.
pub fn transp_weighted_avg(veg: VegType, profile: &SoilProfile, swc: &[f64]) -> f64 {
    let n_regions = profile
        .layers
        .iter()
        .map(|l| *l.texture.transp_region.get(veg))
        .max()
        .unwrap_or(0);

    let mut swp_avg = 0.0;
    for r in 1..=n_regions {
        let (mut swp, mut sumco) = (0.0, 0.0);
        for (layer, &w) in profile.layers.iter().zip(swc) {
            if *layer.texture.transp_region.get(veg) == r {
                let co = *layer.texture.transp_coeff.get(veg);
                swp += co * layer.swp(w);
                sumco += co;
            }
        }
        if sumco > 0.0 {
            swp /= sumco;
        }
        swp_avg = if r == 1 { swp } else { swp.min(swp_avg) };
    }
    swp_avg
}

/// Potential transpiration [cm/day].
///
/// `swpavg` from `transp_weighted_avg`, `fbst` the transpiration share of
/// soil water loss.
pub fn pot_transp(
    swpavg: f64,
    biolive: f64,
    biodead: f64,
    fbst: f64,
    pet: f64,
    rate: &WatrateParams,
    shade: &ShadeParams,
) -> f64 {
    if biolive <= 0.0 {
        return 0.0;
    }
    let shadeaf = if biodead >= shade.deadmax {
        let f = |x| tanfunc(x, shade.xinflex, shade.yinflex, shade.range, shade.slope);
        ((f(biolive) / f(biodead)) * (1.0 - shade.scale) + shade.scale).min(1.0)
    } else {
        1.0
    };
    watrate(swpavg, pet, rate) * shadeaf * pet * fbst
}

/// Nightly redistribution of water between layers along the matric
/// potential gradient through roots with coefficients `root_co`. Water moves
/// from the layer under lower tension to the one under higher tension.
///
/// The top layer and frozen layers take no part. No layer gives up more than
/// its water above wilting point. Fluxes are multiplied by `scale` (the
/// vegetation fraction), written to `hydred` and applied to `swc`.
pub fn hydraulic_redistribution(
    swc: &mut [f64],
    hydred: &mut [f64],
    root_co: &[f64],
    params: &HydRedParams,
    scale: f64,
    profile: &SoilProfile,
    frozen: &[bool],
) {
    let n = profile.n_layers();
    let swp = profile.swp(swc);
    let swpwp: Vec<f64> = profile.layers.iter().map(|l| l.swp(l.swc_wp)).collect();
    let rel_cond: Vec<f64> = swp
        .iter()
        .map(|&p| (1.0 / (1.0 + (p / params.swp50).powf(params.shape_cond))).clamp(0.0, 1.0))
        .collect();

    let mut mat = DMatrix::<f64>::zeros(n, n);
    for i in 1..n {
        for j in (i + 1)..n {
            let wet_enough = swp[i] < swpwp[i] || swp[j] < swpwp[j];
            if !wet_enough || frozen[i] || frozen[j] {
                continue;
            }
            let rx = if swc[i] > swc[j] { root_co[i] } else { root_co[j] };
            if 1.0 - rx <= 0.0 {
                continue;
            }
            let flux = params.max_cond_root * 10.0 / 24.0 // 10-hour night
                * (swp[i] - swp[j])
                * rel_cond[i].max(rel_cond[j])
                * (root_co[i] * root_co[j] / (1.0 - rx));
            mat[(i, j)] = flux;
            mat[(j, i)] = -flux;
        }
    }

    for i in 0..n {
        let sum = mat.row(i).sum();
        let swa = (swc[i] - profile.layers[i].swc_wp).max(0.0);
        if sum < 0.0 && -sum > swa {
            let f = swa / -sum;
            mat.row_mut(i).scale_mut(f);
            mat.column_mut(i).scale_mut(f);
        }
    }

    for i in 0..n {
        hydred[i] = mat.row(i).sum() * scale;
        swc[i] += hydred[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soil_hydra::tests::loam;
    use approx::assert_relative_eq;

    fn profile() -> SoilProfile {
        let mut layers = vec![loam(5.0), loam(10.0), loam(20.0), loam(30.0)];
        for (t, co) in layers.iter_mut().zip([0.4, 0.3, 0.2, 0.1]) {
            t.transp_coeff.shrub = co;
        }
        layers[2].transp_region.shrub = 2;
        layers[3].transp_region.shrub = 2;
        SoilProfile::new(layers, 30.0).unwrap()
    }

    fn between(p: &SoilProfile, f: f64) -> Vec<f64> {
        p.layers
            .iter()
            .map(|l| l.swc_wp + f * (l.swc_fc - l.swc_wp))
            .collect()
    }

    #[test]
    fn weighted_average_takes_wettest_region() {
        let p = profile();
        let mut swc = p.swc_wp();
        // region 2 (layers 2 and 3) at 2 bar, region 1 at wilting point
        swc[2] = p.layers[2].swc_at(2.0);
        swc[3] = p.layers[3].swc_at(2.0);
        let avg = transp_weighted_avg(VegType::Shrub, &p, &swc);
        assert_relative_eq!(avg, 2.0, max_relative = 1e-9);

        let wet = transp_weighted_avg(VegType::Shrub, &p, &p.swc_fc());
        assert_relative_eq!(wet, 0.333, max_relative = 1e-9);
    }

    #[test]
    fn no_live_biomass_no_transpiration() {
        let r = WatrateParams::transpiration_default();
        assert_eq!(pot_transp(1.0, 0.0, 500.0, 0.5, 0.6, &r, &ShadeParams::default()), 0.0);
    }

    #[test]
    fn dead_biomass_shades() {
        let r = WatrateParams::transpiration_default();
        let s = ShadeParams::default();
        let open = pot_transp(1.0, 200.0, 0.0, 0.5, 0.6, &r, &s);
        let shaded = pot_transp(1.0, 200.0, 400.0, 0.5, 0.6, &r, &s);
        assert!(open > 0.0);
        assert!(shaded < open);
        assert!(shaded >= open * s.scale);
    }

    #[test]
    fn redistribution_moves_water_to_drier_layers_and_conserves() {
        let p = profile();
        let mut swc = between(&p, 0.0);
        swc[1] = p.layers[1].swc_fc;
        let before: f64 = swc.iter().sum();
        let mut hydred = vec![0.0; 4];
        let root_co = [0.4, 0.3, 0.2, 0.1];
        let params = HydRedParams {
            enabled: true,
            ..HydRedParams::default()
        };

        hydraulic_redistribution(&mut swc, &mut hydred, &root_co, &params, 1.0, &p, &[false; 4]);

        assert_eq!(hydred[0], 0.0);
        assert!(hydred[1] < 0.0);
        assert!(hydred[2] > 0.0 && hydred[3] > 0.0);
        assert_relative_eq!(hydred.iter().sum::<f64>(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(swc.iter().sum::<f64>(), before, max_relative = 1e-12);
        assert!(swc[1] >= p.layers[1].swc_wp - 1e-12);
    }

    #[test]
    fn frozen_layers_block_redistribution() {
        let p = profile();
        let mut swc = between(&p, 0.0);
        swc[1] = p.layers[1].swc_fc;
        let before = swc.clone();
        let mut hydred = vec![0.0; 4];
        hydraulic_redistribution(
            &mut swc,
            &mut hydred,
            &[0.4, 0.3, 0.2, 0.1],
            &HydRedParams::default(),
            1.0,
            &p,
            &[false, true, false, false],
        );
        assert_eq!(hydred, vec![0.0; 4]);
        assert_eq!(swc, before);
    }
}
