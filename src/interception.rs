//! Rainfall interception by standing vegetation and litter, evaporation from
//! intercepted or ponded water, and the split of soil water loss between
//! bare-soil evaporation and transpiration.
//!
//! Interception is linear in precipitation with cover dependent intercept and
//! slope (Corbet & Crouse 1968, as refit for each vegetation type).

use serde::Deserialize;

use crate::vegetation::VegType;

// Upper limit of the bare-soil evaporation fraction
const BSE_MAX: f64 = 0.995;

// Interception coefficients: intercepted = ((a + b*x) + (c + d*x) * ppt) * scale
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct InterceptionParams {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl InterceptionParams {
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        InterceptionParams { a, b, c, d }
    }

    fn potential(&self, x: f64, ppt: f64, scale: f64) -> f64 {
        let intcpt = self.b * x + self.a;
        let slope = self.d * x + self.c;
        (intcpt + slope * ppt) * scale
    }
}

// Most a canopy can hold, by vegetation type. Trees are limited by ppt only.
fn max_intercepted(veg: VegType, x: f64, ppt: f64) -> f64 {
    match veg {
        VegType::Tree => ppt,
        VegType::Shrub | VegType::Grass | VegType::Forb => 0.1 * x,
    }
}

/// Water intercepted by one vegetation type.
///
/// `x` is leaf area index for trees and vegetation cover otherwise.
/// Returns `(ppt_left, intercepted)` in cm.
pub fn intercept(
    veg: VegType,
    ppt: f64,
    x: f64,
    scale: f64,
    params: &InterceptionParams,
) -> (f64, f64) {
    if x > 0.0 && ppt > 0.0 {
        let intercepted = params
            .potential(x, ppt, scale)
            .min(ppt)
            .min(max_intercepted(veg, x, ppt))
            .max(0.0);
        ((ppt - intercepted).max(0.0), intercepted)
    } else {
        (ppt, 0.0)
    }
}

/// Water intercepted by litter; decrements `ppt_left` in place and returns
/// the intercepted amount.
pub fn intercept_litter(
    ppt_left: &mut f64,
    litter: f64,
    scale: f64,
    params: &InterceptionParams,
) -> f64 {
    if litter == 0.0 {
        0.0
    } else if *ppt_left > 0.0 {
        let intercepted = params
            .potential(litter, *ppt_left, scale)
            .min(*ppt_left)
            .min(0.2 * litter)
            .max(0.0);
        *ppt_left = (*ppt_left - intercepted).max(0.0);
        intercepted
    } else {
        *ppt_left = 0.0;
        0.0
    }
}

/// Fractions of soil water loss going to bare-soil evaporation and to
/// transpiration, `(f_evap, f_transp)`. Same relation for every type.
pub fn est_partitioning(_veg: VegType, live_lai: f64, lai_param: f64) -> (f64, f64) {
    let fbse = (-lai_param * live_lai).exp().min(BSE_MAX);
    (fbse, 1.0 - fbse)
}

/// Evaporate from a surface pool (intercepted or standing water).
///
/// On return `rate` holds the amount actually evaporated, which is also
/// added to `aet`.
pub fn evap_from_surface(pool: &mut f64, rate: &mut f64, aet: &mut f64) {
    if *pool > *rate {
        *pool -= *rate;
        *aet += *rate;
    } else {
        *rate = *pool;
        *aet += *pool;
        *pool = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grass_params() -> InterceptionParams {
        InterceptionParams::new(0.0182, 0.00065, 0.0019, 0.0016)
    }

    #[test]
    fn no_rain_intercepts_nothing() {
        for veg in VegType::ALL {
            assert_eq!(intercept(veg, 0.0, 5.0, 1.0, &grass_params()), (0.0, 0.0));
        }
    }

    #[test]
    fn no_cover_intercepts_nothing() {
        for veg in VegType::ALL {
            assert_eq!(intercept(veg, 1.0, 0.0, 1.0, &grass_params()), (1.0, 0.0));
        }
    }

    #[test]
    fn intercepted_is_linear_then_capped() {
        let p = InterceptionParams::new(0.1, 0.0, 0.5, 0.0);
        // potential 0.1 + 0.5 * 1 = 0.6, cap 0.1 * cover = 0.5
        let (left, int) = intercept(VegType::Shrub, 1.0, 5.0, 1.0, &p);
        assert_relative_eq!(int, 0.5);
        assert_relative_eq!(left, 0.5);

        // trees are only limited by ppt
        let (left, int) = intercept(VegType::Tree, 1.0, 5.0, 1.0, &p);
        assert_relative_eq!(int, 0.6);
        assert_relative_eq!(left, 0.4);

        let (left, int) = intercept(VegType::Tree, 0.1, 5.0, 1.0, &p);
        assert_relative_eq!(int, 0.1);
        assert_relative_eq!(left, 0.0);
    }

    #[test]
    fn scale_shrinks_interception() {
        let p = grass_params();
        let (_, full) = intercept(VegType::Grass, 1.0, 3.0, 1.0, &p);
        let (_, half) = intercept(VegType::Grass, 1.0, 3.0, 0.5, &p);
        assert_relative_eq!(half, full / 2.0);
    }

    #[test]
    fn litter_without_biomass_leaves_ppt_untouched() {
        let mut ppt = 1.0;
        let int = intercept_litter(&mut ppt, 0.0, 1.0, &grass_params());
        assert_eq!(int, 0.0);
        assert_eq!(ppt, 1.0);
    }

    #[test]
    fn litter_decrements_ppt_left() {
        let p = InterceptionParams::new(0.0, 0.0151, 0.00064, 0.0);
        let mut ppt = 1.0;
        let int = intercept_litter(&mut ppt, 10.0, 1.0, &p);
        assert_relative_eq!(int, 0.151 + 0.00064);
        assert_relative_eq!(ppt + int, 1.0);
    }

    #[test]
    fn litter_with_no_ppt() {
        let mut ppt = 0.0;
        assert_eq!(intercept_litter(&mut ppt, 50.0, 1.0, &grass_params()), 0.0);
        assert_eq!(ppt, 0.0);
    }

    #[test]
    fn partitioning_fractions() {
        let (fe, ft) = est_partitioning(VegType::Grass, 0.0, 1.0);
        assert_relative_eq!(fe, 0.995);
        assert_relative_eq!(ft, 0.005, epsilon = 1e-12);

        let (fe, ft) = est_partitioning(VegType::Tree, 2.0, 0.5);
        assert_relative_eq!(fe, (-1.0f64).exp());
        assert_relative_eq!(fe + ft, 1.0);
    }

    #[test]
    fn surface_evaporation_limited_by_pool() {
        let (mut pool, mut rate, mut aet) = (0.3, 0.5, 0.1);
        evap_from_surface(&mut pool, &mut rate, &mut aet);
        assert_eq!(pool, 0.0);
        assert_relative_eq!(rate, 0.3);
        assert_relative_eq!(aet, 0.4);

        let (mut pool, mut rate, mut aet) = (1.0, 0.25, 0.0);
        evap_from_surface(&mut pool, &mut rate, &mut aet);
        assert_relative_eq!(pool, 0.75);
        assert_relative_eq!(rate, 0.25);
        assert_relative_eq!(aet, 0.25);
    }
}
