//! Potential evapotranspiration (Penman 1948) and the soil water limited
//! rates of bare-soil evaporation derived from it.
//!
//! References:
//! - Penman, H. L. (1948). Natural evaporation from open water, bare soil and grass.
//! - Sellers, W. D. (1965). Physical climatology.
//! - Spencer, J. W. (1971). Fourier series representation of the position of the sun.
//! - Allen, R. G. et al. (1998). FAO Irrigation and drainage paper 56.

use std::f64::consts::PI;

use serde::Deserialize;

use crate::soil_hydra::SoilProfile;

const TWO_PI: f64 = 6.283185;

// Site geometry and surface properties used by `petfunc`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SiteGeometry {
    pub latitude: f64,  // [radians]
    pub elevation: f64, // [m a.s.l.]
    pub slope: f64,     // [degrees]
    pub aspect: f64,    // [degrees, 180 = south]
    pub albedo: f64,    // [-]
}

// Monthly sky conditions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyConditions {
    pub humidity: f64,     // Relative humidity [%]
    pub wind_speed: f64,   // At 2 m [m/s]
    pub cloud_cover: f64,  // [%]
    pub transmission: f64, // Atmospheric transmission coefficient [-]
}

// Shape of the tangent response of a rate to soil water potential
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct WatrateParams {
    pub shift: f64,  // x-shift of the inflection point
    pub shape: f64,  // slope at the inflection point
    pub inflec: f64, // y-value of the inflection point
    pub range: f64,  // max - min y-value
}

impl WatrateParams {
    pub fn evaporation_default() -> Self {
        WatrateParams {
            shift: 45.0,
            shape: 0.1,
            inflec: 0.25,
            range: 0.5,
        }
    }

    pub fn transpiration_default() -> Self {
        WatrateParams {
            shift: 45.0,
            shape: 0.1,
            inflec: 0.5,
            range: 1.1,
        }
    }
}

/// Saturation vapor pressure [mmHg] at `temp` [C] from the
/// Clausius-Clapeyron equation (Hess 1959).
pub fn svapor(temp: f64) -> f64 {
    let par1 = 1.0 / (temp + 273.0);
    let par2 = 6.11f64.ln() + 5418.38 * (0.00366 - par1);
    par2.exp() * 0.75
}

/// Potential evapotranspiration [cm/day] for day of year `doy` (base1) and
/// mean air temperature `avgtemp` [C]. Never below 0.01.
pub fn petfunc(doy: usize, avgtemp: f64, site: &SiteGeometry, sky: &SkyConditions) -> f64 {
    let rlat = site.latitude;

    // solar declination
    let day_angle = TWO_PI * (doy as f64 - 1.0) / 365.0;
    let declin = 0.006918 - 0.399912 * day_angle.cos() + 0.070257 * day_angle.sin()
        - 0.006758 * (2.0 * day_angle).cos()
        + 0.000907 * (2.0 * day_angle).sin()
        - 0.002697 * (3.0 * day_angle).cos()
        + 0.00148 * (3.0 * day_angle).sin();

    // sunset hour angle; clamped for polar day and night
    let cos_h = (-rlat.tan() * declin.tan()).clamp(-1.0, 1.0);
    let sin_h = (1.0 - cos_h * cos_h).sqrt();
    let ahou = sin_h.atan2(cos_h).max(0.0);

    let mut solrad = if site.slope != 0.0 {
        let step = ahou / 24.0;
        let azmth_slope = TWO_PI * (site.aspect - 180.0) / 360.0;
        let rslope = TWO_PI * site.slope / 360.0;
        let mut sum = 0.0;
        if step > 0.0 {
            for k in 0..=48 {
                let hou = -ahou + k as f64 * step;
                let cos_z = rlat.sin() * declin.sin() + rlat.cos() * declin.cos() * hou.cos();
                let sin_z = (1.0 - cos_z * cos_z).sqrt();
                let cos_a = (rlat.sin() * cos_z - declin.sin()) / (rlat.cos() * sin_z);
                let sin_a = declin.cos() * hou.sin() / sin_z;
                let azmth = sin_a.atan2(cos_a);
                sum += step
                    * (cos_z * rslope.cos() + sin_z * rslope.sin() * (azmth - azmth_slope).cos());
            }
        }
        sum
    } else {
        2.0 * (ahou * rlat.sin() * declin.sin() + rlat.cos() * declin.cos() * ahou.sin())
    };

    solrad = (1440.0 / TWO_PI) * 1.952 * solrad * sky.transmission;
    let shwave = solrad * 0.0168 / sky.transmission;

    // long wave radiation
    let kelvin = avgtemp + 273.15;
    let ftemp = (kelvin * 0.01).powi(4) * 11.71 * 0.0168;

    let vapor = svapor(avgtemp);
    let arads = 4098.0 * vapor / ((avgtemp + 237.3) * (avgtemp + 237.3)) * 5.0 / 9.0;
    let clrsky = 1.0 - sky.cloud_cover / 100.0;
    let humid = sky.humidity * vapor / 100.0;
    let windsp = sky.wind_speed * 53.70; // miles/day

    let par1 = 0.35 * (vapor - humid) * (1.0 + 0.0098 * windsp);
    let par2 = (1.0 - site.albedo) * shwave * (0.18 + 0.55 * clrsky)
        - ftemp * (0.56 - 0.092 * humid.sqrt()) * (0.10 + 0.90 * clrsky);

    let p = 101.3 * ((293.0 - 0.0065 * site.elevation) / 293.0).powf(5.26);
    let gamma = 0.000665 * p * 760.0 / 101.325 * 5.0 / 9.0;

    let result = ((arads * par2 + gamma * par1) / (arads + gamma)) / 10.0;
    result.max(0.01)
}

/// Arctangent response: `b + (c / pi) * atan(pi * d * (z - a))`.
pub fn tanfunc(z: f64, a: f64, b: f64, c: f64, d: f64) -> f64 {
    b + (c / PI) * (PI * d * (z - a)).atan()
}

/// Ratio of actual to potential evaporation (or transpiration) at soil water
/// potential `swp` [bar], clamped to [0, 1].
pub fn watrate(swp: f64, pet: f64, p: &WatrateParams) -> f64 {
    let par1 = if pet < 0.2 {
        3.0
    } else if pet < 0.4 {
        (0.4 - pet) * -10.0 + 5.0
    } else if pet < 0.6 {
        (0.6 - pet) * -15.0 + 8.0
    } else {
        8.0
    };
    tanfunc(p.shift - swp, par1, p.inflec, p.range, p.shape).clamp(0.0, 1.0)
}

// Width and coefficient weighted matric potential of the evaporation layers
fn evap_layer_swp(profile: &SoilProfile, swc: &[f64]) -> f64 {
    let n = profile.n_evap_layers();
    let (mut sumwidth, mut avswp) = (0.0, 0.0);
    for (layer, &w) in profile.layers[..n].iter().zip(swc) {
        let x = layer.width() * layer.texture.evap_coeff;
        sumwidth += x;
        avswp += x * layer.swp(w);
    }
    if sumwidth > 0.0 { avswp / sumwidth } else { 0.0 }
}

/// Potential bare-soil evaporation [cm/day] under vegetation with total
/// aboveground biomass `totagb`. Inhibited once `totagb` reaches `es_limit`.
pub fn pot_soil_evap(
    profile: &SoilProfile,
    swc: &[f64],
    totagb: f64,
    fbse: f64,
    pet: f64,
    es_limit: f64,
    p: &WatrateParams,
) -> f64 {
    if profile.n_evap_layers() == 0 || totagb >= es_limit {
        return 0.0;
    }
    let avswp = evap_layer_swp(profile, swc);
    pet * watrate(avswp, pet, p) * (1.0 - totagb / es_limit) * fbse
}

/// Potential evaporation [cm/day] from bare ground.
pub fn pot_soil_evap_bs(profile: &SoilProfile, swc: &[f64], pet: f64, p: &WatrateParams) -> f64 {
    if profile.n_evap_layers() == 0 {
        return 0.0;
    }
    let avswp = evap_layer_swp(profile, swc);
    pet * watrate(avswp, pet, p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soil_hydra::LayerTexture;
    use crate::vegetation::PerVeg;
    use approx::assert_relative_eq;

    fn site(slope: f64) -> SiteGeometry {
        SiteGeometry {
            latitude: 40f64.to_radians(),
            elevation: 1000.0,
            slope,
            aspect: 180.0,
            albedo: 0.15,
        }
    }

    fn sky() -> SkyConditions {
        SkyConditions {
            humidity: 50.0,
            wind_speed: 2.0,
            cloud_cover: 30.0,
            transmission: 1.0,
        }
    }

    #[test]
    fn saturation_vapor_pressure() {
        // ~4.58 mmHg at 0 C, ~17.5 mmHg at 20 C
        assert_relative_eq!(svapor(0.0), 4.58, max_relative = 0.02);
        assert_relative_eq!(svapor(20.0), 17.5, max_relative = 0.03);
    }

    #[test]
    fn pet_floor_and_temperature_response() {
        let cold = petfunc(15, -30.0, &site(0.0), &sky());
        assert!(cold >= 0.01);
        let mut last = 0.0;
        for t in [0.0, 10.0, 20.0, 30.0] {
            let pet = petfunc(180, t, &site(0.0), &sky());
            assert!(pet > last, "pet {pet} at {t} C not above {last}");
            last = pet;
        }
        // mid-summer at 25 C, a few mm per day
        let summer = petfunc(180, 25.0, &site(0.0), &sky());
        assert!(summer > 0.2 && summer < 1.2, "{summer}");
    }

    #[test]
    fn south_slope_gets_more_winter_energy() {
        let flat = petfunc(15, 5.0, &site(0.0), &sky());
        let south = petfunc(15, 5.0, &site(30.0), &sky());
        assert!(south > flat, "south {south} flat {flat}");
    }

    #[test]
    fn polar_night_stays_finite() {
        let mut s = site(10.0);
        s.latitude = 80f64.to_radians();
        let pet = petfunc(355, -20.0, &s, &sky());
        assert!(pet.is_finite());
        assert!(pet >= 0.01);
    }

    #[test]
    fn tanfunc_inflection() {
        assert_relative_eq!(tanfunc(3.0, 3.0, 0.5, 1.0, 0.1), 0.5);
        assert!(tanfunc(100.0, 3.0, 0.5, 1.0, 0.1) < 1.0);
    }

    #[test]
    fn watrate_is_bounded_and_decreases_with_dryness() {
        let p = WatrateParams::transpiration_default();
        let wet = watrate(0.1, 0.5, &p);
        let dry = watrate(40.0, 0.5, &p);
        assert!(wet <= 1.0 && dry >= 0.0);
        assert!(wet > dry);
        assert_eq!(watrate(1000.0, 0.5, &p), 0.0);
    }

    fn evap_profile() -> SoilProfile {
        let t = |w: f64, e: f64| LayerTexture {
            width: w,
            bulk_density: 1.3,
            gravel: 0.0,
            sand: 0.5,
            clay: 0.2,
            impermeability: 0.0,
            evap_coeff: e,
            transp_coeff: PerVeg::from_fn(|_| 0.3),
            transp_region: PerVeg::from_fn(|_| 1),
            init_temp: 1.0,
        };
        SoilProfile::new(vec![t(5.0, 0.7), t(10.0, 0.3), t(20.0, 0.0)], 30.0).unwrap()
    }

    #[test]
    fn soil_evaporation_limits() {
        let p = evap_profile();
        let swc = p.swc_fc();
        let wp = WatrateParams::evaporation_default();
        let bare = pot_soil_evap_bs(&p, &swc, 0.5, &wp);
        assert!(bare > 0.0 && bare <= 0.5);

        let under = pot_soil_evap(&p, &swc, 100.0, 0.8, 0.5, 999.0, &wp);
        assert!(under < bare);
        assert_eq!(pot_soil_evap(&p, &swc, 999.0, 0.8, 0.5, 999.0, &wp), 0.0);
    }
}
