use serde::Deserialize;

// Parameters of the snow-free surface temperature relation (Parton 1978)
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurfaceTempParams {
    pub bm_limiter: f64, // Biomass above which the canopy cools the surface [g/m2]
    pub t1_param1: f64,  // Warming by net radiation under sparse canopy
    pub t1_param2: f64,  // Cooling by dense canopy
    pub t1_param3: f64,  // Biomass scale of the cooling
}

impl Default for SurfaceTempParams {
    fn default() -> Self {
        SurfaceTempParams {
            bm_limiter: 300.0,
            t1_param1: 15.0,
            t1_param2: -4.0,
            t1_param3: 600.0,
        }
    }
}

/// Soil surface temperature [C] under a snowpack holding `snow` [cm] of
/// water (Parton et al. 1998).
pub fn surface_temperature_under_snow(air_temp_avg: f64, snow: f64) -> f64 {
    if snow == 0.0 {
        0.0
    } else if air_temp_avg >= 0.0 {
        -2.0
    } else {
        let k_snow = (-0.15 * snow + 1.0).max(0.0);
        0.3 * air_temp_avg * k_snow - 2.0
    }
}

/// Upper boundary temperature of the soil heat equation [C].
///
/// Under snow the snowpack insulates the soil. Otherwise sparse canopies let
/// the surface warm above air temperature as soil dries (`aet` < `pet`) and
/// dense canopies cool it.
pub fn surface_temperature(
    air_temp: f64,
    snow_depth: f64,
    swe: f64,
    biomass: f64,
    pet: f64,
    aet: f64,
    p: &SurfaceTempParams,
) -> f64 {
    if snow_depth > 0.0 {
        surface_temperature_under_snow(air_temp, swe)
    } else if biomass <= p.bm_limiter {
        let dryness = if pet > 0.0 { 1.0 - aet / pet } else { 0.0 };
        air_temp + p.t1_param1 * pet * dryness * (1.0 - biomass / p.bm_limiter)
    } else {
        air_temp + p.t1_param2 * (biomass - p.bm_limiter) / p.t1_param3
    }
}
