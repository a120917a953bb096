use tracing::info;

use crate::error::ConfigError;
use crate::vegetation::PerVeg;

pub const MAX_LAYERS: usize = 25;

// cm of water column per bar
pub const BARCONV: f64 = 1024.0;

// Matric potentials [bar] that define field capacity and wilting point
pub const SWP_FIELD_CAPACITY: f64 = 0.333;
pub const SWP_WILTING_POINT: f64 = 15.0;

// Soil water retention parameters (Cosby et al. 1984 pedotransfer functions)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CosbyParams {
    pub psis: f64,   // Saturated matric potential [cm]
    pub thetas: f64, // Saturated volumetric water content [%]
    pub b: f64,      // Shape parameter [-]
}

impl CosbyParams {
    // sand and clay as fractions of the matric soil
    pub fn from_texture(sand: f64, clay: f64) -> Self {
        CosbyParams {
            psis: 10f64.powf(-1.58 * sand - 0.63 * clay + 2.17),
            thetas: -14.2 * sand - 3.7 * clay + 50.5,
            b: -0.3 * sand + 15.7 * clay + 3.10,
        }
    }

    // Matric potential [bar, positive tension] of a bulk water content [cm]
    pub fn swc_to_swp(&self, swc: f64, width: f64, gravel: f64) -> f64 {
        if swc <= 0.0 {
            return 0.0;
        }
        let theta = 100.0 * swc / (width * (1.0 - gravel));
        self.psis / (theta / self.thetas).powf(self.b) / BARCONV
    }

    // Bulk water content [cm] at a matric potential [bar]
    pub fn swp_to_swc(&self, swp: f64, width: f64, gravel: f64) -> f64 {
        let theta = self.thetas * (self.psis / (swp * BARCONV)).powf(1.0 / self.b);
        theta / 100.0 * width * (1.0 - gravel)
    }
}

// Static description of one layer, as configured
#[derive(Clone, Debug, PartialEq)]
pub struct LayerTexture {
    pub width: f64,            // [cm]
    pub bulk_density: f64,     // [g/cm3]
    pub gravel: f64,           // Gravel volume fraction [-]
    pub sand: f64,             // [-]
    pub clay: f64,             // [-]
    pub impermeability: f64,   // [-]
    pub evap_coeff: f64,       // Bare-soil evaporation coefficient [-]
    pub transp_coeff: PerVeg<f64>,
    pub transp_region: PerVeg<usize>, // 1-based transpiration region, 0 = none
    pub init_temp: f64,        // [C]
}

// Soil layer with derived hydraulic limits
#[derive(Clone, Debug, PartialEq)]
pub struct SoilLayer {
    pub texture: LayerTexture,
    pub cosby: CosbyParams,
    pub swc_fc: f64,  // Field capacity [cm]
    pub swc_wp: f64,  // Wilting point [cm]
    pub swc_min: f64, // Lower limit of soil water [cm]
    pub swc_sat: f64, // Saturated water content [cm]
}

impl SoilLayer {
    // Validates the texture and derives water limits; `swp_min` in bars
    pub fn new(index: usize, texture: LayerTexture, swp_min: f64) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidLayer {
            layer: index,
            reason,
        };
        let t = &texture;

        if !(t.width.is_finite() && t.width > 0.0) {
            return Err(invalid(format!("width {} must be > 0", t.width)));
        }
        if !(t.bulk_density.is_finite() && t.bulk_density > 0.0) {
            return Err(invalid(format!("bulk density {} must be > 0", t.bulk_density)));
        }
        for (name, v) in [
            ("sand", t.sand),
            ("clay", t.clay),
            ("impermeability", t.impermeability),
            ("evaporation coefficient", t.evap_coeff),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(invalid(format!("{name} {v} is outside [0, 1]")));
            }
        }
        if t.sand + t.clay > 1.0 {
            return Err(invalid(format!("sand + clay = {} exceeds 1", t.sand + t.clay)));
        }
        if !(0.0..1.0).contains(&t.gravel) {
            return Err(invalid(format!("gravel {} is outside [0, 1)", t.gravel)));
        }
        for (veg, &co) in t.transp_coeff.iter() {
            if !(0.0..=1.0).contains(&co) {
                return Err(invalid(format!(
                    "{} transpiration coefficient {co} is outside [0, 1]",
                    veg.name()
                )));
            }
        }
        if !t.init_temp.is_finite() {
            return Err(invalid("initial temperature is not finite".to_string()));
        }

        let cosby = CosbyParams::from_texture(t.sand, t.clay);
        let (width, gravel) = (t.width, t.gravel);
        let swc_sat = cosby.thetas / 100.0 * width * (1.0 - gravel);
        let swc_fc = cosby.swp_to_swc(SWP_FIELD_CAPACITY, width, gravel);
        let swc_wp = cosby.swp_to_swc(SWP_WILTING_POINT, width, gravel);
        let swc_min = cosby.swp_to_swc(swp_min, width, gravel);

        if !(swc_min <= swc_wp && swc_wp <= swc_fc && swc_fc <= swc_sat) {
            return Err(invalid(format!(
                "water limits out of order: min {swc_min:.4}, wp {swc_wp:.4}, fc {swc_fc:.4}, sat {swc_sat:.4}"
            )));
        }

        Ok(SoilLayer {
            texture,
            cosby,
            swc_fc,
            swc_wp,
            swc_min,
            swc_sat,
        })
    }

    pub fn width(&self) -> f64 {
        self.texture.width
    }

    pub fn swp(&self, swc: f64) -> f64 {
        self.cosby
            .swc_to_swp(swc, self.texture.width, self.texture.gravel)
    }

    pub fn swc_at(&self, swp: f64) -> f64 {
        self.cosby
            .swp_to_swc(swp, self.texture.width, self.texture.gravel)
    }
}

// Soil profile; layer 0 is at the surface
#[derive(Clone, Debug, PartialEq)]
pub struct SoilProfile {
    pub layers: Vec<SoilLayer>,
    depths: Vec<f64>, // Cumulative depth of the bottom of each layer [cm]
}

impl SoilProfile {
    pub fn new(textures: Vec<LayerTexture>, swp_min: f64) -> Result<Self, ConfigError> {
        if textures.is_empty() || textures.len() > MAX_LAYERS {
            return Err(ConfigError::LayerCount {
                count: textures.len(),
                max: MAX_LAYERS,
            });
        }
        if !(swp_min.is_finite() && swp_min >= SWP_WILTING_POINT) {
            return Err(ConfigError::InvalidParameter {
                name: "swp_min",
                value: swp_min,
                reason: "must be a potential of at least the wilting point (15 bar)",
            });
        }

        let layers = textures
            .into_iter()
            .enumerate()
            .map(|(i, t)| SoilLayer::new(i, t, swp_min))
            .collect::<Result<Vec<_>, _>>()?;

        let depths = layers
            .iter()
            .scan(0.0, |acc, l| {
                *acc += l.width();
                Some(*acc)
            })
            .collect();

        let profile = SoilProfile { layers, depths };
        info!(
            n_layers = profile.n_layers(),
            depth = profile.total_depth(),
            "soil profile ready"
        );
        Ok(profile)
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn depths(&self) -> &[f64] {
        &self.depths
    }

    pub fn total_depth(&self) -> f64 {
        self.depths.last().copied().unwrap_or(0.0)
    }

    pub fn widths(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.width()).collect()
    }

    // Number of top layers with a positive evaporation coefficient
    pub fn n_evap_layers(&self) -> usize {
        self.layers
            .iter()
            .take_while(|l| l.texture.evap_coeff > 0.0)
            .count()
    }

    pub fn swp(&self, swc: &[f64]) -> Vec<f64> {
        self.layers.iter().zip(swc).map(|(l, &w)| l.swp(w)).collect()
    }

    pub fn swc_fc(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.swc_fc).collect()
    }

    pub fn swc_wp(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.swc_wp).collect()
    }

    pub fn swc_sat(&self) -> Vec<f64> {
        self.layers.iter().map(|l| l.swc_sat).collect()
    }
}
