//! Site configuration read from TOML.
//!
//! ```toml
//! [run]
//! start_year = 1990
//! end_year = 1992
//!
//! [site]
//! latitude = 43.3   # degrees
//! elevation = 1000.0
//!
//! [sky]
//! humidity = [...]  # 12 monthly values each
//!
//! [[layers]]
//! width = 5.0
//! ...
//!
//! [vegetation.grass]
//! cover = 0.4
//! ...
//!
//! [weather]
//! seed = 7
//! probabilities = "mkv_prob.in"
//! covariance = "mkv_covar.in"
//!
//! [[output]]
//! key = "soil_water"
//! sum_type = "avg"
//! period = "month"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::daily_inputs::{ObservedWeather, WeatherSource};
use crate::error::ConfigError;
use crate::evapotranspiration::{SiteGeometry, SkyConditions, WatrateParams};
use crate::flow::DrainageParams;
use crate::interception::InterceptionParams;
use crate::markov::{MarkovParameters, MarkovWeatherGenerator};
use crate::output::OutputSpec;
use crate::root_uptake::{HydRedParams, ShadeParams};
use crate::soil_hydra::{LayerTexture, SoilProfile};
use crate::soil_temp::SoilTempParams;
use crate::vegetation::{PerVeg, VegType};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RunConfig {
    pub start_year: i32,
    pub end_year: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiteParams {
    pub latitude: f64,  // [degrees]
    pub elevation: f64, // [m]
    pub slope: f64,     // [degrees]
    pub aspect: f64,    // [degrees, 180 = south]
    pub albedo: f64,    // [-]
    pub swp_min: f64,   // Lowest soil water potential [bar]
}

impl Default for SiteParams {
    fn default() -> Self {
        SiteParams {
            latitude: 0.0,
            elevation: 0.0,
            slope: 0.0,
            aspect: 180.0,
            albedo: 0.15,
            swp_min: 30.0,
        }
    }
}

// Monthly climate normals used by the PET calculation
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SkyConfig {
    pub humidity: [f64; 12],     // [%]
    pub wind_speed: [f64; 12],   // [m/s]
    pub cloud_cover: [f64; 12],  // [%]
    pub transmission: [f64; 12], // [-]
}

impl SkyConfig {
    pub fn month(&self, m: usize) -> SkyConditions {
        SkyConditions {
            humidity: self.humidity[m],
            wind_speed: self.wind_speed[m],
            cloud_cover: self.cloud_cover[m],
            transmission: self.transmission[m],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LayerConfig {
    pub width: f64,
    pub bulk_density: f64,
    #[serde(default)]
    pub gravel: f64,
    pub sand: f64,
    pub clay: f64,
    #[serde(default)]
    pub impermeability: f64,
    #[serde(default)]
    pub evap_coeff: f64,
    #[serde(default)]
    pub transp_coeff: PerVeg<f64>,
    #[serde(default = "default_regions")]
    pub transp_region: PerVeg<usize>,
    pub init_temp: f64,
    pub swc_init: Option<f64>, // Initial water content [cm]; field capacity if absent
}

fn default_regions() -> PerVeg<usize> {
    PerVeg::from_fn(|_| 1)
}

impl From<&LayerConfig> for LayerTexture {
    fn from(l: &LayerConfig) -> Self {
        LayerTexture {
            width: l.width,
            bulk_density: l.bulk_density,
            gravel: l.gravel,
            sand: l.sand,
            clay: l.clay,
            impermeability: l.impermeability,
            evap_coeff: l.evap_coeff,
            transp_coeff: l.transp_coeff,
            transp_region: l.transp_region,
            init_temp: l.init_temp,
        }
    }
}

fn default_litter_interception() -> InterceptionParams {
    InterceptionParams::new(0.0, 0.0151, 0.00064, 0.0)
}

fn default_lai_param() -> f64 {
    1.0
}

fn default_es_limit() -> f64 {
    999.0
}

// One vegetation type. Monthly values are interpolated to days.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct VegConfig {
    pub cover: f64, // Fraction of the site [-]
    #[serde(default = "default_lai_param")]
    pub lai_param: f64, // Extinction of bare-soil evaporation by live LAI
    #[serde(default = "default_es_limit")]
    pub es_limit: f64, // Biomass that stops bare-soil evaporation [g/m2]
    pub litter: [f64; 12],   // [g/m2]
    pub biomass: [f64; 12],  // Aboveground biomass [g/m2]
    pub pct_live: [f64; 12], // Live fraction of biomass [-]
    pub lai_conv: [f64; 12], // Biomass per unit LAI [g/m2]
    pub interception: InterceptionParams,
    #[serde(default = "default_litter_interception")]
    pub litter_interception: InterceptionParams,
    #[serde(default)]
    pub shade: ShadeParams,
    #[serde(default)]
    pub hydred: HydRedParams,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ObservedYear {
    pub year: i32,
    pub path: PathBuf,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub seed: u64,
    pub probabilities: Option<PathBuf>,
    pub covariance: Option<PathBuf>,
    pub observed: Vec<ObservedYear>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct SiteConfig {
    pub run: RunConfig,
    #[serde(default)]
    pub site: SiteParams,
    pub sky: SkyConfig,
    #[serde(default)]
    pub drainage: DrainageParams,
    #[serde(default = "WatrateParams::evaporation_default")]
    pub evaporation: WatrateParams,
    #[serde(default = "WatrateParams::transpiration_default")]
    pub transpiration: WatrateParams,
    #[serde(default)]
    pub soil_temperature: SoilTempParams,
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub vegetation: PerVeg<Option<VegConfig>>,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub output: Vec<OutputSpec>,
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        value,
        reason,
    }
}

fn check_unit(name: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    match values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
        Some(&v) => Err(invalid(name, v, "must be within [0, 1]")),
        None => Ok(()),
    }
}

fn check_non_negative(name: &'static str, values: &[f64]) -> Result<(), ConfigError> {
    match values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
        Some(&v) => Err(invalid(name, v, "must be finite and >= 0")),
        None => Ok(()),
    }
}

impl SiteConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file. Relative weather paths are resolved
    /// against the file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            config.weather.resolve_paths(dir);
        }
        info!(path = %path.display(), "loaded site configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.site;
        if self.run.end_year < self.run.start_year {
            return Err(invalid(
                "end_year",
                self.run.end_year as f64,
                "must not be before start_year",
            ));
        }
        if !(-90.0..=90.0).contains(&s.latitude) {
            return Err(invalid("latitude", s.latitude, "must be within [-90, 90]"));
        }
        if !(0.0..90.0).contains(&s.slope) {
            return Err(invalid("slope", s.slope, "must be within [0, 90)"));
        }
        check_unit("albedo", &[s.albedo])?;

        check_non_negative("sky.humidity", &self.sky.humidity)?;
        check_non_negative("sky.wind_speed", &self.sky.wind_speed)?;
        check_non_negative("sky.cloud_cover", &self.sky.cloud_cover)?;
        if let Some(&t) = self.sky.transmission.iter().find(|t| !(**t > 0.0 && **t <= 1.0)) {
            return Err(invalid("sky.transmission", t, "must be within (0, 1]"));
        }

        let st = &self.soil_temperature;
        if !(st.delta_x > 0.0) {
            return Err(invalid("soil_temperature.delta_x", st.delta_x, "must be > 0"));
        }
        if !(st.surface.bm_limiter > 0.0) {
            return Err(invalid("soil_temperature.bm_limiter", st.surface.bm_limiter, "must be > 0"));
        }

        let mut total_cover = 0.0;
        for (_, veg) in self.vegetation.iter() {
            let Some(v) = veg else { continue };
            check_unit("cover", &[v.cover])?;
            check_unit("pct_live", &v.pct_live)?;
            check_non_negative("litter", &v.litter)?;
            check_non_negative("biomass", &v.biomass)?;
            if let Some(&c) = v.lai_conv.iter().find(|c| !(**c > 0.0)) {
                return Err(invalid("lai_conv", c, "must be > 0"));
            }
            if !(v.es_limit > 0.0) {
                return Err(invalid("es_limit", v.es_limit, "must be > 0"));
            }
            total_cover += v.cover;
        }
        if total_cover > 1.0 + 1e-9 {
            return Err(invalid("cover", total_cover, "vegetation covers sum to more than 1"));
        }

        for (i, l) in self.layers.iter().enumerate() {
            if let Some(w) = l.swc_init {
                if !(w.is_finite() && w >= 0.0) {
                    return Err(ConfigError::InvalidLayer {
                        layer: i,
                        reason: format!("initial water content {w} must be >= 0"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn soil_profile(&self) -> Result<SoilProfile, ConfigError> {
        let textures = self.layers.iter().map(LayerTexture::from).collect();
        SoilProfile::new(textures, self.site.swp_min)
    }

    /// Initial water content of each layer, clamped to saturation.
    pub fn initial_swc(&self, profile: &SoilProfile) -> Vec<f64> {
        self.layers
            .iter()
            .zip(&profile.layers)
            .map(|(c, l)| c.swc_init.unwrap_or(l.swc_fc).min(l.swc_sat))
            .collect()
    }

    pub fn site_geometry(&self) -> SiteGeometry {
        SiteGeometry {
            latitude: self.site.latitude.to_radians(),
            elevation: self.site.elevation,
            slope: self.site.slope,
            aspect: self.site.aspect,
            albedo: self.site.albedo,
        }
    }

    pub fn veg(&self, veg: VegType) -> Option<&VegConfig> {
        self.vegetation.get(veg).as_ref()
    }

    pub fn markov_parameters(&self) -> Result<Option<MarkovParameters>, ConfigError> {
        match (&self.weather.probabilities, &self.weather.covariance) {
            (Some(p), Some(c)) => MarkovParameters::from_files(p, c).map(Some),
            _ => Ok(None),
        }
    }

    /// Observed weather (with generated gaps if Markov tables are
    /// configured), or the Markov generator alone.
    pub fn weather_source(&self) -> Result<Box<dyn WeatherSource>, ConfigError> {
        let generator = self
            .markov_parameters()?
            .map(|p| MarkovWeatherGenerator::new(p, self.weather.seed));

        if self.weather.observed.is_empty() {
            return match generator {
                Some(g) => Ok(Box::new(g)),
                None => Err(ConfigError::InvalidParameter {
                    name: "weather",
                    value: f64::NAN,
                    reason: "needs observed years or Markov tables",
                }),
            };
        }

        let mut observed = ObservedWeather::new();
        for y in &self.weather.observed {
            observed.add_year_from_file(y.year, &y.path)?;
        }
        if let Some(g) = generator {
            observed = observed.with_fallback(g);
        }
        Ok(Box::new(observed))
    }
}

impl WeatherConfig {
    fn resolve_paths(&mut self, dir: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        if let Some(p) = self.probabilities.as_mut() {
            resolve(p);
        }
        if let Some(p) = self.covariance.as_mut() {
            resolve(p);
        }
        for y in &mut self.observed {
            resolve(&mut y.path);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::output::OutputKey;
    use std::io::Write;

    pub(crate) const SITE_TOML: &str = r#"
[run]
start_year = 1990
end_year = 1990

[site]
latitude = 43.3
elevation = 1000.0

[sky]
humidity = [61, 61, 61, 51, 51, 51, 41, 41, 51, 51, 61, 61]
wind_speed = [1.3, 2.9, 3.3, 3.8, 3.8, 3.8, 3.3, 3.3, 2.9, 1.3, 1.3, 1.3]
cloud_cover = [71, 61, 61, 51, 41, 31, 23, 23, 31, 41, 61, 61]
transmission = [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]

[[layers]]
width = 5.0
bulk_density = 1.43
gravel = 0.0
sand = 0.51
clay = 0.15
evap_coeff = 0.8
transp_coeff = { grass = 0.3, shrub = 0.2 }
init_temp = -1.0

[[layers]]
width = 10.0
bulk_density = 1.41
sand = 0.44
clay = 0.26
evap_coeff = 0.2
transp_coeff = { grass = 0.4, shrub = 0.3 }
init_temp = 0.0

[[layers]]
width = 20.0
bulk_density = 1.39
sand = 0.35
clay = 0.41
transp_coeff = { grass = 0.3, shrub = 0.5 }
transp_region = { grass = 2, shrub = 2 }
init_temp = 1.0

[vegetation.grass]
cover = 0.4
litter = [75, 80, 85, 90, 50, 50, 50, 55, 60, 65, 70, 75]
biomass = [75, 80, 85, 110, 190, 220, 200, 180, 140, 100, 80, 75]
pct_live = [0.0, 0.0, 0.1, 0.2, 0.4, 0.6, 0.4, 0.6, 0.4, 0.1, 0.0, 0.0]
lai_conv = [300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300, 300]
interception = { a = 0.0182, b = 0.00065, c = 0.0019, d = 0.0016 }

[vegetation.shrub]
cover = 0.2
litter = [85, 85, 85, 85, 85, 85, 85, 85, 85, 85, 85, 85]
biomass = [210, 210, 220, 220, 240, 250, 260, 260, 250, 230, 220, 210]
pct_live = [0.1, 0.1, 0.1, 0.2, 0.3, 0.4, 0.4, 0.3, 0.3, 0.2, 0.1, 0.1]
lai_conv = [372, 372, 372, 372, 372, 372, 372, 372, 372, 372, 372, 372]
interception = { a = 0.0, b = 0.026, c = 0.0, d = 0.0036 }
hydred = { enabled = true }

[weather]
seed = 11

[[output]]
key = "soil_water"
sum_type = "avg"
period = "month"

[[output]]
key = "precip"
sum_type = "sum"
period = "year"
"#;

    #[test]
    fn parses_full_site() {
        let c = SiteConfig::from_toml_str(SITE_TOML).unwrap();
        assert_eq!(c.layers.len(), 3);
        assert_eq!(c.site.swp_min, 30.0);
        assert_eq!(c.layers[1].gravel, 0.0);
        assert_eq!(c.layers[0].transp_coeff.tree, 0.0);
        assert_eq!(c.layers[2].transp_region.grass, 2);
        assert_eq!(c.layers[0].transp_region.tree, 1);
        assert!(c.veg(VegType::Tree).is_none());
        let shrub = c.veg(VegType::Shrub).unwrap();
        assert!(shrub.hydred.enabled);
        assert_eq!(shrub.hydred.swp50, 10.0);
        assert_eq!(shrub.litter_interception, default_litter_interception());
        assert_eq!(c.evaporation, WatrateParams::evaporation_default());
        assert_eq!(c.soil_temperature.max_depth, 990.0);
        assert_eq!(c.output.len(), 2);
        assert_eq!(c.output[0].key, OutputKey::SoilWater);

        let profile = c.soil_profile().unwrap();
        assert_eq!(profile.total_depth(), 35.0);
        assert_eq!(profile.n_evap_layers(), 2);
        assert_eq!(c.initial_swc(&profile), profile.swc_fc());
        assert!((c.site_geometry().latitude - 43.3f64.to_radians()).abs() < 1e-15);
    }

    #[test]
    fn rejects_invalid_values() {
        let bad_cover = SITE_TOML.replace("cover = 0.2", "cover = 0.7");
        assert!(matches!(
            SiteConfig::from_toml_str(&bad_cover),
            Err(ConfigError::InvalidParameter { name: "cover", .. })
        ));

        let bad_live = SITE_TOML.replace("pct_live = [0.0, 0.0, 0.1", "pct_live = [1.5, 0.0, 0.1");
        assert!(matches!(
            SiteConfig::from_toml_str(&bad_live),
            Err(ConfigError::InvalidParameter { name: "pct_live", .. })
        ));

        let bad_toml = SITE_TOML.replace("[run]", "[run");
        assert!(matches!(
            SiteConfig::from_toml_str(&bad_toml),
            Err(ConfigError::Toml(_))
        ));

        let bad_layer = SITE_TOML.replace("width = 10.0", "width = -10.0");
        let c = SiteConfig::from_toml_str(&bad_layer).unwrap();
        assert!(matches!(
            c.soil_profile(),
            Err(ConfigError::InvalidLayer { layer: 1, .. })
        ));
    }

    #[test]
    fn weather_needs_a_source() {
        let c = SiteConfig::from_toml_str(SITE_TOML).unwrap();
        assert!(c.weather_source().is_err());
    }

    #[test]
    fn relative_weather_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let text = SITE_TOML.replace(
            "seed = 11",
            "seed = 11\nobserved = [{ year = 1990, path = \"weath.1990\" }]",
        );
        let cfg_path = dir.path().join("site.toml");
        fs::File::create(&cfg_path)
            .unwrap()
            .write_all(text.as_bytes())
            .unwrap();
        fs::write(dir.path().join("weath.1990"), "1 5.0 -3.0 0.1\n").unwrap();

        let c = SiteConfig::from_path(&cfg_path).unwrap();
        assert_eq!(c.weather.observed[0].path, dir.path().join("weath.1990"));
        let mut source = c.weather_source().unwrap();
        assert_eq!(source.weather(1990, 0, 0.0).unwrap().ppt, 0.1);
    }
}
