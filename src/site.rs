//! One simulated site: owns every piece of mutable state and advances it a
//! day at a time.

use tracing::{debug, info};

use crate::config::SiteConfig;
use crate::daily_inputs::WeatherSource;
use crate::error::Error;
use crate::evapotranspiration::{SiteGeometry, petfunc, pot_soil_evap, pot_soil_evap_bs};
use crate::flow::{SoilWaterState, infiltrate_water_high, infiltrate_water_low, remove_from_soil};
use crate::interception::{est_partitioning, evap_from_surface, intercept, intercept_litter};
use crate::output::{Aggregator, DayOutputs, PeriodRecord};
use crate::root_uptake::{hydraulic_redistribution, pot_transp, transp_weighted_avg};
use crate::soil_hydra::SoilProfile;
use crate::soil_temp::{SoilTempForcing, SoilTemperatureModel};
use crate::vegetation::{
    PerVeg, VegType, days_in_year, doy_to_month, interpolate_monthly, is_leap_year,
};

/// Snow state supplied by the caller for one day [cm].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SnowForcing {
    pub snowmelt: f64,   // Melt water reaching the soil surface
    pub snow_depth: f64,
    pub swe: f64,        // Snow water equivalent
}

// Daily vegetation values interpolated from the monthly configuration
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct VegDay {
    cover: f64,
    litter: f64,
    biomass: f64,
    biolive: f64,
    biodead: f64,
    lai_live: f64,
    vegcov: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct VegRates {
    soil_evap: f64,
    transp: f64,
}

pub struct SiteSimulation {
    config: SiteConfig,
    geometry: SiteGeometry,
    profile: SoilProfile,
    water: SoilWaterState,
    temperature: SoilTemperatureModel,
    weather: Box<dyn WeatherSource>,
    aggregator: Aggregator,
    veg_storage: f64,    // Water held on canopies [cm]
    litter_storage: f64, // Water held by litter [cm]
    yesterday_ppt: f64,
}

impl SiteSimulation {
    /// Set up a site with the weather source named in its configuration.
    pub fn new(config: SiteConfig) -> Result<Self, Error> {
        let weather = config.weather_source()?;
        Self::with_weather(config, weather)
    }

    pub fn with_weather(
        config: SiteConfig,
        weather: Box<dyn WeatherSource>,
    ) -> Result<Self, Error> {
        let profile = config.soil_profile()?;
        let water = SoilWaterState::new(config.initial_swc(&profile));
        let temperature = SoilTemperatureModel::new(config.soil_temperature, &profile);
        let aggregator = Aggregator::new(config.output.iter().copied());
        let geometry = config.site_geometry();
        info!(
            layers = profile.n_layers(),
            depth = profile.total_depth(),
            evap_layers = profile.n_evap_layers(),
            swc = water.total(),
            "site ready"
        );
        Ok(SiteSimulation {
            config,
            geometry,
            profile,
            water,
            temperature,
            weather,
            aggregator,
            veg_storage: 0.0,
            litter_storage: 0.0,
            yesterday_ppt: 0.0,
        })
    }

    pub fn profile(&self) -> &SoilProfile {
        &self.profile
    }

    pub fn water(&self) -> &SoilWaterState {
        &self.water
    }

    pub fn temperature(&self) -> &SoilTemperatureModel {
        &self.temperature
    }

    /// Water stored on canopies and litter [cm].
    pub fn surface_storage(&self) -> f64 {
        self.veg_storage + self.litter_storage
    }

    fn veg_day(&self, veg: VegType, doy1: usize, leap: bool) -> Option<VegDay> {
        let v = self.config.veg(veg)?;
        let at = |values: &[f64; 12]| interpolate_monthly(values, doy1, leap);
        let biomass = at(&v.biomass);
        let biolive = biomass * at(&v.pct_live);
        let lai_conv = at(&v.lai_conv);
        Some(VegDay {
            cover: v.cover,
            litter: at(&v.litter),
            biomass,
            biolive,
            biodead: biomass - biolive,
            lai_live: biolive / lai_conv,
            vegcov: biomass / lai_conv,
        })
    }

    /// Simulate day `doy1` (base1) of `year`.
    pub fn step_day(
        &mut self,
        year: i32,
        doy1: usize,
        snow: SnowForcing,
    ) -> Result<DayOutputs, Error> {
        let leap = is_leap_year(year);
        let month = doy_to_month(doy1, leap);
        let n = self.profile.n_layers();
        let frozen = self.temperature.frozen().to_vec();

        let w = self.weather.weather(year, doy1 - 1, self.yesterday_ppt)?;
        self.yesterday_ppt = w.ppt;
        self.water.reset_fluxes();

        let vegs: PerVeg<Option<VegDay>> = PerVeg::from_fn(|veg| self.veg_day(veg, doy1, leap));

        // Interception, canopies first, then litter
        let mut ppt_left = w.ppt;
        let (mut int_veg, mut int_litter) = (0.0, 0.0);
        for veg in VegType::ALL {
            let (Some(d), Some(v)) = (vegs.get(veg), self.config.veg(veg)) else { continue };
            let x = if veg == VegType::Tree { d.lai_live } else { d.vegcov };
            let (left, int) = intercept(veg, ppt_left, x, d.cover, &v.interception);
            ppt_left = left;
            int_veg += int;
        }
        for veg in VegType::ALL {
            let (Some(d), Some(v)) = (vegs.get(veg), self.config.veg(veg)) else { continue };
            int_litter += intercept_litter(&mut ppt_left, d.litter, d.cover, &v.litter_interception);
        }
        self.veg_storage += int_veg;
        self.litter_storage += int_litter;

        let inflow = ppt_left + snow.snowmelt + self.water.standing_water;
        infiltrate_water_high(&mut self.water, inflow, &self.profile, &frozen);
        let infiltration = inflow - self.water.standing_water;

        let sky = self.config.sky.month(month);
        let pet = petfunc(doy1, w.temp_avg(), &self.geometry, &sky);

        // Potential rates from the soil, weighted by cover
        let swc = &self.water.swc;
        let mut rates = PerVeg::<VegRates>::default();
        for veg in VegType::ALL {
            let (Some(d), Some(v)) = (vegs.get(veg), self.config.veg(veg)) else { continue };
            let (fbse, fbst) = est_partitioning(veg, d.lai_live, v.lai_param);
            let swpavg = transp_weighted_avg(veg, &self.profile, swc);
            *rates.get_mut(veg) = VegRates {
                soil_evap: d.cover
                    * pot_soil_evap(
                        &self.profile,
                        swc,
                        d.biomass + d.litter,
                        fbse,
                        pet,
                        v.es_limit,
                        &self.config.evaporation,
                    ),
                transp: d.cover
                    * pot_transp(
                        swpavg,
                        d.biolive,
                        d.biodead,
                        fbst,
                        pet,
                        &self.config.transpiration,
                        &v.shade,
                    ),
            };
        }
        let bare_cover = (1.0 - vegs.map(|d| d.map_or(0.0, |d| d.cover)).sum()).max(0.0);
        let bare_evap =
            bare_cover * pot_soil_evap_bs(&self.profile, swc, pet, &self.config.evaporation);

        // Surface water evaporates first; soil losses share what demand is left
        let mut aet = 0.0;
        let mut pet_left = pet;
        let mut evap_surface = 0.0;
        for pool in [
            &mut self.veg_storage,
            &mut self.litter_storage,
            &mut self.water.standing_water,
        ] {
            let mut rate = pet_left.min(*pool);
            evap_from_surface(pool, &mut rate, &mut aet);
            pet_left -= rate;
            evap_surface += rate;
        }

        let mut soil_evap = bare_evap + rates.iter().map(|(_, r)| r.soil_evap).sum::<f64>();
        let transp_total: f64 = rates.iter().map(|(_, r)| r.transp).sum();
        let demand = soil_evap + transp_total;
        let ratio = if demand > pet_left && demand > 0.0 { pet_left / demand } else { 1.0 };
        soil_evap *= ratio;

        let n_evap = self.profile.n_evap_layers();
        let evap_co: Vec<f64> = self.profile.layers[..n_evap]
            .iter()
            .map(|l| l.texture.evap_coeff)
            .collect();
        let mut evap_soil = vec![0.0; n];
        aet += remove_from_soil(
            &mut self.water.swc,
            &mut evap_soil,
            &evap_co,
            soil_evap,
            &self.profile,
            &frozen,
        );

        let mut transp = vec![0.0; n];
        let mut qty = vec![0.0; n];
        for veg in VegType::ALL {
            let rate = rates.get(veg).transp * ratio;
            if rate <= 0.0 {
                continue;
            }
            let co: Vec<f64> = self
                .profile
                .layers
                .iter()
                .map(|l| *l.texture.transp_coeff.get(veg))
                .collect();
            aet += remove_from_soil(&mut self.water.swc, &mut qty, &co, rate, &self.profile, &frozen);
            transp.iter_mut().zip(&qty).for_each(|(t, q)| *t += q);
        }

        infiltrate_water_low(&mut self.water, &self.config.drainage, &self.profile, &frozen);

        let mut hydred = vec![0.0; n];
        for veg in VegType::ALL {
            let (Some(d), Some(v)) = (vegs.get(veg), self.config.veg(veg)) else { continue };
            if !v.hydred.enabled {
                continue;
            }
            let co: Vec<f64> = self
                .profile
                .layers
                .iter()
                .map(|l| *l.texture.transp_coeff.get(veg))
                .collect();
            hydraulic_redistribution(
                &mut self.water.swc,
                &mut qty,
                &co,
                &v.hydred,
                d.cover,
                &self.profile,
                &frozen,
            );
            hydred.iter_mut().zip(&qty).for_each(|(h, q)| *h += q);
        }

        let biomass = vegs.map(|d| d.map_or(0.0, |d| d.cover * d.biomass)).sum();
        let forcing = SoilTempForcing {
            air_temp: w.temp_avg(),
            pet,
            aet,
            biomass,
            snow_depth: snow.snow_depth,
            swe: snow.swe,
        };
        self.temperature.advance(&forcing, &self.water.swc, &self.profile);

        debug!(year, doy = doy1, ppt = w.ppt, pet, aet, swc = self.water.total(), "day done");

        Ok(DayOutputs {
            year,
            doy: doy1,
            month,
            temp_max: w.temp_max,
            temp_min: w.temp_min,
            ppt: w.ppt,
            snowmelt: snow.snowmelt,
            swc: self.water.swc.clone(),
            swp: self.profile.swp(&self.water.swc),
            soil_temp: self.temperature.layer_temps().to_vec(),
            surface_temp: self.temperature.surface_temp(),
            frozen: self.temperature.frozen().to_vec(),
            transp,
            evap_soil,
            evap_surface,
            int_veg,
            int_litter,
            infiltration,
            drain: self.water.drain.clone(),
            deep_drain: self.water.drain_out,
            hydred,
            surface_water: self.water.standing_water,
            pet,
            aet,
            snowpack: snow.swe,
            snow_depth: snow.snow_depth,
        })
    }

    /// Run every configured year without snow and return the aggregated
    /// outputs in the order their periods closed.
    pub fn run(&mut self) -> Result<Vec<PeriodRecord>, Error> {
        let (start, end) = (self.config.run.start_year, self.config.run.end_year);
        info!(start, end, "simulation started");
        let mut records = Vec::new();
        for year in start..=end {
            for doy1 in 1..=days_in_year(year) {
                let day = self.step_day(year, doy1, SnowForcing::default())?;
                records.extend(self.aggregator.push(&day));
            }
            info!(year, swc = self.water.total(), "year done");
        }
        records.extend(self.aggregator.finish());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::SITE_TOML;
    use crate::error::WeatherError;
    use crate::markov::DailyWeather;
    use crate::output::{OutPeriod, OutputKey};
    use approx::assert_relative_eq;

    // Same weather every day
    struct Constant(DailyWeather);

    impl WeatherSource for Constant {
        fn weather(&mut self, _: i32, _: usize, _: f64) -> Result<DailyWeather, WeatherError> {
            Ok(self.0)
        }
    }

    fn site(ppt: f64, tmax: f64, tmin: f64) -> SiteSimulation {
        let config = SiteConfig::from_toml_str(SITE_TOML).unwrap();
        let weather = Constant(DailyWeather {
            ppt,
            temp_max: tmax,
            temp_min: tmin,
        });
        SiteSimulation::with_weather(config, Box::new(weather)).unwrap()
    }

    fn storage(s: &SiteSimulation) -> f64 {
        s.water().total() + s.water().standing_water + s.surface_storage()
    }

    #[test]
    fn daily_water_balance_closes() {
        let mut s = site(0.8, 24.0, 8.0);
        for doy in 150..=170 {
            let before = storage(&s);
            let snow = SnowForcing {
                snowmelt: 0.1,
                ..SnowForcing::default()
            };
            let d = s.step_day(1990, doy, snow).unwrap();
            let after = storage(&s);
            assert_relative_eq!(
                before + d.ppt + d.snowmelt,
                after + d.aet + d.deep_drain,
                epsilon = 1e-9
            );
            assert!(d.aet <= d.pet + 1e-12);
            assert!(d.int_veg > 0.0);
        }
    }

    #[test]
    fn dry_summer_dries_the_soil() {
        let mut s = site(0.0, 32.0, 15.0);
        let start = s.water().total();
        let mut transp = 0.0;
        for doy in 170..=200 {
            let d = s.step_day(1990, doy, SnowForcing::default()).unwrap();
            transp += d.transp.iter().sum::<f64>();
            for (w, l) in d.swc.iter().zip(&s.profile().layers) {
                assert!(*w >= l.swc_min - 1e-12);
            }
        }
        assert!(transp > 0.0);
        assert!(s.water().total() < start);
    }

    #[test]
    fn cold_days_freeze_wet_layers() {
        // the clay layer at field capacity is wet enough to freeze
        let config =
            SiteConfig::from_toml_str(&SITE_TOML.replace("init_temp = 1.0", "init_temp = -5.0"))
                .unwrap();
        let weather = Constant(DailyWeather {
            ppt: 0.0,
            temp_max: -15.0,
            temp_min: -25.0,
        });
        let mut s = SiteSimulation::with_weather(config, Box::new(weather)).unwrap();
        let mut frozen = false;
        for doy in 1..=40 {
            let d = s.step_day(1990, doy, SnowForcing::default()).unwrap();
            frozen |= d.frozen[2];
        }
        assert!(frozen);
        assert!(s.temperature().error().is_none());
        assert!(s.temperature().layer_temps()[0] < 0.0);
    }

    #[test]
    fn run_aggregates_configured_outputs() {
        let mut s = site(0.2, 15.0, 2.0);
        let records = s.run().unwrap();
        let months: Vec<_> = records
            .iter()
            .filter(|r| r.spec.key == OutputKey::SoilWater && r.spec.period == OutPeriod::Month)
            .collect();
        assert_eq!(months.len(), 12);
        assert_eq!(months[0].values.len(), 3);
        let year: Vec<_> = records
            .iter()
            .filter(|r| r.spec.key == OutputKey::Precip)
            .collect();
        assert_eq!(year.len(), 1);
        assert_relative_eq!(year[0].values[0], 0.2 * 365.0, epsilon = 1e-9);
    }
}
