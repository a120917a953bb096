use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{ConfigError, WeatherError};
use crate::markov::{DailyWeather, MarkovWeatherGenerator, data_lines, parse_values, read_table};
use crate::vegetation::days_in_year;

// Marks a missing value in observed weather files
pub const MISSING: f64 = 999.0;

/// Daily weather for the simulation loop, observed or generated.
pub trait WeatherSource {
    /// Weather of day `doy0` (base0) of `year`. `yesterday_ppt` is the
    /// precipitation of the previous simulated day [cm].
    fn weather(
        &mut self,
        year: i32,
        doy0: usize,
        yesterday_ppt: f64,
    ) -> Result<DailyWeather, WeatherError>;
}

impl WeatherSource for MarkovWeatherGenerator {
    fn weather(
        &mut self,
        _year: i32,
        doy0: usize,
        yesterday_ppt: f64,
    ) -> Result<DailyWeather, WeatherError> {
        self.generate_day(doy0, yesterday_ppt)
    }
}

// Observed daily weather by year, with optional generated values for gaps
#[derive(Clone, Debug, Default)]
pub struct ObservedWeather {
    years: BTreeMap<i32, Vec<Option<DailyWeather>>>,
    fallback: Option<MarkovWeatherGenerator>,
}

impl ObservedWeather {
    pub fn new() -> Self {
        Self::default()
    }

    // Days without observations are generated instead of failing
    pub fn with_fallback(mut self, generator: MarkovWeatherGenerator) -> Self {
        self.fallback = Some(generator);
        self
    }

    pub fn insert(&mut self, year: i32, doy0: usize, weather: DailyWeather) {
        let days = self
            .years
            .entry(year)
            .or_insert_with(|| vec![None; days_in_year(year)]);
        if let Some(slot) = days.get_mut(doy0) {
            *slot = Some(weather);
        }
    }

    pub fn get(&self, year: i32, doy0: usize) -> Option<&DailyWeather> {
        self.years.get(&year)?.get(doy0)?.as_ref()
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.years.keys().copied()
    }

    /// Read one year of `doy tmax tmin ppt` rows. A row with any value equal
    /// to `MISSING` leaves the day unobserved.
    pub fn add_year_from_text(
        &mut self,
        year: i32,
        source_name: &str,
        text: &str,
    ) -> Result<(), ConfigError> {
        let n_days = days_in_year(year);
        let mut days = vec![None; n_days];
        let mut n_missing = n_days;

        for (line, tokens) in data_lines(text) {
            let (doy, v) = parse_values(source_name, line, &tokens, 4)?;
            if !(1..=n_days as i64).contains(&doy) {
                return Err(ConfigError::DayOutOfRange {
                    source_name: source_name.to_string(),
                    line,
                    day: doy,
                });
            }
            if v.iter().any(|&x| x == MISSING) {
                continue;
            }
            for (what, &x) in ["tmax", "tmin", "ppt"].into_iter().zip(&v) {
                if !x.is_finite() {
                    return Err(ConfigError::NonFinite {
                        source_name: source_name.to_string(),
                        line,
                        what,
                    });
                }
            }
            if v[2] < 0.0 {
                return Err(ConfigError::NegativePrecipitation {
                    source_name: source_name.to_string(),
                    line,
                    value: v[2],
                });
            }
            let slot = &mut days[doy as usize - 1];
            if slot.is_none() {
                n_missing -= 1;
            }
            *slot = Some(DailyWeather {
                ppt: v[2],
                temp_max: v[0],
                temp_min: v[1],
            });
        }

        if n_missing > 0 {
            warn!(year, n_missing, source_name, "observed weather has missing days");
        }
        info!(year, source_name, "loaded observed weather");
        self.years.insert(year, days);
        Ok(())
    }

    pub fn add_year_from_file(&mut self, year: i32, path: &Path) -> Result<(), ConfigError> {
        let text = read_table(path)?;
        self.add_year_from_text(year, &path.display().to_string(), &text)
    }
}

impl WeatherSource for ObservedWeather {
    fn weather(
        &mut self,
        year: i32,
        doy0: usize,
        yesterday_ppt: f64,
    ) -> Result<DailyWeather, WeatherError> {
        if let Some(w) = self.get(year, doy0) {
            return Ok(*w);
        }
        match &mut self.fallback {
            Some(generator) => generator.generate_day(doy0, yesterday_ppt),
            None => Err(WeatherError::MissingObservation { doy0 }),
        }
    }
}
