//! First-order Markov weather generator.
//!
//! Precipitation occurrence depends on whether yesterday was wet; wet-day
//! amounts are normal with day-of-year specific mean and SD. Daily maximum and
//! minimum temperature are drawn jointly from a weekly bivariate normal and
//! shifted by wet/dry correction factors.
//!
//! Calibration comes from two whitespace separated tables:
//! * probabilities: `day wet dry mean_ppt sd_ppt` for day 1..=366
//! * covariance: `week mean_tmax mean_tmin var_tmax covar covar var_tmin
//!   cf_tmax_wet cf_tmax_dry cf_tmin_wet cf_tmin_dry` for week 1..=52

use std::fs;
use std::path::Path;

use nalgebra::{Matrix2, Vector2};
use tracing::{debug, info};

use crate::error::{ConfigError, WeatherError};
use crate::random::RandomStream;

pub const MAX_DAYS: usize = 366;
pub const MAX_WEEKS: usize = 52;

const PROB_ITEMS: usize = 5;
const COV_ITEMS: usize = 11;

/// Calendar week (base0) of a day of year (base1), in fixed 7-day blocks from
/// January 1st. Days 365 and 366 fall into the last week.
pub fn doy_to_week(doy1: usize) -> usize {
    (doy1.saturating_sub(1) / 7).min(MAX_WEEKS - 1)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DailyPrecipParams {
    pub wet_prob: f64, // P(wet today | wet yesterday)
    pub dry_prob: f64, // P(wet today | dry yesterday)
    pub avg_ppt: f64,  // mean precipitation of wet days [cm]
    pub std_ppt: f64,  // SD of precipitation of wet days [cm]
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeeklyTempParams {
    pub mean: Vector2<f64>, // (tmax, tmin) [C]
    pub cov: Matrix2<f64>,  // [[var_max, covar], [covar, var_min]]
    pub cf_max_wet: f64,
    pub cf_max_dry: f64,
    pub cf_min_wet: f64,
    pub cf_min_dry: f64,
}

impl Default for WeeklyTempParams {
    fn default() -> Self {
        WeeklyTempParams {
            mean: Vector2::zeros(),
            cov: Matrix2::zeros(),
            cf_max_wet: 0.0,
            cf_max_dry: 0.0,
            cf_min_wet: 0.0,
            cf_min_dry: 0.0,
        }
    }
}

/// Validated calibration tables. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkovParameters {
    days: Vec<DailyPrecipParams>,
    weeks: Vec<WeeklyTempParams>,
}

impl Default for MarkovParameters {
    fn default() -> Self {
        MarkovParameters {
            days: vec![DailyPrecipParams::default(); MAX_DAYS],
            weeks: vec![WeeklyTempParams::default(); MAX_WEEKS],
        }
    }
}

impl MarkovParameters {
    pub fn day(&self, doy0: usize) -> &DailyPrecipParams {
        &self.days[doy0]
    }

    pub fn week(&self, week0: usize) -> &WeeklyTempParams {
        &self.weeks[week0]
    }

    /// Build from in-memory rows. Out-of-range indices are rejected the same
    /// way as in the text loader.
    pub fn from_rows(
        days: &[(usize, DailyPrecipParams)],
        weeks: &[(usize, WeeklyTempParams)],
    ) -> Result<Self, ConfigError> {
        let mut params = MarkovParameters::default();
        for (line, &(day, row)) in days.iter().enumerate() {
            check_prob_row("rows", line + 1, day as i64, &row)?;
            params.days[day - 1] = row;
        }
        for (line, &(week, row)) in weeks.iter().enumerate() {
            check_cov_row("rows", line + 1, week as i64, &row)?;
            params.weeks[week - 1] = row;
        }
        Ok(params)
    }

    /// Parse both calibration tables. Nothing is returned unless every row of
    /// both tables validates.
    pub fn from_tables(prob_text: &str, cov_text: &str) -> Result<Self, ConfigError> {
        Self::from_named_tables("probabilities", prob_text, "covariance", cov_text)
    }

    pub fn from_files(prob_path: &Path, cov_path: &Path) -> Result<Self, ConfigError> {
        let prob_text = read_table(prob_path)?;
        let cov_text = read_table(cov_path)?;
        Self::from_named_tables(
            &prob_path.display().to_string(),
            &prob_text,
            &cov_path.display().to_string(),
            &cov_text,
        )
    }

    fn from_named_tables(
        prob_name: &str,
        prob_text: &str,
        cov_name: &str,
        cov_text: &str,
    ) -> Result<Self, ConfigError> {
        let days = parse_prob_table(prob_name, prob_text)?;
        let weeks = parse_cov_table(cov_name, cov_text)?;

        let mut params = MarkovParameters::default();
        let (n_days, n_weeks) = (days.len(), weeks.len());
        for (day, row) in days {
            params.days[day - 1] = row;
        }
        for (week, row) in weeks {
            params.weeks[week - 1] = row;
        }

        info!(n_days, n_weeks, "loaded Markov weather calibration tables");
        Ok(params)
    }
}

pub(crate) fn read_table(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// Data lines with their 1-based line numbers; blanks and `#` comments skipped.
pub(crate) fn data_lines(text: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let content = line.split('#').next().unwrap_or("").trim();
        if content.is_empty() {
            None
        } else {
            Some((i + 1, content.split_whitespace().collect()))
        }
    })
}

pub(crate) fn parse_values(
    source_name: &str,
    line: usize,
    tokens: &[&str],
    expected: usize,
) -> Result<(i64, Vec<f64>), ConfigError> {
    if tokens.len() < expected {
        return Err(ConfigError::TooFewValues {
            source_name: source_name.to_string(),
            line,
            expected,
            found: tokens.len(),
        });
    }
    let not_a_number = |token: &str| ConfigError::NotANumber {
        source_name: source_name.to_string(),
        line,
        token: token.to_string(),
    };

    let index = tokens[0]
        .parse::<i64>()
        .map_err(|_| not_a_number(tokens[0]))?;
    let values = tokens[1..expected]
        .iter()
        .map(|&t| t.parse::<f64>().map_err(|_| not_a_number(t)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((index, values))
}

fn parse_prob_table(
    source_name: &str,
    text: &str,
) -> Result<Vec<(usize, DailyPrecipParams)>, ConfigError> {
    let mut rows = Vec::new();
    for (line, tokens) in data_lines(text).take(MAX_DAYS) {
        let (day, v) = parse_values(source_name, line, &tokens, PROB_ITEMS)?;
        let row = DailyPrecipParams {
            wet_prob: v[0],
            dry_prob: v[1],
            avg_ppt: v[2],
            std_ppt: v[3],
        };
        check_prob_row(source_name, line, day, &row)?;
        rows.push((day as usize, row));
    }
    Ok(rows)
}

fn parse_cov_table(
    source_name: &str,
    text: &str,
) -> Result<Vec<(usize, WeeklyTempParams)>, ConfigError> {
    let mut rows = Vec::new();
    for (line, tokens) in data_lines(text).take(MAX_WEEKS) {
        let (week, v) = parse_values(source_name, line, &tokens, COV_ITEMS)?;
        let row = WeeklyTempParams {
            mean: Vector2::new(v[0], v[1]),
            cov: Matrix2::new(v[2], v[3], v[4], v[5]),
            cf_max_wet: v[6],
            cf_max_dry: v[7],
            cf_min_wet: v[8],
            cf_min_dry: v[9],
        };
        check_cov_row(source_name, line, week, &row)?;
        rows.push((week as usize, row));
    }
    Ok(rows)
}

fn check_prob_row(
    source_name: &str,
    line: usize,
    day: i64,
    row: &DailyPrecipParams,
) -> Result<(), ConfigError> {
    if day < 1 || day > MAX_DAYS as i64 {
        return Err(ConfigError::DayOutOfRange {
            source_name: source_name.to_string(),
            line,
            day,
        });
    }

    let is_prob = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
    if !is_prob(row.wet_prob) || !is_prob(row.dry_prob) {
        return Err(ConfigError::ProbabilityOutOfRange {
            source_name: source_name.to_string(),
            line,
            wet: row.wet_prob,
            dry: row.dry_prob,
        });
    }

    let is_stat = |x: f64| x.is_finite() && x >= 0.0;
    if !is_stat(row.avg_ppt) || !is_stat(row.std_ppt) {
        return Err(ConfigError::PrecipitationOutOfRange {
            source_name: source_name.to_string(),
            line,
            mean: row.avg_ppt,
            sd: row.std_ppt,
        });
    }
    Ok(())
}

fn check_cov_row(
    source_name: &str,
    line: usize,
    week: i64,
    row: &WeeklyTempParams,
) -> Result<(), ConfigError> {
    if week < 1 || week > MAX_WEEKS as i64 {
        return Err(ConfigError::WeekOutOfRange {
            source_name: source_name.to_string(),
            line,
            week,
        });
    }

    let non_finite = |what: &'static str| ConfigError::NonFinite {
        source_name: source_name.to_string(),
        line,
        what,
    };
    if !row.mean.iter().all(|x| x.is_finite()) {
        return Err(non_finite("mean weekly temperature"));
    }
    if !row.cov.iter().all(|x| x.is_finite()) {
        return Err(non_finite("covariance"));
    }
    let cfs = [row.cf_max_wet, row.cf_max_dry, row.cf_min_wet, row.cf_min_dry];
    if !cfs.iter().all(|x| x.is_finite()) {
        return Err(non_finite("correction factor"));
    }

    for (what, value) in [("tmax", row.cov[(0, 0)]), ("tmin", row.cov[(1, 1)])] {
        if value < 0.0 {
            return Err(ConfigError::NegativeVariance {
                source_name: source_name.to_string(),
                line,
                what,
                value,
            });
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DailyWeather {
    pub ppt: f64,      // [cm]
    pub temp_max: f64, // [C]
    pub temp_min: f64, // [C]
}

impl DailyWeather {
    pub fn temp_avg(&self) -> f64 {
        (self.temp_max + self.temp_min) / 2.0
    }
}

/// Weather generator for one replicate; owns its random stream.
#[derive(Clone, Debug)]
pub struct MarkovWeatherGenerator {
    params: MarkovParameters,
    rng: RandomStream,
    ppt_events: u32, // number of wet days generated
}

impl MarkovWeatherGenerator {
    pub fn new(params: MarkovParameters, seed: u64) -> Self {
        Self::with_stream(params, RandomStream::new(seed))
    }

    pub fn with_stream(params: MarkovParameters, rng: RandomStream) -> Self {
        MarkovWeatherGenerator {
            params,
            rng,
            ppt_events: 0,
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng.seed(seed);
        self.ppt_events = 0;
    }

    pub fn ppt_events(&self) -> u32 {
        self.ppt_events
    }

    pub fn params(&self) -> &MarkovParameters {
        &self.params
    }

    /// Generate precipitation and temperature for day `doy0` (base0).
    ///
    /// Consumes one uniform draw, one normal draw on wet days, and two normal
    /// draws for temperature.
    pub fn generate_day(
        &mut self,
        doy0: usize,
        yesterday_ppt: f64,
    ) -> Result<DailyWeather, WeatherError> {
        if doy0 >= MAX_DAYS {
            return Err(WeatherError::DayOutOfRange { doy0 });
        }
        let day = self.params.days[doy0];

        let prob = if yesterday_ppt > 0.0 {
            day.wet_prob
        } else {
            day.dry_prob
        };
        let p = self.rng.uniform();
        let ppt = if p <= prob {
            self.rng.normal(day.avg_ppt, day.std_ppt).max(0.0)
        } else {
            0.0
        };
        if ppt > 0.0 {
            self.ppt_events += 1;
        }

        let week = doy_to_week(doy0 + 1);
        let w = self.params.weeks[week];
        let (mut temp_max, mut temp_min) = self.mvnorm(week, &w)?;

        // wet/dry correction
        if ppt > 0.0 {
            temp_max += w.cf_max_wet;
            temp_min = temp_max.min(temp_min + w.cf_min_wet);
        } else {
            temp_max += w.cf_max_dry;
            temp_min = temp_max.min(temp_min + w.cf_min_dry);
        }

        debug!(doy0, week, ppt, temp_max, temp_min, "markov weather");
        Ok(DailyWeather {
            ppt,
            temp_max,
            temp_min,
        })
    }

    // Bivariate normal via the lower Cholesky factor of the weekly covariance.
    fn mvnorm(&mut self, week: usize, w: &WeeklyTempParams) -> Result<(f64, f64), WeatherError> {
        let z1 = self.rng.normal(0.0, 1.0);
        let z2 = self.rng.normal(0.0, 1.0);

        let var_max = w.cov[(0, 0)];
        let var_min = w.cov[(1, 1)];
        let covar = w.cov[(1, 0)];

        let sd_max = var_max.sqrt();
        let vc10 = if sd_max > 0.0 { covar / sd_max } else { 0.0 };
        let s = vc10 * vc10;
        if s > var_min {
            return Err(WeatherError::BadCovariance {
                week,
                rho_sq: s,
                var_tmin: var_min,
            });
        }
        let vc11 = if var_min == s { 0.0 } else { (var_min - s).sqrt() };

        let tmax = sd_max * z1 + w.mean[0];
        let tmin = tmax.min(vc10 * z1 + vc11 * z2 + w.mean[1]);
        Ok((tmax, tmin))
    }
}
