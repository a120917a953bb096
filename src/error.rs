use std::path::PathBuf;
use thiserror::Error;

// Configuration and calibration-data failures. Always fatal for a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse site configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("too few values in line {line} of {source_name}: expected {expected}, found {found}")]
    TooFewValues {
        source_name: String,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("value '{token}' in line {line} of {source_name} is not a number")]
    NotANumber {
        source_name: String,
        line: usize,
        token: String,
    },

    #[error("'day' = {day} is out of range in line {line} of {source_name}")]
    DayOutOfRange {
        source_name: String,
        line: usize,
        day: i64,
    },

    #[error("'week' = {week} is out of range in line {line} of {source_name}")]
    WeekOutOfRange {
        source_name: String,
        line: usize,
        week: i64,
    },

    #[error(
        "probabilities of being wet = {wet} and/or of being dry = {dry} are out of range in line {line} of {source_name}"
    )]
    ProbabilityOutOfRange {
        source_name: String,
        line: usize,
        wet: f64,
        dry: f64,
    },

    #[error(
        "mean daily precipitation = {mean} and/or SD = {sd} are out of range in line {line} of {source_name}"
    )]
    PrecipitationOutOfRange {
        source_name: String,
        line: usize,
        mean: f64,
        sd: f64,
    },

    #[error("{what} is not a finite number in line {line} of {source_name}")]
    NonFinite {
        source_name: String,
        line: usize,
        what: &'static str,
    },

    #[error("variance of {what} = {value} is negative in line {line} of {source_name}")]
    NegativeVariance {
        source_name: String,
        line: usize,
        what: &'static str,
        value: f64,
    },

    #[error("precipitation {value} is negative in line {line} of {source_name}")]
    NegativePrecipitation {
        source_name: String,
        line: usize,
        value: f64,
    },

    #[error("soil profile has {count} layers, allowed 1..={max}")]
    LayerCount { count: usize, max: usize },

    #[error("soil layer {layer}: {reason}")]
    InvalidLayer { layer: usize, reason: String },

    #[error("invalid site parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

// Weather generation failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WeatherError {
    #[error("bad covariance matrix for week {week}: covar^2/var_tmax = {rho_sq} exceeds var_tmin = {var_tmin}")]
    BadCovariance { week: usize, rho_sq: f64, var_tmin: f64 },

    #[error("day-of-year index {doy0} is out of range (expected 0..366)")]
    DayOutOfRange { doy0: usize },

    #[error("no observed weather for day-of-year index {doy0}")]
    MissingObservation { doy0: usize },
}

// Persistent run-level soil temperature flag. Computation of water flow continues.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SoilTemperatureError {
    #[error(
        "soil temperature max depth ({max_depth:.2} cm) must be more than soil layer depth ({profile_depth:.2} cm); soil temperature will not be calculated"
    )]
    MaxDepthTooShallow { max_depth: f64, profile_depth: f64 },

    #[error("regression grid needs at least two cells: max depth {max_depth} cm with spacing {delta_x} cm")]
    GridTooSmall { max_depth: f64, delta_x: f64 },

    #[error("stability coefficient {parts:.4} exceeds 1.0 in grid cell {cell} and may produce extreme values")]
    Unstable { cell: usize, parts: f64 },

    #[error("soil temperature {value:.2} C in grid cell {cell} is outside (-100, 100)")]
    ExtremeTemperature { cell: usize, value: f64 },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Weather(#[from] WeatherError),
}
