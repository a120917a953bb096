pub mod boundary_cond;
pub mod config;
pub mod daily_inputs;
pub mod error;
pub mod evapotranspiration;
pub mod flow;
pub mod interception;
pub mod markov;
pub mod output;
pub mod random;
pub mod root_uptake;
pub mod site;
pub mod soil_hydra;
pub mod soil_temp;
pub mod vegetation;

pub use config::SiteConfig;
pub use daily_inputs::{ObservedWeather, WeatherSource};
pub use error::{ConfigError, Error, SoilTemperatureError, WeatherError};
pub use markov::{DailyWeather, MarkovParameters, MarkovWeatherGenerator};
pub use output::{Aggregator, DayOutputs, OutPeriod, OutputKey, OutputSpec, PeriodRecord, SumType};
pub use random::RandomStream;
pub use site::{SiteSimulation, SnowForcing};
pub use soil_hydra::SoilProfile;
pub use soil_temp::SoilTemperatureModel;
