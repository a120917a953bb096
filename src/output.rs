//! Daily state of a site and its aggregation to weekly, monthly and yearly
//! values.

use serde::Deserialize;

// Everything computed for one simulated day. Per-layer vectors run from the
// surface down.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DayOutputs {
    pub year: i32,
    pub doy: usize,   // base1
    pub month: usize, // base0
    pub temp_max: f64,
    pub temp_min: f64,
    pub ppt: f64,
    pub snowmelt: f64,
    pub swc: Vec<f64>,
    pub swp: Vec<f64>, // [bar, positive tension]
    pub soil_temp: Vec<f64>,
    pub surface_temp: f64,
    pub frozen: Vec<bool>,
    pub transp: Vec<f64>,     // Summed over vegetation types
    pub evap_soil: Vec<f64>,
    pub evap_surface: f64,    // From intercepted and standing water
    pub int_veg: f64,
    pub int_litter: f64,
    pub infiltration: f64,
    pub drain: Vec<f64>,
    pub deep_drain: f64,
    pub hydred: Vec<f64>,     // Summed over vegetation types
    pub surface_water: f64,
    pub pet: f64,
    pub aet: f64,
    pub snowpack: f64,        // Snow water equivalent [cm]
    pub snow_depth: f64,      // [cm]
}

impl DayOutputs {
    pub fn temp_avg(&self) -> f64 {
        (self.temp_max + self.temp_min) / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKey {
    Temp,
    Precip,
    SoilWater,
    SoilWaterPotential,
    SoilTemp,
    SurfaceTemp,
    Transp,
    EvapSoil,
    EvapSurface,
    Interception,
    Infiltration,
    LayerDrain,
    DeepDrain,
    HydRed,
    SurfaceWater,
    Pet,
    Aet,
    WetDays,
    Snowpack,
    Frozen,
}

impl OutputKey {
    /// Values of this key for one day.
    pub fn collect(self, d: &DayOutputs) -> Vec<f64> {
        match self {
            OutputKey::Temp => vec![d.temp_max, d.temp_min, d.temp_avg()],
            OutputKey::Precip => vec![d.ppt, d.snowmelt],
            OutputKey::SoilWater => d.swc.clone(),
            OutputKey::SoilWaterPotential => d.swp.clone(),
            OutputKey::SoilTemp => d.soil_temp.clone(),
            OutputKey::SurfaceTemp => vec![d.surface_temp],
            OutputKey::Transp => {
                let mut v = vec![d.transp.iter().sum()];
                v.extend_from_slice(&d.transp);
                v
            }
            OutputKey::EvapSoil => d.evap_soil.clone(),
            OutputKey::EvapSurface => vec![d.evap_surface],
            OutputKey::Interception => vec![d.int_veg + d.int_litter, d.int_veg, d.int_litter],
            OutputKey::Infiltration => vec![d.infiltration],
            OutputKey::LayerDrain => d.drain.clone(),
            OutputKey::DeepDrain => vec![d.deep_drain],
            OutputKey::HydRed => d.hydred.clone(),
            OutputKey::SurfaceWater => vec![d.surface_water],
            OutputKey::Pet => vec![d.pet],
            OutputKey::Aet => vec![d.aet],
            OutputKey::WetDays => vec![if d.ppt > 0.0 { 1.0 } else { 0.0 }],
            OutputKey::Snowpack => vec![d.snowpack, d.snow_depth],
            OutputKey::Frozen => d
                .frozen
                .iter()
                .map(|&f| if f { 1.0 } else { 0.0 })
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SumType {
    Sum,
    Avg,
    Final, // Value of the last day
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl OutPeriod {
    // (year, index) of the period a day belongs to. Index is the doy, week or
    // month number (base1), or 0 for years. Weeks are 7-day blocks from
    // January 1st, so the last one or two days of a year form week 53.
    fn id(self, d: &DayOutputs) -> (i32, usize) {
        let index = match self {
            OutPeriod::Day => d.doy,
            OutPeriod::Week => (d.doy - 1) / 7 + 1,
            OutPeriod::Month => d.month + 1,
            OutPeriod::Year => 0,
        };
        (d.year, index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct OutputSpec {
    pub key: OutputKey,
    pub sum_type: SumType,
    pub period: OutPeriod,
}

// Aggregated values of one key over one period
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodRecord {
    pub spec: OutputSpec,
    pub year: i32,
    pub index: usize,
    pub n_days: usize,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug)]
struct Accumulator {
    spec: OutputSpec,
    current: Option<(i32, usize)>,
    values: Vec<f64>,
    n_days: usize,
}

impl Accumulator {
    fn close(&mut self) -> Option<PeriodRecord> {
        let (year, index) = self.current.take()?;
        let mut values = std::mem::take(&mut self.values);
        if self.spec.sum_type == SumType::Avg {
            values.iter_mut().for_each(|v| *v /= self.n_days as f64);
        }
        let n_days = std::mem::replace(&mut self.n_days, 0);
        Some(PeriodRecord {
            spec: self.spec,
            year,
            index,
            n_days,
            values,
        })
    }

    fn add(&mut self, day: &DayOutputs) {
        let today = self.spec.key.collect(day);
        if self.n_days == 0 || self.spec.sum_type == SumType::Final {
            self.values = today;
        } else {
            self.values.iter_mut().zip(today).for_each(|(v, x)| *v += x);
        }
        self.n_days += 1;
    }
}

/// Aggregates daily outputs for a set of output specifications.
#[derive(Clone, Debug)]
pub struct Aggregator {
    accs: Vec<Accumulator>,
}

impl Aggregator {
    pub fn new(specs: impl IntoIterator<Item = OutputSpec>) -> Self {
        let accs = specs
            .into_iter()
            .map(|spec| Accumulator {
                spec,
                current: None,
                values: vec![],
                n_days: 0,
            })
            .collect();
        Aggregator { accs }
    }

    /// Add a day. Returns the records of periods this day closed.
    pub fn push(&mut self, day: &DayOutputs) -> Vec<PeriodRecord> {
        let mut done = Vec::new();
        for acc in &mut self.accs {
            let id = acc.spec.period.id(day);
            if acc.current.is_some_and(|c| c != id) {
                done.extend(acc.close());
            }
            acc.current = Some(id);
            acc.add(day);
        }
        done
    }

    /// Close all open periods.
    pub fn finish(&mut self) -> Vec<PeriodRecord> {
        self.accs.iter_mut().filter_map(Accumulator::close).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vegetation::doy_to_month;
    use approx::assert_relative_eq;

    fn day(year: i32, doy: usize, ppt: f64) -> DayOutputs {
        DayOutputs {
            year,
            doy,
            month: doy_to_month(doy, false),
            ppt,
            temp_max: doy as f64,
            temp_min: 0.0,
            swc: vec![1.0, doy as f64],
            ..DayOutputs::default()
        }
    }

    fn spec(key: OutputKey, sum_type: SumType, period: OutPeriod) -> OutputSpec {
        OutputSpec {
            key,
            sum_type,
            period,
        }
    }

    #[test]
    fn weekly_sums_and_averages() {
        let mut agg = Aggregator::new([
            spec(OutputKey::Precip, SumType::Sum, OutPeriod::Week),
            spec(OutputKey::SoilWater, SumType::Avg, OutPeriod::Week),
            spec(OutputKey::WetDays, SumType::Sum, OutPeriod::Week),
        ]);
        let mut records = vec![];
        for doy in 1..=8 {
            records.extend(agg.push(&day(2001, doy, if doy % 2 == 0 { 0.5 } else { 0.0 })));
        }
        // day 8 closed week 1
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].index, 1);
        assert_eq!(records[0].n_days, 7);
        assert_relative_eq!(records[0].values[0], 1.5);
        assert_relative_eq!(records[1].values[1], 4.0); // mean of 1..=7
        assert_eq!(records[2].values, vec![3.0]);

        let rest = agg.finish();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].index, 2);
        assert_eq!(rest[0].n_days, 1);
        assert!(agg.finish().is_empty());
    }

    #[test]
    fn monthly_and_final_values() {
        let mut agg = Aggregator::new([
            spec(OutputKey::Temp, SumType::Avg, OutPeriod::Month),
            spec(OutputKey::SoilWater, SumType::Final, OutPeriod::Month),
        ]);
        let mut records = vec![];
        for doy in 1..=59 {
            records.extend(agg.push(&day(2001, doy, 0.0)));
        }
        records.extend(agg.finish());
        assert_eq!(records.len(), 4);
        let jan_temp = &records[0];
        assert_eq!(jan_temp.index, 1);
        assert_relative_eq!(jan_temp.values[0], 16.0); // mean of 1..=31
        let jan_swc = &records[1];
        assert_eq!(jan_swc.values, vec![1.0, 31.0]);
        assert_eq!(records[3].index, 2);
        assert_eq!(records[3].n_days, 28);
        assert_eq!(records[3].values, vec![1.0, 59.0]);
    }

    #[test]
    fn last_days_of_year_form_their_own_week_and_years_split() {
        let mut agg = Aggregator::new([
            spec(OutputKey::Precip, SumType::Sum, OutPeriod::Week),
            spec(OutputKey::Precip, SumType::Sum, OutPeriod::Year),
        ]);
        let mut records = vec![];
        for doy in 358..=365 {
            records.extend(agg.push(&day(2001, doy, 1.0)));
        }
        records.extend(agg.push(&day(2002, 1, 1.0)));
        let weeks: Vec<_> = records
            .iter()
            .filter(|r| r.spec.period == OutPeriod::Week)
            .map(|r| (r.year, r.index, r.n_days))
            .collect();
        assert_eq!(weeks, vec![(2001, 52, 7), (2001, 53, 1)]);
        let year = records
            .iter()
            .find(|r| r.spec.period == OutPeriod::Year)
            .unwrap();
        assert_eq!(year.year, 2001);
        assert_relative_eq!(year.values[0], 8.0);
    }

    #[test]
    fn collects_key_values() {
        let mut d = day(2001, 10, 0.3);
        d.transp = vec![0.1, 0.2];
        d.frozen = vec![true, false];
        d.int_veg = 0.05;
        d.int_litter = 0.01;
        assert_eq!(OutputKey::Transp.collect(&d).len(), 3);
        assert_relative_eq!(OutputKey::Transp.collect(&d)[0], 0.3, epsilon = 1e-12);
        assert_eq!(OutputKey::Frozen.collect(&d), vec![1.0, 0.0]);
        assert_relative_eq!(OutputKey::Interception.collect(&d)[0], 0.06);
        assert_eq!(OutputKey::WetDays.collect(&d), vec![1.0]);
        assert_eq!(OutputKey::Temp.collect(&d), vec![10.0, 0.0, 5.0]);
    }
}
