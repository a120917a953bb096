use serde::Deserialize;

// Vegetation types, in the order interception is applied during a day
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VegType {
    Tree,
    Shrub,
    Forb,
    Grass,
}

impl VegType {
    pub const ALL: [VegType; 4] = [VegType::Tree, VegType::Shrub, VegType::Forb, VegType::Grass];

    pub fn name(self) -> &'static str {
        match self {
            VegType::Tree => "tree",
            VegType::Shrub => "shrub",
            VegType::Forb => "forb",
            VegType::Grass => "grass",
        }
    }
}

// One value per vegetation type; missing types take the default
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PerVeg<T> {
    pub tree: T,
    pub shrub: T,
    pub forb: T,
    pub grass: T,
}

impl<T> PerVeg<T> {
    pub fn from_fn(mut f: impl FnMut(VegType) -> T) -> Self {
        PerVeg {
            tree: f(VegType::Tree),
            shrub: f(VegType::Shrub),
            forb: f(VegType::Forb),
            grass: f(VegType::Grass),
        }
    }

    pub fn get(&self, veg: VegType) -> &T {
        match veg {
            VegType::Tree => &self.tree,
            VegType::Shrub => &self.shrub,
            VegType::Forb => &self.forb,
            VegType::Grass => &self.grass,
        }
    }

    pub fn get_mut(&mut self, veg: VegType) -> &mut T {
        match veg {
            VegType::Tree => &mut self.tree,
            VegType::Shrub => &mut self.shrub,
            VegType::Forb => &mut self.forb,
            VegType::Grass => &mut self.grass,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerVeg<U> {
        PerVeg {
            tree: f(&self.tree),
            shrub: f(&self.shrub),
            forb: f(&self.forb),
            grass: f(&self.grass),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (VegType, &T)> {
        VegType::ALL.into_iter().map(move |v| (v, self.get(v)))
    }
}

impl PerVeg<f64> {
    pub fn sum(&self) -> f64 {
        self.tree + self.shrub + self.forb + self.grass
    }
}

const DAYS_IN_MONTH: [usize; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_year(year: i32) -> usize {
    if is_leap_year(year) { 366 } else { 365 }
}

fn month_lengths(leap: bool) -> [usize; 12] {
    let mut days = DAYS_IN_MONTH;
    if leap {
        days[1] = 29;
    }
    days
}

/// Month (base0) of a day of year (base1). Days past the year end map to December.
pub fn doy_to_month(doy1: usize, leap: bool) -> usize {
    let mut last = 0;
    for (m, len) in month_lengths(leap).iter().enumerate() {
        last += len;
        if doy1 <= last {
            return m;
        }
    }
    11
}

/// Linear interpolation of monthly values between mid-month days, wrapping
/// around the year end.
pub fn interpolate_monthly(values: &[f64; 12], doy1: usize, leap: bool) -> f64 {
    let lens = month_lengths(leap);
    let month = doy_to_month(doy1, leap);
    let start: usize = lens[..month].iter().sum();
    let dom = (doy1 - start) as f64; // day of month, 1-based
    let mid = lens[month] as f64 / 2.0;

    let (neighbor, span) = if dom < mid {
        let prev = (month + 11) % 12;
        (prev, lens[prev] as f64 / 2.0 + mid)
    } else {
        let next = (month + 1) % 12;
        (next, lens[next] as f64 / 2.0 + mid)
    };

    let frac = (dom - mid).abs() / span;
    values[month] + frac * (values[neighbor] - values[month])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn leap_years() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2023));
    }

    #[test]
    fn months() {
        assert_eq!(doy_to_month(1, false), 0);
        assert_eq!(doy_to_month(31, false), 0);
        assert_eq!(doy_to_month(32, false), 1);
        assert_eq!(doy_to_month(60, false), 2);
        assert_eq!(doy_to_month(60, true), 1);
        assert_eq!(doy_to_month(365, false), 11);
        assert_eq!(doy_to_month(366, true), 11);
    }

    #[test]
    fn constant_monthly_values_stay_constant() {
        let v = [3.0; 12];
        for doy in 1..=365 {
            assert_relative_eq!(interpolate_monthly(&v, doy, false), 3.0);
        }
    }

    #[test]
    fn interpolation_hits_mid_month_and_stays_between_neighbors() {
        let mut v = [0.0; 12];
        v[5] = 12.0; // June
        // June 15.5 is the mid point of a 30-day month
        let jun15 = 151 + 15;
        let x = interpolate_monthly(&v, jun15, false);
        assert!(x > 11.0 && x <= 12.0, "{x}");
        let jul31 = 212;
        let y = interpolate_monthly(&v, jul31, false);
        assert!(y >= 0.0 && y < x, "{y}");
    }

    #[test]
    fn per_veg_accessors() {
        let mut p = PerVeg::from_fn(|v| v.name().len() as f64);
        assert_eq!(p.tree, 4.0);
        *p.get_mut(VegType::Grass) = 1.0;
        assert_eq!(*p.get(VegType::Grass), 1.0);
        assert_eq!(p.sum(), 4.0 + 5.0 + 4.0 + 1.0);
        let order: Vec<_> = p.iter().map(|(v, _)| v).collect();
        assert_eq!(order, VegType::ALL.to_vec());
    }
}
