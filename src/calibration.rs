//! ADC response curves of individual channels.
//!
//! Each channel was characterised by scanning its voltage and recording the mean ADC response;
//! the result was fitted with `ADC = exp(p0 + p1*V + p2*V^2)` where `V` is the magnitude of
//! the voltage setting. The fits are distributed as two flat text tables (one per category)
//! with lines of the form `detector row column p0 p1 p2`.

use std::collections::HashMap;
use std::io::BufRead;

use crate::{Category, ChannelKey, Error, Result};

const SOLVER_ITERATIONS: usize = 100;
const SOLVER_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationCurve {
    pub category: Category,
    pub p: [f64; 3],
}

impl CalibrationCurve {
    pub fn new(category: Category, p: [f64; 3]) -> CalibrationCurve {
        CalibrationCurve { category, p }
    }

    pub fn min_voltage(&self) -> i32 {
        self.category.min_voltage(0)
    }

    pub fn max_voltage(&self) -> i32 {
        self.category.max_voltage(0)
    }

    /// Evaluate the ADC response at `voltage`.
    ///
    /// The sign of `voltage` is ignored. Returns `None` if the coefficients do not produce
    /// a finite, non-negative response.
    pub fn adc_for_voltage(&self, voltage: f64) -> Option<f64> {
        let [p0, p1, p2] = self.p;
        let v = voltage.abs();
        let adc = (p0 + p1 * v + p2 * v * v).exp();
        if adc < 0.0 || !adc.is_finite() {
            return None
        }
        Some(adc)
    }

    /// Find the voltage, rounded to the nearest integer, at which the curve reaches `adc`.
    ///
    /// Only the valid voltage range of the curve is searched. Any `adc` outside of the response
    /// at the range endpoints is rejected without extrapolating; the endpoints themselves are
    /// accepted.
    pub fn voltage_for_adc(&self, adc: f64) -> Option<i32> {
        let (min_voltage, max_voltage) = (self.min_voltage() as f64, self.max_voltage() as f64);
        let min_adc = self.adc_for_voltage(min_voltage)?;
        let max_adc = self.adc_for_voltage(max_voltage)?;
        if !(min_adc <= adc && adc <= max_adc) {
            return None
        }
        let voltage = self.solve(adc, min_voltage, max_voltage)?;
        if !voltage.is_finite() {
            return None
        }
        Some(voltage.round() as i32)
    }

    // Bisect on `[lo, hi]`, which must bracket `adc` with the response increasing.
    fn solve(&self, adc: f64, mut lo: f64, mut hi: f64) -> Option<f64> {
        for _ in 0..SOLVER_ITERATIONS {
            if hi - lo <= SOLVER_TOLERANCE {
                break
            }
            let mid = 0.5 * (lo + hi);
            if self.adc_for_voltage(mid)? < adc {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Some(0.5 * (lo + hi))
    }
}

/// Calibration curves for all channels, keyed by detector, row and column.
#[derive(Debug, Clone, Default)]
pub struct CalibrationTable {
    entries: HashMap<ChannelKey, CalibrationCurve>,
}

impl CalibrationTable {
    pub fn new() -> CalibrationTable {
        Self::default()
    }

    /// Read a table of `detector row column p0 p1 p2` lines describing curves of `category`.
    ///
    /// Blank lines are ignored. Entries already present for the same channel are replaced.
    pub fn load(&mut self, category: Category, reader: impl BufRead) -> Result<usize> {
        let mut count = 0;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue
            }
            let (key, curve) = parse_line(category, &line)
                .ok_or_else(|| Error::Parse {
                    line: index + 1,
                    reason: format!("expected `detector row column p0 p1 p2`, got {:?}", line),
                })?;
            self.entries.insert(key, curve);
            count += 1;
        }
        log::debug!("loaded {} {:?} calibration curves", count, category);
        Ok(count)
    }

    pub fn load_str(&mut self, category: Category, text: &str) -> Result<usize> {
        self.load(category, text.as_bytes())
    }

    pub fn insert(&mut self, key: ChannelKey, curve: CalibrationCurve) {
        self.entries.insert(key, curve);
    }

    pub fn find(&self, key: ChannelKey) -> Option<&CalibrationCurve> {
        self.entries.get(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(category: Category, line: &str) -> Option<(ChannelKey, CalibrationCurve)> {
    let mut words = line.split_whitespace();
    let mut int = || words.next()?.parse::<i32>().ok();
    let key = ChannelKey { detector: int()?, row: int()?, column: int()? };
    let mut p = [0.0; 3];
    for coefficient in p.iter_mut() {
        *coefficient = words.next()?.parse::<f64>().ok()?;
    }
    Some((key, CalibrationCurve::new(category, p)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn linear(category: Category) -> CalibrationCurve {
        CalibrationCurve::new(category, [0.0, 0.01, 0.0])
    }

    #[test]
    fn test_adc_for_voltage() {
        let curve = CalibrationCurve::new(Category::Large, [1.0, 0.002, 1e-6]);
        let expected = (1.0f64 + 0.002 * 1000.0 + 1e-6 * 1000.0 * 1000.0).exp();
        assert!((curve.adc_for_voltage(1000.0).unwrap() - expected).abs() < 1e-9 * expected);
    }

    #[test]
    fn test_adc_for_negative_voltage() {
        let curve = linear(Category::Large);
        assert_eq!(curve.adc_for_voltage(-1200.0), curve.adc_for_voltage(1200.0));
    }

    #[test]
    fn test_adc_degenerate() {
        let curve = CalibrationCurve::new(Category::Large, [f64::NAN, 0.0, 0.0]);
        assert_eq!(curve.adc_for_voltage(100.0), None);
        let curve = CalibrationCurve::new(Category::Large, [0.0, 1.0, 0.0]);
        assert_eq!(curve.adc_for_voltage(1000.0), None);
        assert_eq!(curve.voltage_for_adc(10.0), None);
    }

    #[test]
    fn test_voltage_for_adc_round_trip() {
        let large = CalibrationCurve::new(Category::Large, [-2.0, 0.004, 1.5e-6]);
        for voltage in (0..=1600).step_by(7).chain([1600]) {
            let adc = large.adc_for_voltage(voltage as f64).unwrap();
            let found = large.voltage_for_adc(adc).unwrap();
            assert!((found - voltage).abs() <= 1, "{} -> {}", voltage, found);
        }
        let small = CalibrationCurve::new(Category::Small, [0.5, 0.02, 0.0]);
        for voltage in 0..=255 {
            let adc = small.adc_for_voltage(voltage as f64).unwrap();
            let found = small.voltage_for_adc(adc).unwrap();
            assert!((found - voltage).abs() <= 1, "{} -> {}", voltage, found);
        }
    }

    #[test]
    fn test_voltage_for_adc_out_of_range() {
        let curve = linear(Category::Small);
        let min_adc = curve.adc_for_voltage(0.0).unwrap();
        let max_adc = curve.adc_for_voltage(255.0).unwrap();
        assert_eq!(curve.voltage_for_adc(min_adc * 0.999), None);
        assert_eq!(curve.voltage_for_adc(max_adc * 1.001), None);
        assert_eq!(curve.voltage_for_adc(f64::NAN), None);
        assert_eq!(curve.voltage_for_adc(f64::INFINITY), None);
        assert_eq!(curve.voltage_for_adc(min_adc), Some(0));
        assert_eq!(curve.voltage_for_adc(max_adc), Some(255));
    }

    #[test]
    fn test_voltage_for_adc_uses_unshifted_range() {
        let curve = linear(Category::Large);
        let adc = curve.adc_for_voltage(1550.0).unwrap();
        assert_eq!(curve.voltage_for_adc(adc), Some(1550));
    }

    #[test]
    fn test_table_load() {
        let mut table = CalibrationTable::new();
        let count = table.load_str(Category::Large, "\
            1 0 0 -1.5 0.004 1e-7\n\
            \n\
            2 33 16 0.25 0.003 0\n").unwrap();
        assert_eq!(count, 2);
        assert_eq!(table.len(), 2);
        let curve = table.find(ChannelKey { detector: 2, row: 33, column: 16 }).unwrap();
        assert_eq!(curve.category, Category::Large);
        assert_eq!(curve.p, [0.25, 0.003, 0.0]);
        assert!(table.find(ChannelKey { detector: 2, row: 0, column: 16 }).is_none());
    }

    #[test]
    fn test_table_load_both_categories() {
        let mut table = CalibrationTable::new();
        table.load_str(Category::Large, "1 0 0 0 0.01 0\n").unwrap();
        table.load_str(Category::Small, "3 0 0 0 0.02 0\n").unwrap();
        assert_eq!(table.find(ChannelKey { detector: 1, row: 0, column: 0 }).unwrap().category,
                   Category::Large);
        assert_eq!(table.find(ChannelKey { detector: 3, row: 0, column: 0 }).unwrap().category,
                   Category::Small);
    }

    #[test]
    fn test_table_malformed() {
        let mut table = CalibrationTable::new();
        let result = table.load_str(Category::Small, "3 1 2 0.1 0.2 0.3\n3 1 2 0.1\n");
        assert!(matches!(result, Err(Error::Parse { line: 2, .. })));
    }
}
