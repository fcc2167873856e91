//! Operating state of a single detector channel.

use std::fmt;

use crate::{CalibrationCurve, Category, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub detector: i32,
    pub row: i32,
    pub column: i32,
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "detector {} row {} column {}", self.detector, self.row, self.column)
    }
}

/// Current settings of one channel.
///
/// `gain` is the effective gain, including the digital `2^bitshift` factor, and is consistent
/// with `voltage` and `bitshift` through `gain = norm * ADC(voltage) * 2^bitshift` for some
/// per-channel normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub key: ChannelKey,
    /// Sequential channel number within the detector.
    pub channel: i32,
    pub category: Category,
    /// Magnitude of the voltage setting.
    pub voltage: i32,
    pub bitshift: i32,
    pub gain: f64,
    pub calibration: Option<CalibrationCurve>,
}

impl Channel {
    pub fn new(key: ChannelKey, channel: i32, voltage: i32, gain: f64) -> Result<Channel> {
        Ok(Channel {
            key,
            channel,
            category: Category::of_detector(key.detector)?,
            voltage: voltage.abs(),
            bitshift: 0,
            gain,
            calibration: None,
        })
    }

    pub fn min_voltage(&self, bitshift: i32) -> i32 {
        self.category.min_voltage(bitshift)
    }

    pub fn max_voltage(&self, bitshift: i32) -> i32 {
        self.category.max_voltage(bitshift)
    }

    pub fn is_valid_voltage(&self, voltage: i32, bitshift: i32) -> bool {
        (self.min_voltage(bitshift)..=self.max_voltage(bitshift)).contains(&voltage)
    }

    pub fn curve(&self) -> Result<&CalibrationCurve> {
        let ChannelKey { detector, row, column } = self.key;
        self.calibration.as_ref()
            .ok_or(Error::MissingCalibration { detector, row, column })
    }

    /// Scale factor between the calibration curve and the current operating point, such that
    /// `gain = norm * ADC(voltage)` at the current voltage and bitshift.
    pub fn norm(&self) -> Result<f64> {
        let adc = self.curve()?.adc_for_voltage(self.voltage as f64)
            .ok_or_else(|| self.unusable(self.voltage))?;
        let norm = self.gain / adc;
        if !norm.is_finite() {
            return Err(self.unusable(self.voltage))
        }
        Ok(norm)
    }

    /// Gain this channel would have at `voltage` and `bitshift`, without modifying it.
    pub fn compute_gain(&self, voltage: i32, bitshift: i32) -> Result<f64> {
        let adc = self.curve()?.adc_for_voltage(voltage as f64)
            .ok_or_else(|| self.unusable(voltage))?;
        Ok(self.norm()? * adc * 2f64.powi(bitshift - self.bitshift))
    }

    fn unusable(&self, voltage: i32) -> Error {
        let ChannelKey { detector, row, column } = self.key;
        Error::Calibration { detector, row, column, voltage }
    }

    /// Parse a gain file line, `detector channel row column voltage gain`.
    ///
    /// Small cell voltages are hexadecimal, large cell voltages are decimal and usually
    /// negative.
    pub fn from_gain_line(line: &str) -> Option<Channel> {
        let words = line.split_whitespace().collect::<Vec<_>>();
        let [detector, channel, row, column, voltage, gain] = words[..] else {
            return None
        };
        let key = ChannelKey {
            detector: detector.parse().ok()?,
            row: row.parse().ok()?,
            column: column.parse().ok()?,
        };
        let category = Category::of_detector(key.detector).ok()?;
        let voltage = category.parse_voltage(voltage)?;
        Channel::new(key, channel.parse().ok()?, voltage, gain.parse().ok()?).ok()
    }

    pub fn to_gain_line(&self) -> String {
        format!("{} {} {} {} {} {:.5}",
                self.key.detector, self.channel, self.key.row, self.key.column,
                self.category.format_voltage(self.voltage), self.gain)
    }
}
