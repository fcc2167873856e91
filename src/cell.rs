//! Channel categories and their voltage conventions.

use std::fmt;

use crate::{Error, Result};

/// Physical class of a detector cell.
///
/// Large cells are driven by high-voltage bases with a decimal setting written negative to
/// indicate polarity; small cells are driven by an 8-bit DAC written in hexadecimal. The two
/// classes otherwise share a calibration model and differ only in their voltage limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Large,
    Small,
}

impl Category {
    /// Category of the cells in detector `detector` (1, 2 large; 3, 4 small).
    pub fn of_detector(detector: i32) -> Result<Category> {
        match detector {
            1 | 2 => Ok(Category::Large),
            3 | 4 => Ok(Category::Small),
            _ => Err(Error::UnknownDetector(detector)),
        }
    }

    pub fn min_voltage(self, _bitshift: i32) -> i32 {
        0
    }

    /// Highest usable voltage at `bitshift`.
    ///
    /// Large cells are derated when the digital gain is far from unity.
    pub fn max_voltage(self, bitshift: i32) -> i32 {
        match self {
            Self::Small => 0xff,
            Self::Large if bitshift.abs() > 1 => 1500,
            Self::Large => 1600,
        }
    }

    pub fn parse_voltage(self, text: &str) -> Option<i32> {
        let voltage = match self {
            Self::Small => i32::from_str_radix(text.trim_start_matches('-'), 16).ok()?,
            Self::Large => text.parse::<i32>().ok()?,
        };
        Some(voltage.abs())
    }

    pub fn format_voltage(self, voltage: i32) -> VoltageDisplay {
        VoltageDisplay { category: self, voltage }
    }
}

/// Voltage as written in gain files, see [`Category::format_voltage`].
#[derive(Debug, Clone, Copy)]
pub struct VoltageDisplay {
    category: Category,
    voltage: i32,
}

impl fmt::Display for VoltageDisplay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.category {
            Category::Small => write!(f, "{:X}", self.voltage.abs()),
            Category::Large => write!(f, "{}", -self.voltage.abs()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_of_detector() {
        assert_eq!(Category::of_detector(1).unwrap(), Category::Large);
        assert_eq!(Category::of_detector(2).unwrap(), Category::Large);
        assert_eq!(Category::of_detector(3).unwrap(), Category::Small);
        assert_eq!(Category::of_detector(4).unwrap(), Category::Small);
        assert!(matches!(Category::of_detector(5), Err(Error::UnknownDetector(5))));
    }

    #[test]
    fn test_voltage_limits() {
        assert_eq!(Category::Small.min_voltage(0), 0);
        assert_eq!(Category::Small.max_voltage(0), 255);
        assert_eq!(Category::Small.max_voltage(5), 255);
        assert_eq!(Category::Large.min_voltage(3), 0);
        assert_eq!(Category::Large.max_voltage(0), 1600);
        assert_eq!(Category::Large.max_voltage(1), 1600);
        assert_eq!(Category::Large.max_voltage(-1), 1600);
        assert_eq!(Category::Large.max_voltage(2), 1500);
        assert_eq!(Category::Large.max_voltage(-2), 1500);
    }

    #[test]
    fn test_voltage_text() {
        assert_eq!(Category::Small.parse_voltage("E2"), Some(0xe2));
        assert_eq!(Category::Small.parse_voltage("e2"), Some(0xe2));
        assert_eq!(Category::Small.parse_voltage("xyz"), None);
        assert_eq!(Category::Large.parse_voltage("-1461"), Some(1461));
        assert_eq!(Category::Large.parse_voltage("1461"), Some(1461));
        assert_eq!(Category::Small.format_voltage(0xe2).to_string(), "E2");
        assert_eq!(Category::Large.format_voltage(1461).to_string(), "-1461");
    }
}
