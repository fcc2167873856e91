//! Search for the voltage and bitshift that realise a requested gain.
//!
//! The effective gain of a channel is `norm * ADC(voltage) * 2^bitshift`. The analog part is
//! continuous but limited by the voltage range of the channel, and the digital part is coarse
//! but wide, so most gains can be reached with several bitshifts. The search tries every legal
//! bitshift, keeps the ones for which the calibration curve yields a usable voltage, and prefers
//! the digital gain closest to unity. Gains that cannot be reached at all are clamped to the
//! corner of the operating envelope in the requested direction.

use crate::{CalibrationCurve, Channel, OptimiserConfiguration, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The channel has a locked bitshift and was left as is.
    Locked,
    /// The requested gain is achievable.
    Reached,
    /// The requested gain is outside of the operating envelope; the closest corner was chosen.
    Clamped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Optimised {
    pub voltage: i32,
    pub bitshift: i32,
    pub gain: f64,
    pub outcome: Outcome,
}

impl Optimised {
    pub fn apply(&self, channel: &mut Channel) {
        channel.voltage = self.voltage;
        channel.bitshift = self.bitshift;
        channel.gain = self.gain;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Optimiser {
    config: OptimiserConfiguration,
}

impl Optimiser {
    pub fn new(config: OptimiserConfiguration) -> Optimiser {
        Optimiser { config }
    }

    pub fn configuration(&self) -> &OptimiserConfiguration {
        &self.config
    }

    /// Find the voltage and bitshift that give `channel` a gain of `target_gain`.
    ///
    /// When several bitshifts can reach the gain, the one with the smallest magnitude is used,
    /// and of two with equal magnitude the negative one. When none can, the lowest bitshift at
    /// its minimum voltage is used for a reduced gain, and the highest bitshift at its maximum
    /// voltage for an increased gain; the reported gain is then the one actually delivered.
    ///
    /// Fails only if the channel has no calibration curve or the curve cannot be evaluated at
    /// the current operating point. `channel` is not modified; see [`Optimised::apply`].
    pub fn optimise(&self, channel: &Channel, target_gain: f64) -> Result<Optimised> {
        if self.config.is_locked(channel.bitshift) {
            log::debug!("{}: bitshift {:+} is locked", channel.key, channel.bitshift);
            return Ok(Optimised {
                voltage: channel.voltage,
                bitshift: channel.bitshift,
                gain: channel.gain,
                outcome: Outcome::Locked,
            })
        }

        let curve = channel.curve()?;
        let norm = channel.norm()?;
        let candidates = self.candidates(channel, curve, norm, target_gain);
        if let Some((voltage, bitshift)) = select(candidates) {
            log::debug!("{}: gain {} -> {} at voltage {} bitshift {:+}",
                        channel.key, channel.gain, target_gain, voltage, bitshift);
            return Ok(Optimised { voltage, bitshift, gain: target_gain, outcome: Outcome::Reached })
        }

        let (voltage, bitshift) =
            if target_gain < channel.gain {
                let bitshift = self.config.min_bitshift();
                (channel.min_voltage(bitshift), bitshift)
            } else {
                let bitshift = self.config.max_bitshift();
                (channel.max_voltage(bitshift), bitshift)
            };
        let gain = channel.compute_gain(voltage, bitshift)?;
        log::debug!("{}: gain {} unreachable from {}, clamped to {} at voltage {} bitshift {:+}",
                    channel.key, target_gain, channel.gain, gain, voltage, bitshift);
        Ok(Optimised { voltage, bitshift, gain, outcome: Outcome::Clamped })
    }

    fn candidates<'a>(&'a self, channel: &'a Channel, curve: &'a CalibrationCurve, norm: f64,
                      target_gain: f64) -> impl Iterator<Item = (i32, i32)> + 'a {
        self.config.bitshifts.clone().filter_map(move |bitshift| {
            if norm == 0.0 {
                return None
            }
            let adc = target_gain / norm / 2f64.powi(bitshift - channel.bitshift);
            if !adc.is_finite() {
                return None
            }
            let voltage = curve.voltage_for_adc(adc)?;
            if !channel.is_valid_voltage(voltage, bitshift) {
                log::trace!("{}: bitshift {:+} needs out of range voltage {}",
                            channel.key, bitshift, voltage);
                return None
            }
            log::trace!("{}: bitshift {:+} at voltage {}", channel.key, bitshift, voltage);
            Some((voltage, bitshift))
        })
    }
}

fn select(candidates: impl Iterator<Item = (i32, i32)>) -> Option<(i32, i32)> {
    candidates.min_by_key(|&(_voltage, bitshift)| (bitshift.abs(), bitshift))
}

/// Optimise `channel` towards `target_gain` with the default configuration.
pub fn optimise(channel: &Channel, target_gain: f64) -> Result<Optimised> {
    Optimiser::default().optimise(channel, target_gain)
}
