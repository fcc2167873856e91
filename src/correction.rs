//! Whole-detector channel state and bulk gain corrections.

use std::collections::HashMap;
use std::io::{BufRead, Write};

use crate::{CalibrationTable, Channel, ChannelKey, Error, Optimiser, Outcome, Result};

/// Request to multiply the gain of one channel by `factor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub key: ChannelKey,
    pub factor: f64,
}

impl Correction {
    /// Parse a `detector row column factor` line.
    pub fn from_line(line: &str) -> Option<Correction> {
        let words = line.split_whitespace().collect::<Vec<_>>();
        let [detector, row, column, factor] = words[..] else {
            return None
        };
        Some(Correction {
            key: ChannelKey {
                detector: detector.parse().ok()?,
                row: row.parse().ok()?,
                column: column.parse().ok()?,
            },
            factor: factor.parse().ok()?,
        })
    }

    pub fn load(reader: impl BufRead) -> Result<Vec<Correction>> {
        parse_lines(reader, "detector row column factor", Correction::from_line)
    }
}

/// Channels of one or more detectors, in the order they were loaded.
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    channels: Vec<Channel>,
    index: HashMap<ChannelKey, usize>,
}

impl ChannelSet {
    pub fn new() -> ChannelSet {
        Self::default()
    }

    /// Add `channel`, replacing any channel with the same key in place.
    pub fn insert(&mut self, channel: Channel) {
        match self.index.get(&channel.key) {
            Some(&position) => self.channels[position] = channel,
            None => {
                self.index.insert(channel.key, self.channels.len());
                self.channels.push(channel);
            }
        }
    }

    pub fn get(&self, key: ChannelKey) -> Option<&Channel> {
        self.index.get(&key).map(|&position| &self.channels[position])
    }

    pub fn get_mut(&mut self, key: ChannelKey) -> Option<&mut Channel> {
        self.index.get(&key).map(|&position| &mut self.channels[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Read channels from a gain file of `detector channel row column voltage gain` lines.
    pub fn load_gains(&mut self, reader: impl BufRead) -> Result<usize> {
        let channels = parse_lines(reader, "detector channel row column voltage gain",
                                   Channel::from_gain_line)?;
        let count = channels.len();
        for channel in channels {
            self.insert(channel);
        }
        log::debug!("loaded {} channels", count);
        Ok(count)
    }

    /// Read current bitshifts from `detector row column bitshift` lines.
    ///
    /// Lines for channels not in the set are ignored. Channels not mentioned keep a bitshift
    /// of zero.
    pub fn load_bitshifts(&mut self, reader: impl BufRead) -> Result<usize> {
        let entries = parse_lines(reader, "detector row column bitshift", |line| {
            let words = line.split_whitespace().collect::<Vec<_>>();
            let [detector, row, column, bitshift] = words[..] else {
                return None
            };
            let key = ChannelKey {
                detector: detector.parse().ok()?,
                row: row.parse().ok()?,
                column: column.parse().ok()?,
            };
            Some((key, bitshift.parse::<i32>().ok()?))
        })?;
        let mut count = 0;
        for (key, bitshift) in entries {
            match self.get_mut(key) {
                Some(channel) => {
                    channel.bitshift = bitshift;
                    count += 1;
                }
                None => log::warn!("{}: bitshift given for unknown channel", key),
            }
        }
        Ok(count)
    }

    /// Attach calibration curves to every channel that has one in `table`.
    pub fn set_calibration(&mut self, table: &CalibrationTable) -> usize {
        let mut count = 0;
        for channel in self.channels.iter_mut() {
            match table.find(channel.key) {
                Some(curve) => {
                    channel.calibration = Some(*curve);
                    count += 1;
                }
                None => log::warn!("{}: no calibration curve", channel.key),
            }
        }
        count
    }

    /// Change the voltage and bitshift of channels to scale their gain by the factors in
    /// `corrections`, returning the number of channels modified.
    ///
    /// Unit factors and unknown channels are skipped. Channels whose calibration is missing or
    /// unusable are reported and skipped without affecting the rest of the batch. Channels with
    /// a locked bitshift are left as they are and, unlike in the older gain tools which counted
    /// every optimised channel, are not included in the count.
    pub fn apply_gain_corrections(&mut self, optimiser: &Optimiser, corrections: &[Correction])
            -> usize {
        let mut modified = 0;
        for correction in corrections {
            if correction.factor == 1.0 {
                continue
            }
            let Some(channel) = self.get_mut(correction.key) else {
                log::debug!("{}: no such channel, correction skipped", correction.key);
                continue
            };
            let target_gain = channel.gain * correction.factor;
            match optimiser.optimise(channel, target_gain) {
                Ok(result) => {
                    if result.outcome == Outcome::Clamped {
                        log::warn!("{}: gain {} out of range, set to {}",
                                   correction.key, target_gain, result.gain);
                    }
                    if result.outcome != Outcome::Locked {
                        result.apply(channel);
                        modified += 1;
                    }
                }
                Err(error) => log::warn!("{}: correction skipped: {}", correction.key, error),
            }
        }
        log::info!("modified {} of {} channels", modified, self.channels.len());
        modified
    }

    pub fn write_gains(&self, mut writer: impl Write) -> Result<()> {
        for channel in self.channels.iter() {
            writeln!(writer, "{}", channel.to_gain_line())?;
        }
        Ok(())
    }

    /// Write `detector row column bitshift` lines for every channel, readable by
    /// [`ChannelSet::load_bitshifts`].
    ///
    /// Nonzero bitshifts carry an explicit sign.
    pub fn write_bitshifts(&self, mut writer: impl Write) -> Result<()> {
        for channel in self.channels.iter() {
            let ChannelKey { detector, row, column } = channel.key;
            if channel.bitshift == 0 {
                writeln!(writer, "{} {} {} 0", detector, row, column)?;
            } else {
                writeln!(writer, "{} {} {} {:+}", detector, row, column, channel.bitshift)?;
            }
        }
        Ok(())
    }
}

fn parse_lines<T>(reader: impl BufRead, format: &str, parse: impl Fn(&str) -> Option<T>)
        -> Result<Vec<T>> {
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue
        }
        let entry = parse(&line).ok_or_else(|| Error::Parse {
            line: index + 1,
            reason: format!("expected `{}`, got {:?}", format, line),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
