/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! The rate adapted sine wave synthesizer.

Every data bit becomes one full sine wave: a positive lobe followed by a
negative lobe, with independently adjustable half-period lengths so the
pulse asymmetry of a [TimingSpec] can be expressed.

Two details make the output land on the ROM loader's counting windows at
any sample rate:

* **Phase continuity.** The ideal length of a half-period is almost never
  a whole number of samples. The synthesizer emits the rounded length but
  carries the fractional remainder into the next computation, keeping an
  arbitrarily long pulse train within half a sample of the ideal
  waveform.
* **Sine caching.** At a fixed sample rate only a handful of distinct
  `(period0, period1)` pairs ever occur, so each rendered pair of lobes
  is memoized. The cache is unbounded on purpose.

Samples are unsigned 8-bit PCM with the midpoint at `0x80`.
*/
use log::debug;
use std::collections::hash_map::{Entry, HashMap};
use std::io::{Result, Write};

use crate::timing::SOURCE_CLOCK;

/// The sine wave amplitude around the midpoint.
const AMPLITUDE: f64 = 115.0;
/// The idle output level.
pub const MIDPOINT_SAMPLE: u8 = 0x80;

/// Renders byte streams as pulse waveforms at a fixed sample rate.
#[derive(Clone, Debug)]
pub struct SineSynth {
    sample_rate: u32,
    /// The fractional rounding residue carried between periods.
    ao_error: f64,
    sinewave_cache: HashMap<(u32, u32), Vec<u8>>
}

impl SineSynth {
    /// Creates a synthesizer for the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        SineSynth {
            sample_rate,
            ao_error: 0.0,
            sinewave_cache: HashMap::new()
        }
    }
    /// Returns the configured sample rate.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    /// Returns the ideal, unrounded number of samples covering `ticks16`
    /// units of 16 source clock ticks.
    #[inline]
    pub fn samples_for(&self, ticks16: f64) -> f64 {
        self.sample_rate as f64 * ticks16 * 16.0 / SOURCE_CLOCK as f64
    }
    /// Returns the sample length of the next period covering `ticks16`,
    /// rounding through the carried fractional residue.
    pub fn next_period(&mut self, ticks16: f64) -> u32 {
        let p = self.ao_error + self.samples_for(ticks16);
        let n = p.round().max(0.0);
        self.ao_error = p - n;
        n as u32
    }
    /// Writes one bit cell: a positive and a negative half sine of
    /// `cycles/2` 16-tick units each, corrected by the delay pair.
    ///
    /// Returns the number of samples written.
    pub fn bit_out<W: Write>(&mut self, wr: &mut W, cycles: u16, delays: (u16, u16)) -> Result<u64> {
        let half = cycles as f64 / 2.0;
        let period0 = self.next_period(half + delays.0 as f64);
        let period1 = self.next_period(half + delays.1 as f64);
        let samples = match self.sinewave_cache.entry((period0, period1)) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!("rendering sine pair: {}+{} samples", period0, period1);
                entry.insert(sine_pair(period0, period1))
            }
        };
        wr.write_all(samples)?;
        Ok(samples.len() as u64)
    }
    /// Holds the output at the midpoint level for `ticks` source clock
    /// ticks, through the same fractional residue accounting.
    ///
    /// Returns the number of samples written.
    pub fn silence_out<W: Write>(&mut self, wr: &mut W, ticks: u32) -> Result<u64> {
        let count = self.next_period(ticks as f64 / 16.0) as usize;
        let samples = vec![MIDPOINT_SAMPLE; count];
        wr.write_all(&samples)?;
        Ok(count as u64)
    }
    /// Writes a run of bytes, bit 0 first, applying the position
    /// dependent delay pairs of `delays` (see
    /// [TimingSpec::delay_pair][crate::timing::TimingSpec::delay_pair]).
    ///
    /// Returns the number of samples written.
    pub fn bytes_out<W: Write>(
            &mut self,
            wr: &mut W,
            cycles: &[u16; 2],
            delays: &[u16; 6],
            bytes: &[u8]
        ) -> Result<u64>
    {
        let mut count = 0;
        for (nbyte, byte) in bytes.iter().enumerate() {
            for bit in 0..8 {
                let value = (byte >> bit & 1) as usize;
                let n = if bit != 0 { 2 }
                        else if nbyte == 0 { 0 }
                        else { 4 };
                count += self.bit_out(wr, cycles[value], (delays[n], delays[n + 1]))?;
            }
        }
        Ok(count)
    }
}

/// Renders a positive lobe of `period0` samples followed by a negative
/// lobe of `period1` samples.
fn sine_pair(period0: u32, period1: u32) -> Vec<u8> {
    let mut samples = Vec::with_capacity((period0 + period1) as usize);
    let scale0 = core::f64::consts::PI / (period0 as f64 + 1.0);
    for i in 1..=period0 {
        let value = (AMPLITUDE * (scale0 * i as f64).sin()).round();
        samples.push((value + 128.0) as u8);
    }
    let scale1 = core::f64::consts::PI / (period1 as f64 + 1.0);
    for i in 1..=period1 {
        let value = (AMPLITUDE * (core::f64::consts::PI + scale1 * i as f64).sin()).round();
        samples.push((value + 128.0) as u8);
    }
    samples
}
