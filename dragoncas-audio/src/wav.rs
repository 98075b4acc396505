/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! **WAV** audio output.

The audio sink renders framed blocks as a mono, unsigned 8-bit PCM
RIFF/WAVE stream a real machine loads from line out. A placeholder header
is written up front and the two chunk sizes are patched on
[close][WavWriter::close], once the sample count is known (the same
seek-back fixup pattern the byte formats use for their length prefixes).
*/
use std::io::{Result, Seek, SeekFrom, Write};

use dragoncas_formats::block::{BlockSink, PulseClass};

use crate::synth::SineSynth;
use crate::timing::{consts::FAST, TimingSpec};

/// The size of the canonical RIFF/WAVE PCM header.
pub const HEADER_SIZE: u64 = 44;
/// The default sample rate of the audio output.
pub const DEFAULT_SAMPLE_RATE: u32 = 9600;
/// How long the silence prelude holds the midpoint, in source ticks.
const SILENCE_TICKS: u32 = 0xDA5C * 8;

const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;

/// A [BlockSink] rendering blocks as a **WAV** file.
///
/// ```no_run
/// use dragoncas_formats::block::BlockSink;
/// use dragoncas_audio::{timing::consts::ROM, wav::WavWriter};
///
/// let file = std::fs::File::create("out.wav")?;
/// let mut wav = WavWriter::new(file, 9600, &ROM)?;
/// wav.write_leader(256)?;
/// wav.block_out(0x01, &[0x48, 0x49])?;
/// wav.close()?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct WavWriter<W> {
    wr: W,
    synth: SineSynth,
    timing: &'static TimingSpec,
    fast: bool,
    sample_count: u64
}

impl<W: Write + Seek> WavWriter<W> {
    /// Returns a new `WavWriter` after emitting the header placeholder.
    pub fn new(mut wr: W, sample_rate: u32, timing: &'static TimingSpec) -> Result<Self> {
        write_header(&mut wr, sample_rate, 0)?;
        Ok(WavWriter {
            wr,
            synth: SineSynth::new(sample_rate),
            timing,
            fast: false,
            sample_count: 0
        })
    }
    /// Returns the number of PCM samples written so far.
    #[inline]
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }
    /// Patches the header sizes and returns the underlying writer.
    pub fn close(mut self) -> Result<W> {
        let count = self.sample_count as u32;
        self.wr.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.wr.write_all(&(count + (HEADER_SIZE as u32 - 8)).to_le_bytes())?;
        self.wr.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.wr.write_all(&count.to_le_bytes())?;
        self.wr.seek(SeekFrom::End(0))?;
        self.wr.flush()?;
        Ok(self.wr)
    }
}

fn write_header<W: Write>(wr: &mut W, sample_rate: u32, nsamples: u32) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(nsamples + (HEADER_SIZE as u32 - 8)).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());   // fmt chunk size
    header[20..22].copy_from_slice(&1u16.to_le_bytes());    // PCM
    header[22..24].copy_from_slice(&1u16.to_le_bytes());    // mono
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&sample_rate.to_le_bytes()); // byte rate
    header[32..34].copy_from_slice(&1u16.to_le_bytes());    // block align
    header[34..36].copy_from_slice(&8u16.to_le_bytes());    // bits per sample
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&nsamples.to_le_bytes());
    wr.write_all(&header)
}

impl<W: Write + Seek> BlockSink for WavWriter<W> {
    /// Holds the output at the midpoint level for the prelude duration.
    fn silence(&mut self) -> Result<()> {
        self.sample_count += self.synth.silence_out(&mut self.wr, SILENCE_TICKS)?;
        Ok(())
    }
    /// Renders the bytes as pulses with the pulse widths of `class`.
    fn put(&mut self, class: PulseClass, bytes: &[u8]) -> Result<()> {
        let timing = if self.fast { &FAST } else { self.timing };
        self.sample_count += self.synth.bytes_out(
            &mut self.wr, &timing.cycles, timing.delays(class), bytes)?;
        Ok(())
    }
    fn set_fast(&mut self, fast: bool) -> Result<()> {
        self.fast = fast;
        Ok(())
    }
}
