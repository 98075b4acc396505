/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! **CAS** file output.

A **CAS** file is the byte-exact form of a cassette program: the framed
blocks and their leaders are stored verbatim, with no audio encoding and
no timing information. Emulators synthesize the waveform themselves when
such a file is "played".
*/
use std::io::{Result, Write};

use crate::block::{BlockSink, PulseClass, FILLER_BYTE, SILENCE_FILLERS};

/// A [BlockSink] writing blocks as raw bytes.
///
/// Anything that implements [Write] can be used as the underlying writer:
///
/// ```no_run
/// use dragoncas_formats::{block::BlockSink, cas::CasWriter};
///
/// let file = std::fs::File::create("out.cas")?;
/// let mut cas = CasWriter::new(file);
/// cas.write_leader(256)?;
/// cas.block_out(0x01, &[0x48, 0x49])?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct CasWriter<W> {
    wr: W
}

impl<W> CasWriter<W> {
    /// Returns a new `CasWriter` with the given writer.
    pub fn new(wr: W) -> Self {
        CasWriter { wr }
    }
    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.wr
    }
    /// Returns a mutable reference to the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.wr
    }
}

impl<W: Write> BlockSink for CasWriter<W> {
    /// Writes the silence prelude as [SILENCE_FILLERS] filler bytes.
    fn silence(&mut self) -> Result<()> {
        self.wr.write_all(&[FILLER_BYTE; SILENCE_FILLERS])
    }
    /// Writes the bytes through, ignoring the pulse class.
    fn put(&mut self, _class: PulseClass, bytes: &[u8]) -> Result<()> {
        self.wr.write_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{DATA_BLOCK, EOF_BLOCK};

    #[test]
    fn cas_block_bytes() {
        let mut cas = CasWriter::new(Vec::new());
        cas.block_out(DATA_BLOCK, &[0x48, 0x49]).unwrap();
        cas.block_out(EOF_BLOCK, &[]).unwrap();
        assert_eq!(
            vec![0x55, 0x3C, 0x01, 0x02, 0x48, 0x49, 0x94, 0x55,
                 0x55, 0x3C, 0xFF, 0x00, 0xFF, 0x55],
            cas.into_inner()
        );
    }

    #[test]
    fn cas_leader_bytes() {
        let mut cas = CasWriter::new(Vec::new());
        cas.write_leader(4).unwrap();
        let bytes = cas.into_inner();
        assert_eq!(SILENCE_FILLERS + 4, bytes.len());
        assert!(bytes.iter().all(|&b| b == FILLER_BYTE));
    }
}
