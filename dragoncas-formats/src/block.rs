/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! Cassette block model and framing.

# Tape blocks

A cassette program consists of *blocks*. Each block is framed the same way
on tape:

```text
55 3C kind len payload... checksum 55
```

The `0x55` bytes preceding the sync byte `0x3C` belong to the *leader*: a
run of alternating bit cells the ROM loader uses to lock its bit timing.
`kind` is one of [NAMEFILE_BLOCK], [DATA_BLOCK] or [EOF_BLOCK], `len` is
the payload length (0..=255) and `checksum` is the modulo 256 sum of the
`kind`, `len` and payload bytes.

The first block of a file is usually a *filename block*: a 15 byte payload
announcing the program name, its type and the load and exec addresses.
See [NameBlock].

# Sinks

Framing is independent of the output encoding, which is provided by a
[BlockSink] implementation: [CasWriter][crate::cas::CasWriter] stores the
block bytes verbatim, while the audio sink renders every byte as pulses.
The sink distinguishes three [pulse classes][PulseClass] so an audio
implementation can apply the position-dependent pulse widths the ROM
loader expects.
*/
use std::io::{Error, ErrorKind, Result};

/// The filler byte making up block leaders.
pub const FILLER_BYTE: u8 = 0x55;
/// The byte marking the start of a block header after the leader.
pub const SYNC_BYTE: u8 = 0x3C;
/// The block kind announcing a file name.
pub const NAMEFILE_BLOCK: u8 = 0x00;
/// The block kind carrying file content.
pub const DATA_BLOCK: u8 = 0x01;
/// The block kind ending a file, optionally carrying final content.
pub const EOF_BLOCK: u8 = 0xFF;
/// The largest payload a single block can carry.
pub const MAX_PAYLOAD_LEN: usize = 255;
/// The number of filler bytes written by [BlockSink::silence] in CAS mode
/// and the length of the trailing filler run ending an output file.
pub const SILENCE_FILLERS: usize = 94;
/// The default number of leader filler bytes preceding a block group.
pub const DEFAULT_LEADER_LEN: u16 = 256;

/// The size of a filename block payload.
pub const NAME_PAYLOAD_SIZE: usize = 15;
/// Filename block encoding byte: raw binary data.
pub const ENCODING_BINARY: u8 = 0x00;
/// Filename block encoding byte: ASCII data.
pub const ENCODING_ASCII: u8 = 0xFF;
/// Filename block gap byte: blocks follow continuously.
pub const GAP_NONE: u8 = 0x00;
/// Filename block gap byte: a leader precedes every block.
pub const GAP_EACH: u8 = 0xFF;

/// Calculates the block checksum from a block kind and its payload.
pub fn block_checksum(kind: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(
        kind.wrapping_add(payload.len() as u8),
        |acc, x| acc.wrapping_add(*x)
    )
}

/// The file type byte of a filename block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Basic  = 0,
    Data   = 1,
    Binary = 2
}

impl Default for FileType {
    fn default() -> Self {
        FileType::Binary
    }
}

impl From<FileType> for u8 {
    #[inline]
    fn from(ft: FileType) -> u8 {
        ft as u8
    }
}

/// Selects the pulse timing a sink applies to a byte run.
///
/// The ROM loader samples the first bits of a block header differently
/// from payload bits, so the framing methods tag each run with the class
/// of pulse widths to compensate with. A byte-exact sink ignores this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PulseClass {
    /// Leader fillers, sync byte and block trailer.
    Leader,
    /// The `kind` and `len` header bytes.
    First,
    /// Payload and checksum bytes.
    Rest
}

/// The filename block payload.
///
/// Instances are built with the `with_*` methods and rendered with
/// [NameBlock::payload]:
///
/// ```
/// use dragoncas_formats::block::{NameBlock, FileType};
///
/// let payload = NameBlock::new(FileType::Binary)
///                         .with_name("HI")
///                         .with_load(0x1000)
///                         .with_exec(0x1000)
///                         .payload();
/// assert_eq!(&payload[..8], b"HI      ");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameBlock {
    /// A name of the file, space padded.
    pub name: [u8; 8],
    /// The type of the file this block announces.
    pub file_type: FileType,
    /// `true` for ASCII content, `false` for binary.
    pub ascii: bool,
    /// `true` when a leader precedes every following block.
    pub gapped: bool,
    /// The entry address of a machine code file.
    pub exec: u16,
    /// The load address of a machine code file.
    pub load: u16
}

impl Default for NameBlock {
    fn default() -> Self {
        NameBlock {
            name: [b' '; 8],
            file_type: FileType::default(),
            ascii: false,
            gapped: false,
            exec: 0,
            load: 0
        }
    }
}

impl NameBlock {
    /// Creates a filename block payload of the given type.
    pub fn new(file_type: FileType) -> Self {
        NameBlock { file_type, ..Default::default() }
    }
    /// Changes `name`, builder style. Longer names are truncated to 8
    /// bytes, shorter ones padded with spaces.
    pub fn with_name<S: AsRef<[u8]>>(mut self, name: S) -> Self {
        let name = name.as_ref();
        let len = name.len().min(8);
        self.name[..len].copy_from_slice(&name[..len]);
        for p in self.name[len..].iter_mut() {
            *p = b' ';
        }
        self
    }
    /// Changes `load`, builder style.
    pub fn with_load(mut self, load: u16) -> Self {
        self.load = load;
        self
    }
    /// Changes `exec`, builder style.
    pub fn with_exec(mut self, exec: u16) -> Self {
        self.exec = exec;
        self
    }
    /// Returns the 15 byte filename block payload.
    pub fn payload(&self) -> [u8; NAME_PAYLOAD_SIZE] {
        let mut buf = [0u8; NAME_PAYLOAD_SIZE];
        buf[0..8].copy_from_slice(&self.name);
        buf[8] = self.file_type.into();
        buf[9] = if self.ascii { ENCODING_ASCII } else { ENCODING_BINARY };
        buf[10] = if self.gapped { GAP_EACH } else { GAP_NONE };
        buf[11..13].copy_from_slice(&self.exec.to_be_bytes());
        buf[13..15].copy_from_slice(&self.load.to_be_bytes());
        buf
    }
}

/// A sink accepting framed cassette blocks.
///
/// Implementations provide the byte level encoding; the provided methods
/// implement the framing itself and are shared by every output format.
pub trait BlockSink {
    /// Writes the inter-file silence prelude.
    ///
    /// An audio sink holds the output at the midpoint level; a byte-exact
    /// sink writes [SILENCE_FILLERS] filler bytes instead.
    fn silence(&mut self) -> Result<()>;
    /// Encodes a run of bytes with the pulse timing of `class`.
    fn put(&mut self, class: PulseClass, bytes: &[u8]) -> Result<()>;
    /// Switches the sink between fast and regular pulse timing.
    ///
    /// The default implementation ignores the request; sinks without a
    /// notion of timing need not override it.
    fn set_fast(&mut self, _fast: bool) -> Result<()> {
        Ok(())
    }
    /// Writes a block group leader: the silence prelude followed by
    /// `count` filler bytes.
    fn write_leader(&mut self, count: u16) -> Result<()> {
        self.silence()?;
        let fillers = vec![FILLER_BYTE; count as usize];
        self.put(PulseClass::Leader, &fillers)
    }
    /// Writes one framed block of the given kind.
    ///
    /// The payload must not exceed [MAX_PAYLOAD_LEN] bytes.
    fn block_out(&mut self, kind: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::new(ErrorKind::InvalidData, "block payload too large"));
        }
        self.put(PulseClass::Leader, &[FILLER_BYTE, SYNC_BYTE])?;
        self.put(PulseClass::First, &[kind, payload.len() as u8])?;
        self.put(PulseClass::Rest, payload)?;
        self.put(PulseClass::Rest, &[block_checksum(kind, payload)])?;
        self.put(PulseClass::Leader, &[FILLER_BYTE])
    }
    /// Writes the trailing filler run ending an output file.
    fn finalize(&mut self) -> Result<()> {
        let fillers = [FILLER_BYTE; SILENCE_FILLERS];
        self.put(PulseClass::Leader, &fillers)
    }
}
