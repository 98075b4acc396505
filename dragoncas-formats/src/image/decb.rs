/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! Color Computer DECB binary input.

A DECB ("Disk Extended Color BASIC") binary is a stream of chunks, each
introduced by a type byte:

* `0x00` — a data chunk: content length (MSB first), load address (MSB
  first) and the content itself. A file may carry any number of these.
* `0xFF` — the postamble: a zero length word followed by the exec address
  (MSB first). Nothing follows it.

A `0xFF` chunk at the very start of the stream marks a tokenized BASIC
program instead: its length word is followed directly by the program
content, loaded at address 0 with exec 0.
*/
use log::warn;
use std::io::{Read, Result};

use crate::ChunkRead;
use crate::block::FileType;
use super::{ProgramImage, Segment};

const DATA_CHUNK: u8 = 0x00;
const POSTAMBLE_CHUNK: u8 = 0xFF;

fn read_be16<R: Read>(rd: &mut R) -> Result<u16> {
    let mut word = [0u8; 2];
    rd.read_exact(&mut word)?;
    Ok(u16::from_be_bytes(word))
}

/// Reads chunk content, warning about and keeping a short read.
fn read_content<R: Read>(rd: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut data = vec![0u8; size];
    let nread = rd.read_up_to(&mut data)?;
    if nread < size {
        warn!("short read: {} of {} DECB content bytes", nread, size);
        data.truncate(nread);
    }
    Ok(data)
}

/// Decodes a DECB file, appending one segment per data chunk.
///
/// The postamble's exec address and the derived file type are applied to
/// `image` unless already set. An unknown chunk type ends the decoding
/// with a warning; whatever was decoded before it is kept.
pub fn load<R: Read>(mut rd: R, image: &mut ProgramImage) -> Result<()> {
    let mut ndata = 0usize;
    while let Some(tag) = rd.next_tag()? {
        match tag {
            DATA_CHUNK => {
                let size = read_be16(&mut rd)? as usize;
                let start = read_be16(&mut rd)?;
                let data = read_content(&mut rd, size)?;
                image.segments.push(Segment::new(start, data));
                if image.file_type == FileType::default() {
                    image.file_type = FileType::Binary;
                }
                ndata += 1;
            }
            POSTAMBLE_CHUNK if ndata == 0 => {
                // a tokenized BASIC program: the length word is followed
                // directly by the program content
                let size = read_be16(&mut rd)? as usize;
                let data = read_content(&mut rd, size)?;
                image.segments.push(Segment::new(0, data));
                if image.file_type == FileType::default() {
                    image.file_type = FileType::Basic;
                }
                if image.exec.is_none() {
                    image.exec = Some(0);
                }
                break;
            }
            POSTAMBLE_CHUNK => {
                let size = read_be16(&mut rd)?;
                if size != 0 {
                    warn!("DECB postamble with non-zero size {}", size);
                }
                let exec = read_be16(&mut rd)?;
                if image.exec.is_none() {
                    image.exec = Some(exec);
                }
                break;
            }
            other => {
                warn!("unknown DECB chunk type {:02x}, ignoring the rest", other);
                break;
            }
        }
    }
    Ok(())
}
