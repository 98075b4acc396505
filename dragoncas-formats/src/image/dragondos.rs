/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! DragonDOS binary input.

A DragonDOS file carries a 9 byte header in front of the content:

| offset | size | description                        |
|--------|------|------------------------------------|
|    0   |    1 | header marker `0x55`               |
|    1   |    1 | file type: 1 BASIC, 2 machine code |
|    2   |    2 | load address (MSB first)           |
|    4   |    2 | content length (MSB first)         |
|    6   |    2 | exec address (MSB first)           |
|    8   |    1 | header marker `0xAA`               |
*/
use log::warn;
use std::io::{Read, Result};

use crate::ChunkRead;
use crate::block::FileType;
use super::{ProgramImage, Segment};

const HEADER_SIZE: usize = 9;

/// Decodes a DragonDOS file, appending its content as one segment.
///
/// The container's load address, exec address and file type are applied
/// to `image` unless already set. A content shorter than the header
/// declares is reported with a warning and kept as read.
pub fn load<R: Read>(mut rd: R, image: &mut ProgramImage) -> Result<()> {
    let mut header = [0u8; HEADER_SIZE];
    rd.read_exact(&mut header)?;
    if header[0] != 0x55 || header[8] != 0xAA {
        warn!("suspicious DragonDOS header markers: {:02x}..{:02x}", header[0], header[8]);
    }
    let file_type = match header[1] {
        1 => FileType::Basic,
        2 => FileType::Binary,
        t => {
            warn!("unknown DragonDOS file type {}, assuming machine code", t);
            FileType::Binary
        }
    };
    let start = u16::from_be_bytes([header[2], header[3]]);
    let size = u16::from_be_bytes([header[4], header[5]]) as usize;
    let exec = u16::from_be_bytes([header[6], header[7]]);
    let mut data = vec![0u8; size];
    let nread = rd.read_up_to(&mut data)?;
    if nread < size {
        warn!("short read: {} of {} DragonDOS content bytes", nread, size);
        data.truncate(nread);
    }
    if image.file_type == FileType::default() {
        image.file_type = file_type;
    }
    if image.load.is_none() {
        image.load = Some(start);
    }
    if image.exec.is_none() {
        image.exec = Some(exec);
    }
    image.segments.push(Segment::new(start, data));
    Ok(())
}
