/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
//! Raw binary input: the whole file is one segment at address 0.
use std::io::{Read, Result};

use super::{ProgramImage, Segment};

/// Reads `rd` to the end and appends the content as a single segment.
///
/// The load address, exec address and file type are left for the caller
/// to override; the segment itself starts at 0.
pub fn load<R: Read>(mut rd: R, image: &mut ProgramImage) -> Result<()> {
    let mut data = Vec::new();
    rd.read_to_end(&mut data)?;
    image.segments.push(Segment::new(0, data));
    Ok(())
}
