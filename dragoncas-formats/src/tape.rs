/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! Writing whole programs to a block sink.

This module drives the [framing][crate::block] layer for one
[ProgramImage] at a time: an optional filename block announcing the
program, followed by its content split into data blocks of up to 255
bytes, terminated according to the image's EOF options.
*/
use std::io::Result;

use crate::block::{
    BlockSink, NameBlock, DATA_BLOCK, EOF_BLOCK, MAX_PAYLOAD_LEN, NAMEFILE_BLOCK
};
use crate::image::ProgramImage;

/// Writes the coalesced content of `image` as data blocks.
///
/// The last block is an empty EOF block, unless `eof_data` makes the
/// final content chunk itself the EOF block, or `eof` suppresses the EOF
/// block altogether.
pub fn write_program_data<S: BlockSink + ?Sized>(sink: &mut S, image: &ProgramImage) -> Result<()> {
    let data = &image.segment().data;
    let nchunks = data.chunks(MAX_PAYLOAD_LEN).count();
    for (nchunk, chunk) in data.chunks(MAX_PAYLOAD_LEN).enumerate() {
        if nchunk + 1 == nchunks && image.eof && image.eof_data {
            return sink.block_out(EOF_BLOCK, chunk);
        }
        sink.block_out(DATA_BLOCK, chunk)?;
    }
    if image.eof {
        sink.block_out(EOF_BLOCK, &[])?;
    }
    Ok(())
}

/// Writes one complete program: timing selection, the optional filename
/// block with its leader, then a leader and the data blocks.
pub fn write_program<S: BlockSink + ?Sized>(sink: &mut S, image: &ProgramImage) -> Result<()> {
    sink.set_fast(image.fast)?;
    if image.fnblock {
        let payload = NameBlock {
            name: image.padded_name(),
            file_type: image.file_type,
            ascii: false,
            gapped: false,
            exec: image.exec.unwrap_or(0),
            load: image.effective_load()
        }.payload();
        sink.write_leader(image.leader)?;
        sink.block_out(NAMEFILE_BLOCK, &payload)?;
    }
    sink.write_leader(image.leader)?;
    write_program_data(sink, image)
}
