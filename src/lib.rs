/*
    DRAGONCAS: a Rust tool set for authoring Dragon and Tandy Color
    Computer cassette tapes.

    Copyright (C) 2021-2023  Rafal Michalski

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Lesser General Public License as
    published by the Free Software Foundation, either version 3 of the
    License, or (at your option) any later version.

    This program is distributed in the hope that it will be useful, but
    WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
    Lesser General Public License for more details.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
/*! **DRAGONCAS** turns binary program images into cassette tapes for the
6809 based home computers of the Dragon and Tandy Color Computer family.

The workspace splits along the natural seam between bytes and sound:

* [formats] — tape blocks and framing, the byte exact **CAS** output,
  input container decoders, the compressor gateway, a miniature MC6809
  assembler and the autorun loader composer;
* [audio] — the pulse timing tables, the rate adapted sine synthesizer
  and the **WAV** output.

The `bin2cas` binary drives both from an order sensitive command line.
*/
pub use dragoncas_audio as audio;
pub use dragoncas_formats as formats;
