/*! Cassette and container file format utilities of DRAGONCAS.

This crate knows how bytes end up on a Dragon or Tandy Color Computer
cassette: the [block] model and its checksummed framing, the byte exact
[CAS][cas] output, the input container decoders and segment handling of
[image], the [dzip] compressor gateway, the tiny [mc6809] assembler and
the [autorun] loader composer. Whole programs are emitted with [tape].

Audio output lives in the `dragoncas-audio` crate, which plugs into the
[block::BlockSink] seam defined here.
*/
// https://worldofdragon.org/index.php?title=Tape%5CDisk_Preservation
// http://dragon32.info/info/basicfmt.html
use std::io::{self, Read};

pub mod autorun;
pub mod block;
pub mod cas;
pub mod dzip;
pub mod image;
pub mod mc6809;
pub mod tape;

/// A trait that extends [Read] with the two accesses the container
/// decoders perform: pulling a declared amount of chunk content that may
/// legitimately fall short, and probing for the next chunk tag byte.
pub(crate) trait ChunkRead: Read {
    /// Reads chunk content until `buf` is full or the input ends,
    /// returning how many bytes actually arrived. A container whose
    /// header declares more content than the file holds is reported
    /// through the count, not as an error.
    fn read_up_to(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
    /// Reads the next chunk tag byte, or `None` at a clean end of the
    /// chunk stream.
    fn next_tag(&mut self) -> io::Result<Option<u8>> {
        let mut tag = [0u8];
        loop {
            match self.read(&mut tag) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(tag[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> ChunkRead for R {}
