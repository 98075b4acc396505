/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! The external compressor gateway.

Compression is delegated to the `dzip` program found on the host. The
integration contract is deliberately narrow: a byte sequence goes in, a
byte sequence comes out. [Compress] is the seam; two transports are
provided:

* [DzipPipe] spawns `dzip -c` with piped standard streams,
* [DzipTempFile] round-trips through a temporary directory for hosts
  where piping is not an option.

[compress_segment] applies either to a coalesced [Segment], recording the
original size so the autorun loader can unpack the content in place.
*/
use std::ffi::OsString;
use std::fs;
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::process::{Command, Stdio};

use crate::image::Segment;

/// A byte to byte compressing transform.
pub trait Compress {
    /// Returns the compressed form of `data`.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Runs the compressor as a child process with piped standard streams.
#[derive(Clone, Debug)]
pub struct DzipPipe {
    program: OsString
}

/// Runs the compressor on a file in a temporary directory.
#[derive(Clone, Debug)]
pub struct DzipTempFile {
    program: OsString
}

impl Default for DzipPipe {
    fn default() -> Self {
        DzipPipe { program: "dzip".into() }
    }
}

impl Default for DzipTempFile {
    fn default() -> Self {
        DzipTempFile { program: "dzip".into() }
    }
}

impl DzipPipe {
    /// Returns a gateway invoking the given compressor program.
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        DzipPipe { program: program.into() }
    }
}

impl DzipTempFile {
    /// Returns a gateway invoking the given compressor program.
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        DzipTempFile { program: program.into() }
    }
}

fn exit_error(program: &OsString) -> Error {
    Error::new(ErrorKind::Other,
        format!("{} exited with a failure", program.to_string_lossy()))
}

impl Compress for DzipPipe {
    /// Pipes `data` through `dzip -c`.
    ///
    /// All of the input is written and the parent's write end closed
    /// before the output is read back.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
                                .arg("-c")
                                .stdin(Stdio::piped())
                                .stdout(Stdio::piped())
                                .spawn()?;
        let mut stdin = child.stdin.take().ok_or_else(||
            Error::new(ErrorKind::BrokenPipe, "compressor stdin not captured"))?;
        stdin.write_all(data)?;
        drop(stdin);
        let mut out = Vec::new();
        let mut stdout = child.stdout.take().ok_or_else(||
            Error::new(ErrorKind::BrokenPipe, "compressor stdout not captured"))?;
        stdout.read_to_end(&mut out)?;
        if !child.wait()?.success() {
            return Err(exit_error(&self.program));
        }
        Ok(out)
    }
}

impl Compress for DzipTempFile {
    /// Writes `data` to a temporary file, runs `dzip -k FILE` and reads
    /// back `FILE.dz`. The temporary directory is released on every exit
    /// path.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("segment");
        fs::write(&path, data)?;
        let status = Command::new(&self.program)
                             .arg("-k")
                             .arg(&path)
                             .status()?;
        if !status.success() {
            return Err(exit_error(&self.program));
        }
        fs::read(dir.path().join("segment.dz"))
    }
}

/// Replaces a segment's content with its compressed form.
///
/// On success `dzip` is set, `osize` records the original size and the
/// content is swapped for the transform's output. An empty output is a
/// fatal error. A segment already compressed is left alone.
pub fn compress_segment<C: Compress + ?Sized>(gw: &C, seg: &mut Segment) -> Result<()> {
    if seg.dzip {
        return Ok(());
    }
    let packed = gw.compress(&seg.data)?;
    if packed.is_empty() {
        return Err(Error::new(ErrorKind::InvalidData, "compressor produced no output"));
    }
    seg.osize = Some(seg.size());
    seg.data = packed;
    seg.dzip = true;
    Ok(())
}
