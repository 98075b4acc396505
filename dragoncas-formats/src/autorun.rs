/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
/*! The autorun loader composer.

Machines of the Dragon and CoCo family offer no autostart for machine
code tapes: after `CLOADM` the user still has to type `EXEC`. The autorun
trick removes that step by abusing two facts:

* the ROM copies a filename block into the cassette buffer at `$01DA`
  without limiting its length, so an oversized filename block smuggles a
  whole loader program into memory, and
* the interpreter's character fetch routine lives in RAM, so a tiny block
  loaded over it hijacks BASIC the moment the ROM loader returns.

[compose] assembles both parts with one shared label namespace. The
loader concatenates the remaining tape parts with the ROM's own cassette
routines, optionally reprograms the VDG and SAM video hardware between
parts, unpacks compressed parts in place and finally jumps to the loaded
program's exec address. [write_autorun] emits the composed blocks and the
per-part data to a [BlockSink].

The filename block prefix doubles as data for the ROM *and* for the
hijack: the ASCII `':'` parked in its exec address slot is what BASIC
finds as its "next statement" once the interpreter resumes.
*/
use log::warn;
use std::io::{Error, ErrorKind, Result};

use crate::block::{
    BlockSink, FileType, DEFAULT_LEADER_LEN, ENCODING_BINARY, EOF_BLOCK, GAP_NONE,
    MAX_PAYLOAD_LEN, NAMEFILE_BLOCK
};
use crate::image::ProgramImage;
use crate::mc6809::{Assembler, Token::*};
use crate::tape::write_program_data;

/// The cassette buffer: the ROM copies a filename block here, so this is
/// where the loader code comes to life.
pub const LOADER_ORG: u16 = 0x01DA;
/// The RAM resident character fetch routine's operand address: the hijack
/// stub is loaded over it.
pub const STUB_ORG: u16 = 0x00A6;
/// The pulse width constant the loader feeds the ROM for fast timing.
pub const FAST_PW: u16 = 0x0C06;
/// The default cursor flash address: the text screen at `$0400`.
pub const FLASH_ADDR: u16 = 0x0400;

/// One step of an autorun tape composition.
#[derive(Clone, Debug)]
pub enum Step {
    /// Load one program part.
    File(ProgramImage),
    /// Reprogram the VDG display mode bits at `$FF22`.
    SetVdg(u8),
    /// Reprogram the SAM display mode bits `V0..V2`.
    SetSamV(u8),
    /// Reprogram the SAM display offset bits `F0..F6`.
    SetSamF(u8),
    /// Move the hardware stack out of the way of a loaded part.
    Lds(u16)
}

/// The two code blobs produced by [compose].
#[derive(Clone, Debug)]
pub struct AutorunImage {
    /// The main loader, framed as one oversized filename block.
    pub loader: Vec<u8>,
    /// The BASIC hijack stub, framed as one EOF block.
    pub stub: Vec<u8>
}

/// Tracks the last known video hardware state so only changed bits cost
/// loader bytes. `None` means unknown: the first directive programs
/// every bit it covers.
#[derive(Debug, Default)]
struct VideoState {
    vdg: Option<u8>,
    sam_v: Option<u8>,
    sam_f: Option<u8>
}

fn sam_pokes(asm: &mut Assembler, base: u16, nbits: u32, value: u8, last: Option<u8>) {
    for bit in 0..nbits {
        let set = value >> bit & 1;
        if last.map(|v| v >> bit & 1) != Some(set) {
            let addr = base + bit as u16 * 2 + set as u16;
            asm.emit(&[Byte(0xB7),                       // sta >addr
                       Byte((addr >> 8) as u8), Byte(addr as u8)]);
        }
    }
}

/// Assembles and links the autorun loader and the hijack stub for the
/// given steps. `name` is the name the filename block announces.
pub fn compose(steps: &[Step], name: &str) -> Result<AutorunImage> {
    let any_fast = steps.iter().any(|step|
        matches!(step, Step::File(image) if image.fast));
    let any_dzip = steps.iter().any(|step|
        matches!(step, Step::File(image) if image.segment().dzip));
    let any_flash = steps.iter().any(|step|
        matches!(step, Step::File(image) if image.flasher));

    let mut asm = Assembler::new(LOADER_ORG);
    asm.define("fast_pw", FAST_PW);
    asm.define("flash_addr", FLASH_ADDR);

    // The filename block prefix. The ROM consumes these 15 bytes as the
    // block header; the colon and the stub load address do double duty.
    let mut padded = [b' '; 8];
    let bytes = name.as_bytes();
    let len = bytes.len().min(8);
    padded[..len].copy_from_slice(&bytes[..len]);
    for b in padded.iter() {
        asm.emit(&[Byte(*b)]);
    }
    asm.emit(&[Byte(FileType::Binary.into()), Byte(ENCODING_BINARY), Byte(GAP_NONE),
               Label("colon"), Byte(b':'), Byte(0x00),
               Byte((STUB_ORG >> 8) as u8), Byte(STUB_ORG as u8)]);
    asm.emit(&[Label("exec_loader")]);

    if any_fast {
        // which machine is this? bit 5 of the ROM byte at $A000 differs
        asm.emit(&[Byte(0xB6), Byte(0xA0), Byte(0x00),   // lda >$A000
                   Byte(0x84), Byte(0x20),               // anda #$20
                   Byte(0x97), Byte(0x10)]);             // sta <$10
        // feed the ROM loader the fast pulse width thresholds
        asm.emit(&[Byte(0xCC), Abs16("fast_pw"),         // ldd #fast_pw
                   Byte(0x0D), Byte(0x10),               // tst <$10
                   Byte(0x26), Rel8("l_pw_coco"),        // bne l_pw_coco
                   Byte(0x97), Byte(0x90),               // sta <$90
                   Byte(0xD7), Byte(0x8F),               // stb <$8F
                   Byte(0x20), Rel8("l_pw_done"),        // bra l_pw_done
                   Label("l_pw_coco"),
                   Byte(0x97), Byte(0x92),               // sta <$92
                   Byte(0xD7), Byte(0x94),               // stb <$94
                   Label("l_pw_done")]);
    }

    let mut video = VideoState::default();
    let mut flasher_on = false;
    let mut last_exec = None;
    for step in steps {
        match *step {
            Step::SetVdg(value) => {
                let value = value & 0xF8;
                if video.vdg != Some(value) {
                    asm.emit(&[Byte(0x86), Byte(value),              // lda #value
                               Byte(0xB7), Byte(0xFF), Byte(0x22)]); // sta >$FF22
                    video.vdg = Some(value);
                }
            }
            Step::SetSamV(value) => {
                let value = value & 0x07;
                sam_pokes(&mut asm, 0xFFC0, 3, value, video.sam_v);
                video.sam_v = Some(value);
            }
            Step::SetSamF(value) => {
                let value = value & 0x7F;
                sam_pokes(&mut asm, 0xFFC6, 7, value, video.sam_f);
                video.sam_f = Some(value);
                asm.define("flash_addr", (value as u16) << 9);
            }
            Step::Lds(value) => {
                asm.emit(&[Byte(0x10), Byte(0xCE),                   // lds #value
                           Byte((value >> 8) as u8), Byte(value as u8)]);
            }
            Step::File(ref image) => {
                let seg = image.segment();
                let size = seg.size() as u16;
                let load;
                let mut dzip_regs = None;
                if seg.dzip {
                    let osize = seg.osize.unwrap_or(0) as u16;
                    let oload = image.load.unwrap_or(seg.start);
                    load = image.zload.unwrap_or_else(||
                        oload.wrapping_add(osize).wrapping_add(1).wrapping_sub(size));
                    dzip_regs = Some((load.wrapping_add(size), oload));
                }
                else {
                    load = image.effective_load();
                }
                if image.flasher != flasher_on {
                    let opcode = if image.flasher { 0xB7 } else { 0x8C };
                    asm.emit(&[Byte(0x86), Byte(opcode),             // lda #opcode
                               Byte(0xB7), Abs16("mod_flash")]);     // sta >mod_flash
                    flasher_on = image.flasher;
                }
                asm.emit(&[Byte(0x8E), Byte((load >> 8) as u8), Byte(load as u8),
                           Byte(0x8D), Rel8("load_part")]);          // ldx #load; bsr load_part
                if let Some((end, oload)) = dzip_regs {
                    asm.emit(&[Byte(0x8E), Byte((load >> 8) as u8), Byte(load as u8),
                               Byte(0xCC), Byte((end >> 8) as u8), Byte(end as u8),
                               Byte(0xCE), Byte((oload >> 8) as u8), Byte(oload as u8),
                               Byte(0x8D), Rel8("dunzip")]);
                }
                last_exec = image.exec;
            }
        }
    }

    asm.emit(&[Byte(0x7E), Abs16("exec")]);              // jmp >exec
    asm.define("exec", last_exec.unwrap_or_else(|| {
        warn!("no exec address for the autorun loader, using 0");
        0
    }));

    emit_load_part(&mut asm, any_flash);
    if any_dzip {
        emit_dunzip(&mut asm);
    }
    let loader = asm.link()?.to_vec();
    if loader.len() > MAX_PAYLOAD_LEN {
        return Err(Error::new(ErrorKind::InvalidData,
            format!("autorun loader too large: {} bytes", loader.len())));
    }

    // the hijack: point the interpreter at the colon and take over the
    // code path right after the character fetch
    asm.org(STUB_ORG);
    asm.emit(&[Abs16("colon"),
               Byte(0x7E), Abs16("exec_loader")]);       // jmp >exec_loader
    let stub = asm.link()?.to_vec();

    Ok(AutorunImage { loader, stub })
}

/// The loader core: reads one file's blocks with the ROM's cassette
/// routines until its EOF block, then silences the motor.
fn emit_load_part(asm: &mut Assembler, flash: bool) {
    asm.emit(&[Label("load_part"),
               Byte(0xAD), Byte(0x9F), Byte(0xA0), Byte(0x04),   // jsr [CSRDON]
               Label("l_blk"),
               Byte(0x9F), Byte(0x7E),                           // stx <$7E
               Byte(0xAD), Byte(0x9F), Byte(0xA0), Byte(0x06),   // jsr [BLKIN]
               Byte(0x26), Rel8("l_err")]);                      // bne l_err
    if flash {
        asm.emit(&[Byte(0xB6), Abs16("flash_addr"),              // lda >flash_addr
                   Byte(0x43),                                   // coma
                   Label("mod_flash"),
                   Byte(0x8C),                   // sta >flash_addr, gated: the
                   Abs16("flash_addr")]);        // opcode byte toggles B7/8C
    }
    asm.emit(&[Byte(0x96), Byte(0x7C),                           // lda <$7C
               Byte(0x4C),                                       // inca
               Byte(0x26), Rel8("l_blk"),                        // bne l_blk
               Byte(0xB6), Byte(0xFF), Byte(0x21),               // lda >$FF21
               Byte(0x84), Byte(0xF7),                           // anda #$F7
               Byte(0xB7), Byte(0xFF), Byte(0x21),               // sta >$FF21
               Byte(0x39),                                       // rts
               Label("l_err"),
               Byte(0x8E), Abs16("l_emsg"),                      // ldx #l_emsg
               Label("l_err0"),
               Byte(0xA6), Byte(0x80),                           // lda ,x+
               Byte(0x27), Rel8("l_halt"),                       // beq l_halt
               Byte(0xAD), Byte(0x9F), Byte(0xA0), Byte(0x02),   // jsr [OUTCH]
               Byte(0x20), Rel8("l_err0"),                       // bra l_err0
               Label("l_halt"),
               Byte(0x20), Rel8("l_halt"),                       // bra l_halt
               Label("l_emsg")]);
    for b in b"I/O ERROR".iter() {
        asm.emit(&[Byte(*b)]);
    }
    asm.emit(&[Byte(0x00)]);
}

/// The in place unpacker. On entry X points at the packed stream, D one
/// past its end and U at the unpack target. Each iteration reads a pair
/// of bytes `a,b` and dispatches: `b` positive is a literal run of `a:b`
/// bytes, otherwise `a` positive is a back-reference with 7 bit length
/// and offset, otherwise the offset takes both 7 bit fields and the
/// length follows in the next byte.
fn emit_dunzip(asm: &mut Assembler) {
    asm.emit(&[Label("dunzip"),
               Byte(0x34), Byte(0x06),                           // pshs b,a
               Label("dz_loop"),
               Byte(0xAC), Byte(0xE4),                           // cmpx ,s
               Byte(0x24), Rel8("dz_done"),                      // bhs dz_done
               Byte(0xEC), Byte(0x81),                           // ldd ,x++
               Byte(0x5D),                                       // tstb
               Byte(0x2A), Rel8("dz_lit"),                       // bpl dz_lit
               Byte(0x4D),                                       // tsta
               Byte(0x2B), Rel8("dz_long"),                      // bmi dz_long
               // 7+7: length in a, offset in b
               Byte(0xC4), Byte(0x7F),                           // andb #$7F
               Byte(0x34), Byte(0x12),                           // pshs x,a
               Byte(0x4F),                                       // clra
               Byte(0x34), Byte(0x06),                           // pshs b,a
               Byte(0x1F), Byte(0x30),                           // tfr u,d
               Byte(0xA3), Byte(0xE1),                           // subd ,s++
               Byte(0x1F), Byte(0x01),                           // tfr d,x
               Byte(0x35), Byte(0x02),                           // puls a
               Label("dz_copyb"),
               Byte(0xE6), Byte(0x80),                           // ldb ,x+
               Byte(0xE7), Byte(0xC0),                           // stb ,u+
               Byte(0x4A),                                       // deca
               Byte(0x26), Rel8("dz_copyb"),                     // bne dz_copyb
               Byte(0x35), Byte(0x10),                           // puls x
               Byte(0x20), Rel8("dz_loop"),                      // bra dz_loop
               Label("dz_long"),
               // 14+8: both fields make the offset, length follows
               Byte(0x84), Byte(0x7F),                           // anda #$7F
               Byte(0xC4), Byte(0x7F),                           // andb #$7F
               Byte(0x34), Byte(0x06),                           // pshs b,a
               Byte(0xA6), Byte(0x80),                           // lda ,x+
               Byte(0x34), Byte(0x12),                           // pshs x,a
               Byte(0x1F), Byte(0x30),                           // tfr u,d
               Byte(0xA3), Byte(0x63),                           // subd 3,s
               Byte(0x1F), Byte(0x01),                           // tfr d,x
               Byte(0x35), Byte(0x02),                           // puls a
               Label("dz_copyl"),
               Byte(0xE6), Byte(0x80),                           // ldb ,x+
               Byte(0xE7), Byte(0xC0),                           // stb ,u+
               Byte(0x4A),                                       // deca
               Byte(0x26), Rel8("dz_copyl"),                     // bne dz_copyl
               Byte(0x35), Byte(0x10),                           // puls x
               Byte(0x32), Byte(0x62),                           // leas 2,s
               Byte(0x20), Rel8("dz_loop"),                      // bra dz_loop
               Label("dz_lit"),
               Byte(0x1F), Byte(0x02),                           // tfr d,y
               Label("dz_copyn"),
               Byte(0xA6), Byte(0x80),                           // lda ,x+
               Byte(0xA7), Byte(0xC0),                           // sta ,u+
               Byte(0x31), Byte(0x3F),                           // leay -1,y
               Byte(0x26), Rel8("dz_copyn"),                     // bne dz_copyn
               Byte(0x20), Rel8("dz_loop"),                      // bra dz_loop
               Label("dz_done"),
               Byte(0x32), Byte(0x62),                           // leas 2,s
               Byte(0x39)]);                                     // rts
}

/// Emits a complete autorun tape: the loader filename block, the hijack
/// stub and every file step's data blocks.
pub fn write_autorun<S: BlockSink + ?Sized>(sink: &mut S, steps: &[Step], name: &str) -> Result<()> {
    let AutorunImage { loader, stub } = compose(steps, name)?;
    sink.set_fast(false)?;
    sink.write_leader(DEFAULT_LEADER_LEN)?;
    sink.block_out(NAMEFILE_BLOCK, &loader)?;
    sink.block_out(EOF_BLOCK, &stub)?;
    for step in steps {
        if let Step::File(image) = step {
            sink.set_fast(image.fast)?;
            sink.write_leader(image.leader)?;
            write_program_data(sink, image)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Segment;

    fn file_step(load: u16, exec: u16, data: Vec<u8>) -> ProgramImage {
        let mut image = ProgramImage {
            load: Some(load),
            exec: Some(exec),
            ..Default::default()
        };
        image.segments.push(Segment::new(load, data));
        image.coalesce().unwrap();
        image.fnblock = false;
        image
    }

    fn subseq_at(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn header_prefix_is_bit_exact() {
        let steps = [Step::File(file_step(0x0E00, 0x0E00, vec![0x12]))];
        let AutorunImage { loader, stub } = compose(&steps, "GAME").unwrap();
        assert_eq!(b"GAME    ", &loader[..8]);
        assert_eq!(&[0x02, 0x00, 0x00], &loader[8..11]);
        // the colon in the exec slot, then the stub load address
        assert_eq!(&[0x3A, 0x00, 0x00, 0xA6], &loader[11..15]);
        // the stub: charad patch pointing at the colon, jmp exec_loader
        assert_eq!(&[0x01, 0xE5, 0x7E, 0x01, 0xE9], &stub[..]);
    }

    #[test]
    fn plain_file_step_loads_and_jumps() {
        let steps = [Step::File(file_step(0x0E00, 0x4000, vec![0x12, 0x34]))];
        let AutorunImage { loader, .. } = compose(&steps, "X").unwrap();
        // ldx #$0E00; bsr load_part
        let pos = subseq_at(&loader, &[0x8E, 0x0E, 0x00, 0x8D]).expect("no load call");
        assert_eq!(15, pos);
        // jmp >$4000
        assert!(subseq_at(&loader, &[0x7E, 0x40, 0x00]).is_some());
        // no unpacker without compressed parts
        assert!(subseq_at(&loader, &[0xAC, 0xE4]).is_none());
        // the ROM cassette vectors are all called
        assert!(subseq_at(&loader, &[0xAD, 0x9F, 0xA0, 0x04]).is_some());
        assert!(subseq_at(&loader, &[0xAD, 0x9F, 0xA0, 0x06]).is_some());
        assert!(subseq_at(&loader, &[0xAD, 0x9F, 0xA0, 0x02]).is_some());
        assert!(subseq_at(&loader, b"I/O ERROR").is_some());
    }

    #[test]
    fn video_pokes_and_flash_addr() {
        let steps = [
            Step::SetVdg(0x08),
            Step::SetSamV(4),
            Step::SetSamF(7),
            Step::File(file_step(0x0E00, 0x0E00, vec![0x12]))
        ];
        let AutorunImage { loader, .. } = compose(&steps, "X").unwrap();
        // lda #$08; sta >$FF22
        assert!(subseq_at(&loader, &[0x86, 0x08, 0xB7, 0xFF, 0x22]).is_some());
        // sam-v 4: clear V0 at FFC0, clear V1 at FFC2, set V2 at FFC5
        assert!(subseq_at(&loader,
            &[0xB7, 0xFF, 0xC0, 0xB7, 0xFF, 0xC2, 0xB7, 0xFF, 0xC5]).is_some());
        // sam-f 7: set F0..F2, clear F3..F6
        assert!(subseq_at(&loader,
            &[0xB7, 0xFF, 0xC7, 0xB7, 0xFF, 0xC9, 0xB7, 0xFF, 0xCB,
              0xB7, 0xFF, 0xCC, 0xB7, 0xFF, 0xCE, 0xB7, 0xFF, 0xD0,
              0xB7, 0xFF, 0xD2]).is_some());
    }

    #[test]
    fn repeated_directives_emit_once() {
        let repeated = [
            Step::SetVdg(0x08), Step::SetVdg(0x08),
            Step::SetSamV(4), Step::SetSamV(4),
            Step::File(file_step(0x0E00, 0x0E00, vec![0x12]))
        ];
        let AutorunImage { loader, .. } = compose(&repeated, "X").unwrap();
        assert_eq!(1, loader.windows(5)
                         .filter(|w| *w == [0x86, 0x08, 0xB7, 0xFF, 0x22]).count());
        let sam_pokes = loader.windows(3)
            .filter(|w| w[0] == 0xB7 && w[1] == 0xFF && (0xC0..0xC6).contains(&w[2]))
            .count();
        assert_eq!(3, sam_pokes);
    }

    #[test]
    fn fast_setup_with_probe() {
        let mut image = file_step(0x0E00, 0x0E00, vec![0x12]);
        image.fast = true;
        let AutorunImage { loader, .. } = compose(&[Step::File(image)], "X").unwrap();
        // lda >$A000; anda #$20; sta <$10
        let probe = subseq_at(&loader, &[0xB6, 0xA0, 0x00, 0x84, 0x20, 0x97, 0x10])
                             .expect("no arch probe");
        assert_eq!(15, probe);
        // ldd #$0C06 and both per-machine pulse width stores
        assert!(subseq_at(&loader, &[0xCC, 0x0C, 0x06]).is_some());
        assert!(subseq_at(&loader, &[0x97, 0x90, 0xD7, 0x8F]).is_some());
        assert!(subseq_at(&loader, &[0x97, 0x92, 0xD7, 0x94]).is_some());
    }

    #[test]
    fn dzip_step_gets_unpack_call() {
        let mut image = file_step(0x0E00, 0x0E00, Vec::new());
        {
            let seg = image.segment_mut();
            seg.data = vec![0u8; 0x20];     // 32 packed bytes
            seg.dzip = true;
            seg.osize = Some(0x100);        // from 256 original bytes
        }
        let AutorunImage { loader, .. } = compose(&[Step::File(image)], "X").unwrap();
        // load = 0x0E00 + 0x100 + 1 - 0x20 = 0x0EE1
        let load = 0x0EE1u16;
        assert!(subseq_at(&loader, &[0x8E, 0x0E, 0xE1, 0x8D]).is_some());
        // ldx #load; ldd #load+size; ldu #oload; bsr dunzip
        assert!(subseq_at(&loader,
            &[0x8E, (load >> 8) as u8, load as u8,
              0xCC, 0x0F, 0x01,
              0xCE, 0x0E, 0x00,
              0x8D]).is_some());
        // the unpacker is present
        assert!(subseq_at(&loader, &[0xEC, 0x81, 0x5D]).is_some());
    }

    #[test]
    fn zload_overrides_packed_load() {
        let mut image = file_step(0x0E00, 0x0E00, Vec::new());
        image.zload = Some(0x7000);
        {
            let seg = image.segment_mut();
            seg.data = vec![0u8; 0x20];
            seg.dzip = true;
            seg.osize = Some(0x100);
        }
        let AutorunImage { loader, .. } = compose(&[Step::File(image)], "X").unwrap();
        assert!(subseq_at(&loader, &[0x8E, 0x70, 0x00, 0x8D]).is_some());
    }

    #[test]
    fn flasher_transitions_patch_the_gate() {
        let mut on = file_step(0x0E00, 0x0E00, vec![0x12]);
        on.flasher = true;
        let off = file_step(0x4000, 0x4000, vec![0x34]);
        let steps = [Step::File(on), Step::File(off)];
        let AutorunImage { loader, .. } = compose(&steps, "X").unwrap();
        // lda #$B7 / lda #$8C ahead of the respective load calls
        let turn_on = subseq_at(&loader, &[0x86, 0xB7, 0xB7]).expect("no on patch");
        let turn_off = subseq_at(&loader, &[0x86, 0x8C, 0xB7]).expect("no off patch");
        assert!(turn_on < turn_off);
        // the gated store reads, complements and conditionally writes back
        assert!(subseq_at(&loader, &[0xB6, 0x04, 0x00, 0x43, 0x8C, 0x04, 0x00]).is_some());
    }

    #[test]
    fn flash_addr_follows_sam_f() {
        let mut image = file_step(0x0E00, 0x0E00, vec![0x12]);
        image.flasher = true;
        let steps = [Step::SetSamF(7), Step::File(image)];
        let AutorunImage { loader, .. } = compose(&steps, "X").unwrap();
        // flash address becomes 7 * 512 = $0E00
        assert!(subseq_at(&loader, &[0xB6, 0x0E, 0x00, 0x43]).is_some());
    }

    #[test]
    fn loader_size_is_limited() {
        let steps: Vec<_> = (0..40)
            .map(|n| Step::File(file_step(0x1000 + n, 0x1000, vec![0x12])))
            .collect();
        assert!(compose(&steps, "X").is_err());
    }
}
