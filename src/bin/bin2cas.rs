/*
    Copyright (C) 2021-2023  Rafal Michalski

    This file is part of DRAGONCAS, a Rust tool set for authoring Dragon
    and Tandy Color Computer cassette tapes.

    For the full copyright notice, see the lib.rs file.
*/
//! `bin2cas`: build Dragon and CoCo cassette tapes from binary programs.
//!
//! The command line is order sensitive: options given before an input
//! file apply to that file, and most of them stay in effect for the
//! files that follow.
use log::warn;
use std::env;
use std::fs;
use std::io::{self, BufReader, BufWriter, Error, ErrorKind, Write};
use std::path::Path;
use std::process;

use dragoncas::audio::{
    timing::{consts::ROM, TimingSpec},
    wav::{WavWriter, DEFAULT_SAMPLE_RATE}
};
use dragoncas::formats::{
    autorun::{write_autorun, Step},
    block::{BlockSink, DEFAULT_LEADER_LEN},
    cas::CasWriter,
    dzip::{compress_segment, DzipPipe},
    image::{decb, dragondos, name_from_path, raw, ProgramImage},
    tape::write_program
};

const USAGE: &str = "\
Usage: bin2cas -o FILE [options] file [[options] file ...]

Global options:
  -o, --output FILE     the CAS or WAV file to write (required)
      --cas             write a byte exact CAS file
      --wav             write a WAV audio file
  -r, --wav-rate HZ     WAV sample rate (default: 9600)
  -t, --timing NAME     pulse timing: rom or simple (default: rom)
      --help            print this text and exit
      --version         print the version and exit
The output format is inferred from the FILE extension unless --cas or
--wav is given.

Per-file options (apply to the input files that follow):
  -B, -D, -C            input is raw, DragonDOS or CoCo DECB binary
  -i FILE               input file (also accepts names starting with '-')
  -n NAME               program name (up to 8 characters)
  -l ADDR               load address
  -e ADDR               exec address
      --zload ADDR      load address for compressed content
      --leader N        leader length in filler bytes (default: 256)
      --[no-]filename   write a filename block (default: on)
  -z, --[no-]dzip       compress through the external dzip program
      --[no-]fast       fast pulse timing (WAV output only)
      --[no-]eof        terminate with an EOF block (default: on)
      --[no-]eof-data   carry the final data chunk in the EOF block
      --[no-]flasher    flash the cursor while loading (autorun)
Load and zload addresses reset after every file; name and exec reset too
unless --autorun is in effect.

Autorun:
      --[no-]autorun    compose a self starting loader for all files
      --vdg V           poke the VDG display mode between parts
      --sam-v V         poke the SAM display mode bits between parts
      --sam-f V         poke the SAM display offset between parts
      --lds V           move the loader's hardware stack

Numbers accept decimal or 0x prefixed hexadecimal.
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Cas,
    Wav
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum InputMode {
    Raw,
    DragonDos,
    Decb
}

/// The sticky per-file options, snapshot into each consumed file.
#[derive(Clone, Debug)]
struct PendingOpts {
    mode: InputMode,
    leader: u16,
    fnblock: bool,
    name: Option<String>,
    load: Option<u16>,
    exec: Option<u16>,
    zload: Option<u16>,
    dzip: bool,
    fast: bool,
    eof: bool,
    eof_data: bool,
    flasher: bool
}

impl Default for PendingOpts {
    fn default() -> Self {
        PendingOpts {
            mode: InputMode::Raw,
            leader: DEFAULT_LEADER_LEN,
            fnblock: true,
            name: None,
            load: None,
            exec: None,
            zload: None,
            dzip: false,
            fast: false,
            eof: true,
            eof_data: false,
            flasher: false
        }
    }
}

#[derive(Debug)]
struct Job {
    output: Option<String>,
    format: Option<OutputFormat>,
    rate: u32,
    timing: &'static TimingSpec,
    autorun: bool,
    steps: Vec<Step>,
    pending: PendingOpts
}

impl Default for Job {
    fn default() -> Self {
        Job {
            output: None,
            format: None,
            rate: DEFAULT_SAMPLE_RATE,
            timing: &ROM,
            autorun: false,
            steps: Vec::new(),
            pending: PendingOpts::default()
        }
    }
}

fn usage_error<S: Into<String>>(msg: S) -> Error {
    Error::new(ErrorKind::InvalidInput, msg.into())
}

/// Parses a decimal or `0x` prefixed hexadecimal number.
fn parse_num(text: &str) -> io::Result<u32> {
    let res = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    }
    else {
        text.parse()
    };
    res.map_err(|_| usage_error(format!("not a number: {}", text)))
}

fn parse_u16(text: &str) -> io::Result<u16> {
    let num = parse_num(text)?;
    if num > 0xFFFF {
        return Err(usage_error(format!("number out of range: {}", text)));
    }
    Ok(num as u16)
}

fn parse_u8(text: &str) -> io::Result<u8> {
    let num = parse_num(text)?;
    if num > 0xFF {
        return Err(usage_error(format!("number out of range: {}", text)));
    }
    Ok(num as u8)
}

impl Job {
    /// Decodes one input file with the pending options and appends it as
    /// a file step.
    fn consume_file(&mut self, path: &str) -> io::Result<()> {
        let file = fs::File::open(path).map_err(|e|
            Error::new(e.kind(), format!("{}: {}", path, e)))?;
        let mut rd = BufReader::new(file);
        let pending = &self.pending;
        let mut image = ProgramImage {
            name: pending.name.clone(),
            load: pending.load,
            exec: pending.exec,
            zload: pending.zload,
            fnblock: pending.fnblock,
            eof: pending.eof,
            eof_data: pending.eof_data,
            fast: pending.fast,
            flasher: pending.flasher,
            leader: pending.leader,
            ..Default::default()
        };
        match pending.mode {
            InputMode::Raw => raw::load(&mut rd, &mut image)?,
            InputMode::DragonDos => dragondos::load(&mut rd, &mut image)?,
            InputMode::Decb => decb::load(&mut rd, &mut image)?
        }
        if image.name.is_none() {
            image.name = Some(name_from_path(path));
        }
        image.coalesce()?;
        if pending.dzip {
            compress_segment(&DzipPipe::default(), image.segment_mut())?;
        }
        self.steps.push(Step::File(image));
        self.pending.load = None;
        self.pending.zload = None;
        if !self.autorun {
            self.pending.name = None;
            self.pending.exec = None;
        }
        Ok(())
    }

    fn output_format(&self, output: &str) -> io::Result<OutputFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        match Path::new(output).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("cas") => Ok(OutputFormat::Cas),
            Some(ext) if ext.eq_ignore_ascii_case("wav") => Ok(OutputFormat::Wav),
            _ => Err(usage_error(
                format!("can't infer the output format from: {}", output)))
        }
    }

    /// Validates the collected job and writes the output file.
    fn finish(self) -> io::Result<()> {
        let output = match self.output {
            Some(ref output) => output.clone(),
            None => return Err(usage_error("no output file given, use -o FILE"))
        };
        let format = self.output_format(&output)?;
        let any_fast = self.steps.iter().any(|step|
            matches!(step, Step::File(image) if image.fast));
        if any_fast && format == OutputFormat::Cas {
            return Err(usage_error("fast timing requires WAV output"));
        }
        let file = fs::File::create(&output).map_err(|e|
            Error::new(e.kind(), format!("{}: {}", output, e)))?;
        match format {
            OutputFormat::Cas => {
                let mut cas = CasWriter::new(BufWriter::new(file));
                self.emit(&mut cas)?;
                cas.get_mut().flush()
            }
            OutputFormat::Wav => {
                let mut wav = WavWriter::new(BufWriter::new(file), self.rate, self.timing)?;
                self.emit(&mut wav)?;
                wav.close().map(|_| ())
            }
        }
    }

    fn emit<S: BlockSink + ?Sized>(&self, sink: &mut S) -> io::Result<()> {
        if self.autorun {
            let name = self.steps.iter()
                .find_map(|step| match step {
                    Step::File(image) => image.name.clone(),
                    _ => None
                })
                .unwrap_or_default();
            write_autorun(sink, &self.steps, &name)?;
        }
        else {
            for step in self.steps.iter() {
                match step {
                    Step::File(image) => write_program(sink, image)?,
                    _ => warn!("video and stack directives have no effect without --autorun")
                }
            }
        }
        sink.finalize()
    }
}

fn run<I: Iterator<Item=String>>(mut args: I) -> io::Result<Option<Job>> {
    let mut job = Job::default();
    while let Some(arg) = args.next() {
        let mut value = || args.next().ok_or_else(||
            usage_error(format!("missing argument to {}", arg)));
        match arg.as_str() {
            "--help" => {
                print!("{}", USAGE);
                return Ok(None);
            }
            "--version" => {
                println!("bin2cas (dragoncas) {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "-o"|"--output" => job.output = Some(value()?),
            "--cas" => job.format = Some(OutputFormat::Cas),
            "--wav" => job.format = Some(OutputFormat::Wav),
            "-r"|"--wav-rate" => {
                let rate = parse_num(&value()?)?;
                if rate == 0 {
                    return Err(usage_error("the sample rate must not be zero"));
                }
                job.rate = rate;
            }
            "-t"|"--timing" => {
                let name = value()?;
                job.timing = TimingSpec::by_name(&name).ok_or_else(||
                    usage_error(format!("unknown timing: {}", name)))?;
            }
            "-B" => job.pending.mode = InputMode::Raw,
            "-D" => job.pending.mode = InputMode::DragonDos,
            "-C" => job.pending.mode = InputMode::Decb,
            "--leader" => job.pending.leader = parse_u16(&value()?)?,
            "--filename" => job.pending.fnblock = true,
            "--no-filename" => job.pending.fnblock = false,
            "-n" => job.pending.name = Some(value()?.to_ascii_uppercase()),
            "-l" => job.pending.load = Some(parse_u16(&value()?)?),
            "-e" => job.pending.exec = Some(parse_u16(&value()?)?),
            "--zload" => job.pending.zload = Some(parse_u16(&value()?)?),
            "-z"|"--dzip" => job.pending.dzip = true,
            "--no-dzip" => job.pending.dzip = false,
            "--fast" => job.pending.fast = true,
            "--no-fast" => job.pending.fast = false,
            "--eof" => job.pending.eof = true,
            "--no-eof" => job.pending.eof = false,
            "--eof-data" => job.pending.eof_data = true,
            "--no-eof-data" => job.pending.eof_data = false,
            "--flasher" => job.pending.flasher = true,
            "--no-flasher" => job.pending.flasher = false,
            "--autorun" => job.autorun = true,
            "--no-autorun" => job.autorun = false,
            "--vdg" => {
                let v = parse_u8(&value()?)?;
                job.steps.push(Step::SetVdg(v));
            }
            "--sam-v" => {
                let v = parse_u8(&value()?)?;
                job.steps.push(Step::SetSamV(v));
            }
            "--sam-f" => {
                let v = parse_u8(&value()?)?;
                job.steps.push(Step::SetSamF(v));
            }
            "--lds" => {
                let v = parse_u16(&value()?)?;
                job.steps.push(Step::Lds(v));
            }
            "-i" => {
                let path = value()?;
                job.consume_file(&path)?;
            }
            opt if opt.len() > 1 && opt.starts_with('-') => {
                return Err(usage_error(format!("unknown option: {}", opt)));
            }
            _ => job.consume_file(&arg)?
        }
    }
    Ok(Some(job))
}

fn main() {
    simple_logger::init_with_level(log::Level::Warn).unwrap();
    match run(env::args().skip(1)).and_then(|job| match job {
        Some(job) => job.finish(),
        None => Ok(())
    }) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("bin2cas: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dragoncas::formats::block::FileType;

    fn args(list: &[&str]) -> impl Iterator<Item=String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    fn scratch_file(name: &str, content: &[u8]) -> String {
        let dir = env::temp_dir().join("bin2cas-tests");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn parse_num_accepts_hex_and_decimal() {
        assert_eq!(0x1000, parse_num("0x1000").unwrap());
        assert_eq!(4096, parse_num("4096").unwrap());
        assert_eq!(0x0E00, parse_u16("0x0E00").unwrap());
        assert!(parse_num("nope").is_err());
        assert!(parse_u16("0x10000").is_err());
        assert!(parse_u8("256").is_err());
    }

    #[test]
    fn options_stick_and_reset() {
        let hello = scratch_file("hello.bin", &[0x48, 0x49]);
        let world = scratch_file("world.bin", &[0x4A]);
        let job = run(args(&[
            "-o", "out.cas", "-B", "--leader", "8",
            "-n", "HI", "-l", "0x1000", "-e", "0x1000",
            &hello, &world
        ])).unwrap().unwrap();
        assert_eq!(2, job.steps.len());
        match (&job.steps[0], &job.steps[1]) {
            (Step::File(first), Step::File(second)) => {
                assert_eq!(Some("HI".to_string()), first.name);
                assert_eq!(Some(0x1000), first.load);
                assert_eq!(Some(0x1000), first.exec);
                assert_eq!(8, first.leader);
                assert_eq!(FileType::Binary, first.file_type);
                // load, name and exec reset; leader sticks
                assert_eq!(Some("WORLD".to_string()), second.name);
                assert_eq!(None, second.load);
                assert_eq!(None, second.exec);
                assert_eq!(8, second.leader);
            }
            _ => panic!("expected two file steps")
        }
    }

    #[test]
    fn autorun_keeps_name_and_exec() {
        let hello = scratch_file("sticky.bin", &[0x48]);
        let job = run(args(&[
            "-o", "out.cas", "--autorun", "-n", "HI", "-e", "0x1000",
            &hello, &hello
        ])).unwrap().unwrap();
        match &job.steps[1] {
            Step::File(second) => {
                assert_eq!(Some("HI".to_string()), second.name);
                assert_eq!(Some(0x1000), second.exec);
            }
            _ => panic!("expected a file step")
        }
    }

    #[test]
    fn directives_interleave_in_order() {
        let hello = scratch_file("steps.bin", &[0x48]);
        let job = run(args(&[
            "-o", "out.wav", "--autorun",
            "--vdg", "8", "--sam-v", "4", &hello, "--lds", "0x7000"
        ])).unwrap().unwrap();
        assert!(matches!(job.steps[0], Step::SetVdg(8)));
        assert!(matches!(job.steps[1], Step::SetSamV(4)));
        assert!(matches!(job.steps[2], Step::File(_)));
        assert!(matches!(job.steps[3], Step::Lds(0x7000)));
    }

    #[test]
    fn dash_i_accepts_dashed_names() {
        let dashed = scratch_file("-dashed.bin", &[0x48]);
        let job = run(args(&["-o", "out.cas", "-i", &dashed])).unwrap().unwrap();
        assert_eq!(1, job.steps.len());
    }

    #[test]
    fn unknown_option_is_fatal() {
        assert!(run(args(&["-o", "out.cas", "--frobnicate"])).is_err());
        assert!(run(args(&["-o"])).is_err());
        assert!(run(args(&["-t", "warp", "-o", "out.cas"])).is_err());
    }

    #[test]
    fn output_format_inference() {
        let job = Job { output: Some("out.cas".into()), ..Default::default() };
        assert_eq!(OutputFormat::Cas, job.output_format("out.cas").unwrap());
        assert_eq!(OutputFormat::Wav, job.output_format("OUT.WAV").unwrap());
        assert!(job.output_format("out.tape").is_err());
        let forced = Job { format: Some(OutputFormat::Wav), ..Default::default() };
        assert_eq!(OutputFormat::Wav, forced.output_format("out.cas").unwrap());
    }

    #[test]
    fn fast_cas_is_rejected() {
        let hello = scratch_file("fast.bin", &[0x48]);
        let out = env::temp_dir().join("bin2cas-tests").join("fast-reject.cas");
        let job = run(args(&[
            "-o", out.to_str().unwrap(), "--fast", &hello
        ])).unwrap().unwrap();
        assert!(job.finish().is_err());
    }

    #[test]
    fn end_to_end_cas() {
        let hello = scratch_file("e2e.bin", &[0x48, 0x49]);
        let out = env::temp_dir().join("bin2cas-tests").join("e2e.cas");
        let out = out.to_str().unwrap().to_string();
        run(args(&[
            "-o", &out, "-B", "-l", "0x1000", "-e", "0x1000", "-n", "HI", &hello
        ])).unwrap().unwrap().finish().unwrap();
        let bytes = fs::read(&out).unwrap();
        let name_payload: &[u8] = &[
            0x48, 0x49, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
            0x02, 0x00, 0x00, 0x10, 0x00, 0x10, 0x00
        ];
        assert!(bytes.windows(name_payload.len()).any(|w| w == name_payload));
        assert!(bytes.windows(8).any(|w| w == [0x55, 0x3C, 0x01, 0x02, 0x48, 0x49, 0x94, 0x55]));
        assert!(bytes.windows(6).any(|w| w == [0x55, 0x3C, 0xFF, 0x00, 0xFF, 0x55]));
    }
}
