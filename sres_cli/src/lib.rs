//! Headless front end: runs a machine for a number of frames and writes its output to files.
use std::cell::RefCell;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use anyhow::Result;
use argh::FromArgs;
use image::RgbaImage;
use log::info;
use sres_machine::common::image::Image;
use sres_machine::common::image::Rgba32;
use sres_machine::components::coprocessor::CoprocessorKind;
use sres_machine::components::ppu::Framebuffer;
use sres_machine::components::smp::SAMPLE_RATE;
use sres_machine::system::platform::Platform;
use sres_machine::Cartridge;
use sres_machine::Configuration;
use sres_machine::System;

/// Runs an sres machine without a display
#[derive(FromArgs)]
pub struct CliArgs {
    /// cartridge description (json)
    #[argh(positional)]
    pub cartridge: Option<PathBuf>,

    /// configuration file (json)
    #[argh(option)]
    pub config: Option<PathBuf>,

    /// number of frames to run
    #[argh(option, default = "60")]
    pub frames: u64,

    /// snapshot to load before running
    #[argh(option)]
    pub load: Option<PathBuf>,

    /// write a snapshot after running
    #[argh(option)]
    pub save: Option<PathBuf>,

    /// save an instant snapshot instead of a portable one
    #[argh(switch)]
    pub instant: bool,

    /// description stored in the snapshot
    #[argh(option, default = "String::new()")]
    pub description: String,

    /// write all audio to this wav file
    #[argh(option)]
    pub wav: Option<PathBuf>,

    /// write the last frame to this png file
    #[argh(option)]
    pub png: Option<PathBuf>,

    /// work RAM cheat, addr=value or addr?compare=value in hex
    #[argh(option)]
    pub cheat: Vec<String>,

    /// print scheduler events matching this filter, e.g. "resume smp"
    #[argh(option)]
    pub log: Vec<String>,

    /// enable generation of trace files
    #[argh(option)]
    pub trace_file: Option<PathBuf>,
}

pub struct Report {
    /// Frame counter of the machine after the run.
    pub frames: u64,
    pub audio_samples: usize,
    pub scheduler_log: Vec<String>,
}

/// Cartridge used when none is given on the command line.
pub fn demo_cartridge() -> Cartridge {
    Cartridge::new("DEMO", &[CoprocessorKind::Multiplier, CoprocessorKind::Rtc])
}

pub fn run(args: &CliArgs) -> Result<Report> {
    let config = match &args.config {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };
    let cartridge = match &args.cartridge {
        Some(path) => Cartridge::with_description_file(path)?,
        None => demo_cartridge(),
    };
    let mut system = System::new(config, cartridge)?;

    let samples = Rc::new(RefCell::new(Vec::new()));
    system.set_platform(Box::new(Recorder {
        samples: samples.clone(),
    }));
    for cheat in &args.cheat {
        system.add_cheat(cheat.parse()?);
    }
    if !args.log.is_empty() {
        let mut debugger = system.debugger();
        for filter in &args.log {
            debugger.add_log_point(filter.parse()?);
        }
        debugger.enable();
    }

    if let Some(path) = &args.load {
        let data = std::fs::read(path)
            .with_context(|| format!("Cannot read snapshot {}", path.display()))?;
        system
            .unserialize(&data)
            .with_context(|| format!("Cannot load snapshot {}", path.display()))?;
    }

    system.execute_frames(args.frames);

    if let Some(path) = &args.save {
        let data = system.serialize(!args.instant, &args.description);
        std::fs::write(path, &data)
            .with_context(|| format!("Cannot write snapshot {}", path.display()))?;
        info!("Wrote {} bytes to {}", data.len(), path.display());
    }

    let samples = samples.take();
    if let Some(path) = &args.wav {
        write_wav(&samples, path)?;
    }
    if let Some(path) = &args.png {
        write_png(system.framebuffer(), path)?;
    }

    let scheduler_log = if args.log.is_empty() {
        Vec::new()
    } else {
        let mut debugger = system.debugger();
        debugger.disable();
        debugger.take_log().iter().map(|event| event.to_string()).collect()
    };
    Ok(Report {
        frames: system.debug().frame(),
        audio_samples: samples.len(),
        scheduler_log,
    })
}

/// Collects the audio of every frame.
struct Recorder {
    samples: Rc<RefCell<Vec<i16>>>,
}

impl Platform for Recorder {
    fn audio_frame(&mut self, samples: &[i16]) {
        self.samples.borrow_mut().extend_from_slice(samples);
    }
}

struct PngImage(RgbaImage);

impl Image for PngImage {
    fn new(width: u32, height: u32) -> Self {
        PngImage(RgbaImage::new(width, height))
    }

    fn set_pixel(&mut self, index: (u32, u32), value: Rgba32) {
        self.0[(index.0, index.1)] = image::Rgba::from(value.0);
    }
}

fn write_png(framebuffer: &Framebuffer, path: &Path) -> Result<()> {
    let image: PngImage = framebuffer.to_rgba();
    image
        .0
        .save(path)
        .with_context(|| format!("Cannot write image {}", path.display()))
}

fn write_wav(samples: &[i16], path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Cannot write audio {}", path.display()))?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn args(args: &[&str]) -> CliArgs {
        CliArgs::from_args(&["sres_cli"], args).unwrap_or_else(|exit| panic!("{}", exit.output))
    }

    fn path_arg(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("portable.srs");
        let saved = run(&args(&[
            "--frames",
            "2",
            "--save",
            path_arg(&snapshot),
            "--description",
            "two frames",
        ]))
        .unwrap();
        assert!(saved.frames >= 2);

        let loaded = run(&args(&["--frames", "1", "--load", path_arg(&snapshot)])).unwrap();
        assert_eq!(loaded.frames, saved.frames + 1);
    }

    #[test]
    fn test_instant_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("instant.srs");
        let saved = run(&args(&[
            "--frames",
            "1",
            "--instant",
            "--save",
            path_arg(&snapshot),
        ]))
        .unwrap();
        assert_eq!(saved.frames, 1);

        let loaded = run(&args(&["--frames", "1", "--load", path_arg(&snapshot)])).unwrap();
        assert_eq!(loaded.frames, 2);
    }

    #[test]
    fn test_rejects_foreign_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("foreign.srs");
        std::fs::write(&snapshot, b"not a snapshot").unwrap();
        let error = run(&args(&["--frames", "1", "--load", path_arg(&snapshot)]))
            .err()
            .unwrap();
        assert!(format!("{:#}", error).contains("signature"), "{:#}", error);
    }

    #[test]
    fn test_writes_audio_and_image() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("audio.wav");
        let png = dir.path().join("frame.png");
        let report = run(&args(&[
            "--frames",
            "2",
            "--wav",
            path_arg(&wav),
            "--png",
            path_arg(&png),
        ]))
        .unwrap();
        assert!(report.audio_samples > 0);

        let reader = hound::WavReader::open(&wav).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.len() as usize, report.audio_samples);

        let image = image::open(&png).unwrap();
        assert_eq!((image.width(), image.height()), (256, 224));
    }

    #[test]
    fn test_cartridge_and_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let cartridge = dir.path().join("cartridge.json");
        std::fs::write(&cartridge, r#"{ "title": "STAR OCEAN", "coprocessors": ["Rtc"] }"#)
            .unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{ "entropy": "Low" }"#).unwrap();
        let report = run(&args(&[
            path_arg(&cartridge),
            "--config",
            path_arg(&config),
            "--frames",
            "1",
        ]))
        .unwrap();
        assert_eq!(report.frames, 1);

        std::fs::write(&config, r#"{ "entropy": "Maximum" }"#).unwrap();
        assert!(run(&args(&["--config", path_arg(&config)])).is_err());
    }

    #[test]
    fn test_invalid_cheat() {
        assert!(run(&args(&["--frames", "1", "--cheat", "10=zz"])).is_err());
        assert!(run(&args(&["--frames", "1", "--cheat", "10=01"])).is_ok());
    }

    #[test]
    fn test_scheduler_log() {
        let report = run(&args(&["--frames", "2", "--log", "leave frame"])).unwrap();
        assert_eq!(
            report.scheduler_log,
            vec!["leave ppu (frame)".to_string(), "leave ppu (frame)".to_string()]
        );
    }
}
