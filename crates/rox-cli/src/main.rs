use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rox_core::codec::{convert_raw_file, read_sequence_file, FRAME_ID_DIGITS};
use rox_core::color::{assign_color, color_to_index, ColorScheme, LegacyColorMap};
use rox_core::config::{Delays, SequenceJob};
use rox_core::scene::memory::{MemoryRenderer, MemoryScene};
use rox_core::{
    Clock, DefaultAssetLoader, ManualClock, ReplayConfig, ReplayDriver, Rgb, SequenceStore,
    SystemClock,
};
use rox_data::config::ReplayConfigFile;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a raw scene recording (.txt) into a JSON sequence document
    Convert {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Defaults to INPUT with a .json extension
        #[arg(value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Zero padding of frame ids
        #[arg(long, default_value_t = FRAME_ID_DIGITS)]
        frame_id_width: usize,
    },

    /// Print a summary of a JSON sequence document
    Inspect {
        #[arg(value_name = "SEQUENCE")]
        input: PathBuf,
    },

    /// Print instance mask colors, or find the index of a color
    Colors {
        #[arg(long, value_enum, default_value_t = SchemeArg::Shell)]
        scheme: SchemeArg,

        /// First index to print
        #[arg(long, default_value_t = 1)]
        start: u32,

        /// Number of entries to print
        #[arg(long, default_value_t = 16)]
        count: u32,

        /// Look up the index of an `r,g,b` color instead of printing a range
        #[arg(long, value_parser = parse_rgb)]
        invert: Option<Rgb>,
    },

    /// Replay sequences headless against the in-memory scene and write the image tree
    Replay {
        /// Replay configuration (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        scene_dir: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Sequence to rebuild, `name` or `name:start_frame`. Repeatable.
        #[arg(long = "sequence", value_name = "NAME[:START]")]
        sequences: Vec<String>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        /// Only move actors, do not capture
        #[arg(long)]
        playback_only: bool,

        #[arg(long)]
        playback_speed: Option<f32>,

        /// Skip settle times and run as fast as possible
        #[arg(long)]
        no_delays: bool,

        #[arg(long, value_enum, default_value_t = SchemeArg::Shell)]
        scheme: SchemeArg,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum SchemeArg {
    Shell,
    Legacy,
}

impl From<SchemeArg> for ColorScheme {
    fn from(s: SchemeArg) -> Self {
        match s {
            SchemeArg::Shell => ColorScheme::Shell,
            SchemeArg::Legacy => ColorScheme::Legacy,
        }
    }
}

fn parse_rgb(s: &str) -> Result<Rgb, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("Expected r,g,b but got '{}'", s));
    };
    let channel = |v: &str| v.parse::<u8>().map_err(|e| format!("'{}': {}", v, e));
    Ok(Rgb::new(channel(r)?, channel(g)?, channel(b)?))
}

fn parse_job(s: &str) -> Result<SequenceJob> {
    match s.rsplit_once(':') {
        Some((name, start)) => {
            let start_frame = start
                .parse()
                .with_context(|| format!("Invalid start frame in '{}'", s))?;
            Ok(SequenceJob {
                name: name.to_string(),
                start_frame,
            })
        }
        None => Ok(SequenceJob::new(s)),
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(cli.log_level).into())
        .from_env_lossy();

    let subscriber_builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match cli.log_format {
        LogFormat::Json => subscriber_builder.json().init(),
        LogFormat::Pretty => subscriber_builder.pretty().init(),
    }

    if let Err(e) = run(cli.command) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Convert {
            input,
            output,
            frame_id_width,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("json"));
            let sequence = convert_raw_file(&input, &output, frame_id_width)?;
            println!(
                "{} -> {} ({} frames)",
                input.display(),
                output.display(),
                sequence.total_frames
            );
        }

        Command::Inspect { input } => {
            let store = SequenceStore::new(read_sequence_file(&input)?);
            let seq = store.sequence();
            println!("name:            {}", store.name());
            println!("frames:          {}", store.frame_count());
            println!("total time:      {:.3} s", seq.total_time);
            println!("mean framerate:  {:.3} fps", seq.mean_framerate);
            for cam in store.camera_configs() {
                println!(
                    "camera:          {} (fov {}, stereo {})",
                    cam.name, cam.field_of_view, cam.stereo_baseline
                );
            }
            for pawn in store.pawn_infos() {
                println!("skeleton:        {} ({} bones)", pawn.name, pawn.bone_count);
            }
            println!("non-movable:     {}", store.non_movable_objects().len());
            let objects: std::collections::BTreeSet<&str> = seq
                .frames
                .iter()
                .flat_map(|f| f.objects.keys().map(String::as_str))
                .collect();
            println!("movable objects: {}", objects.len());
        }

        Command::Colors {
            scheme,
            start,
            count,
            invert,
        } => match (scheme, invert) {
            (SchemeArg::Shell, Some(color)) => match color_to_index(color) {
                Some(i) => println!("{}", i),
                None => bail!("{},{},{} is not a shell color", color.r, color.g, color.b),
            },
            (SchemeArg::Legacy, Some(color)) => {
                let map = LegacyColorMap::new();
                match (0..map.len()).find(|&i| map.color(i) == color) {
                    Some(i) => println!("{}", i),
                    None => bail!("{},{},{} is not a legacy color", color.r, color.g, color.b),
                }
            }
            (SchemeArg::Shell, None) => {
                for i in start..start.saturating_add(count) {
                    let c = assign_color(i);
                    println!("{:>5}  {:>3} {:>3} {:>3}", i, c.r, c.g, c.b);
                }
            }
            (SchemeArg::Legacy, None) => {
                let map = LegacyColorMap::new();
                for i in start as usize..(start as usize).saturating_add(count as usize) {
                    let c = map.color(i);
                    println!("{:>5}  {:>3} {:>3} {:>3}", i, c.r, c.g, c.b);
                }
            }
        },

        Command::Replay {
            config,
            scene_dir,
            output_dir,
            sequences,
            width,
            height,
            playback_only,
            playback_speed,
            no_delays,
            scheme,
        } => {
            let file = match &config {
                Some(path) => {
                    let text = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    serde_json::from_str::<ReplayConfigFile>(&text)
                        .with_context(|| format!("Invalid replay config {}", path.display()))?
                }
                None => ReplayConfigFile::default(),
            };
            let mut cfg = ReplayConfig::from_file(&file);

            if let Some(dir) = scene_dir {
                cfg.scene_dir = dir;
            }
            if let Some(dir) = output_dir {
                cfg.output_dir = dir;
            }
            if !sequences.is_empty() {
                cfg.sequences = sequences
                    .iter()
                    .map(String::as_str)
                    .map(parse_job)
                    .collect::<Result<_>>()?;
            }
            if let Some(w) = width {
                cfg.width = w;
            }
            if let Some(h) = height {
                cfg.height = h;
            }
            if let Some(speed) = playback_speed {
                cfg.playback_speed = speed;
            }
            cfg.playback_only |= playback_only;
            if no_delays {
                cfg.delays = Delays::NONE;
            }

            let mut scene = MemoryScene::new();
            for job in &cfg.sequences {
                let path = cfg.sequence_path(job);
                match read_sequence_file(&path) {
                    Ok(seq) => scene.extend_from_sequence(&seq),
                    Err(e) => warn!("{}: {}", path.display(), e),
                }
            }

            let clock: Arc<dyn Clock> = if no_delays {
                Arc::new(ManualClock::new())
            } else {
                Arc::new(SystemClock)
            };

            info!(
                "Replaying {} sequence(s) into {}",
                cfg.sequences.len(),
                cfg.output_dir.display()
            );
            let mut driver = ReplayDriver::new(
                cfg,
                Arc::new(DefaultAssetLoader),
                clock,
                scene,
                MemoryRenderer::new(),
            )
            .with_color_scheme(scheme.into());
            let stats = driver.run();

            println!(
                "sequences: {} (skipped {}), frames: {}, captures: {}, images: {}, failed: {}",
                stats.sequences,
                stats.skipped_sequences,
                stats.frames,
                stats.captures,
                stats.images,
                stats.failed_exports
            );
            if stats.failed_exports > 0 {
                bail!("{} capture(s) failed to export", stats.failed_exports);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rgb_triplets() {
        assert_eq!(parse_rgb("255, 0,128").unwrap(), Rgb::new(255, 0, 128));
        assert!(parse_rgb("1,2").is_err());
        assert!(parse_rgb("1,2,300").is_err());
    }

    #[test]
    fn parses_jobs_with_start_frames() {
        let job = parse_job("walk:12").unwrap();
        assert_eq!(job.name, "walk");
        assert_eq!(job.start_frame, 12);
        assert_eq!(parse_job("walk").unwrap().start_frame, 0);
        assert!(parse_job("walk:x").is_err());
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
