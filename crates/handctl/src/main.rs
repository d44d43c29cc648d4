use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use handctl::{
    gesture::GestureKey,
    input::{EnigoSink, InputSink, LogSink},
    pipeline::{status_reporter, Pipeline},
    settings::{
        watch::{SettingsStore, SettingsWatcher},
        Mode, Settings, DEFAULT_PATH,
    },
    source::{CaptureError, LandmarkSource, ProcessSource, ReplaySource},
};

/// Control the keyboard and mouse with hand gestures.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file.
    #[arg(long, global = true, env = "HANDCTL_SETTINGS", default_value = DEFAULT_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gesture controller.
    Run(RunArgs),
    /// Write the default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Validate the settings file and print the gesture assignments.
    Check,
}

#[derive(Args)]
struct RunArgs {
    /// Replay recorded landmarks instead of running a landmark program.
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Frame rate for `--replay`. Frames are replayed as fast as possible if not given.
    #[arg(long, requires = "replay")]
    fps: Option<f32>,

    /// Log input events instead of sending them to the OS.
    #[arg(long)]
    dry_run: bool,

    /// Restart the landmark source this many seconds after it fails.
    #[arg(long, value_name = "SECS")]
    reconnect: Option<f32>,

    /// Landmark program and its arguments.
    #[arg(last = true, value_name = "PROGRAM", required_unless_present = "replay")]
    program: Vec<String>,
}

enum SourceConfig {
    Replay { path: PathBuf, fps: Option<f32> },
    Process { program: String, args: Vec<String> },
}

impl SourceConfig {
    fn open(&self) -> Result<Box<dyn LandmarkSource>, CaptureError> {
        Ok(match self {
            SourceConfig::Replay { path, fps } => Box::new(ReplaySource::open(path, *fps)?),
            SourceConfig::Process { program, args } => {
                Box::new(ProcessSource::spawn(program, args)?)
            }
        })
    }
}

fn main() -> anyhow::Result<()> {
    handctl::init_logger!();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(&cli.settings, args),
        Command::Init { force } => init(&cli.settings, force),
        Command::Check => check(&cli.settings),
    }
}

fn run(settings_path: &Path, args: RunArgs) -> anyhow::Result<()> {
    if let Some(fps) = args.fps {
        if !(fps.is_finite() && fps > 0.0) {
            bail!("invalid `--fps` value: {fps}");
        }
        delay("--fps", 1.0 / fps)?;
    }
    let source = match (&args.replay, args.program.split_first()) {
        (Some(path), _) => SourceConfig::Replay {
            path: path.clone(),
            fps: args.fps,
        },
        (None, Some((program, rest))) => SourceConfig::Process {
            program: program.clone(),
            args: rest.to_vec(),
        },
        (None, None) => bail!("no landmark source given"),
    };
    let reconnect = args
        .reconnect
        .map(|secs| delay("--reconnect", secs))
        .transpose()?;

    let store = SettingsStore::new(Settings::load_or_default(settings_path));
    let _watcher = SettingsWatcher::spawn(store.clone(), settings_path)
        .context("failed to start settings watcher")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::info!("stopping");
            stop.store(true, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let dry_run = args.dry_run;
    let capture = thread::Builder::new()
        .name("capture".into())
        .spawn(move || -> anyhow::Result<()> {
            // The OS input connection is created on the thread that uses it.
            let sink: Box<dyn InputSink> = if dry_run {
                Box::new(LogSink)
            } else {
                Box::new(EnigoSink::new()?)
            };
            let mut pipeline = Pipeline::new(store, sink).with_reporter(status_reporter()?);
            capture_loop(&mut pipeline, &source, reconnect, &stop)
        })?;

    capture
        .join()
        .map_err(|_| anyhow!("capture thread panicked"))?
}

/// Converts a command line value in seconds to a [`Duration`] that can be added to the clock.
fn delay(arg: &str, secs: f32) -> anyhow::Result<Duration> {
    let delay = Duration::try_from_secs_f32(secs)
        .map_err(|e| anyhow!("invalid `{arg}` value {secs}: {e}"))?;
    if Instant::now().checked_add(delay).is_none() {
        bail!("invalid `{arg}` value {secs}: too large");
    }
    Ok(delay)
}

fn capture_loop<S: InputSink>(
    pipeline: &mut Pipeline<S>,
    source: &SourceConfig,
    reconnect: Option<Duration>,
    stop: &AtomicBool,
) -> anyhow::Result<()> {
    loop {
        let result = source
            .open()
            .and_then(|mut src| pipeline.run(&mut src, stop));
        let err = match result {
            Ok(()) => return Ok(()),
            Err(CaptureError::Ended) if matches!(source, SourceConfig::Replay { .. }) => {
                log::info!("replay finished");
                return Ok(());
            }
            // Ctrl-C also reaches the landmark program, which then closes its output.
            Err(_) if stop.load(Ordering::Relaxed) => return Ok(()),
            Err(e) => e,
        };

        let Some(delay) = reconnect else {
            return Err(err.into());
        };
        log::error!("{err}; retrying in {delay:.1?}");
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            if stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            let left = deadline.saturating_duration_since(Instant::now());
            thread::sleep(left.min(Duration::from_millis(100)));
        }
    }
}

fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists, use `--force` to overwrite it",
            path.display()
        );
    }
    Settings::with_default_assignments().save(path)?;
    log::info!("wrote default settings to {}", path.display());
    Ok(())
}

fn check(path: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(path)?;

    let t = &settings.thresholds;
    println!(
        "mirror_view: {}, mirror_controls: {}, debug_draw: {}",
        settings.mirror_view, settings.mirror_controls, settings.debug_draw,
    );
    println!(
        "pinch_dist: {}, two_split_min: {}, min_confidence: {}",
        t.pinch_dist, t.two_split_min, t.min_confidence,
    );
    for key in GestureKey::all() {
        let name = key.to_string();
        match settings.assignments.get(key) {
            Some(a) => match a.mode {
                Mode::Hold => println!("{name:<12} {:<14} hold", a.action.to_string()),
                Mode::Repeat => println!(
                    "{name:<12} {:<14} repeat {} Hz, {} ms taps",
                    a.action.to_string(),
                    a.repeat_hz,
                    a.tap_ms,
                ),
            },
            None => println!("{name:<12} -"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays() {
        assert_eq!(delay("--reconnect", 2.5).unwrap(), Duration::from_millis(2500));
        assert_eq!(delay("--reconnect", 0.0).unwrap(), Duration::ZERO);
        for secs in [-1.0, f32::NAN, f32::INFINITY, 1e30] {
            assert!(delay("--reconnect", secs).is_err(), "{secs}");
        }
    }

    #[test]
    fn out_of_range_arguments_are_errors() {
        let run_with = |args: &[&str]| {
            let cli = Cli::try_parse_from(args).unwrap();
            match cli.command {
                Command::Run(args) => run(&cli.settings, args),
                _ => unreachable!(),
            }
        };
        let err = run_with(&["handctl", "run", "--reconnect", "1e30", "--", "prog"]).unwrap_err();
        assert!(err.to_string().contains("--reconnect"), "{err}");
        let err = run_with(&["handctl", "run", "--replay", "f.jsonl", "--fps", "1e-39"]).unwrap_err();
        assert!(err.to_string().contains("--fps"), "{err}");
        let err = run_with(&["handctl", "run", "--replay", "f.jsonl", "--fps", "0"]).unwrap_err();
        assert!(err.to_string().contains("--fps"), "{err}");
    }
}
