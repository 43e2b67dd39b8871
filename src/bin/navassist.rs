//! navassist - headless navigation assistant
//!
//! Runs the capture pipeline against a camera or video file, announces
//! detected objects by zone and optionally records the annotated stream.
//! Operator commands are read line by line from stdin (`help` lists them).

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use nav_assist::config::NavConfig;
use nav_assist::session::Flow;
use nav_assist::{Command, Language, Session};

const PUMP_TIMEOUT: Duration = Duration::from_millis(50);

const HELP: &str = "commands: pause | resume | mirror on|off | conf <f> | model <name> | models \
| source webcam|external|<path> | record | voice on|off | describe | snapshot | stats | quit";

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long, env = "NAV_CONFIG")]
    config: Option<PathBuf>,
    /// Video source: webcam, external, a device index or a file path.
    #[arg(long)]
    source: Option<String>,
    /// Detection model name.
    #[arg(long)]
    model: Option<String>,
    /// Confidence threshold (0.01-1.0).
    #[arg(long)]
    conf: Option<f32>,
    /// Mirror frames horizontally.
    #[arg(long, overrides_with = "no_mirror")]
    mirror: bool,
    /// Do not mirror frames.
    #[arg(long)]
    no_mirror: bool,
    /// Disable voice announcements.
    #[arg(long)]
    no_voice: bool,
    /// Announce classes without their zone.
    #[arg(long)]
    no_zone_announce: bool,
    /// Start recording as soon as the source is open.
    #[arg(long)]
    record: bool,
    /// Announcement language (fr|en).
    #[arg(long)]
    language: Option<Language>,
}

enum Input {
    Line(String),
    Interrupt,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = build_config(&args)?;
    log::info!(
        "navassist {} starting: source {}, model {}, threshold {:.2}",
        env!("CARGO_PKG_VERSION"),
        cfg.source,
        cfg.detection.model,
        cfg.detection.confidence_threshold
    );

    let mut session = Session::from_config(&cfg)?;

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(Input::Interrupt);
    })
    .context("error setting Ctrl-C handler")?;
    spawn_stdin_reader(tx)?;

    session.start()?;
    log::info!("{}", HELP);

    let mut record_pending = args.record;
    'main: loop {
        session.pump(PUMP_TIMEOUT);

        if record_pending && session.pipeline().frame_dimensions().is_some() {
            record_pending = false;
            if let Err(err) = session.toggle_recording() {
                log::error!("navassist: {:#}", err);
            }
        }

        while let Ok(input) = rx.try_recv() {
            let line = match input {
                Input::Interrupt => {
                    log::info!("shutdown signal received, stopping...");
                    break 'main;
                }
                Input::Line(line) => line,
            };
            if line.trim().is_empty() {
                continue;
            }
            if line.trim().eq_ignore_ascii_case("help") {
                log::info!("{}", HELP);
                continue;
            }
            let command = match line.parse::<Command>() {
                Ok(command) => command,
                Err(err) => {
                    log::warn!("navassist: {:#}", err);
                    continue;
                }
            };
            match session.apply(command) {
                Ok(Flow::Quit) => break 'main,
                Ok(Flow::Continue) => {}
                Err(err) => log::error!("navassist: {:#}", err),
            }
        }
    }

    session.shutdown();
    Ok(())
}

fn build_config(args: &Args) -> Result<NavConfig> {
    let mut cfg = NavConfig::load_from(args.config.as_deref())?;
    if let Some(source) = &args.source {
        cfg.source = cfg.parse_source(source)?;
    }
    if let Some(model) = &args.model {
        cfg.detection.model = model.clone();
    }
    if let Some(conf) = args.conf {
        cfg.detection.confidence_threshold = nav_assist::clamp_conf_threshold(conf);
    }
    if args.mirror {
        cfg.display.mirror = Some(true);
    } else if args.no_mirror {
        cfg.display.mirror = Some(false);
    }
    if args.no_voice {
        cfg.voice.enabled = false;
    }
    if args.no_zone_announce {
        cfg.voice.announce_zone = false;
    }
    if let Some(language) = args.language {
        cfg.voice.language = language;
    }
    Ok(cfg)
}

/// Forward stdin lines until EOF. Closing stdin does not end the session.
fn spawn_stdin_reader(tx: mpsc::Sender<Input>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(Input::Line(line)).is_err() {
                    break;
                }
            }
        })
        .context("spawn stdin reader")?;
    Ok(())
}
