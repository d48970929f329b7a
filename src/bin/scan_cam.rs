//! scan_cam - capture a scan and keep only encrypted best-face frames.
//!
//! Each scan:
//! 1. Reads up to `--max-frames` frames from the source
//! 2. Splits them into `--max-faces` slots and keeps each slot's frame with
//!    the most detected faces
//! 3. Encrypts every kept frame to all recipients before it touches disk
//! 4. Bundles the slot artifacts into `scan-<stamp>.tar.gz`
//!
//! With `--repeat`, scans run back to back, each one waiting for a newline on
//! stdin (a button press wired to stdin works the same way).

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use taxicam::{
    detect::detector_from_settings, open_source, ArchiveOutcome, CancelToken, ScanConfig,
    ScanError, ScanStamp, Scanner, X25519Provider,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "scan_cam",
    version,
    about = "Scan a camera and keep encrypted best-face frames"
)]
struct Args {
    /// JSON config file (overrides TAXICAM_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Frame source: device index, /dev path, image directory, or stub://name
    #[arg(long)]
    source: Option<String>,

    /// Frames to read per scan
    #[arg(long)]
    max_frames: Option<u64>,

    /// Slots per scan (most pictures kept)
    #[arg(long)]
    max_faces: Option<usize>,

    /// Delay between frames in milliseconds
    #[arg(long, value_name = "MS")]
    frame_delay_ms: Option<u64>,

    /// Detector backend (stub|scripted|tract)
    #[arg(long)]
    detector: Option<String>,

    /// Detector model file
    #[arg(long, value_name = "PATH")]
    detect_model: Option<PathBuf>,

    /// Per-frame face counts for the scripted detector, e.g. 0:0,2:3,7:1
    #[arg(long, value_name = "SCRIPT")]
    detect_script: Option<String>,

    #[arg(long)]
    detect_scale: Option<f32>,

    #[arg(long)]
    detect_neighbors: Option<u32>,

    /// Minimum face size as WxH
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    detect_min_size: Option<(u32, u32)>,

    /// Log bounding boxes of every frame with faces
    #[arg(long)]
    print_coordinates_on_match: bool,

    /// Print a status line per frame
    #[arg(long)]
    show_preview: bool,

    /// Draw face rectangles on kept frames before encryption
    #[arg(long)]
    rect_draw: bool,

    /// Rectangle colour as R,G,B
    #[arg(long, value_name = "R,G,B", value_parser = parse_color)]
    rect_color: Option<[u8; 3]>,

    #[arg(long)]
    rect_width: Option<u32>,

    /// Directory for slot artifacts
    #[arg(long, value_name = "DIR")]
    target_dir: Option<PathBuf>,

    /// Directory for scan archives (default: target dir)
    #[arg(long, value_name = "DIR")]
    archive_dir: Option<PathBuf>,

    /// Recipient public key file; repeat for each chain stage, in order
    #[arg(long = "recipient", value_name = "PATH")]
    recipients: Vec<PathBuf>,

    /// Use every *.pub file in this directory as a recipient
    #[arg(long, value_name = "DIR")]
    key_dir: Option<PathBuf>,

    /// Run scans back to back, each started by a newline on stdin
    #[arg(long)]
    repeat: bool,

    /// Log filter (info|debug|...)
    #[arg(long)]
    loglevel: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut ScanConfig) {
        if let Some(source) = &self.source {
            cfg.source = source.clone();
        }
        if let Some(max_frames) = self.max_frames {
            cfg.max_frames = max_frames;
        }
        if let Some(max_faces) = self.max_faces {
            cfg.max_faces = max_faces;
        }
        if let Some(ms) = self.frame_delay_ms {
            cfg.frame_delay = Duration::from_millis(ms);
        }
        if let Some(backend) = &self.detector {
            cfg.detector.backend = backend.clone();
        }
        if let Some(model) = &self.detect_model {
            cfg.detector.model_path = Some(model.clone());
        }
        if let Some(script) = &self.detect_script {
            cfg.detector.script = Some(script.clone());
        }
        if let Some(scale) = self.detect_scale {
            cfg.detector.scale_factor = scale;
        }
        if let Some(neighbors) = self.detect_neighbors {
            cfg.detector.min_neighbors = neighbors;
        }
        if let Some(min_size) = self.detect_min_size {
            cfg.detector.min_size = min_size;
        }
        cfg.print_coordinates_on_match |= self.print_coordinates_on_match;
        cfg.show_preview |= self.show_preview;
        cfg.annotation.draw |= self.rect_draw;
        if let Some(color) = self.rect_color {
            cfg.annotation.style.color = color;
        }
        if let Some(width) = self.rect_width {
            cfg.annotation.style.width = width;
        }
        if let Some(dir) = &self.target_dir {
            cfg.target_dir = dir.clone();
        }
        if let Some(dir) = &self.archive_dir {
            cfg.archive_dir = Some(dir.clone());
        }
        if !self.recipients.is_empty() {
            cfg.recipients = self.recipients.clone();
        }
        if let Some(dir) = &self.key_dir {
            cfg.key_dir = Some(dir.clone());
        }
        if let Some(level) = &self.loglevel {
            cfg.loglevel = level.clone();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => ScanConfig::from_path(path)?,
        None => ScanConfig::load_unvalidated()?,
    };
    args.apply(&mut cfg);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cfg.loglevel))
        .init();
    cfg.validate()?;

    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .map_err(|e| anyhow!("failed to install interrupt handler: {}", e))?;
    }

    if !args.repeat {
        return run_scan(&cfg, &ui, &cancel);
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        eprintln!("press enter to scan (ctrl-d to quit)");
        match lines.next() {
            Some(line) => {
                line?;
            }
            None => return Ok(()),
        }
        if cancel.is_cancelled() {
            return Ok(());
        }
        if let Err(err) = run_scan(&cfg, &ui, &cancel) {
            if cancel.is_cancelled() {
                return Err(err);
            }
            log::error!("scan failed: {:#}", err);
        }
    }
}

fn run_scan(cfg: &ScanConfig, ui: &ui::Ui, cancel: &CancelToken) -> Result<()> {
    let provider = {
        let _stage = ui.stage("Load recipient keys");
        let recipients = cfg.resolve_recipients()?;
        X25519Provider::from_key_files(&recipients)?
    };
    let detector = {
        let _stage = ui.stage("Load face detector");
        detector_from_settings(&cfg.detector)?
    };
    let mut source = open_source(&cfg.source)?;

    let mut scanner = Scanner::new(cfg.clone(), detector, Box::new(provider))?
        .with_cancel(cancel.clone());
    if cfg.show_preview {
        scanner = scanner.with_observer(Box::new(ui.frame_preview(cfg.max_frames)));
    }

    let stamp = ScanStamp::now();
    let result = {
        let _stage = ui.stage("Scan");
        scanner.run(source.as_mut(), stamp)
    };
    let report = match result.and_then(|report| report.into_result()) {
        Ok(report) => report,
        Err(ScanError::Cancelled { artifacts }) => {
            for path in &artifacts {
                println!("left unarchived: {}", path.display());
            }
            return Err(anyhow!("scan {} cancelled", stamp));
        }
        Err(err) => return Err(err.into()),
    };

    println!(
        "scan {}: {} frame(s), {} slot(s) kept",
        report.stamp,
        report.frames_processed,
        report.slots.iter().filter(|s| s.artifact.is_some()).count()
    );
    match &report.archive {
        ArchiveOutcome::Written {
            path,
            entries,
            leftover,
        } => {
            println!("archive: {} ({} artifact(s))", path.display(), entries);
            for path in leftover {
                println!("could not remove: {}", path.display());
            }
        }
        ArchiveOutcome::NothingCaptured => println!("nothing captured"),
    }
    Ok(())
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| "expected WxH".to_string())?;
    let w = w.trim().parse().map_err(|_| "invalid width".to_string())?;
    let h = h.trim().parse().map_err(|_| "invalid height".to_string())?;
    Ok((w, h))
}

fn parse_color(value: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err("expected R,G,B".to_string());
    }
    let mut color = [0u8; 3];
    for (slot, part) in color.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("invalid colour component '{}'", part))?;
    }
    Ok(color)
}
