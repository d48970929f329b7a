//! take_picture - capture one frame and write it encrypted.
//!
//! The frame is PNG-encoded in memory, chain-encrypted to every recipient and
//! written atomically to the output path. No plaintext is written.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use taxicam::crypto::encrypt_chained;
use taxicam::{open_source, CaptureSession, ScanConfig, X25519Provider};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "take_picture",
    version,
    about = "Capture a single encrypted picture"
)]
struct Args {
    /// Output file for the encrypted PNG
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Frame source: device index, /dev path, image directory, or stub://name
    #[arg(long)]
    source: Option<String>,

    /// Recipient public key file; repeat for each chain stage, in order
    #[arg(long = "recipient", value_name = "PATH")]
    recipients: Vec<PathBuf>,

    /// Use every *.pub file in this directory as a recipient
    #[arg(long, value_name = "DIR")]
    key_dir: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = ScanConfig::load_unvalidated()?;
    if let Some(source) = &args.source {
        cfg.source = source.clone();
    }
    if !args.recipients.is_empty() {
        cfg.recipients = args.recipients.clone();
    }
    if let Some(dir) = &args.key_dir {
        cfg.key_dir = Some(dir.clone());
    }

    let provider = {
        let _stage = ui.stage("Load recipient keys");
        X25519Provider::from_key_files(&cfg.resolve_recipients()?)?
    };

    let png = {
        let _stage = ui.stage("Capture frame");
        let mut source = open_source(&cfg.source)?;
        let mut session = CaptureSession::open(source.as_mut())?;
        let frame = session
            .next_frame()?
            .ok_or_else(|| anyhow!("source {} produced no frame", cfg.source))?;
        session.release();
        frame.encode_png(None)?
    };

    let ciphertext = {
        let _stage = ui.stage("Encrypt");
        encrypt_chained(&provider, &png)?
    };
    drop(png);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    taxicam::store::write_atomic(&args.output, &ciphertext)?;
    println!("wrote {}", args.output.display());
    Ok(())
}
