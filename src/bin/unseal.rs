//! unseal - recover pictures from encrypted artifacts or scan archives.
//!
//! Every chain layer is peeled with the matching secret key, outermost first.
//! Run this on a trusted machine, never on the camera.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use taxicam::archive::{read_archive_entries, ARCHIVE_EXT};
use taxicam::crypto::decrypt_chained;
use taxicam::crypto::keys::SECRET_KEY_EXT;
use taxicam::store::{write_atomic, ARTIFACT_EXT};
use taxicam::RecipientSecret;

#[derive(Parser, Debug)]
#[command(
    name = "unseal",
    version,
    about = "Decrypt taxicam artifacts and scan archives"
)]
struct Args {
    /// Encrypted artifact (*.png.enc) or scan archive (*.tar.gz)
    input: PathBuf,

    /// Secret key file; repeat for every recipient in the chain
    #[arg(long = "key", value_name = "PATH")]
    keys: Vec<PathBuf>,

    /// Use every *.key file in this directory
    #[arg(long, value_name = "DIR")]
    key_dir: Option<PathBuf>,

    /// Directory for recovered pictures
    #[arg(long, default_value = ".", value_name = "DIR")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let secrets = load_secrets(&args)?;
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create {}", args.out_dir.display()))?;

    let name = file_name(&args.input)?;
    let entries = if name.ends_with(&format!(".{}", ARCHIVE_EXT)) {
        read_archive_entries(&args.input)?
    } else {
        let bytes = std::fs::read(&args.input)
            .with_context(|| format!("read {}", args.input.display()))?;
        vec![(name, bytes)]
    };

    for (entry, ciphertext) in entries {
        let picture = decrypt_chained(&ciphertext, &secrets)
            .with_context(|| format!("decrypt {}", entry))?;
        let out = args.out_dir.join(recovered_name(&entry));
        write_atomic(&out, &picture)?;
        println!("{} -> {}", entry, out.display());
    }
    Ok(())
}

fn load_secrets(args: &Args) -> Result<Vec<RecipientSecret>> {
    let mut paths = args.keys.clone();
    if let Some(dir) = &args.key_dir {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == SECRET_KEY_EXT) {
                found.push(path);
            }
        }
        found.sort();
        paths.extend(found);
    }
    if paths.is_empty() {
        return Err(anyhow!("no secret keys given (use --key or --key-dir)"));
    }
    paths
        .iter()
        .map(|p| RecipientSecret::load(p))
        .collect::<Result<Vec<_>>>()
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("invalid input path {}", path.display()))
}

fn recovered_name(entry: &str) -> String {
    match entry.strip_suffix(&format!(".{}", ARTIFACT_EXT)) {
        Some(stem) => format!("{}.png", stem),
        None => format!("{}.png", entry),
    }
}
