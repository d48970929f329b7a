//! taxicam_keygen - generate an X25519 recipient keypair.
//!
//! Writes `<name>.pub` (share with the camera) and `<name>.key` (keep off the
//! camera) as hex text. Existing files are never overwritten.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use taxicam::crypto::keys::write_keypair;
use taxicam::RecipientSecret;

#[derive(Parser, Debug)]
#[command(
    name = "taxicam_keygen",
    version,
    about = "Generate a recipient keypair for encrypted pictures"
)]
struct Args {
    /// Directory for the key files
    #[arg(long, default_value = "keys", value_name = "DIR")]
    out_dir: PathBuf,

    /// File stem for the key files
    #[arg(long)]
    name: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let secret = RecipientSecret::generate();
    let (public_path, secret_path) = write_keypair(&args.out_dir, &args.name, &secret)?;
    println!("recipient id: {}", secret.id());
    println!("public key:   {}", public_path.display());
    println!("secret key:   {}", secret_path.display());
    Ok(())
}
