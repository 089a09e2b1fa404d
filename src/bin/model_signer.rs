//! Signing utility for model artifact directories.
//!
//! `keygen` writes a fresh Ed25519 seed (and optionally the public key);
//! `sign` writes `manifest.json` binding the model and encoder files by
//! SHA-256, plus `model.sig`, the Ed25519 signature over the manifest bytes.
//!
//! # Usage
//!
//! ```bash
//! model_signer keygen --out-seed signing.seed --out-pub signing.pub
//! model_signer sign models --key-file signing.seed [--serial 42]
//! ```
//!
//! # Security
//!
//! - Seeds come from OS entropy and are zeroized after use
//! - The seed file is created with 0600 permissions (Unix)
//! - Only public material is printed

use std::collections::BTreeMap;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose;
use base64::Engine;
use clap::{Parser, Subcommand};
use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use therapist_demand::adapters::forest::{
    sha256_hex, ArtifactManifest, ENCODERS_FILE, MANIFEST_FILE, MODEL_FILE, SIGNATURE_FILE,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sign model artifact directories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 signing seed
    Keygen {
        /// Where to write the base64 seed
        #[arg(long)]
        out_seed: PathBuf,

        /// Where to write the base64 public key
        #[arg(long)]
        out_pub: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Write manifest.json and model.sig for an artifact directory
    Sign {
        /// Directory holding usage_model.json and label_encoders.json
        dir: PathBuf,

        /// File with the base64 signing seed
        #[arg(long, env = "MODEL_SIGNING_KEY_B64_FILE")]
        key_file: PathBuf,

        /// Build serial recorded in the manifest (defaults to the creation timestamp)
        #[arg(long)]
        serial: Option<u64>,
    },
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct Seed([u8; 32]);

fn read_seed(path: &Path) -> Result<Seed> {
    let content = Zeroizing::new(
        fs::read_to_string(path).with_context(|| format!("Failed reading signing key {path:?}"))?,
    );
    let raw = Zeroizing::new(
        general_purpose::STANDARD
            .decode(content.trim())
            .context("Invalid base64 in signing key")?,
    );
    if raw.len() != 32 {
        bail!(
            "Signing key seed must be 32 bytes after base64 decode (got {})",
            raw.len()
        );
    }
    let mut seed = Seed([0u8; 32]);
    seed.0.copy_from_slice(&raw);
    Ok(seed)
}

fn write_secret(path: &Path, contents: &[u8], force: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create {path:?} (use --force to overwrite)"))?;
    std::io::Write::write_all(&mut file, contents).with_context(|| format!("Failed writing {path:?}"))
}

fn keygen(out_seed: &Path, out_pub: Option<&Path>, force: bool) -> Result<()> {
    let mut seed = Seed([0u8; 32]);
    OsRng.fill_bytes(&mut seed.0);
    let signing_key = SigningKey::from_bytes(&seed.0);
    let public_b64 = general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes());

    let seed_b64 = Zeroizing::new(general_purpose::STANDARD.encode(seed.0));
    write_secret(out_seed, format!("{}\n", seed_b64.as_str()).as_bytes(), force)?;
    println!("Wrote signing seed: {out_seed:?}");

    if let Some(path) = out_pub {
        if path.exists() && !force {
            bail!("{path:?} exists (use --force to overwrite)");
        }
        fs::write(path, format!("{public_b64}\n"))
            .with_context(|| format!("Failed writing {path:?}"))?;
        println!("Wrote public key: {path:?}");
    }

    println!("MODEL_SIGNING_PUBKEY_B64={public_b64}");
    Ok(())
}

fn sign(dir: &Path, key_file: &Path, serial: Option<u64>) -> Result<()> {
    let seed = read_seed(key_file)?;
    let signing_key = SigningKey::from_bytes(&seed.0);

    let mut files = BTreeMap::new();
    for rel in [MODEL_FILE, ENCODERS_FILE] {
        let path = dir.join(rel);
        let bytes = fs::read(&path).with_context(|| format!("Failed reading {path:?}"))?;
        files.insert(rel.to_string(), sha256_hex(&bytes));
    }

    let created_at = chrono::Utc::now().timestamp();
    let manifest = ArtifactManifest {
        version: 1,
        serial: serial.unwrap_or_else(|| u64::try_from(created_at).unwrap_or(1)),
        created_at,
        files,
    };
    let manifest_bytes =
        serde_json::to_vec_pretty(&manifest).context("Failed to serialize manifest")?;

    let manifest_path = dir.join(MANIFEST_FILE);
    fs::write(&manifest_path, &manifest_bytes)
        .with_context(|| format!("Failed to write {manifest_path:?}"))?;

    let sig: Signature = signing_key.sign(&manifest_bytes);
    let sig_path = dir.join(SIGNATURE_FILE);
    fs::write(&sig_path, sig.to_bytes()).with_context(|| format!("Failed to write {sig_path:?}"))?;

    println!("Signed manifest: {manifest_path:?} (serial={})", manifest.serial);
    println!("Wrote signature: {sig_path:?}");
    println!(
        "MODEL_SIGNING_PUBKEY_B64={}",
        general_purpose::STANDARD.encode(signing_key.verifying_key().as_bytes())
    );
    Ok(())
}

fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Keygen {
            out_seed,
            out_pub,
            force,
        } => keygen(&out_seed, out_pub.as_deref(), force),
        Command::Sign {
            dir,
            key_file,
            serial,
        } => sign(&dir, &key_file, serial),
    }
}
