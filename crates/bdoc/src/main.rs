#![forbid(unsafe_code)]

//! bdoc CLI: verify and list BDOC (ASiC-E + XAdES) containers.

use bdoc::{Conf, Container, Error, Opener, Profile, Services};
use clap::{Parser, Subcommand};
use std::error::Error as _;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "bdoc", about = "BDOC container verification", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a container and verify all of its signatures
    Verify {
        /// Input container
        file: PathBuf,

        /// TOML configuration with size limits and trusted certificates
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured profile (BES, TM or TS)
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// List data files without verifying signatures
    List {
        /// Input container
        file: PathBuf,
    },

    /// List supported algorithms
    Info,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Verify {
            file,
            config,
            profile,
        } => cmd_verify(file, config, profile),
        Commands::List { file } => cmd_list(file),
        Commands::Info => cmd_info(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        process::exit(1);
    }
}

fn cmd_verify(file: PathBuf, config: PathBuf, profile: Option<String>) -> Result<(), Error> {
    let mut conf = Conf::load(&config)?;
    if let Some(profile) = profile {
        conf.profile = profile.parse::<Profile>()?;
    }

    // OCSP and TSP clients are not linked into the CLI, so only BES
    // passes construction.
    let opener = Opener::new(&conf, Services::default())?;
    log::info!("verifying {} as {}", file.display(), opener.profile());

    let mut container = opener.open(open_file(&file)?)?;
    for sig in container.signatures() {
        println!(
            "signature {} ({}): {} serial {}, signed at {}",
            sig.id,
            sig.file,
            sig.signer.subject(),
            sig.signer.serial_decimal(),
            sig.signing_time.to_rfc3339()
        );
    }
    print_files(&container);
    container.close();
    println!("OK");
    Ok(())
}

fn cmd_list(file: PathBuf) -> Result<(), Error> {
    let mut container = bdoc::unverified_open(open_file(&file)?)?;
    print_files(&container);
    println!("{} unverified signature file(s)", container.signature_count());
    container.close();
    Ok(())
}

fn cmd_info() -> Result<(), Error> {
    println!("bdoc: BDOC 2.1 container verification");
    println!();
    println!("Profiles:");
    println!("  BES, TM (OCSP time-mark), TS (RFC 3161 time-stamp)");
    println!();
    println!("Supported digest algorithms:");
    println!("  SHA-256, SHA-384, SHA-512");
    println!("  OCSP nonce: SHA-1, SHA-224, SHA-256, SHA-384, SHA-512");
    println!();
    println!("Supported signature algorithms:");
    println!("  RSA PKCS#1 v1.5 (SHA-256, SHA-384, SHA-512)");
    println!("  ECDSA P-256/P-384 (SHA-256, SHA-384, SHA-512)");
    println!();
    println!("Supported canonicalization:");
    println!("  C14N 1.1 (without comments)");
    Ok(())
}

// ── Utility functions ────────────────────────────────────────────────

fn open_file(path: &PathBuf) -> Result<BufReader<File>, Error> {
    let file = File::open(path).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
    Ok(BufReader::new(file))
}

fn print_files(container: &Container) {
    for file in container.files() {
        println!("{}\t{}\t{} bytes", file.name, file.mimetype, file.data.len());
    }
}
