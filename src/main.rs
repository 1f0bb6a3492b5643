//! ots - OpenTimestamps command line client

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ots_client::proof_file::{backup_and_replace, proof_path_for, target_path_for, write_new};
use ots_client::{DetachedTimestampFile, Op, OpenTimestampsClient, OtsConfig, VerifyOutcome};

#[derive(Parser, Debug)]
#[command(name = "ots", version)]
#[command(about = "Timestamp files in the Bitcoin blockchain via OpenTimestamps calendars")]
struct Args {
    /// Calendar URL to submit to (repeatable, replaces the configured list)
    #[arg(long = "calendar", global = true)]
    calendars: Vec<String>,

    /// Esplora API base URL used for verification
    #[arg(long, global = true)]
    explorer: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Log level
    #[arg(long, env = "OTS_LOG_LEVEL", default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Timestamp files, writing FILE.ots next to each
    Stamp {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Fetch newer attestations for proofs, keeping PROOF.bak
    Upgrade {
        #[arg(required = true)]
        proofs: Vec<PathBuf>,
    },

    /// Verify a proof against the Bitcoin blockchain
    Verify {
        proof: PathBuf,

        /// Timestamped file (defaults to PROOF without `.ots`)
        #[arg(long)]
        target: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the commitment tree of a proof
    Info { proof: PathBuf },
}

impl Args {
    fn config(&self) -> OtsConfig {
        let mut config = OtsConfig::from_env();
        if !self.calendars.is_empty() {
            config.calendar_urls = self.calendars.clone();
        }
        if let Some(explorer) = &self.explorer {
            config.explorer_url = explorer.clone();
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log_level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = OpenTimestampsClient::with_config(args.config())?;

    match &args.command {
        Command::Stamp { files } => stamp(&client, files).await,
        Command::Upgrade { proofs } => upgrade(&client, proofs).await,
        Command::Verify {
            proof,
            target,
            json,
        } => verify(&client, proof, target.as_deref(), *json).await,
        Command::Info { proof } => {
            let bytes = read_proof(proof).await?;
            print!("{}", client.info_proof(&bytes)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn read_proof(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading proof {}", path.display()))
}

async fn stamp(client: &OpenTimestampsClient, paths: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let proof_path = proof_path_for(path);
        if proof_path.exists() {
            bail!("{} already exists", proof_path.display());
        }

        let reader = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let file = DetachedTimestampFile::from_reader(Op::Sha256, BufReader::new(reader))
            .with_context(|| format!("hashing {}", path.display()))?;
        files.push(file);
    }

    client.stamp_files(&mut files).await?;

    for (path, file) in paths.iter().zip(&files) {
        let proof_path = proof_path_for(path);
        write_new(&proof_path, &file.to_bytes()?)
            .await
            .with_context(|| format!("writing {}", proof_path.display()))?;
        println!("Created {}", proof_path.display());
    }

    Ok(ExitCode::SUCCESS)
}

async fn upgrade(client: &OpenTimestampsClient, proofs: &[PathBuf]) -> anyhow::Result<ExitCode> {
    let mut all_complete = true;

    for path in proofs {
        let bytes = read_proof(path).await?;
        let (upgraded, changed) = client.upgrade_proof(&bytes).await?;

        if changed {
            let backup = backup_and_replace(path, &upgraded)
                .await
                .with_context(|| format!("replacing {}", path.display()))?;
            tracing::debug!(backup = %backup.display(), "Saved previous proof");
        }

        let complete = DetachedTimestampFile::from_bytes(&upgraded)?
            .timestamp
            .is_complete();
        if complete {
            println!("{}: complete", path.display());
        } else {
            all_complete = false;
            println!("{}: pending, try again later", path.display());
        }
    }

    Ok(if all_complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn verify(
    client: &OpenTimestampsClient,
    proof: &Path,
    target: Option<&Path>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let target = match target {
        Some(target) => target.to_path_buf(),
        None => target_path_for(proof)
            .with_context(|| format!("{} has no .ots extension; pass --target", proof.display()))?,
    };

    let bytes = read_proof(proof).await?;
    let reader = File::open(&target).with_context(|| format!("opening {}", target.display()))?;
    let outcome = client
        .verify_proof_reader(&bytes, BufReader::new(reader))
        .await?;

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        match &outcome {
            VerifyOutcome::Verified {
                block_height,
                block_time,
            } => println!(
                "Success! Bitcoin block {block_height} attests existence as of unix time {block_time}"
            ),
            VerifyOutcome::Mismatch { block_height } => {
                println!("Bad attestation: proof does not match Bitcoin block {block_height}")
            }
            VerifyOutcome::Inconclusive { reason } => {
                println!("Inconclusive: {reason}")
            }
        }
    }

    Ok(if outcome.is_verified() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
