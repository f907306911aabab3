//
// cli.rs
// dicom-anon
//
// Defines the CLI surface with Clap and dispatches the selected command to the engine.
//

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::batch::{self, BatchConfig, BatchError};
use crate::progress::BarProgress;
use crate::registry::RegistryStore;
use crate::{anonymize, audit};

/// Command-line front end: each verb maps onto one engine entry point.
#[derive(Parser)]
#[command(name = "dicom-anon")]
#[command(about = "De-identify DICOM collections for research sharing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Anonymize every patient directory under SOURCE into DESTINATION
    Run {
        #[arg(short, long)]
        source: PathBuf,
        #[arg(short, long)]
        destination: PathBuf,
        /// Patient mapping file (defaults to ~/dicom-anon-mapping.json)
        #[arg(long, env = "DICOM_ANON_REGISTRY")]
        registry: Option<PathBuf>,
    },
    /// Anonymize a single DICOM file with fresh UID and study maps
    Anonymize {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "ANONYMOUS")]
        name: String,
    },
    /// Print the patient mapping table
    Registry {
        #[arg(long, env = "DICOM_ANON_REGISTRY")]
        registry: Option<PathBuf>,
    },
    /// Report identifying content left in a DICOM file
    Audit { file: PathBuf },
}

fn store_for(path: Option<PathBuf>) -> RegistryStore {
    path.map(RegistryStore::new)
        .unwrap_or_else(RegistryStore::default_location)
}

pub fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            source,
            destination,
            registry,
        } => {
            if !source.is_dir() {
                bail!("Source folder {} does not exist", source.display());
            }
            let store = store_for(registry);
            let mut mapping = store
                .load()
                .with_context(|| format!("Failed to load {}", store.path().display()))?;
            let config = BatchConfig {
                source_root: source,
                destination_root: destination,
            };

            let mut bar = BarProgress::new();
            match batch::run(&config, &mut mapping, &store, &mut bar) {
                Ok(summary) => {
                    bar.finish("Finished processing.");
                    println!(
                        "{} patients | {} files valid | {} files invalid",
                        summary.patients.len(),
                        summary.valid_files(),
                        summary.invalid_files()
                    );
                }
                Err(e @ BatchError::InvalidPatientDirectory { .. }) => {
                    bar.finish("Aborted.");
                    bail!("Error parsing patient ID: {e}. Mapping file was not updated.");
                }
                Err(e) => {
                    bar.finish("Aborted.");
                    return Err(e).context("Batch failed; mapping file was not updated");
                }
            }
        }
        Commands::Anonymize {
            input,
            output,
            name,
        } => anonymize::process_file(&input, output.as_deref(), &name)?,
        Commands::Registry { registry } => {
            let store = store_for(registry);
            let mapping = store.load()?;
            println!("Mapping file: {}", store.path().display());
            println!(
                "{:>10}  {:>8}  {:<12}  {:>8}  {:>7}  {:>7}  {}",
                "patient", "anon", "directory", "sessions", "valid", "invalid", "last updated"
            );
            for r in mapping.records() {
                println!(
                    "{:>10}  {:>8}  {:<12}  {:>8}  {:>7}  {:>7}  {}",
                    r.patient_id,
                    r.anon_patient_id,
                    r.anon_patient_dir_name,
                    r.total_session_count,
                    r.valid_file_count,
                    r.invalid_file_count,
                    r.last_updated.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Audit { file } => audit::print_audit(&file)?,
    }

    Ok(())
}
