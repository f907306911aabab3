//
// main.rs
// dicom-anon
//
// Binary entry point: installs the tracing subscriber and hands off to the CLI layer.
//

use dicom_anon::cli;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    cli::run()
}
