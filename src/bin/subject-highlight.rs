//! Subject highlight CLI tool
//!
//! Segments photos or raw camera frames and writes highlighted overlays,
//! foreground and per-subject cutouts.

#[cfg(feature = "cli")]
use subject_highlight::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
