use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use anyhow::{Context, Result};
use burn::config::Config;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use svfbm_registration::{
    ProgressBarObserver, PyramidalSvfRegistration, RegistrationConfig, RegistrationState, SymmetryKind,
};

type B = NdArray<f32>;

/// Dense SVF block-matching registration of two NIfTI volumes.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Reference (fixed) image.
    #[arg(short, long)]
    reference: PathBuf,

    /// Floating (moving) image.
    #[arg(short, long)]
    floating: PathBuf,

    /// Warped output image; written gzip-compressed.
    #[arg(short, long)]
    output: PathBuf,

    /// Optional stationary velocity field output.
    #[arg(long)]
    svf: Option<PathBuf>,

    /// JSON configuration; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured number of pyramid levels.
    #[arg(long)]
    levels: Option<usize>,

    /// Use the kissing symmetric scheme.
    #[arg(long)]
    kissing: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let device = NdArrayDevice::Cpu;

    let mut config = match &args.config {
        Some(path) => RegistrationConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => RegistrationConfig::new(),
    };
    if let Some(levels) = args.levels {
        config.number_of_pyramid_levels = levels;
    }
    if args.kissing {
        config.symmetry = SymmetryKind::Kissing;
    }

    let reference = svfbm_io::read_nifti::<B, _>(&args.reference, &device)?;
    let floating = svfbm_io::read_nifti::<B, _>(&args.floating, &device)?;
    tracing::info!(
        reference = ?reference.geometry().size(),
        floating = ?floating.geometry().size(),
        "Images loaded"
    );

    let progress = Arc::new(ProgressBarObserver::new());
    let registration = PyramidalSvfRegistration::new(config)?.with_observer(progress);

    let start = Instant::now();
    let outcome = registration.run(&reference, &floating)?;
    tracing::info!(
        state = ?outcome.state,
        levels = outcome.levels_processed,
        elapsed = format!("{:.2}s", start.elapsed().as_secs_f64()),
        "Registration finished"
    );
    if outcome.state == RegistrationState::Aborted {
        tracing::warn!("Registration was aborted, writing the partial result");
    }

    let written = svfbm_io::write_nifti_compressed(&args.output, &outcome.warped)?;
    tracing::info!(path = %written.display(), "Warped image written");
    if let Some(path) = &args.svf {
        svfbm_io::write_velocity_field(path, outcome.velocity.velocity())?;
        tracing::info!(path = %path.display(), "Velocity field written");
    }
    Ok(())
}
