use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use desugar_jar::desugar::{
    BuildConfig, DesugarOptions, JarFileClassEntrySelector, UnselectedClassPolicy,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Moves supported JVM APIs of a JAR into static companion classes.
#[derive(Parser, Debug)]
#[command(name = "desugar-jar", version)]
struct Cli {
    /// The JAR to read.
    #[arg(value_name = "INPUT")]
    input: PathBuf,
    /// The JAR to write.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,
    /// The built-in configuration selecting the top-level types to rewrite.
    #[arg(long, default_value_t = BuildConfig::default().to_string())]
    config: String,
    /// Leaves class entries outside of the selection out of the output.
    #[arg(long)]
    drop_unselected: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config: BuildConfig = cli.config.parse().context("Invalid --config")?;
    let mut options = DesugarOptions::from_config(config);
    if cli.drop_unselected {
        options.unselected_classes = UnselectedClassPolicy::Drop;
    }
    info!(%config, input = %cli.input.display(), "Desugaring");
    JarFileClassEntrySelector::new(&cli.input, &cli.output, options)
        .run()
        .with_context(|| {
            format!(
                "Failed to desugar {} into {}",
                cli.input.display(),
                cli.output.display()
            )
        })?;
    Ok(())
}

fn init_logging() {
    let init_result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    let _ = init_result;
}
