use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tiny_pm::commands::{InstallOptions, install};

/// tiny-pm - a small package installer for npm-style registries
///
/// Resolves the dependencies in the nearest package.json, records the
/// choices in tiny-pm.yml, and unpacks every package into node_modules.
///
/// The registry defaults to the REGISTRY environment variable, then to
/// https://registry.npmjs.org/.
///
/// Examples:
///   tiny-pm                  # Install everything, including devDependencies
///   tiny-pm install --production
#[derive(Parser, Debug)]
#[command(author, version = env!("TINY_PM_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Skip devDependencies
    #[arg(long, global = true)]
    pub production: bool,

    /// Registry base URL
    #[arg(long, value_name = "URL", global = true)]
    pub registry: Option<String>,

    /// Directory to start looking for package.json in (defaults to the current directory)
    #[arg(long = "dir", short = 'C', value_name = "PATH", global = true)]
    pub dir: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Resolve and install the project's dependencies (the default)
    Install,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = tiny_pm::runtime::RealRuntime;

    match cli.command.unwrap_or(Commands::Install) {
        Commands::Install => {
            let options = InstallOptions {
                production: cli.production,
            };
            let report = install(runtime, options, cli.registry, cli.dir).await?;
            println!("{}", report.summary_line());

            if let Some(e) = report.lock_error {
                return Err(anyhow::Error::from(e)
                    .context("Packages were installed, but the lock file was not saved"));
            }
        }
    }
    Ok(())
}
