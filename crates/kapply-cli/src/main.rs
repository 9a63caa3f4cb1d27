//! kapply CLI - idempotent apply and delete of Kubernetes manifests

use clap::{Parser, Subcommand};

mod commands;
mod display;
mod error;
mod exit_codes;
mod telemetry;

use commands::ManifestArgs;

#[derive(Parser)]
#[command(name = "kapply")]
#[command(version)]
#[command(about = "Apply and delete Kubernetes manifests", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create resources, or update them when the manifests changed
    Apply(ManifestArgs),

    /// Delete the resources described by manifests
    Delete(ManifestArgs),
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = Cli::parse();
    telemetry::init(cli.debug);

    let result = match &cli.command {
        Commands::Apply(args) => commands::apply::run(args).await,
        Commands::Delete(args) => commands::delete::run(args).await,
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
