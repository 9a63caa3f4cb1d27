//! Apply command - create or update resources from manifests

use crate::commands::ManifestArgs;
use crate::display;
use crate::error::Result;

/// Run the apply command
pub async fn run(args: &ManifestArgs) -> Result<()> {
    let client = args.connect().await?;

    match client.apply_files(args.files.as_slice()).await {
        Ok(report) => display::print_report(&report, args.output),
        Err(err) => {
            if let Some(report) = err.report() {
                display::print_report(report, args.output)?;
            }
            Err(err.into())
        }
    }
}
