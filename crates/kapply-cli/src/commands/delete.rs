//! Delete command - remove the resources manifests describe

use crate::commands::ManifestArgs;
use crate::display;
use crate::error::Result;

/// Run the delete command
///
/// Resources that are already gone are reported as "not found" and do not
/// fail the command.
pub async fn run(args: &ManifestArgs) -> Result<()> {
    let client = args.connect().await?;

    match client.delete_files(args.files.as_slice()).await {
        Ok(report) => display::print_report(&report, args.output),
        Err(err) => {
            if let Some(report) = err.report() {
                display::print_report(report, args.output)?;
            }
            Err(err.into())
        }
    }
}
