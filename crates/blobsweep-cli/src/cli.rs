use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "blobsweep",
    about = "Verify that every blob in a blob store matches its hash",
    version
)]
pub struct Cli {
    /// Path to the blob server config file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

const EXAMPLE: &str = "Example: blobsweep ~/.config/blobserver/server-config.json";

/// Report a bad command line. Help and version requests are not failures.
pub fn usage_error(err: clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("{}", err.render());
            eprintln!("{EXAMPLE}");
            ExitCode::FAILURE
        }
    }
}
