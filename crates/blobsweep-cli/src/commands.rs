use std::path::Path;
use std::process::ExitCode;

use colored::Colorize;
use tracing::debug;

use blobsweep_config::load_file;
use blobsweep_store::StorageRegistry;
use blobsweep_verify::{verify_store, ConsoleReporter, VerifyError, VerifyOptions, VerifyReport};

use crate::cli::Cli;

const UNRECOGNIZED: &str =
    "I do not recognize the format of this server config, and cannot continue.";

pub async fn run(cli: Cli) -> ExitCode {
    match sweep(&cli.config).await {
        Ok(report) => {
            if let Some(err) = &report.stream_error {
                eprintln!("{}", explain_failure(err));
            }
            ExitCode::from(report.outcome().exit_code())
        }
        Err(err) => {
            eprintln!("{}", explain(&err));
            ExitCode::FAILURE
        }
    }
}

async fn sweep(config: &Path) -> anyhow::Result<VerifyReport> {
    let doc = load_file(config)?;
    debug!(path = %config.display(), "server config loaded");
    let mut reporter = ConsoleReporter::stdout();
    let report = verify_store(
        doc,
        StorageRegistry::with_builtins(),
        &VerifyOptions::default(),
        &mut reporter,
    )
    .await?;
    Ok(report)
}

/// The stderr text for a failed run.
fn explain(err: &anyhow::Error) -> String {
    match err.downcast_ref::<VerifyError>() {
        Some(failure) => explain_failure(failure),
        None => format!("{} {err}", tag()),
    }
}

fn explain_failure(err: &VerifyError) -> String {
    let tag = tag();
    match err {
        VerifyError::Config(e) => format!(
            "{tag} {UNRECOGNIZED}\n\nHere's specifically what surprised me in the config:\n\n\t{e}"
        ),
        VerifyError::MissingEntryPoint { prefix } => format!(
            "{tag} {UNRECOGNIZED}\n\nSpecifically, I expect the config to contain a {prefix:?} prefix, and it does not."
        ),
        VerifyError::Unsupported { handler } => format!(
            "{tag} the {handler:?} storage is not supported.\n\n\
             I can only verify storage that can stream the contents of all its blobs."
        ),
        other => format!("{tag} {other}"),
    }
}

fn tag() -> colored::ColoredString {
    "blobsweep:".red().bold()
}
