//! Apply command - reconciles a scenario against the persisted in-memory backend.

use std::sync::Arc;

use delegation_ledger::{
    InMemoryClient, ReconciliationResult, Reconciler,
    reconcile::{Outcome, ReconcileConfig},
};
use tokio_util::sync::CancellationToken;

use crate::cli::ApplyArgs;
use crate::output::{OutputFormat, print_json, print_table};
use crate::scenario::Scenario;

/// Run the apply command
///
/// Exits with status 1 if any entity failed, after the backend state is saved.
pub async fn run(args: &ApplyArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(&args.scenario).await?;
    let state_path = &args.state.state;

    let client = Arc::new(InMemoryClient::load_from_file(state_path).await?);
    tracing::info!("Using in-memory backend with persistence at {}", state_path.display());

    let mut session = scenario.prepare(Some(&*client)).await?;

    // Ctrl+C discards results of calls already in flight.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling reconciliation");
            signal_token.cancel();
        }
    });

    let reconciler =
        Reconciler::new(ReconcileConfig::default().with_max_concurrent_resources(args.max_concurrency));
    let result = reconciler
        .reconcile(&mut session, client.clone(), Some(&cancel))
        .await;

    // Calls that completed are real, so the backend is saved even on cancellation.
    client.save_to_file(state_path).await?;
    let result = result?;

    print_result(&result, format)?;

    if result.report().is_some_and(|report| !report.is_complete_success()) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_result(result: &ReconciliationResult, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Human => {
            let Some(report) = result.report() else {
                println!("No changes to apply.");
                return Ok(());
            };
            let rows: Vec<Vec<String>> = report
                .outcomes()
                .iter()
                .map(|outcome| {
                    let result = match outcome.outcome {
                        Outcome::Succeeded => "ok".to_string(),
                        Outcome::Failed(code) => format!("failed: {code}"),
                    };
                    let status = outcome
                        .status
                        .map_or_else(|| "-".to_string(), |status| status.to_string());
                    vec![
                        outcome.id.to_string(),
                        outcome.change.to_string(),
                        result,
                        status,
                    ]
                })
                .collect();
            print_table(&["RESOURCE", "CHANGE", "RESULT", "STATUS"], &rows);

            println!();
            println!(
                "{} succeeded, {} failed",
                report.succeeded().len(),
                report.failed().len()
            );
            if let Some(code) = report.headline_error() {
                println!("Headline error: {code}");
            }
        }
        OutputFormat::Json => print_json(result)?,
    }

    Ok(())
}
