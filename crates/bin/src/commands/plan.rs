//! Plan command - computes the delta a scenario would reconcile.

use delegation_ledger::{DelegationSession, InMemoryClient};

use crate::cli::PlanArgs;
use crate::output::{OutputFormat, keys_cell, print_json, print_table};
use crate::scenario::Scenario;

/// Run the plan command
pub async fn run(args: &PlanArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = Scenario::load(&args.scenario).await?;

    let session = if scenario.load_baseline {
        let client = InMemoryClient::load_from_file(&args.state.state).await?;
        scenario.prepare(Some(&client)).await?
    } else {
        scenario.prepare(None).await?
    };

    print_plan(&session, format)
}

fn print_plan(session: &DelegationSession, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let plan = session.plan();

    match format {
        OutputFormat::Human => {
            if plan.is_empty() {
                println!("No changes staged.");
                return Ok(());
            }
            let ledger = session.ledger();
            let rows: Vec<Vec<String>> = plan
                .iter()
                .map(|(id, delta)| {
                    let kind = ledger
                        .entity(id)
                        .map_or_else(|| "-".to_string(), |entity| entity.kind.to_string());
                    let status = ledger
                        .status(id)
                        .map_or_else(|| "-".to_string(), |status| status.to_string());
                    vec![
                        id.to_string(),
                        kind,
                        status,
                        keys_cell(&delta.to_grant),
                        keys_cell(&delta.to_revoke),
                    ]
                })
                .collect();
            print_table(&["RESOURCE", "KIND", "STATUS", "GRANT", "REVOKE"], &rows);
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "plan": plan,
            "snapshot": session.snapshot(),
        }))?,
    }

    Ok(())
}
