//! URN resolution command.

use delegation_ledger::resolve_urn;

use crate::cli::UrnArgs;
use crate::output::{OutputFormat, print_json};

/// Run the urn command
pub fn run(args: &UrnArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let urn = resolve_urn(&args.id, args.party_type)?;

    match format {
        OutputFormat::Human => println!("{urn}"),
        OutputFormat::Json => print_json(&serde_json::json!({
            "urn": urn,
            "partyType": urn.party_type(),
            "partyId": urn.party_id(),
        }))?,
    }

    Ok(())
}
