//! Error classification command - shows codes in the order a host should surface them.

use delegation_ledger::classify::{ErrorCode, classify, headline, prioritize};

use crate::cli::ClassifyArgs;
use crate::output::{OutputFormat, print_json, print_table};

/// Run the classify command
pub fn run(args: &ClassifyArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let codes: Vec<ErrorCode> = args.codes.iter().map(|raw| classify(raw)).collect();
    let ordered = prioritize(&codes);
    let top = headline(&codes);

    match format {
        OutputFormat::Human => {
            let rows: Vec<Vec<String>> = ordered
                .iter()
                .map(|code| vec![code.priority().to_string(), code.to_string()])
                .collect();
            print_table(&["PRIORITY", "CODE"], &rows);
            if let Some(code) = top {
                println!();
                println!("Headline: {code}");
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "codes": ordered,
            "headline": top,
        }))?,
    }

    Ok(())
}
