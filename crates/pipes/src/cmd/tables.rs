//! Tables command - List available tables

use anyhow::Result;
use clap::Args;
use pipes_connectors::Table;

/// Tables command arguments
#[derive(Args, Debug)]
pub struct TablesArgs {
    /// Print the listing as JSON
    #[arg(long)]
    json: bool,
}

/// Run the tables command
pub fn run(args: TablesArgs) -> Result<()> {
    if args.json {
        let tables: Vec<_> = Table::ALL.iter().map(describe).collect();
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    for table in Table::ALL {
        println!("{:<26} {}", table.name(), table.description());
        if !table.get_keys().is_empty() {
            println!("{:<26}   get by: {}", "", table.get_keys().join(", "));
        }
        if !table.list_quals().is_empty() {
            println!("{:<26}   filter: {}", "", table.list_quals().join(", "));
        }
    }
    Ok(())
}

fn describe(table: &Table) -> serde_json::Value {
    serde_json::json!({
        "name": table.name(),
        "description": table.description(),
        "get_keys": table.get_keys(),
        "list_quals": table.list_quals(),
    })
}
