//! Inspect command - summarize a rendered OIOUBL invoice.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;

use oioinv_core::parse_invoice_summary;

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// OIOUBL invoice XML file
    #[arg(required = true)]
    input: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.input)?;
    let summary = parse_invoice_summary(&content)
        .map_err(|e| anyhow::anyhow!("{}: {}", args.input.display(), e))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} {}", style("Invoice").bold(), summary.invoice_number);
    println!("  UUID:      {}", summary.uuid);
    if let Some(date) = summary.issue_date {
        println!("  Issued:    {}", date);
    }
    println!("  Supplier:  {}", summary.supplier_name.as_deref().unwrap_or("-"));
    println!("  Customer:  {}", summary.customer_name.as_deref().unwrap_or("-"));
    println!("  Lines:     {}", summary.line_count);
    println!("  Net:       {} {}", summary.line_extension, summary.currency);
    println!("  Tax:       {} {}", summary.tax_total, summary.currency);
    println!("  Incl. tax: {} {}", summary.tax_inclusive, summary.currency);
    println!("  Payable:   {} {}", summary.payable, summary.currency);

    Ok(())
}
