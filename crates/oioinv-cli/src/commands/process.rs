//! Process command - convert a single invoice.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use oioinv_core::extract::response::{extraction_from_reply, parse_reply};
use oioinv_core::extract::{FieldExtractor, OpenAiFieldExtractor, PdfTextExtractor, TextExtractor};
use oioinv_core::{
    InvoiceCompiler, RawExtraction, Severity, UsageLedger, UsageLog, ValidationReport, Validator,
};

use super::{GlobalOpts, Setup};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF
    #[arg(required_unless_present = "fields")]
    input: Option<PathBuf>,

    /// Use a stored extraction reply (flat JSON) instead of calling the extraction service
    #[arg(long)]
    fields: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Send the result through the configured sink instead of printing it
    #[arg(long, conflicts_with = "output")]
    deliver: bool,
}

pub async fn run(args: ProcessArgs, globals: &GlobalOpts) -> anyhow::Result<()> {
    let start = Instant::now();
    let setup = Setup::load(globals)?;
    let mut ledger = UsageLedger::new(setup.config.pricing.clone());

    let usage = UsageLog::new();
    let raw = match (&args.fields, &args.input) {
        (Some(fields_path), _) => {
            let content = fs::read_to_string(fields_path)?;
            let reply = parse_reply(&content)
                .map_err(|e| anyhow::anyhow!("{}: {}", fields_path.display(), e))?;
            extraction_from_reply(&reply)
        }
        (None, Some(input)) => extract(input, &setup, &usage).await?,
        (None, None) => anyhow::bail!("Either an input PDF or --fields is required"),
    };
    ledger.record_all(&usage.take());

    let fields = setup.normalizer.normalize(&raw)?;
    let validated = Validator::new(&setup.directory).validate(fields);
    print_diagnostics(&validated.report);

    let (invoice, xml) = InvoiceCompiler::new().compile_to_xml(validated)?;
    info!("Compiled invoice {}", invoice.fields.invoice_number);

    if args.deliver {
        let sink = setup.sink(None)?;
        let name = oioinv_core::batch::output_file_name(&invoice.fields.invoice_number);
        let output = sink.deliver(&name, xml.as_bytes()).await?;
        eprintln!("{} Delivered to {}", style("✓").green(), output);
    } else if let Some(output_path) = &args.output {
        fs::write(output_path, &xml)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", xml);
    }

    eprintln!(
        "{} Invoice {}: {} lines, payable {} {}",
        style("ℹ").blue(),
        invoice.fields.invoice_number,
        invoice.lines.len(),
        invoice.amount_after_tax(),
        invoice.fields.currency
    );
    let usage = ledger.snapshot();
    if usage.calls > 0 {
        eprintln!(
            "{} {} tokens, estimated cost ${:.4}",
            style("ℹ").blue(),
            usage.total_tokens,
            usage.estimated_cost
        );
    }
    eprintln!("{} Done in {:?}", style("ℹ").blue(), start.elapsed());

    Ok(())
}

async fn extract(input: &Path, setup: &Setup, usage: &UsageLog) -> anyhow::Result<RawExtraction> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);

    pb.set_message("Extracting text");
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = fs::read(input)?;
    let text = PdfTextExtractor::new().extract_text(&name, bytes).await?;

    pb.set_message("Extracting invoice fields");
    let extractor = OpenAiFieldExtractor::new(setup.config.extraction.clone(), setup.call_timeout())?;
    let limit = setup.extraction_timeout();
    let raw = tokio::time::timeout(limit, extractor.extract_fields(&text, usage))
        .await
        .map_err(|_| anyhow::anyhow!("field extraction timed out after {:?}", limit))??;

    pb.finish_and_clear();
    Ok(raw)
}

fn print_diagnostics(report: &ValidationReport) {
    if report.diagnostics.is_empty() {
        return;
    }
    eprintln!("{}", style("Validation:").yellow());
    for diagnostic in &report.diagnostics {
        let marker = match diagnostic.severity {
            Severity::Error => style("error").red(),
            Severity::Warning => style("warning").yellow(),
        };
        eprintln!("  {} {}", marker, diagnostic);
    }
}
