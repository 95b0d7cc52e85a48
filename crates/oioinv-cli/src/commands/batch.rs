//! Batch command - convert every PDF in a folder.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use oioinv_core::batch::LocalFolderSource;
use oioinv_core::extract::{OpenAiFieldExtractor, PdfTextExtractor};
use oioinv_core::{BatchOrchestrator, BatchReport, ItemOutcome, Outcome, UsageLedger};

use super::{GlobalOpts, Setup};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Folder with PDF invoices
    #[arg(required = true)]
    input: PathBuf,

    /// Write XML files here instead of the configured sink
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Also write a CSV summary
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Also write the full report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

pub async fn run(args: BatchArgs, globals: &GlobalOpts) -> anyhow::Result<()> {
    let start = Instant::now();
    let setup = Setup::load(globals)?;

    let documents = LocalFolderSource::new(&args.input).documents()?;
    if documents.is_empty() {
        anyhow::bail!("No PDF files found in {}", args.input.display());
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        documents.len()
    );

    let sink = setup.sink(args.output_dir.as_deref())?;
    let field_extractor =
        OpenAiFieldExtractor::new(setup.config.extraction.clone(), setup.call_timeout())?;
    if !field_extractor.has_api_key() {
        eprintln!(
            "{} {} is not set; field extraction will fail for every document",
            style("!").yellow(),
            setup.config.extraction.api_key_env
        );
    }

    let call_timeout = setup.call_timeout();
    let extraction_timeout = setup.extraction_timeout();
    let Setup {
        config,
        directory,
        normalizer,
    } = setup;
    let orchestrator = BatchOrchestrator::new(
        directory,
        normalizer,
        Box::new(PdfTextExtractor::new()),
        Box::new(field_extractor),
        sink,
    )
    .with_call_timeout(call_timeout)
    .with_extraction_timeout(extraction_timeout);

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut ledger = UsageLedger::new(config.pricing.clone());
    let report = orchestrator
        .run_with(&documents, &mut ledger, |item| {
            pb.println(format_item(item));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    if let Some(path) = &args.summary {
        write_summary(path, &report)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            path.display()
        );
    }
    if let Some(path) = &args.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!(
            "{} Report written to {}",
            style("✓").green(),
            path.display()
        );
    }

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        report.total,
        start.elapsed()
    );
    println!(
        "   {} successful, {} failed",
        style(report.succeeded).green(),
        style(report.failed).red()
    );
    println!(
        "   {} tokens ({} prompt, {} completion), estimated cost ${:.4}",
        report.usage.total_tokens,
        report.usage.prompt_tokens,
        report.usage.completion_tokens,
        report.usage.estimated_cost
    );

    Ok(())
}

fn format_item(item: &ItemOutcome) -> String {
    match &item.outcome {
        Outcome::Success {
            output, warnings, ..
        } => {
            let mut line = format!("{} {} -> {}", style("✓").green(), item.name, output);
            if !warnings.is_empty() {
                line.push_str(&format!(" ({} warnings)", warnings.len()));
            }
            line
        }
        Outcome::Failure { kind, summary, .. } => {
            format!("{} {} [{}] {}", style("✗").red(), item.name, kind, summary)
        }
    }
}

fn write_summary(path: &Path, report: &BatchReport) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "invoice_number",
        "output",
        "failure_kind",
        "message",
        "warnings",
    ])?;

    for item in &report.items {
        match &item.outcome {
            Outcome::Success {
                invoice_number,
                output,
                warnings,
            } => {
                let warnings: Vec<String> = warnings.iter().map(ToString::to_string).collect();
                let warnings = warnings.join("; ");
                wtr.write_record([
                    item.name.as_str(),
                    "success",
                    invoice_number.as_str(),
                    output.as_str(),
                    "",
                    "",
                    warnings.as_str(),
                ])?;
            }
            Outcome::Failure { kind, summary, .. } => {
                wtr.write_record([
                    item.name.as_str(),
                    "error",
                    "",
                    "",
                    kind.as_str(),
                    summary.as_str(),
                    "",
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
