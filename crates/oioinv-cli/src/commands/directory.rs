//! Directory command - query the company directory.

use clap::{Args, Subcommand};
use console::style;

use super::{GlobalOpts, load_config, load_directory};

/// Arguments for the directory command.
#[derive(Args)]
pub struct DirectoryArgs {
    #[command(subcommand)]
    command: DirectoryCommand,
}

#[derive(Subcommand)]
enum DirectoryCommand {
    /// Resolve a company name to its CVR and GLN
    Lookup {
        /// Company name as printed on an invoice
        name: String,
    },
}

pub fn run(args: DirectoryArgs, globals: &GlobalOpts) -> anyhow::Result<()> {
    let config = load_config(globals)?;
    let directory = load_directory(&config)?;

    match args.command {
        DirectoryCommand::Lookup { name } => {
            let Some(entry) = directory.lookup(&name) else {
                anyhow::bail!("No directory entry for '{}'", name);
            };
            println!("{} {}", style("✓").green(), entry.key);
            println!("  CVR: {}", entry.cvr.as_deref().unwrap_or("-"));
            println!("  GLN: {}", entry.gln.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}
