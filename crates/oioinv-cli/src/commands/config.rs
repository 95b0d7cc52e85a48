//! Config command - manage configuration.

use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use console::style;

use oioinv_core::AppConfig;

use super::{GlobalOpts, load_config, load_directory};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "extraction.model")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },

    /// Check that the configuration can drive a run
    Check,

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: ConfigArgs, globals: &GlobalOpts) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(globals),
        ConfigCommand::Init(init_args) => init_config(init_args, globals),
        ConfigCommand::Get { key } => get_config(&key, globals),
        ConfigCommand::Set { key, value } => set_config(&key, &value, globals),
        ConfigCommand::Check => check_config(globals),
        ConfigCommand::Path => show_path(globals),
    }
}

fn show_config(globals: &GlobalOpts) -> anyhow::Result<()> {
    if !globals.config_path().exists() {
        eprintln!(
            "{} No config file found, showing defaults.",
            style("ℹ").blue()
        );
    }
    let config = load_config(globals)?;
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}

fn init_config(args: InitArgs, globals: &GlobalOpts) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or_else(|| globals.config_path());

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    AppConfig::default().save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );

    Ok(())
}

fn get_config(key: &str, globals: &GlobalOpts) -> anyhow::Result<()> {
    let config = load_config(globals)?;
    let json = serde_json::to_value(&config)?;

    let mut current = &json;
    for part in key.split('.') {
        current = current
            .get(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))?;
    }

    println!("{}", serde_json::to_string_pretty(current)?);

    Ok(())
}

fn set_config(key: &str, value: &str, globals: &GlobalOpts) -> anyhow::Result<()> {
    let config_path = globals.config_path();
    let config = if config_path.exists() {
        AppConfig::from_file(&config_path)?
    } else {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        AppConfig::default()
    };

    // Bare words are taken as strings
    let parsed_value: serde_json::Value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));

    let mut json = serde_json::to_value(&config)?;
    let parts: Vec<&str> = key.split('.').collect();
    let mut current = &mut json;

    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            match current.as_object_mut() {
                Some(obj) if obj.contains_key(*part) => {
                    obj.insert((*part).to_string(), parsed_value.clone());
                }
                Some(_) => anyhow::bail!("Configuration key not found: {}", key),
                None => anyhow::bail!("Cannot set value at non-object path"),
            }
        } else {
            current = current
                .get_mut(*part)
                .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
        }
    }

    let config: AppConfig = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))?;
    config.save(&config_path)?;

    println!(
        "{} Set {} = {}",
        style("✓").green(),
        key,
        serde_json::to_string(&parsed_value)?
    );

    Ok(())
}

fn check_config(globals: &GlobalOpts) -> anyhow::Result<()> {
    let config = load_config(globals)?;
    let mut problems = 0;

    match config.default_customer.validate() {
        Ok(()) => println!("{} Default customer: {}", style("✓").green(), config.default_customer.name),
        Err(e) => {
            problems += 1;
            println!("{} {}", style("✗").red(), e);
        }
    }

    match load_directory(&config) {
        Ok(directory) => println!(
            "{} Company directory: {} companies",
            style("✓").green(),
            directory.len()
        ),
        Err(e) => {
            problems += 1;
            println!("{} {:#}", style("✗").red(), e);
        }
    }

    if std::env::var(&config.extraction.api_key_env).is_ok() {
        println!(
            "{} {} is set (model {})",
            style("✓").green(),
            config.extraction.api_key_env,
            config.extraction.model
        );
    } else {
        println!(
            "{} {} is not set; PDF extraction will fail",
            style("!").yellow(),
            config.extraction.api_key_env
        );
    }

    if problems > 0 {
        anyhow::bail!("{} configuration problem(s) found", problems);
    }
    Ok(())
}

fn show_path(globals: &GlobalOpts) -> anyhow::Result<()> {
    let config_path = globals.config_path();

    println!("Configuration file: {}", config_path.display());

    if config_path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'oioinv config init' to create a configuration file.");
    }

    Ok(())
}
