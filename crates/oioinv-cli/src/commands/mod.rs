//! Subcommands and the setup they share.

pub mod batch;
pub mod config;
pub mod directory;
pub mod inspect;
pub mod process;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use oioinv_core::batch::{DeliverySink, FileSink, GraphMailSink};
use oioinv_core::models::config::SinkKind;
use oioinv_core::{AppConfig, CompanyDirectory, FieldNormalizer};

/// Options accepted by every subcommand.
pub struct GlobalOpts {
    pub config: Option<PathBuf>,
    pub default_customer_only: bool,
}

impl GlobalOpts {
    /// The explicit `--config` path, or the per-user default.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("oioinv")
        .join("config.json")
}

/// Load the configuration. An explicit path must exist; the default path
/// falls back to built-in defaults.
pub fn load_config(globals: &GlobalOpts) -> anyhow::Result<AppConfig> {
    match &globals.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(AppConfig::from_file(&path)?)
            } else {
                debug!("No config file at {}, using defaults", path.display());
                Ok(AppConfig::default())
            }
        }
    }
}

pub fn load_directory(config: &AppConfig) -> anyhow::Result<CompanyDirectory> {
    match &config.pipeline.directory_path {
        Some(path) => Ok(CompanyDirectory::from_file(path)?),
        None => Ok(CompanyDirectory::builtin()),
    }
}

/// Everything a conversion needs that must be valid before any document is touched.
pub struct Setup {
    pub config: AppConfig,
    pub directory: CompanyDirectory,
    pub normalizer: FieldNormalizer,
}

impl Setup {
    pub fn load(globals: &GlobalOpts) -> anyhow::Result<Self> {
        let config = load_config(globals)?;
        config
            .default_customer
            .validate()
            .context("The default customer record is unusable")?;
        let directory = load_directory(&config).context("The company directory could not be loaded")?;

        let default_only = globals.default_customer_only || config.pipeline.use_default_customer_only;
        let processing_date = chrono::Local::now().date_naive();
        let normalizer = FieldNormalizer::new(config.default_customer.clone(), processing_date)
            .with_default_customer_only(default_only);

        Ok(Self {
            config,
            directory,
            normalizer,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.config.pipeline.call_timeout_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.config.pipeline.extraction_timeout_secs)
    }

    /// The configured sink. `output_dir` forces the file sink into that directory.
    pub fn sink(&self, output_dir: Option<&Path>) -> anyhow::Result<Box<dyn DeliverySink>> {
        if let Some(dir) = output_dir {
            return Ok(Box::new(FileSink::new(dir)));
        }
        match self.config.output.sink {
            SinkKind::File => Ok(Box::new(FileSink::new(&self.config.output.directory))),
            SinkKind::Mail => Ok(Box::new(GraphMailSink::from_config(
                &self.config.mail,
                self.call_timeout(),
            )?)),
        }
    }
}
