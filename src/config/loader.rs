use super::{Args, OperatorConfig, Settings};
use crate::error::Result;
use config::{Config, Environment, File, FileFormat};
use std::path::PathBuf;

/// Configuration loader with builder pattern
#[derive(Default)]
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
    cli_override: Option<Args>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML file; a given path must exist
    pub fn load_from_file(mut self, path: Option<PathBuf>) -> Self {
        self.config_file = path;
        self
    }

    /// Read `MSO_`-prefixed environment variables, `__` separating nested keys
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Apply flags given on the command line
    pub fn load_from_cli(mut self, args: Args) -> Self {
        if self.config_file.is_none() {
            self.config_file = args.config.clone();
        }
        self.cli_override = Some(args);
        self
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<OperatorConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = &self.config_file {
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("MSO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        if let Some(args) = self.cli_override {
            builder = builder
                .set_override_option("instance_selector", args.instance_selector)?
                .set_override_option("namespace", args.namespace)?
                .set_override_option("workers", args.workers)?
                .set_override_option("resync_interval_secs", args.resync_interval_secs)?
                .set_override_option("log.level", args.log_level)?
                .set_override_option("log.format", args.log_format.map(|f| f.as_str()))?
                .set_override_option(
                    "log.directory",
                    args.log_directory
                        .map(|p| p.to_string_lossy().into_owned()),
                )?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()
    }
}
