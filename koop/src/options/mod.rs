use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, ColorChoice, Parser};
use koop_core::RunConfig;

/// Name of the per-user configuration directory, under the home directory.
const CONFIG_DIR_NAME: &str = ".koop";

#[derive(Parser, Debug, Clone)]
pub struct Options {
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    #[arg(long, global = true, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Do not touch objects that already exist; only create missing ones
    #[arg(long, global = true, env = "KOOP_NO_UPDATE", value_parser = BoolishValueParser::new())]
    pub no_update: bool,

    /// Create workloads with zero replicas
    #[arg(long, global = true, env = "KOOP_ZERO_REPLICAS", value_parser = BoolishValueParser::new())]
    pub zero_replicas: bool,

    /// Directory holding the `cluster-<name>.yaml` connection profiles
    /// [default: ~/.koop]
    #[arg(long, global = true, env = "KOOP_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Root of the local file tree
    #[arg(long, global = true, env = "KOOP_ROOT", default_value = ".")]
    pub root: PathBuf,
}

impl Options {
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            no_update: self.no_update,
            zero_replicas: self.zero_replicas,
        }
    }

    pub fn config_dir(&self) -> Result<PathBuf> {
        match &self.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::home_dir()
                .context("could not determine the home directory; set --config-dir")?
                .join(CONFIG_DIR_NAME)),
        }
    }

    pub fn use_color(&self) -> bool {
        color_enabled(self.color)
    }
}

/// Whether log output on stderr gets colors.
pub fn color_enabled(choice: ColorChoice) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
    }
}
