use std::process::exit;

use anyhow::Result;
use koop_core::Registry;
use koop_kube::{KubeConnector, Profiles};

use crate::interrupt::InterruptState;
use crate::options::Options;
use crate::selector::Selector;
use crate::sync::{self, Summary, SyncContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pull,
    Push,
}

/// Run `pull` or `push` against the clusters configured in `options`.
pub fn run_sync(
    interrupt: &InterruptState,
    options: &Options,
    command: Command,
    selector: &Selector,
) -> Result<Summary> {
    let registry = Registry::builtin();
    // Before reading any configuration.
    selector.validate(&registry)?;
    let connector = KubeConnector::new(Profiles::new(options.config_dir()?))?;
    let ctx = SyncContext {
        root: &options.root,
        registry: &registry,
        connector: &connector,
        run: options.run_config(),
        interrupt,
    };
    match command {
        Command::Pull => sync::pull(&ctx, selector),
        Command::Push => sync::push(&ctx, selector),
    }
}

/// Log the final line of a run and exit with code 1 on failure.
pub fn handle_result(r: Result<()>) {
    match r {
        Ok(()) => tracing::info!("exited"),
        Err(e) => {
            tracing::error!("exited with error: {:#}", e);
            exit(1);
        }
    }
}
