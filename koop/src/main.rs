mod application;
mod interrupt;
mod logging;
mod options;
mod selector;
mod sync;
mod traverse;

use std::process::exit;

use anyhow::{bail, Result};
use application::{handle_result, run_sync, Command};
use clap::{ColorChoice, CommandFactory as _, Parser, Subcommand};
use options::Options;
use selector::Selector;

fn main() {
    let args = parse_args(std::env::args_os());
    let log_options = match &args {
        Ok(args) => logging::Options {
            verbose: args.options.verbose,
            color: args.options.use_color(),
        },
        Err(_) => logging::Options {
            verbose: false,
            color: options::color_enabled(ColorChoice::Auto),
        },
    };
    let _logger = match logging::set_up(log_options) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("koop error: {:#}", e);
            exit(1);
        }
    };
    handle_result(args.and_then(run_args));
}

/// Parse the command line. `--help` and `--version` print and exit as
/// usual; usage errors are returned so they are logged like any other.
fn parse_args<I, T>(argv: I) -> Result<Args>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Args::try_parse_from(argv) {
        Ok(args) => Ok(args),
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => bail!("{}", e.render().to_string().trim_end()),
    }
}

fn run_args(args: Args) -> Result<()> {
    match &args.command {
        Commands::Pull(target) => sync_command(&args.options, Command::Pull, target),
        Commands::Push(target) => sync_command(&args.options, Command::Push, target),
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "koop", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn sync_command(options: &Options, command: Command, target: &Target) -> Result<()> {
    let selector = target.selector();
    let interrupt = interrupt::set_up_process_interrupt_handler()?;
    let summary = run_sync(&interrupt, options, command, &selector)?;
    tracing::info!("{:?} {}: {} objects", command, selector, summary.objects);
    Ok(())
}

/// koop: file based kubernetes operations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    options: Options,
}

/// Which objects to operate on. Each position may be `-` (or `*`) to mean
/// all of them.
#[derive(clap::Args, Debug)]
struct Target {
    /// Cluster, as in `<config-dir>/cluster-<CLUSTER>.yaml`
    cluster: String,
    namespace: String,
    /// Resource kind, e.g. `deployment` or `configmap`
    kind: String,
    /// Object name, the file `<NAME>.yaml` in the kind directory
    name: String,
}

impl Target {
    fn selector(&self) -> Selector {
        Selector::parse(&self.cluster, &self.namespace, &self.kind, &self.name)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull resources from a cluster into `<cluster>/<namespace>/<kind>/<name>.yaml`
    Pull(Target),

    /// Push resources from the file tree to a cluster
    Push(Target),

    /// Generate a manpage for koop
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion for koop
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
