//! pdiff CLI library
//!
//! Command-line front end for pdiff: loads `test*.yaml` suites, starts the
//! instrumentation proxy, drives Chromium and reports per-test outcomes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
pub mod logging;
mod output;
pub mod proxy;
pub mod proxy_process;
pub mod runner;

pub use commands::{BrowserArg, Cli, ColorArg, Commands, ProxyArgs, RunArgs, SelectArgs};
pub use config::{CliConfig, ColorChoice, Verbosity, DEFAULT_PROXY_PORT};
pub use error::{CliError, CliResult};
pub use output::{format_listing, ProgressReporter};
pub use proxy::{HeadInjector, ProxyConfig};
pub use proxy_process::ProxyProcess;

/// Run a parsed command line to completion
pub fn execute(cli: Cli) -> CliResult<()> {
    let verbosity = cli.verbosity();
    let color = ColorChoice::from(cli.color);
    logging::init(verbosity, color);
    let config = CliConfig::new().with_verbosity(verbosity).with_color(color);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli.command, config))
}

async fn dispatch(command: Commands, config: CliConfig) -> CliResult<()> {
    match command {
        Commands::List(select) => {
            let config = select.apply(config);
            let classes = runner::load_selection(&select.path, &config)?;
            print!("{}", format_listing(&classes, config.verbosity.is_verbose()));
            Ok(())
        }
        Commands::Test(args) => run_mode(args.apply(config), &args, false).await,
        Commands::Update(args) => run_mode(args.apply(config), &args, true).await,
        Commands::Interactive(args) => interactive(args.apply(config), &args).await,
        Commands::Proxy(args) => {
            let mut proxy = ProxyConfig::new(args.port).with_upstream_scheme(args.upstream_scheme);
            if let Some(host) = args.default_host {
                proxy = proxy.with_default_host(host);
            }
            proxy::run(proxy).await
        }
    }
}

#[cfg(feature = "browser")]
async fn run_mode(config: CliConfig, args: &RunArgs, update: bool) -> CliResult<()> {
    let mode = if update {
        pdiff::RunMode::Update
    } else {
        pdiff::RunMode::Verify
    };
    let report = runner::run_suite(&config, args, mode).await?;
    runner::ensure_passed(&report)
}

#[cfg(feature = "browser")]
async fn interactive(config: CliConfig, args: &RunArgs) -> CliResult<()> {
    runner::run_interactive(&config, args).await
}

#[cfg(not(feature = "browser"))]
async fn run_mode(config: CliConfig, args: &RunArgs, _update: bool) -> CliResult<()> {
    runner::load_selection(&args.select.path, &config)?;
    Err(no_browser())
}

#[cfg(not(feature = "browser"))]
async fn interactive(config: CliConfig, args: &RunArgs) -> CliResult<()> {
    runner::load_selection(&args.select.path, &config)?;
    Err(no_browser())
}

#[cfg(not(feature = "browser"))]
fn no_browser() -> CliError {
    CliError::config("built without browser support; rebuild with --features browser")
}
