//! CLI command definitions using clap

use crate::config::{CliConfig, ColorChoice, Verbosity, DEFAULT_PROXY_PORT};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pdiff: perceptual-diff screenshot tests for web pages
#[derive(Parser, Debug)]
#[command(name = "pdiff")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only failures)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Verbosity from `-v`/`-q`
    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare screenshots against the stored baselines
    Test(RunArgs),

    /// Capture new baselines
    Update(RunArgs),

    /// List matched tests
    List(SelectArgs),

    /// Open each test in a visible browser, one at a time
    Interactive(RunArgs),

    /// Run the instrumentation proxy (started by test/update)
    #[command(hide = true)]
    Proxy(ProxyArgs),
}

/// Which tests to operate on
#[derive(Args, Debug, Clone)]
pub struct SelectArgs {
    /// Directory holding test*.yaml files
    pub path: PathBuf,

    /// Only tests matching these comma-separated patterns (regex, case-insensitive)
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Only classes matching these comma-separated patterns (regex, case-insensitive)
    #[arg(short, long)]
    pub classname: Option<String>,
}

/// Arguments for commands that drive a browser
#[derive(Args, Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Test selection
    #[command(flatten)]
    pub select: SelectArgs,

    /// Browser to drive
    #[arg(short, long, default_value = "chrome")]
    pub browser: BrowserArg,

    /// Path to the browser binary
    #[arg(long)]
    pub browser_path: Option<String>,

    /// Disable the browser sandbox (containers, CI)
    #[arg(long)]
    pub no_sandbox: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Baseline image directory (default: the test directory)
    #[arg(short, long)]
    pub image_dir: Option<PathBuf>,

    /// Pause after each page settles, in milliseconds
    #[arg(short, long, default_value = "0")]
    pub delay: u64,

    /// Instrumentation proxy port
    #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
    pub proxy_port: u16,

    /// Load pages directly instead of through the proxy
    #[arg(long)]
    pub no_proxy: bool,
}

/// Arguments for the hidden proxy command
#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// Listen port
    #[arg(long, default_value_t = DEFAULT_PROXY_PORT)]
    pub port: u16,

    /// Host for requests that name none
    #[arg(long)]
    pub default_host: Option<String>,

    /// Scheme for upstream requests
    #[arg(long, default_value = "http")]
    pub upstream_scheme: String,
}

/// Supported browsers
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BrowserArg {
    /// Chrome or Chromium over the DevTools protocol
    #[default]
    #[value(alias = "chromium")]
    Chrome,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

impl SelectArgs {
    /// Apply the filters to `config`
    #[must_use]
    pub fn apply(&self, mut config: CliConfig) -> CliConfig {
        if let Some(ref filter) = self.filter {
            config = config.with_name_filter(filter.clone());
        }
        if let Some(ref classname) = self.classname {
            config = config.with_class_filter(classname.clone());
        }
        config
    }
}

impl RunArgs {
    /// Apply selection, image dir, delay and proxy settings to `config`
    #[must_use]
    pub fn apply(&self, config: CliConfig) -> CliConfig {
        let mut config = self
            .select
            .apply(config)
            .with_delay_ms(self.delay)
            .with_proxy_port(self.proxy_port)
            .with_no_proxy(self.no_proxy);
        if let Some(ref dir) = self.image_dir {
            config = config.with_image_dir(dir.clone());
        }
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_test_command() {
            let cli = Cli::parse_from(["pdiff", "test", "suite"]);
            let Commands::Test(args) = cli.command else {
                panic!("expected Test command");
            };
            assert_eq!(args.select.path, PathBuf::from("suite"));
            assert_eq!(args.browser, BrowserArg::Chrome);
            assert_eq!(args.proxy_port, DEFAULT_PROXY_PORT);
            assert!(!args.no_proxy);
        }

        #[test]
        fn test_parse_filters() {
            let cli = Cli::parse_from(["pdiff", "list", "suite", "-f", "about,^index", "-c", "home"]);
            let Commands::List(args) = cli.command else {
                panic!("expected List command");
            };
            assert_eq!(args.filter.as_deref(), Some("about,^index"));
            assert_eq!(args.classname.as_deref(), Some("home"));
        }

        #[test]
        fn test_parse_update_with_options() {
            let cli = Cli::parse_from([
                "pdiff",
                "update",
                "suite",
                "--image-dir",
                "shots",
                "--delay",
                "250",
                "--proxy-port",
                "6060",
                "--no-proxy",
                "--browser",
                "chromium",
            ]);
            let Commands::Update(args) = cli.command else {
                panic!("expected Update command");
            };
            assert_eq!(args.image_dir, Some(PathBuf::from("shots")));
            assert_eq!(args.delay, 250);
            assert_eq!(args.proxy_port, 6060);
            assert!(args.no_proxy);
        }

        #[test]
        fn test_parse_interactive() {
            let cli = Cli::parse_from(["pdiff", "interactive", "suite"]);
            assert!(matches!(cli.command, Commands::Interactive(_)));
        }

        #[test]
        fn test_parse_proxy() {
            let cli = Cli::parse_from(["pdiff", "proxy", "--port", "7000", "--default-host", "example.com"]);
            let Commands::Proxy(args) = cli.command else {
                panic!("expected Proxy command");
            };
            assert_eq!(args.port, 7000);
            assert_eq!(args.default_host.as_deref(), Some("example.com"));
            assert_eq!(args.upstream_scheme, "http");
        }

        #[test]
        fn test_unknown_browser_rejected() {
            assert!(Cli::try_parse_from(["pdiff", "test", "suite", "--browser", "lynx"]).is_err());
        }

        #[test]
        fn test_path_required() {
            assert!(Cli::try_parse_from(["pdiff", "test"]).is_err());
        }

        #[test]
        fn test_global_verbosity() {
            let cli = Cli::parse_from(["pdiff", "list", "suite", "-vv"]);
            assert_eq!(cli.verbosity(), Verbosity::Debug);
            let cli = Cli::parse_from(["pdiff", "-q", "list", "suite"]);
            assert_eq!(cli.verbosity(), Verbosity::Quiet);
        }
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_run_args_apply() {
            let cli = Cli::parse_from([
                "pdiff", "test", "suite", "-f", "about", "-i", "img", "--delay", "10",
            ]);
            let Commands::Test(args) = cli.command else {
                panic!("expected Test command");
            };
            let config = args.apply(CliConfig::new());
            assert_eq!(config.name_filter.as_deref(), Some("about"));
            assert_eq!(config.image_dir, Some(PathBuf::from("img")));
            assert_eq!(config.delay_ms, 10);
        }

        #[test]
        fn test_color_arg_conversion() {
            assert_eq!(ColorChoice::from(ColorArg::Auto), ColorChoice::Auto);
            assert_eq!(ColorChoice::from(ColorArg::Always), ColorChoice::Always);
            assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
        }
    }
}
