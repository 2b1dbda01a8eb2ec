//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default port for the instrumentation proxy
pub const DEFAULT_PROXY_PORT: u16 = 5050;

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - failures only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - per-unit detail
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Level from repeated `-v` flags, `-q` winning
    #[must_use]
    pub const fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Check if debug mode
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Default `tracing` directive for this level
    #[must_use]
    pub const fn log_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "pdiff=info,pdiff_cli=info",
            Self::Debug => "pdiff=debug,pdiff_cli=debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Baseline image directory (None = the test directory)
    pub image_dir: Option<PathBuf>,
    /// Comma-separated test name patterns
    pub name_filter: Option<String>,
    /// Comma-separated class name patterns
    pub class_filter: Option<String>,
    /// Pause after stabilizing each unit, in milliseconds
    pub delay_ms: u64,
    /// Instrumentation proxy port
    pub proxy_port: u16,
    /// Load targets directly, without the proxy
    pub no_proxy: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            image_dir: None,
            name_filter: None,
            class_filter: None,
            delay_ms: 0,
            proxy_port: DEFAULT_PROXY_PORT,
            no_proxy: false,
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set image directory
    #[must_use]
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = Some(dir.into());
        self
    }

    /// Set test name filter
    #[must_use]
    pub fn with_name_filter(mut self, filter: impl Into<String>) -> Self {
        self.name_filter = Some(filter.into());
        self
    }

    /// Set class name filter
    #[must_use]
    pub fn with_class_filter(mut self, filter: impl Into<String>) -> Self {
        self.class_filter = Some(filter.into());
        self
    }

    /// Set inter-test delay
    #[must_use]
    pub const fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Set proxy port
    #[must_use]
    pub const fn with_proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = port;
        self
    }

    /// Disable the proxy
    #[must_use]
    pub const fn with_no_proxy(mut self, no_proxy: bool) -> Self {
        self.no_proxy = no_proxy;
        self
    }

    /// Image directory to use for a run against `test_dir`
    #[must_use]
    pub fn effective_image_dir(&self, test_dir: &std::path::Path) -> PathBuf {
        self.image_dir
            .clone()
            .unwrap_or_else(|| test_dir.to_path_buf())
    }

    /// Inter-test delay as a duration
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod verbosity_tests {
        use super::*;

        #[test]
        fn test_default_verbosity() {
            assert_eq!(Verbosity::default(), Verbosity::Normal);
        }

        #[test]
        fn test_from_flags() {
            assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
            assert_eq!(Verbosity::from_flags(1, false), Verbosity::Verbose);
            assert_eq!(Verbosity::from_flags(3, false), Verbosity::Debug);
            assert_eq!(Verbosity::from_flags(2, true), Verbosity::Quiet);
        }

        #[test]
        fn test_is_quiet() {
            assert!(Verbosity::Quiet.is_quiet());
            assert!(!Verbosity::Normal.is_quiet());
        }

        #[test]
        fn test_is_verbose() {
            assert!(!Verbosity::Quiet.is_verbose());
            assert!(!Verbosity::Normal.is_verbose());
            assert!(Verbosity::Verbose.is_verbose());
            assert!(Verbosity::Debug.is_verbose());
        }

        #[test]
        fn test_is_debug() {
            assert!(!Verbosity::Verbose.is_debug());
            assert!(Verbosity::Debug.is_debug());
        }

        #[test]
        fn test_log_directive_scopes_crates() {
            assert_eq!(Verbosity::Normal.log_directive(), "warn");
            assert!(Verbosity::Debug.log_directive().contains("pdiff=debug"));
        }

        #[test]
        fn test_deserialize() {
            let v: Verbosity = serde_json::from_str("\"Quiet\"").unwrap();
            assert_eq!(v, Verbosity::Quiet);
        }
    }

    mod color_choice_tests {
        use super::*;

        #[test]
        fn test_default_color() {
            assert_eq!(ColorChoice::default(), ColorChoice::Auto);
        }

        #[test]
        fn test_should_color_always() {
            assert!(ColorChoice::Always.should_color());
        }

        #[test]
        fn test_should_color_never() {
            assert!(!ColorChoice::Never.should_color());
        }

        #[test]
        fn test_should_color_auto() {
            let _ = ColorChoice::Auto.should_color();
        }
    }

    mod cli_config_tests {
        use super::*;
        use std::path::Path;

        #[test]
        fn test_default_config() {
            let config = CliConfig::default();
            assert_eq!(config.verbosity, Verbosity::Normal);
            assert_eq!(config.color, ColorChoice::Auto);
            assert!(config.image_dir.is_none());
            assert_eq!(config.proxy_port, DEFAULT_PROXY_PORT);
            assert!(!config.no_proxy);
            assert_eq!(config.delay(), Duration::ZERO);
        }

        #[test]
        fn test_chained_builders() {
            let config = CliConfig::new()
                .with_verbosity(Verbosity::Verbose)
                .with_color(ColorChoice::Never)
                .with_name_filter("about,^index")
                .with_class_filter("home")
                .with_delay_ms(250)
                .with_proxy_port(6060)
                .with_no_proxy(true);

            assert_eq!(config.verbosity, Verbosity::Verbose);
            assert_eq!(config.color, ColorChoice::Never);
            assert_eq!(config.name_filter.as_deref(), Some("about,^index"));
            assert_eq!(config.class_filter.as_deref(), Some("home"));
            assert_eq!(config.delay(), Duration::from_millis(250));
            assert_eq!(config.proxy_port, 6060);
            assert!(config.no_proxy);
        }

        #[test]
        fn test_image_dir_defaults_to_test_dir() {
            let config = CliConfig::new();
            assert_eq!(
                config.effective_image_dir(Path::new("suite")),
                PathBuf::from("suite")
            );
        }

        #[test]
        fn test_image_dir_override() {
            let config = CliConfig::new().with_image_dir("shots");
            assert_eq!(
                config.effective_image_dir(Path::new("suite")),
                PathBuf::from("shots")
            );
        }

        #[test]
        fn test_serialize() {
            let config = CliConfig::new().with_no_proxy(true);
            let json = serde_json::to_string(&config).unwrap();
            assert!(json.contains("\"no_proxy\":true"));
        }

        #[test]
        fn test_deserialize() {
            let json = r#"{"verbosity":"Debug","color":"Always","image_dir":"img","name_filter":null,"class_filter":"Home","delay_ms":10,"proxy_port":7070,"no_proxy":false}"#;
            let config: CliConfig = serde_json::from_str(json).unwrap();
            assert_eq!(config.verbosity, Verbosity::Debug);
            assert_eq!(config.image_dir, Some(PathBuf::from("img")));
            assert_eq!(config.class_filter.as_deref(), Some("Home"));
            assert_eq!(config.proxy_port, 7070);
        }
    }
}
