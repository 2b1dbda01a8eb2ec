//! Command execution: selection, proxy lifetime and browser runs

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use crate::proxy_process::ProxyProcess;
use pdiff::{RunReport, TestClassDescriptor, TestFilter, UrlRewriter};
use std::path::Path;

#[cfg(feature = "browser")]
use crate::commands::{BrowserArg, RunArgs};
#[cfg(feature = "browser")]
use pdiff::{ChromiumConfig, ChromiumSession, RunMode, RunOptions, Runner, SyncOptions, Synchronizer};
#[cfg(feature = "browser")]
use pdiff::BrowserSession;

/// Load every class under `dir` and apply the class and name filters.
///
/// Classes left without units are dropped.
pub fn load_selection(dir: &Path, config: &CliConfig) -> CliResult<Vec<TestClassDescriptor>> {
    if !dir.is_dir() {
        return Err(CliError::config(format!(
            "test directory not found: {}",
            dir.display()
        )));
    }
    let class_filter = TestFilter::from_option(config.class_filter.as_deref())?;
    let name_filter = TestFilter::from_option(config.name_filter.as_deref())?;

    let mut classes = pdiff::suite::load_dir(dir)?;
    classes.retain(|class| class_filter.matches(class.name()));
    for class in &mut classes {
        class.retain_units(|name| name_filter.matches(name));
    }
    classes.retain(|class| !class.is_empty());
    tracing::debug!(
        classes = classes.len(),
        units = classes.iter().map(|c| c.units().len()).sum::<usize>(),
        "selection loaded"
    );
    Ok(classes)
}

/// Scheme the proxy falls back to: that of the first class with a base URL
#[must_use]
pub fn default_upstream_scheme(classes: &[TestClassDescriptor]) -> &'static str {
    let base = classes.iter().find_map(TestClassDescriptor::base_url);
    match base.and_then(|b| b.split_once("://")) {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    }
}

/// Host the proxy falls back to: that of the first class with a base URL
#[must_use]
pub fn default_proxy_host(classes: &[TestClassDescriptor]) -> Option<String> {
    let base = classes.iter().find_map(TestClassDescriptor::base_url)?;
    let without_scheme = base.split_once("://").map_or(base, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Fail unless every unit passed
pub fn ensure_passed(report: &RunReport) -> CliResult<()> {
    if report.all_passed() {
        Ok(())
    } else {
        Err(CliError::test_execution(format!(
            "{} of {} tests failed",
            report.failed(),
            report.total()
        )))
    }
}

/// Reporter configured from `config`
#[must_use]
pub fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
        .with_verbose(config.verbosity.is_verbose())
}

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
async fn start_proxy(
    config: &CliConfig,
    classes: &[TestClassDescriptor],
) -> CliResult<Option<ProxyProcess>> {
    if config.no_proxy {
        return Ok(None);
    }
    let host = default_proxy_host(classes);
    let scheme = default_upstream_scheme(classes);
    ProxyProcess::spawn(config.proxy_port, host.as_deref(), scheme)
        .await
        .map(Some)
}

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
fn rewriter(proxy: Option<&ProxyProcess>) -> UrlRewriter {
    proxy.map_or(UrlRewriter::Identity, |p| UrlRewriter::Proxy { port: p.port() })
}

#[cfg(feature = "browser")]
async fn launch(args: &RunArgs, headed: bool) -> CliResult<ChromiumSession> {
    let mut config = match args.browser {
        BrowserArg::Chrome => ChromiumConfig::default(),
    }
    .with_headless(!headed);
    if args.no_sandbox {
        config = config.with_no_sandbox();
    }
    if let Some(ref path) = args.browser_path {
        config = config.with_chromium_path(path.clone());
    }
    Ok(ChromiumSession::launch(config).await?)
}

/// Run the selected tests in `mode`; the proxy is stopped whatever happens
#[cfg(feature = "browser")]
pub async fn run_suite(config: &CliConfig, args: &RunArgs, mode: RunMode) -> CliResult<RunReport> {
    let classes = load_selection(&args.select.path, config)?;
    let reporter = reporter(config);
    if classes.is_empty() {
        reporter.info("No tests matched");
        return Ok(RunReport::default());
    }
    reporter.info(match mode {
        RunMode::Verify => "Running tests...",
        RunMode::Update => "Updating baselines...",
    });

    let proxy = start_proxy(config, &classes).await?;
    let options = RunOptions::new()
        .with_mode(mode)
        .with_image_dir(config.effective_image_dir(&args.select.path))
        .with_sync(SyncOptions::new().with_request_tracking(proxy.is_some()))
        .with_rewriter(rewriter(proxy.as_ref()))
        .with_delay(config.delay());
    let result = drive(&classes, options, args, reporter).await;
    if let Some(proxy) = proxy {
        proxy.shutdown().await;
    }
    result
}

#[cfg(feature = "browser")]
async fn drive(
    classes: &[TestClassDescriptor],
    options: RunOptions,
    args: &RunArgs,
    reporter: ProgressReporter,
) -> CliResult<RunReport> {
    let mut session = launch(args, args.headed).await?;
    let mut runner = Runner::new(options).with_listener(reporter);
    let result = runner.run(&mut session, classes).await;
    let closed = session.close().await;
    let report = result?;
    closed?;
    Ok(report)
}

/// Bring each selected page to its stable state in a visible browser and
/// wait for Enter before moving on. Nothing is captured.
#[cfg(feature = "browser")]
pub async fn run_interactive(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let classes = load_selection(&args.select.path, config)?;
    let reporter = reporter(config);
    if classes.is_empty() {
        reporter.info("No tests matched");
        return Ok(());
    }
    let proxy = start_proxy(config, &classes).await?;
    let sync = Synchronizer::new(SyncOptions::new().with_request_tracking(proxy.is_some()))
        .with_rewriter(rewriter(proxy.as_ref()));
    let result = interact(&classes, &sync, args, &reporter).await;
    if let Some(proxy) = proxy {
        proxy.shutdown().await;
    }
    result
}

#[cfg(feature = "browser")]
async fn interact(
    classes: &[TestClassDescriptor],
    sync: &Synchronizer,
    args: &RunArgs,
    reporter: &ProgressReporter,
) -> CliResult<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut session = launch(args, true).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let outcome: CliResult<()> = async {
        for class in classes {
            reporter.header(&format!(" for {}", class.name()));
            let (width, height) = class.window_size();
            session.set_window_size(width, height).await?;
            session
                .set_implicit_wait(sync.options().implicit_wait())
                .await?;
            for unit in class.units() {
                match sync.stabilize(&mut session, unit).await {
                    Ok(()) => reporter.info(&format!("   {} ready", unit.qualified_name())),
                    Err(e) if e.is_unit_failure() => {
                        reporter.failure(&format!("{}: {e}", unit.qualified_name()));
                    }
                    Err(e) => return Err(e.into()),
                }
                eprintln!("   Enter for the next test, q to quit");
                match lines.next_line().await? {
                    Some(line) if line.trim() != "q" => {}
                    _ => return Ok(()),
                }
            }
        }
        Ok(())
    }
    .await;

    session.close().await?;
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pdiff::{ClassReport, Outcome, UnitResult};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const HOME: &str = r"
base_url: example.com
classes:
  - name: Home
    tests:
      - name: index
        url: /
      - name: about
        url: /about
  - name: Search
    base_url: search.example.com/app
    tests:
      - name: results
        url: /q
";

    fn suite_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("test_home.yaml"), HOME).unwrap();
        dir
    }

    fn names(classes: &[TestClassDescriptor]) -> Vec<String> {
        classes
            .iter()
            .flat_map(|c| c.units().iter().map(|u| u.qualified_name().to_string()))
            .collect()
    }

    mod selection_tests {
        use super::*;

        #[test]
        fn test_load_all() {
            let dir = suite_dir();
            let classes = load_selection(dir.path(), &CliConfig::new()).unwrap();
            assert_eq!(
                names(&classes),
                vec!["home_about", "home_index", "search_results"]
            );
        }

        #[test]
        fn test_name_filter() {
            let dir = suite_dir();
            let config = CliConfig::new().with_name_filter("ABOUT,results");
            let classes = load_selection(dir.path(), &config).unwrap();
            assert_eq!(names(&classes), vec!["home_about", "search_results"]);
        }

        #[test]
        fn test_class_filter_drops_other_classes() {
            let dir = suite_dir();
            let config = CliConfig::new().with_class_filter("^home$");
            let classes = load_selection(dir.path(), &config).unwrap();
            assert_eq!(classes.len(), 1);
            assert_eq!(classes[0].name(), "Home");
        }

        #[test]
        fn test_emptied_classes_are_dropped() {
            let dir = suite_dir();
            let config = CliConfig::new().with_name_filter("results");
            let classes = load_selection(dir.path(), &config).unwrap();
            assert_eq!(classes.len(), 1);
            assert_eq!(classes[0].name(), "Search");
        }

        #[test]
        fn test_invalid_filter() {
            let dir = suite_dir();
            let config = CliConfig::new().with_name_filter("(");
            let err = load_selection(dir.path(), &config).unwrap_err();
            assert!(matches!(err, CliError::Pdiff(_)));
        }

        #[test]
        fn test_missing_directory() {
            let err = load_selection(Path::new("/nonexistent/suite"), &CliConfig::new())
                .unwrap_err();
            assert!(err.to_string().contains("test directory not found"));
        }
    }

    mod proxy_host_tests {
        use super::*;

        #[test]
        fn test_first_base_url_host() {
            let dir = suite_dir();
            let classes = load_selection(dir.path(), &CliConfig::new()).unwrap();
            assert_eq!(default_proxy_host(&classes).as_deref(), Some("example.com"));
        }

        #[test]
        fn test_scheme_and_path_stripped() {
            let dir = suite_dir();
            let config = CliConfig::new().with_class_filter("search");
            let classes = load_selection(dir.path(), &config).unwrap();
            assert_eq!(
                default_proxy_host(&classes).as_deref(),
                Some("search.example.com")
            );
        }

        #[test]
        fn test_no_classes() {
            assert_eq!(default_proxy_host(&[]), None);
            assert_eq!(default_upstream_scheme(&[]), "http");
        }

        #[test]
        fn test_https_base_url_sets_upstream_scheme() {
            let dir = TempDir::new().unwrap();
            fs::write(
                dir.path().join("test_secure.yaml"),
                "base_url: https://secure.example\nclasses:\n  - name: Login\n    tests:\n      - name: form\n        url: /login\n",
            )
            .unwrap();
            let classes = load_selection(dir.path(), &CliConfig::new()).unwrap();
            assert_eq!(default_upstream_scheme(&classes), "https");
            assert_eq!(default_proxy_host(&classes).as_deref(), Some("secure.example"));
        }

        #[test]
        fn test_plain_base_url_keeps_http() {
            let dir = suite_dir();
            let classes = load_selection(dir.path(), &CliConfig::new()).unwrap();
            assert_eq!(default_upstream_scheme(&classes), "http");
        }

        #[test]
        fn test_rewriter_without_proxy() {
            assert_eq!(rewriter(None), UrlRewriter::Identity);
        }
    }

    mod report_tests {
        use super::*;

        fn report(outcomes: Vec<Outcome>) -> RunReport {
            RunReport {
                classes: vec![ClassReport {
                    name: "Home".into(),
                    results: outcomes
                        .into_iter()
                        .enumerate()
                        .map(|(i, outcome)| UnitResult {
                            name: format!("home_{i}"),
                            outcome,
                            duration: Duration::ZERO,
                        })
                        .collect(),
                }],
            }
        }

        #[test]
        fn test_all_passed() {
            let report = report(vec![Outcome::Unchanged, Outcome::Baselined]);
            assert!(ensure_passed(&report).is_ok());
        }

        #[test]
        fn test_failures_counted() {
            let report = report(vec![
                Outcome::Unchanged,
                Outcome::Timeout {
                    message: "timed out".into(),
                },
            ]);
            let err = ensure_passed(&report).unwrap_err();
            assert!(err.to_string().contains("1 of 2 tests failed"));
        }
    }
}
