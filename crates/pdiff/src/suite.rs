//! YAML suite files.
//!
//! A suite file is one test module: module-level defaults plus a list of
//! classes, each with its tests. Test bodies are declarative [`Step`]s.
//!
//! ```yaml
//! base_url: example.com
//! window_size: [1200, 800]
//! classes:
//!   - name: Home
//!     hide: [".clock"]
//!     tests:
//!       - name: about
//!         url: /about
//!         wait_for: [{selector: ".loaded", text: Ready}]
//!         steps:
//!           - click: "#open"
//!           - assert_title: About
//! ```

use crate::annotate::{Interaction, TestMethod, WaitFor};
use crate::registry::{ensure_unique, ModuleDefaults, TestClass, TestClassDescriptor};
use crate::result::{PdiffError, PdiffResult};
use crate::session::BrowserSession;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// SCHEMA
// =============================================================================

/// Root of a suite file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteFile {
    /// Module base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Module window size `[width, height]`
    #[serde(default)]
    pub window_size: Option<[u32; 2]>,
    /// Test classes
    #[serde(default)]
    pub classes: Vec<ClassSpec>,
}

/// One test class
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassSpec {
    /// Class name
    pub name: String,
    /// Class base URL
    #[serde(default)]
    pub base_url: Option<String>,
    /// Class window size `[width, height]`
    #[serde(default)]
    pub window_size: Option<[u32; 2]>,
    /// Conditions shared by every test
    #[serde(default)]
    pub wait_for: Vec<WaitSpec>,
    /// Selectors hidden in every test
    #[serde(default)]
    pub hide: Vec<String>,
    /// Tests
    #[serde(default)]
    pub tests: Vec<TestSpec>,
}

/// A readiness condition, either a bare selector or the full form
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitSpec {
    /// `".loaded"`
    Selector(String),
    /// `{selector: ".loaded", text: Ready, classes: [done]}`
    Full {
        /// CSS selector
        selector: String,
        /// Exact text
        #[serde(default)]
        text: Option<String>,
        /// Required classes
        #[serde(default)]
        classes: Option<Vec<String>>,
    },
}

impl From<WaitSpec> for WaitFor {
    fn from(wait: WaitSpec) -> Self {
        match wait {
            WaitSpec::Selector(selector) => Self::new(selector),
            WaitSpec::Full {
                selector,
                text,
                classes,
            } => Self {
                selector,
                text,
                classes,
            },
        }
    }
}

/// One test method
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSpec {
    /// Method name
    pub name: String,
    /// URL fragment
    #[serde(default)]
    pub url: String,
    /// Documentation
    #[serde(default)]
    pub doc: Option<String>,
    /// Extra conditions
    #[serde(default)]
    pub wait_for: Vec<WaitSpec>,
    /// Inherited conditions to skip, by selector
    #[serde(default)]
    pub dont_wait_for: Vec<String>,
    /// Extra selectors to hide
    #[serde(default)]
    pub hide: Vec<String>,
    /// Inherited hides to skip
    #[serde(default)]
    pub dont_hide: Vec<String>,
    /// Interaction steps
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A declarative interaction step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    /// Click the first element matching a selector
    Click(String),
    /// Set an input's value and fire `input`/`change`
    Type {
        /// Input selector
        selector: String,
        /// Value to type
        text: String,
    },
    /// Run a script body
    Eval(String),
    /// Check `document.title`
    AssertTitle(String),
    /// Check an element's text
    AssertText {
        /// Element selector
        selector: String,
        /// Expected text
        equals: String,
    },
    /// Pause
    SleepMs(u64),
}

// =============================================================================
// STEP EXECUTION
// =============================================================================

fn js_string(s: &str) -> String {
    Value::from(s).to_string()
}

fn click_script(selector: &str) -> String {
    format!(
        "var el = document.querySelector({});\n\
         if (!el) {{ return false; }}\n\
         el.click();\n\
         return true;",
        js_string(selector)
    )
}

fn type_script(selector: &str, text: &str) -> String {
    format!(
        "var el = document.querySelector({});\n\
         if (!el) {{ return false; }}\n\
         el.focus();\n\
         el.value = {};\n\
         el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
         el.dispatchEvent(new Event('change', {{ bubbles: true }}));\n\
         return true;",
        js_string(selector),
        js_string(text)
    )
}

impl Step {
    /// Run this step.
    ///
    /// # Errors
    ///
    /// A missing target or a failed check is an assertion failure; session
    /// errors pass through.
    pub async fn run(&self, session: &mut dyn BrowserSession) -> PdiffResult<()> {
        match self {
            Self::Click(selector) => {
                let found = session.execute_script(&click_script(selector)).await?;
                if found != Value::Bool(true) {
                    return Err(PdiffError::assertion(format!("no element to click: {selector}")));
                }
            }
            Self::Type { selector, text } => {
                let found = session.execute_script(&type_script(selector, text)).await?;
                if found != Value::Bool(true) {
                    return Err(PdiffError::assertion(format!("no element to type into: {selector}")));
                }
            }
            Self::Eval(script) => {
                session.execute_script(script).await?;
            }
            Self::AssertTitle(expected) => {
                let title = session.execute_script("return document.title;").await?;
                if title.as_str() != Some(expected.as_str()) {
                    return Err(PdiffError::assertion(format!(
                        "title should be {expected:?}, was {title}"
                    )));
                }
            }
            Self::AssertText { selector, equals } => {
                let element = session.find_element(selector).await?;
                match element {
                    Some(el) if el.text == *equals => {}
                    Some(el) => {
                        return Err(PdiffError::assertion(format!(
                            "{selector} text should be {equals:?}, was {:?}",
                            el.text
                        )));
                    }
                    None => {
                        return Err(PdiffError::assertion(format!("no element matches {selector}")));
                    }
                }
            }
            Self::SleepMs(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        Ok(())
    }
}

/// Runs a list of steps in order, stopping at the first failure
#[derive(Debug, Clone, Default)]
pub struct StepsInteraction {
    steps: Vec<Step>,
}

impl StepsInteraction {
    /// Wrap `steps`
    #[must_use]
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Interaction for StepsInteraction {
    async fn run(&self, session: &mut dyn BrowserSession) -> PdiffResult<()> {
        for step in &self.steps {
            step.run(session).await?;
        }
        Ok(())
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl SuiteFile {
    /// Parse suite YAML; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`PdiffError::Suite`] for malformed YAML or unknown fields.
    pub fn from_yaml(yaml: &str, path: &Path) -> PdiffResult<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| PdiffError::Suite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Module-level defaults
    #[must_use]
    pub fn defaults(&self) -> ModuleDefaults {
        ModuleDefaults {
            base_url: self.base_url.clone(),
            window_size: self.window_size.map(|[w, h]| (w, h)),
        }
    }

    /// Build class definitions
    #[must_use]
    pub fn classes(&self) -> Vec<TestClass> {
        self.classes.iter().map(ClassSpec::to_class).collect()
    }

    /// Register every class against this file's defaults
    ///
    /// # Errors
    ///
    /// Returns [`PdiffError::DuplicateTest`] for colliding names.
    pub fn register(&self) -> PdiffResult<Vec<TestClassDescriptor>> {
        let defaults = self.defaults();
        self.classes()
            .into_iter()
            .map(|class| class.register(&defaults))
            .collect()
    }
}

impl ClassSpec {
    fn to_class(&self) -> TestClass {
        let mut class = TestClass::new(&self.name);
        if let Some(base_url) = &self.base_url {
            class = class.base_url(base_url);
        }
        if let Some([w, h]) = self.window_size {
            class = class.window_size(w, h);
        }
        for wait in &self.wait_for {
            class = class.wait_for(wait.clone().into());
        }
        for selector in &self.hide {
            class = class.hide(selector);
        }
        self.tests
            .iter()
            .fold(class, |class, test| class.method(test.to_method()))
    }
}

impl TestSpec {
    fn to_method(&self) -> TestMethod {
        let mut method =
            TestMethod::new(&self.name, StepsInteraction::new(self.steps.clone())).url(&self.url);
        for wait in &self.wait_for {
            method = method.wait_for(wait.clone().into());
        }
        for selector in &self.dont_wait_for {
            method = method.dont_wait_for(selector);
        }
        for selector in &self.hide {
            method = method.hide(selector);
        }
        for selector in &self.dont_hide {
            method = method.dont_hide(selector);
        }
        if let Some(doc) = &self.doc {
            method = method.doc(doc);
        }
        method
    }
}

/// Suite files in `dir`: names starting with `test` and ending in `.yaml` or
/// `.yml`, sorted.
///
/// # Errors
///
/// Fails if the directory cannot be read.
pub fn discover(dir: &Path) -> PdiffResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_yaml = name.ends_with(".yaml") || name.ends_with(".yml");
        if path.is_file() && name.starts_with("test") && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Load and register one suite file.
///
/// # Errors
///
/// I/O, parse and registration errors.
pub fn load_file(path: &Path) -> PdiffResult<Vec<TestClassDescriptor>> {
    let yaml = std::fs::read_to_string(path)?;
    SuiteFile::from_yaml(&yaml, path)?.register()
}

/// Load every suite file in `dir`; classes come back sorted by name.
///
/// # Errors
///
/// I/O, parse and registration errors, and [`PdiffError::DuplicateTest`]
/// when two classes produce the same qualified name.
pub fn load_dir(dir: &Path) -> PdiffResult<Vec<TestClassDescriptor>> {
    let mut classes = Vec::new();
    for path in discover(dir)? {
        tracing::debug!(path = %path.display(), "loading suite");
        classes.extend(load_file(&path)?);
    }
    classes.sort_by(|a, b| a.name().cmp(b.name()));
    ensure_unique(&classes)?;
    Ok(classes)
}
