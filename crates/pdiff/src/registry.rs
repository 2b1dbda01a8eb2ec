//! Test class registration.
//!
//! A [`TestClass`] groups [`TestMethod`]s under shared defaults. Calling
//! [`TestClass::register`] resolves every method into an immutable
//! [`TestUnit`]: qualified name, absolute target URL, effective readiness
//! conditions and hidden selectors. Units come out sorted by name.

use crate::annotate::{Interaction, TestMethod, WaitFor};
use crate::result::{PdiffError, PdiffResult};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

/// Window size used when neither class nor module declares one
pub const DEFAULT_WINDOW_SIZE: (u32, u32) = (2000, 1800);

/// Defaults declared at module (suite file) level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDefaults {
    /// Base URL for classes that do not declare one
    pub base_url: Option<String>,
    /// Window size for classes that do not declare one
    pub window_size: Option<(u32, u32)>,
}

impl ModuleDefaults {
    /// Empty defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the module base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the module window size
    #[must_use]
    pub const fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }
}

/// A test class definition, before registration
#[derive(Debug, Clone)]
pub struct TestClass {
    name: String,
    base_url: Option<String>,
    window_size: Option<(u32, u32)>,
    wait_fors: Vec<WaitFor>,
    hide: Vec<String>,
    methods: Vec<TestMethod>,
}

impl TestClass {
    /// Start a class definition
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            window_size: None,
            wait_fors: Vec::new(),
            hide: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Class base URL, overriding the module default
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Class window size, overriding the module default
    #[must_use]
    pub const fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    /// Readiness condition shared by every method
    #[must_use]
    pub fn wait_for(mut self, condition: WaitFor) -> Self {
        self.wait_fors.push(condition);
        self
    }

    /// Selector hidden in every method's screenshot
    #[must_use]
    pub fn hide(mut self, selector: impl Into<String>) -> Self {
        self.hide.push(selector.into());
        self
    }

    /// Add a test method
    #[must_use]
    pub fn method(mut self, method: TestMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Class name as declared
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve every public method into a test unit.
    ///
    /// Methods whose name starts with `_` are helpers and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PdiffError::DuplicateTest`] when two methods resolve to the
    /// same qualified name.
    pub fn register(self, module: &ModuleDefaults) -> PdiffResult<TestClassDescriptor> {
        let base_url = self
            .base_url
            .as_deref()
            .or(module.base_url.as_deref())
            .unwrap_or_default()
            .to_string();
        let window_size = self
            .window_size
            .or(module.window_size)
            .unwrap_or(DEFAULT_WINDOW_SIZE);

        let mut seen = HashSet::new();
        let mut units = Vec::with_capacity(self.methods.len());
        for method in self.methods.iter().filter(|m| !m.name.starts_with('_')) {
            let qualified_name = qualified_name(&self.name, &method.name);
            if !seen.insert(qualified_name.clone()) {
                return Err(PdiffError::DuplicateTest {
                    name: qualified_name,
                });
            }
            units.push(TestUnit {
                qualified_name,
                target_url: target_url(&base_url, &method.url),
                interaction: Arc::clone(&method.interaction),
                readiness_conditions: effective_conditions(&self.wait_fors, method),
                hidden_selectors: effective_hides(&self.hide, method),
                doc: method.doc.clone(),
            });
        }
        units.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));

        tracing::debug!(class = %self.name, units = units.len(), "registered test class");
        Ok(TestClassDescriptor {
            name: self.name,
            base_url: (!base_url.is_empty()).then_some(base_url),
            window_size,
            shared_wait_conditions: self.wait_fors,
            units,
        })
    }
}

/// `Home` + `check_menu` → `home_check-menu`
#[must_use]
pub fn qualified_name(class_name: &str, method_name: &str) -> String {
    format!("{}_{}", class_name.to_lowercase(), method_name.replace('_', "-"))
}

/// Fail on the first qualified name shared by two units across `classes`.
///
/// Registration only checks within one class; baselines are keyed by the
/// qualified name, so a run needs it unique over everything it captures.
///
/// # Errors
///
/// Returns [`PdiffError::DuplicateTest`] naming the collision.
pub fn ensure_unique(classes: &[TestClassDescriptor]) -> PdiffResult<()> {
    let mut seen = HashSet::new();
    for unit in classes.iter().flat_map(TestClassDescriptor::units) {
        if !seen.insert(unit.qualified_name()) {
            return Err(PdiffError::DuplicateTest {
                name: unit.qualified_name().to_string(),
            });
        }
    }
    Ok(())
}

/// Join base and fragment, defaulting to `http://` when no scheme is present
#[must_use]
pub fn target_url(base_url: &str, fragment: &str) -> String {
    let joined = format!("{base_url}{fragment}");
    if joined.is_empty() || joined.contains("://") {
        joined
    } else {
        format!("http://{joined}")
    }
}

fn effective_conditions(class_waits: &[WaitFor], method: &TestMethod) -> Vec<WaitFor> {
    class_waits
        .iter()
        .filter(|w| !method.dont_wait_for.contains(&w.selector))
        .chain(method.wait_fors.iter())
        .cloned()
        .collect()
}

fn effective_hides(class_hides: &[String], method: &TestMethod) -> BTreeSet<String> {
    class_hides
        .iter()
        .chain(method.hide.iter())
        .filter(|s| !method.dont_hide.contains(*s))
        .cloned()
        .collect()
}

/// A registered, immutable test unit
#[derive(Clone)]
pub struct TestUnit {
    qualified_name: String,
    target_url: String,
    interaction: Arc<dyn Interaction>,
    readiness_conditions: Vec<WaitFor>,
    hidden_selectors: BTreeSet<String>,
    doc: Option<String>,
}

impl fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit")
            .field("qualified_name", &self.qualified_name)
            .field("target_url", &self.target_url)
            .field("readiness_conditions", &self.readiness_conditions)
            .field("hidden_selectors", &self.hidden_selectors)
            .finish_non_exhaustive()
    }
}

impl TestUnit {
    /// Unique name, also the baseline file stem
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Absolute URL to navigate to
    #[must_use]
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Interaction run after navigation
    #[must_use]
    pub fn interaction(&self) -> &dyn Interaction {
        self.interaction.as_ref()
    }

    /// Conditions that must all hold before capture
    #[must_use]
    pub fn readiness_conditions(&self) -> &[WaitFor] {
        &self.readiness_conditions
    }

    /// Selectors hidden before capture
    #[must_use]
    pub const fn hidden_selectors(&self) -> &BTreeSet<String> {
        &self.hidden_selectors
    }

    /// Documentation, if any
    #[must_use]
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

/// A registered test class
#[derive(Debug, Clone)]
pub struct TestClassDescriptor {
    name: String,
    base_url: Option<String>,
    window_size: (u32, u32),
    shared_wait_conditions: Vec<WaitFor>,
    units: Vec<TestUnit>,
}

impl TestClassDescriptor {
    /// Class name as declared
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved base URL
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Resolved window size
    #[must_use]
    pub const fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    /// Class-level readiness conditions
    #[must_use]
    pub fn shared_wait_conditions(&self) -> &[WaitFor] {
        &self.shared_wait_conditions
    }

    /// Units, sorted by qualified name
    #[must_use]
    pub fn units(&self) -> &[TestUnit] {
        &self.units
    }

    /// Keep only the units whose qualified name satisfies `keep`
    pub fn retain_units(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.units.retain(|u| keep(&u.qualified_name));
    }

    /// Whether any unit is left
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::annotate::NoInteraction;
    use proptest::prelude::*;

    fn method(name: &str) -> TestMethod {
        TestMethod::new(name, NoInteraction)
    }

    // ========================================================================
    // Naming and URLs
    // ========================================================================

    mod naming_tests {
        use super::*;

        #[test]
        fn test_qualified_name() {
            assert_eq!(qualified_name("Home", "check_menu"), "home_check-menu");
            assert_eq!(qualified_name("GOOGLE", "Search_Box"), "google_Search-Box");
        }

        #[test]
        fn test_target_url_adds_scheme() {
            assert_eq!(target_url("example.com", "/about"), "http://example.com/about");
            assert_eq!(target_url("https://a.io", "/x"), "https://a.io/x");
            assert_eq!(target_url("", ""), "");
            assert_eq!(target_url("", "localhost:3000/"), "http://localhost:3000/");
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    mod register_tests {
        use super::*;

        #[test]
        fn test_units_sorted_and_helpers_skipped() {
            let desc = TestClass::new("Home")
                .method(method("zeta"))
                .method(method("_helper"))
                .method(method("alpha"))
                .register(&ModuleDefaults::new())
                .unwrap();
            let names: Vec<_> = desc.units().iter().map(TestUnit::qualified_name).collect();
            assert_eq!(names, ["home_alpha", "home_zeta"]);
        }

        #[test]
        fn test_duplicate_names_rejected() {
            let err = TestClass::new("Home")
                .method(method("a_b"))
                .method(method("a-b"))
                .register(&ModuleDefaults::new())
                .unwrap_err();
            assert!(matches!(err, PdiffError::DuplicateTest { name } if name == "home_a-b"));
        }

        #[test]
        fn test_names_unique_across_classes() {
            let register = |class: &str, method_name: &str| {
                TestClass::new(class)
                    .method(method(method_name))
                    .register(&ModuleDefaults::new())
                    .unwrap()
            };
            assert!(ensure_unique(&[register("Home", "a"), register("Search", "a")]).is_ok());
            let err = ensure_unique(&[register("Home", "a"), register("HOME", "a")]).unwrap_err();
            assert!(matches!(err, PdiffError::DuplicateTest { name } if name == "home_a"));
        }

        #[test]
        fn test_base_url_precedence() {
            let module = ModuleDefaults::new().with_base_url("module.com");
            let desc = TestClass::new("A")
                .base_url("class.com")
                .method(method("x").url("/x"))
                .register(&module)
                .unwrap();
            assert_eq!(desc.units()[0].target_url(), "http://class.com/x");

            let desc = TestClass::new("A")
                .method(method("x").url("/x"))
                .register(&module)
                .unwrap();
            assert_eq!(desc.units()[0].target_url(), "http://module.com/x");
            assert_eq!(desc.base_url(), Some("module.com"));
        }

        #[test]
        fn test_window_size_precedence() {
            let module = ModuleDefaults::new().with_window_size(1200, 800);
            let class_level = TestClass::new("A").window_size(640, 480).register(&module).unwrap();
            assert_eq!(class_level.window_size(), (640, 480));
            let module_level = TestClass::new("A").register(&module).unwrap();
            assert_eq!(module_level.window_size(), (1200, 800));
            let default = TestClass::new("A").register(&ModuleDefaults::new()).unwrap();
            assert_eq!(default.window_size(), DEFAULT_WINDOW_SIZE);
        }

        #[test]
        fn test_effective_conditions() {
            let desc = TestClass::new("Home")
                .wait_for(WaitFor::new("#app"))
                .wait_for(WaitFor::new("#nav"))
                .method(
                    method("about")
                        .dont_wait_for("#app")
                        .wait_for(WaitFor::new(".loaded").text("Ready")),
                )
                .register(&ModuleDefaults::new())
                .unwrap();
            let selectors: Vec<_> = desc.units()[0]
                .readiness_conditions()
                .iter()
                .map(|w| w.selector.as_str())
                .collect();
            assert_eq!(selectors, ["#nav", ".loaded"]);
            assert_eq!(desc.shared_wait_conditions().len(), 2);
        }

        #[test]
        fn test_class_hide_minus_method_exclusion() {
            let desc = TestClass::new("Home")
                .hide(".clock")
                .hide(".ad")
                .method(method("about").dont_hide(".clock").hide(".banner"))
                .register(&ModuleDefaults::new())
                .unwrap();
            let hidden: Vec<_> = desc.units()[0].hidden_selectors().iter().cloned().collect();
            assert_eq!(hidden, [".ad", ".banner"]);
        }

        #[test]
        fn test_retain_units_preserves_order() {
            let mut desc = TestClass::new("Home")
                .method(method("c"))
                .method(method("b"))
                .method(method("a"))
                .register(&ModuleDefaults::new())
                .unwrap();
            desc.retain_units(|name| name != "home_b");
            let names: Vec<_> = desc.units().iter().map(TestUnit::qualified_name).collect();
            assert_eq!(names, ["home_a", "home_c"]);
            desc.retain_units(|_| false);
            assert!(desc.is_empty());
        }

        #[test]
        fn test_doc_carried() {
            let desc = TestClass::new("Home")
                .method(method("a").doc("front page"))
                .register(&ModuleDefaults::new())
                .unwrap();
            assert_eq!(desc.units()[0].doc(), Some("front page"));
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    proptest! {
        #[test]
        fn prop_registered_names_unique_and_sorted(
            names in proptest::collection::hash_set("[a-z][a-z_]{0,8}", 1..12)
        ) {
            let class = names
                .iter()
                .fold(TestClass::new("Prop"), |c, n| c.method(method(n)));
            match class.register(&ModuleDefaults::new()) {
                Ok(desc) => {
                    let got: Vec<_> = desc.units().iter().map(TestUnit::qualified_name).collect();
                    let mut sorted = got.clone();
                    sorted.sort_unstable();
                    sorted.dedup();
                    prop_assert_eq!(got, sorted);
                }
                Err(PdiffError::DuplicateTest { .. }) => {
                    let mapped: HashSet<_> = names.iter().map(|n| n.replace('_', "-")).collect();
                    prop_assert!(mapped.len() < names.len());
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }

        #[test]
        fn prop_qualified_name_has_no_underscore_in_method_part(
            class in "[A-Za-z]{1,8}",
            name in "[a-z_]{1,12}",
        ) {
            let q = qualified_name(&class, &name);
            let (prefix, rest) = q.split_once('_').unwrap();
            prop_assert_eq!(prefix, class.to_lowercase());
            prop_assert!(!rest.contains('_'));
        }
    }
}
