//! pdiff: perceptual-diff testing for web pages
//!
//! Declare pages as test methods grouped in classes, let pdiff bring each
//! page to a stable state, and compare its screenshot against a stored
//! baseline image.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌──────────────┐   ┌────────────┐
//! │ annotate  │──►│ registry  │──►│    sync      │──►│  compare   │
//! │ TestMethod│   │ TestUnit  │   │ stabilize()  │   │ ImageStore │
//! └───────────┘   └───────────┘   └──────────────┘   └────────────┘
//!                        │                                  │
//!                        └──────────► runner ◄──────────────┘
//!                                   RunReport
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pdiff::prelude::*;
//!
//! let home = TestClass::new("Home")
//!     .base_url("example.com")
//!     .hide(".clock")
//!     .method(
//!         TestMethod::new("about", NoInteraction)
//!             .url("/about")
//!             .wait_for(WaitFor::new(".loaded").text("Ready")),
//!     )
//!     .register(&ModuleDefaults::new())?;
//!
//! let mut runner = Runner::new(RunOptions::new().with_image_dir("images"));
//! let report = runner.run(&mut session, &[home]).await?;
//! assert!(report.all_passed());
//! ```

#![warn(missing_docs)]

pub mod annotate;
pub mod compare;
pub mod filter;
pub mod instrument;
pub mod registry;
pub mod runner;
pub mod session;
pub mod suite;
pub mod sync;
pub mod wait;

mod result;

pub use annotate::{assert_that, interaction, FnInteraction, Interaction, NoInteraction, TestMethod, WaitFor};
pub use compare::{image_digest, Comparison, ImageDigest, ImageStore, Rebaseline};
pub use filter::TestFilter;
pub use registry::{
    ensure_unique, qualified_name, target_url, ModuleDefaults, TestClass, TestClassDescriptor, TestUnit,
    DEFAULT_WINDOW_SIZE,
};
pub use result::{PdiffError, PdiffResult};
pub use runner::{
    ClassReport, Outcome, RunListener, RunMode, RunOptions, RunReport, Runner, TracingListener,
    UnitResult,
};
#[cfg(feature = "browser")]
pub use session::chromium::{ChromiumConfig, ChromiumSession};
pub use session::{BrowserSession, ElementSnapshot, MockSession};
pub use suite::{Step, StepsInteraction, SuiteFile};
pub use sync::{SyncOptions, Synchronizer, UrlRewriter};
pub use wait::{poll_until, Probe, Readiness, WaitOptions, WaitResult};

/// Commonly used items
pub mod prelude {
    pub use super::annotate::{assert_that, interaction, Interaction, NoInteraction, TestMethod, WaitFor};
    pub use super::registry::{ModuleDefaults, TestClass, TestClassDescriptor};
    pub use super::result::{PdiffError, PdiffResult};
    pub use super::runner::{Outcome, RunListener, RunMode, RunOptions, RunReport, Runner};
    pub use super::session::BrowserSession;
    pub use super::sync::{SyncOptions, UrlRewriter};
}
