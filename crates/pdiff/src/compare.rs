//! Screenshot capture and baseline comparison.
//!
//! Baselines live at `{dir}/{name}.png`. Two images are equal when their
//! decoded pixels are equal, so re-encoding the same picture with different
//! PNG settings does not count as a change.

use crate::result::{PdiffError, PdiffResult};
use crate::session::BrowserSession;
use sha2::{Digest, Sha512};
use std::path::{Path, PathBuf};

/// SHA-512 over an image's dimensions and RGBA8 pixel buffer
pub type ImageDigest = [u8; 64];

/// Outcome of a verify-mode capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// No baseline existed; the capture became the baseline
    FirstRun,
    /// Capture matches the baseline
    Unchanged,
    /// Capture differs; kept at `new_path` for inspection
    Changed {
        /// The retained capture
        new_path: PathBuf,
    },
}

impl Comparison {
    /// Whether this counts as a pass
    #[must_use]
    pub const fn passed(&self) -> bool {
        !matches!(self, Self::Changed { .. })
    }
}

/// Outcome of an update-mode capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebaseline {
    /// No baseline existed
    Created,
    /// Baseline rewritten with identical pixels
    Unchanged,
    /// Baseline replaced with different pixels
    Updated,
}

/// Compute the digest of the image at `path`.
///
/// # Errors
///
/// Returns [`PdiffError::Image`] if the file cannot be read or decoded.
pub fn image_digest(path: &Path) -> PdiffResult<ImageDigest> {
    let img = image::open(path).map_err(|e| PdiffError::Image {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let rgba = img.to_rgba8();
    let mut hasher = Sha512::new();
    hasher.update(rgba.width().to_le_bytes());
    hasher.update(rgba.height().to_le_bytes());
    hasher.update(rgba.as_raw());
    let mut digest = [0u8; 64];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

/// Baseline directory
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Store rooted at `dir`; the directory is created on first capture
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{name}.png`
    #[must_use]
    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.png"))
    }

    /// `{dir}/{name}.NEW.png`, kept after a failed comparison
    #[must_use]
    pub fn new_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.NEW.png"))
    }

    /// `{dir}/_{name}.png`, scratch file used while rebaselining
    #[must_use]
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("_{name}.png"))
    }

    /// Capture `name` and judge it against its baseline.
    ///
    /// # Errors
    ///
    /// Fails on screenshot, filesystem or decoding errors.
    pub async fn compare(
        &self,
        session: &mut dyn BrowserSession,
        name: &str,
    ) -> PdiffResult<Comparison> {
        let baseline = self.baseline_path(name);
        if !baseline.exists() {
            self.capture(session, &baseline).await?;
            tracing::info!(test = name, path = %baseline.display(), "created baseline");
            return Ok(Comparison::FirstRun);
        }

        let candidate = self.new_path(name);
        self.capture(session, &candidate).await?;
        if image_digest(&baseline)? == image_digest(&candidate)? {
            std::fs::remove_file(&candidate)?;
            Ok(Comparison::Unchanged)
        } else {
            tracing::info!(test = name, path = %candidate.display(), "screenshot changed");
            Ok(Comparison::Changed {
                new_path: candidate,
            })
        }
    }

    /// Capture `name` and make it the baseline.
    ///
    /// A leftover `{name}.NEW.png` from an earlier failed run is removed.
    ///
    /// # Errors
    ///
    /// Fails on screenshot, filesystem or decoding errors.
    pub async fn rebaseline(
        &self,
        session: &mut dyn BrowserSession,
        name: &str,
    ) -> PdiffResult<Rebaseline> {
        let baseline = self.baseline_path(name);
        let stale = self.new_path(name);
        if stale.exists() {
            std::fs::remove_file(&stale)?;
        }

        if !baseline.exists() {
            self.capture(session, &baseline).await?;
            return Ok(Rebaseline::Created);
        }

        let scratch = self.scratch_path(name);
        self.capture(session, &scratch).await?;
        let same = image_digest(&baseline)? == image_digest(&scratch)?;
        std::fs::rename(&scratch, &baseline)?;
        Ok(if same {
            Rebaseline::Unchanged
        } else {
            Rebaseline::Updated
        })
    }

    async fn capture(&self, session: &mut dyn BrowserSession, path: &Path) -> PdiffResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        session.save_screenshot(path).await
    }
}
