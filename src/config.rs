//! Configuration types for PDF flattening.
//!
//! All flattening behaviour is controlled through [`FlattenConfig`], built via
//! its [`FlattenConfigBuilder`]. The platform-conditional raster pass of older
//! tools is an explicit [`RasterPass`] policy here, so it can be switched on
//! or off in tests and on any OS.

use crate::engine::EngineRunner;
use crate::error::FlattenError;
use crate::progress::ProgressCallback;
use engine_probe::Platform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Lowest accepted rasterisation resolution.
pub const MIN_DPI: u32 = 200;
/// Highest accepted rasterisation resolution.
pub const MAX_DPI: u32 = 600;

/// Configuration for a flattening run.
///
/// Built via [`FlattenConfig::builder()`] or using [`FlattenConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf_flatten::{FlattenConfig, RasterPass};
///
/// let config = FlattenConfig::builder()
///     .replace(true)
///     .raster_pass(RasterPass::Always)
///     .dpi(300)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct FlattenConfig {
    /// Overwrite originals in place. Default: false (write `<name>_flattened.pdf`).
    pub replace: bool,

    /// When to run the rasterise-and-reassemble pass. Default: [`RasterPass::Auto`].
    pub raster_pass: RasterPass,

    /// Rasterisation DPI for the raster pass. Range: 200–600. Default: 200.
    ///
    /// Also written as the density of the reassembled PDF so that page sizes
    /// survive the round trip.
    pub dpi: u32,

    /// Bitmap memory ceiling handed to the rasterizer, in bytes. Default: 500 000 000.
    pub max_bitmap_bytes: u64,

    /// Which engine reassembles page images. Default: [`AssemblerSelection::Auto`].
    pub assembler: AssemblerSelection,

    /// Explicit Ghostscript executable. If None, `FLATTEN_GS_PATH` then `PATH`.
    pub ghostscript: Option<PathBuf>,

    /// Kill any single engine invocation that runs longer than this. Default: 1800.
    /// `None` lets engines run to completion.
    pub engine_timeout_secs: Option<u64>,

    /// What to do when one document in a directory fails. Default: [`ErrorPolicy::Abort`].
    pub error_policy: ErrorPolicy,

    /// Pre-constructed engine runner. If None, a [`crate::engine::SystemRunner`]
    /// with `engine_timeout_secs` is used.
    pub runner: Option<Arc<dyn EngineRunner>>,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self {
            replace: false,
            raster_pass: RasterPass::default(),
            dpi: MIN_DPI,
            max_bitmap_bytes: 500_000_000,
            assembler: AssemblerSelection::default(),
            ghostscript: None,
            engine_timeout_secs: Some(1800),
            error_policy: ErrorPolicy::default(),
            runner: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FlattenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenConfig")
            .field("replace", &self.replace)
            .field("raster_pass", &self.raster_pass)
            .field("dpi", &self.dpi)
            .field("max_bitmap_bytes", &self.max_bitmap_bytes)
            .field("assembler", &self.assembler)
            .field("ghostscript", &self.ghostscript)
            .field("engine_timeout_secs", &self.engine_timeout_secs)
            .field("error_policy", &self.error_policy)
            .field("runner", &self.runner.as_ref().map(|_| "<dyn EngineRunner>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn FlattenProgressCallback>"),
            )
            .finish()
    }
}

impl FlattenConfig {
    /// Create a new builder for `FlattenConfig`.
    pub fn builder() -> FlattenConfigBuilder {
        FlattenConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FlattenConfig`].
#[derive(Debug)]
pub struct FlattenConfigBuilder {
    config: FlattenConfig,
}

impl FlattenConfigBuilder {
    pub fn replace(mut self, v: bool) -> Self {
        self.config.replace = v;
        self
    }

    pub fn raster_pass(mut self, policy: RasterPass) -> Self {
        self.config.raster_pass = policy;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    pub fn max_bitmap_bytes(mut self, bytes: u64) -> Self {
        self.config.max_bitmap_bytes = bytes;
        self
    }

    pub fn assembler(mut self, selection: AssemblerSelection) -> Self {
        self.config.assembler = selection;
        self
    }

    pub fn ghostscript(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ghostscript = Some(path.into());
        self
    }

    pub fn engine_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.config.error_policy = policy;
        self
    }

    pub fn runner(mut self, runner: Arc<dyn EngineRunner>) -> Self {
        self.config.runner = Some(runner);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FlattenConfig, FlattenError> {
        let c = &self.config;
        if c.max_bitmap_bytes == 0 {
            return Err(FlattenError::InvalidConfig(
                "Bitmap ceiling must be greater than zero".into(),
            ));
        }
        if c.engine_timeout_secs == Some(0) {
            return Err(FlattenError::InvalidConfig(
                "Engine timeout must be at least 1 second (use no timeout to disable)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// When the rasterise-and-reassemble pass runs.
///
/// Some viewers' flatten output keeps redaction bars as vector objects that
/// can be lifted off the page. Rasterising every page after the vector
/// flatten leaves nothing beneath the pixels, at the cost of vector quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterPass {
    /// Only on the macOS platform profile, where it is known to be needed. (default)
    #[default]
    Auto,
    /// On every platform.
    Always,
    /// Never; vector flatten only.
    Never,
}

impl RasterPass {
    /// Resolve the policy for the platform this binary runs on.
    pub fn enabled(self) -> bool {
        self.enabled_on(Platform::current())
    }

    /// Resolve the policy for an explicit platform profile.
    pub fn enabled_on(self, platform: Platform) -> bool {
        match self {
            RasterPass::Auto => platform == Platform::MacOs,
            RasterPass::Always => true,
            RasterPass::Never => false,
        }
    }
}

/// Whether a failed document stops a directory run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop at the first failed document. (default)
    #[default]
    Abort,
    /// Record the failure and move on to the next document.
    Continue,
}

/// Which engine reassembles rasterised pages into a PDF.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblerSelection {
    /// Look for `magick`, then `convert`, when the raster pass starts;
    /// use Ghostscript list-file assembly if neither exists. (default)
    #[default]
    Auto,
    /// ImageMagick 7 at this path.
    Magick(PathBuf),
    /// ImageMagick 6 `convert` at this path.
    LegacyConvert(PathBuf),
    /// Skip ImageMagick; always use Ghostscript list-file assembly.
    Ghostscript,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behaviour() {
        let c = FlattenConfig::default();
        assert!(!c.replace);
        assert_eq!(c.raster_pass, RasterPass::Auto);
        assert_eq!(c.dpi, 200);
        assert_eq!(c.max_bitmap_bytes, 500_000_000);
        assert_eq!(c.error_policy, ErrorPolicy::Abort);
        assert_eq!(c.assembler, AssemblerSelection::Auto);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = FlattenConfig::builder().dpi(72).build().unwrap();
        assert_eq!(c.dpi, MIN_DPI);
        let c = FlattenConfig::builder().dpi(5000).build().unwrap();
        assert_eq!(c.dpi, MAX_DPI);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = FlattenConfig::builder()
            .engine_timeout_secs(Some(0))
            .build()
            .unwrap_err();
        assert!(matches!(err, FlattenError::InvalidConfig(_)));

        let c = FlattenConfig::builder()
            .engine_timeout_secs(None)
            .build()
            .unwrap();
        assert_eq!(c.engine_timeout_secs, None);
    }

    #[test]
    fn raster_pass_policy_is_platform_independent_when_explicit() {
        for p in [Platform::MacOs, Platform::Linux, Platform::Windows] {
            assert!(RasterPass::Always.enabled_on(p));
            assert!(!RasterPass::Never.enabled_on(p));
        }
        assert!(RasterPass::Auto.enabled_on(Platform::MacOs));
        assert!(!RasterPass::Auto.enabled_on(Platform::Linux));
        assert!(!RasterPass::Auto.enabled_on(Platform::Windows));
    }

    #[test]
    fn debug_hides_trait_objects() {
        let c = FlattenConfig::default();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("FlattenConfig"));
        assert!(dbg.contains("raster_pass"));
    }
}
