//! # engine-probe
//!
//! Find the external engines `pdf-flatten` drives (Ghostscript for
//! flattening and rasterising, ImageMagick for reassembling page images)
//! and explain how to install them when they are missing.
//!
//! ## How it works
//!
//! 1. An explicit environment override wins (`FLATTEN_GS_PATH`,
//!    `FLATTEN_MAGICK_PATH`). A set-but-missing override is an error for
//!    Ghostscript and is ignored for ImageMagick.
//! 2. Otherwise every directory of `PATH` is searched for the
//!    platform-specific program names, in preference order.
//! 3. Discovery only proves that a file exists. Whether it is a genuine
//!    Ghostscript is decided by running `--version` (done by the caller) and
//!    passing the output to [`is_genuine_version`].
//!
//! ## Platform support
//!
//! | OS      | Ghostscript                     | Assemblers            |
//! |---------|---------------------------------|-----------------------|
//! | macOS   | `gs`                            | `magick`, `convert`   |
//! | Linux   | `gs`                            | `magick`, `convert`   |
//! | Windows | `gswin64c`, `gswin32c`, `gs`    | `magick`              |
//!
//! ```rust,no_run
//! use engine_probe::{locate_ghostscript, locate_image_assembler};
//!
//! let gs = locate_ghostscript().expect("Ghostscript missing");
//! if let Some(assembler) = locate_image_assembler() {
//!     println!("{} via {}", gs.display(), assembler.program().display());
//! }
//! ```

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit Ghostscript executable.
pub const GHOSTSCRIPT_ENV: &str = "FLATTEN_GS_PATH";

/// Environment variable naming an explicit ImageMagick executable.
pub const MAGICK_ENV: &str = "FLATTEN_MAGICK_PATH";

/// Appended to every remediation message.
pub const ALIAS_WARNING: &str = "Note: if 'gs' is aliased to another command in your shell \
(some setups alias it to 'git status'), unalias it or point FLATTEN_GS_PATH at the real \
Ghostscript binary.";

const WINDOWS_DOWNLOAD_URL: &str = "https://www.ghostscript.com/releases/gsdnld.html";

static RE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\d+(\.\d+)?\s*$").unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned while locating engines.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// None of the candidate program names exist on `PATH`.
    #[error("{engine} was not found on PATH (tried: {tried})")]
    NotFound { engine: &'static str, tried: String },

    /// An override variable points at a file that does not exist.
    #[error("{var} is set to '{path}', which does not exist")]
    OverrideMissing { var: &'static str, path: PathBuf },
}

// ── Platform profile ─────────────────────────────────────────────────────────

/// The operating-system family, used for program names and install hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Other,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            _ => Platform::Other,
        }
    }

    /// Ghostscript executable names in preference order.
    pub fn ghostscript_candidates(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["gswin64c", "gswin32c", "gs"],
            _ => &["gs"],
        }
    }

    /// Install instructions for Ghostscript.
    pub fn install_hint(self) -> String {
        match self {
            Platform::MacOs => "On macOS, install Ghostscript with: 'brew install ghostscript'".into(),
            Platform::Linux => "On Linux, install Ghostscript with: 'sudo apt-get install ghostscript' \
(Debian/Ubuntu) or 'sudo yum install ghostscript' (RHEL/CentOS)"
                .into(),
            Platform::Windows => format!(
                "On Windows, download and install Ghostscript from {WINDOWS_DOWNLOAD_URL}"
            ),
            Platform::Other => "Install Ghostscript with your system's package manager".into(),
        }
    }

    /// Full remediation text: install hint plus the aliasing warning.
    pub fn remediation(self) -> String {
        format!("{}\n{}", self.install_hint(), ALIAS_WARNING)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Other => "other",
        };
        f.write_str(name)
    }
}

// ── Image assemblers ─────────────────────────────────────────────────────────

/// A dedicated image-to-PDF assembler found on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAssembler {
    /// ImageMagick 7 `magick`.
    Magick(PathBuf),
    /// ImageMagick 6 `convert`.
    LegacyConvert(PathBuf),
}

impl ImageAssembler {
    pub fn program(&self) -> &Path {
        match self {
            ImageAssembler::Magick(p) | ImageAssembler::LegacyConvert(p) => p,
        }
    }

    /// Short name for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            ImageAssembler::Magick(_) => "magick",
            ImageAssembler::LegacyConvert(_) => "convert",
        }
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate Ghostscript: `FLATTEN_GS_PATH` first, then `PATH`.
pub fn locate_ghostscript() -> Result<PathBuf, ProbeError> {
    if let Some(value) = std::env::var_os(GHOSTSCRIPT_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        if path.is_file() {
            return Ok(path);
        }
        return Err(ProbeError::OverrideMissing {
            var: GHOSTSCRIPT_ENV,
            path,
        });
    }

    let candidates = Platform::current().ghostscript_candidates();
    candidates
        .iter()
        .find_map(|name| find_executable(name))
        .ok_or_else(|| ProbeError::NotFound {
            engine: "Ghostscript",
            tried: candidates.join(", "),
        })
}

/// Locate the preferred image assembler: `FLATTEN_MAGICK_PATH`, then
/// `magick`, then legacy `convert` (skipped on Windows).
pub fn locate_image_assembler() -> Option<ImageAssembler> {
    if let Some(value) = std::env::var_os(MAGICK_ENV).filter(|v| !v.is_empty()) {
        let path = PathBuf::from(value);
        if path.is_file() {
            return Some(ImageAssembler::Magick(path));
        }
    }

    if let Some(path) = find_executable("magick") {
        return Some(ImageAssembler::Magick(path));
    }
    if Platform::current() == Platform::Windows {
        return None;
    }
    find_executable("convert").map(ImageAssembler::LegacyConvert)
}

/// Search `PATH` for an executable called `name`.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_executable_in(name, std::env::split_paths(&path_var))
}

/// Search the given directories, in order, for an executable called `name`.
///
/// On Windows each `PATHEXT` extension is tried as well.
pub fn find_executable_in<I>(name: &str, dirs: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let names = candidate_file_names(name);
    dirs.into_iter()
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| names.iter().map(move |n| dir.join(n)))
        .find(|candidate| is_executable(candidate))
}

/// Does `--version` output look like a real Ghostscript version string?
///
/// A stub or a shell alias can exit 0 while printing nothing useful, so a
/// successful exit code alone proves nothing. Ghostscript prints
/// `major.minor[.patch]` on its own line.
pub fn is_genuine_version(output: &str) -> bool {
    RE_VERSION.is_match(output)
}

/// Extract the first version-looking line from `--version` output.
pub fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| is_genuine_version(line))
        .map(str::to_string)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn candidate_file_names(name: &str) -> Vec<OsString> {
    let mut names = vec![OsString::from(name)];
    if cfg!(windows) && Path::new(name).extension().is_none() {
        let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".EXE;.BAT;.CMD".into());
        names.extend(
            pathext
                .split(';')
                .filter(|ext| !ext.is_empty())
                .map(|ext| OsString::from(format!("{name}{}", ext.to_ascii_lowercase()))),
        );
    }
    names
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genuine_version_strings() {
        assert!(is_genuine_version("10.02.1\n"));
        assert!(is_genuine_version("9.56"));
        assert!(!is_genuine_version(""));
        assert!(!is_genuine_version("On branch main\nnothing to commit"));
        assert!(!is_genuine_version("gs: command not found"));
    }

    #[test]
    fn parse_version_skips_noise() {
        let out = "GPL Ghostscript banner\n10.03.0\n";
        assert_eq!(parse_version(out).as_deref(), Some("10.03.0"));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn every_platform_has_a_hint_and_the_alias_warning() {
        for p in [Platform::MacOs, Platform::Linux, Platform::Windows, Platform::Other] {
            let msg = p.remediation();
            assert!(msg.contains("Ghostscript"), "{p}: {msg}");
            assert!(msg.contains("alias"), "{p}: {msg}");
        }
        assert!(Platform::MacOs.install_hint().contains("brew"));
        assert!(Platform::Linux.install_hint().contains("apt-get"));
        assert!(Platform::Windows.install_hint().contains("https://"));
    }

    #[test]
    fn windows_prefers_console_binaries() {
        assert_eq!(Platform::Windows.ghostscript_candidates()[0], "gswin64c");
        assert_eq!(Platform::Linux.ghostscript_candidates(), &["gs"]);
    }

    #[test]
    fn assembler_labels() {
        let m = ImageAssembler::Magick(PathBuf::from("/usr/bin/magick"));
        let c = ImageAssembler::LegacyConvert(PathBuf::from("/usr/bin/convert"));
        assert_eq!(m.label(), "magick");
        assert_eq!(c.label(), "convert");
        assert_eq!(c.program(), Path::new("/usr/bin/convert"));
    }

    #[cfg(unix)]
    #[test]
    fn find_executable_in_respects_order_and_mode() {
        use std::os::unix::fs::PermissionsExt;

        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        // Not executable: must be skipped.
        let plain = first.path().join("gs");
        std::fs::write(&plain, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();

        let real = second.path().join("gs");
        std::fs::write(&real, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&real, std::fs::Permissions::from_mode(0o755)).unwrap();

        let found = find_executable_in(
            "gs",
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
        );
        assert_eq!(found, Some(real));
        assert_eq!(
            find_executable_in("magick", vec![first.path().to_path_buf()]),
            None
        );
    }

    #[test]
    fn ghostscript_override_via_env() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("my-gs");
        std::fs::write(&fake, "").unwrap();

        std::env::set_var(GHOSTSCRIPT_ENV, &fake);
        let found = locate_ghostscript();
        std::env::set_var(GHOSTSCRIPT_ENV, dir.path().join("missing"));
        let missing = locate_ghostscript();
        std::env::remove_var(GHOSTSCRIPT_ENV);

        assert_eq!(found.unwrap(), fake);
        assert!(matches!(missing, Err(ProbeError::OverrideMissing { .. })));
    }
}
