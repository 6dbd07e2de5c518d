//! Configuration loading for kiln.
//!
//! A project is configured by `kiln.toml` at its root. Every field has a
//! default, so an absent file is a valid (default) configuration:
//!
//! ```toml
//! output = "output"
//! src = ["src/**/*.purs", ".spago/*/*/src/**/*.purs"]
//! warnings = true
//!
//! [compiler]
//! command = "purs"
//! args = ["compile"]
//!
//! [bundle]
//! enabled = true
//! namespace = "PS"
//!
//! [ide]
//! enabled = true
//! command = "${HOME}/.local/bin/purs"
//! ```
//!
//! `${VAR}` references in commands and arguments are expanded from the
//! environment at load time.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Error types for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilnConfig {
    /// Compiler output directory, relative to the project root.
    pub output: PathBuf,
    /// Source file globs, relative to the project root.
    pub src: Vec<String>,
    /// Foreign (native companion) file globs. Derived from `src` when empty.
    pub ffi: Vec<String>,
    /// Surface compiler warnings to the host.
    pub warnings: bool,
    /// Color diagnostic snippet markers.
    pub colors: bool,
    pub compiler: CompilerConfig,
    pub bundle: BundleConfig,
    pub ide: IdeConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("output"),
            src: vec!["src/**/*.purs".to_string()],
            ffi: Vec::new(),
            warnings: true,
            colors: false,
            compiler: CompilerConfig::default(),
            bundle: BundleConfig::default(),
            ide: IdeConfig::default(),
        }
    }
}

/// Full-compile invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub command: String,
    /// Leading arguments, placed before the source globs.
    pub args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: "purs".to_string(),
            args: vec!["compile".to_string()],
        }
    }
}

/// Bundling step run once after a successful full compile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Bundle artifact path, relative to the project root.
    pub output: PathBuf,
    /// Global the bundle exposes its modules under.
    pub namespace: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "purs".to_string(),
            args: vec!["bundle".to_string()],
            output: PathBuf::from("output/bundle.js"),
            namespace: "PS".to_string(),
        }
    }
}

/// Long-lived analysis server used for incremental rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdeConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Connection retries after the first attempt.
    pub retries: u32,
    pub retry_interval_ms: u64,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: "purs".to_string(),
            args: vec!["ide".to_string(), "server".to_string()],
            retries: 9,
            retry_interval_ms: 333,
        }
    }
}

impl IdeConfig {
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Replace `${VAR}` with the value of `VAR` (empty when unset).
///
/// An unterminated `${` is kept literally.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end + 1..];
    }

    out.push_str(rest);
    out
}

impl KilnConfig {
    /// Load the configuration at `path`. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.expanded())
    }

    /// Load `kiln.toml` from the project root.
    pub fn load_from_dir(root: &Path) -> Result<Self, ConfigError> {
        Self::load(&root.join(CONFIG_FILE_NAME))
    }

    fn expanded(mut self) -> Self {
        for (command, args) in [
            (&mut self.compiler.command, &mut self.compiler.args),
            (&mut self.bundle.command, &mut self.bundle.args),
            (&mut self.ide.command, &mut self.ide.args),
        ] {
            *command = expand_env_vars(command);
            for arg in args.iter_mut() {
                *arg = expand_env_vars(arg);
            }
        }
        self
    }

    /// Foreign companion globs: `ffi` when set, otherwise each source glob
    /// with its file extension swapped for `.js`.
    #[must_use]
    pub fn ffi_globs(&self) -> Vec<String> {
        if !self.ffi.is_empty() {
            return self.ffi.clone();
        }
        self.src
            .iter()
            .filter_map(|glob| {
                let (stem, ext) = glob.rsplit_once('.')?;
                (!ext.contains('/') && ext != "js").then(|| format!("{stem}.js"))
            })
            .collect()
    }
}
