//! Rewriting module references in compiled output.
//!
//! The compiler emits `require("../Data.Foo")` for imports and
//! `require("./foreign.js")` for a module's native companion. Callers load
//! compiled text outside the output tree, so imports are pointed at the
//! importee's source file (resolved through the [`ModuleIndex`]) and the
//! companion at its absolute location in the output directory.

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, NoExpand, Regex};

use crate::module_index::ModuleIndex;

fn sibling_require() -> &'static Regex {
    static SIBLING: OnceLock<Regex> = OnceLock::new();
    SIBLING.get_or_init(|| {
        Regex::new(r#"require\(\s*['"]\.\./([\w.]+)(?:/index\.js)?['"]\s*\)"#)
            .expect("valid sibling require regex")
    })
}

fn foreign_require() -> &'static Regex {
    static FOREIGN: OnceLock<Regex> = OnceLock::new();
    FOREIGN.get_or_init(|| {
        Regex::new(r#"require\(\s*['"]\./foreign(?:\.js)?['"]\s*\)"#)
            .expect("valid foreign require regex")
    })
}

fn require_of(path: &Path) -> String {
    let literal = serde_json::Value::String(path.to_string_lossy().into_owned());
    format!("require({literal})")
}

/// Rewrite the compiled text of `module`.
///
/// Imports of modules missing from `index` are left untouched.
#[must_use]
pub fn rewrite_references(
    compiled: &str,
    module: &str,
    index: &ModuleIndex,
    output_dir: &Path,
) -> String {
    let siblings = sibling_require().replace_all(compiled, |caps: &Captures<'_>| {
        match index.get(&caps[1]) {
            Some(path) => require_of(path),
            None => {
                tracing::debug!(module, import = &caps[1], "import not in module index");
                caps[0].to_string()
            }
        }
    });

    let foreign = require_of(&output_dir.join(module).join("foreign.js"));
    foreign_require()
        .replace_all(&siblings, NoExpand(&foreign))
        .into_owned()
}
