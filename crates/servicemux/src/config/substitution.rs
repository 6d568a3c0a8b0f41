//! Argument templating: `$path` placeholder and environment expansion
//!
//! Environment references follow shell rules:
//! - `$NAME` takes the longest run of letters, digits and `_`
//! - `${NAME}` takes everything up to the first `}`
//! - `$1`, `$$`, `$?` and the other special names are one character long
//! - an unclosed `${` is dropped, and a `$` before anything else is kept
//!
//! Unset variables expand to the empty string.

use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

/// Placeholder replaced with the service working directory
pub const PATH_PLACEHOLDER: &str = "$path";

/// Regex for environment references: ${NAME}, a bare ${, $<special> or $NAME
static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]*)\}|\$\{|\$([*#$@!?0-9-])|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
});

/// Substitution context for a single service
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Resolved working directory for `$path`
    pub path: Option<String>,
}

impl SubstitutionContext {
    /// Create a new substitution context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory `$path` resolves to
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.to_string_lossy().into_owned());
        self
    }

    /// Expand a single argument template.
    ///
    /// `$path` is replaced first, so a working directory that itself contains
    /// `$NAME` references is expanded too.
    pub fn substitute(&self, input: &str) -> String {
        let with_path = match &self.path {
            Some(path) => input.replace(PATH_PLACEHOLDER, path),
            None => input.to_string(),
        };

        expand_env(&with_path)
    }

    /// Expand every argument of a service
    pub fn substitute_all(&self, inputs: &[String]) -> Vec<String> {
        inputs.iter().map(|arg| self.substitute(arg)).collect()
    }
}

fn expand_env(input: &str) -> String {
    ENV_PATTERN
        .replace_all(input, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            lookup(name)
        })
        .into_owned()
}

fn lookup(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    std::env::var(name).unwrap_or_default()
}
