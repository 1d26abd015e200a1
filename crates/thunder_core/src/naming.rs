//! Module name conversions.

use once_cell::sync::Lazy;
use regex::Regex;

static MODULE_DIR_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]+$").expect("module directory pattern is valid")
});

/// Whether `name` may be used as a module directory name.
pub fn is_module_dir_name(name: &str) -> bool {
    MODULE_DIR_NAME.is_match(name)
}

/// `iam_roles` -> `iam-roles`.
pub fn kebab_from_snake(value: &str) -> String {
    value.replace('_', "-")
}

/// `iam-roles` -> `iam_roles`.
pub fn snake_from_kebab(value: &str) -> String {
    value.replace('-', "_")
}
