//! Environment variable expansion for configuration strings.

use std::borrow::Cow;

use crate::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` is the dotted config path used in error messages.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    shellexpand::env(value)
        .map(Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: format!("${{{}}} not set", e.var_name),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_unchanged() {
        assert_eq!(expand_env("naptab", "cache.namespace").unwrap(), "naptab");
    }

    #[test]
    fn test_default_used_when_unset() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("TABS_EXPAND_UNSET_TEST");
        }
        let value = expand_env("${TABS_EXPAND_UNSET_TEST:-fallback}", "cache.namespace").unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn test_missing_var_names_field() {
        // SAFETY: test runs single-threaded per test function
        unsafe {
            std::env::remove_var("TABS_EXPAND_MISSING_TEST");
        }
        let err = expand_env("${TABS_EXPAND_MISSING_TEST}", "security.csrf_secret").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("TABS_EXPAND_MISSING_TEST"));
        assert!(msg.contains("security.csrf_secret"));
    }
}
