//! Access decisions for tabs.
//!
//! A decision is made in three steps, stopping at the first denial:
//!
//! 1. The tab's disabled flag (always enforced).
//! 2. Global checks configured by name. `auth` requires an authenticated
//!    subject, `guest` requires none, other names are looked up among the
//!    registered [`AuthorizationCheck`]s and pass when none is registered.
//! 3. The tab's own permission list, resolved by a [`PermissionResolver`].
//!    An unauthenticated caller never satisfies a non-empty list.
//!
//! Steps 2 and 3 are skipped when authorization is turned off.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// An authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    /// Permissions granted to this subject.
    pub permissions: BTreeSet<String>,
}

impl Subject {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            permissions: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

/// What an access decision needs to know about a tab.
#[derive(Debug, Clone, Copy)]
pub struct AccessTarget<'a> {
    pub id: &'a str,
    pub disabled: bool,
    pub permissions: &'a [String],
}

/// Why access was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The tab is disabled.
    Disabled,
    /// A global check failed.
    CheckFailed(String),
    /// The caller is not authenticated and the tab requires permissions.
    Unauthenticated,
    /// The caller lacks a required permission.
    MissingPermission(String),
    /// The request carried a missing or forged CSRF token.
    CsrfRejected,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Tab is disabled"),
            Self::CheckFailed(name) => write!(f, "Failed check: {name}"),
            Self::Unauthenticated => f.write_str("Authentication required"),
            Self::MissingPermission(p) => write!(f, "Insufficient permissions: {p}"),
            Self::CsrfRejected => f.write_str("Invalid CSRF token"),
        }
    }
}

/// Outcome of an access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied(DenialReason),
}

impl Access {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Named global check supplied by the host.
pub trait AuthorizationCheck: Send + Sync {
    /// Name the check is configured under.
    fn name(&self) -> &str;

    /// Whether `subject` may open the tab `tab_id`.
    fn allows(&self, subject: Option<&Subject>, tab_id: &str) -> bool;
}

/// Resolves whether a subject holds a permission.
pub trait PermissionResolver: Send + Sync {
    fn has_permission(&self, subject: &Subject, permission: &str) -> bool;
}

/// Looks permissions up in [`Subject::permissions`].
#[derive(Debug, Default, Clone, Copy)]
pub struct GrantedPermissions;

impl PermissionResolver for GrantedPermissions {
    fn has_permission(&self, subject: &Subject, permission: &str) -> bool {
        subject.permissions.contains(permission)
    }
}

/// Runs the three-step access decision.
pub struct Authorizer {
    enabled: bool,
    checks: Vec<String>,
    custom: HashMap<String, Arc<dyn AuthorizationCheck>>,
    permissions: Arc<dyn PermissionResolver>,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("enabled", &self.enabled)
            .field("checks", &self.checks)
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    #[must_use]
    pub fn new(enabled: bool, checks: Vec<String>) -> Self {
        Self {
            enabled,
            checks,
            custom: HashMap::new(),
            permissions: Arc::new(GrantedPermissions),
        }
    }

    /// Register a custom global check under its name.
    pub fn register(&mut self, check: Arc<dyn AuthorizationCheck>) {
        self.custom.insert(check.name().to_owned(), check);
    }

    pub fn set_permission_resolver(&mut self, resolver: Arc<dyn PermissionResolver>) {
        self.permissions = resolver;
    }

    /// Decide whether `subject` may access `target`.
    #[must_use]
    pub fn authorize(&self, target: &AccessTarget<'_>, subject: Option<&Subject>) -> Access {
        if target.disabled {
            return Access::Denied(DenialReason::Disabled);
        }
        if !self.enabled {
            return Access::Allowed;
        }

        if let Some(failed) = self
            .checks
            .iter()
            .find(|name| !self.check_passes(name, subject, target.id))
        {
            return Access::Denied(DenialReason::CheckFailed(failed.clone()));
        }

        if target.permissions.is_empty() {
            return Access::Allowed;
        }
        let Some(subject) = subject else {
            return Access::Denied(DenialReason::Unauthenticated);
        };
        match target
            .permissions
            .iter()
            .find(|p| !self.permissions.has_permission(subject, p))
        {
            Some(missing) => Access::Denied(DenialReason::MissingPermission(missing.clone())),
            None => Access::Allowed,
        }
    }

    fn check_passes(&self, name: &str, subject: Option<&Subject>, tab_id: &str) -> bool {
        match name {
            "auth" => subject.is_some(),
            "guest" => subject.is_none(),
            other => self
                .custom
                .get(other)
                .is_none_or(|check| check.allows(subject, tab_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target<'a>(id: &'a str, permissions: &'a [String]) -> AccessTarget<'a> {
        AccessTarget {
            id,
            disabled: false,
            permissions,
        }
    }

    struct DenyTab(&'static str);

    impl AuthorizationCheck for DenyTab {
        fn name(&self) -> &str {
            "deny-tab"
        }

        fn allows(&self, _subject: Option<&Subject>, tab_id: &str) -> bool {
            tab_id != self.0
        }
    }

    #[test]
    fn test_allows_by_default() {
        let auth = Authorizer::new(true, Vec::new());
        assert_eq!(auth.authorize(&target("a", &[]), None), Access::Allowed);
    }

    #[test]
    fn test_disabled_takes_precedence() {
        let auth = Authorizer::new(true, vec!["guest".to_owned()]);
        let tab = AccessTarget {
            id: "a",
            disabled: true,
            permissions: &[],
        };
        // guest would also fail for an authenticated subject
        assert_eq!(
            auth.authorize(&tab, Some(&Subject::new("1"))),
            Access::Denied(DenialReason::Disabled)
        );
    }

    #[test]
    fn test_disabled_enforced_when_authorization_off() {
        let auth = Authorizer::new(false, vec!["auth".to_owned()]);
        let tab = AccessTarget {
            id: "a",
            disabled: true,
            permissions: &[],
        };
        assert_eq!(
            auth.authorize(&tab, None),
            Access::Denied(DenialReason::Disabled)
        );
        assert!(auth.authorize(&target("b", &[]), None).is_allowed());
    }

    #[test]
    fn test_auth_and_guest_checks() {
        let auth_only = Authorizer::new(true, vec!["auth".to_owned()]);
        assert_eq!(
            auth_only.authorize(&target("a", &[]), None),
            Access::Denied(DenialReason::CheckFailed("auth".to_owned()))
        );
        assert!(auth_only
            .authorize(&target("a", &[]), Some(&Subject::new("1")))
            .is_allowed());

        let guest_only = Authorizer::new(true, vec!["guest".to_owned()]);
        assert!(guest_only.authorize(&target("a", &[]), None).is_allowed());
        assert!(!guest_only
            .authorize(&target("a", &[]), Some(&Subject::new("1")))
            .is_allowed());
    }

    #[test]
    fn test_unknown_check_passes() {
        let auth = Authorizer::new(true, vec!["verified".to_owned()]);
        assert!(auth.authorize(&target("a", &[]), None).is_allowed());
    }

    #[test]
    fn test_custom_check() {
        let mut auth = Authorizer::new(true, vec!["deny-tab".to_owned()]);
        auth.register(Arc::new(DenyTab("secret")));

        assert!(auth.authorize(&target("public", &[]), None).is_allowed());
        assert_eq!(
            auth.authorize(&target("secret", &[]), None),
            Access::Denied(DenialReason::CheckFailed("deny-tab".to_owned()))
        );
    }

    #[test]
    fn test_permissions() {
        let auth = Authorizer::new(true, Vec::new());
        let required = vec!["billing.view".to_owned()];

        assert_eq!(
            auth.authorize(&target("billing", &required), None),
            Access::Denied(DenialReason::Unauthenticated)
        );
        assert_eq!(
            auth.authorize(&target("billing", &required), Some(&Subject::new("1"))),
            Access::Denied(DenialReason::MissingPermission("billing.view".to_owned()))
        );
        let admin = Subject::new("2").with_permission("billing.view");
        assert!(auth
            .authorize(&target("billing", &required), Some(&admin))
            .is_allowed());
    }

    #[test]
    fn test_custom_permission_resolver() {
        struct Everything;
        impl PermissionResolver for Everything {
            fn has_permission(&self, _: &Subject, _: &str) -> bool {
                true
            }
        }

        let mut auth = Authorizer::new(true, Vec::new());
        auth.set_permission_resolver(Arc::new(Everything));
        let required = vec!["anything".to_owned()];
        assert!(auth
            .authorize(&target("a", &required), Some(&Subject::new("1")))
            .is_allowed());
    }

    #[test]
    fn test_denial_reason_messages() {
        assert_eq!(DenialReason::Disabled.to_string(), "Tab is disabled");
        assert_eq!(
            DenialReason::CheckFailed("auth".to_owned()).to_string(),
            "Failed check: auth"
        );
    }
}
