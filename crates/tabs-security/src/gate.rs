//! Single entry point for every security decision made around a tab.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use tabs_config::{PerformanceConfig, RateLimitKey, SecurityConfig};

use crate::authorize::{
    Access, AccessTarget, AuthorizationCheck, Authorizer, DenialReason, PermissionResolver,
    Subject,
};
use crate::csrf::CsrfGuard;
use crate::debounce::SwitchDebouncer;
use crate::headers::security_headers;
use crate::identifier::{InvalidIdentifier, TabId};
use crate::rate_limit::{CallerIdentity, RateLimit, RateLimiter};
use crate::sanitize::ContentSanitizer;

/// Security services shared by every component in a process.
///
/// None of these checks touch component state. Callers consult them before
/// mutating anything.
#[derive(Debug)]
pub struct SecurityGate {
    authorizer: Authorizer,
    rate_limiter: RateLimiter,
    rate_limit_key: RateLimitKey,
    csrf: CsrfGuard,
    sanitizer: ContentSanitizer,
    debouncer: SwitchDebouncer,
    xss_protection: bool,
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default(), &PerformanceConfig::default())
    }
}

impl SecurityGate {
    /// Build the gate from configuration.
    #[must_use]
    pub fn from_config(security: &SecurityConfig, performance: &PerformanceConfig) -> Self {
        let rate = &security.rate_limit;
        Self {
            authorizer: Authorizer::new(security.authorization, security.checks.clone()),
            rate_limiter: RateLimiter::new(rate.enabled, rate.attempts, rate.decay()),
            rate_limit_key: rate.key,
            csrf: CsrfGuard::new(security.csrf, security.csrf_secret.clone()),
            sanitizer: ContentSanitizer::from_flags(
                security.sanitize_html,
                security.escape_content,
            ),
            debouncer: SwitchDebouncer::new(performance.debounce()),
            xss_protection: security.xss_protection,
        }
    }

    /// Register a named global check.
    #[must_use]
    pub fn with_check(mut self, check: Arc<dyn AuthorizationCheck>) -> Self {
        self.authorizer.register(check);
        self
    }

    /// Replace the permission resolver.
    #[must_use]
    pub fn with_permission_resolver(mut self, resolver: Arc<dyn PermissionResolver>) -> Self {
        self.authorizer.set_permission_resolver(resolver);
        self
    }

    /// Replace the rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter, key: RateLimitKey) -> Self {
        self.rate_limiter = limiter;
        self.rate_limit_key = key;
        self
    }

    /// Replace the switch debouncer.
    #[must_use]
    pub fn with_debouncer(mut self, debouncer: SwitchDebouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    /// Validate a raw identifier from outside the process.
    pub fn validate_identifier(&self, raw: &str) -> Result<TabId, InvalidIdentifier> {
        TabId::parse(raw).inspect_err(|e| {
            tracing::debug!(error = %e, "rejected tab identifier");
        })
    }

    /// Decide whether `subject` may access `target`.
    ///
    /// Denials other than a disabled tab are logged as security events.
    #[must_use]
    pub fn authorize(&self, target: &AccessTarget<'_>, subject: Option<&Subject>) -> Access {
        let access = self.authorizer.authorize(target, subject);
        if let Access::Denied(reason) = &access
            && *reason != DenialReason::Disabled
        {
            tracing::warn!(
                tab_id = target.id,
                subject = subject.map(|s| s.id.as_str()),
                %reason,
                event = "tab_access_denied",
                "tabs security event"
            );
        }
        access
    }

    /// Caller key for rate limiting under the configured key kind.
    #[must_use]
    pub fn caller_key(&self, identity: &CallerIdentity) -> String {
        identity.caller_key(self.rate_limit_key)
    }

    /// Count a switch attempt. Limited attempts are logged and not counted.
    pub fn check_rate_limit(&self, tab_id: &str, caller_key: &str) -> RateLimit {
        let result = self.rate_limiter.check(tab_id, caller_key);
        if result.is_limited() {
            tracing::warn!(
                tab_id,
                caller = caller_key,
                event = "rate_limit_exceeded",
                "tabs security event"
            );
        }
        result
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    #[must_use]
    pub fn csrf_token(&self, tab_id: &str, session_id: &str) -> String {
        self.csrf.token(tab_id, session_id)
    }

    #[must_use]
    pub fn verify_csrf(&self, token: &str, tab_id: &str, session_id: &str) -> bool {
        self.csrf.verify(token, tab_id, session_id)
    }

    #[must_use]
    pub fn sanitize<'a>(&self, content: &'a str) -> Cow<'a, str> {
        self.sanitizer.sanitize(content)
    }

    #[must_use]
    pub fn security_headers(&self) -> Vec<(&'static str, &'static str)> {
        security_headers(self.xss_protection)
    }

    /// Whether a repeated switch should be suppressed.
    #[must_use]
    pub fn is_debounced(&self, session_id: &str, tab_id: &str) -> bool {
        self.debouncer.is_debounced(session_id, tab_id)
    }

    /// Record a committed switch so repeats inside the window are suppressed.
    pub fn record_switch(&self, session_id: &str, tab_id: &str) {
        self.debouncer.record(session_id, tab_id);
    }

    #[must_use]
    pub fn debounce_window(&self) -> Duration {
        self.debouncer.window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabs_config::RateLimitConfig;

    fn gate_with(security: SecurityConfig) -> SecurityGate {
        SecurityGate::from_config(&security, &PerformanceConfig::default())
    }

    #[test]
    fn test_default_gate() {
        let gate = SecurityGate::default();
        assert!(gate.validate_identifier("profile").is_ok());
        assert!(gate.validate_identifier("../../etc").is_err());
        assert!(!gate.check_rate_limit("a", "x").is_limited());
        assert_eq!(gate.csrf_token("a", "s"), "");
        assert!(gate.verify_csrf("", "a", "s"));
        assert_eq!(gate.security_headers().len(), 4);
        assert_eq!(gate.debounce_window(), Duration::from_millis(150));
    }

    #[test]
    fn test_from_config_wires_rate_limit() {
        let gate = gate_with(SecurityConfig {
            rate_limit: RateLimitConfig {
                enabled: true,
                attempts: 2,
                decay_secs: 60,
                key: RateLimitKey::Session,
            },
            ..SecurityConfig::default()
        });
        let key = gate.caller_key(&CallerIdentity {
            session_id: Some("sess".to_owned()),
            ip: Some("1.1.1.1".to_owned()),
            ..CallerIdentity::default()
        });
        assert_eq!(key, "sess");

        assert!(!gate.check_rate_limit("a", &key).is_limited());
        assert!(!gate.check_rate_limit("a", &key).is_limited());
        assert!(gate.check_rate_limit("a", &key).is_limited());
        assert_eq!(gate.rate_limiter().remaining_attempts("a", &key), Some(0));
    }

    #[test]
    fn test_from_config_wires_checks_and_csrf() {
        let gate = gate_with(SecurityConfig {
            checks: vec!["auth".to_owned()],
            csrf: true,
            csrf_secret: "k".to_owned(),
            ..SecurityConfig::default()
        });
        let target = AccessTarget {
            id: "a",
            disabled: false,
            permissions: &[],
        };
        assert_eq!(
            gate.authorize(&target, None),
            Access::Denied(DenialReason::CheckFailed("auth".to_owned()))
        );

        let token = gate.csrf_token("a", "s");
        assert!(gate.verify_csrf(&token, "a", "s"));
    }

    #[test]
    fn test_from_config_wires_sanitizer() {
        let gate = gate_with(SecurityConfig {
            sanitize_html: true,
            ..SecurityConfig::default()
        });
        assert_eq!(gate.sanitize("<script>x</script>"), "x");
    }

    #[test]
    fn test_authorization_off_only_enforces_disabled() {
        let gate = gate_with(SecurityConfig {
            authorization: false,
            checks: vec!["auth".to_owned()],
            ..SecurityConfig::default()
        });
        let open = AccessTarget {
            id: "a",
            disabled: false,
            permissions: &[],
        };
        let disabled = AccessTarget {
            disabled: true,
            ..open
        };
        assert!(gate.authorize(&open, None).is_allowed());
        assert!(!gate.authorize(&disabled, None).is_allowed());
    }
}
