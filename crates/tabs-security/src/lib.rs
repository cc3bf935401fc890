//! Security services for the tabs engine.
//!
//! [`SecurityGate`] bundles every check a component consults before it
//! mutates state:
//!
//! - Identifier validation ([`TabId`])
//! - Access decisions ([`Authorizer`], [`AuthorizationCheck`], [`PermissionResolver`])
//! - Switch rate limiting ([`RateLimiter`])
//! - Tab-bound CSRF tokens ([`CsrfGuard`])
//! - Content sanitization ([`ContentSanitizer`]) and response headers
//! - Switch debouncing ([`SwitchDebouncer`])
//!
//! All decisions are returned as values. Security events are logged at
//! `warn` with an `event` field.

mod authorize;
mod csrf;
mod debounce;
mod gate;
mod headers;
mod identifier;
mod rate_limit;
mod sanitize;

pub use authorize::{
    Access, AccessTarget, AuthorizationCheck, Authorizer, DenialReason, GrantedPermissions,
    PermissionResolver, Subject,
};
pub use csrf::CsrfGuard;
pub use debounce::SwitchDebouncer;
pub use gate::SecurityGate;
pub use headers::{CONTENT_SECURITY_POLICY, security_headers};
pub use identifier::{InvalidIdentifier, MAX_ID_LEN, TabId, is_valid as is_valid_identifier};
pub use rate_limit::{CallerIdentity, MAX_DECAY, RateLimit, RateLimiter};
pub use sanitize::{ContentSanitizer, SanitizeMode, escape_html};
