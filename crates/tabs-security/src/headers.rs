//! HTTP response headers for tab content.

/// Content Security Policy sent with tab responses.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline'; \
    style-src 'self' 'unsafe-inline'; \
    img-src 'self' data: https:; \
    font-src 'self' https:; \
    connect-src 'self'; \
    frame-ancestors 'self'";

/// Headers to attach to responses carrying tab content.
///
/// Empty when XSS protection is off.
#[must_use]
pub fn security_headers(xss_protection: bool) -> Vec<(&'static str, &'static str)> {
    if !xss_protection {
        return Vec::new();
    }
    vec![
        ("X-XSS-Protection", "1; mode=block"),
        ("X-Content-Type-Options", "nosniff"),
        ("X-Frame-Options", "SAMEORIGIN"),
        ("Content-Security-Policy", CONTENT_SECURITY_POLICY),
    ]
}
