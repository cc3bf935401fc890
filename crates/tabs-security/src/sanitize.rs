//! Protection of produced tab content.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Tags removed in strip mode. Only the tags go; their inner text stays.
static DANGEROUS_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?\s*(?:script|iframe|object|embed|form|input|textarea|select|button)\b[^>]*>",
    )
    .unwrap()
});

/// Inline event handlers such as `onclick="..."`.
static EVENT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s*\bon[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap()
});

/// Attributes whose value uses a scriptable URL scheme.
static SCRIPT_URL_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\s*\b[a-z][a-z0-9:_-]*\s*=\s*(?:"\s*(?:javascript|vbscript|data):[^"]*"|'\s*(?:javascript|vbscript|data):[^']*'|(?:javascript|vbscript|data):[^\s>]*)"#,
    )
    .unwrap()
});

/// How content is treated before it reaches the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SanitizeMode {
    /// Pass through untouched.
    #[default]
    Off,
    /// Remove dangerous tags and attributes.
    Strip,
    /// HTML-escape everything.
    Escape,
}

/// Applies the configured [`SanitizeMode`] to content.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentSanitizer {
    mode: SanitizeMode,
}

impl ContentSanitizer {
    #[must_use]
    pub fn new(mode: SanitizeMode) -> Self {
        Self { mode }
    }

    /// Mode from the `sanitize_html` and `escape_content` settings.
    #[must_use]
    pub fn from_flags(sanitize_html: bool, escape_content: bool) -> Self {
        let mode = match (sanitize_html, escape_content) {
            (false, _) => SanitizeMode::Off,
            (true, true) => SanitizeMode::Escape,
            (true, false) => SanitizeMode::Strip,
        };
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> SanitizeMode {
        self.mode
    }

    #[must_use]
    pub fn sanitize<'a>(&self, content: &'a str) -> Cow<'a, str> {
        match self.mode {
            SanitizeMode::Off => Cow::Borrowed(content),
            SanitizeMode::Escape => escape_html(content),
            SanitizeMode::Strip => {
                let stripped = strip_dangerous(content);
                if stripped.len() != content.len() {
                    tracing::warn!(
                        original_length = content.len(),
                        sanitized_length = stripped.len(),
                        event = "content_sanitized",
                        "tabs security event"
                    );
                }
                stripped
            }
        }
    }
}

fn strip_dangerous(content: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(content);
    for re in [&*DANGEROUS_TAG_RE, &*EVENT_ATTR_RE, &*SCRIPT_URL_ATTR_RE] {
        let replaced = match re.replace_all(&out, "") {
            Cow::Borrowed(_) => None,
            Cow::Owned(s) => Some(s),
        };
        if let Some(s) = replaced {
            out = Cow::Owned(s);
        }
    }
    out
}

/// Escape `&`, `<`, `>`, `"` and `'`.
#[must_use]
pub fn escape_html(content: &str) -> Cow<'_, str> {
    if !content.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(content);
    }
    let mut out = String::with_capacity(content.len() + content.len() / 8);
    for c in content.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
