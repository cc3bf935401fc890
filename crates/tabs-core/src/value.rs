//! Literal-or-computed values.

use std::fmt;
use std::sync::Arc;

/// A value given directly or produced on demand.
///
/// Computed values are evaluated every time [`Value::evaluate`] is called,
/// so they can reflect per-request state such as an unread counter.
pub enum Value<T> {
    Literal(T),
    Computed(Arc<dyn Fn() -> T + Send + Sync>),
}

impl<T: Clone> Value<T> {
    /// Create a computed value.
    pub fn computed(f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Current value.
    #[must_use]
    pub fn evaluate(&self) -> T {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(f) => f(),
        }
    }
}

impl<T> From<T> for Value<T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Value<String> {
    fn from(value: &str) -> Self {
        Self::Literal(value.to_owned())
    }
}

impl<T: Clone> Clone for Value<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(value) => Self::Literal(value.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_literal() {
        let value: Value<String> = "Profile".into();
        assert_eq!(value.evaluate(), "Profile");
    }

    #[test]
    fn test_computed_is_evaluated_each_time() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&counter);
        let value = Value::computed(move || c.fetch_add(1, Ordering::SeqCst) + 1);

        assert_eq!(value.evaluate(), 1);
        assert_eq!(value.evaluate(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_hides_closure() {
        let value: Value<u32> = Value::computed(|| 3);
        assert_eq!(format!("{value:?}"), "Computed(..)");
        assert_eq!(format!("{:?}", Value::Literal(3)), "Literal(3)");
    }
}
