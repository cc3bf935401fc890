//! Ordered, visibility-filtered sets of tabs.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tabs_security::Subject;

use crate::definition::TabDefinition;

/// Visible tabs for one resolution pass, in declaration order.
///
/// Built fresh for every operation because visibility may depend on the
/// caller. Ids are unique: a later definition with the same id replaces the
/// earlier one but keeps its position.
#[derive(Debug, Clone, Default)]
pub struct TabCollection {
    order: Vec<String>,
    tabs: HashMap<String, Arc<TabDefinition>>,
}

impl TabCollection {
    /// Filter `definitions` through their visibility predicate for `subject`.
    ///
    /// A predicate that panics hides its tab.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = TabDefinition>,
        subject: Option<&Subject>,
    ) -> Self {
        let mut collection = Self::default();
        for tab in definitions {
            if !visible(&tab, subject) {
                continue;
            }
            let id = tab.id().to_owned();
            if collection.tabs.insert(id.clone(), Arc::new(tab)).is_none() {
                collection.order.push(id);
            }
        }
        collection
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<TabDefinition>> {
        self.tabs.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.tabs.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in declaration order.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Tabs in declaration order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<TabDefinition>> {
        self.order.iter().filter_map(|id| self.tabs.get(id))
    }

    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|o| o == id)
    }
}

fn visible(tab: &TabDefinition, subject: Option<&Subject>) -> bool {
    panic::catch_unwind(AssertUnwindSafe(|| tab.is_visible(subject))).unwrap_or_else(|_| {
        tracing::warn!(tab_id = tab.id(), "visibility predicate panicked, hiding tab");
        false
    })
}

type Factory = Arc<dyn Fn() -> Vec<TabDefinition> + Send + Sync>;

/// Source of a component's tab definitions.
///
/// Wraps the host's factory. Each call to [`TabRegistry::collection`] runs
/// the factory again.
#[derive(Clone)]
pub struct TabRegistry {
    factory: Factory,
}

impl fmt::Debug for TabRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabRegistry").finish_non_exhaustive()
    }
}

impl TabRegistry {
    pub fn new(factory: impl Fn() -> Vec<TabDefinition> + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// Registry over a fixed list of definitions.
    #[must_use]
    pub fn from_definitions(definitions: Vec<TabDefinition>) -> Self {
        Self::new(move || definitions.clone())
    }

    /// Visible tabs for `subject`.
    ///
    /// A factory that panics yields an empty collection.
    #[must_use]
    pub fn collection(&self, subject: Option<&Subject>) -> TabCollection {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(definitions) => TabCollection::from_definitions(definitions, subject),
            Err(_) => {
                tracing::warn!("tab factory panicked");
                TabCollection::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tab(id: &str) -> TabDefinition {
        TabDefinition::builder(id).build().unwrap()
    }

    #[test]
    fn test_preserves_order() {
        let collection = TabCollection::from_definitions([tab("c"), tab("a"), tab("b")], None);
        assert_eq!(collection.ids().collect::<Vec<_>>(), vec!["c", "a", "b"]);
        assert_eq!(collection.position("a"), Some(1));
        assert_eq!(collection.len(), 3);
    }

    #[test]
    fn test_filters_invisible() {
        let hidden = TabDefinition::builder("hidden")
            .visible(|_| false)
            .build()
            .unwrap();
        let collection = TabCollection::from_definitions([tab("a"), hidden, tab("b")], None);
        assert!(!collection.contains("hidden"));
        assert_eq!(collection.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_panicking_predicate_hides_tab() {
        let broken = TabDefinition::builder("broken")
            .visible(|_| panic!("boom"))
            .build()
            .unwrap();
        let collection = TabCollection::from_definitions([broken, tab("a")], None);
        assert!(!collection.contains("broken"));
        assert!(collection.contains("a"));
    }

    #[test]
    fn test_duplicate_replaces_in_place() {
        let first = TabDefinition::builder("a").label("First").build().unwrap();
        let second = TabDefinition::builder("a").label("Second").build().unwrap();
        let collection = TabCollection::from_definitions([first, tab("b"), second], None);

        assert_eq!(collection.ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(collection.get("a").unwrap().label(), "Second");
    }

    #[test]
    fn test_registry_reruns_factory_per_subject() {
        let registry = TabRegistry::new(|| {
            vec![
                TabDefinition::builder("public").build().unwrap(),
                TabDefinition::builder("mine")
                    .visible(|subject| subject.is_some())
                    .build()
                    .unwrap(),
            ]
        });

        assert_eq!(registry.collection(None).len(), 1);
        assert_eq!(registry.collection(Some(&Subject::new("1"))).len(), 2);
    }

    #[test]
    fn test_panicking_factory_yields_empty() {
        let registry = TabRegistry::new(|| panic!("factory failed"));
        assert!(registry.collection(None).is_empty());
    }
}
