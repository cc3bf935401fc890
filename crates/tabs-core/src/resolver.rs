//! Active tab resolution.
//!
//! Candidates are tried in precedence order: the explicit value handed in by
//! the host, the tab encoded in the location (when routable), the tab
//! remembered in the session (when enabled), then the configured default.
//! A candidate is accepted only if it is well formed, present in the visible
//! collection, and authorized for the subject. Rejected candidates fall
//! through to the next source and are reported in the resolution trail.

use std::sync::Arc;

use serde::Serialize;
use tabs_config::{DefaultTab, NavigationConfig};
use tabs_security::{Access, DenialReason, InvalidIdentifier, SecurityGate, Subject};

use crate::location::{LocationSnapshot, UrlBuilder};
use crate::registry::TabCollection;
use crate::session::{SessionStore, remembered_tab_key};

/// Where an active-tab candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    Explicit,
    Url,
    Remembered,
    Default,
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Invalid(InvalidIdentifier),
    NotFound,
    Denied(DenialReason),
}

/// A rejected candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub source: CandidateSource,
    pub tab_id: String,
    pub rejection: Rejection,
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The accepted tab, or `None` when no visible tab is accessible.
    pub active: Option<String>,
    pub source: Option<CandidateSource>,
    /// Rejected candidates, in the order they were tried.
    pub denials: Vec<Denial>,
}

/// Inputs of one resolution pass.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub collection: &'a TabCollection,
    pub explicit: Option<&'a str>,
    pub location: Option<&'a LocationSnapshot>,
    pub instance_id: &'a str,
    pub subject: Option<&'a Subject>,
}

/// Picks the active tab from the available sources.
pub struct ActiveTabResolver {
    gate: Arc<SecurityGate>,
    urls: UrlBuilder,
    routable: bool,
    remember_tab: bool,
    default_tab: DefaultTab,
    session: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for ActiveTabResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveTabResolver")
            .field("urls", &self.urls)
            .field("routable", &self.routable)
            .field("remember_tab", &self.remember_tab)
            .field("default_tab", &self.default_tab)
            .finish_non_exhaustive()
    }
}

impl ActiveTabResolver {
    pub fn new(
        gate: Arc<SecurityGate>,
        navigation: &NavigationConfig,
        session: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            gate,
            urls: UrlBuilder::new(navigation.url_strategy, navigation.query_param.clone()),
            routable: navigation.routable,
            remember_tab: navigation.remember_tab,
            default_tab: navigation.default_tab.clone(),
            session,
        }
    }

    #[must_use]
    pub fn is_routable(&self) -> bool {
        self.routable
    }

    #[must_use]
    pub fn urls(&self) -> &UrlBuilder {
        &self.urls
    }

    /// Accept `raw` if it names a visible tab the subject may open.
    pub fn check(
        &self,
        collection: &TabCollection,
        raw: &str,
        subject: Option<&Subject>,
    ) -> Result<String, Rejection> {
        let id = self
            .gate
            .validate_identifier(raw)
            .map_err(Rejection::Invalid)?;
        let tab = collection.get(id.as_str()).ok_or(Rejection::NotFound)?;
        match self.gate.authorize(&tab.access_target(), subject) {
            Access::Allowed => Ok(id.into_string()),
            Access::Denied(reason) => Err(Rejection::Denied(reason)),
        }
    }

    /// Raw tab id in `location`, if routing is enabled.
    #[must_use]
    pub fn url_candidate<'a>(&self, location: &'a LocationSnapshot) -> Option<&'a str> {
        if !self.routable {
            return None;
        }
        self.urls.tab_from(location)
    }

    /// Tab remembered for `instance_id`, if remembering is enabled.
    #[must_use]
    pub fn remembered(&self, instance_id: &str) -> Option<String> {
        if !self.remember_tab {
            return None;
        }
        self.session.get(&remembered_tab_key(instance_id))
    }

    /// Persist the active tab for `instance_id`, if remembering is enabled.
    pub fn remember(&self, instance_id: &str, tab_id: &str) {
        if self.remember_tab {
            self.session.put(&remembered_tab_key(instance_id), tab_id);
        }
    }

    /// Resolve the active tab.
    #[must_use]
    pub fn resolve(&self, request: &ResolveRequest<'_>) -> Resolution {
        let mut resolution = Resolution::default();

        let remembered = self.remembered(request.instance_id);
        let candidates = [
            (CandidateSource::Explicit, request.explicit),
            (
                CandidateSource::Url,
                request.location.and_then(|l| self.url_candidate(l)),
            ),
            (CandidateSource::Remembered, remembered.as_deref()),
        ];
        for (source, raw) in candidates {
            if let Some(raw) = raw
                && self.accept(&mut resolution, request, source, raw)
            {
                return resolution;
            }
        }

        let configured = match &self.default_tab {
            DefaultTab::Id(id) => Some(id.as_str()),
            DefaultTab::First | DefaultTab::Last => None,
        };
        if let Some(id) = configured
            && self.accept(&mut resolution, request, CandidateSource::Default, id)
        {
            return resolution;
        }

        let mut ordered: Vec<&str> = request.collection.ids().collect();
        if self.default_tab == DefaultTab::Last {
            ordered.reverse();
        }
        for id in ordered {
            if Some(id) != configured
                && self.accept(&mut resolution, request, CandidateSource::Default, id)
            {
                return resolution;
            }
        }

        tracing::debug!(
            instance_id = request.instance_id,
            tabs = request.collection.len(),
            "no accessible tab"
        );
        resolution
    }

    fn accept(
        &self,
        resolution: &mut Resolution,
        request: &ResolveRequest<'_>,
        source: CandidateSource,
        raw: &str,
    ) -> bool {
        match self.check(request.collection, raw, request.subject) {
            Ok(id) => {
                tracing::debug!(
                    instance_id = request.instance_id,
                    tab_id = %id,
                    ?source,
                    "resolved active tab"
                );
                resolution.active = Some(id);
                resolution.source = Some(source);
                true
            }
            Err(rejection) => {
                resolution.denials.push(Denial {
                    source,
                    tab_id: raw.to_owned(),
                    rejection,
                });
                false
            }
        }
    }
}
