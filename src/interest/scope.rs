use std::collections::BTreeSet;

use crate::endpoint::EndpointDescription;

use super::PropertyFilter;

/// What a consumer wants to hear about: interface names plus an optional
/// property filter. An absent filter matches every endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestScope {
    pub interfaces: BTreeSet<String>,
    pub filter: Option<PropertyFilter>,
}

impl InterestScope {
    pub fn new(
        interfaces: impl IntoIterator<Item = impl Into<String>>,
        filter: Option<PropertyFilter>,
    ) -> Self {
        Self {
            interfaces: interfaces.into_iter().map(Into::into).collect(),
            filter,
        }
    }

    /// Unfiltered interest in `interfaces`.
    pub fn for_interfaces(interfaces: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(interfaces, None)
    }

    pub fn with_filter(
        mut self,
        filter: PropertyFilter,
    ) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn matches(
        &self,
        endpoint: &EndpointDescription,
    ) -> bool {
        match &self.filter {
            Some(filter) => filter.matches(endpoint.properties()),
            None => true,
        }
    }
}
