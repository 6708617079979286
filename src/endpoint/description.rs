use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;
use url::Url;

use super::PropertyValue;
use crate::constants::DEFAULT_INTERFACE_VERSION;
use crate::constants::ENDPOINT_ID;
use crate::constants::ENDPOINT_LOCATION;
use crate::constants::SERVICE_INTERFACE_NAME;
use crate::EndpointError;
use crate::Result;

pub type Properties = BTreeMap<String, PropertyValue>;

/// Description of one remotely published endpoint.
///
/// Equality and hashing are structural over the interface set and the full
/// property map. Instances are never mutated in place: [`Self::with_property`]
/// returns a new description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescription {
    interface_names: BTreeSet<String>,
    properties: Properties,
}

impl EndpointDescription {
    /// Single interface, properties default to the interface list.
    pub fn new(interface_name: impl Into<String>) -> Self {
        let name = interface_name.into();
        let mut properties = Properties::new();
        properties.insert(
            SERVICE_INTERFACE_NAME.to_string(),
            PropertyValue::StringList(vec![name.clone()]),
        );
        Self {
            interface_names: BTreeSet::from([name]),
            properties,
        }
    }

    /// Several interfaces, properties default to the interface list in the
    /// given order.
    pub fn with_interfaces<I, S>(interface_names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = interface_names.into_iter().map(Into::into).collect();
        let mut properties = Properties::new();
        properties.insert(
            SERVICE_INTERFACE_NAME.to_string(),
            PropertyValue::StringList(names.clone()),
        );
        Self::with_properties(names, properties)
    }

    /// Interfaces plus an explicit property map, taken as is.
    pub fn with_properties<I, S>(
        interface_names: I,
        properties: Properties,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let interface_names: BTreeSet<String> = interface_names.into_iter().map(Into::into).collect();
        if interface_names.is_empty() {
            return Err(EndpointError::NoInterfaces.into());
        }
        Ok(Self {
            interface_names,
            properties,
        })
    }

    /// Returns a new description with `key` set to `value`.
    pub fn with_property(
        &self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        let mut properties = self.properties.clone();
        properties.insert(key.into(), value.into());
        Self {
            interface_names: self.interface_names.clone(),
            properties,
        }
    }

    pub fn property(
        &self,
        key: &str,
    ) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property_keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn provided_interfaces(&self) -> &BTreeSet<String> {
        &self.interface_names
    }

    pub fn provides(
        &self,
        interface_name: &str,
    ) -> bool {
        self.interface_names.contains(interface_name)
    }

    /// Location URI, `None` when the property is absent or malformed.
    pub fn location(&self) -> Option<Url> {
        let value = self.properties.get(ENDPOINT_LOCATION)?;
        let raw = value.to_string();
        match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(location = %raw, error = %e, "Service document URL is malformed");
                None
            }
        }
    }

    pub fn endpoint_id(&self) -> Option<String> {
        self.properties.get(ENDPOINT_ID).map(ToString::to_string)
    }

    pub fn version(
        &self,
        _interface_name: &str,
    ) -> &'static str {
        DEFAULT_INTERFACE_VERSION
    }

    pub fn endpoint_interface_name<'a>(
        &self,
        interface_name: &'a str,
    ) -> &'a str {
        interface_name
    }

    /// Encodes the description as a coordination node payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| EndpointError::Codec(e).into())
    }

    /// Decodes a coordination node payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let description: Self = bincode::deserialize(bytes).map_err(EndpointError::Codec)?;
        if description.interface_names.is_empty() {
            return Err(EndpointError::NoInterfaces.into());
        }
        Ok(description)
    }
}
