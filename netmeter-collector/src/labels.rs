//! Label dimensions and tag construction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use netmeter_common::Tag;

use crate::key::SocketAddress;

/// Sentinel emitted when no address is known.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Token for the local side of a connection.
pub const LOCAL_SIDE: &str = "local";

/// Token for the remote side of a connection.
pub const REMOTE_SIDE: &str = "remote";

/// A label dimension.
///
/// Declaration order is the order tags are emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Local,
    Remote,
    PoolType,
    PoolName,
    Side,
}

impl Label {
    pub const ALL: [Label; 5] = [
        Label::Local,
        Label::Remote,
        Label::PoolType,
        Label::PoolName,
        Label::Side,
    ];

    /// Tag key used for this label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Local => "local",
            Label::Remote => "remote",
            Label::PoolType => "pool_type",
            Label::PoolName => "pool_name",
            Label::Side => "side",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Values a producer reports for each label dimension.
///
/// Absent labels are simply not present in the map, so there is no
/// positional alignment to get wrong.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelValues {
    values: BTreeMap<Label, String>,
}

impl LabelValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a label value; `None` clears it.
    pub fn set(&mut self, label: Label, value: Option<impl Into<String>>) {
        match value {
            Some(v) => {
                self.values.insert(label, v.into());
            }
            None => {
                self.values.remove(&label);
            }
        }
    }

    /// Builder form of [`LabelValues::set`].
    pub fn with(mut self, label: Label, value: Option<impl Into<String>>) -> Self {
        self.set(label, value);
        self
    }

    pub fn get(&self, label: Label) -> Option<&str> {
        self.values.get(&label).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build the tag list for the enabled label dimensions.
    ///
    /// One tag per enabled label that has a value, in label declaration order.
    pub fn tags(&self, enabled: &BTreeSet<Label>) -> Vec<Tag> {
        if enabled.is_empty() {
            return Vec::new();
        }

        self.values
            .iter()
            .filter(|(label, _)| enabled.contains(label))
            .map(|(label, value)| Tag::new(label.as_str(), value.clone()))
            .collect()
    }
}

/// Encode an address for use as a label value.
///
/// With a name override the host is replaced and the port kept; a domain
/// socket address becomes the override itself.
pub fn address_label(address: Option<&SocketAddress>, name_override: Option<&str>) -> String {
    let Some(address) = address else {
        return UNKNOWN_ADDRESS.to_string();
    };

    match name_override {
        None => address.to_string(),
        Some(name) if address.is_domain_socket() => name.to_string(),
        Some(name) => address.with_host(name).to_string(),
    }
}

/// Sidedness token for a connection endpoint.
pub fn side(local: bool) -> &'static str {
    if local { LOCAL_SIDE } else { REMOTE_SIDE }
}
