//! Variable scoping.
//!
//! Every host's environment is assembled from ordered layers, lowest
//! precedence first:
//!
//! 1. the `all` group
//! 2. named groups, parent before child
//! 3. the host itself
//! 4. play `vars`
//! 5. run-time overrides (`-e`)
//!
//! A later layer replaces keys set by an earlier one. Nested mappings are
//! replaced wholesale, never merged.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable precedence levels (from lowest to highest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum VarPrecedence {
    /// Variables of the implicit `all` group
    AllGroup = 1,
    /// Variables of a named group
    Group = 2,
    /// Host variables (inline, inventory sections, host_vars/)
    Host = 3,
    /// Play `vars`
    Play = 4,
    /// Extra vars (`-e`), highest priority
    Extra = 5,
}

impl VarPrecedence {
    /// Get the precedence level number
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for VarPrecedence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VarPrecedence::AllGroup => "all group vars",
            VarPrecedence::Group => "group vars",
            VarPrecedence::Host => "host vars",
            VarPrecedence::Play => "play vars",
            VarPrecedence::Extra => "extra vars",
        };
        write!(f, "{}", name)
    }
}

/// One scope of variables at a given precedence
#[derive(Debug, Clone)]
pub struct VarLayer {
    pub precedence: VarPrecedence,
    /// Group, host or play name the layer came from
    pub source: String,
    pub vars: IndexMap<String, Value>,
}

impl VarLayer {
    pub fn new(
        precedence: VarPrecedence,
        source: impl Into<String>,
        vars: IndexMap<String, Value>,
    ) -> Self {
        Self {
            precedence,
            source: source.into(),
            vars,
        }
    }
}

/// Where a resolved variable got its value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VarOrigin {
    pub precedence: VarPrecedence,
    pub source: String,
}

/// A resolved variable environment for one host
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostVars {
    values: IndexMap<String, Value>,
    #[serde(skip)]
    origins: IndexMap<String, VarOrigin>,
}

impl HostVars {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold layers in order; later layers win.
    pub fn from_layers(layers: impl IntoIterator<Item = VarLayer>) -> Self {
        let mut vars = Self::new();
        for layer in layers {
            vars.apply(layer);
        }
        vars
    }

    /// Apply a layer on top of the current values
    pub fn apply(&mut self, layer: VarLayer) {
        for (key, value) in layer.vars {
            self.origins.insert(
                key.clone(),
                VarOrigin {
                    precedence: layer.precedence,
                    source: layer.source.clone(),
                },
            );
            self.values.insert(key, value);
        }
    }

    /// Builder form of [`HostVars::apply`]
    pub fn with_layer(mut self, layer: VarLayer) -> Self {
        self.apply(layer);
        self
    }

    /// Set a single value at the given precedence
    pub fn set(&mut self, key: impl Into<String>, value: Value, precedence: VarPrecedence) {
        let key = key.into();
        self.origins.insert(
            key.clone(),
            VarOrigin {
                precedence,
                source: String::new(),
            },
        );
        self.values.insert(key, value);
    }

    /// Get a top-level variable
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a dotted path such as `nginx.port` or `servers.0`
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Check whether a top-level variable is set
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Which layer supplied a variable
    pub fn origin(&self, key: &str) -> Option<&VarOrigin> {
        self.origins.get(key)
    }

    /// Iterate over variables in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Borrow the underlying mapping
    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<IndexMap<String, Value>> for HostVars {
    fn from(values: IndexMap<String, Value>) -> Self {
        Self::from_layers([VarLayer::new(VarPrecedence::Extra, "", values)])
    }
}
