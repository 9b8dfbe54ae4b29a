//! Group definition for the inventory.
//!
//! A `Group` is a named, ordered set of host names with its own variable
//! scope. Groups nest through `children`; the reverse `parents` edges are
//! computed once the whole inventory has been read.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A group of hosts in the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group name
    pub name: String,

    /// Host names belonging directly to this group, in declaration order
    #[serde(default)]
    pub hosts: IndexSet<String>,

    /// Child group names, in declaration order
    #[serde(default)]
    pub children: IndexSet<String>,

    /// Parent group names (computed from children relationships)
    #[serde(skip)]
    pub parents: IndexSet<String>,

    /// Group-scoped variables
    #[serde(default)]
    pub vars: IndexMap<String, Value>,
}

impl Group {
    /// Create a new group with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: IndexSet::new(),
            children: IndexSet::new(),
            parents: IndexSet::new(),
            vars: IndexMap::new(),
        }
    }

    /// Create the implicit "all" group
    pub fn all() -> Self {
        Self::new("all")
    }

    /// Create the implicit "ungrouped" group
    pub fn ungrouped() -> Self {
        Self::new("ungrouped")
    }

    /// Returns true for the two groups every inventory carries.
    pub fn is_implicit(&self) -> bool {
        self.name == "all" || self.name == "ungrouped"
    }

    /// Add a host to this group. Re-adding keeps the original position.
    pub fn add_host(&mut self, host: impl Into<String>) {
        self.hosts.insert(host.into());
    }

    /// Check if a host belongs directly to this group
    pub fn has_host(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    /// Add a child group
    pub fn add_child(&mut self, child: impl Into<String>) {
        self.children.insert(child.into());
    }

    /// Check if a group is a direct child of this group
    pub fn has_child(&self, child: &str) -> bool {
        self.children.contains(child)
    }

    pub(crate) fn add_parent(&mut self, parent: impl Into<String>) {
        self.parents.insert(parent.into());
    }

    /// Check if a group is a direct parent of this group
    pub fn has_parent(&self, parent: &str) -> bool {
        self.parents.contains(parent)
    }

    /// Set a variable on this group
    pub fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Get a variable from this group
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Check if group has a specific variable
    pub fn has_var(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Merge variables from another mapping (other takes precedence)
    pub fn merge_vars(&mut self, other: &IndexMap<String, Value>) {
        for (key, value) in other {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    /// Check if this group is empty (no hosts and no children)
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty() && self.children.is_empty()
    }

    /// Get the number of direct host members
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Group {}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} hosts", self.name, self.hosts.len())?;
        if !self.children.is_empty() {
            write!(f, ", {} children", self.children.len())?;
        }
        write!(f, ")")
    }
}

/// Builder for creating groups with a fluent API
#[derive(Debug, Default)]
pub struct GroupBuilder {
    name: String,
    hosts: IndexSet<String>,
    children: IndexSet<String>,
    vars: IndexMap<String, Value>,
}

impl GroupBuilder {
    /// Create a new group builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a host to the group
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.hosts.insert(host.into());
        self
    }

    /// Add multiple hosts to the group
    pub fn hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for host in hosts {
            self.hosts.insert(host.into());
        }
        self
    }

    /// Add a child group
    pub fn child(mut self, child: impl Into<String>) -> Self {
        self.children.insert(child.into());
        self
    }

    /// Add a variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Build the group
    pub fn build(self) -> Group {
        Group {
            name: self.name,
            hosts: self.hosts,
            children: self.children,
            parents: IndexSet::new(),
            vars: self.vars,
        }
    }
}
