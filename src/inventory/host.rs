//! Host definition for the inventory.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::parse_ini_value;

/// Variable naming the transport used to reach a host.
pub const CONNECTION_VAR: &str = "converge_connection";

/// Variable naming a directory every path on the host is resolved under.
pub const ROOT_VAR: &str = "converge_root";

/// Errors raised while parsing an inventory host line
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostParseError {
    #[error("empty host definition")]
    EmptyInput,

    #[error("unterminated quote in host definition: {0}")]
    UnterminatedQuote(String),

    #[error("invalid host variable '{0}', expected key=value")]
    InvalidVariable(String),
}

/// A host in the inventory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    /// Host identifier (name or address)
    pub name: String,

    /// Groups this host is a direct member of, in the order it joined them
    #[serde(default)]
    pub groups: IndexSet<String>,

    /// Host-scoped variables
    #[serde(default)]
    pub vars: IndexMap<String, Value>,
}

impl Host {
    /// Create a new host with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: IndexSet::new(),
            vars: IndexMap::new(),
        }
    }

    /// Parse an INI host line such as `web1 port=8443 motd="hello there"`.
    pub fn parse(input: &str) -> Result<Self, HostParseError> {
        let tokens = tokenize(input)?;
        let mut tokens = tokens.into_iter();
        let name = tokens.next().ok_or(HostParseError::EmptyInput)?;

        let mut host = Host::new(name);
        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| HostParseError::InvalidVariable(token.clone()))?;
            if key.is_empty() {
                return Err(HostParseError::InvalidVariable(token.clone()));
            }
            host.vars.insert(key.to_string(), parse_ini_value(value));
        }

        Ok(host)
    }

    /// Record membership in a group
    pub fn add_to_group(&mut self, group: impl Into<String>) {
        self.groups.insert(group.into());
    }

    /// Check if the host is a direct member of the group
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Set a host variable
    pub fn set_var(&mut self, key: impl Into<String>, value: Value) {
        self.vars.insert(key.into(), value);
    }

    /// Get a host variable
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Merge variables (other takes precedence)
    pub fn merge_vars(&mut self, other: &IndexMap<String, Value>) {
        for (key, value) in other {
            self.vars.insert(key.clone(), value.clone());
        }
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Split on whitespace, keeping quoted runs together. Quotes are kept in the
/// token so `parse_ini_value` can tell a quoted string from a bare scalar.
fn tokenize(input: &str) -> Result<Vec<String>, HostParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in input.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None if ch == '"' || ch == '\'' => {
                current.push(ch);
                quote = Some(ch);
            }
            None if ch.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(ch),
        }
    }

    if quote.is_some() {
        return Err(HostParseError::UnterminatedQuote(input.trim().to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
