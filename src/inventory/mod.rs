//! Inventory resolution.
//!
//! This module turns raw host/group declarations into a resolved host set:
//! - Loading from INI and YAML (JSON is accepted as YAML) inventories
//! - `group_vars/` and `host_vars/` directories next to the inventory
//! - Group nesting with cycle detection
//! - Per-host variable environments, computed once per load
//! - Host selector expressions (see [`pattern`])

pub mod group;
pub mod host;
pub mod pattern;

pub use group::{Group, GroupBuilder};
pub use host::{Host, HostParseError, CONNECTION_VAR, ROOT_VAR};
pub use pattern::{HostSelector, SelectorOp, SelectorTarget, Subscript};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

use crate::vars::{HostVars, VarLayer, VarPrecedence};

/// Errors that can occur during inventory operations
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("inventory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cyclic group nesting: {}", .cycle.join(" -> "))]
    CyclicGroup { cycle: Vec<String> },

    #[error("unknown group or host '{0}'")]
    UnknownGroup(String),

    #[error("index {index} out of range for group '{group}' ({len} hosts)")]
    IndexOutOfRange {
        group: String,
        index: i64,
        len: usize,
    },

    #[error("invalid host pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid INI inventory at line {line}: {message}")]
    InvalidIniFormat { line: usize, message: String },

    #[error("invalid host at line {line}: {source}")]
    HostParse {
        line: usize,
        #[source]
        source: HostParseError,
    },
}

impl InventoryError {
    /// Selector and nesting errors are structural: they are detected before
    /// any host is touched.
    pub fn is_structural(&self) -> bool {
        !matches!(self, InventoryError::Io(_))
    }
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;

/// The main inventory structure holding all hosts and groups
#[derive(Debug, Clone)]
pub struct Inventory {
    /// All hosts in declaration order
    hosts: IndexMap<String, Host>,

    /// All groups in declaration order
    groups: IndexMap<String, Group>,

    /// Source file/directory path
    source: Option<PathBuf>,

    /// Inventory-level variable environment per host, filled by `finalize`
    resolved: HashMap<String, HostVars>,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Create a new empty inventory with the implicit groups
    pub fn new() -> Self {
        let mut groups = IndexMap::new();
        groups.insert("all".to_string(), Group::all());
        groups.insert("ungrouped".to_string(), Group::ungrouped());

        Self {
            hosts: IndexMap::new(),
            groups,
            source: None,
            resolved: HashMap::new(),
        }
    }

    /// Load inventory from a file or directory
    pub fn load<P: AsRef<Path>>(path: P) -> InventoryResult<Self> {
        let path = path.as_ref();
        let mut inventory = Self::new();
        inventory.source = Some(path.to_path_buf());

        if path.is_file() {
            inventory.load_file(path)?;
            if let Some(parent) = path.parent() {
                inventory.load_vars_dirs(parent)?;
            }
        } else if path.is_dir() {
            inventory.load_directory(path)?;
        } else {
            return Err(InventoryError::NotFound(path.to_path_buf()));
        }

        inventory.finalize()?;
        debug!(
            hosts = inventory.host_count(),
            groups = inventory.group_count(),
            source = %path.display(),
            "Inventory loaded"
        );
        Ok(inventory)
    }

    /// Parse an INI inventory held in memory
    pub fn from_ini_str(content: &str) -> InventoryResult<Self> {
        let mut inventory = Self::new();
        inventory.parse_ini(content)?;
        inventory.finalize()?;
        Ok(inventory)
    }

    /// Parse a YAML inventory held in memory
    pub fn from_yaml_str(content: &str) -> InventoryResult<Self> {
        let mut inventory = Self::new();
        inventory.parse_yaml(content)?;
        inventory.finalize()?;
        Ok(inventory)
    }

    /// Load a single inventory file
    fn load_file(&mut self, path: &Path) -> InventoryResult<()> {
        let content = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension.to_lowercase().as_str() {
            "yml" | "yaml" | "json" => self.parse_yaml(&content),
            "ini" => self.parse_ini(&content),
            _ => {
                if looks_like_yaml(&content) {
                    self.parse_yaml(&content)
                } else {
                    self.parse_ini(&content)
                }
            }
        }
    }

    /// Load inventory from a directory
    fn load_directory(&mut self, path: &Path) -> InventoryResult<()> {
        for name in ["hosts", "hosts.ini", "hosts.yml", "hosts.yaml"] {
            let hosts_file = path.join(name);
            if hosts_file.is_file() {
                self.load_file(&hosts_file)?;
                break;
            }
        }

        self.load_vars_dirs(path)
    }

    fn load_vars_dirs(&mut self, base: &Path) -> InventoryResult<()> {
        let group_vars = base.join("group_vars");
        if group_vars.is_dir() {
            for (group_name, vars) in read_vars_dir(&group_vars)? {
                trace!(group = %group_name, count = vars.len(), "Applying group_vars");
                self.groups
                    .entry(group_name.clone())
                    .or_insert_with(|| Group::new(group_name))
                    .merge_vars(&vars);
            }
        }

        let host_vars = base.join("host_vars");
        if host_vars.is_dir() {
            for (host_name, vars) in read_vars_dir(&host_vars)? {
                match self.hosts.get_mut(&host_name) {
                    Some(host) => host.merge_vars(&vars),
                    None => debug!(host = %host_name, "Ignoring host_vars for unknown host"),
                }
            }
        }

        Ok(())
    }

    /// Parse YAML inventory format
    fn parse_yaml(&mut self, content: &str) -> InventoryResult<()> {
        let data: serde_yaml::Value = serde_yaml::from_str(content)?;

        if let serde_yaml::Value::Mapping(map) = data {
            for (key, value) in map {
                if let serde_yaml::Value::String(group_name) = key {
                    self.parse_yaml_group(&group_name, &value)?;
                }
            }
        }

        Ok(())
    }

    /// Parse a YAML group definition
    fn parse_yaml_group(&mut self, name: &str, value: &serde_yaml::Value) -> InventoryResult<()> {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Group::new(name));

        let serde_yaml::Value::Mapping(map) = value else {
            return Ok(());
        };

        if let Some(serde_yaml::Value::Mapping(hosts)) = map.get("hosts") {
            for (host_key, host_value) in hosts {
                let Some(host_name) = yaml_key(host_key) else {
                    continue;
                };
                let vars: IndexMap<String, Value> = match host_value {
                    serde_yaml::Value::Null => IndexMap::new(),
                    other => serde_yaml::from_value(other.clone())?,
                };
                self.insert_host_into(name, Host::new(host_name), &vars);
            }
        }

        if let Some(serde_yaml::Value::Mapping(vars)) = map.get("vars") {
            let vars: IndexMap<String, Value> =
                serde_yaml::from_value(serde_yaml::Value::Mapping(vars.clone()))?;
            if let Some(group) = self.groups.get_mut(name) {
                group.merge_vars(&vars);
            }
        }

        if let Some(serde_yaml::Value::Mapping(children)) = map.get("children") {
            for (child_key, child_value) in children {
                let Some(child_name) = yaml_key(child_key) else {
                    continue;
                };
                // Nesting under `all` is the file's root scope, not a real edge.
                if name != "all" {
                    if let Some(group) = self.groups.get_mut(name) {
                        group.add_child(child_name.clone());
                    }
                }
                self.parse_yaml_group(&child_name, child_value)?;
            }
        }

        Ok(())
    }

    /// Parse INI inventory format
    fn parse_ini(&mut self, content: &str) -> InventoryResult<()> {
        #[derive(PartialEq)]
        enum Section {
            Hosts,
            Vars,
            Children,
        }

        let mut current_group = "ungrouped".to_string();
        let mut section = Section::Hosts;

        for (index, raw) in content.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') {
                let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) else {
                    return Err(InventoryError::InvalidIniFormat {
                        line: line_no,
                        message: format!("malformed section header '{}'", line),
                    });
                };

                let (group_name, kind) = match header.rsplit_once(':') {
                    Some((group, "vars")) => (group, Section::Vars),
                    Some((group, "children")) => (group, Section::Children),
                    Some((_, suffix)) => {
                        return Err(InventoryError::InvalidIniFormat {
                            line: line_no,
                            message: format!("unknown section suffix ':{}'", suffix),
                        })
                    }
                    None => (header, Section::Hosts),
                };

                let group_name = group_name.trim();
                if group_name.is_empty() {
                    return Err(InventoryError::InvalidIniFormat {
                        line: line_no,
                        message: "empty group name".to_string(),
                    });
                }

                current_group = group_name.to_string();
                section = kind;
                self.groups
                    .entry(current_group.clone())
                    .or_insert_with(|| Group::new(group_name));
                continue;
            }

            match section {
                Section::Vars => {
                    let Some((key, value)) = line.split_once('=') else {
                        return Err(InventoryError::InvalidIniFormat {
                            line: line_no,
                            message: format!("expected key=value, found '{}'", line),
                        });
                    };
                    if let Some(group) = self.groups.get_mut(&current_group) {
                        group.set_var(key.trim(), parse_ini_value(value));
                    }
                }
                Section::Children => {
                    let child = line.to_string();
                    self.groups
                        .entry(child.clone())
                        .or_insert_with(|| Group::new(child.as_str()));
                    if let Some(group) = self.groups.get_mut(&current_group) {
                        group.add_child(child);
                    }
                }
                Section::Hosts => {
                    let host = Host::parse(line).map_err(|source| InventoryError::HostParse {
                        line: line_no,
                        source,
                    })?;
                    let vars = host.vars.clone();
                    self.insert_host_into(&current_group, host, &vars);
                }
            }
        }

        Ok(())
    }

    /// Insert or update a host and record its membership in `group`.
    fn insert_host_into(&mut self, group: &str, host: Host, vars: &IndexMap<String, Value>) {
        let name = host.name.clone();
        let entry = self.hosts.entry(name.clone()).or_insert(host);
        entry.merge_vars(vars);
        if group != "all" {
            entry.add_to_group(group);
        }

        if let Some(g) = self.groups.get_mut(group) {
            g.add_host(name.clone());
        }
        if let Some(all) = self.groups.get_mut("all") {
            all.add_host(name);
        }
    }

    /// Add a host to the inventory. Call [`Inventory::finalize`] once all
    /// hosts and groups are in place.
    pub fn add_host(&mut self, host: Host) {
        let name = host.name.clone();
        for group in &host.groups {
            self.groups
                .entry(group.clone())
                .or_insert_with(|| Group::new(group.as_str()))
                .add_host(name.clone());
        }
        if let Some(all) = self.groups.get_mut("all") {
            all.add_host(name.clone());
        }
        self.hosts.insert(name, host);
    }

    /// Add a group to the inventory, replacing any group with the same name.
    pub fn add_group(&mut self, group: Group) {
        for host_name in &group.hosts {
            if let Some(host) = self.hosts.get_mut(host_name) {
                host.add_to_group(group.name.clone());
            }
        }
        self.groups.insert(group.name.clone(), group);
    }

    /// Compute parent edges, reject cyclic nesting and resolve every host's
    /// inventory-level variables.
    pub fn finalize(&mut self) -> InventoryResult<()> {
        for group in self.groups.values_mut() {
            group.parents.clear();
        }
        let edges: Vec<(String, String)> = self
            .groups
            .values()
            .flat_map(|g| g.children.iter().map(move |c| (g.name.clone(), c.clone())))
            .collect();
        for (parent, child) in edges {
            self.groups
                .entry(child.clone())
                .or_insert_with(|| Group::new(child.as_str()))
                .add_parent(parent);
        }

        self.check_acyclic()?;

        // A host seen before any header and again under a real group is not ungrouped.
        let grouped: Vec<String> = self
            .hosts
            .values()
            .filter(|h| h.groups.iter().any(|g| g != "ungrouped" && g != "all"))
            .map(|h| h.name.clone())
            .collect();
        for name in grouped {
            if let Some(host) = self.hosts.get_mut(&name) {
                host.groups.shift_remove("ungrouped");
            }
            if let Some(group) = self.groups.get_mut("ungrouped") {
                group.hosts.shift_remove(&name);
            }
        }

        let ungrouped: Vec<String> = self
            .hosts
            .values()
            .filter(|h| h.groups.iter().all(|g| g == "ungrouped"))
            .map(|h| h.name.clone())
            .collect();
        for name in ungrouped {
            if let Some(host) = self.hosts.get_mut(&name) {
                host.add_to_group("ungrouped");
            }
            if let Some(group) = self.groups.get_mut("ungrouped") {
                group.add_host(name);
            }
        }

        self.resolved = self
            .hosts
            .values()
            .map(|host| (host.name.clone(), HostVars::from_layers(self.var_layers(host))))
            .collect();

        Ok(())
    }

    /// Depth-first walk over child edges; a back edge is a cycle.
    fn check_acyclic(&self) -> InventoryResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            inventory: &'a Inventory,
            name: &'a str,
            marks: &mut HashMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> InventoryResult<()> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == name).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(name.to_string());
                    return Err(InventoryError::CyclicGroup { cycle });
                }
                None => {}
            }

            marks.insert(name, Mark::Visiting);
            path.push(name);
            if let Some(group) = inventory.groups.get(name) {
                for child in &group.children {
                    visit(inventory, child, marks, path)?;
                }
            }
            path.pop();
            marks.insert(name, Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for name in self.groups.keys() {
            visit(self, name, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Nesting depth of a group: 0 for top-level groups, otherwise one more
    /// than its deepest parent. `all` is not counted as a parent.
    fn group_depth(&self, name: &str, memo: &mut HashMap<String, usize>) -> usize {
        if let Some(depth) = memo.get(name) {
            return *depth;
        }
        let depth = self
            .groups
            .get(name)
            .map(|group| {
                group
                    .parents
                    .iter()
                    .filter(|p| p.as_str() != "all")
                    .map(|p| self.group_depth(p, memo) + 1)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        memo.insert(name.to_string(), depth);
        depth
    }

    /// Every group the host belongs to, directly or through nesting, ordered
    /// parent before child and by declaration order within one depth. The
    /// `all` group is excluded.
    pub fn host_group_chain(&self, host: &Host) -> Vec<&Group> {
        let mut seen: IndexSet<&str> = IndexSet::new();
        let mut stack: Vec<&str> = host.groups.iter().map(String::as_str).collect();
        while let Some(name) = stack.pop() {
            if name == "all" || !seen.insert(name) {
                continue;
            }
            if let Some(group) = self.groups.get(name) {
                stack.extend(group.parents.iter().map(String::as_str));
            }
        }

        let mut memo = HashMap::new();
        let mut chain: Vec<(usize, usize, &Group)> = seen
            .into_iter()
            .filter_map(|name| {
                let (index, _, group) = self.groups.get_full(name)?;
                Some((self.group_depth(name, &mut memo), index, group))
            })
            .collect();
        chain.sort_by_key(|(depth, index, _)| (*depth, *index));
        chain.into_iter().map(|(_, _, group)| group).collect()
    }

    /// Variable layers for a host, lowest precedence first
    fn var_layers(&self, host: &Host) -> Vec<VarLayer> {
        let mut layers = Vec::new();
        if let Some(all) = self.groups.get("all") {
            layers.push(VarLayer::new(VarPrecedence::AllGroup, "all", all.vars.clone()));
        }
        for group in self.host_group_chain(host) {
            layers.push(VarLayer::new(
                VarPrecedence::Group,
                group.name.clone(),
                group.vars.clone(),
            ));
        }
        layers.push(VarLayer::new(
            VarPrecedence::Host,
            host.name.clone(),
            host.vars.clone(),
        ));
        layers
    }

    /// Inventory-level variables for a host (all < groups < host).
    pub fn host_vars(&self, name: &str) -> Option<HostVars> {
        if let Some(vars) = self.resolved.get(name) {
            return Some(vars.clone());
        }
        self.hosts
            .get(name)
            .map(|host| HostVars::from_layers(self.var_layers(host)))
    }

    /// Hosts of a group including nested children, in declaration order
    pub fn group_hosts(&self, name: &str) -> Option<Vec<&Host>> {
        fn collect<'a>(inventory: &'a Inventory, group: &'a Group, out: &mut IndexSet<&'a str>) {
            for host in &group.hosts {
                out.insert(host);
            }
            for child in &group.children {
                if let Some(child) = inventory.groups.get(child) {
                    collect(inventory, child, out);
                }
            }
        }

        let group = self.groups.get(name)?;
        let mut names = IndexSet::new();
        collect(self, group, &mut names);
        Some(names.into_iter().filter_map(|n| self.hosts.get(n)).collect())
    }

    /// Resolve a selector expression to hosts
    pub fn select(&self, pattern: &str) -> InventoryResult<Vec<&Host>> {
        HostSelector::parse(pattern)?.select(self)
    }

    /// Get a host by name
    pub fn get_host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    /// Get a group by name
    pub fn get_group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// All hosts in declaration order
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// All groups in declaration order
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Position of a host in declaration order
    pub fn host_index(&self, name: &str) -> Option<usize> {
        self.hosts.get_index_of(name)
    }

    /// Source file/directory, when loaded from disk
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Count total hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Count total groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An INI inventory starts with a section header or a host line; anything
/// whose first significant line is a mapping key is treated as YAML.
fn looks_like_yaml(content: &str) -> bool {
    content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#') && !l.starts_with(';'))
        .map(|l| l == "---" || l.starts_with('{') || (l.ends_with(':') && !l.starts_with('[')))
        .unwrap_or(false)
}

/// Read `<dir>/<name>.yml` files and `<dir>/<name>/*.yml` directories into
/// (name, vars) pairs, sorted by file name.
fn read_vars_dir(dir: &Path) -> InventoryResult<Vec<(String, IndexMap<String, Value>)>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let mut out = Vec::new();
    for path in entries {
        if path.is_file() {
            if !is_vars_file(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            out.push((name.to_string(), read_vars_file(&path)?));
        } else if path.is_dir() {
            let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            let mut files: Vec<PathBuf> = std::fs::read_dir(&path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_vars_file(p))
                .collect();
            files.sort();

            let mut merged = IndexMap::new();
            for file in files {
                merged.extend(read_vars_file(&file)?);
            }
            out.push((name.to_string(), merged));
        }
    }
    Ok(out)
}

fn is_vars_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml" | "yaml" | "json")
    )
}

fn read_vars_file(path: &Path) -> InventoryResult<IndexMap<String, Value>> {
    let content = std::fs::read_to_string(path)?;
    let vars: Option<IndexMap<String, Value>> = serde_yaml::from_str(&content)?;
    Ok(vars.unwrap_or_default())
}

/// Parse an INI scalar (quoted strings, booleans, numbers)
pub(crate) fn parse_ini_value(value: &str) -> Value {
    let value = value.trim();

    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        return Value::String(value[1..value.len() - 1].to_string());
    }

    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = value.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = value.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return Value::Number(number);
        }
    }

    Value::String(value.to_string())
}

impl std::fmt::Display for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Inventory ({} hosts, {} groups)",
            self.hosts.len(),
            self.groups.len()
        )?;

        for group in self.groups.values() {
            if group.name == "all" || group.is_empty() {
                continue;
            }
            writeln!(f, "  [{}]", group.name)?;
            for host_name in &group.hosts {
                writeln!(f, "    {}", host_name)?;
            }
            for child in &group.children {
                writeln!(f, "    @{}", child)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
[all:vars]
port=80

[nginx]
web2
web1 port=8443

[apache]
app1

[frontends:children]
nginx
apache

[frontends:vars]
port=8080
tier=front
"#;

    #[test]
    fn test_empty_inventory() {
        let inv = Inventory::new();
        assert_eq!(inv.host_count(), 0);
        assert!(inv.get_group("all").is_some());
        assert!(inv.get_group("ungrouped").is_some());
    }

    #[test]
    fn test_parse_ini_sections() {
        let inv = Inventory::from_ini_str(SITE).unwrap();

        assert_eq!(inv.host_count(), 3);
        let frontends = inv.get_group("frontends").unwrap();
        assert!(frontends.has_child("nginx"));
        assert!(frontends.has_var("tier"));
        assert!(inv.get_group("nginx").unwrap().has_parent("frontends"));

        let names: Vec<&str> = inv.hosts().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["web2", "web1", "app1"]);
    }

    #[test]
    fn test_ungrouped_hosts() {
        let inv = Inventory::from_ini_str("lonely\n[web]\nweb1\n").unwrap();
        assert!(inv.get_group("ungrouped").unwrap().has_host("lonely"));
        assert!(!inv.get_group("ungrouped").unwrap().has_host("web1"));
    }

    #[test]
    fn test_host_listed_before_header_then_grouped() {
        let inv = Inventory::from_ini_str("web1\n[web]\nweb1\n\n[ungrouped:vars]\nstray=1\n")
            .unwrap();

        assert!(inv.select("ungrouped").unwrap().is_empty());
        assert!(!inv.get_host("web1").unwrap().in_group("ungrouped"));
        assert_eq!(inv.select("web").unwrap().len(), 1);
        assert_eq!(inv.host_vars("web1").unwrap().get("stray"), None);
    }

    #[test]
    fn test_host_var_precedence() {
        let inv = Inventory::from_ini_str(SITE).unwrap();

        let web1 = inv.host_vars("web1").unwrap();
        assert_eq!(web1.get("port"), Some(&Value::from(8443)));

        let web2 = inv.host_vars("web2").unwrap();
        assert_eq!(web2.get("port"), Some(&Value::from(8080)));
        assert_eq!(web2.get("tier"), Some(&Value::from("front")));
    }

    #[test]
    fn test_child_group_overrides_parent() {
        let inv = Inventory::from_ini_str(
            r#"
[leaf]
h1

[leaf:vars]
color=green

[mid:children]
leaf

[mid:vars]
color=blue

[top:children]
mid

[top:vars]
color=red
"#,
        )
        .unwrap();

        let chain: Vec<&str> = inv
            .host_group_chain(inv.get_host("h1").unwrap())
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        assert_eq!(chain, vec!["top", "mid", "leaf"]);
        assert_eq!(
            inv.host_vars("h1").unwrap().get("color"),
            Some(&Value::from("green"))
        );
    }

    #[test]
    fn test_cyclic_groups_rejected() {
        let err = Inventory::from_ini_str(
            r#"
[a:children]
b

[b:children]
c

[c:children]
a
"#,
        )
        .unwrap_err();

        match err {
            InventoryError::CyclicGroup { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.contains(&"b".to_string()));
            }
            other => panic!("expected cyclic group error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_ini_section() {
        let err = Inventory::from_ini_str("[web:bogus]\nweb1\n").unwrap_err();
        assert!(matches!(err, InventoryError::InvalidIniFormat { line: 1, .. }));
    }

    #[test]
    fn test_parse_yaml() {
        let inv = Inventory::from_yaml_str(
            r#"
all:
  vars:
    port: 80
  children:
    nginx:
      hosts:
        web1:
          port: 8443
        web2:
      vars:
        port: 8080
"#,
        )
        .unwrap();

        assert_eq!(inv.host_count(), 2);
        assert_eq!(
            inv.host_vars("web1").unwrap().get("port"),
            Some(&Value::from(8443))
        );
        assert_eq!(
            inv.host_vars("web2").unwrap().get("port"),
            Some(&Value::from(8080))
        );
    }

    #[test]
    fn test_group_hosts_recursive_order() {
        let inv = Inventory::from_ini_str(SITE).unwrap();
        let names: Vec<&str> = inv
            .group_hosts("frontends")
            .unwrap()
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        assert_eq!(names, vec!["web2", "web1", "app1"]);
    }

    #[test]
    fn test_parse_ini_value() {
        assert_eq!(parse_ini_value("'quoted'"), Value::from("quoted"));
        assert_eq!(parse_ini_value("yes"), Value::Bool(true));
        assert_eq!(parse_ini_value("42"), Value::from(42));
        assert_eq!(parse_ini_value("1.5"), Value::from(1.5));
        assert_eq!(parse_ini_value("plain"), Value::from("plain"));
    }

    #[test]
    fn test_looks_like_yaml() {
        assert!(looks_like_yaml("---\nall:\n"));
        assert!(looks_like_yaml("# c\nall:\n  hosts:\n"));
        assert!(!looks_like_yaml("[web]\nweb1\n"));
        assert!(!looks_like_yaml("web1 port=80\n"));
    }
}
