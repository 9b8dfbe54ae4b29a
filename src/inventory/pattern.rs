//! Host selector expressions.
//!
//! Supported forms, combined with `,` or `:`:
//! - `all` / `*` - every host
//! - `name` - a group (including nested children) or a single host
//! - `group[2]`, `group[-1]` - the Nth member in declaration order
//! - `group[1:3]`, `group[:2]` - an inclusive range of members
//! - `&pattern` - intersection, `!pattern` - exclusion
//! - `~regex`, `web*`, `db?` - match host names
//!
//! As with the familiar inventory tooling, unions are evaluated first, then
//! intersections, then exclusions. A selector made only of `&`/`!` terms
//! starts from `all`.
//!
//! A `~regex` term takes the rest of the expression, so `,` and `:` inside
//! the regex are kept. Put it last when combining terms.

use indexmap::IndexSet;
use regex::Regex;
use tracing::warn;

use super::{Host, Inventory, InventoryError, InventoryResult};

/// How a term combines with the terms before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorOp {
    Union,
    Intersect,
    Exclude,
}

/// A subscript on a group member list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscript {
    /// A single member; negative values count from the end
    Index(i64),
    /// Members from `start` through `end`, both inclusive
    Range(Option<i64>, Option<i64>),
}

/// The thing a term selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorTarget {
    All,
    Name(String),
    Subscripted { group: String, subscript: Subscript },
    Regex(String),
    Glob(String),
}

/// A parsed host selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSelector {
    raw: String,
    terms: Vec<(SelectorOp, SelectorTarget)>,
}

impl HostSelector {
    /// Parse a selector expression
    pub fn parse(pattern: &str) -> InventoryResult<Self> {
        let mut terms = Vec::new();

        for part in split_pattern(pattern) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (op, body) = if let Some(rest) = part.strip_prefix('&') {
                (SelectorOp::Intersect, rest.trim())
            } else if let Some(rest) = part.strip_prefix('!') {
                (SelectorOp::Exclude, rest.trim())
            } else {
                (SelectorOp::Union, part)
            };

            if body.is_empty() {
                return Err(InventoryError::InvalidPattern(pattern.to_string()));
            }
            terms.push((op, parse_target(body)?));
        }

        if terms.is_empty() {
            return Err(InventoryError::InvalidPattern(pattern.to_string()));
        }

        Ok(Self {
            raw: pattern.trim().to_string(),
            terms,
        })
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed terms in written order
    pub fn terms(&self) -> &[(SelectorOp, SelectorTarget)] {
        &self.terms
    }

    /// Resolve against an inventory. The result keeps the order in which
    /// hosts were first selected.
    pub fn select<'a>(&self, inventory: &'a Inventory) -> InventoryResult<Vec<&'a Host>> {
        let mut selected: IndexSet<&'a str> = IndexSet::new();

        let has_union = self.terms.iter().any(|(op, _)| *op == SelectorOp::Union);
        if !has_union {
            selected.extend(inventory.hosts().map(|h| h.name.as_str()));
        }

        for (_, target) in self
            .terms
            .iter()
            .filter(|(op, _)| *op == SelectorOp::Union)
        {
            selected.extend(resolve_target(inventory, target)?);
        }

        for (_, target) in self
            .terms
            .iter()
            .filter(|(op, _)| *op == SelectorOp::Intersect)
        {
            let other: IndexSet<&str> = resolve_target(inventory, target)?.into_iter().collect();
            selected.retain(|name| other.contains(name));
        }

        for (_, target) in self
            .terms
            .iter()
            .filter(|(op, _)| *op == SelectorOp::Exclude)
        {
            for name in resolve_target(inventory, target)? {
                selected.shift_remove(name);
            }
        }

        if selected.is_empty() {
            warn!(pattern = %self.raw, "Host selector matched no hosts");
        }

        Ok(selected
            .into_iter()
            .filter_map(|name| inventory.get_host(name))
            .collect())
    }
}

impl std::str::FromStr for HostSelector {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for HostSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn parse_target(body: &str) -> InventoryResult<SelectorTarget> {
    if body == "all" || body == "*" {
        return Ok(SelectorTarget::All);
    }

    if let Some(regex) = body.strip_prefix('~') {
        Regex::new(regex).map_err(|_| InventoryError::InvalidPattern(body.to_string()))?;
        return Ok(SelectorTarget::Regex(regex.to_string()));
    }

    if let Some(open) = body.find('[') {
        let inner = body[open + 1..]
            .strip_suffix(']')
            .ok_or_else(|| InventoryError::InvalidPattern(body.to_string()))?;
        let group = body[..open].to_string();
        if group.is_empty() {
            return Err(InventoryError::InvalidPattern(body.to_string()));
        }
        return Ok(SelectorTarget::Subscripted {
            group,
            subscript: parse_subscript(inner, body)?,
        });
    }

    if body.contains('*') || body.contains('?') {
        return Ok(SelectorTarget::Glob(body.to_string()));
    }

    Ok(SelectorTarget::Name(body.to_string()))
}

fn parse_subscript(inner: &str, body: &str) -> InventoryResult<Subscript> {
    let bound = |s: &str| -> InventoryResult<Option<i64>> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse::<i64>()
            .map(Some)
            .map_err(|_| InventoryError::InvalidPattern(body.to_string()))
    };

    match inner.split_once(':') {
        Some((start, end)) => Ok(Subscript::Range(bound(start)?, bound(end)?)),
        None => bound(inner)?
            .map(Subscript::Index)
            .ok_or_else(|| InventoryError::InvalidPattern(body.to_string())),
    }
}

fn resolve_target<'a>(
    inventory: &'a Inventory,
    target: &SelectorTarget,
) -> InventoryResult<Vec<&'a str>> {
    match target {
        SelectorTarget::All => Ok(inventory.hosts().map(|h| h.name.as_str()).collect()),
        SelectorTarget::Name(name) => {
            if let Some(hosts) = inventory.group_hosts(name) {
                return Ok(hosts.into_iter().map(|h| h.name.as_str()).collect());
            }
            inventory
                .get_host(name)
                .map(|h| vec![h.name.as_str()])
                .ok_or_else(|| InventoryError::UnknownGroup(name.clone()))
        }
        SelectorTarget::Subscripted { group, subscript } => {
            let members = inventory
                .group_hosts(group)
                .ok_or_else(|| InventoryError::UnknownGroup(group.clone()))?;
            let picked = apply_subscript(group, &members, *subscript)?;
            Ok(picked.into_iter().map(|h| h.name.as_str()).collect())
        }
        SelectorTarget::Regex(regex) => {
            let re = Regex::new(regex)
                .map_err(|_| InventoryError::InvalidPattern(format!("~{}", regex)))?;
            Ok(inventory
                .hosts()
                .filter(|h| re.is_match(&h.name))
                .map(|h| h.name.as_str())
                .collect())
        }
        SelectorTarget::Glob(glob) => {
            let re = Regex::new(&glob_to_regex(glob))
                .map_err(|_| InventoryError::InvalidPattern(glob.clone()))?;
            Ok(inventory
                .hosts()
                .filter(|h| re.is_match(&h.name))
                .map(|h| h.name.as_str())
                .collect())
        }
    }
}

fn apply_subscript<'a>(
    group: &str,
    members: &[&'a Host],
    subscript: Subscript,
) -> InventoryResult<Vec<&'a Host>> {
    let len = members.len();
    let out_of_range = |index: i64| InventoryError::IndexOutOfRange {
        group: group.to_string(),
        index,
        len,
    };
    let normalize = |index: i64| -> Option<usize> {
        let resolved = if index < 0 { len as i64 + index } else { index };
        (0..len as i64).contains(&resolved).then_some(resolved as usize)
    };

    match subscript {
        Subscript::Index(index) => {
            let at = normalize(index).ok_or_else(|| out_of_range(index))?;
            Ok(vec![members[at]])
        }
        Subscript::Range(start, end) => {
            let first = match start {
                Some(s) => normalize(s).ok_or_else(|| out_of_range(s))?,
                None => 0,
            };
            let last = match end {
                Some(e) => match normalize(e) {
                    Some(at) => at,
                    // An end past the last member is clamped.
                    None if e >= 0 && len > 0 => len - 1,
                    None => return Err(out_of_range(e)),
                },
                None if len > 0 => len - 1,
                None => return Err(out_of_range(0)),
            };
            if first > last {
                return Ok(Vec::new());
            }
            Ok(members[first..=last].to_vec())
        }
    }
}

/// Split pattern by `,` or `:` but not inside brackets. A `~regex` term
/// runs to the end of the pattern.
fn split_pattern(pattern: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut bracket_depth: usize = 0;

    for (i, ch) in pattern.char_indices() {
        if i == start && is_regex_term(&pattern[start..]) {
            break;
        }
        match ch {
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            ':' | ',' if bracket_depth == 0 => {
                parts.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    parts.push(&pattern[start..]);
    parts
}

fn is_regex_term(rest: &str) -> bool {
    rest.trim_start()
        .trim_start_matches(['&', '!'])
        .trim_start()
        .starts_with('~')
}

/// Convert a glob pattern to an anchored regex
fn glob_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");

    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '[' | ']' | '(' | ')' | '{' | '}' | '.' | '+' | '^' | '$' | '|' | '\\' => {
                regex.push('\\');
                regex.push(ch);
            }
            _ => regex.push(ch),
        }
    }

    regex.push('$');
    regex
}
