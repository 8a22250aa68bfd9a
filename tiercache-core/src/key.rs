//! Storage key composition and matching.
//!
//! A storage key is built from up to three segments joined by `$`:
//!
//! ```text
//! provider                      no scoping
//! provider$dynamicKey           scoped by a dynamic key
//! provider$dynamicKey$group     scoped by a dynamic key group
//! ```
//!
//! `\` and `$` inside a segment are escaped with a backslash, so distinct
//! triples never collide and every key can be split back into its segments.
//! Group keys share the `provider$dynamicKey` prefix with plain dynamic keys,
//! which is what lets [`match_dynamic_key`] evict every group under a key
//! without a secondary index.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigurationError;

const SEPARATOR: char = '$';
const ESCAPE: char = '\\';

/// Single-value qualifier for a provider, e.g. a page number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicKey(String);

impl DynamicKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DynamicKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for DynamicKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Two-level qualifier: every group under `dynamic_key` can be evicted at once,
/// or a single group on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicKeyGroup {
    dynamic_key: String,
    group: String,
}

impl DynamicKeyGroup {
    pub fn new(dynamic_key: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            dynamic_key: dynamic_key.into(),
            group: group.into(),
        }
    }

    pub fn dynamic_key(&self) -> &str {
        &self.dynamic_key
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

/// A composed storage key.
///
/// Only constructible through [`compose`] or [`StorageKey::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Accept an already-encoded key, e.g. one enumerated from a store.
    ///
    /// Returns `None` when the text is not a well-formed key.
    pub fn parse(encoded: &str) -> Option<StorageKey> {
        let segments = split_segments(encoded)?;
        (1..=3)
            .contains(&segments.len())
            .then(|| StorageKey(encoded.to_string()))
    }

    /// Decoded segments: provider, then optional dynamic key, then optional group.
    pub fn segments(&self) -> Vec<String> {
        split_segments(&self.0).unwrap_or_default()
    }

    pub fn provider_key(&self) -> String {
        self.segments().into_iter().next().unwrap_or_default()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

fn escape_into(out: &mut String, segment: &str) {
    for c in segment.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

/// Split an encoded key into unescaped segments; `None` on a dangling escape.
fn split_segments(encoded: &str) -> Option<Vec<String>> {
    let mut segments = Vec::with_capacity(3);
    let mut current = String::new();
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => current.push(chars.next()?),
            SEPARATOR => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);
    Some(segments)
}

/// Compose the storage key for a provider and its optional scoping.
///
/// Fails when both a dynamic key and a dynamic key group are supplied.
pub fn compose(
    provider_key: &str,
    dynamic_key: Option<&DynamicKey>,
    dynamic_key_group: Option<&DynamicKeyGroup>,
) -> Result<StorageKey, ConfigurationError> {
    let mut out = String::with_capacity(provider_key.len() + 16);
    escape_into(&mut out, provider_key);
    match (dynamic_key, dynamic_key_group) {
        (Some(_), Some(_)) => {
            return Err(ConfigurationError::DynamicKeyAndGroupBothSet {
                provider_key: provider_key.to_string(),
            })
        }
        (Some(key), None) => {
            out.push(SEPARATOR);
            escape_into(&mut out, key.as_str());
        }
        (None, Some(group)) => {
            out.push(SEPARATOR);
            escape_into(&mut out, group.dynamic_key());
            out.push(SEPARATOR);
            escape_into(&mut out, group.group());
        }
        (None, None) => {}
    }
    Ok(StorageKey(out))
}

fn matching<I, S>(keys: I, mut predicate: impl FnMut(&[String]) -> bool) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter_map(|key| {
            let key = key.as_ref();
            let segments = split_segments(key)?;
            predicate(&segments).then(|| key.to_string())
        })
        .collect()
}

/// Every key belonging to `provider_key`, in enumeration order.
pub fn match_provider_key<I, S>(keys: I, provider_key: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    matching(keys, |segments| segments[0] == provider_key)
}

/// Every key under `provider_key` + `dynamic_key`, groups included.
pub fn match_dynamic_key<I, S>(keys: I, provider_key: &str, dynamic_key: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    matching(keys, |segments| {
        segments.len() >= 2 && segments[0] == provider_key && segments[1] == dynamic_key
    })
}

/// The single key for one group, if it was enumerated.
pub fn match_dynamic_key_group<I, S>(
    keys: I,
    provider_key: &str,
    group: &DynamicKeyGroup,
) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let target = compose(provider_key, None, Some(group)).ok()?;
    keys.into_iter()
        .find(|key| key.as_ref() == target.as_str())
        .map(|key| key.as_ref().to_string())
}
