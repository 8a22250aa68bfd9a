//! Request descriptors.
//!
//! A [`Descriptor`] says what is being cached and how: which provider, how it
//! is scoped, how long it lives, and whether anything should be evicted first.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::key::{compose, DynamicKey, DynamicKeyGroup, StorageKey};
use crate::ttl::LifeCache;

/// Eviction performed before a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvictDirective {
    #[default]
    None,
    /// Every key of the provider.
    Provider,
    /// Every key under the dynamic key (or the group's dynamic key), groups included.
    DynamicKey,
    /// Only the exact dynamic key group.
    DynamicKeyGroup,
}

/// Plain description of one cached request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub provider_key: String,
    pub dynamic_key: Option<DynamicKey>,
    pub dynamic_key_group: Option<DynamicKeyGroup>,
    pub life_cache: Option<LifeCache>,
    pub evict: EvictDirective,
    pub expirable: bool,
}

impl Descriptor {
    pub fn new(provider_key: impl Into<String>) -> Self {
        Self {
            provider_key: provider_key.into(),
            dynamic_key: None,
            dynamic_key_group: None,
            life_cache: None,
            evict: EvictDirective::None,
            expirable: true,
        }
    }

    pub fn with_dynamic_key(mut self, dynamic_key: impl Into<DynamicKey>) -> Self {
        self.dynamic_key = Some(dynamic_key.into());
        self
    }

    pub fn with_dynamic_key_group(mut self, group: DynamicKeyGroup) -> Self {
        self.dynamic_key_group = Some(group);
        self
    }

    pub fn with_life_cache(mut self, life_cache: LifeCache) -> Self {
        self.life_cache = Some(life_cache);
        self
    }

    pub fn with_evict(mut self, evict: EvictDirective) -> Self {
        self.evict = evict;
        self
    }

    pub fn with_expirable(mut self, expirable: bool) -> Self {
        self.expirable = expirable;
        self
    }

    /// Check that scoping fields and the eviction directive agree.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.dynamic_key.is_some() && self.dynamic_key_group.is_some() {
            return Err(ConfigurationError::DynamicKeyAndGroupBothSet {
                provider_key: self.provider_key.clone(),
            });
        }
        match self.evict {
            EvictDirective::DynamicKey if self.scoping_dynamic_key().is_none() => {
                Err(ConfigurationError::MissingDynamicKey {
                    provider_key: self.provider_key.clone(),
                })
            }
            EvictDirective::DynamicKeyGroup if self.dynamic_key_group.is_none() => {
                Err(ConfigurationError::MissingDynamicKeyGroup {
                    provider_key: self.provider_key.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// The dynamic key this request is scoped under, directly or through its group.
    pub fn scoping_dynamic_key(&self) -> Option<&str> {
        self.dynamic_key
            .as_ref()
            .map(DynamicKey::as_str)
            .or_else(|| self.dynamic_key_group.as_ref().map(DynamicKeyGroup::dynamic_key))
    }

    /// Validate, then compose the storage key.
    pub fn storage_key(&self) -> Result<StorageKey, ConfigurationError> {
        self.validate()?;
        compose(
            &self.provider_key,
            self.dynamic_key.as_ref(),
            self.dynamic_key_group.as_ref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let descriptor = Descriptor::new("mocks");
        assert!(descriptor.expirable);
        assert_eq!(descriptor.evict, EvictDirective::None);
        assert_eq!(descriptor.storage_key().unwrap().as_str(), "mocks");
    }

    #[test]
    fn test_key_and_group_rejected() {
        let descriptor = Descriptor::new("mocks")
            .with_dynamic_key("1")
            .with_dynamic_key_group(DynamicKeyGroup::new("1", "a"));
        assert!(matches!(
            descriptor.validate(),
            Err(ConfigurationError::DynamicKeyAndGroupBothSet { .. })
        ));
    }

    #[test]
    fn test_evict_dynamic_key_requires_a_key() {
        let descriptor = Descriptor::new("mocks").with_evict(EvictDirective::DynamicKey);
        assert_eq!(
            descriptor.validate(),
            Err(ConfigurationError::MissingDynamicKey {
                provider_key: "mocks".to_string()
            })
        );
    }

    #[test]
    fn test_evict_dynamic_key_accepts_group_key() {
        let descriptor = Descriptor::new("mocks")
            .with_dynamic_key_group(DynamicKeyGroup::new("1", "a"))
            .with_evict(EvictDirective::DynamicKey);
        assert!(descriptor.validate().is_ok());
        assert_eq!(descriptor.scoping_dynamic_key(), Some("1"));
    }

    #[test]
    fn test_evict_group_requires_a_group() {
        let descriptor = Descriptor::new("mocks")
            .with_dynamic_key("1")
            .with_evict(EvictDirective::DynamicKeyGroup);
        assert!(matches!(
            descriptor.storage_key(),
            Err(ConfigurationError::MissingDynamicKeyGroup { .. })
        ));
    }

    #[test]
    fn test_storage_key_for_group() {
        let descriptor =
            Descriptor::new("mocks").with_dynamic_key_group(DynamicKeyGroup::new("f1", "p1"));
        assert_eq!(descriptor.storage_key().unwrap().as_str(), "mocks$f1$p1");
    }
}
