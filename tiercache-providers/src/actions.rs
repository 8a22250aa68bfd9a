//! Editing helper for cached lists.
//!
//! [`Actions`] queues edits against the `Vec<V>` cached for one descriptor.
//! Nothing is read or written until [`Actions::to_vec`] runs: it loads the
//! current list (a missing list is empty), applies the edits in order, and
//! saves the result back in place of the old list.
//!
//! Predicates receive the position being visited and the list length as it
//! was when the edit started; element-aware predicates also get the element.

use std::error::Error as StdError;
use std::fmt;

use tiercache_core::{CacheResult, Descriptor, EvictDirective};
use tiercache_storage::Cacheable;

use crate::providers::Providers;

type Edit<'a, V> = Box<dyn FnOnce(Vec<V>) -> Vec<V> + Send + 'a>;

/// Loader outcome used when reading the list: nothing cached yet.
#[derive(Debug)]
struct NotCached;

impl fmt::Display for NotCached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no cached list")
    }
}

impl StdError for NotCached {}

/// Queued edits over the list cached for one descriptor.
///
/// # Example
///
/// ```ignore
/// let mocks = Actions::<Mock>::with(&providers, Descriptor::new("mocks"))
///     .add_first(Mock::new("newest"))
///     .evict_all_keeping_first_n(50)
///     .to_vec()
///     .await?;
/// ```
pub struct Actions<'a, V> {
    providers: &'a Providers,
    descriptor: Descriptor,
    edits: Vec<Edit<'a, V>>,
}

impl<'a, V: Cacheable> Actions<'a, V> {
    /// Edits for the list cached under `descriptor`. Its eviction directive is ignored.
    pub fn with(providers: &'a Providers, descriptor: Descriptor) -> Self {
        Self {
            providers,
            descriptor: descriptor.with_evict(EvictDirective::None),
            edits: Vec::new(),
        }
    }

    fn push(mut self, edit: impl FnOnce(Vec<V>) -> Vec<V> + Send + 'a) -> Self {
        self.edits.push(Box::new(edit));
        self
    }

    // Add

    /// Insert `candidate` at the first position (0..=count) the predicate accepts.
    pub fn add(
        self,
        predicate: impl Fn(usize, usize) -> bool + Send + 'a,
        candidate: V,
    ) -> Self {
        self.add_all(predicate, vec![candidate])
    }

    pub fn add_first(self, candidate: V) -> Self {
        self.add_all(|position, _| position == 0, vec![candidate])
    }

    pub fn add_last(self, candidate: V) -> Self {
        self.add_all(|position, count| position == count, vec![candidate])
    }

    pub fn add_all_first(self, candidates: Vec<V>) -> Self {
        self.add_all(|position, _| position == 0, candidates)
    }

    pub fn add_all_last(self, candidates: Vec<V>) -> Self {
        self.add_all(|position, count| position == count, candidates)
    }

    /// Insert `candidates`, in order, at the first position the predicate accepts.
    pub fn add_all(
        self,
        predicate: impl Fn(usize, usize) -> bool + Send + 'a,
        candidates: Vec<V>,
    ) -> Self {
        self.push(move |mut elements| {
            let count = elements.len();
            if let Some(position) = (0..=count).find(|&position| predicate(position, count)) {
                elements.splice(position..position, candidates);
            }
            elements
        })
    }

    // Evict

    pub fn evict_first(self) -> Self {
        self.evict(|position, _, _| position == 0)
    }

    pub fn evict_first_n(self, n: usize) -> Self {
        self.evict_first_n_if(|_| true, n)
    }

    pub fn evict_last(self) -> Self {
        self.evict(|position, count, _| position + 1 == count)
    }

    pub fn evict_last_n(self, n: usize) -> Self {
        self.evict_last_n_if(|_| true, n)
    }

    /// Evict the first element if the list length satisfies `count_predicate`.
    pub fn evict_first_if(self, count_predicate: impl Fn(usize) -> bool + Send + 'a) -> Self {
        self.evict(move |position, count, _| position == 0 && count_predicate(count))
    }

    pub fn evict_first_n_if(
        self,
        count_predicate: impl Fn(usize) -> bool + Send + 'a,
        n: usize,
    ) -> Self {
        self.evict_iterable(move |position, count, _| position < n && count_predicate(count))
    }

    pub fn evict_last_if(self, count_predicate: impl Fn(usize) -> bool + Send + 'a) -> Self {
        self.evict(move |position, count, _| position + 1 == count && count_predicate(count))
    }

    pub fn evict_last_n_if(
        self,
        count_predicate: impl Fn(usize) -> bool + Send + 'a,
        n: usize,
    ) -> Self {
        self.evict_iterable(move |position, count, _| {
            count - position <= n && count_predicate(count)
        })
    }

    /// Evict the first element matching `predicate`.
    pub fn evict_where(self, predicate: impl Fn(&V) -> bool + Send + 'a) -> Self {
        self.evict(move |_, _, element| predicate(element))
    }

    /// Evict the first element the predicate accepts.
    pub fn evict(self, predicate: impl Fn(usize, usize, &V) -> bool + Send + 'a) -> Self {
        self.push(move |mut elements| {
            let count = elements.len();
            if let Some(position) =
                (0..count).find(|&position| predicate(position, count, &elements[position]))
            {
                elements.remove(position);
            }
            elements
        })
    }

    /// Evict every element the predicate accepts.
    pub fn evict_iterable(
        self,
        predicate: impl Fn(usize, usize, &V) -> bool + Send + 'a,
    ) -> Self {
        self.push(move |elements| {
            let count = elements.len();
            elements
                .into_iter()
                .enumerate()
                .filter(|(position, element)| !predicate(*position, count, element))
                .map(|(_, element)| element)
                .collect()
        })
    }

    pub fn evict_all(self) -> Self {
        self.evict_iterable(|_, _, _| true)
    }

    /// Keep only the first `n` elements.
    pub fn evict_all_keeping_first_n(self, n: usize) -> Self {
        self.evict_iterable(move |position, _, _| position >= n)
    }

    /// Keep only the last `n` elements.
    pub fn evict_all_keeping_last_n(self, n: usize) -> Self {
        self.evict_iterable(move |position, count, _| position < count.saturating_sub(n))
    }

    // Update

    /// Replace the first element the predicate accepts.
    pub fn update(
        self,
        predicate: impl Fn(usize, usize, &V) -> bool + Send + 'a,
        replace: impl FnOnce(V) -> V + Send + 'a,
    ) -> Self {
        self.push(move |mut elements| {
            let count = elements.len();
            if let Some(position) =
                (0..count).find(|&position| predicate(position, count, &elements[position]))
            {
                let current = elements.remove(position);
                elements.insert(position, replace(current));
            }
            elements
        })
    }

    /// Replace every element the predicate accepts.
    pub fn update_iterable(
        self,
        predicate: impl Fn(usize, usize, &V) -> bool + Send + 'a,
        replace: impl Fn(V) -> V + Send + 'a,
    ) -> Self {
        self.push(move |elements| {
            let count = elements.len();
            elements
                .into_iter()
                .enumerate()
                .map(|(position, element)| {
                    if predicate(position, count, &element) {
                        replace(element)
                    } else {
                        element
                    }
                })
                .collect()
        })
    }

    /// Apply the queued edits and store the resulting list.
    pub async fn to_vec(self) -> CacheResult<Vec<V>> {
        let Actions {
            providers,
            descriptor,
            edits,
        } = self;

        let current = match providers
            .request_value::<Vec<V>, _, _, _>(&descriptor, || async { Err(NotCached) })
            .await
        {
            Ok(elements) => elements,
            Err(e) if e.loader_error().is_some_and(|inner| inner.is::<NotCached>()) => Vec::new(),
            Err(e) => return Err(e),
        };

        let edited = edits.into_iter().fold(current, |elements, edit| edit(elements));

        let replacing = descriptor.clone().with_evict(replace_directive(&descriptor));
        providers.replace(&replacing, edited.clone()).await?;
        Ok(edited)
    }
}

/// The narrowest eviction covering the descriptor's own key.
fn replace_directive(descriptor: &Descriptor) -> EvictDirective {
    if descriptor.dynamic_key_group.is_some() {
        EvictDirective::DynamicKeyGroup
    } else if descriptor.dynamic_key.is_some() {
        EvictDirective::DynamicKey
    } else {
        EvictDirective::Provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tiercache_core::{CacheConfig, DynamicKeyGroup};
    use tiercache_storage::InMemoryPersistence;

    fn providers() -> Providers {
        let config = CacheConfig::default().with_evict_expired_on_start(false);
        Providers::new(Arc::new(InMemoryPersistence::new()), config).unwrap()
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| i.to_string()).collect()
    }

    async fn seed(providers: &Providers, descriptor: &Descriptor, n: usize) {
        let stored = Actions::with(providers, descriptor.clone())
            .add_all_last(numbered(0..n))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(stored.len(), n);
    }

    #[tokio::test]
    async fn test_empty_cache_reads_as_empty_list() {
        let providers = providers();
        let mocks = Actions::<String>::with(&providers, Descriptor::new("mocks"))
            .to_vec()
            .await
            .unwrap();
        assert!(mocks.is_empty());
    }

    #[tokio::test]
    async fn test_add_first_and_last() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 10).await;

        let mocks = Actions::with(&providers, descriptor.clone())
            .add_first("first".to_string())
            .add_last("last".to_string())
            .to_vec()
            .await
            .unwrap();
        assert_eq!(mocks.len(), 12);
        assert_eq!(mocks[0], "first");
        assert_eq!(mocks[1], "0");
        assert_eq!(mocks[11], "last");
    }

    #[tokio::test]
    async fn test_add_at_predicate_position() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 4).await;

        let mocks = Actions::with(&providers, descriptor)
            .add(|position, _| position == 2, "x".to_string())
            .to_vec()
            .await
            .unwrap();
        assert_eq!(mocks, vec!["0", "1", "x", "2", "3"]);
    }

    #[tokio::test]
    async fn test_edits_are_persisted() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 3).await;
        Actions::<String>::with(&providers, descriptor.clone())
            .evict_first()
            .to_vec()
            .await
            .unwrap();

        let reread = Actions::<String>::with(&providers, descriptor)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(reread, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_evict_first_and_last_n() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 10).await;

        let mocks = Actions::<String>::with(&providers, descriptor)
            .evict_first_n(4)
            .evict_last_n(2)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(mocks, numbered(4..8));
    }

    #[tokio::test]
    async fn test_count_gated_eviction() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 10).await;

        let untouched = Actions::<String>::with(&providers, descriptor.clone())
            .evict_first_if(|count| count > 10)
            .evict_last_n_if(|count| count > 10, 3)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(untouched.len(), 10);

        let mocks = Actions::<String>::with(&providers, descriptor)
            .evict_first_n_if(|count| count > 9, 5)
            .evict_last_if(|count| count == 5)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(mocks, numbered(5..9));
    }

    #[tokio::test]
    async fn test_evict_by_element() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 5).await;

        let mocks = Actions::<String>::with(&providers, descriptor)
            .evict_where(|element| element == "3")
            .evict(|position, count, element| position == count - 1 && element == "4")
            .to_vec()
            .await
            .unwrap();
        assert_eq!(mocks, numbered(0..3));
    }

    #[tokio::test]
    async fn test_evict_iterable_and_evict_all() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 6).await;

        let evens = Actions::<String>::with(&providers, descriptor.clone())
            .evict_iterable(|position, _, _| position % 2 == 1)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(evens, vec!["0", "2", "4"]);

        let none = Actions::<String>::with(&providers, descriptor)
            .evict_all()
            .to_vec()
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_evict_all_keeping_first_and_last_n() {
        let providers = providers();
        let first = Descriptor::new("first");
        let last = Descriptor::new("last");
        seed(&providers, &first, 10).await;
        seed(&providers, &last, 10).await;

        let kept_first = Actions::<String>::with(&providers, first)
            .evict_all_keeping_first_n(3)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(kept_first, numbered(0..3));

        let kept_last = Actions::<String>::with(&providers, last)
            .evict_all_keeping_last_n(7)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(kept_last, numbered(3..10));
    }

    #[tokio::test]
    async fn test_update_first_match_and_all_matches() {
        let providers = providers();
        let descriptor = Descriptor::new("mocks");
        seed(&providers, &descriptor, 4).await;

        let once = Actions::<String>::with(&providers, descriptor.clone())
            .update(|_, _, element| element.len() == 1, |element| format!("{element}!"))
            .to_vec()
            .await
            .unwrap();
        assert_eq!(once, vec!["0!", "1", "2", "3"]);

        let all = Actions::<String>::with(&providers, descriptor)
            .update_iterable(
                |position, count, _| position + 2 >= count,
                |element| element.repeat(2),
            )
            .to_vec()
            .await
            .unwrap();
        assert_eq!(all, vec!["0!", "1", "22", "33"]);
    }

    #[tokio::test]
    async fn test_scoped_lists_do_not_clobber_each_other() {
        let providers = providers();
        let page_1 =
            Descriptor::new("mocks").with_dynamic_key_group(DynamicKeyGroup::new("f1", "p1"));
        let page_2 =
            Descriptor::new("mocks").with_dynamic_key_group(DynamicKeyGroup::new("f1", "p2"));
        seed(&providers, &page_1, 2).await;
        seed(&providers, &page_2, 3).await;

        let edited = Actions::<String>::with(&providers, page_1)
            .evict_all()
            .to_vec()
            .await
            .unwrap();
        assert!(edited.is_empty());

        let untouched = Actions::<String>::with(&providers, page_2)
            .to_vec()
            .await
            .unwrap();
        assert_eq!(untouched, numbered(0..3));
    }
}
