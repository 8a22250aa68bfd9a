//! Coalescing of concurrent identical requests.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

type Slot = Arc<dyn Any + Send + Sync>;

/// One shared slot per (key, result type) while a request is in flight.
///
/// The first caller to reach an empty slot runs its initializer; everyone
/// else waits for that result. If the running caller is cancelled, the next
/// waiter runs its own initializer. The slot is dropped once resolved so later
/// requests start over.
#[derive(Default)]
pub(crate) struct InFlight {
    cells: Mutex<HashMap<(String, TypeId), Slot>>,
}

impl InFlight {
    pub(crate) async fn run<T, F, Fut>(&self, key: &str, init: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = (key.to_string(), TypeId::of::<T>());
        let cell: Arc<OnceCell<T>> = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            let entry = cells
                .entry(slot.clone())
                .or_insert_with(|| Arc::new(OnceCell::<T>::new()) as Slot);
            Arc::clone(entry)
                .downcast::<OnceCell<T>>()
                .unwrap_or_else(|_| Arc::new(OnceCell::new()))
        };

        let release = Release {
            cells: &self.cells,
            slot,
            cell,
        };
        let value = release.cell.get_or_init(init).await.clone();
        drop(release);

        value
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.len()
    }
}

/// Drops a slot from the map once its caller is done with it.
///
/// A resolved slot is always dropped. An unresolved one (its runner was
/// cancelled) is dropped only when no other caller is waiting on it.
struct Release<'a, T> {
    cells: &'a Mutex<HashMap<(String, TypeId), Slot>>,
    slot: (String, TypeId),
    cell: Arc<OnceCell<T>>,
}

impl<T> Drop for Release<'_, T> {
    fn drop(&mut self) {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        let ours = Arc::as_ptr(&self.cell).cast::<()>();
        let release = cells.get(&self.slot).is_some_and(|current| {
            // One reference in the map, one held here.
            Arc::as_ptr(current).cast::<()>() == ours
                && (self.cell.initialized() || Arc::strong_count(current) == 2)
        });
        if release {
            cells.remove(&self.slot);
        }
    }
}
