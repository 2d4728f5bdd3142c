use std::{
    any::{type_name, Any, TypeId},
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

/// Worker-local state handed to every lifecycle handler.
///
/// One instance lives for the whole worker process. Values are keyed by
/// their type, so each component keeps its own slot by using a private
/// type as the key. Locks are only held for the duration of a single
/// insert or take, never across an `.await`.
#[derive(Default)]
pub struct WorkerState {
    slots: Mutex<HashMap<TypeId, Slot>>,
}

struct Slot {
    name: &'static str,
    value: Box<dyn Any + Send>,
}

impl WorkerState {
    /// Create an empty worker state
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<TypeId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a value, returning the previous value of the same type
    pub fn insert<T: Send + 'static>(&self, value: T) -> Option<T> {
        self.slots()
            .insert(
                TypeId::of::<T>(),
                Slot {
                    name: type_name::<T>(),
                    value: Box::new(value),
                },
            )
            .and_then(|prev| prev.value.downcast::<T>().ok())
            .map(|prev| *prev)
    }

    /// Store a value only if no value of the same type is present.
    ///
    /// The check and the write happen under one lock, so of two racing
    /// callers exactly one wins. The loser gets its value back.
    pub fn try_insert<T: Send + 'static>(&self, value: T) -> Result<(), T> {
        match self.slots().entry(TypeId::of::<T>()) {
            Entry::Occupied(_) => Err(value),
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    name: type_name::<T>(),
                    value: Box::new(value),
                });
                Ok(())
            }
        }
    }

    /// Remove and return the value stored for `T`
    pub fn take<T: Send + 'static>(&self) -> Option<T> {
        self.slots()
            .remove(&TypeId::of::<T>())
            .and_then(|slot| slot.value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Remove and return the value stored for `T` if `predicate` accepts it
    pub fn take_if<T, F>(&self, predicate: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&T) -> bool,
    {
        let mut slots = self.slots();
        let Entry::Occupied(slot) = slots.entry(TypeId::of::<T>()) else {
            return None;
        };
        if !slot.get().value.downcast_ref::<T>().is_some_and(predicate) {
            return None;
        }
        slot.remove().value.downcast::<T>().ok().map(|value| *value)
    }

    /// Whether a value is stored for `T`
    pub fn contains<T: 'static>(&self) -> bool {
        self.slots().contains_key(&TypeId::of::<T>())
    }

    /// Whether the state holds nothing
    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

impl fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots();
        f.debug_struct("WorkerState")
            .field("slots", &slots.values().map(|s| s.name).collect::<Vec<_>>())
            .finish()
    }
}
