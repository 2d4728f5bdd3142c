use std::{
    any::{type_name, Any, TypeId},
    collections::HashMap,
    fmt,
    ops::Deref,
};

/// A type keyed registry of shared values.
///
/// Brokers consult it when building task arguments: every type can be
/// present at most once, inserting it again replaces the previous value.
///
/// ```rust
/// # use apalis_lifespan::DependencyContext;
/// #[derive(Clone)]
/// struct Pool;
///
/// let ctx = DependencyContext::new().with(Pool).with(42u32);
/// assert_eq!(ctx.len(), 2);
/// assert_eq!(ctx.get::<u32>(), Some(&42));
/// ```
#[derive(Default)]
pub struct DependencyContext {
    entries: HashMap<TypeId, Entry>,
}

struct Entry {
    name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl DependencyContext {
    /// Build an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one previously stored for `T`
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.entries
            .insert(
                TypeId::of::<T>(),
                Entry {
                    name: type_name::<T>(),
                    value: Box::new(value),
                },
            )
            .and_then(|prev| prev.value.downcast::<T>().ok())
            .map(|prev| *prev)
    }

    /// Builder form of [`DependencyContext::insert`]
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.insert(value);
        self
    }

    /// Get a reference to the value stored for `T`
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<T>())
    }

    /// Like [`DependencyContext::get`] but reports which type was missing
    pub fn get_checked<T: 'static>(&self) -> Result<&T, MissingDataError> {
        self.get::<T>()
            .ok_or_else(|| MissingDataError::NotFound(type_name::<T>().to_owned()))
    }

    /// Whether a value is stored for `T`
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Move every entry of `other` into this context.
    /// Entries in `other` win over existing ones of the same type.
    pub fn extend(&mut self, other: DependencyContext) {
        self.entries.extend(other.entries);
    }

    /// Number of stored types
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the stored types, in no particular order
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.values().map(|entry| entry.name)
    }
}

impl fmt::Debug for DependencyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}

/// Extension data extracted from a [`DependencyContext`].
/// This is commonly used to share the application and its state with tasks.
#[derive(Debug, Clone, Copy)]
pub struct Data<T>(T);

impl<T> Data<T> {
    /// Build a new data entry
    pub fn new(inner: T) -> Data<T> {
        Data(inner)
    }

    /// Unwrap the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Data<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Clone + 'static> TryFrom<&DependencyContext> for Data<T> {
    type Error = MissingDataError;

    fn try_from(ctx: &DependencyContext) -> Result<Self, Self::Error> {
        ctx.get_checked::<T>().cloned().map(Data::new)
    }
}

/// Error returned when a type is not present in the dependency context
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MissingDataError {
    /// No value stored for the type
    #[error("the type for key `{0}` is not available")]
    NotFound(String),
}
