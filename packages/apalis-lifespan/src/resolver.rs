//! Resolving an application from a configured path.
//!
//! Workers are usually configured with a string naming the application,
//! e.g. `"my_service::app"`. An [`Importer`] turns the string into an
//! [`AppTarget`], which is either a ready application or a zero-argument
//! factory producing one. [`resolve`] then checks that the result is the
//! application type the worker expects.
use std::{
    any::{type_name, Any},
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{error::ResolveError, lifespan::Application};

/// A type erased object returned by an [`Importer`]
pub type AnyObject = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn() -> AnyObject + Send + Sync>;

/// What an application path points at
#[derive(Clone)]
pub enum AppTarget {
    /// An already built object
    Instance(AnyObject),
    /// A zero-argument factory, called once per resolution
    Factory(Factory),
}

impl AppTarget {
    /// Point at an existing object
    pub fn instance<T: Any + Send + Sync>(value: T) -> Self {
        AppTarget::Instance(Arc::new(value))
    }

    /// Point at a factory building the object
    pub fn factory<F, T>(f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        AppTarget::Factory(Arc::new(move || Arc::new(f()) as AnyObject))
    }
}

impl fmt::Debug for AppTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppTarget::Instance(_) => f.write_str("AppTarget::Instance"),
            AppTarget::Factory(_) => f.write_str("AppTarget::Factory"),
        }
    }
}

/// Looks up objects by path
pub trait Importer: Send + Sync {
    /// Find the object registered under `path`
    fn import(&self, path: &str) -> Option<AppTarget>;
}

impl<I: Importer + ?Sized> Importer for Arc<I> {
    fn import(&self, path: &str) -> Option<AppTarget> {
        (**self).import(path)
    }
}

/// Resolve `path` to an application of type `A`.
///
/// An instance is downcast directly. Anything else is treated as a
/// factory: it is called exactly once and its output must be an `A`.
pub fn resolve<A, I>(importer: &I, path: &str) -> Result<Arc<A>, ResolveError>
where
    A: Application,
    I: Importer + ?Sized,
{
    let object = match importer.import(path) {
        Some(AppTarget::Instance(object)) => object,
        Some(AppTarget::Factory(factory)) => factory(),
        None => {
            return Err(ResolveError::NotFound {
                path: path.to_owned(),
            })
        }
    };
    object
        .downcast::<A>()
        .map_err(|_| ResolveError::NotAnApplication {
            path: path.to_owned(),
            expected: type_name::<A>(),
        })
}

/// An in-memory [`Importer`] populated at program start.
///
/// ```rust
/// # use apalis_lifespan::{AppTarget, Importer, ObjectRegistry};
/// let registry = ObjectRegistry::new()
///     .with_instance("settings::retries", 3u32)
///     .with_factory("settings::name", || String::from("worker"));
/// assert!(matches!(registry.import("settings::retries"), Some(AppTarget::Instance(_))));
/// assert!(registry.import("settings::missing").is_none());
/// ```
#[derive(Default)]
pub struct ObjectRegistry {
    objects: RwLock<HashMap<String, AppTarget>>,
}

impl ObjectRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target under `path`, replacing any previous one
    pub fn insert(&self, path: impl Into<String>, target: AppTarget) -> Option<AppTarget> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), target)
    }

    /// Register an existing object under `path`
    pub fn with_instance<T: Any + Send + Sync>(self, path: impl Into<String>, value: T) -> Self {
        self.insert(path, AppTarget::instance(value));
        self
    }

    /// Register a factory under `path`
    pub fn with_factory<F, T>(self, path: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        self.insert(path, AppTarget::factory(f));
        self
    }
}

impl Importer for ObjectRegistry {
    fn import(&self, path: &str) -> Option<AppTarget> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map().entries(objects.iter()).finish()
    }
}
