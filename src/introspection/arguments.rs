use std::sync::Arc;

use crate::error::ArgumentError;
use crate::plugin_type::{downcast, Object};

/// The resolved arguments handed to a constructor.
pub struct Arguments<'a> {
    values: &'a [(&'static str, Object)],
}

impl<'a> Arguments<'a> {
    pub(crate) fn new(values: &'a [(&'static str, Object)]) -> Self {
        Self { values }
    }

    fn find(&self, name: &str) -> Result<&'a Object, ArgumentError> {
        self.values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
            .ok_or_else(|| ArgumentError::Missing(name.to_string()))
    }

    /// The dependency supplied for `name`.
    pub fn get<D: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<D>, ArgumentError> {
        downcast::<D>(self.find(name)?).ok_or_else(|| ArgumentError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<D>(),
        })
    }

    /// A copy of the value supplied for `name`.
    pub fn value<V: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<V, ArgumentError> {
        self.get::<V>(name).map(|value| (*value).clone())
    }

    /// Every instance supplied for a collection parameter.
    pub fn all<D: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Vec<Arc<D>>, ArgumentError> {
        let mismatch = || ArgumentError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<Vec<Arc<D>>>(),
        };
        let objects = downcast::<Vec<Object>>(self.find(name)?).ok_or_else(mismatch)?;
        objects
            .iter()
            .map(|object| downcast::<D>(object).ok_or_else(mismatch))
            .collect()
    }

    /// Whether an argument named `name` was supplied.
    pub fn contains(&self, name: &str) -> bool {
        self.values.iter().any(|(key, _)| *key == name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
