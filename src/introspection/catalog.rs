use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::ConcreteType;

/// Memoizes concrete type descriptions so each `describe` runs once.
#[derive(Default)]
pub struct TypeCatalog {
    types: RwLock<HashMap<TypeId, Arc<ConcreteType>>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The description for `id`, produced by `describe` on first request.
    pub fn get_or_describe(&self, id: TypeId, describe: fn() -> ConcreteType) -> Arc<ConcreteType> {
        if let Some(concrete) = self.types.read().get(&id) {
            return concrete.clone();
        }
        let concrete = Arc::new(describe());
        self.types.write().entry(id).or_insert(concrete).clone()
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspection::{Describe, Pluggable};

    struct Widget;

    impl Pluggable for Widget {
        fn describe(d: &mut Describe<Self>) {
            d.constructor(|_| Ok(Widget));
        }
    }

    #[test]
    fn descriptions_are_shared() {
        let catalog = TypeCatalog::new();
        let first = catalog.get_or_describe(TypeId::of::<Widget>(), ConcreteType::of::<Widget>);
        let second = catalog.get_or_describe(TypeId::of::<Widget>(), ConcreteType::of::<Widget>);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(catalog.len(), 1);
    }
}
