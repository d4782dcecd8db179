use std::collections::BTreeMap;

use phono_codec::KeyInfo;
use phono_types::ObjectType;

use crate::error::{ModelError, ModelResult};
use crate::object::Object;

/// Builds an object from a decoded key and its value bytes.
pub type Hydrator = fn(&KeyInfo, &[u8]) -> ModelResult<Object>;

/// Per-type load and save counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounters {
    pub loads: u64,
    pub saves: u64,
}

#[derive(Clone, Debug)]
struct Registration {
    name: &'static str,
    hydrate: Hydrator,
    counters: TypeCounters,
}

/// Object types known to a session and how to hydrate them.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: BTreeMap<ObjectType, Registration>,
}

impl TypeRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All six types, hydrated through [`Object::from_storage`].
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for t in ObjectType::ALL {
            registry.register(t, Object::from_storage);
        }
        registry
    }

    /// Register `object_type`, resetting its counters.
    pub fn register(&mut self, object_type: ObjectType, hydrate: Hydrator) {
        self.types.insert(
            object_type,
            Registration {
                name: object_type.name(),
                hydrate,
                counters: TypeCounters::default(),
            },
        );
    }

    pub fn unregister(&mut self, object_type: ObjectType) -> bool {
        self.types.remove(&object_type).is_some()
    }

    pub fn is_registered(&self, object_type: ObjectType) -> bool {
        self.types.contains_key(&object_type)
    }

    /// Registered type with the given name, case-insensitive.
    pub fn lookup(&self, name: &str) -> ModelResult<ObjectType> {
        self.types
            .iter()
            .find(|(_, r)| r.name.eq_ignore_ascii_case(name))
            .map(|(t, _)| *t)
            .ok_or_else(|| match name.parse::<ObjectType>() {
                Ok(t) => ModelError::UnregisteredType(t),
                Err(e) => ModelError::Codec(e.into()),
            })
    }

    /// Hydrate and count one load.
    pub fn hydrate(&mut self, object_type: ObjectType, info: &KeyInfo, value: &[u8]) -> ModelResult<Object> {
        let reg = self
            .types
            .get_mut(&object_type)
            .ok_or(ModelError::UnregisteredType(object_type))?;
        let object = (reg.hydrate)(info, value)?;
        reg.counters.loads += 1;
        Ok(object)
    }

    pub fn count_save(&mut self, object_type: ObjectType) -> ModelResult<()> {
        let reg = self
            .types
            .get_mut(&object_type)
            .ok_or(ModelError::UnregisteredType(object_type))?;
        reg.counters.saves += 1;
        Ok(())
    }

    pub fn counters(&self, object_type: ObjectType) -> Option<TypeCounters> {
        self.types.get(&object_type).map(|r| r.counters)
    }

    /// Counters of every registered type, in rank order.
    pub fn all_counters(&self) -> BTreeMap<ObjectType, TypeCounters> {
        self.types.iter().map(|(t, r)| (*t, r.counters)).collect()
    }

    pub fn reset_counters(&mut self) {
        for reg in self.types.values_mut() {
            reg.counters = TypeCounters::default();
        }
    }
}
