//! Process-wide name registries.
//!
//! Relationship types, property keys, and named reference nodes are
//! registered lazily on first use and never evicted. Creation runs under
//! a single-writer lock with a double check, so concurrent first uses of
//! one name agree on its id and the store records exactly one creation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::common::{EntityKind, Error, KeyId, NodeId, Result, TypeId};
use crate::store::{IdGenerator, PropertyValue, RecordLoader};

/// Registry of relationship type names.
pub struct RelationshipTypeHolder {
    by_name: RwLock<HashMap<String, TypeId>>,
    by_id: RwLock<HashMap<TypeId, String>>,
    create_lock: Mutex<()>,
    loader: Arc<dyn RecordLoader>,
    id_generator: Arc<dyn IdGenerator>,
}

impl RelationshipTypeHolder {
    /// Build the holder, bootstrapping already registered types from the
    /// store.
    pub fn new(loader: Arc<dyn RecordLoader>, id_generator: Arc<dyn IdGenerator>) -> Result<Self> {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (id, name) in loader.relationship_types()? {
            by_name.insert(name.clone(), id);
            by_id.insert(id, name);
        }

        Ok(Self {
            by_name: RwLock::new(by_name),
            by_id: RwLock::new(by_id),
            create_lock: Mutex::new(()),
            loader,
            id_generator,
        })
    }

    /// Id of a registered type name.
    pub fn id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.read().get(name).copied()
    }

    /// Name of a registered type id.
    pub fn name_of(&self, id: TypeId) -> Option<String> {
        self.by_id.read().get(&id).cloned()
    }

    /// Look a type up, registering it if unknown.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty name; `Store` when recording the
    /// new type fails.
    pub fn get_or_create(&self, name: &str) -> Result<TypeId> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "relationship type name must not be empty".into(),
            ));
        }

        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }

        let _creator = self.create_lock.lock();
        // Another creator may have won the race for this name.
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }

        let id = TypeId::new(self.id_generator.next_id(EntityKind::RelationshipType) as u32);
        self.loader.create_relationship_type(id, name)?;

        self.by_name.write().insert(name.to_owned(), id);
        self.by_id.write().insert(id, name.to_owned());
        Ok(id)
    }
}

/// Registry of property key names.
pub struct PropertyKeyHolder {
    by_name: RwLock<HashMap<String, KeyId>>,
    by_id: RwLock<HashMap<KeyId, String>>,
    create_lock: Mutex<()>,
    loader: Arc<dyn RecordLoader>,
    id_generator: Arc<dyn IdGenerator>,
}

impl PropertyKeyHolder {
    /// Build the holder, bootstrapping already registered keys from the
    /// store.
    pub fn new(loader: Arc<dyn RecordLoader>, id_generator: Arc<dyn IdGenerator>) -> Result<Self> {
        let mut by_name = HashMap::new();
        let mut by_id = HashMap::new();
        for (id, name) in loader.property_keys()? {
            by_name.insert(name.clone(), id);
            by_id.insert(id, name);
        }

        Ok(Self {
            by_name: RwLock::new(by_name),
            by_id: RwLock::new(by_id),
            create_lock: Mutex::new(()),
            loader,
            id_generator,
        })
    }

    pub fn id_of(&self, name: &str) -> Option<KeyId> {
        self.by_name.read().get(name).copied()
    }

    pub fn name_of(&self, id: KeyId) -> Option<String> {
        self.by_id.read().get(&id).cloned()
    }

    /// Look a key up, registering it if unknown.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty name; `Store` when recording the
    /// new key fails.
    pub fn get_or_create(&self, name: &str) -> Result<KeyId> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "property key name must not be empty".into(),
            ));
        }

        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }

        let _creator = self.create_lock.lock();
        if let Some(id) = self.id_of(name) {
            return Ok(id);
        }

        let id = KeyId::new(self.id_generator.next_id(EntityKind::PropertyKey) as u32);
        self.loader.create_property_key(id, name)?;

        self.by_name.write().insert(name.to_owned(), id);
        self.by_id.write().insert(id, name.to_owned());
        Ok(id)
    }
}

/// Prefix for the graph properties that record reference-node bindings.
const REFERENCE_NODE_KEY_PREFIX: &str = "reference_node:";

/// Directory of well-known named root nodes.
///
/// The name-to-node binding is durable: it is recorded as a graph
/// property through the loader, so a re-opened store resolves the same
/// roots.
pub struct ReferenceNodeHolder {
    nodes: RwLock<HashMap<String, NodeId>>,
    create_lock: Mutex<()>,
    loader: Arc<dyn RecordLoader>,
    id_generator: Arc<dyn IdGenerator>,
    keys: Arc<PropertyKeyHolder>,
}

impl ReferenceNodeHolder {
    pub fn new(
        loader: Arc<dyn RecordLoader>,
        id_generator: Arc<dyn IdGenerator>,
        keys: Arc<PropertyKeyHolder>,
    ) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
            loader,
            id_generator,
            keys,
        }
    }

    /// Resolve the reference node for `name`, creating it on first use.
    ///
    /// Idempotent: repeated calls return the same node id and the store
    /// records exactly one creation.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty name; `Store` on loader failures.
    pub fn reference_node(&self, name: &str) -> Result<NodeId> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "reference node name must not be empty".into(),
            ));
        }

        if let Some(id) = self.nodes.read().get(name) {
            return Ok(*id);
        }

        let _creator = self.create_lock.lock();
        if let Some(id) = self.nodes.read().get(name) {
            return Ok(*id);
        }

        let key = self
            .keys
            .get_or_create(&format!("{REFERENCE_NODE_KEY_PREFIX}{name}"))?;

        // A binding recorded by an earlier run wins over creating anew.
        let id = match self.loader.graph_property(key)? {
            Some(PropertyValue::Long(raw)) => NodeId::new(raw as u64),
            _ => {
                let id = NodeId::new(self.id_generator.next_id(EntityKind::Node));
                self.loader.create_node(id)?;
                self.loader
                    .graph_add_property(key, PropertyValue::Long(id.0 as i64))?;
                id
            }
        };

        self.nodes.write().insert(name.to_owned(), id);
        Ok(id)
    }
}
