//! Binding store contract.
//!
//! Bindings are the named, mutable identifier slots that fields point at by id.
//! The store owns them; nodes only hold references. The editor host normally
//! provides the store, `MemoryBindingStore` is the in-process implementation
//! used by the CLI, the wasm bridge and tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

/// Opaque binding identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BindingId(pub u64);

/// A named identifier slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: BindingId,
    pub name: String,
    /// Object type tag (e.g. "Mesh", "Sound"). `None` means untyped.
    pub type_tag: Option<String>,
}

/// Refusal from the store when minting or renaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintError {
    /// Another binding already has this name.
    NameTaken(String),
    /// The host reserves this name.
    Reserved(String),
    /// No binding with this id.
    UnknownBinding(BindingId),
    /// Every candidate name was refused.
    Exhausted { attempts: u32 },
}

impl std::fmt::Display for MintError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MintError::NameTaken(name) => write!(f, "name '{}' is already taken", name),
            MintError::Reserved(name) => write!(f, "name '{}' is reserved", name),
            MintError::UnknownBinding(id) => write!(f, "unknown binding {:?}", id),
            MintError::Exhausted { attempts } => {
                write!(f, "no acceptable name after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for MintError {}

/// Mint/rename/delete/enumerate contract for bindings.
pub trait BindingStore {
    /// Create a binding. Fails if the name is taken or refused.
    fn create(&mut self, name: &str, type_tag: Option<&str>) -> Result<BindingId, MintError>;

    fn get_by_id(&self, id: BindingId) -> Option<&Binding>;

    fn get_by_name(&self, name: &str) -> Option<&Binding>;

    /// All bindings, in a stable order.
    fn enumerate_all(&self) -> Box<dyn Iterator<Item = &Binding> + '_>;

    fn rename(&mut self, id: BindingId, new_name: &str) -> Result<(), MintError>;

    /// Remove a binding. Returns false if it did not exist.
    ///
    /// Callers are responsible for checking that nothing references it;
    /// `Workspace::delete_binding_if_unreferenced` does that.
    fn delete(&mut self, id: BindingId) -> bool;

    /// Whether a binding with this exact name exists.
    fn name_exists(&self, name: &str) -> bool {
        self.get_by_name(name).is_some()
    }

    /// Owned snapshot of every binding name.
    fn names(&self) -> Vec<String> {
        self.enumerate_all().map(|b| b.name.clone()).collect()
    }
}

/// In-memory binding store.
#[derive(Debug, Default)]
pub struct MemoryBindingStore {
    bindings: BTreeMap<BindingId, Binding>,
    by_name: HashMap<String, BindingId>,
    /// Names the host refuses to hand out.
    reserved: HashSet<String>,
    next_id: u64,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Create a store that refuses the given names.
    pub fn with_reserved<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut store = Self::new();
        store.reserved = names.into_iter().map(Into::into).collect();
        store
    }

    pub fn reserve(&mut self, name: impl Into<String>) {
        self.reserved.insert(name.into());
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn check_name(&self, name: &str, owner: Option<BindingId>) -> Result<(), MintError> {
        if self.reserved.contains(name) {
            return Err(MintError::Reserved(name.to_string()));
        }
        match self.by_name.get(name) {
            Some(existing) if Some(*existing) != owner => Err(MintError::NameTaken(name.to_string())),
            _ => Ok(()),
        }
    }
}

impl BindingStore for MemoryBindingStore {
    fn create(&mut self, name: &str, type_tag: Option<&str>) -> Result<BindingId, MintError> {
        self.check_name(name, None)?;
        let id = BindingId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.bindings.insert(
            id,
            Binding {
                id,
                name: name.to_string(),
                type_tag: type_tag.map(str::to_string),
            },
        );
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    fn get_by_id(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(&id)
    }

    fn get_by_name(&self, name: &str) -> Option<&Binding> {
        self.by_name.get(name).and_then(|id| self.bindings.get(id))
    }

    fn enumerate_all(&self) -> Box<dyn Iterator<Item = &Binding> + '_> {
        Box::new(self.bindings.values())
    }

    fn rename(&mut self, id: BindingId, new_name: &str) -> Result<(), MintError> {
        let old_name = match self.bindings.get(&id) {
            Some(binding) => binding.name.clone(),
            None => return Err(MintError::UnknownBinding(id)),
        };
        if old_name == new_name {
            return Ok(());
        }
        self.check_name(new_name, Some(id))?;
        self.by_name.remove(&old_name);
        self.by_name.insert(new_name.to_string(), id);
        if let Some(binding) = self.bindings.get_mut(&id) {
            binding.name = new_name.to_string();
        }
        Ok(())
    }

    fn delete(&mut self, id: BindingId) -> bool {
        match self.bindings.remove(&id) {
            Some(binding) => {
                self.by_name.remove(&binding.name);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup() {
        let mut store = MemoryBindingStore::new();
        let id = store.create("box1", Some("Mesh")).unwrap();

        assert_eq!(store.get_by_id(id).unwrap().name, "box1");
        assert_eq!(store.get_by_name("box1").unwrap().id, id);
        assert_eq!(store.get_by_id(id).unwrap().type_tag.as_deref(), Some("Mesh"));
        assert!(store.name_exists("box1"));
        assert!(!store.name_exists("box2"));
    }

    #[test]
    fn test_duplicate_name_refused() {
        let mut store = MemoryBindingStore::new();
        store.create("box1", None).unwrap();
        assert_eq!(
            store.create("box1", None),
            Err(MintError::NameTaken("box1".to_string()))
        );
    }

    #[test]
    fn test_reserved_names_refused() {
        let mut store = MemoryBindingStore::with_reserved(["sphere1"]);
        assert_eq!(
            store.create("sphere1", None),
            Err(MintError::Reserved("sphere1".to_string()))
        );

        let id = store.create("sphere2", None).unwrap();
        assert!(matches!(store.rename(id, "sphere1"), Err(MintError::Reserved(_))));
        assert_eq!(store.get_by_id(id).unwrap().name, "sphere2");
    }

    #[test]
    fn test_rename_updates_index() {
        let mut store = MemoryBindingStore::new();
        let id = store.create("star4", None).unwrap();
        store.rename(id, "star2").unwrap();

        assert!(store.get_by_name("star4").is_none());
        assert_eq!(store.get_by_name("star2").unwrap().id, id);

        // Renaming to the current name is a no-op.
        store.rename(id, "star2").unwrap();
    }

    #[test]
    fn test_delete() {
        let mut store = MemoryBindingStore::new();
        let id = store.create("box3", None).unwrap();
        assert!(store.delete(id));
        assert!(!store.delete(id));
        assert!(store.get_by_name("box3").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_enumerate_in_creation_order() {
        let mut store = MemoryBindingStore::new();
        store.create("b", None).unwrap();
        store.create("a", None).unwrap();
        assert_eq!(store.names(), vec!["b".to_string(), "a".to_string()]);
    }
}
