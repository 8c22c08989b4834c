//! Typed object collections with id, name and insertion-order lookup.

use std::collections::HashMap;

use crate::error::{RenderError, RenderResult};
use crate::scene::object::ObjectId;

struct Entry<T> {
    name: String,
    value: T,
}

/// Keyed collection of scene objects.
///
/// Ids and names are unique within a store; iteration and index access follow
/// insertion order.
pub struct Store<T> {
    entries: HashMap<ObjectId, Entry<T>>,
    names: HashMap<String, ObjectId>,
    order: Vec<ObjectId>,
}

impl<T> Default for Store<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            names: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<T> Store<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ObjectId, name: &str, value: T) -> RenderResult<()> {
        if self.entries.contains_key(&id) {
            return Err(RenderError::DuplicateId(id.0));
        }
        if self.names.contains_key(name) {
            return Err(RenderError::DuplicateName(name.to_string()));
        }
        self.names.insert(name.to_string(), id);
        self.entries.insert(
            id,
            Entry {
                name: name.to_string(),
                value,
            },
        );
        self.order.push(id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.entries.get(&id).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.entries.get_mut(&id).map(|e| &mut e.value)
    }

    pub fn id_of(&self, name: &str) -> Option<ObjectId> {
        self.names.get(name).copied()
    }

    pub fn name_of(&self, id: ObjectId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.name.as_str())
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    pub fn id_at(&self, index: usize) -> Option<ObjectId> {
        self.order.get(index).copied()
    }

    pub fn get_by_index(&self, index: usize) -> Option<&T> {
        self.id_at(index).and_then(|id| self.get(id))
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        self.names.remove(&entry.name);
        self.order.retain(|other| *other != id);
        Some(entry.value)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.order.iter().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|e| (*id, &e.value)))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.entries.values_mut().map(|e| &mut e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let mut store = Store::new();
        store.insert(ObjectId(3), "a", 10).unwrap();
        store.insert(ObjectId(1), "b", 20).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(ObjectId(3)), Some(&10));
        assert_eq!(store.get_by_name("b"), Some(&20));
        assert_eq!(store.get_by_index(0), Some(&10));
        assert_eq!(store.id_at(1), Some(ObjectId(1)));
        assert_eq!(store.name_of(ObjectId(1)), Some("b"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut store = Store::new();
        store.insert(ObjectId(1), "a", ()).unwrap();
        assert_eq!(
            store.insert(ObjectId(1), "other", ()),
            Err(RenderError::DuplicateId(1))
        );
        assert_eq!(
            store.insert(ObjectId(2), "a", ()),
            Err(RenderError::DuplicateName("a".into()))
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut store = Store::new();
        for i in 1..=4 {
            store.insert(ObjectId(i), &format!("n{i}"), i).unwrap();
        }
        assert_eq!(store.remove(ObjectId(2)), Some(2));
        assert!(!store.contains_name("n2"));
        let ids: Vec<_> = store.ids().map(|id| id.0).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(store.remove(ObjectId(2)), None);
    }
}
