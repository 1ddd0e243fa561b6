/// Table of values under unique string keys. Inserting an existing key replaces
/// the value in place; iteration follows first-insertion order.
pub struct Registry<T> {
    entries: Vec<(String, T)>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the replaced value, if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        let key = key.into();

        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let index = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries
            .iter_mut()
            .map(|(key, value)| (key.as_str(), value))
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut registry = Registry::new();
        registry.insert("a", 1);
        registry.insert("b", 2);

        assert_eq!(registry.insert("a", 3), Some(1));
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(
            registry.iter_mut().map(|(_, v)| *v).collect::<Vec<_>>(),
            vec![3, 2]
        );
    }

    #[test]
    fn removing_absent_key_is_a_no_op() {
        let mut registry: Registry<u32> = Registry::new();
        registry.insert("present", 1);

        assert_eq!(registry.remove("absent"), None);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove("present"), Some(1));
        assert!(registry.is_empty());
    }

    proptest! {
        #[test]
        fn keys_stay_unique(ops in prop::collection::vec(("[a-d]", any::<bool>()), 0..64)) {
            let mut registry = Registry::new();
            let mut model = HashSet::new();

            for (key, insert) in ops {
                if insert {
                    registry.insert(key.clone(), ());
                    model.insert(key);
                } else {
                    registry.remove(&key);
                    model.remove(&key);
                }
            }

            let keys: Vec<&str> = registry.keys().collect();
            let unique: HashSet<&str> = keys.iter().copied().collect();
            prop_assert_eq!(keys.len(), unique.len());
            prop_assert_eq!(unique, model.iter().map(String::as_str).collect::<HashSet<_>>());
        }
    }
}
