//! Dictionary keyed by epsilon-equal geometry
//!
//! Keys such as [`Vector3`](super::Vector3) or [`Plane`](super::Plane) cannot
//! be hashed directly because their equality tolerates small differences.
//! Each key instead provides a scalar seed; keys that compare equal have
//! seeds less than 1.0 apart. An entry is filed under both `floor(seed)` and
//! `floor(seed) + 1`, so two equal keys always share at least one bucket even
//! when their seeds straddle an integer.

use std::collections::HashMap;

/// A key usable in a [`GeometryDict`]
pub trait GeometryKey: PartialEq {
    /// Linear combination of the key's coordinates; keys that compare equal
    /// must produce seeds less than 1.0 apart
    fn hash_seed(&self) -> f64;
}

/// Map from epsilon-equal keys to values
#[derive(Debug, Clone)]
pub struct GeometryDict<K, V> {
    /// Entries in insertion order
    entries: Vec<(K, V)>,
    /// Bucket -> indices into `entries`
    buckets: HashMap<i64, Vec<usize>>,
}

impl<K, V> Default for GeometryDict<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            buckets: HashMap::new(),
        }
    }
}

impl<K: GeometryKey, V> GeometryDict<K, V> {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bucket_of(key: &K) -> i64 {
        key.hash_seed().floor() as i64
    }

    fn find(&self, key: &K) -> Option<usize> {
        let bucket = Self::bucket_of(key);
        [bucket, bucket + 1]
            .iter()
            .filter_map(|b| self.buckets.get(b))
            .flatten()
            .copied()
            .find(|&index| self.entries[index].0 == *key)
    }

    fn push(&mut self, key: K, value: V) -> usize {
        let bucket = Self::bucket_of(&key);
        let index = self.entries.len();
        self.entries.push((key, value));
        self.buckets.entry(bucket).or_default().push(index);
        self.buckets.entry(bucket + 1).or_default().push(index);
        index
    }

    /// Insert a value. If an equal key is already present, its value is
    /// replaced (the stored key is kept) and the old value returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.find(&key) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
            None => {
                self.push(key, value);
                None
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// The stored key equal to `key`, with its value
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let (k, v) = &self.entries[self.find(key)?];
        Some((k, v))
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.find(key)?;
        Some(&mut self.entries[index].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Value for `key`, inserting `default()` first if no equal key exists
    pub fn get_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
        let index = match self.find(&key) {
            Some(index) => index,
            None => self.push(key, default()),
        };
        &mut self.entries[index].1
    }

    /// Remove the entry whose key equals `key`.
    ///
    /// Later entries shift down, so this is linear in the size of the
    /// dictionary.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.find(key)?;
        let (_, value) = self.entries.remove(index);
        self.buckets.retain(|_, indices| {
            indices.retain(|&i| i != index);
            for i in indices.iter_mut().filter(|i| **i > index) {
                *i -= 1;
            }
            !indices.is_empty()
        });
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.clear();
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }
}

impl<K: GeometryKey, V> FromIterator<(K, V)> for GeometryDict<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.insert(k, v);
        }
        dict
    }
}
