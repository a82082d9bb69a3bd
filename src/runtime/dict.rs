//! Separate-chaining hash table keyed by `Value`.
//!
//! The table itself never compares keys: equality of CJ values may run user
//! code (`_eq`), so the VM copies a bucket's candidate keys out with
//! [`ValueDict::candidates`], compares them, and then acts on the returned
//! position. Entries remember their hash, so growing the table never needs the
//! VM.

use crate::object::Value;

pub const INITIAL_BUCKETS: usize = 8;
pub const MAX_LOAD_FACTOR: f64 = 0.75;

/// Scaling rounds applied to a fractional number before it is truncated.
const MAX_NUMBER_HASH_ROUNDS: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub hash: u32,
    pub key: Value,
    pub value: Value,
}

/// Position of an entry: bucket index and index within the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPos {
    pub bucket: usize,
    pub slot: usize,
}

#[derive(Debug, Clone)]
pub struct ValueDict {
    buckets: Vec<Vec<Entry>>,
    len: usize,
}

impl Default for ValueDict {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueDict {
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); INITIAL_BUCKETS],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_of(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    /// Keys that share `hash`, with their positions, for comparison by the VM.
    pub fn candidates(&self, hash: u32) -> Vec<(EntryPos, Value)> {
        let bucket = self.bucket_of(hash);
        self.buckets[bucket]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.hash == hash)
            .map(|(slot, e)| (EntryPos { bucket, slot }, e.key))
            .collect()
    }

    /// The entry at `pos` if it still holds `key`.
    ///
    /// Comparisons can run user code that mutates this dict, so positions
    /// handed out by [`candidates`](Self::candidates) are revalidated here.
    pub fn entry_at(&self, pos: EntryPos, key: Value) -> Option<&Entry> {
        self.buckets
            .get(pos.bucket)
            .and_then(|b| b.get(pos.slot))
            .filter(|e| e.key == key)
    }

    pub fn set_value(&mut self, pos: EntryPos, key: Value, value: Value) -> bool {
        match self
            .buckets
            .get_mut(pos.bucket)
            .and_then(|b| b.get_mut(pos.slot))
        {
            Some(entry) if entry.key == key => {
                entry.value = value;
                true
            }
            _ => false,
        }
    }

    pub fn remove_at(&mut self, pos: EntryPos, key: Value) -> Option<Entry> {
        let bucket = self.buckets.get_mut(pos.bucket)?;
        if bucket.get(pos.slot).map(|e| e.key) != Some(key) {
            return None;
        }
        self.len -= 1;
        Some(bucket.remove(pos.slot))
    }

    /// Add a key known to be absent, growing the table past the load factor.
    pub fn insert_new(&mut self, hash: u32, key: Value, value: Value) {
        let bucket = self.bucket_of(hash);
        self.buckets[bucket].push(Entry { hash, key, value });
        self.len += 1;
        if self.len as f64 / self.buckets.len() as f64 > MAX_LOAD_FACTOR {
            self.resize(self.buckets.len() * 2);
        }
    }

    fn resize(&mut self, new_size: usize) {
        let mut buckets = vec![Vec::new(); new_size];
        for entry in self.buckets.drain(..).flatten() {
            buckets[entry.hash as usize % new_size].push(entry);
        }
        self.buckets = buckets;
    }

    /// Entries in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.buckets.iter().flatten()
    }
}

/// Hash for numeric keys: scale until the fraction vanishes, then truncate.
///
/// Numbers that agree to within the scaling precision land in the same
/// bucket, matching the tolerance of numeric equality.
pub fn hash_number(n: f64) -> u32 {
    let mut num = n;
    let mut rounds = 0;
    while (num % 1.0).abs() >= 1e-5 && rounds < MAX_NUMBER_HASH_ROUNDS {
        num *= 10.0;
        rounds += 1;
    }
    num as i64 as u32
}

/// djb2 over the string's bytes.
pub fn hash_str(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |h, c| h.wrapping_mul(33).wrapping_add(c as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_number_hash_buckets_integers_and_fractions() {
        assert_eq!(hash_number(42.0), 42);
        assert_eq!(hash_number(1.5), 15);
        assert_eq!(hash_number(1.0), hash_number(1.0 + 1e-10));
        assert_eq!(hash_number(-2.0), (-2i64) as u32);
    }

    #[test]
    fn test_number_hash_terminates_on_long_fractions() {
        let _ = hash_number(std::f64::consts::PI);
        let _ = hash_number(1.0 / 3.0);
    }

    #[test]
    fn test_str_hash_is_djb2() {
        assert_eq!(hash_str(""), 5381);
        assert_eq!(hash_str("a"), 5381 * 33 + 97);
    }

    #[test]
    fn test_insert_grows_and_keeps_entries() {
        let mut dict = ValueDict::new();
        for i in 0..20 {
            dict.insert_new(i, Value::Number(i as f64), Value::Bool(true));
        }
        assert_eq!(dict.len(), 20);
        assert!(dict.bucket_count() > INITIAL_BUCKETS);
        for i in 0..20u32 {
            let found = dict.candidates(i);
            assert_eq!(found.len(), 1);
            assert_eq!(found[0].1, Value::Number(i as f64));
        }
    }

    #[test]
    fn test_stale_positions_are_rejected() {
        let mut dict = ValueDict::new();
        dict.insert_new(3, Value::Number(3.0), Value::None);
        let (pos, key) = dict.candidates(3)[0];
        assert!(dict.remove_at(pos, key).is_some());
        assert!(dict.remove_at(pos, key).is_none());
        assert!(!dict.set_value(pos, key, Value::None));
        assert!(dict.is_empty());
    }
}
