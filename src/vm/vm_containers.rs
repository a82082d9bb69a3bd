//! List and hash-table access for the builtin container methods.
//!
//! Key comparison runs `_eq`, which may be user code, so lookups copy a
//! bucket's candidate keys out of the table, compare them with the table
//! unborrowed, and revalidate the position before acting on it.

use crate::error::RuntimeError;
use crate::object::{ObjRef, ObjectData, Value};
use crate::runtime::dict::{hash_number, hash_str, EntryPos, ValueDict};

use super::vm::Vm;

impl Vm {
    pub fn list_items(&self, list: ObjRef) -> Result<Vec<Value>, RuntimeError> {
        match self.program.heap.get(list).map(|o| &o.data) {
            Some(ObjectData::List(items)) => Ok(items.clone()),
            _ => Err(RuntimeError::type_error("Object is not a list")),
        }
    }

    pub fn list_mut(&mut self, list: ObjRef) -> Result<&mut Vec<Value>, RuntimeError> {
        match self.program.heap.get_mut(list).map(|o| &mut o.data) {
            Some(ObjectData::List(items)) => Ok(items),
            _ => Err(RuntimeError::type_error("Object is not a list")),
        }
    }

    fn table(&self, table: ObjRef) -> Result<&ValueDict, RuntimeError> {
        match self.program.heap.get(table).map(|o| &o.data) {
            Some(ObjectData::Dict(dict) | ObjectData::Set(dict)) => Ok(dict),
            _ => Err(RuntimeError::type_error("Object is not a dict or set")),
        }
    }

    fn table_mut(&mut self, table: ObjRef) -> Result<&mut ValueDict, RuntimeError> {
        match self.program.heap.get_mut(table).map(|o| &mut o.data) {
            Some(ObjectData::Dict(dict) | ObjectData::Set(dict)) => Ok(dict),
            _ => Err(RuntimeError::type_error("Object is not a dict or set")),
        }
    }

    /// Hash of a key: numbers and strings by content, anything else through
    /// its `hashString` method.
    pub fn hash_value(&mut self, key: Value) -> Result<u32, RuntimeError> {
        if let Value::Number(n) = key {
            return Ok(hash_number(n));
        }
        if let Some(s) = key
            .as_object()
            .and_then(|r| self.program.heap.get(r))
            .and_then(|o| o.as_str())
        {
            return Ok(hash_str(s));
        }
        let method = self.find_attr(key, "hashString").ok_or_else(|| {
            RuntimeError::Hash(format!(
                "Object of class '{}' has no hashString method",
                self.class_name(key)
            ))
        })?;
        let hash = self.call_for_value(method, key, &[])?;
        hash.as_number()
            .map(|n| n as i64 as u32)
            .ok_or_else(|| RuntimeError::Hash("hashString must return a num".to_string()))
    }

    /// Hash of `key` and the position of an equal key, if present.
    fn table_find(
        &mut self,
        table: ObjRef,
        key: Value,
    ) -> Result<(u32, Option<(EntryPos, Value)>), RuntimeError> {
        let hash = self.hash_value(key)?;
        let candidates = self.table(table)?.candidates(hash);
        for (pos, candidate) in candidates {
            if self.values_equal(key, candidate)? {
                return Ok((hash, Some((pos, candidate))));
            }
        }
        Ok((hash, None))
    }

    /// Insert or replace the value stored under `key`.
    pub fn table_insert(&mut self, table: ObjRef, key: Value, value: Value) -> Result<(), RuntimeError> {
        let (hash, found) = self.table_find(table, key)?;
        let dict = self.table_mut(table)?;
        match found {
            Some((pos, existing)) if dict.set_value(pos, existing, value) => {}
            _ => dict.insert_new(hash, key, value),
        }
        Ok(())
    }

    pub fn table_get(&mut self, table: ObjRef, key: Value) -> Result<Option<Value>, RuntimeError> {
        let (_, found) = self.table_find(table, key)?;
        let dict = self.table(table)?;
        Ok(found.and_then(|(pos, existing)| dict.entry_at(pos, existing).map(|e| e.value)))
    }

    /// Remove `key`; false when it was absent.
    pub fn table_remove(&mut self, table: ObjRef, key: Value) -> Result<bool, RuntimeError> {
        let (_, found) = self.table_find(table, key)?;
        let dict = self.table_mut(table)?;
        Ok(found
            .and_then(|(pos, existing)| dict.remove_at(pos, existing))
            .is_some())
    }

    /// `(key, value)` pairs in table order.
    pub fn table_entries(&self, table: ObjRef) -> Result<Vec<(Value, Value)>, RuntimeError> {
        Ok(self.table(table)?.iter().map(|e| (e.key, e.value)).collect())
    }

    pub fn table_len(&self, table: ObjRef) -> Result<usize, RuntimeError> {
        Ok(self.table(table)?.len())
    }
}
