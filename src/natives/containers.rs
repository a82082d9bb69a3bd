//! Methods of the builtin `list`, `dict` and `set` classes.

use crate::error::RuntimeError;
use crate::object::Value;
use crate::vm::Vm;

use super::format::{print_entries, print_sequence};
use super::{number_arg, self_object};

/// A list position from a number: integral and within `0..length`.
fn list_position(index: f64, length: usize) -> Result<usize, RuntimeError> {
    if index.fract() != 0.0 || index < 0.0 || index >= length as f64 {
        return Err(RuntimeError::IndexOutOfRange { index, length });
    }
    Ok(index as usize)
}

// ===== list =====

pub(crate) fn list_init(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let list = vm.list_mut(self_object(this)?)?;
    list.clear();
    list.extend_from_slice(args);
    Ok(Value::InternalNull)
}

pub(crate) fn list_print(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let items = vm.list_items(self_object(this)?)?;
    print_sequence(vm, "[", &items, "]")?;
    Ok(Value::InternalNull)
}

pub(crate) fn list_add(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    vm.list_mut(self_object(this)?)?.push(args[0]);
    Ok(Value::InternalNull)
}

/// `insert(i, v)`: `i` may equal the length to append.
pub(crate) fn list_insert(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = number_arg(args[0])?;
    let list = vm.list_mut(self_object(this)?)?;
    let at = list_position(index, list.len() + 1)?;
    list.insert(at, args[1]);
    Ok(Value::InternalNull)
}

pub(crate) fn list_set(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = number_arg(args[0])?;
    let list = vm.list_mut(self_object(this)?)?;
    let at = list_position(index, list.len())?;
    list[at] = args[1];
    Ok(Value::InternalNull)
}

pub(crate) fn list_remove(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = number_arg(args[0])?;
    let list = vm.list_mut(self_object(this)?)?;
    let at = list_position(index, list.len())?;
    list.remove(at);
    Ok(Value::InternalNull)
}

pub(crate) fn list_get(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let index = number_arg(args[0])?;
    let list = vm.list_mut(self_object(this)?)?;
    let at = list_position(index, list.len())?;
    Ok(list[at])
}

fn list_find(vm: &mut Vm, this: Value, needle: Value) -> Result<Option<usize>, RuntimeError> {
    let items = vm.list_items(self_object(this)?)?;
    for (i, item) in items.into_iter().enumerate() {
        if vm.values_equal(item, needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

pub(crate) fn list_contains(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(list_find(vm, this, args[0])?.is_some()))
}

pub(crate) fn list_index(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match list_find(vm, this, args[0])? {
        Some(i) => Ok(Value::Number(i as f64)),
        None => Err(RuntimeError::ElementNotFound),
    }
}

pub(crate) fn list_size(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let len = vm.list_mut(self_object(this)?)?.len();
    Ok(Value::Number(len as f64))
}

// ===== dict =====

pub(crate) fn dict_init(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() % 2 != 0 {
        return Err(RuntimeError::new("Dict init must have even number of arguments"));
    }
    let dict = self_object(this)?;
    for pair in args.chunks(2) {
        vm.table_insert(dict, pair[0], pair[1])?;
    }
    Ok(Value::InternalNull)
}

pub(crate) fn dict_print(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let entries = vm.table_entries(self_object(this)?)?;
    print_entries(vm, &entries)?;
    Ok(Value::InternalNull)
}

pub(crate) fn dict_add(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    vm.table_insert(self_object(this)?, args[0], args[1])?;
    Ok(Value::InternalNull)
}

pub(crate) fn dict_get(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    vm.table_get(self_object(this)?, args[0])?
        .ok_or(RuntimeError::KeyNotFound)
}

pub(crate) fn dict_contains(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let found = vm.table_get(self_object(this)?, args[0])?.is_some();
    Ok(Value::Bool(found))
}

pub(crate) fn dict_remove(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    if !vm.table_remove(self_object(this)?, args[0])? {
        return Err(RuntimeError::KeyNotFound);
    }
    Ok(Value::InternalNull)
}

pub(crate) fn dict_size(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let len = vm.table_len(self_object(this)?)?;
    Ok(Value::Number(len as f64))
}

// ===== set =====

pub(crate) fn set_init(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let set = self_object(this)?;
    for item in args {
        vm.table_insert(set, *item, Value::None)?;
    }
    Ok(Value::InternalNull)
}

pub(crate) fn set_print(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let keys: Vec<Value> = vm
        .table_entries(self_object(this)?)?
        .into_iter()
        .map(|(key, _)| key)
        .collect();
    print_sequence(vm, "s{", &keys, "}")?;
    Ok(Value::InternalNull)
}

pub(crate) fn set_add(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    vm.table_insert(self_object(this)?, args[0], Value::None)?;
    Ok(Value::InternalNull)
}

pub(crate) fn set_contains(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let found = vm.table_get(self_object(this)?, args[0])?.is_some();
    Ok(Value::Bool(found))
}

pub(crate) fn set_remove(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    if !vm.table_remove(self_object(this)?, args[0])? {
        return Err(RuntimeError::KeyNotFound);
    }
    Ok(Value::InternalNull)
}

pub(crate) fn set_size(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    let len = vm.table_len(self_object(this)?)?;
    Ok(Value::Number(len as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_list_positions() {
        assert_eq!(list_position(0.0, 2).unwrap(), 0);
        assert_eq!(list_position(1.0, 2).unwrap(), 1);
        assert_eq!(
            list_position(2.0, 2).unwrap_err(),
            RuntimeError::IndexOutOfRange { index: 2.0, length: 2 }
        );
        assert!(list_position(0.5, 2).is_err());
        assert!(list_position(-1.0, 2).is_err());
    }
}
