//! Printing values to the VM output.
//!
//! Printing goes through the `print` method of the value's class when it has
//! one, so user classes control their own output and containers print their
//! elements the same way.

use crate::error::RuntimeError;
use crate::object::value::format_number;
use crate::object::{ObjectData, Value};
use crate::vm::Vm;

pub fn print_value(vm: &mut Vm, value: Value) -> Result<(), RuntimeError> {
    if value.is_internal_null() {
        return vm.write_output("NULL");
    }
    if let Some(method) = vm.find_attr(value, "print") {
        vm.call_value(method, value, &[])?;
        return Ok(());
    }
    let callable_kind = value
        .as_object()
        .and_then(|r| vm.heap().get(r))
        .and_then(|o| o.as_callable())
        .map(|c| c.is_method());
    let text = match callable_kind {
        Some(true) => "Method object".to_string(),
        Some(false) => "Function object".to_string(),
        None => format!("{} object", vm.class_name(value)),
    };
    vm.write_output(&text)
}

/// Text of a none, bool, number or string value.
pub fn primitive_text(vm: &Vm, value: Value) -> Option<String> {
    match value {
        Value::None => Some("None".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(format_number(n)),
        Value::Object(r) => match &vm.heap().get(r)?.data {
            ObjectData::Str(s) => Some(s.to_string()),
            _ => None,
        },
        Value::InternalNull => None,
    }
}

pub fn print_primitive_value(vm: &mut Vm, value: Value) -> Result<(), RuntimeError> {
    let text = primitive_text(vm, value)
        .ok_or_else(|| RuntimeError::type_error("Value is not a primitive"))?;
    vm.write_output(&text)
}

/// Print `items` between `open` and `close`, separated by `", "`.
pub fn print_sequence(
    vm: &mut Vm,
    open: &str,
    items: &[Value],
    close: &str,
) -> Result<(), RuntimeError> {
    vm.write_output(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            vm.write_output(", ")?;
        }
        print_value(vm, *item)?;
    }
    vm.write_output(close)
}

pub fn print_entries(vm: &mut Vm, entries: &[(Value, Value)]) -> Result<(), RuntimeError> {
    vm.write_output("d{")?;
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            vm.write_output(", ")?;
        }
        print_value(vm, *key)?;
        vm.write_output(":")?;
        print_value(vm, *value)?;
    }
    vm.write_output("}")
}
