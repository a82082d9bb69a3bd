//! Global builtin functions and the primitive `print`/`_eq` methods.

use crate::error::RuntimeError;
use crate::object::{Object, ObjectData, Value};
use crate::vm::Vm;

use super::format::{print_primitive_value, print_value};
use super::NativeFunction;

/// Numbers closer than this compare equal through `_eq`.
pub const NUMBER_EPSILON: f64 = 1e-9;

pub const FUNCTIONS: &[NativeFunction] = &[
    NativeFunction::new("print", -1, 0, print),
    NativeFunction::new("println", -1, 0, println),
    NativeFunction::new("type", 1, 1, type_of),
    NativeFunction::new("input", -1, 1, input),
    NativeFunction::new("clock", 0, 1, clock),
];

fn print(vm: &mut Vm, _this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    for arg in args {
        print_value(vm, *arg)?;
    }
    Ok(Value::InternalNull)
}

fn println(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    print(vm, this, args)?;
    vm.write_output("\n")?;
    Ok(Value::InternalNull)
}

/// Name of the argument's class, as a new string.
fn type_of(vm: &mut Vm, _this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let name = vm.class_name(args[0]);
    vm.alloc(Object::string(name))
}

/// Read one line from the input, without its line terminator.
fn input(vm: &mut Vm, _this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [] => {}
        [prompt] => {
            print_value(vm, *prompt)?;
            vm.flush_output()?;
        }
        _ => return Err(RuntimeError::new("Invalid number of arguments for input")),
    }
    let line = vm.read_line()?;
    vm.alloc(Object::string(line))
}

/// Seconds since the VM started.
fn clock(vm: &mut Vm, _this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Number(vm.elapsed().as_secs_f64()))
}

pub(crate) fn print_primitive(vm: &mut Vm, this: Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    print_primitive_value(vm, this)?;
    Ok(Value::InternalNull)
}

/// Builtin `_eq`: values of different classes are never equal.
pub(crate) fn equal_primitive(vm: &mut Vm, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let other = args[0];
    if vm.class_of(this) != vm.class_of(other) {
        return Ok(Value::Bool(false));
    }
    let equal = match (this, other) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => (a - b).abs() < NUMBER_EPSILON,
        (Value::Object(a), Value::Object(b)) => {
            let heap = vm.heap();
            match (heap.get(a).map(|o| &o.data), heap.get(b).map(|o| &o.data)) {
                (Some(ObjectData::Str(x)), Some(ObjectData::Str(y))) => x == y,
                (Some(ObjectData::Callable(_)), Some(ObjectData::Callable(_))) => a == b,
                _ => return Err(RuntimeError::type_error("Unsupported type for _eq")),
            }
        }
        _ => return Err(RuntimeError::type_error("Unsupported type for _eq")),
    };
    Ok(Value::Bool(equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_arity() {
        let find = |name| FUNCTIONS.iter().find(|f| f.name == name).unwrap();
        assert_eq!(find("print").arity_in, -1);
        assert_eq!(find("type").arity_in, 1);
        assert_eq!(find("type").arity_out, 1);
        assert_eq!(find("println").arity_out, 0);
    }
}
