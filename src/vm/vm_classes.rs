//! Class operations for the VM: attribute access and operator dispatch.

use crate::error::RuntimeError;
use crate::object::class::INTERNAL_NULL_CLASS;
use crate::object::{ClassId, ObjectData, Value};

use super::opcode::{AssignMod, BinaryOp};
use super::vm::Vm;

impl Vm {
    pub fn class_of(&self, value: Value) -> ClassId {
        match value {
            Value::Object(r) => self
                .program
                .heap
                .get(r)
                .map_or(INTERNAL_NULL_CLASS, |o| o.class),
            other => other.primitive_class().unwrap_or(INTERNAL_NULL_CLASS),
        }
    }

    pub fn class_name(&self, value: Value) -> String {
        self.program.classes.name_of(self.class_of(value)).to_string()
    }

    /// Look `name` up on the value itself, then on its class chain.
    pub fn find_attr(&self, value: Value, name: &str) -> Option<Value> {
        if value.is_internal_null() {
            return None;
        }
        if let Some(ObjectData::Instance(attrs)) = value
            .as_object()
            .and_then(|r| self.program.heap.get(r))
            .map(|o| &o.data)
        {
            if let Some(found) = attrs.get(name) {
                return Some(*found);
            }
        }
        self.program.classes.find_attr(self.class_of(value), name)
    }

    pub fn get_attr(&self, value: Value, name: &str) -> Result<Value, RuntimeError> {
        if value.is_internal_null() {
            return Err(RuntimeError::type_error("Null object called on get attr"));
        }
        self.find_attr(value, name)
            .ok_or_else(|| RuntimeError::attribute_not_found(name))
    }

    /// Assign an attribute on a user-class instance.
    pub fn set_attr(
        &mut self,
        target: Value,
        name: &str,
        modifier: AssignMod,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let builtin = self
            .program
            .classes
            .get(self.class_of(target))
            .map_or(true, |c| c.is_builtin());
        if builtin {
            return Err(RuntimeError::type_error(
                "Unable to set attribute on system defined type",
            ));
        }

        let value = if modifier == AssignMod::None {
            value
        } else {
            let current = self.get_attr(target, name)?;
            self.modify(modifier, current, value)?
        };

        match target
            .as_object()
            .and_then(|r| self.program.heap.get_mut(r))
            .map(|o| &mut o.data)
        {
            Some(ObjectData::Instance(attrs)) => {
                attrs.insert(name.into(), value);
                Ok(())
            }
            _ => Err(RuntimeError::type_error("Object has no attribute table")),
        }
    }

    // ===== Operators =====

    /// Apply a binary operator: arithmetic on two numbers, magic methods otherwise.
    pub fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
        if let (Value::Number(a), Value::Number(b)) = (left, right) {
            return Ok(op.apply_numbers(a, b));
        }
        self.dispatch_binary(op, left, right)
    }

    /// Call the left operand's magic method, or else the mirrored method of the
    /// right operand with the operands swapped.
    pub(crate) fn dispatch_binary(
        &mut self,
        op: BinaryOp,
        left: Value,
        right: Value,
    ) -> Result<Value, RuntimeError> {
        let (method, mirror) = op.magic_methods();
        if let Some(func) = self.find_attr(left, method) {
            return self.call_for_value(func, left, &[right]);
        }
        if let Some(mirror) = mirror {
            if let Some(func) = self.find_attr(right, mirror) {
                return self.call_for_value(func, right, &[left]);
            }
        }
        Err(RuntimeError::no_operator(method))
    }

    pub(crate) fn unary(&mut self, value: Value, method: &str) -> Result<Value, RuntimeError> {
        let func = self
            .find_attr(value, method)
            .ok_or_else(|| RuntimeError::no_operator(method))?;
        self.call_for_value(func, value, &[])
    }

    /// The value a compound assignment stores.
    pub(crate) fn modify(
        &mut self,
        modifier: AssignMod,
        current: Value,
        value: Value,
    ) -> Result<Value, RuntimeError> {
        match modifier.binary() {
            None => Ok(value),
            Some(op) => self.binary(op, current, value),
        }
    }

    /// Equality through `_eq`, as used by container lookups.
    pub fn values_equal(&mut self, a: Value, b: Value) -> Result<bool, RuntimeError> {
        self.dispatch_binary(BinaryOp::Equal, a, b)?
            .as_bool()
            .ok_or_else(|| RuntimeError::type_error("Result of _eq is not a boolean"))
    }

    // ===== Indexing =====

    /// `target[index]`: calls `target.get(index)`.
    pub(crate) fn get_index(&mut self, target: Value, index: Value) -> Result<Value, RuntimeError> {
        if index.as_number().is_none() {
            return Err(RuntimeError::type_error("Index is not a num"));
        }
        let get = self.get_attr(target, "get")?;
        self.call_for_value(get, target, &[index])
    }

    /// `target[index] = value`: calls `target.set(index, value)`.
    pub(crate) fn set_index(
        &mut self,
        target: Value,
        index: Value,
        modifier: AssignMod,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let value = if modifier == AssignMod::None {
            if index.as_number().is_none() {
                return Err(RuntimeError::type_error("Index is not a num"));
            }
            value
        } else {
            let current = self.get_index(target, index)?;
            self.modify(modifier, current, value)?
        };
        let set = self.get_attr(target, "set")?;
        self.call_value(set, target, &[index, value])?;
        Ok(())
    }
}
