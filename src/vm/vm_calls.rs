//! Call dispatch: compiled frames, native calls and reentrant calls from host code.
//!
//! A call's arguments are the top `argc` stack values. Bound calls have the
//! receiver directly below them; compiled methods use that slot as local 0.
//! Native functions see their arguments while they stay on the stack, so
//! everything they were given remains rooted for the collector.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::object::{Arity, Callable, CallableBody, Value};

use super::vm::{CallFrame, Vm};

/// Nesting limit for calls made from host code (operators, printing,
/// container methods) while another call is running.
pub const MAX_HOST_REENTRY: usize = 200;

impl Vm {
    /// The callable record behind `value`.
    pub(crate) fn callable_of(&self, value: Value) -> Result<Rc<Callable>, RuntimeError> {
        self.program
            .callable(value)
            .cloned()
            .ok_or(RuntimeError::NotCallable)
    }

    /// Start a call. Native callables complete immediately; compiled ones
    /// push a frame that the dispatch loop runs. When the call finishes, the
    /// stack is cut back to `floor` and the result is pushed if `keep_result`
    /// is set and the callable produces one. `enforce` rejects callables
    /// without a result.
    pub(crate) fn begin_call(
        &mut self,
        callee: Value,
        argc: usize,
        bound: bool,
        floor: usize,
        enforce: bool,
        keep_result: bool,
    ) -> Result<(), RuntimeError> {
        let callable = self.callable_of(callee)?;
        if enforce && !callable.returns {
            return Err(RuntimeError::NoOutput);
        }
        if !callable.arity.accepts(argc) {
            let expected = match callable.arity {
                Arity::Fixed(n) => n as usize,
                Arity::Variadic => argc,
            };
            return Err(RuntimeError::wrong_arity(expected, argc));
        }
        if callable.is_method() && !bound {
            return Err(RuntimeError::type_error(format!(
                "Method '{}' called without an object",
                callable.name
            )));
        }

        let args_start = self
            .stack
            .len()
            .checked_sub(argc)
            .ok_or_else(|| RuntimeError::new("Stack underflow"))?;

        match callable.body {
            CallableBody::Native(func) => {
                let this = if callable.is_method() {
                    self.peek(argc)?
                } else {
                    Value::InternalNull
                };
                let args = self.stack[args_start..].to_vec();
                let result = func(self, this, &args)?;
                if callable.returns && result.is_internal_null() {
                    return Err(RuntimeError::NoReturnValue);
                }
                self.stack.truncate(floor);
                if keep_result && callable.returns {
                    self.push(result)?;
                }
            }
            CallableBody::Chunk(id) => {
                if self.frames.len() >= self.config.frame_limit {
                    return Err(RuntimeError::stack_overflow("call depth limit exceeded"));
                }
                let chunk = self
                    .program
                    .chunk(id)
                    .ok_or_else(|| RuntimeError::new("Chunk index out of range"))?;
                let base = if callable.is_method() { args_start - 1 } else { args_start };
                let needed = base + chunk.locals_count as usize;
                if needed > self.config.stack_limit {
                    return Err(RuntimeError::stack_overflow("value stack limit exceeded"));
                }
                let name = chunk.name.clone();
                if self.stack.len() < needed {
                    self.stack.resize(needed, Value::InternalNull);
                }
                self.frames.push(CallFrame {
                    chunk: id,
                    ip: 0,
                    base,
                    floor,
                    returns: callable.returns,
                    keep_result,
                    name,
                });
            }
        }
        Ok(())
    }

    /// Call `callee` from host code and run it to completion.
    ///
    /// `this` is the receiver, or `Value::InternalNull` for a plain function
    /// call. Returns `Value::InternalNull` when the callable produces nothing.
    pub fn call_value(&mut self, callee: Value, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        if self.reentry >= MAX_HOST_REENTRY {
            return Err(RuntimeError::stack_overflow("host call nesting limit exceeded"));
        }
        self.reentry += 1;
        let result = self.run_nested(callee, this, args);
        self.reentry -= 1;
        result
    }

    fn run_nested(&mut self, callee: Value, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let floor = self.stack.len();
        let depth = self.frames.len();
        let bound = !this.is_internal_null();
        if bound {
            self.push(this)?;
        }
        for arg in args {
            self.push(*arg)?;
        }
        self.begin_call(callee, args.len(), bound, floor, false, true)?;
        self.run(depth)?;
        if self.stack.len() > floor {
            let result = self.pop()?;
            self.stack.truncate(floor);
            Ok(result)
        } else {
            Ok(Value::InternalNull)
        }
    }

    /// Like [`call_value`](Self::call_value), for callables whose result is required.
    pub(crate) fn call_for_value(
        &mut self,
        callee: Value,
        this: Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let result = self.call_value(callee, this, args)?;
        if result.is_internal_null() {
            return Err(RuntimeError::NoOutput);
        }
        Ok(result)
    }
}
