//! Native extension sets, selected by name on the command line.
//!
//! Each set is a static table of [`NativeFunction`] records merged into the
//! global namespace before compilation.

use crate::error::RuntimeError;
use crate::object::Value;
use crate::vm::Vm;

use super::{number_arg, NativeFunction};

#[derive(Debug, Clone, Copy)]
pub struct Extension {
    pub name: &'static str,
    pub functions: &'static [NativeFunction],
}

pub const EXTENSIONS: &[Extension] = &[
    Extension {
        name: "default",
        functions: &[NativeFunction::new("C_CalculatePi", 1, 1, calculate_pi)],
    },
    Extension {
        name: "none",
        functions: &[],
    },
];

pub fn extension(name: &str) -> Option<&'static Extension> {
    EXTENSIONS.iter().find(|e| e.name == name)
}

/// Leibniz series for pi with `args[0]` terms.
fn calculate_pi(_vm: &mut Vm, _this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
    let rounds = number_arg(args[0])?.max(0.0) as u64 + 2;
    let mut pi = 1.0;
    for i in 2..rounds {
        let sign = if i % 2 == 1 { 1.0 } else { -1.0 };
        pi += sign / (2 * i - 1) as f64;
    }
    Ok(Value::Number(pi * 4.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert!(extension("default").is_some());
        assert_eq!(extension("none").map(|e| e.functions.len()), Some(0));
        assert!(extension("missing").is_none());
    }
}
