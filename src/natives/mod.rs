//! Host functions: the builtin class methods, the global builtins and the
//! native extension sets that can be merged into the global namespace.

pub mod builtins;
pub mod containers;
pub mod extension;
pub mod format;

use log::debug;

use crate::error::RuntimeError;
use crate::object::class::{
    BOOL_CLASS, CALLABLE_CLASS, DICT_CLASS, LIST_CLASS, NONE_CLASS, NUM_CLASS, SET_CLASS,
    STR_CLASS,
};
use crate::object::{Arity, Callable, CallableKind, ClassId, ClassTable, Heap, NativeFn, Object, ObjRef, Value};

pub use extension::{extension, Extension, EXTENSIONS};

/// A host function record: name, input arity (`-1` for variadic), output
/// arity (0 or 1) and entry point.
#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity_in: i32,
    pub arity_out: u8,
    pub func: NativeFn,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity_in", &self.arity_in)
            .field("arity_out", &self.arity_out)
            .finish()
    }
}

impl NativeFunction {
    pub const fn new(name: &'static str, arity_in: i32, arity_out: u8, func: NativeFn) -> Self {
        Self {
            name,
            arity_in,
            arity_out,
            func,
        }
    }

    pub fn to_callable(&self) -> Callable {
        Callable::native(
            self.name,
            Arity::from_count(self.arity_in),
            self.arity_out != 0,
            CallableKind::Function,
            self.func,
        )
    }
}

/// Global builtins plus the functions of extension `ext`.
pub fn global_functions(ext: Option<&Extension>) -> Vec<NativeFunction> {
    let mut functions = builtins::FUNCTIONS.to_vec();
    if let Some(ext) = ext {
        functions.extend_from_slice(ext.functions);
    }
    functions
}

fn method(heap: &mut Heap, name: &str, arity: i32, returns: bool, func: NativeFn) -> Value {
    let callable = Callable::native(name, Arity::from_count(arity), returns, CallableKind::Method, func);
    Value::Object(heap.alloc_const(Object::callable(callable)))
}

fn add_methods(
    classes: &mut ClassTable,
    heap: &mut Heap,
    class: ClassId,
    methods: &[(&str, i32, bool, NativeFn)],
) {
    let values: Vec<(&str, Value)> = methods
        .iter()
        .map(|&(name, arity, returns, func)| (name, method(heap, name, arity, returns, func)))
        .collect();
    if let Some(class) = classes.get_mut(class) {
        for (name, value) in values {
            class.attrs.insert(name.into(), value);
        }
    }
}

fn set_init(classes: &mut ClassTable, heap: &mut Heap, class: ClassId, func: NativeFn) {
    let init = method(heap, "init", -1, false, func);
    if let Some(class) = classes.get_mut(class) {
        class.init = Some(init);
    }
}

/// Give the builtin classes their methods and initializers. The callables
/// are const objects in `heap`.
pub fn install_builtin_classes(classes: &mut ClassTable, heap: &mut Heap) {
    use builtins::{equal_primitive, print_primitive};
    use containers as c;

    add_methods(
        classes,
        heap,
        NONE_CLASS,
        &[("print", 0, false, print_primitive), ("_eq", 1, true, equal_primitive)],
    );
    for class in [BOOL_CLASS, NUM_CLASS, STR_CLASS] {
        add_methods(
            classes,
            heap,
            class,
            &[("print", 0, false, print_primitive), ("_eq", 1, true, equal_primitive)],
        );
    }
    add_methods(classes, heap, CALLABLE_CLASS, &[("_eq", 1, true, equal_primitive)]);

    set_init(classes, heap, LIST_CLASS, c::list_init);
    add_methods(
        classes,
        heap,
        LIST_CLASS,
        &[
            ("print", 0, false, c::list_print),
            ("add", 1, false, c::list_add),
            ("insert", 2, false, c::list_insert),
            ("set", 2, false, c::list_set),
            ("remove", 1, false, c::list_remove),
            ("get", 1, true, c::list_get),
            ("contains", 1, true, c::list_contains),
            ("index", 1, true, c::list_index),
            ("size", 0, true, c::list_size),
        ],
    );

    set_init(classes, heap, DICT_CLASS, c::dict_init);
    add_methods(
        classes,
        heap,
        DICT_CLASS,
        &[
            ("print", 0, false, c::dict_print),
            ("add", 2, false, c::dict_add),
            ("set", 2, false, c::dict_add),
            ("get", 1, true, c::dict_get),
            ("contains", 1, true, c::dict_contains),
            ("remove", 1, false, c::dict_remove),
            ("size", 0, true, c::dict_size),
        ],
    );

    set_init(classes, heap, SET_CLASS, c::set_init);
    add_methods(
        classes,
        heap,
        SET_CLASS,
        &[
            ("print", 0, false, c::set_print),
            ("add", 1, false, c::set_add),
            ("contains", 1, true, c::set_contains),
            ("remove", 1, false, c::set_remove),
            ("size", 0, true, c::set_size),
        ],
    );
    debug!("installed builtin classes ({} const objects)", heap.const_count());
}

// ===== Argument helpers shared by the natives =====

pub(crate) fn number_arg(value: Value) -> Result<f64, RuntimeError> {
    value
        .as_number()
        .ok_or_else(|| RuntimeError::type_error("Value is not of type num"))
}

pub(crate) fn self_object(this: Value) -> Result<ObjRef, RuntimeError> {
    this.as_object()
        .ok_or_else(|| RuntimeError::type_error("Method called without an object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_classes_get_their_methods() {
        let mut classes = ClassTable::with_builtins();
        let mut heap = Heap::default();
        install_builtin_classes(&mut classes, &mut heap);

        assert!(classes.find_attr(LIST_CLASS, "add").is_some());
        assert!(classes.find_attr(DICT_CLASS, "contains").is_some());
        assert!(classes.find_attr(NUM_CLASS, "_eq").is_some());
        assert!(classes.find_attr(NUM_CLASS, "add").is_none());
        assert!(classes.get(SET_CLASS).and_then(|c| c.init).is_some());
        assert!(classes.get(STR_CLASS).and_then(|c| c.init).is_none());
    }

    #[test]
    fn test_global_functions_include_extension() {
        let plain: Vec<&str> = global_functions(None).iter().map(|f| f.name).collect();
        assert!(plain.contains(&"println"));
        assert!(!plain.contains(&"C_CalculatePi"));

        let with_ext = global_functions(extension("default"));
        assert_eq!(with_ext.len(), plain.len() + 1);
    }
}
