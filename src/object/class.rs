//! Class metadata and the global class table.

use std::rc::Rc;

use indexmap::IndexMap;

use super::value::Value;

/// Dense class index; also the index into [`ClassTable`].
pub type ClassId = u16;

pub const INTERNAL_NULL_CLASS: ClassId = 0;
pub const NONE_CLASS: ClassId = 1;
pub const BOOL_CLASS: ClassId = 2;
pub const NUM_CLASS: ClassId = 3;
pub const CALLABLE_CLASS: ClassId = 4;
pub const STR_CLASS: ClassId = 5;
pub const LIST_CLASS: ClassId = 6;
pub const DICT_CLASS: ClassId = 7;
pub const SET_CLASS: ClassId = 8;
/// First id handed to a user-defined class.
pub const FIRST_USER_CLASS: ClassId = 9;

/// Names of the builtin classes, indexed by id.
pub const BUILTIN_CLASS_NAMES: [&str; FIRST_USER_CLASS as usize] = [
    "internal null",
    "none",
    "bool",
    "num",
    "callable",
    "str",
    "list",
    "dict",
    "set",
];

pub type AttrMap = IndexMap<Rc<str>, Value, ahash::RandomState>;

#[derive(Debug, Clone)]
pub struct Class {
    pub id: ClassId,
    pub name: Rc<str>,
    pub parent: Option<ClassId>,
    /// Initializer callable; classes without one cannot be instantiated.
    pub init: Option<Value>,
    /// Methods and other class-level attributes.
    pub attrs: AttrMap,
}

impl Class {
    pub fn new(id: ClassId, name: impl Into<Rc<str>>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            init: None,
            attrs: AttrMap::default(),
        }
    }

    /// Builtin classes forbid attribute assignment on their instances.
    pub fn is_builtin(&self) -> bool {
        self.id < FIRST_USER_CLASS
    }
}

/// All classes of a program, indexed by [`ClassId`].
#[derive(Debug, Clone)]
pub struct ClassTable {
    classes: Vec<Class>,
}

impl ClassTable {
    /// A table holding the builtin classes, without methods.
    pub fn with_builtins() -> Self {
        let classes = BUILTIN_CLASS_NAMES
            .iter()
            .enumerate()
            .map(|(id, name)| Class::new(id as ClassId, *name))
            .collect();
        Self { classes }
    }

    pub fn get(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id as usize)
    }

    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut Class> {
        self.classes.get_mut(id as usize)
    }

    /// Install `class` at its id, growing the table with placeholders as needed.
    pub fn insert(&mut self, class: Class) {
        let idx = class.id as usize;
        while self.classes.len() <= idx {
            let id = self.classes.len() as ClassId;
            self.classes.push(Class::new(id, ""));
        }
        self.classes[idx] = class;
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// Look `name` up on `class` and then each ancestor in order.
    pub fn find_attr(&self, class: ClassId, name: &str) -> Option<Value> {
        let mut current = Some(class);
        while let Some(id) = current {
            let class = self.get(id)?;
            if let Some(value) = class.attrs.get(name) {
                return Some(*value);
            }
            current = class.parent;
        }
        None
    }

    pub fn name_of(&self, id: ClassId) -> &str {
        self.get(id).map(|c| c.name.as_ref()).unwrap_or("<unknown>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ids_match_names() {
        let table = ClassTable::with_builtins();
        assert_eq!(table.name_of(LIST_CLASS), "list");
        assert_eq!(table.name_of(STR_CLASS), "str");
        assert_eq!(table.len(), FIRST_USER_CLASS as usize);
    }

    #[test]
    fn test_find_attr_walks_parent_chain() {
        let mut table = ClassTable::with_builtins();
        let mut base = Class::new(9, "Base");
        base.attrs.insert("speak".into(), Value::Number(1.0));
        base.attrs.insert("name".into(), Value::Number(2.0));
        let mut mid = Class::new(10, "Mid");
        mid.parent = Some(9);
        mid.attrs.insert("speak".into(), Value::Number(3.0));
        let mut leaf = Class::new(11, "Leaf");
        leaf.parent = Some(10);
        table.insert(base);
        table.insert(mid);
        table.insert(leaf);

        assert_eq!(table.find_attr(11, "speak"), Some(Value::Number(3.0)));
        assert_eq!(table.find_attr(11, "name"), Some(Value::Number(2.0)));
        assert_eq!(table.find_attr(11, "missing"), None);
    }
}
