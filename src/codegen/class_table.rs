//! Class layout model for code generation.
//!
//! Rebuilt from the type-checked interchange maps. The attribute and method
//! lists arrive already inherited-first with overrides applied, so a class's
//! method list is its vtable order and an attribute's list index is its slot.
use std::collections::BTreeMap;

use crate::ast::Expr;

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub ty: String,
    pub init: Option<Expr>,
}

/// One vtable slot: the method name, its formal parameter names, the class
/// whose implementation fills the slot, and the body to emit.
#[derive(Debug, Clone)]
pub struct MethodSlot {
    pub name: String,
    pub formals: Vec<String>,
    pub defining_class: String,
    pub body: Expr,
}

#[derive(Debug, Clone, Default)]
pub struct ClassRecord {
    pub parent: Option<String>,
    pub attributes: Vec<Attribute>,
    pub methods: Vec<MethodSlot>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassTable {
    classes: BTreeMap<String, ClassRecord>,
}

impl ClassTable {
    pub fn insert(&mut self, name: String, record: ClassRecord) {
        self.classes.insert(name, record);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// All class names, alphabetically.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(|k| k.as_str())
    }

    /// The 1-based index of the class in the alphabetical name table. This is
    /// the object ID stored in every object header.
    pub fn class_id(&self, name: &str) -> Option<i64> {
        self.classes
            .keys()
            .position(|k| k == name)
            .map(|i| i as i64 + 1)
    }

    /// Heap size of an instance in bytes.
    pub fn object_size(&self, name: &str) -> i64 {
        match name {
            "String" => 40,
            "Int" | "Bool" => 32,
            _ => 24 + 8 * self.attributes(name).len() as i64,
        }
    }

    /// Attributes in slot order. The slot `i` attribute lives at `24 + 8*i`.
    pub fn attributes(&self, name: &str) -> &[Attribute] {
        self.classes
            .get(name)
            .map(|r| r.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Methods in vtable order.
    pub fn methods(&self, name: &str) -> &[MethodSlot] {
        self.classes
            .get(name)
            .map(|r| r.methods.as_slice())
            .unwrap_or(&[])
    }

    /// The slot index of a method within a class's vtable method list.
    pub fn method_index(&self, name: &str, method: &str) -> Option<usize> {
        self.methods(name).iter().position(|m| m.name == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(names: &[&str]) -> ClassTable {
        let mut table = ClassTable::default();
        for name in names {
            table.insert(name.to_string(), ClassRecord::default());
        }
        table
    }

    #[test]
    fn test_class_ids_follow_alphabetical_order() {
        let table = table_with(&["Bool", "IO", "Int", "Main", "Object", "String"]);

        assert_eq!(Some(1), table.class_id("Bool"));
        assert_eq!(Some(2), table.class_id("IO"));
        assert_eq!(Some(3), table.class_id("Int"));
        assert_eq!(Some(4), table.class_id("Main"));
        assert_eq!(Some(5), table.class_id("Object"));
        assert_eq!(Some(6), table.class_id("String"));
        assert_eq!(None, table.class_id("Void"));
    }

    #[test]
    fn test_object_sizes() {
        let mut table = table_with(&["Int", "Bool", "String", "Object"]);
        let mut record = ClassRecord::default();
        record.attributes.push(Attribute {
            name: "x".into(),
            ty: "Int".into(),
            init: None,
        });
        record.attributes.push(Attribute {
            name: "y".into(),
            ty: "Int".into(),
            init: None,
        });
        table.insert("A".into(), record);

        assert_eq!(32, table.object_size("Int"));
        assert_eq!(32, table.object_size("Bool"));
        assert_eq!(40, table.object_size("String"));
        assert_eq!(24, table.object_size("Object"));
        assert_eq!(40, table.object_size("A"));
    }
}
