//! The canonical model of the class hierarchy.
//!
//! Built once from the program AST and frozen before type checking starts.
//! Records hold declared feature *signatures* (bodies stay in the program
//! AST); inherited-first views are computed on demand, with method overrides
//! replacing the inherited entry in position so vtable indices are stable.
use std::collections::BTreeMap;

use super::error::TypeError;
use crate::ast::{Class, Feature, Formal, Identifier, Program};

pub const OBJECT: &str = "Object";
pub const SELF_TYPE: &str = "SELF_TYPE";

/// A declared attribute signature.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: Identifier,
    pub ty: Identifier,
    pub has_init: bool,
    pub defining_class: String,
}

/// A declared method signature. `internal` names the built-in body marker
/// for the predefined classes.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: Identifier,
    pub formals: Vec<Formal>,
    pub return_ty: Identifier,
    pub defining_class: String,
    pub internal: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassRecord {
    pub parent: Option<String>,
    pub parent_line: usize,
    pub line: usize,
    pub attributes: Vec<Attribute>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone)]
pub struct ClassTable {
    classes: BTreeMap<String, ClassRecord>,
}

impl ClassTable {
    /// Build the table from a program: seed the built-ins, insert the user
    /// classes, then validate the hierarchy and the feature rules. Fails on
    /// the first violation.
    pub fn build(program: &Program) -> Result<ClassTable, TypeError> {
        let mut table = ClassTable::with_builtins();

        for class in &program.classes {
            table.insert_class(class)?;
        }

        table.check_cycles()?;
        table.check_parents_exist()?;
        table.check_main()?;
        table.check_features(program)?;

        Ok(table)
    }

    fn with_builtins() -> ClassTable {
        let mut classes = BTreeMap::new();

        classes.insert(
            OBJECT.to_string(),
            ClassRecord {
                parent: None,
                methods: vec![
                    builtin_method(OBJECT, "abort", &[], OBJECT),
                    builtin_method(OBJECT, "copy", &[], SELF_TYPE),
                    builtin_method(OBJECT, "type_name", &[], "String"),
                ],
                ..ClassRecord::default()
            },
        );
        classes.insert(
            "Bool".to_string(),
            ClassRecord {
                parent: Some(OBJECT.to_string()),
                ..ClassRecord::default()
            },
        );
        classes.insert(
            "Int".to_string(),
            ClassRecord {
                parent: Some(OBJECT.to_string()),
                ..ClassRecord::default()
            },
        );
        classes.insert(
            "IO".to_string(),
            ClassRecord {
                parent: Some(OBJECT.to_string()),
                methods: vec![
                    builtin_method("IO", "in_int", &[], "Int"),
                    builtin_method("IO", "in_string", &[], "String"),
                    builtin_method("IO", "out_int", &[("x", "Int")], SELF_TYPE),
                    builtin_method("IO", "out_string", &[("x", "String")], SELF_TYPE),
                ],
                ..ClassRecord::default()
            },
        );
        classes.insert(
            "String".to_string(),
            ClassRecord {
                parent: Some(OBJECT.to_string()),
                methods: vec![
                    builtin_method("String", "concat", &[("s", "String")], "String"),
                    builtin_method("String", "length", &[], "Int"),
                    builtin_method("String", "substr", &[("i", "Int"), ("l", "Int")], "String"),
                ],
                ..ClassRecord::default()
            },
        );

        ClassTable { classes }
    }

    fn insert_class(&mut self, class: &Class) -> Result<(), TypeError> {
        let name = &class.name.name;
        let line = class.name.line;

        if name == SELF_TYPE {
            return Err(TypeError::new(line, "class named SELF_TYPE"));
        }
        if self.classes.contains_key(name) {
            return Err(TypeError::new(line, format!("class {name} redefined")));
        }

        let (parent, parent_line) = match &class.parent {
            Some(parent) => (parent.name.clone(), parent.line),
            None => (OBJECT.to_string(), line),
        };
        if matches!(parent.as_str(), "Int" | "String" | "Bool") {
            return Err(TypeError::new(
                line,
                format!("class {name} inherits from primitive type {parent}"),
            ));
        }
        if parent == SELF_TYPE {
            return Err(TypeError::new(line, format!("class {name} inherits from SELF_TYPE")));
        }

        let mut record = ClassRecord {
            parent: Some(parent),
            parent_line,
            line,
            ..ClassRecord::default()
        };

        for feature in &class.features {
            match feature {
                Feature::Attribute { name: attr, ty, init } => {
                    if attr.name == "self" {
                        return Err(TypeError::new(attr.line, "an attribute cannot be named self"));
                    }
                    if record.attributes.iter().any(|a| a.name.name == attr.name) {
                        return Err(TypeError::new(
                            attr.line,
                            format!("class {name} redefines attribute {}", attr.name),
                        ));
                    }
                    record.attributes.push(Attribute {
                        name: attr.clone(),
                        ty: ty.clone(),
                        has_init: init.is_some(),
                        defining_class: name.clone(),
                    });
                }
                Feature::Method { name: method, formals, return_ty, .. } => {
                    if record.methods.iter().any(|m| m.name.name == method.name) {
                        return Err(TypeError::new(
                            method.line,
                            format!("class {name} redefines method {}", method.name),
                        ));
                    }
                    record.methods.push(Method {
                        name: method.clone(),
                        formals: formals.clone(),
                        return_ty: return_ty.clone(),
                        defining_class: name.clone(),
                        internal: None,
                    });
                }
            }
        }

        self.classes.insert(name.clone(), record);
        Ok(())
    }

    fn check_cycles(&self) -> Result<(), TypeError> {
        for start in self.classes.keys() {
            let mut visited = vec![];
            let mut current = start.as_str();

            loop {
                if visited.contains(&current) {
                    let previous = visited.last().unwrap();
                    return Err(TypeError::new(
                        0,
                        format!("inheritance cycle: {previous} {current}"),
                    ));
                }
                visited.push(current);

                match self.parent(current) {
                    Some(parent) if self.classes.contains_key(parent) => current = parent,
                    _ => break,
                }
            }
        }
        Ok(())
    }

    fn check_parents_exist(&self) -> Result<(), TypeError> {
        for (name, record) in &self.classes {
            if let Some(parent) = &record.parent {
                if !self.classes.contains_key(parent) {
                    return Err(TypeError::new(
                        record.parent_line,
                        format!("parent {parent} of class {name} is not defined"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_main(&self) -> Result<(), TypeError> {
        if !self.classes.contains_key("Main") {
            return Err(TypeError::new(0, "class Main not found"));
        }
        let has_main = self
            .all_methods("Main")
            .iter()
            .any(|m| m.name.name == "main" && m.formals.is_empty());
        if !has_main {
            return Err(TypeError::new(
                0,
                "method main with no parameters not found in class Main",
            ));
        }
        Ok(())
    }

    /// Inheritance-sensitive feature rules: no attribute redeclaration
    /// anywhere on the chain, attribute types must exist, and overrides must
    /// preserve the full signature.
    fn check_features(&self, program: &Program) -> Result<(), TypeError> {
        for class in &program.classes {
            let name = &class.name.name;
            let parent = self.parent(name);

            for attribute in &self.classes[name].attributes {
                if !self.is_type(&attribute.ty.name) {
                    return Err(TypeError::new(
                        attribute.ty.line,
                        format!(
                            "class {name} has attribute {} of undefined type {}",
                            attribute.name.name, attribute.ty.name
                        ),
                    ));
                }
                if let Some(parent) = parent {
                    if self.find_attribute(parent, &attribute.name.name).is_some() {
                        return Err(TypeError::new(
                            attribute.name.line,
                            format!("class {name} redefines attribute {}", attribute.name.name),
                        ));
                    }
                }
            }

            for method in &self.classes[name].methods {
                let Some(inherited) = parent.and_then(|p| self.find_method(p, &method.name.name))
                else {
                    continue;
                };

                let formals_match = inherited.formals.len() == method.formals.len()
                    && inherited
                        .formals
                        .iter()
                        .zip(&method.formals)
                        .all(|(a, b)| a.name.name == b.name.name && a.ty.name == b.ty.name);
                if !formals_match {
                    return Err(TypeError::new(
                        method.name.line,
                        format!("overriding method {} has different formals", method.name.name),
                    ));
                }
                if inherited.return_ty.name != method.return_ty.name {
                    return Err(TypeError::new(
                        method.return_ty.line,
                        format!(
                            "overriding method {} has different return types",
                            method.name.name
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Whether `name` is usable as a declared type.
    pub fn is_type(&self, name: &str) -> bool {
        name == SELF_TYPE || self.contains(name)
    }

    pub fn parent(&self, name: &str) -> Option<&str> {
        self.classes.get(name)?.parent.as_deref()
    }

    /// All class names, alphabetically.
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(|k| k.as_str())
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// The chain from `name` up to `Object`, inclusive.
    pub fn ancestors<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let mut chain = vec![];
        let mut current = Some(name);
        while let Some(c) = current {
            chain.push(c);
            current = self.parent(c);
        }
        chain
    }

    /// `source` conforms to `dest` iff `dest` appears on `source`'s chain.
    pub fn conforms(&self, source: &str, dest: &str) -> bool {
        self.ancestors(source).contains(&dest)
    }

    /// The deepest class on both ancestor chains; `Object` as fallback.
    pub fn lub<'a>(&'a self, a: &'a str, b: &'a str) -> &'a str {
        let chain_b = self.ancestors(b);
        self.ancestors(a)
            .into_iter()
            .find(|candidate| chain_b.contains(candidate))
            .unwrap_or(OBJECT)
    }

    /// Attributes in object-layout order: inherited first, then declared.
    pub fn all_attributes(&self, name: &str) -> Vec<&Attribute> {
        let Some(record) = self.classes.get(name) else {
            return vec![];
        };
        let mut list = match &record.parent {
            Some(parent) => self.all_attributes(parent),
            None => vec![],
        };
        list.extend(record.attributes.iter());
        list
    }

    /// Methods in vtable order: inherited first, overrides replacing the
    /// inherited entry in position.
    pub fn all_methods(&self, name: &str) -> Vec<&Method> {
        let Some(record) = self.classes.get(name) else {
            return vec![];
        };
        let mut list = match &record.parent {
            Some(parent) => self.all_methods(parent),
            None => vec![],
        };

        for slot in list.iter_mut() {
            if let Some(own) = record.methods.iter().find(|m| m.name.name == slot.name.name) {
                *slot = own;
            }
        }
        for own in &record.methods {
            if !list.iter().any(|m| m.name.name == own.name.name) {
                list.push(own);
            }
        }
        list
    }

    pub fn declared_attributes(&self, name: &str) -> &[Attribute] {
        self.classes
            .get(name)
            .map(|r| r.attributes.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a method along the inheritance chain, nearest class first.
    pub fn find_method(&self, name: &str, method: &str) -> Option<&Method> {
        let record = self.classes.get(name)?;
        record
            .methods
            .iter()
            .find(|m| m.name.name == method)
            .or_else(|| self.find_method(record.parent.as_deref()?, method))
    }

    pub fn find_attribute(&self, name: &str, attribute: &str) -> Option<&Attribute> {
        let record = self.classes.get(name)?;
        record
            .attributes
            .iter()
            .find(|a| a.name.name == attribute)
            .or_else(|| self.find_attribute(record.parent.as_deref()?, attribute))
    }
}

fn builtin_method(class: &str, name: &str, formals: &[(&str, &str)], return_ty: &str) -> Method {
    Method {
        name: Identifier::new(0, name),
        formals: formals
            .iter()
            .map(|(name, ty)| Formal {
                name: Identifier::new(0, *name),
                ty: Identifier::new(0, *ty),
            })
            .collect(),
        return_ty: Identifier::new(0, return_ty),
        defining_class: class.to_string(),
        internal: Some(format!("{class}.{name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Class, Expr, ExprKind, Feature, Identifier, Program};

    fn class(name: &str, parent: Option<&str>, features: Vec<Feature>) -> Class {
        Class {
            name: Identifier::new(1, name),
            parent: parent.map(|p| Identifier::new(1, p)),
            features,
        }
    }

    fn main_method() -> Feature {
        Feature::Method {
            name: Identifier::new(2, "main"),
            formals: vec![],
            return_ty: Identifier::new(2, "Object"),
            body: Expr::new(2, ExprKind::New { ty: Identifier::new(2, "Object") }),
        }
    }

    fn minimal_program() -> Program {
        Program {
            classes: vec![class("Main", Some("IO"), vec![main_method()])],
        }
    }

    #[test]
    fn test_builtins_are_seeded() {
        let table = ClassTable::build(&minimal_program()).unwrap();

        for builtin in ["Object", "Bool", "Int", "IO", "String"] {
            assert!(table.contains(builtin), "missing {builtin}");
        }
        assert_eq!(
            vec!["abort", "copy", "type_name"],
            table
                .all_methods("Object")
                .iter()
                .map(|m| m.name.name.as_str())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_inherited_methods_come_first() {
        let table = ClassTable::build(&minimal_program()).unwrap();

        let methods: Vec<_> = table
            .all_methods("Main")
            .iter()
            .map(|m| m.name.name.clone())
            .collect();
        assert_eq!(
            vec!["abort", "copy", "type_name", "in_int", "in_string", "out_int", "out_string", "main"],
            methods
        );
    }

    #[test]
    fn test_override_keeps_vtable_position() {
        let program = Program {
            classes: vec![
                class("Main", Some("IO"), vec![main_method()]),
                class(
                    "A",
                    None,
                    vec![Feature::Method {
                        name: Identifier::new(3, "type_name"),
                        formals: vec![],
                        return_ty: Identifier::new(3, "String"),
                        body: Expr::new(3, ExprKind::Str { value: "A".into() }),
                    }],
                ),
            ],
        };
        let table = ClassTable::build(&program).unwrap();

        let methods = table.all_methods("A");
        assert_eq!("type_name", methods[2].name.name);
        assert_eq!("A", methods[2].defining_class);
        assert_eq!(3, methods.len());
    }

    #[test]
    fn test_inheritance_cycle_is_reported_at_line_zero() {
        let program = Program {
            classes: vec![
                class("Main", Some("IO"), vec![main_method()]),
                class("A", Some("B"), vec![]),
                class("B", Some("A"), vec![]),
            ],
        };

        let err = ClassTable::build(&program).unwrap_err();
        assert_eq!(0, err.line);
        assert!(err.message.starts_with("inheritance cycle:"), "{}", err.message);
    }

    #[test]
    fn test_primitive_inheritance_is_rejected() {
        let program = Program {
            classes: vec![
                class("Main", Some("IO"), vec![main_method()]),
                class("A", Some("Int"), vec![]),
            ],
        };

        let err = ClassTable::build(&program).unwrap_err();
        assert!(err.message.contains("primitive"), "{}", err.message);
    }

    #[test]
    fn test_missing_main_class() {
        let program = Program { classes: vec![class("A", None, vec![])] };

        let err = ClassTable::build(&program).unwrap_err();
        assert_eq!("class Main not found", err.message);
    }

    #[test]
    fn test_override_with_different_formals_is_rejected() {
        let program = Program {
            classes: vec![
                class("Main", Some("IO"), vec![main_method()]),
                class(
                    "A",
                    None,
                    vec![Feature::Method {
                        name: Identifier::new(3, "f"),
                        formals: vec![Formal {
                            name: Identifier::new(3, "x"),
                            ty: Identifier::new(3, "Int"),
                        }],
                        return_ty: Identifier::new(3, "Int"),
                        body: Expr::new(3, ExprKind::Int { value: "0".into() }),
                    }],
                ),
                class(
                    "B",
                    Some("A"),
                    vec![Feature::Method {
                        name: Identifier::new(7, "f"),
                        formals: vec![
                            Formal {
                                name: Identifier::new(7, "x"),
                                ty: Identifier::new(7, "Int"),
                            },
                            Formal {
                                name: Identifier::new(7, "y"),
                                ty: Identifier::new(7, "Int"),
                            },
                        ],
                        return_ty: Identifier::new(7, "Int"),
                        body: Expr::new(7, ExprKind::Int { value: "0".into() }),
                    }],
                ),
            ],
        };

        let err = ClassTable::build(&program).unwrap_err();
        assert_eq!(7, err.line);
        assert!(err.message.contains("different formals"), "{}", err.message);
    }

    #[test]
    fn test_lub_properties() {
        let program = Program {
            classes: vec![
                class("Main", Some("IO"), vec![main_method()]),
                class("A", None, vec![]),
                class("B", Some("A"), vec![]),
                class("C", Some("A"), vec![]),
                class("D", Some("B"), vec![]),
            ],
        };
        let table = ClassTable::build(&program).unwrap();

        let names = ["A", "B", "C", "D", "Main", "Int", "Object"];
        for a in names {
            assert_eq!(a, table.lub(a, a));
            assert_eq!("Object", table.lub(a, "Object"));
            for b in names {
                assert_eq!(table.lub(a, b), table.lub(b, a));
            }
        }
        assert_eq!("A", table.lub("D", "C"));
        assert_eq!("B", table.lub("D", "B"));
        assert_eq!("Object", table.lub("D", "Int"));
    }

    #[test]
    fn test_conforms_walks_the_chain() {
        let table = ClassTable::build(&minimal_program()).unwrap();

        assert!(table.conforms("Main", "IO"));
        assert!(table.conforms("Main", "Object"));
        assert!(table.conforms("Main", "Main"));
        assert!(!table.conforms("IO", "Main"));
    }
}
