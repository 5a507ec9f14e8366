//! Lexically scoped name-to-type bindings for the type checker.
//!
//! The bottom layer holds the attributes of the class being checked; method
//! formals and `let`/`case` bindings are pushed and popped as scopes above
//! it. Lookups search the scopes innermost first and fall back to the class
//! attributes.

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    class_bindings: Vec<(String, String)>,
    scopes: Vec<Vec<(String, String)>>,
}

impl SymbolTable {
    /// Replace the class-attribute layer; clears every open scope.
    pub fn set_class_bindings(&mut self, bindings: Vec<(String, String)>) {
        self.class_bindings = bindings;
        self.scopes.clear();
    }

    /// Drop all scopes above the class-attribute layer.
    pub fn clear_scopes(&mut self) {
        self.scopes.clear();
    }

    pub fn enter_scope(&mut self, bindings: Vec<(String, String)>) {
        self.scopes.push(bindings);
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, ty)) = scope.iter().rev().find(|(n, _)| n == name) {
                return Some(ty);
            }
        }
        self.class_bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::SymbolTable;

    #[test]
    fn test_lookup_prefers_inner_scope() {
        let mut table = SymbolTable::default();
        table.set_class_bindings(vec![("x".into(), "Object".into())]);
        table.enter_scope(vec![("x".into(), "Int".into())]);
        table.enter_scope(vec![("x".into(), "String".into())]);

        assert_eq!(Some("String"), table.lookup("x"));

        table.exit_scope();
        assert_eq!(Some("Int"), table.lookup("x"));

        table.exit_scope();
        assert_eq!(Some("Object"), table.lookup("x"));
    }

    #[test]
    fn test_clear_scopes_keeps_class_bindings() {
        let mut table = SymbolTable::default();
        table.set_class_bindings(vec![("attr".into(), "Int".into())]);
        table.enter_scope(vec![("local".into(), "Bool".into())]);
        table.clear_scopes();

        assert!(table.contains("attr"));
        assert!(!table.contains("local"));
    }
}
