//! Lexically scoped name-to-address bindings for code generation.
//!
//! The address of a binding is the operand it can be loaded from: an
//! attribute slot off `%rbx`, a formal off `%rbp`, or a `let`/`case` frame
//! slot.
use super::asm::Operand;

#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Vec<(String, Operand)>>,
}

impl SymbolTable {
    pub fn enter_scope(&mut self) {
        self.scopes.push(vec![]);
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn bind(&mut self, name: impl ToString, address: Operand) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name.to_string(), address));
        }
    }

    /// Innermost-first lookup.
    pub fn find(&self, name: &str) -> Option<&Operand> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|(n, _)| n == name))
            .map(|(_, address)| address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::asm::Reg;

    #[test]
    fn test_shadowing_resolves_innermost() {
        let mut table = SymbolTable::default();
        table.enter_scope();
        table.bind("x", Operand::Mem(24, Reg::Rbx));
        table.enter_scope();
        table.bind("x", Operand::Mem(-16, Reg::Rbp));

        assert_eq!(Some(&Operand::Mem(-16, Reg::Rbp)), table.find("x"));

        table.exit_scope();
        assert_eq!(Some(&Operand::Mem(24, Reg::Rbx)), table.find("x"));
        assert_eq!(None, table.find("y"));
    }
}
