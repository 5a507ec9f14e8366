//! Semantic analysis for Cool.
//!
//! Builds the class table from the program AST, runs the two-phase type
//! checker over every user class, and serializes the annotated result to the
//! interchange form consumed by the code generator.
mod class_table;
mod error;
mod formatter;
mod symbol_table;
mod type_checker;

pub use self::class_table::*;
pub use self::error::TypeError;
pub use self::formatter::TypedWriter;
pub use self::symbol_table::SymbolTable;
pub use self::type_checker::TypeChecker;

use log::debug;

use crate::ast::Program;

/// The result of a successful semantic analysis: the frozen class table and
/// the annotated program.
#[derive(Debug)]
pub struct SemanticAnalyzer {
    table: ClassTable,
    program: Program,
}

impl SemanticAnalyzer {
    /// Type check a program. Fails with the first detected violation.
    pub fn check(mut program: Program) -> Result<SemanticAnalyzer, TypeError> {
        let table = ClassTable::build(&program)?;
        debug!("class table built with {} classes", table.class_count());

        let mut checker = TypeChecker::new(&table);
        for class in &mut program.classes {
            debug!("type checking class {}", class.name.name);
            checker.check_class(class)?;
        }

        Ok(SemanticAnalyzer { table, program })
    }

    pub fn table(&self) -> &ClassTable {
        &self.table
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Serialize the class map, implementation map, parent map and annotated
    /// AST.
    pub fn write_output(&self) -> String {
        TypedWriter::write(&self.table, &self.program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstReader, Expr, ExprKind, Feature};

    const HELLO_AST: &str = "1\n\
                             1\nMain\ninherits\n1\nIO\n\
                             1\n\
                             method\n2\nmain\n0\n2\nObject\n\
                             3\nself_dispatch\n3\nout_string\n1\n3\nstring\nhello\\n\n";

    fn hello_program() -> crate::ast::Program {
        AstReader::new(HELLO_AST.as_bytes()).read_program().unwrap()
    }

    fn strip_annotations(expr: &mut Expr) {
        expr.annotated_type = None;
        match &mut expr.kind {
            ExprKind::Assign { value, .. } => strip_annotations(value),
            ExprKind::DynamicDispatch { receiver, args, .. }
            | ExprKind::StaticDispatch { receiver, args, .. } => {
                strip_annotations(receiver);
                args.iter_mut().for_each(strip_annotations);
            }
            ExprKind::SelfDispatch { args, .. } => args.iter_mut().for_each(strip_annotations),
            ExprKind::If { predicate, then_body, else_body } => {
                strip_annotations(predicate);
                strip_annotations(then_body);
                strip_annotations(else_body);
            }
            ExprKind::While { predicate, body } => {
                strip_annotations(predicate);
                strip_annotations(body);
            }
            ExprKind::Block { body } => body.iter_mut().for_each(strip_annotations),
            ExprKind::Let { bindings, body } => {
                for binding in bindings {
                    if let Some(init) = &mut binding.init {
                        strip_annotations(init);
                    }
                }
                strip_annotations(body);
            }
            ExprKind::Case { scrutinee, branches } => {
                strip_annotations(scrutinee);
                for branch in branches {
                    strip_annotations(&mut branch.body);
                }
            }
            ExprKind::Unary { operand, .. } => strip_annotations(operand),
            ExprKind::Binary { lhs, rhs, .. } => {
                strip_annotations(lhs);
                strip_annotations(rhs);
            }
            ExprKind::Paren(inner) => strip_annotations(inner),
            _ => {}
        }
    }

    #[test]
    fn test_hello_program_checks_and_serializes() {
        let analyzer = SemanticAnalyzer::check(hello_program()).unwrap();
        let output = analyzer.write_output();

        assert!(output.starts_with("class_map\n6\n"));
        assert!(output.contains("implementation_map\n6\n"));
        assert!(output.contains("parent_map\n5\n"));
        assert!(output.contains("Main\nIO\n"));
        // out_string returns SELF_TYPE, so the dispatch is annotated SELF_TYPE.
        assert!(output.contains("3\nSELF_TYPE\nself_dispatch\n"));
        // the built-in bodies are written as internal markers
        assert!(output.contains("internal\nObject.abort\n"));
    }

    #[test]
    fn test_reannotation_is_idempotent() {
        let analyzer = SemanticAnalyzer::check(hello_program()).unwrap();

        let mut stripped = analyzer.program().clone();
        for class in &mut stripped.classes {
            for feature in &mut class.features {
                match feature {
                    Feature::Attribute { init: Some(init), .. } => strip_annotations(init),
                    Feature::Method { body, .. } => strip_annotations(body),
                    _ => {}
                }
            }
        }

        let again = SemanticAnalyzer::check(stripped).unwrap();
        assert_eq!(analyzer.program(), again.program());
        assert_eq!(analyzer.write_output(), again.write_output());
    }

    #[test]
    fn test_missing_main_is_line_zero_diagnostic() {
        let ast = "1\n1\nA\nno_inherits\n0\n";
        let program = AstReader::new(ast.as_bytes()).read_program().unwrap();

        let err = SemanticAnalyzer::check(program).unwrap_err();
        assert_eq!("ERROR: 0: Type-Check: class Main not found", err.to_string());
    }
}
