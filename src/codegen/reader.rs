//! Reader for the type-checked interchange file.
//!
//! Consumes the four sections written by the analyzer and rebuilds the
//! codegen class table along with the annotated program.
use std::collections::HashMap;
use std::io::BufRead;

use super::class_table::{Attribute, ClassRecord, ClassTable, MethodSlot};
use crate::ast::{AstReadError, AstReader, Program};

type ReadResult<T> = Result<T, AstReadError>;

pub struct TypedAstReader<R> {
    inner: AstReader<R>,
}

impl<R: BufRead> TypedAstReader<R> {
    pub fn read(input: R) -> ReadResult<(ClassTable, Program)> {
        let mut reader = TypedAstReader {
            inner: AstReader::new_annotated(input),
        };

        reader.expect_header("class_map")?;
        let class_map = reader.class_map()?;

        reader.expect_header("implementation_map")?;
        let implementation_map = reader.implementation_map()?;

        reader.expect_header("parent_map")?;
        let parent_map = reader.parent_map()?;

        let program = reader.inner.read_program()?;

        let parents: HashMap<String, String> = parent_map.into_iter().collect();
        let mut records: HashMap<String, ClassRecord> = HashMap::new();

        for (name, attributes) in class_map {
            let record = records.entry(name.clone()).or_default();
            record.parent = parents.get(&name).cloned();
            record.attributes = attributes;
        }
        for (name, methods) in implementation_map {
            records.entry(name).or_default().methods = methods;
        }

        let mut table = ClassTable::default();
        for (name, record) in records {
            table.insert(name, record);
        }

        Ok((table, program))
    }

    fn expect_header(&mut self, expected: &str) -> ReadResult<()> {
        let line = self.inner.line()?;
        if line != expected {
            return Err(AstReadError(format!(
                "expected section '{expected}', found '{line}'"
            )));
        }
        Ok(())
    }

    fn class_map(&mut self) -> ReadResult<Vec<(String, Vec<Attribute>)>> {
        let count = self.inner.count()?;
        let mut classes = vec![];

        for _ in 0..count {
            let name = self.inner.line()?;
            let attr_count = self.inner.count()?;
            let mut attributes = vec![];
            for _ in 0..attr_count {
                let tag = self.inner.line()?;
                let attr_name = self.inner.line()?;
                let attr_ty = self.inner.line()?;
                let init = match tag.as_str() {
                    "initializer" => Some(self.inner.expr()?),
                    "no_initializer" => None,
                    other => {
                        return Err(AstReadError(format!(
                            "unrecognized class map attribute '{other}'"
                        )))
                    }
                };
                attributes.push(Attribute {
                    name: attr_name,
                    ty: attr_ty,
                    init,
                });
            }
            classes.push((name, attributes));
        }

        Ok(classes)
    }

    fn implementation_map(&mut self) -> ReadResult<Vec<(String, Vec<MethodSlot>)>> {
        let count = self.inner.count()?;
        let mut classes = vec![];

        for _ in 0..count {
            let name = self.inner.line()?;
            let method_count = self.inner.count()?;
            let mut methods = vec![];
            for _ in 0..method_count {
                let method_name = self.inner.line()?;
                let formal_count = self.inner.count()?;
                let mut formals = vec![];
                for _ in 0..formal_count {
                    formals.push(self.inner.line()?);
                }
                let defining_class = self.inner.line()?;
                let body = self.inner.expr()?;
                methods.push(MethodSlot {
                    name: method_name,
                    formals,
                    defining_class,
                    body,
                });
            }
            classes.push((name, methods));
        }

        Ok(classes)
    }

    fn parent_map(&mut self) -> ReadResult<Vec<(String, String)>> {
        let count = self.inner.count()?;
        let mut pairs = vec![];
        for _ in 0..count {
            let class = self.inner.line()?;
            let parent = self.inner.line()?;
            pairs.push((class, parent));
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::SemanticAnalyzer;
    use crate::ast::ExprKind;

    const HELLO_AST: &str = "1\n\
                             1\nMain\ninherits\n1\nIO\n\
                             1\n\
                             method\n2\nmain\n0\n2\nObject\n\
                             3\nself_dispatch\n3\nout_string\n1\n3\nstring\nhello\\n\n";

    fn typed_output() -> String {
        let program = crate::ast::AstReader::new(HELLO_AST.as_bytes())
            .read_program()
            .unwrap();
        SemanticAnalyzer::check(program).unwrap().write_output()
    }

    #[test]
    fn test_reads_analyzer_output() {
        let output = typed_output();
        let (table, program) = TypedAstReader::read(output.as_bytes()).unwrap();

        assert_eq!(
            vec!["Bool", "IO", "Int", "Main", "Object", "String"],
            table.class_names().collect::<Vec<_>>()
        );

        let main = table.methods("Main").last().unwrap();
        assert_eq!("main", main.name);
        assert_eq!("Main", main.defining_class);

        // the program section arrives annotated
        let crate::ast::Feature::Method { body, .. } = &program.classes[0].features[0] else {
            panic!("expected the main method");
        };
        assert_eq!(Some("SELF_TYPE".to_string()), body.annotated_type);
    }

    #[test]
    fn test_vtable_order_and_indices() {
        let output = typed_output();
        let (table, _) = TypedAstReader::read(output.as_bytes()).unwrap();

        let methods: Vec<_> = table.methods("Main").iter().map(|m| m.name.clone()).collect();
        assert_eq!(
            vec!["abort", "copy", "type_name", "in_int", "in_string", "out_int", "out_string", "main"],
            methods
        );
        assert_eq!(Some(7), table.method_index("Main", "main"));
        assert_eq!(Some(0), table.method_index("Object", "abort"));

        // internal bodies survive the round trip
        let abort = &table.methods("Object")[0];
        assert!(matches!(
            &abort.body.kind,
            ExprKind::Internal { name } if name == "Object.abort"
        ));
    }
}
