//! Serializer for the type-checked interchange form.
//!
//! Writes the four concatenated sections consumed by the code generator:
//! class map, implementation map, parent map, and the annotated program AST.
//! Attribute initializers and method bodies are pulled from the annotated
//! program; built-in methods emit their `internal` body marker.
use super::class_table::{ClassTable, OBJECT};
use crate::ast::{
    tag_of, CaseBranch, Class, Expr, ExprKind, Feature, Formal, Identifier, LetBinding, Program,
};

pub struct TypedWriter<'a> {
    table: &'a ClassTable,
    program: &'a Program,
    out: String,
}

impl<'a> TypedWriter<'a> {
    pub fn write(table: &'a ClassTable, program: &'a Program) -> String {
        let mut writer = TypedWriter {
            table,
            program,
            out: String::new(),
        };

        writer.class_map();
        writer.implementation_map();
        writer.parent_map();
        writer.annotated_program();
        writer.out
    }

    fn line(&mut self, value: impl ToString) {
        self.out.push_str(&value.to_string());
        self.out.push('\n');
    }

    fn identifier(&mut self, id: &Identifier) {
        self.line(id.line);
        self.line(&id.name);
    }

    fn find_class(&self, name: &str) -> Option<&'a Class> {
        self.program.classes.iter().find(|c| c.name.name == name)
    }

    fn attribute_init(&self, class: &str, attribute: &str) -> Option<&'a Expr> {
        self.find_class(class)?.features.iter().find_map(|f| match f {
            Feature::Attribute { name, init, .. } if name.name == attribute => init.as_ref(),
            _ => None,
        })
    }

    fn method_body(&self, class: &str, method: &str) -> Option<&'a Expr> {
        self.find_class(class)?.features.iter().find_map(|f| match f {
            Feature::Method { name, body, .. } if name.name == method => Some(body),
            _ => None,
        })
    }

    fn class_map(&mut self) {
        self.line("class_map");
        self.line(self.table.class_count());

        let names: Vec<String> = self.table.class_names().map(str::to_string).collect();
        for name in names {
            self.line(&name);

            let attributes: Vec<_> = self
                .table
                .all_attributes(&name)
                .iter()
                .map(|a| {
                    (
                        a.name.name.clone(),
                        a.ty.name.clone(),
                        a.has_init,
                        a.defining_class.clone(),
                    )
                })
                .collect();

            self.line(attributes.len());
            for (attr_name, attr_ty, has_init, defining_class) in attributes {
                if has_init {
                    self.line("initializer");
                } else {
                    self.line("no_initializer");
                }
                self.line(&attr_name);
                self.line(&attr_ty);
                if has_init {
                    let init = self
                        .attribute_init(&defining_class, &attr_name)
                        .expect("initializer recorded in the class table");
                    self.expr(init);
                }
            }
        }
    }

    fn implementation_map(&mut self) {
        self.line("implementation_map");
        self.line(self.table.class_count());

        let names: Vec<String> = self.table.class_names().map(str::to_string).collect();
        for name in names {
            self.line(&name);

            let methods: Vec<_> = self
                .table
                .all_methods(&name)
                .iter()
                .map(|m| {
                    (
                        m.name.name.clone(),
                        m.formals.iter().map(|f| f.name.name.clone()).collect::<Vec<_>>(),
                        m.return_ty.name.clone(),
                        m.defining_class.clone(),
                        m.internal.clone(),
                    )
                })
                .collect();

            self.line(methods.len());
            for (method_name, formals, return_ty, defining_class, internal) in methods {
                self.line(&method_name);
                self.line(formals.len());
                for formal in &formals {
                    self.line(formal);
                }
                self.line(&defining_class);

                match internal {
                    Some(marker) => {
                        self.line(0);
                        self.line(&return_ty);
                        self.line("internal");
                        self.line(&marker);
                    }
                    None => {
                        let body = self
                            .method_body(&defining_class, &method_name)
                            .expect("method body present in the program");
                        self.expr(body);
                    }
                }
            }
        }
    }

    fn parent_map(&mut self) {
        self.line("parent_map");
        self.line(self.table.class_count() - 1);

        let names: Vec<String> = self.table.class_names().map(str::to_string).collect();
        for name in names {
            if name == OBJECT {
                continue;
            }
            let parent = self.table.parent(&name).unwrap_or(OBJECT).to_string();
            self.line(&name);
            self.line(&parent);
        }
    }

    fn annotated_program(&mut self) {
        self.line(self.program.classes.len());
        for class in &self.program.classes {
            self.class(class);
        }
    }

    fn class(&mut self, class: &Class) {
        self.identifier(&class.name);
        match &class.parent {
            Some(parent) => {
                self.line("inherits");
                self.identifier(parent);
            }
            None => self.line("no_inherits"),
        }
        self.line(class.features.len());
        for feature in &class.features {
            self.feature(feature);
        }
    }

    fn feature(&mut self, feature: &Feature) {
        match feature {
            Feature::Attribute { name, ty, init: None } => {
                self.line("attribute_no_init");
                self.identifier(name);
                self.identifier(ty);
            }
            Feature::Attribute { name, ty, init: Some(init) } => {
                self.line("attribute_init");
                self.identifier(name);
                self.identifier(ty);
                self.expr(init);
            }
            Feature::Method { name, formals, return_ty, body } => {
                self.line("method");
                self.identifier(name);
                self.line(formals.len());
                for formal in formals {
                    self.formal(formal);
                }
                self.identifier(return_ty);
                self.expr(body);
            }
        }
    }

    fn formal(&mut self, formal: &Formal) {
        self.identifier(&formal.name);
        self.identifier(&formal.ty);
    }

    fn binding(&mut self, binding: &LetBinding) {
        match &binding.init {
            Some(init) => {
                self.line("let_binding_init");
                self.identifier(&binding.name);
                self.identifier(&binding.ty);
                self.expr(init);
            }
            None => {
                self.line("let_binding_no_init");
                self.identifier(&binding.name);
                self.identifier(&binding.ty);
            }
        }
    }

    fn branch(&mut self, branch: &CaseBranch) {
        self.identifier(&branch.name);
        self.identifier(&branch.ty);
        self.expr(&branch.body);
    }

    /// An annotated expression: line, static type, tag, children.
    fn expr(&mut self, expr: &Expr) {
        if let ExprKind::Paren(inner) = &expr.kind {
            return self.expr(inner);
        }

        self.line(expr.line);
        self.line(expr.ty());
        self.line(tag_of(&expr.kind));

        match &expr.kind {
            ExprKind::Assign { target, value } => {
                self.identifier(target);
                self.expr(value);
            }
            ExprKind::DynamicDispatch { receiver, method, args } => {
                self.expr(receiver);
                self.identifier(method);
                self.exprs(args);
            }
            ExprKind::StaticDispatch { receiver, ty, method, args } => {
                self.expr(receiver);
                self.identifier(ty);
                self.identifier(method);
                self.exprs(args);
            }
            ExprKind::SelfDispatch { method, args } => {
                self.identifier(method);
                self.exprs(args);
            }
            ExprKind::If { predicate, then_body, else_body } => {
                self.expr(predicate);
                self.expr(then_body);
                self.expr(else_body);
            }
            ExprKind::While { predicate, body } => {
                self.expr(predicate);
                self.expr(body);
            }
            ExprKind::Block { body } => self.exprs(body),
            ExprKind::Let { bindings, body } => {
                self.line(bindings.len());
                for binding in bindings {
                    self.binding(binding);
                }
                self.expr(body);
            }
            ExprKind::Case { scrutinee, branches } => {
                self.expr(scrutinee);
                self.line(branches.len());
                for branch in branches {
                    self.branch(branch);
                }
            }
            ExprKind::New { ty } => self.identifier(ty),
            ExprKind::Ident { name } => self.identifier(name),
            ExprKind::Int { value } | ExprKind::Str { value } => self.line(value),
            ExprKind::True | ExprKind::False => {}
            ExprKind::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.expr(operand),
            ExprKind::Internal { name } => self.line(name),
            ExprKind::Paren(_) => unreachable!("parentheses are unwrapped above"),
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        self.line(exprs.len());
        for expr in exprs {
            self.expr(expr);
        }
    }
}
