//! The two-phase type checker.
//!
//! Phase A (`validate_scopes`) walks a body and checks that every identifier
//! resolves and that `let` bindings are well formed. Phase B (`annotate`)
//! recomputes types bottom-up, writing `annotated_type` into each node.
//!
//! `annotate` returns the *conformance view* of an expression: this is the
//! annotated type except for `self`, which is annotated `SELF_TYPE` but
//! viewed as the current class by its consumers.
use log::trace;

use super::class_table::{ClassTable, Method, OBJECT, SELF_TYPE};
use super::error::TypeError;
use super::symbol_table::SymbolTable;
use crate::ast::{Class, Expr, ExprKind, Feature, Formal, UnaryOp};

type CheckResult<T> = Result<T, TypeError>;

pub struct TypeChecker<'a> {
    table: &'a ClassTable,
    symbols: SymbolTable,
}

impl<'a> TypeChecker<'a> {
    pub fn new(table: &'a ClassTable) -> TypeChecker<'a> {
        TypeChecker {
            table,
            symbols: SymbolTable::default(),
        }
    }

    /// Substitute `SELF_TYPE` with the current class for conformance checks.
    fn subst<'t>(&self, ty: &'t str, self_ty: &'t str) -> &'t str {
        if ty == SELF_TYPE {
            self_ty
        } else {
            ty
        }
    }

    /// Validate and annotate every feature body of a class.
    pub fn check_class(&mut self, class: &mut Class) -> CheckResult<()> {
        let self_ty = class.name.name.clone();

        let bindings = self
            .table
            .all_attributes(&self_ty)
            .iter()
            .map(|a| (a.name.name.clone(), a.ty.name.clone()))
            .collect();
        self.symbols.set_class_bindings(bindings);

        for feature in &mut class.features {
            match feature {
                Feature::Attribute { name, ty, init: Some(init) } => {
                    self.symbols.clear_scopes();
                    self.validate_scopes(init, &self_ty)?;
                    let init_ty = self.annotate(init, &self_ty)?;

                    let source = self.subst(&init_ty, &self_ty);
                    let dest = self.subst(&ty.name, &self_ty);
                    if !self.table.conforms(source, dest) {
                        return Err(TypeError::new(
                            init.line,
                            format!(
                                "initializer of type {init_ty} does not conform to attribute {} of type {}",
                                name.name, ty.name
                            ),
                        ));
                    }
                }
                Feature::Attribute { .. } => {}
                Feature::Method { name: _, formals, return_ty, body } => {
                    let scope = self.check_formals(formals)?;
                    self.symbols.clear_scopes();
                    self.symbols.enter_scope(scope);

                    self.validate_scopes(body, &self_ty)?;
                    let body_ty = self.annotate(body, &self_ty)?;

                    if !self.table.is_type(&return_ty.name) {
                        return Err(TypeError::new(
                            return_ty.line,
                            format!("return type {} not declared", return_ty.name),
                        ));
                    }

                    let source = self.subst(&body_ty, &self_ty).to_string();
                    let dest = self.subst(&return_ty.name, &self_ty);
                    if !self.table.conforms(&source, dest) {
                        return Err(TypeError::new(
                            return_ty.line,
                            format!("body is type {body_ty} while return type is {}", return_ty.name),
                        ));
                    }

                    self.symbols.exit_scope();
                }
            }
        }

        Ok(())
    }

    fn check_formals(&self, formals: &[Formal]) -> CheckResult<Vec<(String, String)>> {
        let mut scope = vec![];
        for formal in formals {
            if formal.name.name == "self" {
                return Err(TypeError::new(
                    formal.name.line,
                    "self cannot be a formal parameter",
                ));
            }
            if formal.ty.name == SELF_TYPE {
                return Err(TypeError::new(
                    formal.ty.line,
                    "SELF_TYPE cannot be a formal type",
                ));
            }
            if !self.table.contains(&formal.ty.name) {
                return Err(TypeError::new(
                    formal.ty.line,
                    format!("formal type {} not declared", formal.ty.name),
                ));
            }
            if scope.iter().any(|(n, _)| n == &formal.name.name) {
                return Err(TypeError::new(
                    formal.name.line,
                    format!("duplicate formal parameter {}", formal.name.name),
                ));
            }
            scope.push((formal.name.name.clone(), formal.ty.name.clone()));
        }
        Ok(scope)
    }

    /// Phase A: scope validation.
    fn validate_scopes(&mut self, expr: &Expr, self_ty: &str) -> CheckResult<()> {
        match &expr.kind {
            ExprKind::Assign { value, .. } => self.validate_scopes(value, self_ty),
            ExprKind::DynamicDispatch { receiver, args, .. }
            | ExprKind::StaticDispatch { receiver, args, .. } => {
                self.validate_scopes(receiver, self_ty)?;
                for arg in args {
                    self.validate_scopes(arg, self_ty)?;
                }
                Ok(())
            }
            ExprKind::SelfDispatch { args, .. } => {
                for arg in args {
                    self.validate_scopes(arg, self_ty)?;
                }
                Ok(())
            }
            ExprKind::If { predicate, then_body, else_body } => {
                self.validate_scopes(predicate, self_ty)?;
                self.validate_scopes(then_body, self_ty)?;
                self.validate_scopes(else_body, self_ty)
            }
            ExprKind::While { predicate, body } => {
                self.validate_scopes(predicate, self_ty)?;
                self.validate_scopes(body, self_ty)
            }
            ExprKind::Block { body } => {
                for expr in body {
                    self.validate_scopes(expr, self_ty)?;
                }
                Ok(())
            }
            ExprKind::Ident { name } => {
                if name.name != "self" && !self.symbols.contains(&name.name) {
                    return Err(TypeError::new(
                        name.line,
                        format!("unbound identifier {}", name.name),
                    ));
                }
                Ok(())
            }
            ExprKind::Unary { operand, .. } => self.validate_scopes(operand, self_ty),
            ExprKind::Binary { lhs, rhs, .. } => {
                self.validate_scopes(lhs, self_ty)?;
                self.validate_scopes(rhs, self_ty)
            }
            ExprKind::Let { bindings, body } => {
                let mut scope: Vec<(String, String)> = vec![];
                for binding in bindings {
                    if binding.ty.name == SELF_TYPE {
                        if !is_self_reference(binding.init.as_ref()) {
                            return Err(TypeError::new(
                                binding.ty.line,
                                "a SELF_TYPE binding must be initialized with self",
                            ));
                        }
                        scope.push((binding.name.name.clone(), self_ty.to_string()));
                    } else {
                        if !self.table.contains(&binding.ty.name) {
                            return Err(TypeError::new(
                                binding.ty.line,
                                format!("undefined type {} in let binding", binding.ty.name),
                            ));
                        }
                        if scope.iter().any(|(n, _)| n == &binding.name.name) {
                            return Err(TypeError::new(
                                binding.name.line,
                                format!("variable {} redeclared in let", binding.name.name),
                            ));
                        }
                        scope.push((binding.name.name.clone(), binding.ty.name.clone()));
                    }

                    if let Some(init) = &binding.init {
                        self.validate_scopes(init, self_ty)?;
                    }
                }

                self.symbols.enter_scope(scope);
                self.validate_scopes(body, self_ty)?;
                self.symbols.exit_scope();
                Ok(())
            }
            ExprKind::Case { scrutinee, branches } => {
                self.validate_scopes(scrutinee, self_ty)?;
                for branch in branches {
                    self.symbols
                        .enter_scope(vec![(branch.name.name.clone(), branch.ty.name.clone())]);
                    self.validate_scopes(&branch.body, self_ty)?;
                    self.symbols.exit_scope();
                }
                Ok(())
            }
            ExprKind::Paren(inner) => self.validate_scopes(inner, self_ty),
            ExprKind::New { .. }
            | ExprKind::Int { .. }
            | ExprKind::Str { .. }
            | ExprKind::True
            | ExprKind::False => Ok(()),
            ExprKind::Internal { .. } => {
                Err(TypeError::new(expr.line, "unrecognized expression"))
            }
        }
    }

    /// Phase B: bottom-up annotation. Returns the conformance view.
    pub fn annotate(&mut self, expr: &mut Expr, self_ty: &str) -> CheckResult<String> {
        let line = expr.line;

        match &mut expr.kind {
            ExprKind::Int { .. } => {
                expr.annotated_type = Some("Int".to_string());
                Ok("Int".to_string())
            }
            ExprKind::Str { .. } => {
                expr.annotated_type = Some("String".to_string());
                Ok("String".to_string())
            }
            ExprKind::True | ExprKind::False => {
                expr.annotated_type = Some("Bool".to_string());
                Ok("Bool".to_string())
            }
            ExprKind::Ident { name } => {
                if name.name == "self" {
                    expr.annotated_type = Some(SELF_TYPE.to_string());
                    return Ok(self_ty.to_string());
                }
                let Some(ty) = self.symbols.lookup(&name.name) else {
                    return Err(TypeError::new(
                        name.line,
                        format!("variable {} not declared", name.name),
                    ));
                };
                let ty = ty.to_string();
                expr.annotated_type = Some(ty.clone());
                Ok(ty)
            }
            ExprKind::New { ty } => {
                if !self.table.is_type(&ty.name) {
                    return Err(TypeError::new(
                        ty.line,
                        format!("undefined type {} in new", ty.name),
                    ));
                }
                expr.annotated_type = Some(ty.name.clone());
                Ok(ty.name.clone())
            }
            ExprKind::Assign { target, value } => {
                if target.name == "self" {
                    return Err(TypeError::new(target.line, "cannot assign to self"));
                }
                let Some(declared) = self.symbols.lookup(&target.name).map(str::to_string) else {
                    return Err(TypeError::new(
                        target.line,
                        format!("variable {} not declared", target.name),
                    ));
                };

                let value_ty = self.annotate(value, self_ty)?;
                let source = self.subst(&value_ty, self_ty);
                let dest = self.subst(&declared, self_ty);
                if !self.table.conforms(source, dest) {
                    return Err(TypeError::new(
                        line,
                        format!("cannot assign a {value_ty} to {declared}"),
                    ));
                }

                let annotated = value.annotated_type.clone();
                expr.annotated_type = annotated.clone();
                Ok(annotated.unwrap_or(value_ty))
            }
            ExprKind::DynamicDispatch { receiver, method, args } => {
                let receiver_ty = self.annotate(receiver, self_ty)?;
                let resolve_ty = self.subst(&receiver_ty, self_ty).to_string();

                let mut arg_views = vec![];
                for arg in args.iter_mut() {
                    arg_views.push(self.annotate(arg, self_ty)?);
                }

                let Some(found) = self.table.find_method(&resolve_ty, &method.name) else {
                    return Err(TypeError::new(
                        line,
                        format!("unknown method {}", method.name),
                    ));
                };
                let return_ty = found.return_ty.name.clone();
                self.check_arguments(found, &arg_views, self_ty, line)?;

                let annotated = if return_ty == SELF_TYPE {
                    receiver
                        .annotated_type
                        .clone()
                        .unwrap_or_else(|| receiver_ty.clone())
                } else {
                    return_ty
                };
                expr.annotated_type = Some(annotated.clone());
                Ok(annotated)
            }
            ExprKind::StaticDispatch { receiver, ty, method, args } => {
                let receiver_ty = self.annotate(receiver, self_ty)?;
                let receiver_view = self.subst(&receiver_ty, self_ty).to_string();

                if !self.table.contains(&ty.name) {
                    return Err(TypeError::new(
                        ty.line,
                        format!("undefined type {} in static dispatch", ty.name),
                    ));
                }
                if !self.table.conforms(&receiver_view, &ty.name) {
                    return Err(TypeError::new(
                        line,
                        format!("expression of type {receiver_ty} does not conform to {} in static dispatch", ty.name),
                    ));
                }

                let mut arg_views = vec![];
                for arg in args.iter_mut() {
                    arg_views.push(self.annotate(arg, self_ty)?);
                }

                let Some(found) = self.table.find_method(&ty.name, &method.name) else {
                    return Err(TypeError::new(
                        line,
                        format!("unknown method {}", method.name),
                    ));
                };
                let return_ty = found.return_ty.name.clone();
                self.check_arguments(found, &arg_views, self_ty, line)?;

                expr.annotated_type = Some(return_ty.clone());
                Ok(return_ty)
            }
            ExprKind::SelfDispatch { method, args } => {
                let mut arg_views = vec![];
                for arg in args.iter_mut() {
                    arg_views.push(self.annotate(arg, self_ty)?);
                }

                let Some(found) = self.table.find_method(self_ty, &method.name) else {
                    return Err(TypeError::new(
                        line,
                        format!("unknown method {}", method.name),
                    ));
                };
                let return_ty = found.return_ty.name.clone();
                self.check_arguments(found, &arg_views, self_ty, line)?;

                expr.annotated_type = Some(return_ty.clone());
                Ok(return_ty)
            }
            ExprKind::If { predicate, then_body, else_body } => {
                let predicate_ty = self.annotate(predicate, self_ty)?;
                if predicate_ty != "Bool" {
                    return Err(TypeError::new(line, "if predicate must be Bool"));
                }

                let then_ty = self.annotate(then_body, self_ty)?;
                let else_ty = self.annotate(else_body, self_ty)?;

                let result = if then_ty == else_ty {
                    then_ty
                } else {
                    self.table.lub(&then_ty, &else_ty).to_string()
                };
                expr.annotated_type = Some(result.clone());
                Ok(result)
            }
            ExprKind::While { predicate, body } => {
                let predicate_ty = self.annotate(predicate, self_ty)?;
                if predicate_ty != "Bool" {
                    return Err(TypeError::new(line, "while predicate must be Bool"));
                }
                self.annotate(body, self_ty)?;

                expr.annotated_type = Some(OBJECT.to_string());
                Ok(OBJECT.to_string())
            }
            ExprKind::Block { body } => {
                let mut last_view = String::new();
                for sub in body.iter_mut() {
                    last_view = self.annotate(sub, self_ty)?;
                }

                let mut shared: Option<String> = None;
                for sub in body.iter() {
                    let ty = sub.ty();
                    shared = Some(match shared {
                        None => ty.to_string(),
                        Some(acc) => self.table.lub(&acc, ty).to_string(),
                    });
                }
                if let Some(shared) = shared {
                    trace!("block at line {line} has shared type {shared}");
                }

                expr.annotated_type = body.last().and_then(|e| e.annotated_type.clone());
                Ok(last_view)
            }
            ExprKind::Let { bindings, body } => {
                let mut scope: Vec<(String, String)> = vec![];
                for binding in bindings.iter_mut() {
                    if binding.ty.name == SELF_TYPE {
                        if !is_self_reference(binding.init.as_ref()) {
                            return Err(TypeError::new(
                                binding.ty.line,
                                "a SELF_TYPE binding must be initialized with self",
                            ));
                        }
                        if let Some(init) = &mut binding.init {
                            self.annotate(init, self_ty)?;
                        }
                        scope.push((binding.name.name.clone(), SELF_TYPE.to_string()));
                        continue;
                    }

                    if binding.name.name == "self" {
                        return Err(TypeError::new(
                            binding.name.line,
                            "cannot bind self in a let binding",
                        ));
                    }
                    if !self.table.contains(&binding.ty.name) {
                        return Err(TypeError::new(
                            binding.ty.line,
                            format!("undefined type {} in let binding", binding.ty.name),
                        ));
                    }
                    if scope.iter().any(|(n, _)| n == &binding.name.name) {
                        return Err(TypeError::new(
                            binding.name.line,
                            format!("variable {} redeclared in let", binding.name.name),
                        ));
                    }

                    if let Some(init) = &mut binding.init {
                        let init_ty = self.annotate(init, self_ty)?;
                        let source = self.subst(&init_ty, self_ty);
                        if !self.table.conforms(source, &binding.ty.name) {
                            return Err(TypeError::new(
                                line,
                                format!(
                                    "let initializer of type {init_ty} does not conform to {}",
                                    binding.ty.name
                                ),
                            ));
                        }
                    }
                    scope.push((binding.name.name.clone(), binding.ty.name.clone()));
                }

                self.symbols.enter_scope(scope);
                let body_view = self.annotate(body, self_ty)?;
                self.symbols.exit_scope();

                let body_annotation = body.annotated_type.clone();
                expr.annotated_type = body_annotation.clone();

                if body_annotation.as_deref() == Some(SELF_TYPE) {
                    Ok(SELF_TYPE.to_string())
                } else {
                    Ok(body_view)
                }
            }
            ExprKind::Case { scrutinee, branches } => {
                self.annotate(scrutinee, self_ty)?;

                let mut seen: Vec<String> = vec![];
                let mut result: Option<String> = None;
                for branch in branches.iter_mut() {
                    if branch.ty.name == SELF_TYPE {
                        return Err(TypeError::new(
                            branch.ty.line,
                            "SELF_TYPE cannot be a case branch type",
                        ));
                    }
                    if !self.table.contains(&branch.ty.name) {
                        return Err(TypeError::new(
                            branch.ty.line,
                            format!("undefined type {} in case branch", branch.ty.name),
                        ));
                    }
                    if seen.contains(&branch.ty.name) {
                        return Err(TypeError::new(
                            branch.ty.line,
                            format!("case branch type {} is bound twice", branch.ty.name),
                        ));
                    }
                    seen.push(branch.ty.name.clone());

                    self.symbols
                        .enter_scope(vec![(branch.name.name.clone(), branch.ty.name.clone())]);
                    let branch_ty = self.annotate(&mut branch.body, self_ty)?;
                    self.symbols.exit_scope();

                    result = Some(match result {
                        None => branch_ty,
                        Some(acc) => self.table.lub(&acc, &branch_ty).to_string(),
                    });
                }

                let result = result.unwrap_or_else(|| OBJECT.to_string());
                expr.annotated_type = Some(result.clone());
                Ok(result)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                let left = self.annotate(lhs, self_ty)?;
                let right = self.annotate(rhs, self_ty)?;

                use crate::ast::BinaryOp::*;
                let result = match op {
                    Plus | Minus | Times | Divide => {
                        if left != "Int" || right != "Int" {
                            return Err(TypeError::new(
                                line,
                                "arithmetic operations require Int operands",
                            ));
                        }
                        "Int"
                    }
                    Lt | Le => {
                        let primitives = ["Int", "String", "Bool"];
                        let same_primitive = left == right && primitives.contains(&left.as_str());
                        let both_objects = !primitives.contains(&left.as_str())
                            && !primitives.contains(&right.as_str());
                        if !(same_primitive || both_objects) {
                            return Err(TypeError::new(
                                line,
                                "comparison on incompatible operands",
                            ));
                        }
                        "Bool"
                    }
                    Eq => {
                        let primitives = ["Int", "String", "Bool"];
                        let involves_primitive = primitives.contains(&left.as_str())
                            || primitives.contains(&right.as_str());
                        if involves_primitive && left != right {
                            return Err(TypeError::new(
                                line,
                                "equality operands of primitive type must match",
                            ));
                        }
                        "Bool"
                    }
                };

                expr.annotated_type = Some(result.to_string());
                Ok(result.to_string())
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let operand_ty = self.annotate(operand, self_ty)?;

                let result = match op {
                    UnaryOp::Not => {
                        if operand_ty != "Bool" {
                            return Err(TypeError::new(line, "not requires a Bool operand"));
                        }
                        "Bool"
                    }
                    UnaryOp::Negate => "Int",
                    UnaryOp::IsVoid => "Bool",
                };

                expr.annotated_type = Some(result.to_string());
                Ok(result.to_string())
            }
            ExprKind::Paren(inner) => {
                let view = self.annotate(inner, self_ty)?;
                expr.annotated_type = inner.annotated_type.clone();
                Ok(view)
            }
            ExprKind::Internal { .. } => {
                Err(TypeError::new(line, "unrecognized expression"))
            }
        }
    }

    fn check_arguments(
        &self,
        method: &Method,
        arg_views: &[String],
        self_ty: &str,
        line: usize,
    ) -> CheckResult<()> {
        if arg_views.len() != method.formals.len() {
            return Err(TypeError::new(
                line,
                "incorrect number of arguments for dispatch",
            ));
        }
        for (view, formal) in arg_views.iter().zip(&method.formals) {
            let source = self.subst(view, self_ty);
            if !self.table.conforms(source, &formal.ty.name) {
                return Err(TypeError::new(line, "dispatch arguments are not compatible"));
            }
        }
        Ok(())
    }
}

fn is_self_reference(expr: Option<&Expr>) -> bool {
    matches!(
        expr,
        Some(Expr { kind: ExprKind::Ident { name }, .. }) if name.name == "self" || name.name == SELF_TYPE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CaseBranch, Identifier, LetBinding, Program};

    fn identifier(name: &str) -> Identifier {
        Identifier::new(5, name)
    }

    fn int_lit(value: &str) -> Expr {
        Expr::new(5, ExprKind::Int { value: value.into() })
    }

    fn table() -> ClassTable {
        let program = Program {
            classes: vec![Class {
                name: Identifier::new(1, "Main"),
                parent: Some(Identifier::new(1, "IO")),
                features: vec![Feature::Method {
                    name: Identifier::new(2, "main"),
                    formals: vec![],
                    return_ty: Identifier::new(2, "Object"),
                    body: int_lit("0"),
                }],
            }],
        };
        ClassTable::build(&program).unwrap()
    }

    #[test]
    fn test_literals() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = int_lit("42");
        assert_eq!("Int", checker.annotate(&mut expr, "Main").unwrap());
        assert_eq!(Some("Int".to_string()), expr.annotated_type);

        let mut expr = Expr::new(5, ExprKind::Str { value: "x".into() });
        assert_eq!("String", checker.annotate(&mut expr, "Main").unwrap());

        let mut expr = Expr::new(5, ExprKind::True);
        assert_eq!("Bool", checker.annotate(&mut expr, "Main").unwrap());
    }

    #[test]
    fn test_self_is_annotated_self_type_but_viewed_as_class() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(5, ExprKind::Ident { name: identifier("self") });
        assert_eq!("Main", checker.annotate(&mut expr, "Main").unwrap());
        assert_eq!(Some(SELF_TYPE.to_string()), expr.annotated_type);
    }

    #[test]
    fn test_arithmetic_requires_int() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::Binary {
                op: crate::ast::BinaryOp::Plus,
                lhs: Box::new(int_lit("1")),
                rhs: Box::new(Expr::new(5, ExprKind::True)),
            },
        );

        let err = checker.annotate(&mut expr, "Main").unwrap_err();
        assert!(err.message.contains("arithmetic"), "{}", err.message);
    }

    #[test]
    fn test_dispatch_on_self_type_receiver_resolves_against_current_class() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        // self.copy().type_name(): copy() yields SELF_TYPE, which must bind
        // to Main for the outer resolution.
        let copy = Expr::new(
            5,
            ExprKind::DynamicDispatch {
                receiver: Box::new(Expr::new(5, ExprKind::Ident { name: identifier("self") })),
                method: identifier("copy"),
                args: vec![],
            },
        );
        let mut expr = Expr::new(
            5,
            ExprKind::DynamicDispatch {
                receiver: Box::new(copy),
                method: identifier("type_name"),
                args: vec![],
            },
        );

        assert_eq!("String", checker.annotate(&mut expr, "Main").unwrap());
        let ExprKind::DynamicDispatch { receiver, .. } = &expr.kind else {
            unreachable!()
        };
        assert_eq!(Some(SELF_TYPE.to_string()), receiver.annotated_type);
    }

    #[test]
    fn test_self_dispatch_keeps_self_type_return() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::SelfDispatch { method: identifier("copy"), args: vec![] },
        );

        assert_eq!(SELF_TYPE, checker.annotate(&mut expr, "Main").unwrap());
    }

    #[test]
    fn test_dispatch_arity_mismatch() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::SelfDispatch { method: identifier("out_int"), args: vec![] },
        );

        let err = checker.annotate(&mut expr, "Main").unwrap_err();
        assert!(err.message.contains("number of arguments"), "{}", err.message);
    }

    #[test]
    fn test_if_joins_branch_types() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::If {
                predicate: Box::new(Expr::new(5, ExprKind::True)),
                then_body: Box::new(int_lit("1")),
                else_body: Box::new(Expr::new(5, ExprKind::Str { value: "s".into() })),
            },
        );

        assert_eq!("Object", checker.annotate(&mut expr, "Main").unwrap());
    }

    #[test]
    fn test_while_is_object_and_checks_predicate() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::While {
                predicate: Box::new(int_lit("1")),
                body: Box::new(int_lit("2")),
            },
        );
        assert!(checker.annotate(&mut expr, "Main").is_err());

        let mut expr = Expr::new(
            5,
            ExprKind::While {
                predicate: Box::new(Expr::new(5, ExprKind::True)),
                body: Box::new(int_lit("2")),
            },
        );
        assert_eq!("Object", checker.annotate(&mut expr, "Main").unwrap());
    }

    #[test]
    fn test_let_scopes_and_conformance() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::Let {
                bindings: vec![LetBinding {
                    name: identifier("x"),
                    ty: identifier("Int"),
                    init: Some(int_lit("1")),
                }],
                body: Box::new(Expr::new(6, ExprKind::Ident { name: identifier("x") })),
            },
        );
        assert_eq!("Int", checker.annotate(&mut expr, "Main").unwrap());

        let mut expr = Expr::new(
            5,
            ExprKind::Let {
                bindings: vec![LetBinding {
                    name: identifier("x"),
                    ty: identifier("Int"),
                    init: Some(Expr::new(5, ExprKind::True)),
                }],
                body: Box::new(int_lit("1")),
            },
        );
        assert!(checker.annotate(&mut expr, "Main").is_err());
    }

    #[test]
    fn test_case_rejects_duplicate_branch_types() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let mut expr = Expr::new(
            5,
            ExprKind::Case {
                scrutinee: Box::new(int_lit("1")),
                branches: vec![
                    CaseBranch {
                        name: identifier("a"),
                        ty: identifier("Int"),
                        body: int_lit("1"),
                    },
                    CaseBranch {
                        name: identifier("b"),
                        ty: identifier("Int"),
                        body: int_lit("2"),
                    },
                ],
            },
        );

        let err = checker.annotate(&mut expr, "Main").unwrap_err();
        assert!(err.message.contains("bound twice"), "{}", err.message);
    }

    #[test]
    fn test_unbound_identifier_is_caught_in_phase_a() {
        let table = table();
        let mut checker = TypeChecker::new(&table);

        let expr = Expr::new(5, ExprKind::Ident { name: identifier("nope") });
        let err = checker.validate_scopes(&expr, "Main").unwrap_err();
        assert!(err.message.contains("unbound identifier"), "{}", err.message);
    }
}
