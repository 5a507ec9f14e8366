//! Code generation: lowers the annotated AST to x86-64 assembly.
//!
//! Layout conventions: every heap object is `[obj_id][size][vtable_ptr]`
//! followed by 8-byte attribute slots; `%rbx` holds `self` inside method
//! bodies; formals live at `16 + 8*i(%rbp)`; `let` and `case` bindings get
//! frame slots below the saved `%rbx`, reserved up front by a pre-pass over
//! the method body.
pub mod asm;
mod class_table;
mod helpers;
mod reader;
mod runtime;
mod symbol_table;

pub use self::class_table::{Attribute, ClassRecord, ClassTable, MethodSlot};
pub use self::helpers::{LabelGenerator, StringCache};
pub use self::reader::TypedAstReader;
pub use self::runtime::RuntimeError;
pub use self::symbol_table::SymbolTable;

use std::{error::Error, fmt::Display};

use log::debug;

use self::asm::Instruction::{self, *};
use self::asm::Operand::{Imm, Indexed, Mem, Reg as R, Rip};
use self::asm::Reg::{self, *};
use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};

const SELF_TYPE: &str = "SELF_TYPE";

/// Frame slots reserved for the hand-written built-in bodies.
const INTERNAL_SLOTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenError(pub String);

impl Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl Error for CodegenError {}

type GenResult<T> = Result<T, CodegenError>;

pub struct CodeGenerator {
    table: ClassTable,
    labels: LabelGenerator,
    strings: StringCache,
    symbols: SymbolTable,
    current_class: String,
    slot_index: usize,
    text: Vec<Instruction>,
}

impl CodeGenerator {
    pub fn new(table: ClassTable) -> CodeGenerator {
        CodeGenerator {
            table,
            labels: LabelGenerator::default(),
            strings: StringCache::default(),
            symbols: SymbolTable::default(),
            current_class: String::new(),
            slot_index: 0,
            text: vec![],
        }
    }

    /// Generate the complete assembly file.
    pub fn generate(mut self) -> GenResult<String> {
        self.emit_prologue_directives();
        self.emit_constructors()?;
        self.emit_methods()?;
        self.emit_entry()?;
        self.emit_runtime_helpers();

        let mut data = vec![Directive(".section .data".to_string())];
        self.emit_vtables(&mut data);
        self.emit_class_name_table(&mut data);

        // String literals are interned during generation, so the read-only
        // data goes out last.
        let mut rodata = vec![Directive(".section .rodata".to_string())];
        self.emit_fixed_strings(&mut rodata);
        self.emit_string_literals(&mut rodata);

        let mut out = String::new();
        for instr in data.iter().chain(&self.text).chain(&rodata) {
            out.push_str(&instr.to_string());
            out.push('\n');
        }
        Ok(out)
    }

    fn emit(&mut self, instr: Instruction) {
        self.text.push(instr);
    }

    fn class_id(&self, name: &str) -> GenResult<i64> {
        self.table
            .class_id(name)
            .ok_or_else(|| CodegenError(format!("unknown class {name}")))
    }

    fn emit_prologue_directives(&mut self) {
        self.emit(Directive(".section .text".to_string()));
        self.emit(Directive(".globl start".to_string()));
        for external in [
            "malloc", "calloc", "memcpy", "printf", "sscanf", "fgets", "fgetc", "fputc",
            "fflush", "stdin", "stdout", "exit",
        ] {
            self.emit(Directive(format!(".extern {external}")));
        }
    }

    fn emit_vtables(&self, data: &mut Vec<Instruction>) {
        for name in self.table.class_names() {
            data.push(Directive(format!(".globl {name}..vtable")));
            data.push(Label(format!("{name}..vtable")));
            data.push(Directive(format!("    .quad {name}..new")));
            for method in self.table.methods(name) {
                data.push(Directive(format!(
                    "    .quad {}.{}",
                    method.defining_class, method.name
                )));
            }
        }
    }

    /// The table indexed by `obj_id - 1`, followed by the name strings.
    fn emit_class_name_table(&self, data: &mut Vec<Instruction>) {
        data.push(Label("class_name_lookup".to_string()));
        for name in self.table.class_names() {
            data.push(Directive(format!("    .quad {name}_name")));
        }
        for name in self.table.class_names() {
            data.push(Label(format!("{name}_name")));
            data.push(Directive(format!("    .string \"{name}\"")));
        }
    }

    fn emit_fixed_strings(&self, rodata: &mut Vec<Instruction>) {
        rodata.push(Label("abort.message".to_string()));
        rodata.push(Directive("    .string \"abort\\\\n\"".to_string()));
        rodata.push(Label("percent.d".to_string()));
        rodata.push(Directive("    .string \"%ld\"".to_string()));
        rodata.push(Label("percent.ld".to_string()));
        rodata.push(Directive("    .string \" %ld\"".to_string()));
        rodata.push(Label("the.empty.string".to_string()));
        rodata.push(Directive("    .byte 0".to_string()));

        for kind in RuntimeError::ALL {
            rodata.push(Label(kind.label().to_string()));
            rodata.push(Directive(format!(
                "    .string \"ERROR: %d: Exception: {}\\n\"",
                kind.message()
            )));
        }
    }

    /// User string literals keep their escape sequences byte for byte; the
    /// runtime writer interprets them on output.
    fn emit_string_literals(&self, rodata: &mut Vec<Instruction>) {
        for (content, label) in self.strings.entries() {
            rodata.push(Label(label.clone()));
            for byte in content.bytes() {
                rodata.push(Directive(format!("    .byte {byte}")));
            }
            rodata.push(Directive("    .byte 0".to_string()));
        }
    }

    fn emit_constructors(&mut self) -> GenResult<()> {
        let names: Vec<String> = self.table.class_names().map(str::to_string).collect();
        for name in names {
            self.emit_constructor(&name)?;
        }
        Ok(())
    }

    fn emit_constructor(&mut self, name: &str) -> GenResult<()> {
        debug!("emitting constructor for {name}");
        self.current_class = name.to_string();

        let id = self.class_id(name)?;
        let size = self.table.object_size(name);
        let attributes: Vec<Attribute> = self.table.attributes(name).to_vec();

        let slots = attributes
            .iter()
            .filter_map(|a| a.init.as_ref())
            .map(frame_slots)
            .max()
            .unwrap_or(0);
        let frame = frame_bytes(slots);
        self.slot_index = 0;

        self.emit(Directive(format!(".globl {name}..new")));
        self.emit(Label(format!("{name}..new")));
        self.emit(Pushq(R(Rbp)));
        self.emit(Movq(R(Rsp), R(Rbp)));
        self.emit(Pushq(R(Rbx)));
        self.emit(Subq(Imm(frame), R(Rsp)));

        self.emit(Movq(Imm(size / 8), R(Rdi)));
        self.emit(Movq(Imm(8), R(Rsi)));
        self.emit(Call("calloc".to_string()));
        self.emit(Movq(R(Rax), R(Rbx)));

        self.emit(Movq(Imm(id), Mem(0, Rbx)));
        self.emit(Movq(Imm(size), Mem(8, Rbx)));
        self.emit(Leaq(Rip(format!("{name}..vtable")), R(Rcx)));
        self.emit(Movq(R(Rcx), Mem(16, Rbx)));

        // attribute slots are visible to the initializer expressions
        self.symbols.enter_scope();
        for (index, attribute) in attributes.iter().enumerate() {
            self.symbols
                .bind(&attribute.name, Mem(24 + 8 * index as i64, Rbx));
        }

        for (index, attribute) in attributes.iter().enumerate() {
            let offset = 24 + 8 * index as i64;
            match &attribute.init {
                Some(init) => {
                    self.expr(init)?;
                    self.emit(Movq(R(Rax), Mem(offset, Rbx)));
                }
                // type defaults: Int 0, Bool false, String and user classes
                // stay null
                None => self.emit(Movq(Imm(0), Mem(offset, Rbx))),
            }
        }
        self.symbols.exit_scope();

        self.emit(Movq(R(Rbx), R(Rax)));
        self.emit(Addq(Imm(frame), R(Rsp)));
        self.emit(Popq(R(Rbx)));
        self.emit(Popq(R(Rbp)));
        self.emit(Ret);
        Ok(())
    }

    fn emit_methods(&mut self) -> GenResult<()> {
        let names: Vec<String> = self.table.class_names().map(str::to_string).collect();
        for name in names {
            let methods: Vec<MethodSlot> = self
                .table
                .methods(&name)
                .iter()
                .filter(|m| m.defining_class == name)
                .cloned()
                .collect();
            for method in methods {
                self.emit_method(&name, &method)?;
            }
        }
        Ok(())
    }

    fn emit_method(&mut self, class: &str, method: &MethodSlot) -> GenResult<()> {
        debug!("emitting method {class}.{}", method.name);
        self.current_class = class.to_string();

        let slots = frame_slots(&method.body);
        let frame = frame_bytes(slots);
        self.slot_index = 0;

        self.emit(Directive(format!(".globl {class}.{}", method.name)));
        self.emit(Label(format!("{class}.{}", method.name)));
        self.emit(Pushq(R(Rbp)));
        self.emit(Movq(R(Rsp), R(Rbp)));
        self.emit(Pushq(R(Rbx)));
        self.emit(Movq(R(Rdi), R(Rbx)));
        self.emit(Subq(Imm(frame), R(Rsp)));

        self.symbols.enter_scope();
        let attributes: Vec<String> = self
            .table
            .attributes(class)
            .iter()
            .map(|a| a.name.clone())
            .collect();
        for (index, attribute) in attributes.iter().enumerate() {
            self.symbols.bind(attribute, Mem(24 + 8 * index as i64, Rbx));
        }

        self.symbols.enter_scope();
        for (index, formal) in method.formals.iter().enumerate() {
            self.symbols.bind(formal, Mem(16 + 8 * index as i64, Rbp));
        }

        self.expr(&method.body)?;

        self.symbols.exit_scope();
        self.symbols.exit_scope();

        self.emit(Addq(Imm(frame), R(Rsp)));
        self.emit(Popq(R(Rbx)));
        self.emit(Popq(R(Rbp)));
        self.emit(Ret);
        Ok(())
    }

    fn emit_entry(&mut self) -> GenResult<()> {
        let main_label = self
            .table
            .methods("Main")
            .iter()
            .find(|m| m.name == "main")
            .map(|m| format!("{}.main", m.defining_class))
            .ok_or_else(|| CodegenError("method main not found in class Main".to_string()))?;

        self.emit(Label("start".to_string()));
        self.emit(Jmp("main".to_string()));

        self.emit(Directive(".globl main".to_string()));
        self.emit(Label("main".to_string()));
        self.emit(Pushq(R(Rbp)));
        self.emit(Movq(R(Rsp), R(Rbp)));
        self.emit(Call("Main..new".to_string()));
        self.emit(Movq(R(Rax), R(Rdi)));
        self.emit(Movq(Mem(16, Rdi), R(Rsi)));
        self.emit(Call(main_label));
        self.emit(Movq(Imm(0), R(Rdi)));
        self.emit(Call("exit".to_string()));
        Ok(())
    }

    fn emit_runtime_helpers(&mut self) {
        self.emit(Literal(runtime::COOLSTRLEN.to_string()));
        self.emit(Literal(runtime::COOLOUTSTR.to_string()));
        self.emit(Literal(runtime::COOLGETSTR.to_string()));
    }

    /// Print the error line and exit(1). Call sites branch around this.
    fn emit_runtime_error(&mut self, kind: RuntimeError, line: usize) {
        self.emit(Movq(Imm(line as i64), R(Rsi)));
        self.emit(Leaq(Rip(kind.label().to_string()), R(Rdi)));
        self.emit(Movl(Imm(0), R(Eax)));
        self.emit(Call("printf".to_string()));
        self.emit(Movq(Imm(1), R(Rdi)));
        self.emit(Call("exit".to_string()));
    }

    /// `cmp $0, reg; jne past-the-stub`.
    fn emit_void_guard(&mut self, reg: Reg, kind: RuntimeError, line: usize) {
        let cont = self.labels.new_label("not_void");
        self.emit(Cmpq(Imm(0), R(reg)));
        self.emit(Jne(cont.clone()));
        self.emit_runtime_error(kind, line);
        self.emit(Label(cont));
    }

    /// Allocate a boxed object header of the given built-in class; pointer in
    /// `%rax`, vtable address through `%rdx`.
    fn emit_box(&mut self, class: &str) -> GenResult<()> {
        let id = self.class_id(class)?;
        let size = self.table.object_size(class);

        self.emit(Movq(Imm(size / 8), R(Rdi)));
        self.emit(Movq(Imm(8), R(Rsi)));
        self.emit(Call("calloc".to_string()));
        self.emit(Movq(Imm(id), Mem(0, Rax)));
        self.emit(Movq(Imm(size), Mem(8, Rax)));
        self.emit(Leaq(Rip(format!("{class}..vtable")), R(Rdx)));
        self.emit(Movq(R(Rdx), Mem(16, Rax)));
        Ok(())
    }

    fn alloc_slot(&mut self) -> asm::Operand {
        let offset = -(16 + 8 * self.slot_index as i64);
        self.slot_index += 1;
        Mem(offset, Rbp)
    }

    /// Lower one expression; the result object pointer ends up in `%rax`.
    fn expr(&mut self, expr: &Expr) -> GenResult<()> {
        let line = expr.line;

        match &expr.kind {
            ExprKind::Int { value } => {
                let value: i64 = value
                    .parse()
                    .map_err(|_| CodegenError(format!("invalid integer literal {value}")))?;
                self.emit_box("Int")?;
                self.emit(Movq(Imm(value), Mem(24, Rax)));
                Ok(())
            }
            ExprKind::Str { value } => {
                let label = self.strings.intern(value);
                let length = value.len() as i64;
                self.emit_box("String")?;
                self.emit(Leaq(Rip(label), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Imm(length), Mem(32, Rax)));
                Ok(())
            }
            ExprKind::True => {
                self.emit_box("Bool")?;
                self.emit(Movb(Imm(1), Mem(24, Rax)));
                Ok(())
            }
            ExprKind::False => {
                self.emit_box("Bool")?;
                self.emit(Movb(Imm(0), Mem(24, Rax)));
                Ok(())
            }
            ExprKind::Ident { name } => {
                if name.name == "self" {
                    self.emit(Movq(R(Rbx), R(Rax)));
                    return Ok(());
                }
                let address = self
                    .symbols
                    .find(&name.name)
                    .cloned()
                    .ok_or_else(|| CodegenError(format!("variable {} not found", name.name)))?;
                self.emit(Movq(address, R(Rax)));
                Ok(())
            }
            ExprKind::Assign { target, value } => {
                self.expr(value)?;
                let address = self
                    .symbols
                    .find(&target.name)
                    .cloned()
                    .ok_or_else(|| CodegenError(format!("variable {} not found", target.name)))?;
                self.emit(Movq(R(Rax), address));
                Ok(())
            }
            ExprKind::New { ty } => {
                if ty.name == SELF_TYPE {
                    // dispatch through vtable slot 0, the constructor
                    self.emit(Movq(Mem(16, Rbx), R(Rsi)));
                    self.emit(Movq(Mem(0, Rsi), R(R12)));
                    self.emit(CallIndirect(R12));
                } else {
                    self.emit(Call(format!("{}..new", ty.name)));
                }
                Ok(())
            }
            ExprKind::Block { body } => {
                for sub in body {
                    self.expr(sub)?;
                }
                Ok(())
            }
            ExprKind::If { predicate, then_body, else_body } => {
                let else_label = self.labels.new_label("if_else");
                let end_label = self.labels.new_label("if_end");

                self.expr(predicate)?;
                self.emit(Movzbq(Mem(24, Rax), R(Rcx)));
                self.emit(Cmpq(Imm(1), R(Rcx)));
                self.emit(Jne(else_label.clone()));
                self.expr(then_body)?;
                self.emit(Jmp(end_label.clone()));
                self.emit(Label(else_label));
                self.expr(else_body)?;
                self.emit(Label(end_label));
                Ok(())
            }
            ExprKind::While { predicate, body } => {
                let start_label = self.labels.new_label("while_start");
                let end_label = self.labels.new_label("while_end");

                self.emit(Label(start_label.clone()));
                self.expr(predicate)?;
                self.emit(Movzbq(Mem(24, Rax), R(Rcx)));
                self.emit(Cmpq(Imm(1), R(Rcx)));
                self.emit(Jne(end_label.clone()));
                self.expr(body)?;
                self.emit(Jmp(start_label));
                self.emit(Label(end_label));
                Ok(())
            }
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, line),
            ExprKind::Unary { op, operand } => self.unary(*op, operand),
            ExprKind::Let { bindings, body } => {
                let saved_slot = self.slot_index;
                self.symbols.enter_scope();

                for binding in bindings {
                    match &binding.init {
                        Some(init) => self.expr(init)?,
                        None => self.default_value(&binding.ty.name)?,
                    }
                    let slot = self.alloc_slot();
                    self.emit(Movq(R(Rax), slot.clone()));
                    self.symbols.bind(&binding.name.name, slot);
                }

                self.expr(body)?;

                self.symbols.exit_scope();
                self.slot_index = saved_slot;
                Ok(())
            }
            ExprKind::Case { scrutinee, branches } => {
                self.expr(scrutinee)?;
                self.emit_void_guard(Rax, RuntimeError::CaseVoid, line);

                let end_label = self.labels.new_label("case_end");
                let mut branch_labels = vec![];

                self.emit(Movq(Mem(0, Rax), R(Rcx)));
                for branch in branches {
                    let id = self.class_id(&branch.ty.name)?;
                    let label = self.labels.new_label("case_branch");
                    self.emit(Cmpq(Imm(id), R(Rcx)));
                    self.emit(Je(label.clone()));
                    branch_labels.push(label);
                }
                self.emit_runtime_error(RuntimeError::CaseNoMatch, line);

                for (branch, label) in branches.iter().zip(branch_labels) {
                    self.emit(Label(label));

                    let saved_slot = self.slot_index;
                    self.symbols.enter_scope();
                    let slot = self.alloc_slot();
                    self.emit(Movq(R(Rax), slot.clone()));
                    self.symbols.bind(&branch.name.name, slot);

                    self.expr(&branch.body)?;

                    self.symbols.exit_scope();
                    self.slot_index = saved_slot;
                    self.emit(Jmp(end_label.clone()));
                }
                self.emit(Label(end_label));
                Ok(())
            }
            ExprKind::DynamicDispatch { receiver, method, args } => {
                let receiver_ty = receiver.annotated_type.as_deref().unwrap_or(SELF_TYPE);
                let resolve_ty = if receiver_ty == SELF_TYPE {
                    self.current_class.clone()
                } else {
                    receiver_ty.to_string()
                };
                self.dispatch(Some(receiver.as_ref()), &resolve_ty, &method.name, args, line)
            }
            ExprKind::StaticDispatch { receiver, ty, method, args } => {
                self.dispatch(Some(receiver.as_ref()), &ty.name, &method.name, args, line)
            }
            ExprKind::SelfDispatch { method, args } => {
                let resolve_ty = self.current_class.clone();
                self.dispatch(None, &resolve_ty, &method.name, args, line)
            }
            ExprKind::Paren(inner) => self.expr(inner),
            ExprKind::Internal { name } => self.internal(name),
        }
    }

    /// Shared lowering for the three dispatch forms. `receiver` is `None`
    /// for self dispatch. Arguments are evaluated and pushed in reverse
    /// before the vtable slot is loaded into `%r12`.
    fn dispatch(
        &mut self,
        receiver: Option<&Expr>,
        resolve_ty: &str,
        method: &str,
        args: &[Expr],
        line: usize,
    ) -> GenResult<()> {
        let index = self
            .table
            .method_index(resolve_ty, method)
            .ok_or_else(|| CodegenError(format!("unknown method {method} in class {resolve_ty}")))?;
        let offset = (index as i64 + 1) * 8;

        let receiver_on_stack = receiver.is_some();
        if let Some(receiver) = receiver {
            self.expr(receiver)?;
            self.emit_void_guard(Rax, RuntimeError::DispatchVoid, line);
            self.emit(Pushq(R(Rax)));
        } else {
            self.emit_void_guard(Rbx, RuntimeError::DispatchVoid, line);
        }

        for arg in args.iter().rev() {
            self.expr(arg)?;
            self.emit(Pushq(R(Rax)));
        }

        if receiver_on_stack {
            self.emit(Movq(Mem(8 * args.len() as i64, Rsp), R(Rax)));
        } else {
            self.emit(Movq(R(Rbx), R(Rax)));
        }

        self.emit(Movq(Mem(16, Rax), R(Rsi)));
        self.emit(Movq(Mem(offset, Rsi), R(R12)));
        self.emit(Movq(R(Rax), R(Rdi)));
        self.emit(CallIndirect(R12));

        let cleanup = 8 * (args.len() as i64 + if receiver_on_stack { 1 } else { 0 });
        if cleanup > 0 {
            self.emit(Addq(Imm(cleanup), R(Rsp)));
        }
        self.emit(Movq(R(Rbx), R(Rdi)));
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, line: usize) -> GenResult<()> {
        self.expr(lhs)?;
        self.emit(Pushq(R(Rax)));
        self.expr(rhs)?;
        self.emit(Movq(Mem(24, Rax), R(Rdx)));
        self.emit(Popq(R(Rcx)));
        self.emit(Movq(Mem(24, Rcx), R(Rcx)));

        match op {
            BinaryOp::Plus => self.emit(Addq(R(Rdx), R(Rcx))),
            BinaryOp::Minus => self.emit(Subq(R(Rdx), R(Rcx))),
            BinaryOp::Times => self.emit(Imulq(R(Rdx), R(Rcx))),
            BinaryOp::Divide => {
                let cont = self.labels.new_label("div_continue");
                self.emit(Cmpq(Imm(0), R(Rdx)));
                self.emit(Jne(cont.clone()));
                self.emit_runtime_error(RuntimeError::DivisionZero, line);
                self.emit(Label(cont));
                self.emit(Movq(R(Rdx), R(Rsi)));
                self.emit(Movq(R(Rcx), R(Rax)));
                self.emit(Cqto);
                self.emit(Idivq(R(Rsi)));
                self.emit(Movq(R(Rax), R(Rcx)));
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Eq => {
                self.emit(Cmpq(R(Rdx), R(Rcx)));
                match op {
                    BinaryOp::Lt => self.emit(Setl(R(Cl))),
                    BinaryOp::Le => self.emit(Setle(R(Cl))),
                    _ => self.emit(Sete(R(Cl))),
                }
                self.emit(Movzbq(R(Cl), R(Rcx)));
            }
        }

        self.emit(Pushq(R(Rcx)));
        if op.is_arithmetic() {
            self.emit_box("Int")?;
            self.emit(Popq(R(Rcx)));
            self.emit(Movq(R(Rcx), Mem(24, Rax)));
        } else {
            self.emit_box("Bool")?;
            self.emit(Popq(R(Rcx)));
            self.emit(Movb(R(Cl), Mem(24, Rax)));
        }
        Ok(())
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr) -> GenResult<()> {
        self.expr(operand)?;

        match op {
            UnaryOp::Negate => {
                self.emit(Movq(Mem(24, Rax), R(Rcx)));
                self.emit(Negq(R(Rcx)));
                self.emit(Pushq(R(Rcx)));
                self.emit_box("Int")?;
                self.emit(Popq(R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
            }
            UnaryOp::Not => {
                self.emit(Movzbq(Mem(24, Rax), R(Rcx)));
                self.emit(Xorb(Imm(1), R(Cl)));
                self.emit(Pushq(R(Rcx)));
                self.emit_box("Bool")?;
                self.emit(Popq(R(Rcx)));
                self.emit(Movb(R(Cl), Mem(24, Rax)));
            }
            UnaryOp::IsVoid => {
                let true_label = self.labels.new_label("isvoid_true");
                let end_label = self.labels.new_label("isvoid_end");
                self.emit(Cmpq(Imm(0), R(Rax)));
                self.emit(Je(true_label.clone()));
                self.emit(Movq(Imm(0), R(Rcx)));
                self.emit(Jmp(end_label.clone()));
                self.emit(Label(true_label));
                self.emit(Movq(Imm(1), R(Rcx)));
                self.emit(Label(end_label));
                self.emit(Pushq(R(Rcx)));
                self.emit_box("Bool")?;
                self.emit(Popq(R(Rcx)));
                self.emit(Movb(R(Cl), Mem(24, Rax)));
            }
        }
        Ok(())
    }

    /// Default value for an uninitialized `let` binding.
    fn default_value(&mut self, ty: &str) -> GenResult<()> {
        match ty {
            "Int" => {
                self.emit_box("Int")?;
                self.emit(Movq(Imm(0), Mem(24, Rax)));
            }
            "Bool" => {
                self.emit_box("Bool")?;
                self.emit(Movb(Imm(0), Mem(24, Rax)));
            }
            "String" => {
                self.emit_box("String")?;
                self.emit(Leaq(Rip("the.empty.string".to_string()), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Imm(0), Mem(32, Rax)));
            }
            _ => self.emit(Call(format!("{ty}..new"))),
        }
        Ok(())
    }

    /// The hand-written bodies of the built-in methods. `self` is in `%rbx`,
    /// formals at `16 + 8*i(%rbp)`, scratch frame slots from `-16(%rbp)`
    /// down.
    fn internal(&mut self, name: &str) -> GenResult<()> {
        match name {
            "IO.out_string" => {
                self.emit(Movq(Mem(16, Rbp), R(Rsi)));
                self.emit(Movq(Mem(24, Rsi), R(Rdi)));
                self.emit(Call("cooloutstr".to_string()));
                self.emit(Movq(R(Rbx), R(Rax)));
            }
            "IO.out_int" => {
                self.emit(Movq(Mem(16, Rbp), R(Rax)));
                self.emit(Movq(Mem(24, Rax), R(Rsi)));
                self.emit(Leaq(Rip("percent.d".to_string()), R(Rdi)));
                self.emit(Movl(R(Esi), R(Eax)));
                self.emit(Cltq);
                self.emit(Movq(R(Rax), R(Rsi)));
                self.emit(Movl(Imm(0), R(Eax)));
                self.emit(Call("printf".to_string()));
                self.emit(Movq(R(Rbx), R(Rax)));
            }
            "IO.in_int" => {
                self.emit(Movq(Imm(4096), R(Rdi)));
                self.emit(Movq(Imm(1), R(Rsi)));
                self.emit(Call("calloc".to_string()));
                self.emit(Movq(R(Rax), Mem(-16, Rbp)));

                self.emit(Movq(R(Rax), R(Rdi)));
                self.emit(Movq(Imm(4096), R(Rsi)));
                self.emit(Movq(Rip("stdin".to_string()), R(Rdx)));
                self.emit(Call("fgets".to_string()));

                self.emit(Movq(Imm(0), Mem(-24, Rbp)));
                self.emit(Movq(Mem(-16, Rbp), R(Rdi)));
                self.emit(Leaq(Rip("percent.ld".to_string()), R(Rsi)));
                self.emit(Leaq(Mem(-24, Rbp), R(Rdx)));
                self.emit(Movl(Imm(0), R(Eax)));
                self.emit(Call("sscanf".to_string()));

                // out-of-range input clamps to 0
                self.emit(Movq(Mem(-24, Rbp), R(Rax)));
                self.emit(Movq(Imm(0), R(Rsi)));
                self.emit(Cmpq(Imm(2147483647), R(Rax)));
                self.emit(Cmovgq(R(Rsi), R(Rax)));
                self.emit(Cmpq(Imm(-2147483648), R(Rax)));
                self.emit(Cmovlq(R(Rsi), R(Rax)));
                self.emit(Movq(R(Rax), Mem(-24, Rbp)));

                self.emit_box("Int")?;
                self.emit(Movq(Mem(-24, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
            }
            "IO.in_string" => {
                self.emit(Movq(Imm(4096), R(Rdi)));
                self.emit(Movq(Imm(1), R(Rsi)));
                self.emit(Call("calloc".to_string()));
                self.emit(Movq(R(Rax), Mem(-16, Rbp)));

                self.emit(Movq(R(Rax), R(Rdi)));
                self.emit(Call("coolgetstr".to_string()));

                self.emit(Movq(Mem(-16, Rbp), R(Rdi)));
                self.emit(Call("coolstrlen".to_string()));
                self.emit(Movq(R(Rax), Mem(-24, Rbp)));

                self.emit_box("String")?;
                self.emit(Movq(Mem(-16, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Mem(-24, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(32, Rax)));
            }
            "Object.abort" => {
                self.emit(Leaq(Rip("abort.message".to_string()), R(Rdi)));
                self.emit(Call("cooloutstr".to_string()));
                self.emit(Movl(Imm(0), R(Edi)));
                self.emit(Call("exit".to_string()));
            }
            "Object.copy" => {
                self.emit(Movq(Mem(8, Rbx), R(Rsi)));
                self.emit(Movq(R(Rsi), Mem(-16, Rbp)));
                self.emit(Movq(Imm(1), R(Rdi)));
                self.emit(Call("calloc".to_string()));
                self.emit(Movq(R(Rax), Mem(-24, Rbp)));

                self.emit(Movq(R(Rax), R(Rdi)));
                self.emit(Movq(R(Rbx), R(Rsi)));
                self.emit(Movq(Mem(-16, Rbp), R(Rdx)));
                self.emit(Call("memcpy".to_string()));
                self.emit(Movq(Mem(-24, Rbp), R(Rax)));
            }
            "Object.type_name" => {
                self.emit(Movq(Mem(0, Rbx), R(Rax)));
                self.emit(Subq(Imm(1), R(Rax)));
                self.emit(Leaq(Rip("class_name_lookup".to_string()), R(Rcx)));
                self.emit(Movq(Indexed(Rcx, Rax, 8), R(Rdi)));
                self.emit(Movq(R(Rdi), Mem(-16, Rbp)));
                self.emit(Call("coolstrlen".to_string()));
                self.emit(Movq(R(Rax), Mem(-24, Rbp)));

                self.emit_box("String")?;
                self.emit(Movq(Mem(-16, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Mem(-24, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(32, Rax)));
            }
            "String.length" => {
                self.emit(Movq(Mem(32, Rbx), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(-16, Rbp)));
                self.emit_box("Int")?;
                self.emit(Movq(Mem(-16, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
            }
            "String.concat" => {
                self.emit(Movq(Mem(32, Rbx), R(Rcx)));
                self.emit(Movq(Mem(16, Rbp), R(Rdx)));
                self.emit(Movq(Mem(32, Rdx), R(Rdx)));
                self.emit(Addq(R(Rcx), R(Rdx)));
                self.emit(Movq(R(Rdx), Mem(-16, Rbp)));

                self.emit(Addq(Imm(1), R(Rdx)));
                self.emit(Movq(Imm(1), R(Rdi)));
                self.emit(Movq(R(Rdx), R(Rsi)));
                self.emit(Call("calloc".to_string()));
                self.emit(Movq(R(Rax), Mem(-24, Rbp)));

                self.emit(Movq(R(Rax), R(Rdi)));
                self.emit(Movq(Mem(24, Rbx), R(Rsi)));
                self.emit(Movq(Mem(32, Rbx), R(Rdx)));
                self.emit(Call("memcpy".to_string()));

                self.emit(Movq(Mem(-24, Rbp), R(Rdi)));
                self.emit(Addq(Mem(32, Rbx), R(Rdi)));
                self.emit(Movq(Mem(16, Rbp), R(Rax)));
                self.emit(Movq(Mem(24, Rax), R(Rsi)));
                self.emit(Movq(Mem(32, Rax), R(Rdx)));
                self.emit(Call("memcpy".to_string()));

                self.emit_box("String")?;
                self.emit(Movq(Mem(-24, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Mem(-16, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(32, Rax)));
            }
            "String.substr" => {
                let empty = self.labels.new_label("substr_empty");
                let start_ok = self.labels.new_label("substr_start_ok");
                let len_ok = self.labels.new_label("substr_len_ok");
                let done = self.labels.new_label("substr_done");

                self.emit(Movq(Mem(24, Rbx), R(Rcx)));
                self.emit(Movq(Mem(32, Rbx), R(R8)));
                self.emit(Movq(Mem(16, Rbp), R(Rsi)));
                self.emit(Movq(Mem(24, Rsi), R(Rsi)));
                self.emit(Movq(Mem(24, Rbp), R(Rdx)));
                self.emit(Movq(Mem(24, Rdx), R(Rdx)));

                // negative start counts back from the end
                self.emit(Cmpq(Imm(0), R(Rsi)));
                self.emit(Jge(start_ok.clone()));
                self.emit(Addq(R(R8), R(Rsi)));
                self.emit(Cmpq(Imm(0), R(Rsi)));
                self.emit(Jl(empty.clone()));
                self.emit(Label(start_ok));

                self.emit(Cmpq(Imm(0), R(Rdx)));
                self.emit(Jle(empty.clone()));
                self.emit(Cmpq(R(R8), R(Rsi)));
                self.emit(Jge(empty.clone()));

                // clamp the length to what is available
                self.emit(Movq(R(R8), R(Rax)));
                self.emit(Subq(R(Rsi), R(Rax)));
                self.emit(Cmpq(R(Rax), R(Rdx)));
                self.emit(Jle(len_ok.clone()));
                self.emit(Movq(R(Rax), R(Rdx)));
                self.emit(Label(len_ok));

                self.emit(Leaq(Indexed(Rcx, Rsi, 1), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(-16, Rbp)));
                self.emit(Movq(R(Rdx), Mem(-24, Rbp)));

                self.emit(Addq(Imm(1), R(Rdx)));
                self.emit(Movq(Imm(1), R(Rdi)));
                self.emit(Movq(R(Rdx), R(Rsi)));
                self.emit(Call("calloc".to_string()));
                self.emit(Movq(R(Rax), Mem(-32, Rbp)));

                self.emit(Movq(R(Rax), R(Rdi)));
                self.emit(Movq(Mem(-16, Rbp), R(Rsi)));
                self.emit(Movq(Mem(-24, Rbp), R(Rdx)));
                self.emit(Call("memcpy".to_string()));

                self.emit_box("String")?;
                self.emit(Movq(Mem(-32, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Mem(-24, Rbp), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(32, Rax)));
                self.emit(Jmp(done.clone()));

                self.emit(Label(empty));
                self.emit_box("String")?;
                self.emit(Leaq(Rip("the.empty.string".to_string()), R(Rcx)));
                self.emit(Movq(R(Rcx), Mem(24, Rax)));
                self.emit(Movq(Imm(0), Mem(32, Rax)));
                self.emit(Label(done));
            }
            other => {
                return Err(CodegenError(format!("internal method {other} not implemented")));
            }
        }
        Ok(())
    }
}

/// Maximum number of `let`/`case` frame slots live at once in a body.
fn frame_slots(expr: &Expr) -> usize {
    match &expr.kind {
        ExprKind::Let { bindings, body } => {
            let mut worst = bindings.len() + frame_slots(body);
            for (depth, binding) in bindings.iter().enumerate() {
                if let Some(init) = &binding.init {
                    worst = worst.max(depth + frame_slots(init));
                }
            }
            worst
        }
        ExprKind::Case { scrutinee, branches } => {
            let branches_worst = branches
                .iter()
                .map(|b| 1 + frame_slots(&b.body))
                .max()
                .unwrap_or(0);
            frame_slots(scrutinee).max(branches_worst)
        }
        ExprKind::Assign { value, .. } => frame_slots(value),
        ExprKind::DynamicDispatch { receiver, args, .. }
        | ExprKind::StaticDispatch { receiver, args, .. } => args
            .iter()
            .map(frame_slots)
            .max()
            .unwrap_or(0)
            .max(frame_slots(receiver)),
        ExprKind::SelfDispatch { args, .. } => args.iter().map(frame_slots).max().unwrap_or(0),
        ExprKind::If { predicate, then_body, else_body } => frame_slots(predicate)
            .max(frame_slots(then_body))
            .max(frame_slots(else_body)),
        ExprKind::While { predicate, body } => frame_slots(predicate).max(frame_slots(body)),
        ExprKind::Block { body } => body.iter().map(frame_slots).max().unwrap_or(0),
        ExprKind::Binary { lhs, rhs, .. } => frame_slots(lhs).max(frame_slots(rhs)),
        ExprKind::Unary { operand, .. } => frame_slots(operand),
        ExprKind::Paren(inner) => frame_slots(inner),
        ExprKind::Internal { .. } => INTERNAL_SLOTS,
        ExprKind::New { .. }
        | ExprKind::Ident { .. }
        | ExprKind::Int { .. }
        | ExprKind::Str { .. }
        | ExprKind::True
        | ExprKind::False => 0,
    }
}

/// Bytes to subtract from `%rsp` after the prologue pushes: room for every
/// slot, padded so calls see a 16-byte aligned stack.
fn frame_bytes(slots: usize) -> i64 {
    8 * (slots as i64 + 1 + (slots as i64 % 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::SemanticAnalyzer;
    use crate::ast::AstReader;

    fn generate(cl_ast: &str) -> String {
        let program = AstReader::new(cl_ast.as_bytes()).read_program().unwrap();
        let output = SemanticAnalyzer::check(program).unwrap().write_output();
        let (table, _) = TypedAstReader::read(output.as_bytes()).unwrap();
        CodeGenerator::new(table).generate().unwrap()
    }

    const HELLO_AST: &str = "1\n\
                             1\nMain\ninherits\n1\nIO\n\
                             1\n\
                             method\n2\nmain\n0\n2\nObject\n\
                             3\nself_dispatch\n3\nout_string\n1\n3\nstring\nhello\\n\n";

    #[test]
    fn test_hello_assembly_landmarks() {
        let asm = generate(HELLO_AST);

        for landmark in [
            ".section .data",
            ".section .text",
            ".section .rodata",
            "Main..vtable:",
            "    .quad Main..new",
            "    .quad Main.main",
            "    .quad IO.out_string",
            "class_name_lookup:",
            "Main..new:",
            "Main.main:",
            "start:",
            "    jmp main",
            "    call Main..new",
            "    call Main.main",
            "coolstrlen:",
            "cooloutstr:",
            "coolgetstr:",
            "string0:",
            "ERROR_dispatch_void:",
            "the.empty.string:",
        ] {
            assert!(asm.contains(landmark), "missing landmark: {landmark}");
        }
    }

    #[test]
    fn test_every_indirect_call_is_guarded() {
        let asm = generate(HELLO_AST);

        let dispatches = asm.matches("call *%r12").count();
        let guards = asm.matches("ERROR_dispatch_void(%rip)").count();
        assert!(dispatches > 0);
        // one guard per dispatch site (the rodata label itself is filtered
        // out by matching the rip-relative operand)
        assert_eq!(dispatches, guards);
    }

    #[test]
    fn test_string_literals_keep_escapes_as_bytes() {
        let asm = generate(HELLO_AST);

        // "hello\n" arrives with a literal backslash-n, emitted as bytes 92
        // and 110 for the runtime writer to interpret
        assert!(asm.contains("    .byte 92"));
        assert!(asm.contains("    .byte 110"));
    }

    #[test]
    fn test_frame_slot_computation() {
        use crate::ast::{Expr, ExprKind, Identifier, LetBinding};

        let int = |v: &str| Expr::new(1, ExprKind::Int { value: v.into() });
        let inner_let = Expr::new(
            1,
            ExprKind::Let {
                bindings: vec![LetBinding {
                    name: Identifier::new(1, "y"),
                    ty: Identifier::new(1, "Int"),
                    init: Some(int("1")),
                }],
                body: Box::new(int("2")),
            },
        );
        let outer = Expr::new(
            1,
            ExprKind::Let {
                bindings: vec![
                    LetBinding {
                        name: Identifier::new(1, "a"),
                        ty: Identifier::new(1, "Int"),
                        init: None,
                    },
                    LetBinding {
                        name: Identifier::new(1, "b"),
                        ty: Identifier::new(1, "Int"),
                        init: None,
                    },
                ],
                body: Box::new(inner_let),
            },
        );

        assert_eq!(3, frame_slots(&outer));
        assert_eq!(0, frame_slots(&int("1")));
    }

    #[test]
    fn test_frame_bytes_alignment() {
        // entry pushes leave %rsp 8 short of alignment, so the reserve must
        // be 8 mod 16 and cover every slot
        for slots in 0..6 {
            let bytes = frame_bytes(slots);
            assert_eq!(8, bytes % 16, "slots={slots}");
            assert!(bytes >= 8 * slots as i64);
        }
    }
}
