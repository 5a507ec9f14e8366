//! x86-64 assembly model, printed in AT&T syntax.
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rsp,
    Rbp,
    R8,
    R9,
    R12,
    Eax,
    Esi,
    Edi,
    Edx,
    Al,
    Cl,
    Dl,
}

impl Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Reg::Rax => "%rax",
            Reg::Rbx => "%rbx",
            Reg::Rcx => "%rcx",
            Reg::Rdx => "%rdx",
            Reg::Rsi => "%rsi",
            Reg::Rdi => "%rdi",
            Reg::Rsp => "%rsp",
            Reg::Rbp => "%rbp",
            Reg::R8 => "%r8",
            Reg::R9 => "%r9",
            Reg::R12 => "%r12",
            Reg::Eax => "%eax",
            Reg::Esi => "%esi",
            Reg::Edi => "%edi",
            Reg::Edx => "%edx",
            Reg::Al => "%al",
            Reg::Cl => "%cl",
            Reg::Dl => "%dl",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    /// `disp(%reg)`
    Mem(i64, Reg),
    /// `label(%rip)`
    Rip(String),
    /// `(%base, %index, scale)`
    Indexed(Reg, Reg, u8),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm(value) => write!(f, "${value}"),
            Operand::Mem(0, reg) => write!(f, "({reg})"),
            Operand::Mem(disp, reg) => write!(f, "{disp}({reg})"),
            Operand::Rip(label) => write!(f, "{label}(%rip)"),
            Operand::Indexed(base, index, scale) => write!(f, "({base}, {index}, {scale})"),
        }
    }
}

/// One output line. Source operands come first, as in the emitted syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Label(String),
    Comment(String),
    /// A raw assembler directive, e.g. `.globl main` or `.quad foo`.
    Directive(String),
    Movq(Operand, Operand),
    Movb(Operand, Operand),
    Movl(Operand, Operand),
    Movzbq(Operand, Operand),
    Leaq(Operand, Operand),
    Addq(Operand, Operand),
    Subq(Operand, Operand),
    Imulq(Operand, Operand),
    Idivq(Operand),
    Cqto,
    Cltq,
    Negq(Operand),
    Xorq(Operand, Operand),
    Xorb(Operand, Operand),
    Cmpq(Operand, Operand),
    Cmpb(Operand, Operand),
    Sete(Operand),
    Setl(Operand),
    Setle(Operand),
    Cmovgq(Operand, Operand),
    Cmovlq(Operand, Operand),
    Jmp(String),
    Je(String),
    Jne(String),
    Jl(String),
    Jle(String),
    Jge(String),
    Call(String),
    CallIndirect(Reg),
    Pushq(Operand),
    Popq(Operand),
    Incq(Operand),
    Ret,
    /// A pre-rendered block of assembly, used for the fixed runtime helpers.
    Literal(String),
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;
        match self {
            Label(label) => write!(f, "{label}:"),
            Comment(text) => write!(f, "    # {text}"),
            Directive(text) => write!(f, "{text}"),
            Movq(src, dst) => write!(f, "    movq {src}, {dst}"),
            Movb(src, dst) => write!(f, "    movb {src}, {dst}"),
            Movl(src, dst) => write!(f, "    movl {src}, {dst}"),
            Movzbq(src, dst) => write!(f, "    movzbq {src}, {dst}"),
            Leaq(src, dst) => write!(f, "    leaq {src}, {dst}"),
            Addq(src, dst) => write!(f, "    addq {src}, {dst}"),
            Subq(src, dst) => write!(f, "    subq {src}, {dst}"),
            Imulq(src, dst) => write!(f, "    imulq {src}, {dst}"),
            Idivq(src) => write!(f, "    idivq {src}"),
            Cqto => write!(f, "    cqto"),
            Cltq => write!(f, "    cltq"),
            Negq(dst) => write!(f, "    negq {dst}"),
            Xorq(src, dst) => write!(f, "    xorq {src}, {dst}"),
            Xorb(src, dst) => write!(f, "    xorb {src}, {dst}"),
            Cmpq(src, dst) => write!(f, "    cmpq {src}, {dst}"),
            Cmpb(src, dst) => write!(f, "    cmpb {src}, {dst}"),
            Sete(dst) => write!(f, "    sete {dst}"),
            Setl(dst) => write!(f, "    setl {dst}"),
            Setle(dst) => write!(f, "    setle {dst}"),
            Cmovgq(src, dst) => write!(f, "    cmovgq {src}, {dst}"),
            Cmovlq(src, dst) => write!(f, "    cmovlq {src}, {dst}"),
            Jmp(label) => write!(f, "    jmp {label}"),
            Je(label) => write!(f, "    je {label}"),
            Jne(label) => write!(f, "    jne {label}"),
            Jl(label) => write!(f, "    jl {label}"),
            Jle(label) => write!(f, "    jle {label}"),
            Jge(label) => write!(f, "    jge {label}"),
            Call(label) => write!(f, "    call {label}"),
            CallIndirect(reg) => write!(f, "    call *{reg}"),
            Pushq(src) => write!(f, "    pushq {src}"),
            Popq(dst) => write!(f, "    popq {dst}"),
            Incq(dst) => write!(f, "    incq {dst}"),
            Ret => write!(f, "    ret"),
            Literal(block) => write!(f, "{block}"),
        }
    }
}
