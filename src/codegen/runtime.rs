//! Fixed runtime pieces: the error stub kinds and the assembly bodies of the
//! `cool*` helper functions emitted into every output file.

/// The runtime error kinds. Each gets a format-string label in `.rodata` and
/// inline guard stubs at the sites that can raise it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    DispatchVoid,
    DivisionZero,
    CaseNoMatch,
    CaseVoid,
}

impl RuntimeError {
    pub const ALL: [RuntimeError; 4] = [
        RuntimeError::DispatchVoid,
        RuntimeError::DivisionZero,
        RuntimeError::CaseNoMatch,
        RuntimeError::CaseVoid,
    ];

    /// The label of the printf format string for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            RuntimeError::DispatchVoid => "ERROR_dispatch_void",
            RuntimeError::DivisionZero => "ERROR_division_zero",
            RuntimeError::CaseNoMatch => "ERROR_case_no_match",
            RuntimeError::CaseVoid => "ERROR_case_void",
        }
    }

    /// The kind text interpolated into `ERROR: %d: Exception: <kind>`.
    pub fn message(&self) -> &'static str {
        match self {
            RuntimeError::DispatchVoid => "dispatch void",
            RuntimeError::DivisionZero => "division zero",
            RuntimeError::CaseNoMatch => "case no match",
            RuntimeError::CaseVoid => "case void",
        }
    }
}

/// `coolstrlen(char*) -> length in %rax`. A NUL-scan loop.
pub const COOLSTRLEN: &str = "\
.globl coolstrlen
.type coolstrlen, @function
coolstrlen:
    xorq %rax, %rax
.Lcoolstrlen_loop:
    cmpb $0, (%rdi, %rax, 1)
    je .Lcoolstrlen_done
    incq %rax
    jmp .Lcoolstrlen_loop
.Lcoolstrlen_done:
    ret";

/// `cooloutstr(char*)`: writes the string to stdout, turning the two-byte
/// sequences `\\n` and `\\t` into newline and tab, then flushes.
pub const COOLOUTSTR: &str = "\
.globl cooloutstr
.type cooloutstr, @function
cooloutstr:
    pushq %rbp
    movq %rsp, %rbp
    pushq %rbx
    subq $8, %rsp
    movq %rdi, %rbx
.Lcooloutstr_loop:
    movzbq (%rbx), %rax
    cmpb $0, %al
    je .Lcooloutstr_flush
    cmpb $92, %al
    jne .Lcooloutstr_putc
    movzbq 1(%rbx), %rcx
    cmpb $110, %cl
    je .Lcooloutstr_newline
    cmpb $116, %cl
    je .Lcooloutstr_tab
.Lcooloutstr_putc:
    movsbl %al, %edi
    movq stdout(%rip), %rsi
    call fputc
    incq %rbx
    jmp .Lcooloutstr_loop
.Lcooloutstr_newline:
    movl $10, %edi
    movq stdout(%rip), %rsi
    call fputc
    addq $2, %rbx
    jmp .Lcooloutstr_loop
.Lcooloutstr_tab:
    movl $9, %edi
    movq stdout(%rip), %rsi
    call fputc
    addq $2, %rbx
    jmp .Lcooloutstr_loop
.Lcooloutstr_flush:
    movq stdout(%rip), %rdi
    call fflush
    addq $8, %rsp
    popq %rbx
    popq %rbp
    ret";

/// `coolgetstr(char* buffer)`: reads stdin into the buffer up to newline or
/// EOF and NUL-terminates it.
pub const COOLGETSTR: &str = "\
.globl coolgetstr
.type coolgetstr, @function
coolgetstr:
    pushq %rbp
    movq %rsp, %rbp
    pushq %rbx
    subq $8, %rsp
    movq %rdi, %rbx
.Lcoolgetstr_loop:
    movq stdin(%rip), %rdi
    call fgetc
    cmpl $-1, %eax
    je .Lcoolgetstr_done
    cmpl $10, %eax
    je .Lcoolgetstr_done
    movb %al, (%rbx)
    incq %rbx
    jmp .Lcoolgetstr_loop
.Lcoolgetstr_done:
    movb $0, (%rbx)
    addq $8, %rsp
    popq %rbx
    popq %rbp
    ret";
