use std::{error::Error, path::Path};

use test_utils::{prepare_fixture, run_stage_ok};

const PARSER: &str = env!("CARGO_BIN_EXE_cool-parser");
const ANALYZER: &str = env!("CARGO_BIN_EXE_cool-analyzer");
const CODEGEN: &str = env!("CARGO_BIN_EXE_cool-codegen");

#[test]
fn compile_hello() -> Result<(), Box<dyn Error>> {
    let input = prepare_fixture(Path::new("./tests/fixtures/hello.cl-lex"))?;

    let (ast_path, ast) = run_stage_ok(PARSER, &input, ".cl-lex", ".cl-ast")?;
    let expected = std::fs::read_to_string("./tests/fixtures/hello.expected.cl-ast")?;
    assert_eq!(expected, ast);

    let (type_path, typed) = run_stage_ok(ANALYZER, &ast_path, ".cl-ast", ".cl-type")?;
    assert!(typed.starts_with("class_map\n6\n"), "{typed}");
    assert!(typed.contains("implementation_map\n6\n"));
    assert!(typed.contains("parent_map\n5\n"));
    assert!(typed.contains("Main\nIO\n"));

    let (_, asm) = run_stage_ok(CODEGEN, &type_path, ".cl-type", ".s")?;
    for landmark in [
        "start:",
        "Main..vtable:",
        "    .quad Main..new",
        "    .quad IO.out_string",
        "Main..new:",
        "    call *%r12",
        "cooloutstr:",
        "class_name_lookup:",
    ] {
        assert!(asm.contains(landmark), "missing landmark: {landmark}");
    }

    Ok(())
}

#[test]
fn compile_arithmetic_and_case() -> Result<(), Box<dyn Error>> {
    let input = prepare_fixture(Path::new("./tests/fixtures/arith.cl-lex"))?;

    let (ast_path, _) = run_stage_ok(PARSER, &input, ".cl-lex", ".cl-ast")?;
    let (type_path, _) = run_stage_ok(ANALYZER, &ast_path, ".cl-ast", ".cl-type")?;
    let (_, asm) = run_stage_ok(CODEGEN, &type_path, ".cl-type", ".s")?;

    // the division guard branches around its error stub
    assert!(asm.contains("ERROR_division_zero(%rip)"));
    assert!(asm.contains("    idivq %rsi"));

    // case compares the object id against the alphabetical class ids:
    // Int is 3, Object is 5
    assert!(asm.contains("    cmpq $3, %rcx"));
    assert!(asm.contains("    cmpq $5, %rcx"));
    assert!(asm.contains("ERROR_case_no_match(%rip)"));
    assert!(asm.contains("ERROR_case_void(%rip)"));

    // let binding lands in the first frame slot below the saved register
    assert!(asm.contains("-16(%rbp)"));

    Ok(())
}
