use std::{error::Error, path::Path};

use test_utils::{prepare_fixture, run_stage, run_stage_ok, Expected};

const PARSER: &str = env!("CARGO_BIN_EXE_cool-parser");
const ANALYZER: &str = env!("CARGO_BIN_EXE_cool-analyzer");

#[test]
fn parse_error_aborts_with_diagnostic() -> Result<(), Box<dyn Error>> {
    let input = prepare_fixture(Path::new("./tests/fixtures/parse-error.cl-lex"))?;

    let output = run_stage(PARSER, &input)?;
    Expected {
        stdout: "ERROR: 2: Parser: parse error near semi\n",
        success: false,
    }
    .assert_matches(&output);

    Ok(())
}

#[test]
fn inheritance_cycle_is_reported_at_line_zero() -> Result<(), Box<dyn Error>> {
    let input = prepare_fixture(Path::new("./tests/fixtures/cycle.cl-lex"))?;
    let (ast_path, _) = run_stage_ok(PARSER, &input, ".cl-lex", ".cl-ast")?;

    let output = run_stage(ANALYZER, &ast_path)?;
    Expected {
        stdout: "ERROR: 0: Type-Check: inheritance cycle: B A\n",
        success: false,
    }
    .assert_matches(&output);

    Ok(())
}

#[test]
fn override_with_extra_formal_is_rejected() -> Result<(), Box<dyn Error>> {
    let input = prepare_fixture(Path::new("./tests/fixtures/override.cl-lex"))?;
    let (ast_path, _) = run_stage_ok(PARSER, &input, ".cl-lex", ".cl-ast")?;

    let output = run_stage(ANALYZER, &ast_path)?;
    Expected {
        stdout: "ERROR: 5: Type-Check: overriding method f has different formals\n",
        success: false,
    }
    .assert_matches(&output);

    Ok(())
}
