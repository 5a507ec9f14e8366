//! Parser stage: `<file>.cl-lex` -> `<file>.cl-ast`.
use std::{fs::File, io::BufReader, path::PathBuf, process::exit};

use clap::Parser as CliParser;
use log::info;

use cool_lang::ast::AstWriter;
use cool_lang::cli::{stage_output_path, LogLevel};
use cool_lang::parser::Parser;
use cool_lang::tokens::read_tokens;

#[derive(CliParser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The pre-lexed token file.
    #[arg(index = 1)]
    file: PathBuf,

    /// Log level of the stage.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    verbosity: LogLevel,

    /// Dump the parsed AST as JSON to stderr.
    #[arg(long)]
    dump_ast: bool,
}

fn main() {
    let args = Cli::parse();
    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    let output_path = match stage_output_path(&args.file, ".cl-lex", ".cl-ast") {
        Ok(path) => path,
        Err(message) => {
            println!("ERROR: {message}");
            exit(1);
        }
    };

    info!("parsing '{}'", args.file.to_string_lossy());

    let input = match File::open(&args.file) {
        Ok(file) => BufReader::new(file),
        Err(e) => {
            println!("ERROR: could not open '{}': {e}", args.file.to_string_lossy());
            exit(1);
        }
    };

    let tokens = match read_tokens(input) {
        Ok(tokens) => tokens,
        Err(e) => {
            println!("ERROR: {e}");
            exit(1);
        }
    };

    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(e) => {
            println!("{e}");
            exit(1);
        }
    };

    if args.dump_ast {
        eprintln!("{}", serde_json::to_string_pretty(&program).unwrap());
    }

    if let Err(e) = std::fs::write(&output_path, AstWriter::write_program(&program)) {
        println!("ERROR: could not write '{}': {e}", output_path.to_string_lossy());
        exit(1);
    }

    info!("wrote '{}'", output_path.to_string_lossy());
}
