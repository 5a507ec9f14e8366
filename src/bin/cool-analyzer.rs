//! Semantic analysis stage: `<file>.cl-ast` -> `<file>.cl-type`.
use std::{fs::File, io::BufReader, path::PathBuf, process::exit};

use clap::Parser as CliParser;
use log::info;

use cool_lang::analyzer::SemanticAnalyzer;
use cool_lang::ast::AstReader;
use cool_lang::cli::{stage_output_path, LogLevel};

#[derive(CliParser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The serialized AST file.
    #[arg(index = 1)]
    file: PathBuf,

    /// Log level of the stage.
    #[arg(value_enum, short, long, default_value_t = LogLevel::default())]
    verbosity: LogLevel,

    /// Dump the annotated AST as JSON to stderr.
    #[arg(long)]
    dump_ast: bool,
}

fn main() {
    let args = Cli::parse();
    simple_logger::init_with_level((&args.verbosity).into()).unwrap();

    let output_path = match stage_output_path(&args.file, ".cl-ast", ".cl-type") {
        Ok(path) => path,
        Err(message) => {
            println!("ERROR: {message}");
            exit(1);
        }
    };

    info!("analyzing '{}'", args.file.to_string_lossy());

    let input = match File::open(&args.file) {
        Ok(file) => BufReader::new(file),
        Err(e) => {
            println!("ERROR: could not open '{}': {e}", args.file.to_string_lossy());
            exit(1);
        }
    };

    let program = match AstReader::new(input).read_program() {
        Ok(program) => program,
        Err(e) => {
            println!("ERROR: {e}");
            exit(1);
        }
    };

    let analyzer = match SemanticAnalyzer::check(program) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            println!("{e}");
            exit(1);
        }
    };

    if args.dump_ast {
        eprintln!("{}", serde_json::to_string_pretty(analyzer.program()).unwrap());
    }

    if let Err(e) = std::fs::write(&output_path, analyzer.write_output()) {
        println!("ERROR: could not write '{}': {e}", output_path.to_string_lossy());
        exit(1);
    }

    info!("wrote '{}'", output_path.to_string_lossy());
}
