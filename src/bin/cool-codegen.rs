//! Code generation stage: `<file>.cl-type` -> `<file>.s`.
use std::{fs::File, io::BufReader, path::PathBuf, process::exit};

use clap::Parser as CliParser;
use log::info;

use cool_lang::cli::{stage_output_path, LogLevel};
use cool_lang::codegen::{CodeGenerator, TypedAstReader};

#[derive(CliParser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// The type-checked interchange file.
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

    let output_path = match stage_output_path(&args.file, ".cl-type", ".s") {
        Ok(path) => path,
        Err(message) => {
            println!("ERROR: {message}");
            exit(1);
        }
    };

    info!("generating code for '{}'", args.file.to_string_lossy());

    let input = match File::open(&args.file) {
        Ok(file) => BufReader::new(file),
        Err(e) => {
            println!("ERROR: could not open '{}': {e}", args.file.to_string_lossy());
            exit(1);
        }
    };

    let (table, program) = match TypedAstReader::read(input) {
        Ok(result) => result,
        Err(e) => {
            println!("ERROR: {e}");
            exit(1);
        }
    };

    if args.dump_ast {
        eprintln!("{}", serde_json::to_string_pretty(&program).unwrap());
    }

    let assembly = match CodeGenerator::new(table).generate() {
        Ok(assembly) => assembly,
        Err(e) => {
            println!("ERROR: {e}");
            exit(1);
        }
    };

    if let Err(e) = std::fs::write(&output_path, assembly) {
        println!("ERROR: could not write '{}': {e}", output_path.to_string_lossy());
        exit(1);
    }

    info!("wrote '{}'", output_path.to_string_lossy());
}
