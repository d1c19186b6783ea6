use crate::exec::Interpreter;
use crate::lexer::Token;
use clap::Parser;
use log::debug;
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

mod asm;
mod exec;
mod ir;
mod lexer;
mod parser;

#[derive(Parser)]
#[command(about = "an interpreter for the whitespace programming language")]
struct Args {
    /// whitespace source file; reads standard input when omitted
    file: Option<PathBuf>,
    /// treat the source as an assembly listing instead of whitespace
    #[arg(long)]
    asm: bool,
    /// dump the token stream and the decoded program before running
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let level = if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Warn
    };
    simple_logger::init_with_level(level)?;

    let source = match &args.file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let program = if args.asm {
        asm::parse_assembly(&source)?
    } else {
        let tokens = lexer::tokenize(&source);
        debug!("lexed {} significant tokens", tokens.len());
        if args.verbose {
            print_tokens(&tokens);
        }
        parser::decode(&tokens)?
    };
    debug!("decoded {} instructions", program.len());
    if args.verbose {
        for instruction in &program {
            println!("{instruction}");
        }
    }

    let mut interpreter = Interpreter::new(program, io::stdin().lock(), io::stdout().lock());
    interpreter.run()?;
    debug!("execution finished");
    Ok(())
}

fn print_tokens(tokens: &[Token]) {
    for token in tokens {
        match token {
            Token::Space => print!("S "),
            Token::Tab => print!("T "),
            Token::Linefeed => println!("LF"),
        }
    }
    println!();
}
