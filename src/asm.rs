use crate::ir::{Instruction, Program};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Assembly listing failures. `line` counts from one, the way editors do.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AsmError {
    UnknownMnemonic {
        line: usize
    },
    MissingArgument {
        line: usize
    },
    UnexpectedArgument {
        line: usize
    },
    BadArgument {
        line: usize
    },
}

impl Display for AsmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for AsmError {}

/// Parses the listing format [`Instruction`]'s `Display` prints: one
/// instruction per line, argument-taking mnemonics followed by a decimal
/// argument. Blank lines are skipped and mnemonics match in any case.
pub fn parse_assembly(source: &str) -> Result<Program, AsmError> {
    let mut program = Program::new();
    for (index, text) in source.lines().enumerate() {
        let line = index + 1;
        let mut parts = text.split_whitespace();
        let mnemonic = match parts.next() {
            Some(word) => word.to_ascii_uppercase(),
            None => continue,
        };
        let argument = parts.next();
        if parts.next().is_some() {
            return Err(AsmError::UnexpectedArgument { line });
        }
        let instruction = match mnemonic.as_str() {
            "PUSH" => Instruction::Push(number(argument, line)?),
            "COPY" => Instruction::Copy(number(argument, line)?),
            "SLIDE" => Instruction::Slide(number(argument, line)?),
            "MARK" => Instruction::Mark(number(argument, line)?),
            "CALL" => Instruction::Call(number(argument, line)?),
            "JUMP" => Instruction::Jump(number(argument, line)?),
            "JUMPZERO" => Instruction::JumpZero(number(argument, line)?),
            "JUMPNEG" => Instruction::JumpNeg(number(argument, line)?),
            "DUP" => bare(Instruction::Dup, argument, line)?,
            "SWAP" => bare(Instruction::Swap, argument, line)?,
            "DISCARD" => bare(Instruction::Discard, argument, line)?,
            "ADD" => bare(Instruction::Add, argument, line)?,
            "SUB" => bare(Instruction::Sub, argument, line)?,
            "MUL" => bare(Instruction::Mul, argument, line)?,
            "DIV" => bare(Instruction::Div, argument, line)?,
            "MOD" => bare(Instruction::Mod, argument, line)?,
            "STORE" => bare(Instruction::Store, argument, line)?,
            "RETRIEVE" => bare(Instruction::Retrieve, argument, line)?,
            "ENDSUB" => bare(Instruction::EndSub, argument, line)?,
            "ENDPROG" => bare(Instruction::EndProg, argument, line)?,
            "WRITEC" => bare(Instruction::WriteChar, argument, line)?,
            "WRITEN" => bare(Instruction::WriteNum, argument, line)?,
            "READC" => bare(Instruction::ReadChar, argument, line)?,
            "READN" => bare(Instruction::ReadNum, argument, line)?,
            _ => return Err(AsmError::UnknownMnemonic { line }),
        };
        program.push(instruction);
    }
    Ok(program)
}

fn number(argument: Option<&str>, line: usize) -> Result<i64, AsmError> {
    match argument {
        Some(text) => text
            .parse::<i64>()
            .map_err(|_| AsmError::BadArgument { line }),
        None => Err(AsmError::MissingArgument { line }),
    }
}

fn bare(
    instruction: Instruction,
    argument: Option<&str>,
    line: usize,
) -> Result<Instruction, AsmError> {
    match argument {
        Some(_) => Err(AsmError::UnexpectedArgument { line }),
        None => Ok(instruction),
    }
}
