use crate::ir::{Instruction, Program};
use crate::lexer::Token;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The shortest complete instructions are three tokens long, so anything
/// shorter cannot hold a program at all.
pub const MIN_PROGRAM_TOKENS: usize = 3;

/// Decode failures. `pos` is the index into the token sequence just past
/// the point where decoding stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnreachableToken {
        pos: usize
    },
    NoNumericArgument {
        pos: usize
    },
    NoLabelArgument {
        pos: usize
    },
    PrematureEnd {
        pos: usize
    },
    // the three-token alphabet leaves no way to reach this one
    #[allow(dead_code)]
    UndefinedSign {
        pos: usize
    },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for ParseError {}

/// Instruction families, selected by the first one or two tokens of every
/// instruction. Transient: picked per instruction and never stored.
enum Imp {
    Stack,
    Arithmetic,
    Heap,
    Flow,
    Io,
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Cursor<'a> {
        Cursor { tokens, pos: 0 }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

/// Decodes a token stream into a program in a single forward pass.
///
/// Streams shorter than [`MIN_PROGRAM_TOKENS`] cannot contain a complete
/// instruction and decode to the empty program rather than an error.
pub fn decode(tokens: &[Token]) -> Result<Program, ParseError> {
    if tokens.len() < MIN_PROGRAM_TOKENS {
        return Ok(Program::new());
    }
    let mut cursor = Cursor::new(tokens);
    let mut program = Program::new();
    while !cursor.at_end() {
        let instruction = match imp(&mut cursor)? {
            Imp::Stack => stack_manip(&mut cursor)?,
            Imp::Arithmetic => arithmetic(&mut cursor)?,
            Imp::Heap => heap_access(&mut cursor)?,
            Imp::Flow => flow_control(&mut cursor)?,
            Imp::Io => io_op(&mut cursor)?,
        };
        program.push(instruction);
    }
    Ok(program)
}

fn imp(cursor: &mut Cursor) -> Result<Imp, ParseError> {
    match cursor.next() {
        Some(Token::Space) => Ok(Imp::Stack),
        Some(Token::Linefeed) => Ok(Imp::Flow),
        Some(Token::Tab) => match cursor.next() {
            Some(Token::Space) => Ok(Imp::Arithmetic),
            Some(Token::Tab) => Ok(Imp::Heap),
            Some(Token::Linefeed) => Ok(Imp::Io),
            None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
    }
}

fn stack_manip(cursor: &mut Cursor) -> Result<Instruction, ParseError> {
    match cursor.next() {
        Some(Token::Space) => Ok(Instruction::Push(number(cursor)?)),
        Some(Token::Tab) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::Copy(number(cursor)?)),
            Some(Token::Linefeed) => Ok(Instruction::Slide(number(cursor)?)),
            _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        Some(Token::Linefeed) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::Dup),
            Some(Token::Tab) => Ok(Instruction::Swap),
            Some(Token::Linefeed) => Ok(Instruction::Discard),
            None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
    }
}

fn arithmetic(cursor: &mut Cursor) -> Result<Instruction, ParseError> {
    match cursor.next() {
        Some(Token::Space) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::Add),
            Some(Token::Tab) => Ok(Instruction::Sub),
            Some(Token::Linefeed) => Ok(Instruction::Mul),
            None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        Some(Token::Tab) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::Div),
            Some(Token::Tab) => Ok(Instruction::Mod),
            _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
    }
}

fn heap_access(cursor: &mut Cursor) -> Result<Instruction, ParseError> {
    match cursor.next() {
        Some(Token::Space) => Ok(Instruction::Store),
        Some(Token::Tab) => Ok(Instruction::Retrieve),
        _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
    }
}

fn flow_control(cursor: &mut Cursor) -> Result<Instruction, ParseError> {
    match cursor.next() {
        Some(Token::Space) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::Mark(label(cursor)?)),
            Some(Token::Tab) => Ok(Instruction::Call(label(cursor)?)),
            Some(Token::Linefeed) => Ok(Instruction::Jump(label(cursor)?)),
            None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        Some(Token::Tab) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::JumpZero(label(cursor)?)),
            Some(Token::Tab) => Ok(Instruction::JumpNeg(label(cursor)?)),
            Some(Token::Linefeed) => Ok(Instruction::EndSub),
            None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        Some(Token::Linefeed) => match cursor.next() {
            Some(Token::Linefeed) => Ok(Instruction::EndProg),
            _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        None => Err(ParseError::UnreachableToken { pos: cursor.pos }),
    }
}

fn io_op(cursor: &mut Cursor) -> Result<Instruction, ParseError> {
    match cursor.next() {
        Some(Token::Space) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::WriteChar),
            Some(Token::Tab) => Ok(Instruction::WriteNum),
            _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        Some(Token::Tab) => match cursor.next() {
            Some(Token::Space) => Ok(Instruction::ReadChar),
            Some(Token::Tab) => Ok(Instruction::ReadNum),
            _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
        },
        _ => Err(ParseError::UnreachableToken { pos: cursor.pos }),
    }
}

fn number(cursor: &mut Cursor) -> Result<i64, ParseError> {
    match sign_and_magnitude(cursor)? {
        Some(value) => Ok(value),
        None => Err(ParseError::NoNumericArgument { pos: cursor.pos }),
    }
}

fn label(cursor: &mut Cursor) -> Result<i64, ParseError> {
    match sign_and_magnitude(cursor)? {
        Some(value) => Ok(value),
        None => Err(ParseError::NoLabelArgument { pos: cursor.pos }),
    }
}

/// Numbers and labels share one encoding: a sign token, magnitude bits
/// most significant first with tab meaning one, then a terminating
/// linefeed. `None` means the terminator came before the sign; the caller
/// decides what kind of argument went missing.
fn sign_and_magnitude(cursor: &mut Cursor) -> Result<Option<i64>, ParseError> {
    let sign = match cursor.next() {
        Some(Token::Space) => 1i64,
        Some(Token::Tab) => -1i64,
        Some(Token::Linefeed) => return Ok(None),
        None => return Err(ParseError::PrematureEnd { pos: cursor.pos }),
    };
    let mut magnitude = 0i64;
    loop {
        match cursor.next() {
            Some(Token::Space) => magnitude <<= 1,
            Some(Token::Tab) => magnitude = magnitude << 1 | 1,
            Some(Token::Linefeed) => break,
            None => return Err(ParseError::PrematureEnd { pos: cursor.pos }),
        }
    }
    Ok(Some(magnitude.wrapping_mul(sign)))
}
