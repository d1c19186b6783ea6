use std::fmt::{Display, Formatter};

/// One decoded instruction. Numeric and label arguments are both carried
/// as signed values, exactly as the binary encoding delivers them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Instruction {
    // stack manipulation
    Push(i64),
    Dup,
    Copy(i64),
    Swap,
    Discard,
    Slide(i64),
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // heap access
    Store,
    Retrieve,
    // flow control
    Mark(i64),
    Call(i64),
    Jump(i64),
    JumpZero(i64),
    JumpNeg(i64),
    EndSub,
    EndProg,
    // i/o
    WriteChar,
    WriteNum,
    ReadChar,
    ReadNum,
}

pub type Program = Vec<Instruction>;

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Push(_) => "PUSH",
            Instruction::Dup => "DUP",
            Instruction::Copy(_) => "COPY",
            Instruction::Swap => "SWAP",
            Instruction::Discard => "DISCARD",
            Instruction::Slide(_) => "SLIDE",
            Instruction::Add => "ADD",
            Instruction::Sub => "SUB",
            Instruction::Mul => "MUL",
            Instruction::Div => "DIV",
            Instruction::Mod => "MOD",
            Instruction::Store => "STORE",
            Instruction::Retrieve => "RETRIEVE",
            Instruction::Mark(_) => "MARK",
            Instruction::Call(_) => "CALL",
            Instruction::Jump(_) => "JUMP",
            Instruction::JumpZero(_) => "JUMPZERO",
            Instruction::JumpNeg(_) => "JUMPNEG",
            Instruction::EndSub => "ENDSUB",
            Instruction::EndProg => "ENDPROG",
            Instruction::WriteChar => "WRITEC",
            Instruction::WriteNum => "WRITEN",
            Instruction::ReadChar => "READC",
            Instruction::ReadNum => "READN",
        }
    }

    pub fn argument(&self) -> Option<i64> {
        match *self {
            Instruction::Push(value)
            | Instruction::Copy(value)
            | Instruction::Slide(value)
            | Instruction::Mark(value)
            | Instruction::Call(value)
            | Instruction::Jump(value)
            | Instruction::JumpZero(value)
            | Instruction::JumpNeg(value) => Some(value),
            _ => None,
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.argument() {
            Some(argument) => write!(f, "{} {}", self.mnemonic(), argument),
            None => write!(f, "{}", self.mnemonic()),
        }
    }
}
