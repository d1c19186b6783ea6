use crate::ir::{Instruction, Program};
use log::{debug, trace};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{self, BufRead, Write};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    StackUnderflow,
    CallStackUnderflow,
    DivideByZero,
    OutOfBounds {
        address: i64
    },
    LabelNotFound {
        label: i64
    },
    Io {
        kind: io::ErrorKind
    },
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for RuntimeError {}

impl From<io::Error> for RuntimeError {
    fn from(err: io::Error) -> RuntimeError {
        RuntimeError::Io { kind: err.kind() }
    }
}

/// Builds the label table. Every mark maps its id to the index of the
/// instruction right after it; a repeated id keeps the later mark.
pub fn resolve_labels(program: &[Instruction]) -> HashMap<i64, usize> {
    let mut labels = HashMap::new();
    for (index, instruction) in program.iter().enumerate() {
        if let Instruction::Mark(label) = instruction {
            labels.insert(*label, index + 1);
        }
    }
    labels
}

fn heap_address(address: i64) -> Result<usize, RuntimeError> {
    usize::try_from(address).map_err(|_| RuntimeError::OutOfBounds { address })
}

pub struct Interpreter<R, W> {
    program: Program,
    labels: HashMap<i64, usize>,
    stack: Vec<i64>,
    call_stack: Vec<usize>,
    heap: Vec<i64>,
    pc: usize,
    done: bool,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Interpreter<R, W> {
    pub fn new(program: Program, input: R, output: W) -> Interpreter<R, W> {
        let labels = resolve_labels(&program);
        debug!(
            "resolved {} labels over {} instructions",
            labels.len(),
            program.len()
        );
        Interpreter {
            program,
            labels,
            stack: Vec::new(),
            call_stack: Vec::new(),
            heap: Vec::new(),
            pc: 0,
            done: false,
            input,
            output,
        }
    }

    /// Runs until the program ends by itself or an error surfaces.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.step()? {}
        Ok(())
    }

    /// Executes one instruction; `Ok(false)` once the machine is terminal.
    /// Callers that want a bound on runaway programs loop over this.
    pub fn step(&mut self) -> Result<bool, RuntimeError> {
        if self.done || self.pc >= self.program.len() {
            self.output.flush()?;
            return Ok(false);
        }
        let instruction = self.program[self.pc];
        self.pc += 1;
        self.exec(instruction)?;
        Ok(true)
    }

    fn exec(&mut self, instruction: Instruction) -> Result<(), RuntimeError> {
        match instruction {
            // stack manipulation
            Instruction::Push(value) => {
                self.stack.push(value);
                Ok(())
            }
            Instruction::Dup => {
                let top = self.pop()?;
                self.stack.push(top);
                self.stack.push(top);
                Ok(())
            }
            Instruction::Copy(count) => {
                let index = usize::try_from(count).map_err(|_| RuntimeError::StackUnderflow)?;
                if index >= self.stack.len() {
                    return Err(RuntimeError::StackUnderflow);
                }
                let value = self.stack[self.stack.len() - 1 - index];
                self.stack.push(value);
                Ok(())
            }
            Instruction::Swap => {
                let first = self.pop()?;
                let second = self.pop()?;
                self.stack.push(first);
                self.stack.push(second);
                Ok(())
            }
            Instruction::Discard => {
                self.pop()?;
                Ok(())
            }
            Instruction::Slide(count) => {
                let top = self.pop()?;
                let count = usize::try_from(count).map_err(|_| RuntimeError::StackUnderflow)?;
                if count > self.stack.len() {
                    return Err(RuntimeError::StackUnderflow);
                }
                self.stack.truncate(self.stack.len() - count);
                self.stack.push(top);
                Ok(())
            }
            // arithmetic
            Instruction::Add => self.binary(|left, right| Ok(left.wrapping_add(right))),
            Instruction::Sub => self.binary(|left, right| Ok(left.wrapping_sub(right))),
            Instruction::Mul => self.binary(|left, right| Ok(left.wrapping_mul(right))),
            Instruction::Div => self.binary(|left, right| {
                if right == 0 {
                    Err(RuntimeError::DivideByZero)
                } else {
                    Ok(left.wrapping_div(right))
                }
            }),
            Instruction::Mod => self.binary(|left, right| {
                if right == 0 {
                    Err(RuntimeError::DivideByZero)
                } else {
                    Ok(left.wrapping_rem(right))
                }
            }),
            // heap access
            Instruction::Store => {
                let value = self.pop()?;
                let address = heap_address(self.pop()?)?;
                self.heap_store(address, value);
                Ok(())
            }
            Instruction::Retrieve => {
                let address = heap_address(self.pop()?)?;
                let value = self.heap.get(address).copied().unwrap_or(0);
                self.stack.push(value);
                Ok(())
            }
            // flow control
            // marks were resolved up front, nothing left to do here
            Instruction::Mark(_) => Ok(()),
            Instruction::Call(label) => {
                let target = self.target(label)?;
                self.call_stack.push(self.pc);
                self.pc = target;
                Ok(())
            }
            Instruction::Jump(label) => {
                self.pc = self.target(label)?;
                Ok(())
            }
            Instruction::JumpZero(label) => {
                if self.pop()? == 0 {
                    self.pc = self.target(label)?;
                }
                Ok(())
            }
            Instruction::JumpNeg(label) => {
                if self.pop()? < 0 {
                    self.pc = self.target(label)?;
                }
                Ok(())
            }
            Instruction::EndSub => {
                self.pc = self
                    .call_stack
                    .pop()
                    .ok_or(RuntimeError::CallStackUnderflow)?;
                Ok(())
            }
            Instruction::EndProg => {
                self.done = true;
                Ok(())
            }
            // i/o
            Instruction::WriteChar => {
                let value = self.pop()?;
                self.output.write_all(&[value as u8])?;
                Ok(())
            }
            Instruction::WriteNum => {
                let value = self.pop()?;
                write!(self.output, "{value}")?;
                Ok(())
            }
            Instruction::ReadChar => {
                trace!("reading one character from input");
                let address = heap_address(self.pop()?)?;
                self.output.flush()?;
                let byte = self.read_byte()?;
                self.heap_store(address, byte as i64);
                Ok(())
            }
            Instruction::ReadNum => {
                trace!("reading one number from input");
                let address = heap_address(self.pop()?)?;
                self.output.flush()?;
                let value = self.read_number()?;
                self.heap_store(address, value);
                Ok(())
            }
        }
    }

    fn pop(&mut self) -> Result<i64, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    fn binary(
        &mut self,
        op: impl Fn(i64, i64) -> Result<i64, RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;
        let result = op(left, right)?;
        self.stack.push(result);
        Ok(())
    }

    fn target(&self, label: i64) -> Result<usize, RuntimeError> {
        self.labels
            .get(&label)
            .copied()
            .ok_or(RuntimeError::LabelNotFound { label })
    }

    fn heap_store(&mut self, address: usize, value: i64) {
        if address >= self.heap.len() {
            self.heap.resize(address + 1, 0);
        }
        self.heap[address] = value;
    }

    fn read_byte(&mut self) -> Result<u8, RuntimeError> {
        let mut byte = [0u8; 1];
        self.input.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn peek_byte(&mut self) -> Result<Option<u8>, RuntimeError> {
        Ok(self.input.fill_buf()?.first().copied())
    }

    /// Reads one whitespace-delimited decimal integer, leaving the byte
    /// behind the digits unconsumed for whoever reads next.
    fn read_number(&mut self) -> Result<i64, RuntimeError> {
        loop {
            match self.peek_byte()? {
                Some(byte) if byte.is_ascii_whitespace() => self.input.consume(1),
                Some(_) => break,
                None => {
                    return Err(RuntimeError::Io {
                        kind: io::ErrorKind::UnexpectedEof,
                    })
                }
            }
        }
        let mut text = String::new();
        if let Some(byte @ (b'+' | b'-')) = self.peek_byte()? {
            text.push(byte as char);
            self.input.consume(1);
        }
        while let Some(byte) = self.peek_byte()? {
            if !byte.is_ascii_digit() {
                break;
            }
            text.push(byte as char);
            self.input.consume(1);
        }
        text.parse::<i64>().map_err(|_| RuntimeError::Io {
            kind: io::ErrorKind::InvalidData,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::exec::{resolve_labels, Interpreter, RuntimeError};
    use crate::ir::Instruction::*;
    use crate::ir::Program;
    use std::collections::HashMap;
    use std::io;

    fn interpreter(program: Program, input: &[u8]) -> Interpreter<&[u8], Vec<u8>> {
        Interpreter::new(program, input, Vec::new())
    }

    #[test]
    fn push_dup_discard() {
        let mut vm = interpreter(vec![Push(1), Push(7), Dup, Discard, Discard], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1]);
    }

    #[test]
    fn swap_exchanges_top_pair() {
        let mut vm = interpreter(vec![Push(1), Push(2), Swap], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![2, 1]);

        let mut vm = interpreter(vec![Push(1), Push(2), Swap, Swap], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1, 2]);
    }

    #[test]
    fn copy_indexes_from_the_top() {
        let mut vm = interpreter(vec![Push(10), Push(20), Push(30), Copy(2)], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![10, 20, 30, 10]);
    }

    #[test]
    fn copy_out_of_range_underflows() {
        let mut vm = interpreter(vec![Push(1), Copy(1)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::StackUnderflow));

        let mut vm = interpreter(vec![Push(1), Copy(-1)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::StackUnderflow));
    }

    #[test]
    fn slide_keeps_the_top() {
        let mut vm = interpreter(vec![Push(1), Push(2), Push(3), Slide(2)], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![3]);

        let mut vm = interpreter(vec![Push(1), Push(2), Slide(0)], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1, 2]);
    }

    #[test]
    fn slide_out_of_range_underflows() {
        let mut vm = interpreter(vec![Push(1), Slide(2)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::StackUnderflow));

        let mut vm = interpreter(vec![Push(1), Push(2), Slide(-3)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::StackUnderflow));
    }

    #[test]
    fn arithmetic_operand_order() {
        let mut vm = interpreter(vec![Push(7), Push(3), Sub], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![4]);

        let mut vm = interpreter(vec![Push(7), Push(2), Div], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![3]);

        let mut vm = interpreter(vec![Push(-7), Push(2), Mod], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![-1]);
    }

    #[test]
    fn arithmetic_wraps_instead_of_trapping() {
        let mut vm = interpreter(vec![Push(i64::MAX), Push(1), Add], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![i64::MIN]);

        let mut vm = interpreter(vec![Push(i64::MIN), Push(-1), Div], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![i64::MIN]);
    }

    #[test]
    fn division_by_zero_reports_before_writing() {
        let mut vm = interpreter(vec![Push(5), Push(0), Div, WriteNum], b"");
        assert_eq!(vm.run(), Err(RuntimeError::DivideByZero));
        assert_eq!(vm.output, Vec::<u8>::new());

        let mut vm = interpreter(vec![Push(5), Push(0), Mod], b"");
        assert_eq!(vm.run(), Err(RuntimeError::DivideByZero));
    }

    #[test]
    fn store_then_retrieve() {
        let mut vm = interpreter(vec![Push(5), Push(42), Store, Push(5), Retrieve], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![42]);
        assert_eq!(vm.heap.len(), 6);
    }

    #[test]
    fn heap_growth_zero_fills() {
        let mut vm = interpreter(vec![Push(5), Push(1), Store, Push(3), Retrieve], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![0]);
    }

    #[test]
    fn retrieve_above_high_water_is_zero() {
        let mut vm = interpreter(vec![Push(99), Retrieve], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![0]);
        assert_eq!(vm.heap.len(), 0);
    }

    #[test]
    fn negative_addresses_are_out_of_bounds() {
        let mut vm = interpreter(vec![Push(-1), Retrieve], b"");
        assert_eq!(vm.run(), Err(RuntimeError::OutOfBounds { address: -1 }));

        let mut vm = interpreter(vec![Push(-4), Push(1), Store], b"");
        assert_eq!(vm.run(), Err(RuntimeError::OutOfBounds { address: -4 }));
    }

    #[test]
    fn labels_resolve_past_their_mark() {
        let program = [Mark(7), Push(1), Mark(-2)];
        let labels = resolve_labels(&program);
        let mut expected = HashMap::new();
        expected.insert(7, 1);
        expected.insert(-2, 3);
        assert_eq!(labels, expected);
        assert_eq!(resolve_labels(&program), labels);
    }

    #[test]
    fn duplicate_label_keeps_the_later_mark() {
        let labels = resolve_labels(&[Mark(0), Push(1), Mark(0), Push(2)]);
        assert_eq!(labels.get(&0), Some(&3));
    }

    #[test]
    fn call_and_endsub_round_trip() {
        let program = vec![Call(0), Push(1), EndProg, Mark(0), Push(2), EndSub];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![2, 1]);
        assert!(vm.call_stack.is_empty());
    }

    #[test]
    fn jump_leaves_the_call_stack_alone() {
        let program = vec![Jump(0), Push(9), Mark(0), Push(1)];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1]);
        assert!(vm.call_stack.is_empty());
    }

    #[test]
    fn conditional_jumps_pop_their_operand() {
        let program = vec![Push(0), JumpZero(0), Push(9), Mark(0), Push(1)];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1]);

        let program = vec![Push(-3), JumpNeg(0), Push(9), Mark(0), Push(1)];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1]);
    }

    #[test]
    fn untaken_branch_skips_label_lookup() {
        let mut vm = interpreter(vec![Push(1), JumpZero(5)], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![]);

        let mut vm = interpreter(vec![Push(1), JumpNeg(5)], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![]);
    }

    #[test]
    fn taken_branch_without_mark_fails() {
        let mut vm = interpreter(vec![Push(0), JumpZero(5)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::LabelNotFound { label: 5 }));

        let mut vm = interpreter(vec![Jump(8)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::LabelNotFound { label: 8 }));

        let mut vm = interpreter(vec![Call(8)], b"");
        assert_eq!(vm.run(), Err(RuntimeError::LabelNotFound { label: 8 }));
    }

    #[test]
    fn endsub_without_call_underflows() {
        let mut vm = interpreter(vec![EndSub], b"");
        assert_eq!(vm.run(), Err(RuntimeError::CallStackUnderflow));
    }

    #[test]
    fn endprog_stops_immediately() {
        let program = vec![Push(72), WriteChar, EndProg, Push(1), WriteNum];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.output, b"H".to_vec());
        assert_eq!(vm.stack, vec![]);
    }

    #[test]
    fn running_off_the_end_is_not_an_error() {
        let mut vm = interpreter(vec![Push(1)], b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.stack, vec![1]);

        let mut vm = interpreter(Program::new(), b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.output, Vec::<u8>::new());
    }

    #[test]
    fn one_plus_one() {
        let program = vec![Push(1), Push(1), Add, WriteNum, EndProg];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.output, b"2".to_vec());
    }

    #[test]
    fn write_char_truncates_to_a_byte() {
        let program = vec![Push(72), WriteChar, Push(328), WriteChar];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.output, b"HH".to_vec());
    }

    #[test]
    fn write_num_is_decimal() {
        let program = vec![Push(-5), WriteNum, Push(10), WriteNum];
        let mut vm = interpreter(program, b"");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.output, b"-510".to_vec());
    }

    #[test]
    fn stack_underflow_on_empty_operands() {
        for program in [
            vec![Dup],
            vec![Swap],
            vec![Push(1), Swap],
            vec![Discard],
            vec![Add],
            vec![Push(1), Add],
            vec![Store],
            vec![Retrieve],
            vec![JumpZero(0)],
        ] {
            let mut vm = interpreter(program, b"");
            assert_eq!(vm.run(), Err(RuntimeError::StackUnderflow));
        }
    }

    #[test]
    fn read_char_stores_the_byte() {
        let program = vec![Push(0), ReadChar, Push(0), Retrieve, WriteChar];
        let mut vm = interpreter(program, b"A");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.heap, vec![65]);
        assert_eq!(vm.output, b"A".to_vec());
    }

    #[test]
    fn read_num_parses_signed_decimals() {
        let mut vm = interpreter(vec![Push(3), ReadNum], b"  42 rest");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.heap, vec![0, 0, 0, 42]);

        let mut vm = interpreter(vec![Push(0), ReadNum], b"-13");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.heap, vec![-13]);

        let mut vm = interpreter(vec![Push(0), ReadNum], b"+7\n");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.heap, vec![7]);
    }

    #[test]
    fn read_num_leaves_the_delimiter() {
        let program = vec![Push(0), ReadNum, Push(1), ReadChar];
        let mut vm = interpreter(program, b"7\nX");
        assert_eq!(vm.run(), Ok(()));
        assert_eq!(vm.heap, vec![7, 10]);
    }

    #[test]
    fn read_past_the_end_of_input() {
        let mut vm = interpreter(vec![Push(0), ReadChar], b"");
        assert_eq!(
            vm.run(),
            Err(RuntimeError::Io {
                kind: io::ErrorKind::UnexpectedEof
            })
        );

        let mut vm = interpreter(vec![Push(0), ReadNum], b"   ");
        assert_eq!(
            vm.run(),
            Err(RuntimeError::Io {
                kind: io::ErrorKind::UnexpectedEof
            })
        );
    }

    #[test]
    fn read_num_rejects_non_numeric_input() {
        let mut vm = interpreter(vec![Push(0), ReadNum], b"abc");
        assert_eq!(
            vm.run(),
            Err(RuntimeError::Io {
                kind: io::ErrorKind::InvalidData
            })
        );

        let mut vm = interpreter(vec![Push(0), ReadNum], b"- 1");
        assert_eq!(
            vm.run(),
            Err(RuntimeError::Io {
                kind: io::ErrorKind::InvalidData
            })
        );
    }

    #[test]
    fn step_limit_bounds_an_endless_loop() {
        let program = vec![Mark(0), Push(72), WriteChar, Jump(0)];
        let mut vm = interpreter(program, b"");
        for _ in 0..100 {
            assert_eq!(vm.step(), Ok(true));
        }
        assert_eq!(vm.output, b"H".repeat(33));
    }
}
