//! A shallow decoder for method bodies.
//!
//! Only the instructions that refer to fields, methods and call sites are decoded into operands;
//! everything else is measured and skipped. Operands are patched in place by the rewriting
//! passes, so instruction boundaries never move.

use std::iter;

use super::ParseError;
use crate::macros::see_jvm_spec;

/// Opcodes referenced by the rewriting passes.
#[allow(missing_docs)]
pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const ALOAD_0: u8 = 0x2a;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const IINC: u8 = 0x84;
    pub const WIDE: u8 = 0xc4;
}

use opcodes::*;

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// The offset of the opcode within the code array.
    pub pc: usize,
    /// The opcode.
    pub opcode: u8,
    /// What the instruction refers to.
    pub kind: InstructionKind,
}

/// The part of an instruction the rewriting passes care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    /// `getstatic`, `putstatic`, `getfield` or `putfield`.
    FieldAccess {
        /// The kind of access.
        kind: FieldAccessKind,
        /// The index of the [`Entry::FieldRef`](super::constant_pool::Entry::FieldRef).
        index: u16,
    },
    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`.
    Invoke {
        /// The kind of invocation.
        kind: InvokeKind,
        /// The index of the method reference.
        index: u16,
    },
    /// `invokedynamic`.
    InvokeDynamic {
        /// The index of the [`Entry::InvokeDynamic`](super::constant_pool::Entry::InvokeDynamic).
        index: u16,
    },
    /// Anything else.
    Other,
}

/// The kinds of field access.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccessKind {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

/// The kinds of method invocation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeKind {
    /// The opcode of the instruction.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            Self::Virtual => INVOKEVIRTUAL,
            Self::Special => INVOKESPECIAL,
            Self::Static => INVOKESTATIC,
            Self::Interface => INVOKEINTERFACE,
        }
    }
}

impl Instruction {
    /// The offset of the `u16` operand of a field, method or call site instruction.
    #[must_use]
    pub const fn operand_pc(&self) -> usize {
        self.pc + 1
    }
}

/// Decodes the instructions of a code array.
#[doc = see_jvm_spec!(6, 5)]
/// # Errors
/// Returns [`ParseError`] if an opcode is unknown or an instruction is truncated.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, ParseError> {
    let mut pc = 0;
    iter::from_fn(|| {
        if pc >= code.len() {
            return None;
        }
        let result = decode_one(code, pc).map(|(insn, length)| {
            pc += length;
            insn
        });
        if result.is_err() {
            pc = code.len();
        }
        Some(result)
    })
    .collect()
}

fn decode_one(code: &[u8], pc: usize) -> Result<(Instruction, usize), ParseError> {
    let opcode = code[pc];
    let length = instruction_length(code, pc)?;
    if pc + length > code.len() {
        return Err(ParseError::malform(format!(
            "Instruction {opcode:#04x} at {pc} is truncated"
        )));
    }
    let index = || u16::from_be_bytes([code[pc + 1], code[pc + 2]]);
    let kind = match opcode {
        GETSTATIC => field_access(FieldAccessKind::GetStatic, index()),
        PUTSTATIC => field_access(FieldAccessKind::PutStatic, index()),
        GETFIELD => field_access(FieldAccessKind::GetField, index()),
        PUTFIELD => field_access(FieldAccessKind::PutField, index()),
        INVOKEVIRTUAL => invoke(InvokeKind::Virtual, index()),
        INVOKESPECIAL => invoke(InvokeKind::Special, index()),
        INVOKESTATIC => invoke(InvokeKind::Static, index()),
        INVOKEINTERFACE => invoke(InvokeKind::Interface, index()),
        INVOKEDYNAMIC => InstructionKind::InvokeDynamic { index: index() },
        _ => InstructionKind::Other,
    };
    Ok((Instruction { pc, opcode, kind }, length))
}

const fn field_access(kind: FieldAccessKind, index: u16) -> InstructionKind {
    InstructionKind::FieldAccess { kind, index }
}

const fn invoke(kind: InvokeKind, index: u16) -> InstructionKind {
    InstructionKind::Invoke { kind, index }
}

fn instruction_length(code: &[u8], pc: usize) -> Result<usize, ParseError> {
    let opcode = code[pc];
    let length = match opcode {
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 => 1,
        0xbe | 0xbf | 0xc2 | 0xc3 | 0xca => 1,
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | IINC | 0x99..=0xa8 | 0xb2..=0xb8 => 3,
        0xbb | 0xbd | 0xc0 | 0xc1 | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        INVOKEINTERFACE | INVOKEDYNAMIC | 0xc8 | 0xc9 => 5,
        WIDE => match code.get(pc + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(ParseError::malform("Truncated wide instruction")),
        },
        TABLESWITCH => {
            let operands = pc + 1 + padding(pc);
            let low = read_i32(code, operands + 4)?;
            let high = read_i32(code, operands + 8)?;
            let entries = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| ParseError::malform("Invalid tableswitch bounds"))?;
            1 + padding(pc) + 12 + 4 * entries
        }
        LOOKUPSWITCH => {
            let operands = pc + 1 + padding(pc);
            let pairs = usize::try_from(read_i32(code, operands + 4)?)
                .map_err(|_| ParseError::malform("Negative lookupswitch pair count"))?;
            1 + padding(pc) + 8 + 8 * pairs
        }
        unknown => {
            return Err(ParseError::malform(format!(
                "Unknown opcode {unknown:#04x} at {pc}"
            )));
        }
    };
    Ok(length)
}

/// The switch operands start at a multiple of four from the start of the code array.
const fn padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn read_i32(code: &[u8], offset: usize) -> Result<i32, ParseError> {
    code.get(offset..offset + 4)
        .and_then(|bytes| bytes.try_into().ok())
        .map(i32::from_be_bytes)
        .ok_or_else(|| ParseError::malform("Truncated switch instruction"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_invocations() {
        let code = [
            0x2a, // aload_0
            0xb6, 0x00, 0x07, // invokevirtual #7
            0xb9, 0x00, 0x09, 0x01, 0x00, // invokeinterface #9, 1
            0xb2, 0x00, 0x0b, // getstatic #11
            0xba, 0x00, 0x0d, 0x00, 0x00, // invokedynamic #13
            0xb1, // return
        ];
        let insns = decode(&code).unwrap();
        let kinds = insns.iter().map(|it| (it.pc, it.kind)).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                (0, InstructionKind::Other),
                (1, invoke(InvokeKind::Virtual, 7)),
                (4, invoke(InvokeKind::Interface, 9)),
                (9, field_access(FieldAccessKind::GetStatic, 11)),
                (12, InstructionKind::InvokeDynamic { index: 13 }),
                (17, InstructionKind::Other),
            ]
        );
    }

    #[test]
    fn switch_padding() {
        // nop, tableswitch at pc 1 with two bytes of padding, default 0, low 0, high 1
        let mut code = vec![0x00, 0xaa, 0x00, 0x00];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        code.push(0xb1);
        let insns = decode(&code).unwrap();
        assert_eq!(insns.len(), 3);
        assert_eq!(insns[2].pc, code.len() - 1);
    }

    #[test]
    fn wide_iinc() {
        let code = [0xc4, 0x84, 0x01, 0x00, 0x00, 0x01, 0xb1];
        let insns = decode(&code).unwrap();
        assert_eq!(insns.iter().map(|it| it.pc).collect::<Vec<_>>(), [0, 6]);
    }

    #[test]
    fn truncated_invoke() {
        assert!(decode(&[0xb6, 0x00]).is_err());
        assert!(decode(&[0xfe]).is_err());
    }
}
