//! Named x64 machine registers.
//!
//! One name per (class, width) pair, the same shape as the source
//! design's `enum Register` — but here the "which physical slot, how
//! wide" decomposition is explicit fields instead of packed hex values,
//! since nothing downstream needs the bit-packed encoding to be a single
//! integer.

use crate::value::{ValueSize, ValueType};

/// Which of the 16 integer or 16 SSE physical slots a register name
/// refers to. Indices match the x64 ModRM/REX register-number encoding
/// (RAX/XMM0 = 0, ..., R15/XMM15 = 15), so the binary emitter can use
/// this directly when building REX prefixes and ModRM bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegisterSlot(pub u8);

macro_rules! general_register_names {
    ($($name:ident = $slot:expr),* $(,)?) => {
        /// A named general-purpose register at a specific width.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub enum GeneralRegister {
            $($name),*
        }

        impl GeneralRegister {
            pub fn slot(self) -> RegisterSlot {
                match self {
                    $(GeneralRegister::$name => RegisterSlot($slot)),*
                }
            }
        }
    };
}

// 64-bit names; 32/16/8-bit aliases share the same slot and are
// distinguished only by the `ValueSize` carried alongside them.
general_register_names! {
    Rax = 0, Rcx = 1, Rdx = 2, Rbx = 3, Rsp = 4, Rbp = 5, Rsi = 6, Rdi = 7,
    R8 = 8, R9 = 9, R10 = 10, R11 = 11, R12 = 12, R13 = 13, R14 = 14, R15 = 15,
}

/// A named XMM register; `size` distinguishes the scalar-float32 and
/// scalar-float64 views the same physical register is used under.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct XmmRegister(pub u8);

pub const XMM: [XmmRegister; 16] = [
    XmmRegister(0),
    XmmRegister(1),
    XmmRegister(2),
    XmmRegister(3),
    XmmRegister(4),
    XmmRegister(5),
    XmmRegister(6),
    XmmRegister(7),
    XmmRegister(8),
    XmmRegister(9),
    XmmRegister(10),
    XmmRegister(11),
    XmmRegister(12),
    XmmRegister(13),
    XmmRegister(14),
    XmmRegister(15),
];

pub const GENERAL: [GeneralRegister; 16] = [
    GeneralRegister::Rax,
    GeneralRegister::Rcx,
    GeneralRegister::Rdx,
    GeneralRegister::Rbx,
    GeneralRegister::Rsp,
    GeneralRegister::Rbp,
    GeneralRegister::Rsi,
    GeneralRegister::Rdi,
    GeneralRegister::R8,
    GeneralRegister::R9,
    GeneralRegister::R10,
    GeneralRegister::R11,
    GeneralRegister::R12,
    GeneralRegister::R13,
    GeneralRegister::R14,
    GeneralRegister::R15,
];

pub fn register_type() -> ValueType {
    ValueType::Integer
}

pub fn float_register_type() -> ValueType {
    ValueType::Float
}

/// Registers callers must not assume survive a call: caller-saved
/// general registers, excluding the four parameter registers which the
/// callee is also free to clobber once read.
pub const CALLER_SAVED_GENERAL: [GeneralRegister; 2] = [GeneralRegister::R10, GeneralRegister::R11];

pub const CALLEE_SAVED_GENERAL: [GeneralRegister; 7] = [
    GeneralRegister::Rbx,
    GeneralRegister::Rdi,
    GeneralRegister::Rsi,
    GeneralRegister::R12,
    GeneralRegister::R13,
    GeneralRegister::R14,
    GeneralRegister::R15,
];

pub const PARAMETER_GENERAL: [GeneralRegister; 4] =
    [GeneralRegister::Rcx, GeneralRegister::Rdx, GeneralRegister::R8, GeneralRegister::R9];

pub const PARAMETER_XMM: [XmmRegister; 4] = [XMM[0], XMM[1], XMM[2], XMM[3]];

pub const CALLER_SAVED_XMM: [XmmRegister; 2] = [XMM[4], XMM[5]];

pub const CALLEE_SAVED_XMM: [XmmRegister; 10] =
    [XMM[6], XMM[7], XMM[8], XMM[9], XMM[10], XMM[11], XMM[12], XMM[13], XMM[14], XMM[15]];

/// Divide/modulo and shift pin specific operands to fixed registers; the
/// lowering pass names them through these constants rather than magic
/// slot numbers.
pub const DIVIDEND_LOW: GeneralRegister = GeneralRegister::Rax;
pub const DIVIDEND_HIGH: GeneralRegister = GeneralRegister::Rdx;
pub const SHIFT_COUNT: GeneralRegister = GeneralRegister::Rcx;

/// Size used by the `ValueSize::pointer_size()` policy; every general
/// register constant above is named at its natural 64-bit width unless a
/// caller narrows it with [`ValueSize::Size32`] etc.
pub const POINTER_SIZE: ValueSize = ValueSize::Size64;
