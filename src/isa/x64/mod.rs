//! The x64 target descriptor: register classification, the Windows x64
//! calling convention, and the capability bits the parallel-copy
//! expander and lowering pass consult.

pub mod lower;
pub mod registers;

use crate::value::{Kind, Value, ValueSize, ValueType};
use registers::{GeneralRegister, RegisterSlot, XmmRegister};

/// A stateless descriptor for the one ISA this crate targets. All of its
/// methods are associated functions — there is never an instance to
/// construct, only a namespace of ABI and register facts to query.
pub struct Target;

impl Target {
    pub fn pointer_size() -> ValueSize {
        ValueSize::Size64
    }

    pub fn pointer_size_in_byte() -> i32 {
        8
    }

    pub fn int_ptr_type() -> Value {
        Value::int_ptr_type()
    }

    /// All general registers available to the register allocator: every
    /// integer register except RSP and RBP, which are reserved for the
    /// stack/frame pointers.
    pub fn allocatable_general_registers() -> Vec<Value> {
        registers::GENERAL
            .iter()
            .copied()
            .filter(|r| !matches!(r, GeneralRegister::Rsp | GeneralRegister::Rbp))
            .map(|r| Self::register_value(r, ValueSize::Size64))
            .collect()
    }

    /// All float registers available to the register allocator. Unlike
    /// the general set, every XMM register is allocatable — there is no
    /// XMM analogue of RSP/RBP.
    pub fn allocatable_float_registers() -> Vec<Value> {
        registers::XMM
            .iter()
            .copied()
            .map(|r| Self::xmm_value(r, ValueSize::Size64))
            .collect()
    }

    pub fn register_value(register: GeneralRegister, size: ValueSize) -> Value {
        Value::new(Kind::PhysicalRegister, ValueType::Integer, size, register.slot().0 as i32)
    }

    pub fn xmm_value(register: XmmRegister, size: ValueSize) -> Value {
        Value::new(Kind::PhysicalRegister, ValueType::Float, size, register.0 as i32)
    }

    fn slot_of(value: Value) -> RegisterSlot {
        debug_assert!(value.is_physical());
        RegisterSlot(value.data as u8)
    }

    /// Register or stack slot holding parameter `position` (0-based) of
    /// type `ty`, under the x64 Windows calling convention: the first 4
    /// integer parameters go in RCX/RDX/R8/R9, the first 4 float
    /// parameters in XMM0-3 (tracked independently per the Windows x64
    /// ABI: integer and float parameter positions each advance their own
    /// counter, so a call like `f(int, float, int)` still puts the second
    /// int in RDX, not R8 — see DESIGN.md), the rest on the stack above
    /// the 32-byte shadow space and the return address.
    pub fn parameter_at(ty: Value, position: i32) -> Value {
        Self::slot_for(ty, position)
    }

    /// Location for outgoing call argument `position`; identical
    /// placement rules to `parameter_at` but tagged `Kind::Argument`
    /// rather than `Kind::Parameter` for stack positions so the stack
    /// allocator can track them as a distinct (reusable, non-escaping)
    /// region.
    pub fn argument_at(ty: Value, position: i32) -> Value {
        match Self::slot_for(ty, position) {
            stack if stack.is_memory_slot() => Value::argument(ty, stack.data),
            register => register,
        }
    }

    fn slot_for(ty: Value, position: i32) -> Value {
        if ty.is_float() {
            if let Some(&xmm) = registers::PARAMETER_XMM.get(position as usize) {
                return Self::xmm_value(xmm, ty.size);
            }
        } else if let Some(&reg) = registers::PARAMETER_GENERAL.get(position as usize) {
            return Self::register_value(reg, ty.size);
        }
        // `[rsp+16+8*i]`: a fixed 16-byte base (return address plus one
        // pointer-sized slot of callee prologue bookkeeping) precedes the
        // first stack parameter; each stack slot past it is pointer-sized.
        // The 32-byte shadow space is a distinct region the *callee*
        // reserves for its own outgoing calls, not part of this offset.
        let offset = 16 + 8 * position;
        Value::parameter(ty, offset)
    }

    pub fn return_of(ty: Value) -> Value {
        if ty.is_float() {
            Self::xmm_value(registers::XMM[0], ty.size)
        } else {
            Self::register_value(GeneralRegister::Rax, ty.size)
        }
    }

    pub fn register_of(register: GeneralRegister, size: ValueSize) -> Value {
        Self::register_value(register, size)
    }

    pub fn is_callee_saved_register(physical: Value) -> bool {
        if physical.is_float() {
            registers::CALLEE_SAVED_XMM.iter().any(|r| r.0 as i32 == physical.data)
        } else {
            registers::CALLEE_SAVED_GENERAL.iter().any(|r| r.slot().0 as i32 == physical.data)
        }
    }

    pub fn is_caller_saved_register(physical: Value) -> bool {
        if physical.is_float() {
            registers::CALLER_SAVED_XMM.iter().any(|r| r.0 as i32 == physical.data)
        } else {
            registers::CALLER_SAVED_GENERAL.iter().any(|r| r.slot().0 as i32 == physical.data)
        }
    }

    pub fn is_parameter_register(physical: Value) -> bool {
        if physical.is_float() {
            registers::PARAMETER_XMM.iter().any(|r| r.0 as i32 == physical.data)
        } else {
            registers::PARAMETER_GENERAL.iter().any(|r| r.slot().0 as i32 == physical.data)
        }
    }

    /// Whether an immediate of `ty.size` can be copied directly to a
    /// memory operand with a single `mov` (true for anything that fits
    /// in a 32-bit sign-extended immediate; x64 has no 64-bit-immediate
    /// memory form).
    pub fn has_copy_immediate_to_memory(ty: Value) -> bool {
        ty.is_integer() && ty.size != ValueSize::Size64
    }

    /// Whether there is a dedicated swap instruction for this type
    /// (`xchg` for general registers; no SSE equivalent for XMM).
    pub fn has_swap_instruction(ty: Value) -> bool {
        ty.is_integer()
    }
}
