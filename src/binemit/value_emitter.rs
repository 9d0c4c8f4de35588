//! Resolves a deferred `ValueInCode` fixup by picking the
//! `MachineCodeBuilder` setter that matches the literal's own kind.

use crate::api::MachineCodeBuilder;
use crate::ir::literals::LiteralData;
use crate::ir::literals::LiteralMap;
use crate::result::{CodegenError, CodegenResult};
use crate::value::Value;

/// Delivers the literal `value` resolves to at `offset` to `builder`, using
/// whichever `set_*` method matches its `LiteralData` variant. Only the
/// kinds `binemit::x64::encode_mov_literal` ever defers reach here —
/// basic-block and function literals are rejected before an
/// `associate_value` fixup is ever recorded, so those two variants are
/// unreachable in practice but still handled defensively.
pub fn emit(
    builder: &mut dyn MachineCodeBuilder,
    literals: &LiteralMap,
    offset: usize,
    value: Value,
) -> CodegenResult<()> {
    match literals.resolve(value) {
        Some(LiteralData::Float32(v)) => {
            builder.set_float32(offset, *v);
            Ok(())
        }
        Some(LiteralData::Float64(v)) => {
            builder.set_float64(offset, *v);
            Ok(())
        }
        Some(LiteralData::Int32(v)) => {
            builder.set_int32(offset, *v);
            Ok(())
        }
        Some(LiteralData::Int64(v)) => {
            builder.set_int64(offset, *v);
            Ok(())
        }
        Some(LiteralData::String(s)) => {
            let utf16: Vec<u16> = s.encode_utf16().collect();
            builder.set_string(offset, &utf16);
            Ok(())
        }
        Some(LiteralData::BasicBlock(_)) | Some(LiteralData::Function(_)) => {
            Err(CodegenError::UnsupportedLowering {
                mnemonic: "materializing a block/function literal as a plain value fixup",
            })
        }
        None => Err(CodegenError::InvariantViolated {
            message: format!("{} does not resolve to a literal-map entry", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::RecordingBuilder;

    #[test]
    fn float64_literal_routes_to_set_float64() {
        let mut literals = LiteralMap::new();
        let value = literals.float64_value(3.5);
        let mut builder = RecordingBuilder::new();
        builder.prepare_code(8);
        emit(&mut builder, &literals, 0, value).unwrap();
        assert_eq!(builder.result(), "float64 +0000 3.5\n");
    }

    #[test]
    fn int32_literal_routes_to_set_int32() {
        let mut literals = LiteralMap::new();
        let value = literals.int32_value(42);
        let mut builder = RecordingBuilder::new();
        builder.prepare_code(4);
        emit(&mut builder, &literals, 0, value).unwrap();
        assert_eq!(builder.result(), "int32 +0000 42\n");
    }
}
