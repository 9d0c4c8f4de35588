//! The literal map: a content-addressed table of constants too wide to
//! carry inline in a `Value` (floats, 64-bit integers, strings) plus the
//! basic-block and function references used as jump/call targets.
//!
//! Entries are interned: asking for the same `f64`/`i64`/`&str` twice
//! returns the same `Literal` index, matching `Factory::RegisterLiteral`'s
//! behavior of keying each constant kind by its own `unordered_map`.

use cranelift_entity::{entity_impl, PrimaryMap};
use std::collections::HashMap;

use crate::value::{Kind, Value, ValueSize, ValueType};

/// An index into a `LiteralMap`. Carried inline inside a `Value` of kind
/// `Kind::Literal` as `data`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal(u32);
entity_impl!(Literal, "lit");

/// What a literal entry actually holds.
#[derive(Clone, Debug, PartialEq)]
pub enum LiteralData {
    Float32(f32),
    Float64(f64),
    Int32(i32),
    Int64(i64),
    String(String),
    /// References a basic block by its block index (`crate::ir::function::Block`).
    BasicBlock(u32),
    /// References a function, identified by its literal `Value`.
    Function(Value),
}

/// Owns every literal created for a function, content-addressed so that
/// repeated constants share one entry.
#[derive(Default)]
pub struct LiteralMap {
    literals: PrimaryMap<Literal, LiteralData>,
    float32_index: HashMap<u32, Literal>,
    float64_index: HashMap<u64, Literal>,
    int32_index: HashMap<i32, Literal>,
    int64_index: HashMap<i64, Literal>,
    string_index: HashMap<String, Literal>,
}

impl LiteralMap {
    pub fn new() -> LiteralMap {
        LiteralMap::default()
    }

    pub fn data(&self, literal: Literal) -> &LiteralData {
        &self.literals[literal]
    }

    fn register(&mut self, data: LiteralData) -> Literal {
        self.literals.push(data)
    }

    /// Interns `value` and returns the `Value` operand to use for it, of
    /// the requested `size`.
    pub fn float32_value(&mut self, value: f32) -> Value {
        let key = value.to_bits();
        let literal = *self
            .float32_index
            .entry(key)
            .or_insert_with(|| self.literals.push(LiteralData::Float32(value)));
        Value::literal(
            Value::new(Kind::Literal, ValueType::Float, ValueSize::Size32, 0),
            literal.as_u32() as i32,
        )
    }

    pub fn float64_value(&mut self, value: f64) -> Value {
        let key = value.to_bits();
        let literal = *self
            .float64_index
            .entry(key)
            .or_insert_with(|| self.literals.push(LiteralData::Float64(value)));
        Value::literal(
            Value::new(Kind::Literal, ValueType::Float, ValueSize::Size64, 0),
            literal.as_u32() as i32,
        )
    }

    pub fn int32_value(&mut self, value: i32) -> Value {
        let literal = *self
            .int32_index
            .entry(value)
            .or_insert_with(|| self.literals.push(LiteralData::Int32(value)));
        Value::literal(
            Value::new(Kind::Literal, ValueType::Integer, ValueSize::Size32, 0),
            literal.as_u32() as i32,
        )
    }

    pub fn int64_value(&mut self, value: i64) -> Value {
        let literal = *self
            .int64_index
            .entry(value)
            .or_insert_with(|| self.literals.push(LiteralData::Int64(value)));
        Value::literal(
            Value::new(Kind::Literal, ValueType::Integer, ValueSize::Size64, 0),
            literal.as_u32() as i32,
        )
    }

    pub fn string_value(&mut self, data: &str) -> Value {
        if let Some(literal) = self.string_index.get(data) {
            return Value::literal(
                Value::new(Kind::Literal, ValueType::Integer, ValueSize::pointer_size(), 0),
                literal.as_u32() as i32,
            );
        }
        let literal = self.literals.push(LiteralData::String(data.to_owned()));
        self.string_index.insert(data.to_owned(), literal);
        Value::literal(
            Value::new(Kind::Literal, ValueType::Integer, ValueSize::pointer_size(), 0),
            literal.as_u32() as i32,
        )
    }

    /// Registers a basic-block reference as a literal; block references are
    /// not content-addressed since each basic block is a distinct target.
    pub fn block_value(&mut self, block_index: u32) -> Value {
        let literal = self.register(LiteralData::BasicBlock(block_index));
        Value::literal(
            Value::new(Kind::Literal, ValueType::Integer, ValueSize::pointer_size(), 0),
            literal.as_u32() as i32,
        )
    }

    pub fn function_value(&mut self, callee: Value) -> Value {
        let literal = self.register(LiteralData::Function(callee));
        Value::literal(
            Value::new(Kind::Literal, ValueType::Integer, ValueSize::pointer_size(), 0),
            literal.as_u32() as i32,
        )
    }

    pub fn resolve(&self, value: Value) -> Option<&LiteralData> {
        if !value.is_literal() {
            return None;
        }
        Some(self.data(Literal::from_u32(value.data as u32)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_equal_constants() {
        let mut map = LiteralMap::new();
        let a = map.int64_value(42);
        let b = map.int64_value(42);
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn distinguishes_different_constants() {
        let mut map = LiteralMap::new();
        let a = map.int32_value(1);
        let b = map.int32_value(2);
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn resolves_back_to_the_original_value() {
        let mut map = LiteralMap::new();
        let v = map.float64_value(3.5);
        match map.resolve(v) {
            Some(LiteralData::Float64(x)) => assert_eq!(*x, 3.5),
            other => panic!("unexpected literal data: {:?}", other),
        }
    }
}
