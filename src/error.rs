//! Error types for assembling and running programs

use thiserror::Error;

use crate::machine::Word;

/// Errors raised by any pipeline stage. Assembly errors carry the source
/// token index, runtime errors carry the instruction pointer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid token count: expected {expected}, source has {actual}")]
    InvalidTokenCount { expected: usize, actual: usize },

    #[error("malformed token '{token}' at token {index}")]
    MalformedToken { index: usize, token: String },

    #[error("unexpected end of source in instruction at token {index}")]
    UnexpectedEnd { index: usize },

    #[error("invalid register '{token}' at token {index}")]
    InvalidRegister { index: usize, token: String },

    #[error("invalid number '{token}' at token {index}")]
    InvalidNumber { index: usize, token: String },

    #[error("unknown label '{label}' at token {index}")]
    UnknownLabel { index: usize, label: String },

    #[error("label '{label}' declared twice (tokens {first} and {second})")]
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },

    #[error("program too large: {required} words (capacity {capacity})")]
    OutOfMemory { required: usize, capacity: usize },

    #[error("memory access out of bounds: address {address} at ip {ip}")]
    OutOfBounds { ip: Word, address: Word },

    #[error("illegal instruction {opcode} at ip {ip}")]
    IllegalInstruction { ip: Word, opcode: Word },

    #[error("illegal register id {word} at ip {ip}")]
    IllegalRegister { ip: Word, word: Word },

    #[error("step limit of {steps} exceeded at ip {ip}")]
    StepLimitExceeded { ip: Word, steps: u64 },
}

/// Result type for assembler and interpreter operations
pub type Result<T> = std::result::Result<T, Error>;
