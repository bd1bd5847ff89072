// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("buffer underrun: {remaining} bytes remaining, {requested} requested")]
    BufferUnderrun { remaining: usize, requested: usize },
    #[error("length mismatch: {remaining} bytes remaining, expected exactly {expected}")]
    LengthMismatch { remaining: usize, expected: usize },
    #[error("invalid position {position} (limit {limit})")]
    InvalidPosition { position: usize, limit: usize },
    #[error("field {field}: expecting {expected} bytes, got {actual}")]
    FieldLength {
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("parsing {structure}: {source}")]
    Parse {
        structure: &'static str,
        #[source]
        source: Box<Error>,
    },
    #[error("Structure validation error: {0}")]
    StructureValidation(String),
    #[error("Header validation error: {0}")]
    HeaderValidation(String),
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Command failed with status {code:#x}: {context}")]
    CommandFailed { code: u16, context: String },
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
