//! FILENAME: parser/src/error.rs
//! PURPOSE: `FormulaError`, the first-class value (not an exception)
//! that propagates through formula evaluation and prints as a
//! spreadsheet-style error token.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A formula evaluation failure. Unlike a parse failure, this is a
/// value that flows through `get_value()` and between operators — it
/// is reported to the user, never recovered by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormulaError {
    /// A formula references an invalid or out-of-range position.
    Ref,
    /// A referenced cell holds text that is not a parseable number.
    Value,
    /// Overflow, NaN, or infinity produced by an operator.
    Arithmetic,
    /// Division by zero.
    Div0,
}

impl FormulaError {
    /// The short token printed in place of a value, e.g. `"#REF!"`.
    pub fn tag(&self) -> &'static str {
        match self {
            FormulaError::Ref => "#REF!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Arithmetic => "#ARITHM!",
            FormulaError::Div0 => "#DIV/0!",
        }
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Raised when [`crate::ast::Expr::parse`] rejects a formula's syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("formula parse error: {message}")]
pub struct ParseFormulaError {
    pub message: String,
}

impl ParseFormulaError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseFormulaError {
            message: message.into(),
        }
    }
}
