//! FILENAME: engine/src/error.rs
//! PURPOSE: The three boundary failures `Sheet::set_cell` can raise.
//! CONTEXT: Distinct from `parser::FormulaError`, which is a value that
//! flows *through* evaluation rather than aborting a mutation. Any of
//! these leaves the sheet exactly as it was before the call.

use parser::ParseFormulaError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    #[error("invalid position")]
    InvalidPosition,
    #[error("formula error: {0}")]
    Formula(#[from] ParseFormulaError),
    #[error("circular dependency detected")]
    Circular,
}
