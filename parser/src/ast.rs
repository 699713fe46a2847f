//! FILENAME: parser/src/ast.rs
//! PURPOSE: Defines the Abstract Syntax Tree (AST) for formula
//! expressions and the operations the rest of the engine needs from it:
//! execution against a live sheet, canonical re-printing, and the list
//! of positions a formula references.
//! CONTEXT: After the Lexer tokenizes a formula string, the Parser
//! converts those tokens into this tree. The tree is immutable once
//! built and is owned exclusively by the Cell that holds it.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literal numbers
//! - Cell references (A1, AA100, ...)
//! - Unary plus/minus
//! - Binary + - * /
//! - Parenthesisation (grouping only; not retained in the tree, only
//!   reconstructed by the printer where required)

use crate::error::FormulaError;
use crate::position::Position;

/// A value read back from a cell during formula evaluation. Distinct
/// from `CellValue` in the `engine` crate so that `parser` never has
/// to depend on `engine` — `engine::Sheet` implements `SheetView` and
/// converts its own `CellValue` into this narrower shape.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupValue {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

/// The read-only view of a sheet that formula evaluation needs. Kept
/// separate from `engine::Sheet` itself so the dependency runs
/// `engine -> parser`, never the other way around.
pub trait SheetView {
    fn lookup(&self, pos: Position) -> LookupValue;
}

/// A parsed arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Reference(Position),
    Neg(Box<Expr>),
    Pos(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
}

/// Precedence tiers used by both the parser (implicitly, via grammar
/// shape) and the canonical printer (explicitly, to decide parens).
/// Atoms are always highest so they never need wrapping as a child.
const PREC_ATOM: u8 = 3;
const PREC_UNARY: u8 = 3;
const PREC_MUL_DIV: u8 = 2;
const PREC_ADD_SUB: u8 = 1;

impl Expr {
    /// Parses `expression` (the text *after* a leading `=`) into an AST.
    pub fn parse(expression: &str) -> Result<Expr, crate::error::ParseFormulaError> {
        crate::parser::parse(expression)
    }

    /// Evaluates the tree bottom-up against `sheet`.
    pub fn execute(&self, sheet: &dyn SheetView) -> Result<f64, FormulaError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Reference(pos) => {
                if !pos.is_valid() {
                    return Err(FormulaError::Ref);
                }
                match sheet.lookup(*pos) {
                    LookupValue::Number(n) => Ok(n),
                    LookupValue::Text(s) => s.parse::<f64>().map_err(|_| FormulaError::Value),
                    LookupValue::Error(e) => Err(e),
                }
            }
            Expr::Neg(operand) => finite_or_arith(-operand.execute(sheet)?),
            Expr::Pos(operand) => finite_or_arith(operand.execute(sheet)?),
            Expr::Add(l, r) => {
                let lv = l.execute(sheet)?;
                let rv = r.execute(sheet)?;
                finite_or_arith(lv + rv)
            }
            Expr::Sub(l, r) => {
                let lv = l.execute(sheet)?;
                let rv = r.execute(sheet)?;
                finite_or_arith(lv - rv)
            }
            Expr::Mul(l, r) => {
                let lv = l.execute(sheet)?;
                let rv = r.execute(sheet)?;
                finite_or_arith(lv * rv)
            }
            Expr::Div(l, r) => {
                let lv = l.execute(sheet)?;
                let rv = r.execute(sheet)?;
                if rv == 0.0 {
                    return Err(FormulaError::Div0);
                }
                finite_or_arith(lv / rv)
            }
        }
    }

    /// The positions appearing in reference nodes, ascending
    /// (row-major), duplicates removed.
    pub fn referenced_positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_references(&self, out: &mut Vec<Position>) {
        match self {
            Expr::Number(_) => {}
            Expr::Reference(pos) => out.push(*pos),
            Expr::Neg(e) | Expr::Pos(e) => e.collect_references(out),
            Expr::Add(l, r) | Expr::Sub(l, r) | Expr::Mul(l, r) | Expr::Div(l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
        }
    }

    /// Canonical parenthesised form. Omits parentheses around children
    /// whose precedence is strictly higher than the parent; for
    /// subtraction and division, the right operand is additionally
    /// parenthesised whenever it shares the parent's precedence tier
    /// (since neither operator is associative), so `a - (b - c)`
    /// survives a print/parse round trip while `a - b - c` flattens.
    pub fn print(&self) -> String {
        self.print_at(0)
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Number(_) | Expr::Reference(_) => PREC_ATOM,
            Expr::Neg(_) | Expr::Pos(_) => PREC_UNARY,
            Expr::Mul(..) | Expr::Div(..) => PREC_MUL_DIV,
            Expr::Add(..) | Expr::Sub(..) => PREC_ADD_SUB,
        }
    }

    fn print_at(&self, min_prec: u8) -> String {
        let rendered = match self {
            Expr::Number(n) => format_number(*n),
            Expr::Reference(pos) => pos.to_a1(),
            Expr::Neg(operand) => format!("-{}", operand.print_at(PREC_UNARY)),
            Expr::Pos(operand) => format!("+{}", operand.print_at(PREC_UNARY)),
            Expr::Add(l, r) => self.print_binary(l, "+", r, false),
            Expr::Sub(l, r) => self.print_binary(l, "-", r, true),
            Expr::Mul(l, r) => self.print_binary(l, "*", r, false),
            Expr::Div(l, r) => self.print_binary(l, "/", r, true),
        };

        if self.precedence() < min_prec {
            format!("({})", rendered)
        } else {
            rendered
        }
    }

    fn print_binary(&self, left: &Expr, op: &str, right: &Expr, force_equal_right: bool) -> String {
        let my_prec = self.precedence();
        let left_str = left.print_at(my_prec);
        let right_min = if force_equal_right { my_prec + 1 } else { my_prec };
        let right_str = right.print_at(right_min);
        format!("{}{}{}", left_str, op, right_str)
    }
}

fn finite_or_arith(v: f64) -> Result<f64, FormulaError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(FormulaError::Arithmetic)
    }
}

/// Default decimal formatting: no locale dependence, no trailing `.0`
/// for integral values, shortest round-trippable representation
/// otherwise (Rust's `f64` `Display` already provides this). Shared
/// with `engine::Sheet::print_values` so formula literals and cell
/// values render identically.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}
