//! FILENAME: engine/src/cell.rs
//! PURPOSE: The atomic unit of the spreadsheet: empty, literal text, or
//! a formula, plus the memoised numeric result and the reverse
//! ("who reads me") dependency set.
//! CONTEXT: `Cell` never reaches back into its owning `Sheet` — it
//! stores positions by value only. The cross-cell orchestration
//! (detaching from old references, invalidating dependents, registering
//! with new references) lives on `Sheet::set_cell`/`Sheet::clear_cell`;
//! see DESIGN.md for why that split exists.

use parser::{Expr, FormulaError, Position};
use std::cell::Cell as CacheCell;
use std::collections::HashSet;

/// Formula sign: the leading character that marks a cell's text as a
/// formula to be parsed rather than taken literally.
pub const FORMULA_SIGN: char = '=';
/// Escape sign: a leading character stripped from the displayed value
/// of a text cell, while preserved verbatim in `get_text()`.
pub const ESCAPE_SIGN: char = '\'';

/// What a cell's content currently is.
///
/// Unlike `Position`/`FormulaError`/`CellValue`, this type does not
/// derive `serde` impls: the `Formula` variant owns a parsed `Expr`
/// tree, which is reconstructed from its canonical text on load rather
/// than serialized structurally (persistence is out of this crate's
/// scope; a host only ever needs `get_text()`/`get_value()`).
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Empty,
    /// The exact text the caller supplied (escape sign, if any, intact).
    Text(String),
    Formula(Expr),
}

impl Default for CellContent {
    fn default() -> Self {
        CellContent::Empty
    }
}

impl CellContent {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellContent::Empty)
    }

    /// The positions a not-yet-installed content would reference. Lets
    /// `Sheet::set_cell` run the cycle check before committing anything.
    pub fn referenced_positions(&self) -> Vec<Position> {
        match self {
            CellContent::Formula(expr) => expr.referenced_positions(),
            _ => Vec::new(),
        }
    }
}

/// The result of reading a cell's value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

/// One slot in the sheet.
#[derive(Debug)]
pub struct Cell {
    pos: Position,
    content: CellContent,
    /// Memoised numeric result for a Text-with-number or Formula cell.
    /// Interior mutability lets `get_value` stay `&self` while still
    /// memoising (spec §9's "cache ... writable through a shared read
    /// path" option).
    cache: CacheCell<Option<f64>>,
    dependents: HashSet<Position>,
}

impl Cell {
    pub fn new_empty(pos: Position) -> Self {
        Cell {
            pos,
            content: CellContent::Empty,
            cache: CacheCell::new(None),
            dependents: HashSet::new(),
        }
    }

    pub fn pos(&self) -> Position {
        self.pos
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, CellContent::Empty)
    }

    /// Classifies `text` into a `CellContent` without touching any
    /// sheet state. Pure so `Sheet::set_cell` can compute the
    /// prospective content (and its referenced positions) *before*
    /// deciding whether to commit it.
    pub fn parse_content(text: &str) -> Result<CellContent, parser::ParseFormulaError> {
        if text.is_empty() {
            return Ok(CellContent::Empty);
        }
        if text.starts_with(FORMULA_SIGN) && text.len() > 1 {
            let expr = Expr::parse(&text[1..])?;
            return Ok(CellContent::Formula(expr));
        }
        Ok(CellContent::Text(text.to_string()))
    }

    /// Installs `content`, replacing whatever was there, and clears
    /// this cell's own cache (the new content hasn't been evaluated
    /// yet). Callers (`Sheet`) are responsible for the dependency-graph
    /// side effects around this call.
    pub fn set_content(&mut self, content: CellContent) {
        self.content = content;
        self.cache.set(None);
    }

    /// The positions this cell's formula references, sorted and
    /// deduplicated. Empty for non-formula cells.
    pub fn referenced_positions(&self) -> Vec<Position> {
        match &self.content {
            CellContent::Formula(expr) => expr.referenced_positions(),
            _ => Vec::new(),
        }
    }

    pub fn dependents(&self) -> &HashSet<Position> {
        &self.dependents
    }

    pub fn add_dependent(&mut self, pos: Position) {
        self.dependents.insert(pos);
    }

    pub fn remove_dependent(&mut self, pos: Position) {
        self.dependents.remove(&pos);
    }

    pub fn invalidate_cache(&self) {
        self.cache.set(None);
    }

    /// `get_value` for a Text cell whose entire text parses as a
    /// number: resolves Open Question 1 in favour of `Number`,
    /// matching the original C++'s `StrToDouble` cache-priming.
    fn text_numeric_value(text: &str) -> Option<f64> {
        text.parse::<f64>().ok()
    }

    /// The cell's current value. Empty reads as `0.0`; a Text cell
    /// whose whole string parses as a number reads as that number
    /// (with the escape sign stripped first); a Formula cell returns
    /// its cache if present, otherwise evaluates against `sheet` and
    /// caches a successful numeric result.
    pub fn get_value(&self, sheet: &dyn parser::SheetView) -> CellValue {
        match &self.content {
            CellContent::Empty => CellValue::Number(0.0),
            CellContent::Text(text) => {
                let display = strip_escape(text);
                match Self::text_numeric_value(&display) {
                    Some(n) => CellValue::Number(n),
                    None => CellValue::Text(display.to_string()),
                }
            }
            CellContent::Formula(expr) => {
                if let Some(cached) = self.cache.get() {
                    return CellValue::Number(cached);
                }
                match expr.execute(sheet) {
                    Ok(n) => {
                        self.cache.set(Some(n));
                        CellValue::Number(n)
                    }
                    Err(e) => CellValue::Error(e),
                }
            }
        }
    }

    /// The text the user would see in the formula bar: `""` for Empty,
    /// the stored string for Text, or `"=" + ast.print()` for Formula.
    pub fn get_text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(text) => text.clone(),
            CellContent::Formula(expr) => format!("{}{}", FORMULA_SIGN, expr.print()),
        }
    }
}

/// Strips a single leading escape sign, if present, from a text
/// cell's displayed value (the stored string itself is untouched).
fn strip_escape(text: &str) -> &str {
    if text.starts_with(ESCAPE_SIGN) {
        &text[ESCAPE_SIGN.len_utf8()..]
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::LookupValue;

    struct NoRefsSheet;
    impl parser::SheetView for NoRefsSheet {
        fn lookup(&self, _pos: Position) -> LookupValue {
            LookupValue::Number(0.0)
        }
    }

    #[test]
    fn empty_cell_value_is_zero() {
        let cell = Cell::new_empty(Position::new(0, 0));
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Number(0.0));
        assert_eq!(cell.get_text(), "");
    }

    #[test]
    fn text_cell_round_trips_get_text() {
        let mut cell = Cell::new_empty(Position::new(0, 0));
        let content = Cell::parse_content("hello").unwrap();
        cell.set_content(content);
        assert_eq!(cell.get_text(), "hello");
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Text("hello".to_string()));
    }

    #[test]
    fn numeric_text_cell_reads_as_number_but_keeps_original_text() {
        let mut cell = Cell::new_empty(Position::new(0, 0));
        let content = Cell::parse_content("42").unwrap();
        cell.set_content(content);
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Number(42.0));
        assert_eq!(cell.get_text(), "42");
    }

    #[test]
    fn escape_sign_is_stripped_from_value_not_text() {
        let mut cell = Cell::new_empty(Position::new(0, 0));
        let content = Cell::parse_content("'text").unwrap();
        cell.set_content(content);
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Text("text".to_string()));
        assert_eq!(cell.get_text(), "'text");
    }

    #[test]
    fn single_equals_sign_is_text_not_formula() {
        let content = Cell::parse_content("=").unwrap();
        assert_eq!(content, CellContent::Text("=".to_string()));
    }

    #[test]
    fn formula_cell_prints_canonical_text() {
        let content = Cell::parse_content("=1+2").unwrap();
        let mut cell = Cell::new_empty(Position::new(0, 0));
        cell.set_content(content);
        assert_eq!(cell.get_text(), "=1+2");
    }

    #[test]
    fn formula_caches_successful_evaluation() {
        let mut cell = Cell::new_empty(Position::new(0, 0));
        let content = Cell::parse_content("=1+2").unwrap();
        cell.set_content(content);
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Number(3.0));
        // Second read hits the cache; same result either way.
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Number(3.0));
    }

    #[test]
    fn invalidate_cache_forces_reevaluation() {
        let mut cell = Cell::new_empty(Position::new(0, 0));
        let content = Cell::parse_content("=1+2").unwrap();
        cell.set_content(content);
        let _ = cell.get_value(&NoRefsSheet);
        cell.invalidate_cache();
        assert_eq!(cell.get_value(&NoRefsSheet), CellValue::Number(3.0));
    }

    #[test]
    fn cell_value_round_trips_through_json() {
        for value in [
            CellValue::Number(42.5),
            CellValue::Text("hello".to_string()),
            CellValue::Error(FormulaError::Div0),
        ] {
            let json = serde_json::to_string(&value).unwrap();
            assert_eq!(serde_json::from_str::<CellValue>(&json).unwrap(), value);
        }
    }
}
