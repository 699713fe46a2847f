//! FILENAME: engine/src/sheet.rs
//! PURPOSE: The spreadsheet itself: sparse cell storage, the mutating
//! operations (`set_cell`/`clear_cell`), cycle detection ahead of a
//! formula commit, cache invalidation after one, and the printable-area
//! bookkeeping the original jagged-array implementation tracked.
//! CONTEXT: `Cell` carries no reference back to its `Sheet`, so every
//! cross-cell step that spec.md narrates as part of `Cell::set` lives
//! here instead — see DESIGN.md for the full rationale. Storage is a
//! `HashMap<Position, Cell>` rather than the original's row-major
//! jagged array; a cell is only absent from the map when it has never
//! been set and nothing currently depends on it.

use crate::cell::{Cell, CellContent, CellValue};
use crate::error::SheetError;
use parser::{LookupValue, Position, SheetView};
use std::collections::HashMap;
use std::fmt;

/// A spreadsheet: sparse cell storage plus the auxiliary state needed
/// to answer "what's the printable area" without rescanning everything
/// on every read.
#[derive(Debug, Default)]
pub struct Sheet {
    cells: HashMap<Position, Cell>,
    /// Count of non-empty cells per row. A row's entry is removed once
    /// its count would reach zero, so presence here also answers
    /// "does this row have anything in it".
    num_cells_in_row: HashMap<i64, i64>,
    /// `(rows, cols)`: one past the highest non-empty row/column seen,
    /// or `(0, 0)` if the sheet is entirely empty.
    print_size: (i64, i64),
}

impl Sheet {
    pub fn new() -> Self {
        Sheet::default()
    }

    /// Reads a cell. `Ok(None)` means the position has never been set
    /// and nothing depends on it; that's equivalent to an empty cell
    /// for every purpose except object identity.
    pub fn get_cell(&self, pos: Position) -> Result<Option<&Cell>, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        Ok(self.cells.get(&pos))
    }

    /// The value at `pos`, treating an absent cell as `0.0` the same
    /// way an explicitly empty one reads.
    pub fn get_value(&self, pos: Position) -> Result<CellValue, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        Ok(match self.cells.get(&pos) {
            Some(cell) => cell.get_value(self),
            None => CellValue::Number(0.0),
        })
    }

    /// The text a formula bar would show for `pos`.
    pub fn get_text(&self, pos: Position) -> Result<String, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        Ok(self
            .cells
            .get(&pos)
            .map(|c| c.get_text())
            .unwrap_or_default())
    }

    /// Sets `pos`'s text. An empty string is equivalent to
    /// `clear_cell(pos)`. On a parse error or a formula that would
    /// create a circular dependency, the sheet is left exactly as it
    /// was before the call.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        if text.is_empty() {
            return self.clear_cell(pos);
        }

        let new_content = Cell::parse_content(text)?;
        let new_refs = new_content.referenced_positions();

        if matches!(new_content, CellContent::Formula(_)) && self.would_create_cycle(pos, &new_refs)
        {
            log::debug!("set_cell({pos}): rejected, would create a circular dependency");
            return Err(SheetError::Circular);
        }

        let old_refs = self
            .cells
            .get(&pos)
            .map(|c| c.referenced_positions())
            .unwrap_or_default();
        for old_ref in &old_refs {
            if let Some(c) = self.cells.get_mut(old_ref) {
                c.remove_dependent(pos);
            }
        }

        self.invalidate_dependents(pos);

        let was_empty = self.cells.get(&pos).map(|c| c.is_empty()).unwrap_or(true);
        let cell = self.cells.entry(pos).or_insert_with(|| Cell::new_empty(pos));
        cell.set_content(new_content);

        for new_ref in &new_refs {
            let ref_cell = self
                .cells
                .entry(*new_ref)
                .or_insert_with(|| Cell::new_empty(*new_ref));
            ref_cell.add_dependent(pos);
        }

        if was_empty {
            *self.num_cells_in_row.entry(pos.row).or_insert(0) += 1;
        }
        self.print_size = (
            self.print_size.0.max(pos.row + 1),
            self.print_size.1.max(pos.col + 1),
        );

        log::trace!("set_cell({pos}): committed");
        Ok(())
    }

    /// Empties `pos`. A no-op if it's already empty or absent. Any
    /// cell still depending on `pos` keeps its place in the dependency
    /// graph — only `pos`'s own content changes.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition);
        }
        let was_empty = self.cells.get(&pos).map(|c| c.is_empty()).unwrap_or(true);
        if was_empty {
            return Ok(());
        }

        self.invalidate_dependents(pos);

        let old_refs = self
            .cells
            .get(&pos)
            .map(|c| c.referenced_positions())
            .unwrap_or_default();
        for old_ref in &old_refs {
            if let Some(c) = self.cells.get_mut(old_ref) {
                c.remove_dependent(pos);
            }
        }

        if let Some(c) = self.cells.get_mut(&pos) {
            c.set_content(CellContent::Empty);
        }

        if let Some(count) = self.num_cells_in_row.get_mut(&pos.row) {
            *count -= 1;
            if *count <= 0 {
                self.num_cells_in_row.remove(&pos.row);
            }
        }

        // A now-empty cell with no one depending on it carries no
        // information worth keeping a slot for.
        if let Some(c) = self.cells.get(&pos) {
            if c.is_empty() && c.dependents().is_empty() {
                self.cells.remove(&pos);
            }
        }

        let (rows, cols) = self.print_size;
        if pos.row + 1 == rows || pos.col + 1 == cols {
            self.recompute_print_size();
        }

        log::trace!("clear_cell({pos}): committed");
        Ok(())
    }

    /// `(rows, cols)`: one past the highest non-empty row/column, or
    /// `(0, 0)` if nothing has been set.
    pub fn get_printable_size(&self) -> (i64, i64) {
        self.print_size
    }

    /// Writes every cell's *value* over the printable area, tab-
    /// separated within a row and newline-terminated per row. Errors
    /// render as their tag (`#REF!`, ...); empty cells render as `""`.
    pub fn print_values<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let (rows, cols) = self.print_size;
        for row in 0..rows {
            for col in 0..cols {
                if col > 0 {
                    write!(out, "\t")?;
                }
                let pos = Position::new(row, col);
                if let Some(cell) = self.cells.get(&pos) {
                    match cell.get_value(self) {
                        CellValue::Number(n) => write!(out, "{}", parser::format_number(n))?,
                        CellValue::Text(s) => write!(out, "{}", s)?,
                        CellValue::Error(e) => write!(out, "{}", e.tag())?,
                    }
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes every cell's *text* (formula-bar form) over the
    /// printable area, same separator/terminator convention as
    /// `print_values`.
    pub fn print_texts<W: fmt::Write>(&self, out: &mut W) -> fmt::Result {
        let (rows, cols) = self.print_size;
        for row in 0..rows {
            for col in 0..cols {
                if col > 0 {
                    write!(out, "\t")?;
                }
                let pos = Position::new(row, col);
                if let Some(cell) = self.cells.get(&pos) {
                    write!(out, "{}", cell.get_text())?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn recompute_print_size(&mut self) {
        let mut max_row: i64 = -1;
        let mut max_col: i64 = -1;
        for (pos, cell) in self.cells.iter() {
            if !cell.is_empty() {
                max_row = max_row.max(pos.row);
                max_col = max_col.max(pos.col);
            }
        }
        self.print_size = if max_row < 0 {
            (0, 0)
        } else {
            (max_row + 1, max_col + 1)
        };
    }

    /// Iterative depth-first walk of the forward reference graph,
    /// white/grey/black coloured, starting from `start` whose outgoing
    /// edges are overridden to `start_refs` (the references the
    /// prospective formula would add, since `start`'s cell doesn't
    /// carry them yet). A grey vertex reached again means an ancestor
    /// is on the current path: a cycle. Black means already fully
    /// explored elsewhere: safe.
    ///
    /// Grounded in the original implementation's `PerformDFS`, adapted
    /// to an explicit per-vertex frame (rather than re-pushing a vertex
    /// onto the same stack to mark its finish) so that a position
    /// reachable by more than one path is never coloured out of order.
    fn would_create_cycle(&self, start: Position, start_refs: &[Position]) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            Grey,
            Black,
        }

        struct Frame {
            neighbors: Vec<Position>,
            idx: usize,
        }

        let mut colors: HashMap<Position, Color> = HashMap::new();
        colors.insert(start, Color::Grey);
        let mut path = vec![start];
        let mut stack = vec![Frame {
            neighbors: start_refs.to_vec(),
            idx: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.idx < frame.neighbors.len() {
                let next = frame.neighbors[frame.idx];
                frame.idx += 1;
                match colors.get(&next) {
                    Some(Color::Grey) => return true,
                    Some(Color::Black) => {}
                    None => {
                        let next_refs = self
                            .cells
                            .get(&next)
                            .map(|c| c.referenced_positions())
                            .unwrap_or_default();
                        colors.insert(next, Color::Grey);
                        path.push(next);
                        stack.push(Frame {
                            neighbors: next_refs,
                            idx: 0,
                        });
                    }
                }
            } else {
                let finished = path.pop().expect("path and stack stay in lockstep");
                colors.insert(finished, Color::Black);
                stack.pop();
            }
        }
        false
    }

    /// Clears the numeric cache of every cell transitively dependent
    /// on `start`, including `start` itself, by walking the reverse
    /// ("who reads me") graph. Each cell is visited at most once.
    ///
    /// Grounded in the original implementation's
    /// `InvalidateDepCellsCacheDFS`.
    fn invalidate_dependents(&self, start: Position) {
        let mut visited: std::collections::HashSet<Position> = std::collections::HashSet::new();
        let mut stack = vec![start];
        while let Some(pos) = stack.pop() {
            if !visited.insert(pos) {
                continue;
            }
            if let Some(cell) = self.cells.get(&pos) {
                cell.invalidate_cache();
                for dep in cell.dependents() {
                    if !visited.contains(dep) {
                        stack.push(*dep);
                    }
                }
            }
        }
    }
}

impl SheetView for Sheet {
    fn lookup(&self, pos: Position) -> LookupValue {
        match self.cells.get(&pos) {
            Some(cell) => match cell.get_value(self) {
                CellValue::Number(n) => LookupValue::Number(n),
                CellValue::Text(s) => LookupValue::Text(s),
                CellValue::Error(e) => LookupValue::Error(e),
            },
            None => LookupValue::Number(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::FormulaError;

    fn pos(a1: &str) -> Position {
        Position::from_str_strict(a1).unwrap()
    }

    #[test]
    fn empty_sheet_has_zero_printable_size() {
        let sheet = Sheet::new();
        assert_eq!(sheet.get_printable_size(), (0, 0));
    }

    #[test]
    fn set_then_get_text_value_round_trip() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "hello").unwrap();
        assert_eq!(sheet.get_text(pos("A1")).unwrap(), "hello");
        assert_eq!(
            sheet.get_value(pos("A1")).unwrap(),
            CellValue::Text("hello".to_string())
        );
    }

    #[test]
    fn formula_sums_two_cells() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("A2"), "2").unwrap();
        sheet.set_cell(pos("A3"), "=A1+A2").unwrap();
        assert_eq!(sheet.get_value(pos("A3")).unwrap(), CellValue::Number(3.0));
    }

    #[test]
    fn editing_a_dependency_invalidates_the_dependent_cache() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("A2"), "=A1+1").unwrap();
        assert_eq!(sheet.get_value(pos("A2")).unwrap(), CellValue::Number(2.0));

        sheet.set_cell(pos("A1"), "10").unwrap();
        assert_eq!(sheet.get_value(pos("A2")).unwrap(), CellValue::Number(11.0));
    }

    #[test]
    fn direct_self_reference_is_rejected_and_sheet_is_unchanged() {
        let mut sheet = Sheet::new();
        let err = sheet.set_cell(pos("A1"), "=A1+1").unwrap_err();
        assert_eq!(err, SheetError::Circular);
        assert_eq!(sheet.get_value(pos("A1")).unwrap(), CellValue::Number(0.0));
        assert!(sheet.get_cell(pos("A1")).unwrap().is_none());
    }

    #[test]
    fn indirect_cycle_is_rejected_and_second_cell_is_unchanged() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "=A2").unwrap();
        let err = sheet.set_cell(pos("A2"), "=A1").unwrap_err();
        assert_eq!(err, SheetError::Circular);
        assert_eq!(sheet.get_value(pos("A2")).unwrap(), CellValue::Number(0.0));
    }

    #[test]
    fn clearing_a_cell_zeroes_its_dependents() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "5").unwrap();
        sheet.set_cell(pos("A2"), "=A1").unwrap();
        assert_eq!(sheet.get_value(pos("A2")).unwrap(), CellValue::Number(5.0));

        sheet.clear_cell(pos("A1")).unwrap();
        assert_eq!(sheet.get_value(pos("A1")).unwrap(), CellValue::Number(0.0));
        assert_eq!(sheet.get_value(pos("A2")).unwrap(), CellValue::Number(0.0));
    }

    #[test]
    fn set_cell_with_empty_text_behaves_like_clear() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "5").unwrap();
        sheet.set_cell(pos("A1"), "").unwrap();
        assert_eq!(sheet.get_value(pos("A1")).unwrap(), CellValue::Number(0.0));
        assert_eq!(sheet.get_printable_size(), (0, 0));
    }

    #[test]
    fn division_by_zero_reads_as_div0_error() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "0").unwrap();
        sheet.set_cell(pos("A2"), "=1/A1").unwrap();
        assert_eq!(
            sheet.get_value(pos("A2")).unwrap(),
            CellValue::Error(FormulaError::Div0)
        );
    }

    #[test]
    fn invalid_position_is_rejected_without_touching_storage() {
        let mut sheet = Sheet::new();
        let bad = Position::new(-1, 0);
        assert_eq!(sheet.set_cell(bad, "1").unwrap_err(), SheetError::InvalidPosition);
        assert_eq!(sheet.get_cell(bad).unwrap_err(), SheetError::InvalidPosition);
    }

    #[test]
    fn printable_size_tracks_the_bounding_box_of_non_empty_cells() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("B2"), "1").unwrap();
        assert_eq!(sheet.get_printable_size(), (2, 2));
        sheet.set_cell(pos("D5"), "2").unwrap();
        assert_eq!(sheet.get_printable_size(), (5, 4));
        sheet.clear_cell(pos("D5")).unwrap();
        assert_eq!(sheet.get_printable_size(), (2, 2));
    }

    #[test]
    fn print_values_separates_with_tabs_and_newlines() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("B1"), "2").unwrap();
        let mut out = String::new();
        sheet.print_values(&mut out).unwrap();
        assert_eq!(out, "1\t2\n");
    }

    #[test]
    fn print_texts_shows_formula_source_not_value() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("A2"), "=A1+1").unwrap();
        let mut out = String::new();
        sheet.print_texts(&mut out).unwrap();
        assert_eq!(out, "1\n=A1+1\n");
    }

    #[test]
    fn redefining_a_formula_updates_reverse_dependencies() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("A2"), "2").unwrap();
        sheet.set_cell(pos("A3"), "=A1").unwrap();
        sheet.set_cell(pos("A3"), "=A2").unwrap();

        // A3 no longer depends on A1, so editing A1 must not affect it.
        sheet.set_cell(pos("A1"), "100").unwrap();
        assert_eq!(sheet.get_value(pos("A3")).unwrap(), CellValue::Number(2.0));
    }
}
