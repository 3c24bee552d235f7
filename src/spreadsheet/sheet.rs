use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::value::Value;
use std::iter::Peekable;
use std::vec::IntoIter;

/// A worksheet with all of its non-empty cells materialized.
#[derive(Clone, Debug, Default)]
pub struct Sheet {
    /// Sheet name
    pub name: String,
    /// Cells ordered by row, then column
    cells: Vec<Cell>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            cells: Vec::new(),
        }
    }

    /// Adds a cell; call [`Sheet::finish`] once all cells are pushed.
    pub(crate) fn push(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Restores row-major order. Writers may emit records out of order.
    pub(crate) fn finish(&mut self) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
    }

    /// Returns true if the sheet contains no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Rows in file order starting at row 0. Rows without any cell are yielded as `None`.
    pub fn rows(self) -> Rows {
        Rows {
            cells: self.cells.into_iter().peekable(),
            next_row: 0,
        }
    }
}

/// The cells of one row, ordered by column.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub index: usize,
    cells: Vec<Cell>,
}

impl Row {
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Value of column `col`, if a cell exists there.
    pub fn get(&self, col: usize) -> Option<&Value> {
        self.cells.iter().rev().find(|cell| cell.col == col).map(|cell| &cell.value)
    }

    /// One past the right-most column holding a cell.
    pub fn width(&self) -> usize {
        self.cells.last().map(|cell| cell.col + 1).unwrap_or(0)
    }
}

/// One-pass iterator over the rows of a [`Sheet`].
pub struct Rows {
    cells: Peekable<IntoIter<Cell>>,
    next_row: usize,
}

impl Iterator for Rows {
    type Item = Option<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.cells.peek()?.row;
        let index = self.next_row;
        self.next_row += 1;
        if row > index {
            return Some(None);
        }

        let mut cells = Vec::new();
        while let Some(cell) = self.cells.next_if(|cell| cell.row == index) {
            cells.push(cell);
        }
        Some(Some(Row { index, cells }))
    }
}

/// Normalizes a row into positional values: slot `i` holds column `i`,
/// or `None` when no cell exists there. An absent row yields an empty vector.
pub fn cells_of(row: Option<&Row>) -> Vec<Option<Value>> {
    let Some(row) = row else {
        return Vec::new();
    };
    let mut values = vec![None; row.width()];
    for cell in &row.cells {
        values[cell.col] = Some(cell.value.clone());
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(cells: &[(usize, usize, &str)]) -> Sheet {
        let mut sheet = Sheet::new("Sheet1");
        for (row, col, value) in cells {
            sheet.push(Cell { row: *row, col: *col, value: Value::from(*value) });
        }
        sheet.finish();
        sheet
    }

    #[test]
    fn rows_fill_gaps_with_none() {
        let rows: Vec<Option<Row>> = sheet(&[(2, 1, "c"), (0, 0, "a"), (0, 2, "b")]).rows().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].as_ref().map(|row| row.cells().len()), Some(2));
        assert!(rows[1].is_none());
        assert_eq!(rows[2].as_ref().and_then(|row| row.get(1)), Some(&Value::from("c")));
    }

    #[test]
    fn empty_sheet_has_no_rows() {
        assert_eq!(Sheet::new("Sheet1").rows().count(), 0);
    }

    #[test]
    fn cells_of_positions_values() {
        let mut rows = sheet(&[(0, 0, "a"), (0, 2, "c")]).rows();
        let row = rows.next().flatten();
        assert_eq!(
            cells_of(row.as_ref()),
            vec![Some(Value::from("a")), None, Some(Value::from("c"))]
        );
        assert_eq!(cells_of(None), Vec::<Option<Value>>::new());
    }
}
