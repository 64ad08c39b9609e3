//! Symbol grid (columns × rows)

use serde::{Deserialize, Serialize};

use crate::symbols::SymbolId;

/// Cell coordinate as `(column, row)`, row 0 at the top
pub type Position = (u8, u8);

/// A full grid of symbol ids, stored column-major (`columns[c][r]`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grid {
    columns: Vec<Vec<SymbolId>>,
}

impl Grid {
    /// Build from columns; every column must have the same height
    pub fn from_columns(columns: Vec<Vec<SymbolId>>) -> Self {
        debug_assert!(
            columns.windows(2).all(|w| w[0].len() == w[1].len()),
            "ragged grid"
        );
        Self { columns }
    }

    /// Build from rows as seen on screen (top row first). Ragged input is
    /// cut to the shortest row.
    pub fn from_rows(rows: &[Vec<SymbolId>]) -> Self {
        let column_count = rows.iter().map(Vec::len).min().unwrap_or(0);
        let columns = (0..column_count)
            .map(|c| rows.iter().map(|row| row[c]).collect())
            .collect();
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn get(&self, (column, row): Position) -> Option<SymbolId> {
        self.columns
            .get(column as usize)
            .and_then(|c| c.get(row as usize))
            .copied()
    }

    pub fn column(&self, column: usize) -> &[SymbolId] {
        self.columns.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn columns(&self) -> &[Vec<SymbolId>] {
        &self.columns
    }

    /// Every cell with its position, column by column
    pub fn cells(&self) -> impl Iterator<Item = (Position, SymbolId)> + '_ {
        self.columns.iter().enumerate().flat_map(|(c, column)| {
            column
                .iter()
                .enumerate()
                .map(move |(r, &symbol)| ((c as u8, r as u8), symbol))
        })
    }

    /// Positions holding `symbol`, column by column
    pub fn positions_of(&self, symbol: SymbolId) -> Vec<Position> {
        self.cells()
            .filter(|&(_, s)| s == symbol)
            .map(|(p, _)| p)
            .collect()
    }

    pub fn count(&self, symbol: SymbolId) -> usize {
        self.cells().filter(|&(_, s)| s == symbol).count()
    }

    /// Rows as seen on screen, top row first
    pub fn rows(&self) -> Vec<Vec<SymbolId>> {
        (0..self.row_count())
            .map(|r| self.columns.iter().map(|c| c[r]).collect())
            .collect()
    }
}
