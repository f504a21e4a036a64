//! Grouping and footer counts for the board.

use std::collections::BTreeMap;

use kennel_common::{CellRecord, WalkState};

/// Cells of one cage, sorted by side name.
#[derive(Debug, Clone, PartialEq)]
pub struct CageGroup<'a> {
    pub cage_num: i32,
    pub cells: Vec<&'a CellRecord>,
}

/// Group cells by cage number, ascending, each group sorted by `cell_side`.
pub fn group_by_cage(cells: &[CellRecord]) -> Vec<CageGroup<'_>> {
    let mut by_cage: BTreeMap<i32, Vec<&CellRecord>> = BTreeMap::new();
    for cell in cells {
        by_cage.entry(cell.cage_num).or_default().push(cell);
    }
    by_cage
        .into_iter()
        .map(|(cage_num, mut cells)| {
            cells.sort_by_key(|c| c.cell_side.as_str());
            CageGroup { cage_num, cells }
        })
        .collect()
}

/// Footer counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardStats {
    pub total: usize,
    pub walked: usize,
    pub pending: usize,
    pub skipped: usize,
}

impl BoardStats {
    pub fn from_cells(cells: &[CellRecord]) -> Self {
        cells.iter().fold(Self::default(), |mut stats, cell| {
            stats.total += 1;
            match cell.state {
                WalkState::NotYet => stats.pending += 1,
                WalkState::Walked => stats.walked += 1,
                WalkState::DoNotWalk => stats.skipped += 1,
            }
            stats
        })
    }
}
