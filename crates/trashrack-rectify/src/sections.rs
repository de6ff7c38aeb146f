use serde::{Deserialize, Serialize};
use trashrack_core::PixelBox;

use crate::RectifyError;

/// What a rectification section covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxKind {
    /// A detected support column.
    Column,
    /// A synthetic open grid cell between columns (or between a column and
    /// the structure edge).
    GridCell,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "box")]
    pub bbox: PixelBox,
    pub kind: BoxKind,
}

impl Section {
    pub fn column(bbox: PixelBox) -> Self {
        Self {
            bbox,
            kind: BoxKind::Column,
        }
    }

    pub fn grid_cell(bbox: PixelBox) -> Self {
        Self {
            bbox,
            kind: BoxKind::GridCell,
        }
    }
}

/// Interleave synthetic grid cells with the detected columns so that the
/// sequence spans the structure from left to right.
///
/// - a leading cell covers `[structure.x1, first.x1]` when the structure
///   starts before the first column,
/// - every pair of neighbouring columns gets a cell `[left.x2, right.x1]`
///   spanning `left.y1..right.y2`,
/// - a trailing cell covers `[last.x2, structure.x2]` when the structure ends
///   after the last column.
///
/// Gaps of zero or negative width (columns still overlapping) are skipped.
/// The output is sorted by `x1`.
pub fn synthesize_sections(
    columns: &[PixelBox],
    structure: PixelBox,
) -> Result<Vec<Section>, RectifyError> {
    if columns.is_empty() {
        return Err(RectifyError::NoColumns);
    }

    let mut columns = columns.to_vec();
    columns.sort_by_key(|b| b.x1);

    let mut cells = Vec::with_capacity(columns.len() + 1);
    let first = columns[0];
    let last = columns[columns.len() - 1];

    if structure.x1 < first.x1 {
        cells.push(PixelBox::new(structure.x1, first.y1, first.x1, structure.y2));
    }
    for pair in columns.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        cells.push(PixelBox::new(left.x2, left.y1, right.x1, right.y2));
    }
    if structure.x2 > last.x2 {
        cells.push(PixelBox::new(last.x2, last.y1, structure.x2, structure.y2));
    }

    let mut sections: Vec<Section> = cells
        .into_iter()
        .filter(|cell| {
            let keep = cell.width() > 0;
            if !keep {
                log::warn!("skipping grid cell with non-positive width: {:?}", cell);
            }
            keep
        })
        .map(Section::grid_cell)
        .chain(columns.into_iter().map(Section::column))
        .collect();
    sections.sort_by_key(|s| s.bbox.x1);

    Ok(sections)
}
