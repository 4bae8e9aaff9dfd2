use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AbpathError, Result};

pub const PT_TO_MM: f32 = 25.4 / 72.0;

/// Fixed A4 canvas in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub body_top: f32,
    pub body_bottom: f32,
    pub line_height: f32,
    pub left_column_x: f32,
    pub right_column_x: f32,
    pub column_width: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_width: 210.0,
            page_height: 297.0,
            margin: 20.0,
            body_top: 25.0,
            body_bottom: 280.0,
            line_height: 5.0,
            left_column_x: 20.0,
            right_column_x: 110.0,
            column_width: 80.0,
        }
    }
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    pub fn line_height_for(&self, font_size: f32) -> f32 {
        self.line_height.max(font_size * PT_TO_MM * 1.2)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnMode {
    Single,
    #[default]
    Two,
}

impl FromStr for ColumnMode {
    type Err = AbpathError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" | "one" | "1" => Ok(ColumnMode::Single),
            "two" | "double" | "2" => Ok(ColumnMode::Two),
            other => Err(AbpathError::Other(format!("unknown column mode {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Left,
    Right,
}

/// Where a block landed: zero-based page, column, left edge and top cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page: usize,
    pub column: Column,
    pub x: f32,
    pub y: f32,
}

/// Cursor bookkeeping over pages and columns.
///
/// Each column has its own cursor. A block that would cross `body_bottom` moves the
/// flow to the right column when the left one is full in two-column mode and the block
/// fits there, otherwise to the top of a fresh page where both cursors restart at `body_top`.
#[derive(Debug, Clone)]
pub struct PageLayout {
    geometry: PageGeometry,
    mode: ColumnMode,
    page: usize,
    column: Column,
    left_y: f32,
    right_y: f32,
}

impl PageLayout {
    pub fn new(geometry: PageGeometry, mode: ColumnMode) -> Self {
        Self {
            geometry,
            mode,
            page: 0,
            column: Column::Left,
            left_y: geometry.body_top,
            right_y: geometry.body_top,
        }
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn mode(&self) -> ColumnMode {
        self.mode
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.page + 1
    }

    pub fn column(&self) -> Column {
        self.column
    }

    pub fn cursor(&self) -> f32 {
        match self.column {
            Column::Left => self.left_y,
            Column::Right => self.right_y,
        }
    }

    pub fn column_x(&self) -> f32 {
        match (self.mode, self.column) {
            (ColumnMode::Single, _) | (ColumnMode::Two, Column::Left) => {
                self.geometry.left_column_x
            }
            (ColumnMode::Two, Column::Right) => self.geometry.right_column_x,
        }
    }

    pub fn column_width(&self) -> f32 {
        match self.mode {
            ColumnMode::Single => self.geometry.content_width(),
            ColumnMode::Two => self.geometry.column_width,
        }
    }

    /// Switches the flow mode; both column cursors continue from the active cursor.
    pub fn set_mode(&mut self, mode: ColumnMode) {
        let cursor = self.cursor();
        self.mode = mode;
        self.column = Column::Left;
        self.left_y = cursor;
        self.right_y = cursor;
    }

    /// Moves to a fresh column or page when `height` does not fit, without consuming space.
    pub fn ensure_space(&mut self, height: f32) -> Placement {
        if self.cursor() + height > self.geometry.body_bottom {
            match (self.mode, self.column) {
                (ColumnMode::Two, Column::Left) => {
                    self.column = Column::Right;
                    if self.right_y + height > self.geometry.body_bottom {
                        self.break_page();
                    }
                }
                _ => self.break_page(),
            }
        }
        self.placement()
    }

    /// Reserves `height` and returns where the block starts.
    pub fn place(&mut self, height: f32) -> Placement {
        let placement = self.ensure_space(height);
        self.advance(height);
        placement
    }

    pub fn advance(&mut self, height: f32) {
        match self.column {
            Column::Left => self.left_y += height,
            Column::Right => self.right_y += height,
        }
    }

    pub fn break_page(&mut self) {
        self.page += 1;
        self.column = Column::Left;
        self.left_y = self.geometry.body_top;
        self.right_y = self.geometry.body_top;
    }

    fn placement(&self) -> Placement {
        Placement {
            page: self.page,
            column: self.column,
            x: self.column_x(),
            y: self.cursor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_column_breaks_to_new_page() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Single);
        let mut pages = Vec::new();
        for _ in 0..60 {
            pages.push(layout.place(5.0).page);
        }
        // 255 mm of body fits 51 five-millimetre lines per page
        assert_eq!(pages.iter().filter(|p| **p == 0).count(), 51);
        assert_eq!(pages[51], 1);
        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.column(), Column::Left);
        assert_eq!(layout.cursor(), 25.0 + 9.0 * 5.0);
    }

    #[test]
    fn two_columns_fill_left_then_right_then_next_page() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Two);
        let first = layout.place(200.0);
        assert_eq!((first.page, first.column, first.x, first.y), (0, Column::Left, 20.0, 25.0));

        let second = layout.place(100.0);
        assert_eq!(second.column, Column::Right);
        assert_eq!(second.x, 110.0);
        assert_eq!(second.y, 25.0);

        let third = layout.place(100.0);
        assert_eq!(third.column, Column::Right);
        assert_eq!(third.y, 125.0);

        let fourth = layout.place(100.0);
        assert_eq!(fourth.page, 1);
        assert_eq!(fourth.column, Column::Left);
        assert_eq!(fourth.y, 25.0);
    }

    #[test]
    fn page_break_resets_both_cursors() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Two);
        layout.place(250.0);
        layout.place(50.0);
        assert_eq!(layout.column(), Column::Right);
        layout.break_page();
        assert_eq!(layout.page(), 1);
        assert_eq!(layout.column(), Column::Left);
        assert_eq!(layout.cursor(), 25.0);
        layout.place(250.0);
        let right = layout.place(10.0);
        assert_eq!(right.column, Column::Right);
        assert_eq!(right.y, 25.0);
    }

    #[test]
    fn oversized_block_is_placed_at_top_of_new_page() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Single);
        layout.place(10.0);
        let huge = layout.place(400.0);
        assert_eq!(huge.page, 1);
        assert_eq!(huge.y, 25.0);
        let next = layout.place(5.0);
        assert_eq!(next.page, 2);
    }

    #[test]
    fn full_right_column_moves_to_next_page() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Single);
        layout.place(245.0);
        layout.set_mode(ColumnMode::Two);
        assert_eq!(layout.mode(), ColumnMode::Two);
        let block = layout.place(20.0);
        assert_eq!((block.page, block.column, block.y), (1, Column::Left, 25.0));
        assert!(block.y + 20.0 <= layout.geometry().body_bottom);
    }

    #[test]
    fn block_taller_than_remaining_right_column_breaks_page() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Two);
        layout.place(200.0);
        let tall = layout.place(260.0);
        assert_eq!((tall.page, tall.column, tall.y), (1, Column::Left, 25.0));
    }

    #[test]
    fn ensure_space_does_not_consume() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Single);
        let before = layout.cursor();
        layout.ensure_space(12.0);
        assert_eq!(layout.cursor(), before);
    }

    #[test]
    fn switching_to_columns_starts_both_at_cursor() {
        let mut layout = PageLayout::new(PageGeometry::default(), ColumnMode::Single);
        layout.place(40.0);
        layout.set_mode(ColumnMode::Two);
        layout.place(215.0);
        let right = layout.place(5.0);
        assert_eq!(right.column, Column::Right);
        assert_eq!(right.y, 65.0);
    }
}
