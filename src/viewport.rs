// src/viewport.rs

use std::ops::Range;

/// Selection cursor and scroll window over a list of `len` rows.
///
/// While a row is selected, `scroll <= selected < scroll + height` holds after every call.
/// No operation fails; out-of-range input is clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    len: usize,
    height: usize,
    selected: Option<usize>,
    scroll: usize,
}

impl Viewport {
    pub fn new(len: usize, height: usize) -> Self {
        Self {
            len,
            height,
            selected: None,
            scroll: 0,
        }
    }

    /// Starts over with a list of `len` rows, keeping the height.
    pub fn reset(&mut self, len: usize) {
        *self = Self::new(len, self.height);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn height(&self) -> usize {
        self.height
    }

    #[cfg(test)]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        if self.len == 0 {
            return;
        }
        let index = index.min(self.len - 1);
        if self.selected == Some(index) {
            return;
        }

        // keep one row of context above
        if index <= self.scroll && index != 0 {
            self.scroll = index - 1;
        }
        // keep two rows of context below
        if index + 2 >= self.scroll + self.height && index != self.len - 1 {
            self.scroll = (index + 2).saturating_sub(self.height);
        }

        self.selected = Some(index);
        self.clamp_scroll();
    }

    pub fn select_next(&mut self) {
        let target = self.selected.map_or(0, |s| s + 1);
        self.select(target);
    }

    pub fn select_previous(&mut self) {
        let target = self.selected.map_or(0, |s| s.saturating_sub(1));
        self.select(target);
    }

    pub fn page_down(&mut self) {
        let target = self.selected.map_or(0, |s| s + self.height.max(1));
        self.select(target);
    }

    pub fn page_up(&mut self) {
        let target = self.selected.map_or(0, |s| s.saturating_sub(self.height.max(1)));
        self.select(target);
    }

    pub fn select_first(&mut self) {
        self.select(0);
    }

    pub fn select_last(&mut self) {
        self.select(self.len.saturating_sub(1));
    }

    /// Changes the number of visible rows without moving the selection.
    pub fn set_height(&mut self, height: usize) {
        if height == self.height {
            return;
        }
        self.height = height;
        self.clamp_scroll();
    }

    /// Indexes of the rows inside the window
    pub fn visible_range(&self) -> Range<usize> {
        self.scroll..(self.scroll + self.height).min(self.len)
    }

    /// The visible part of `items`, each paired with whether it is the selected row.
    pub fn visible<'a, T>(&self, items: &'a [T]) -> impl Iterator<Item = (&'a T, bool)> + 'a {
        let range = self.visible_range();
        let selected = self.selected;
        let start = range.start;
        items[range.start.min(items.len())..range.end.min(items.len())]
            .iter()
            .enumerate()
            .map(move |(i, item)| (item, selected == Some(start + i)))
    }

    fn clamp_scroll(&mut self) {
        let rows = self.height.max(1);
        self.scroll = self.scroll.min(self.len.saturating_sub(rows));
        if let Some(sel) = self.selected {
            if sel < self.scroll {
                self.scroll = sel;
            } else if sel >= self.scroll + rows {
                self.scroll = sel + 1 - rows;
            }
        }
    }
}
