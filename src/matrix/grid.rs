//! A dense pitch × time grid.
//!
//! Rows are the 128 MIDI pitches, columns are quantized time steps. Cells are
//! stored row-major in one Vec so a whole pitch row is a contiguous slice.

/// Number of pitch rows in every grid.
pub const PITCH_ROWS: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchGrid<T> {
    width: usize,
    cells: Vec<T>,
}

impl<T: Copy + Default + PartialEq> PitchGrid<T> {
    /// An all-default grid `width` steps wide.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            cells: vec![T::default(); PITCH_ROWS * width],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, pitch: usize, time: usize) -> T {
        self.cells[pitch * self.width + time]
    }

    pub fn set(&mut self, pitch: usize, time: usize, value: T) {
        self.cells[pitch * self.width + time] = value;
    }

    pub fn row(&self, pitch: usize) -> &[T] {
        &self.cells[pitch * self.width..(pitch + 1) * self.width]
    }

    pub fn row_mut(&mut self, pitch: usize) -> &mut [T] {
        &mut self.cells[pitch * self.width..(pitch + 1) * self.width]
    }

    /// Cells that differ from the default, in row-major order.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != T::default())
            .map(move |(i, v)| (i / width, i % width, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|v| *v == T::default())
    }

    /// Apply `f` cell-wise into a grid of the same shape.
    pub fn map<U: Copy + Default + PartialEq>(&self, f: impl Fn(T) -> U) -> PitchGrid<U> {
        PitchGrid {
            width: self.width,
            cells: self.cells.iter().map(|v| f(*v)).collect(),
        }
    }
}
