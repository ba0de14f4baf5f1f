//! Fixed-size 2D grids and the bounds/neighbour helpers used by every
//! raster stage.
//!
//! Cells are stored row-major: `(x, y)` lives at `y * width + x`.

use crate::geom::PixelPoint;

/// A `width × height` grid of `T`, indexed by `(x, y)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    /// Create a grid with every cell set to `fill`.
    #[must_use]
    pub fn new(width: usize, height: usize, fill: T) -> Self {
        Self {
            width,
            height,
            cells: vec![fill; width * height],
        }
    }

    /// Create a grid by evaluating `f(x, y)` for every cell.
    #[must_use]
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut cells = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                cells.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    /// Grid width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Grid height.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Value at `(x, y)`. Coordinates must be in bounds.
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height);
        self.cells[y * self.width + x]
    }

    /// Value at `p`. The point must be in bounds.
    #[must_use]
    pub fn at(&self, p: PixelPoint) -> T {
        self.get(p.x, p.y)
    }

    /// Value at signed coordinates, or `None` outside the grid.
    #[must_use]
    pub fn get_signed(&self, x: i64, y: i64) -> Option<T> {
        if is_in_bounds(x, y, self.width, self.height) {
            // In-bounds coordinates are non-negative.
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let value = self.get(x as usize, y as usize);
            Some(value)
        } else {
            None
        }
    }

    /// Overwrite the value at `(x, y)`. Coordinates must be in bounds.
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        debug_assert!(x < self.width && y < self.height);
        self.cells[y * self.width + x] = value;
    }

    /// Overwrite every cell with `value`.
    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }

    /// All cells in row-major order.
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Iterate `(x, y, value)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % width, i / width, v))
    }
}

/// Whether `(x, y)` lies inside a `width × height` grid.
#[must_use]
pub fn is_in_bounds(x: i64, y: i64, width: usize, height: usize) -> bool {
    let w = i64::try_from(width).unwrap_or(i64::MAX);
    let h = i64::try_from(height).unwrap_or(i64::MAX);
    x >= 0 && y >= 0 && x < w && y < h
}

/// Offsets of the 4-connected neighbourhood: up, down, left, right.
const OFFSETS_4: [(i64, i64); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];

/// Offsets of the 8-connected neighbourhood, row by row.
const OFFSETS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

fn neighbors_with(
    p: PixelPoint,
    width: usize,
    height: usize,
    offsets: &[(i64, i64)],
) -> Vec<PixelPoint> {
    let (Ok(px), Ok(py)) = (i64::try_from(p.x), i64::try_from(p.y)) else {
        return Vec::new();
    };
    offsets
        .iter()
        .filter_map(|&(dx, dy)| {
            let (nx, ny) = (px + dx, py + dy);
            if is_in_bounds(nx, ny, width, height) {
                Some(PixelPoint::new(usize::try_from(nx).ok()?, usize::try_from(ny).ok()?))
            } else {
                None
            }
        })
        .collect()
}

/// In-bounds 4-connected neighbours of `p`, in up, down, left, right order.
#[must_use]
pub fn neighbors_4(p: PixelPoint, width: usize, height: usize) -> Vec<PixelPoint> {
    neighbors_with(p, width, height, &OFFSETS_4)
}

/// In-bounds 8-connected neighbours of `p`.
#[must_use]
pub fn neighbors_8(p: PixelPoint, width: usize, height: usize) -> Vec<PixelPoint> {
    neighbors_with(p, width, height, &OFFSETS_8)
}

/// Whether `p` lies on the outermost ring of a `width × height` grid.
#[must_use]
pub const fn is_on_edge(p: PixelPoint, width: usize, height: usize) -> bool {
    p.x == 0 || p.y == 0 || p.x + 1 == width || p.y + 1 == height
}
