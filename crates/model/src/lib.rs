use std::fmt;

use serde::{Deserialize, Serialize};

/// Tile counts must factor into these primes so the split stays balanced.
pub const ACCEPTABLE_DIVISORS: [u32; 4] = [2, 3, 5, 7];

// Rounding slack so that page coordinates sitting a hair off an integer
// boundary do not grow the pixel rectangle by one.
const ROUNDING_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

/// Rectangle in device pixels. `x1`/`y1` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

/// Rectangle in page space (points, 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLayoutError {
    ZeroDivisions,
    TileIndexOutOfBounds,
}

impl fmt::Display for TileLayoutError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileLayoutError::ZeroDivisions => {
                write!(formatter, "tile count must be greater than zero")
            }
            TileLayoutError::TileIndexOutOfBounds => {
                write!(formatter, "tile index is out of bounds for the layout")
            }
        }
    }
}

impl std::error::Error for TileLayoutError {}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Split the size into tiles that together cover it exactly.
    ///
    /// `divisions` is lowered to the nearest acceptable tile count first, so
    /// the returned vector may be shorter than requested.
    pub fn split(self, divisions: u32) -> Result<Vec<PixelRect>, TileLayoutError> {
        let divisions = acceptable_tile_count(divisions)?;
        Ok(split_acceptable(self, divisions))
    }
}

impl PixelRect {
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub const fn width(&self) -> u32 {
        if self.x1 > self.x0 {
            (self.x1 - self.x0) as u32
        } else {
            0
        }
    }

    pub const fn height(&self) -> u32 {
        if self.y1 > self.y0 {
            (self.y1 - self.y0) as u32
        } else {
            0
        }
    }

    pub const fn size(&self) -> PixelSize {
        PixelSize::new(self.width(), self.height())
    }

    pub const fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }

    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }
}

impl PageRect {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn from_origin_size(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// True when the rectangle is finite and has a positive area.
    pub fn is_renderable(&self) -> bool {
        self.is_finite() && self.width() > 0.0 && self.height() > 0.0
    }

    pub fn contains(&self, other: &PageRect) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    pub fn intersect(&self, other: &PageRect) -> Option<PageRect> {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x1 > x0 && y1 > y0 {
            Some(PageRect::new(x0, y0, x1, y1))
        } else {
            None
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x0 + dx, self.y0 + dy, self.x1 + dx, self.y1 + dy)
    }

    /// Linear interpolation of origin and size, `t == 0` is `self`.
    pub fn lerp(&self, target: &PageRect, t: f64) -> Self {
        let x = self.x0 + (target.x0 - self.x0) * t;
        let y = self.y0 + (target.y0 - self.y0) * t;
        let width = self.width() + (target.width() - self.width()) * t;
        let height = self.height() + (target.height() - self.height()) * t;
        Self::from_origin_size(x, y, width, height)
    }

    pub fn round(&self) -> PixelRect {
        self.round_scaled(1.0)
    }

    /// Scale by `zoom` and round outwards to whole pixels.
    pub fn round_scaled(&self, zoom: f64) -> PixelRect {
        PixelRect::new(
            (self.x0 * zoom + ROUNDING_EPSILON).floor() as i32,
            (self.y0 * zoom + ROUNDING_EPSILON).floor() as i32,
            (self.x1 * zoom - ROUNDING_EPSILON).ceil() as i32,
            (self.y1 * zoom - ROUNDING_EPSILON).ceil() as i32,
        )
    }
}

/// Whether `count` factors entirely into [`ACCEPTABLE_DIVISORS`].
pub fn is_acceptable_tile_count(count: u32) -> bool {
    if count == 0 {
        return false;
    }
    let mut remaining = count;
    for divisor in ACCEPTABLE_DIVISORS {
        while remaining % divisor == 0 {
            remaining /= divisor;
        }
    }
    remaining == 1
}

/// Largest acceptable tile count that does not exceed `requested`.
pub fn acceptable_tile_count(requested: u32) -> Result<u32, TileLayoutError> {
    (1..=requested)
        .rev()
        .find(|&count| is_acceptable_tile_count(count))
        .ok_or(TileLayoutError::ZeroDivisions)
}

fn part(value: u32, numerator: u32, denominator: u32) -> i32 {
    (value as u64 * numerator as u64 / denominator as u64) as i32
}

fn split_acceptable(size: PixelSize, divisions: u32) -> Vec<PixelRect> {
    let width = size.width;
    let height = size.height;
    let w = width as i32;
    let h = height as i32;
    let portrait = height > width;

    match divisions {
        1 => vec![PixelRect::new(0, 0, w, h)],
        2 if portrait => vec![
            PixelRect::new(0, 0, w, part(height, 1, 2)),
            PixelRect::new(0, part(height, 1, 2), w, h),
        ],
        2 => vec![
            PixelRect::new(0, 0, part(width, 1, 2), h),
            PixelRect::new(part(width, 1, 2), 0, w, h),
        ],
        3 | 5 | 7 => split_odd_prime(size, divisions),
        _ => {
            let divisor = ACCEPTABLE_DIVISORS
                .into_iter()
                .find(|divisor| divisions % divisor == 0)
                .unwrap_or(divisions);
            let mut tiles = Vec::with_capacity(divisions as usize);
            for outer in split_acceptable(size, divisions / divisor) {
                for inner in split_acceptable(outer.size(), divisor) {
                    tiles.push(inner.offset(outer.x0, outer.y0));
                }
            }
            tiles
        }
    }
}

// Odd primes are laid out as pairs of half-width (or half-height) cells
// followed by a single full-span cell closing the last band.
fn split_odd_prime(size: PixelSize, divisions: u32) -> Vec<PixelRect> {
    let portrait = size.height > size.width;
    let (long, short) = if portrait {
        (size.height, size.width)
    } else {
        (size.width, size.height)
    };
    let bands = divisions / 2;
    let short_mid = part(short, 1, 2);
    let long_end = long as i32;
    let short_end = short as i32;

    let mut cells = Vec::with_capacity(divisions as usize);
    for band in 0..bands {
        let start = part(long, 2 * band, divisions);
        let end = part(long, 2 * (band + 1), divisions);
        cells.push((start, 0, end, short_mid));
        cells.push((start, short_mid, end, short_end));
    }
    cells.push((part(long, 2 * bands, divisions), 0, long_end, short_end));

    cells
        .into_iter()
        .map(|(long0, short0, long1, short1)| {
            if portrait {
                PixelRect::new(short0, long0, short1, long1)
            } else {
                PixelRect::new(long0, short0, long1, short1)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileDescriptor {
    pub index: usize,
    pub bounds: PixelRect,
}

/// Device-space tiling of one render target. All tiles share a target and
/// never overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    target_size: PixelSize,
    tiles: Box<[TileDescriptor]>,
}

impl TileLayout {
    pub fn new(target_size: PixelSize, requested_tiles: u32) -> Result<Self, TileLayoutError> {
        let tiles = target_size
            .split(requested_tiles)?
            .into_iter()
            .enumerate()
            .map(|(index, bounds)| TileDescriptor { index, bounds })
            .collect();
        Ok(Self { target_size, tiles })
    }

    pub fn target_size(&self) -> PixelSize {
        self.target_size
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[TileDescriptor] {
        &self.tiles
    }

    pub fn tile(&self, index: usize) -> Result<&TileDescriptor, TileLayoutError> {
        self.tiles
            .get(index)
            .ok_or(TileLayoutError::TileIndexOutOfBounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(size: PixelSize, tiles: &[PixelRect]) {
        let mut hits = vec![0u8; size.pixel_count()];
        for tile in tiles {
            for y in tile.y0..tile.y1 {
                for x in tile.x0..tile.x1 {
                    assert!(x >= 0 && y >= 0, "tile {tile:?} leaves the target");
                    hits[y as usize * size.width as usize + x as usize] += 1;
                }
            }
        }
        assert!(
            hits.iter().all(|&count| count == 1),
            "tiles must cover every pixel exactly once"
        );
    }

    #[test]
    fn acceptable_counts_round_down_to_smooth_numbers() {
        assert_eq!(acceptable_tile_count(1), Ok(1));
        assert_eq!(acceptable_tile_count(8), Ok(8));
        assert_eq!(acceptable_tile_count(11), Ok(10));
        assert_eq!(acceptable_tile_count(13), Ok(12));
        assert_eq!(acceptable_tile_count(23), Ok(21));
        assert_eq!(acceptable_tile_count(0), Err(TileLayoutError::ZeroDivisions));
        assert!(!is_acceptable_tile_count(22));
        assert!(is_acceptable_tile_count(49));
    }

    #[test]
    fn split_covers_target_exactly_for_many_counts() {
        for divisions in 1..=16 {
            for size in [PixelSize::new(37, 23), PixelSize::new(23, 37)] {
                let tiles = size.split(divisions).expect("split");
                assert_eq!(
                    tiles.len() as u32,
                    acceptable_tile_count(divisions).expect("count")
                );
                assert_exact_cover(size, &tiles);
            }
        }
    }

    #[test]
    fn portrait_two_way_split_stacks_rows() {
        let tiles = PixelSize::new(100, 300).split(2).expect("split");
        assert_eq!(tiles[0], PixelRect::new(0, 0, 100, 150));
        assert_eq!(tiles[1], PixelRect::new(0, 150, 100, 300));
    }

    #[test]
    fn landscape_three_way_split_matches_reference_pattern() {
        let tiles = PixelSize::new(90, 40).split(3).expect("split");
        assert_eq!(
            tiles,
            vec![
                PixelRect::new(0, 0, 60, 20),
                PixelRect::new(0, 20, 60, 40),
                PixelRect::new(60, 0, 90, 40),
            ]
        );
    }

    #[test]
    fn round_scaled_absorbs_float_noise() {
        let rect = PageRect::new(0.0000001, 10.0, 99.9999999, 20.0);
        assert_eq!(rect.round_scaled(2.0), PixelRect::new(0, 20, 200, 40));
    }

    #[test]
    fn layout_rejects_out_of_range_tile() {
        let layout = TileLayout::new(PixelSize::new(64, 64), 4).expect("layout");
        assert_eq!(layout.len(), 4);
        assert_eq!(layout.tile(3).map(|tile| tile.index), Ok(3));
        assert_eq!(
            layout.tile(4).map(|tile| tile.index),
            Err(TileLayoutError::TileIndexOutOfBounds)
        );
    }

    #[test]
    fn lerp_interpolates_origin_and_size() {
        let from = PageRect::new(0.0, 0.0, 10.0, 10.0);
        let to = PageRect::new(10.0, 20.0, 30.0, 60.0);
        assert_eq!(from.lerp(&to, 0.5), PageRect::new(5.0, 10.0, 20.0, 35.0));
    }
}
