use thiserror::Error;

/// Number of entries in the canvas palette.
pub const PALETTE_SIZE: usize = 24;

/// Index substituted for anything outside the palette (white).
pub const FALLBACK_INDEX: u8 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Opaque RGBA texel for this color.
    #[inline]
    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// The fixed canvas palette, in wire index order.
pub const PALETTE: [Rgb; PALETTE_SIZE] = [
    Rgb::new(190, 0, 57),
    Rgb::new(255, 69, 0),
    Rgb::new(255, 168, 0),
    Rgb::new(255, 214, 53),
    Rgb::new(0, 163, 104),
    Rgb::new(0, 204, 120),
    Rgb::new(126, 237, 86),
    Rgb::new(0, 117, 111),
    Rgb::new(0, 158, 170),
    Rgb::new(36, 80, 164),
    Rgb::new(54, 144, 234),
    Rgb::new(81, 233, 244),
    Rgb::new(73, 58, 193),
    Rgb::new(106, 92, 255),
    Rgb::new(129, 30, 159),
    Rgb::new(180, 74, 192),
    Rgb::new(255, 56, 129),
    Rgb::new(255, 153, 170),
    Rgb::new(109, 72, 47),
    Rgb::new(156, 105, 38),
    Rgb::new(255, 255, 255),
    Rgb::new(212, 215, 217),
    Rgb::new(137, 141, 144),
    Rgb::new(0, 0, 0),
];

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("palette index {0} out of range (0..{PALETTE_SIZE})")]
pub struct IndexError(pub usize);

pub fn color_at(index: usize) -> Result<Rgb, IndexError> {
    PALETTE.get(index).copied().ok_or(IndexError(index))
}

#[inline]
pub fn is_valid(index: usize) -> bool {
    index < PALETTE_SIZE
}

/// Maps out-of-range indices to [`FALLBACK_INDEX`].
#[inline]
pub fn sanitize(index: u8) -> u8 {
    if is_valid(index as usize) {
        index
    } else {
        FALLBACK_INDEX
    }
}
