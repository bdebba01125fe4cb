//! Shared primitives for the place canvas protocol.
//!
//! Responsibilities:
//! - the fixed 24-entry palette every pixel index refers to
//! - the bit-packed 4-byte paint/update frames and 1-byte control frames
//! - the 6-bit-per-pixel full canvas snapshot format

pub mod palette;
pub mod wire;

pub use palette::{FALLBACK_INDEX, IndexError, PALETTE, PALETTE_SIZE, Rgb, color_at};
pub use wire::{Command, PixelRecord, SNAPSHOT_LEN, WireMessage};

use thiserror::Error;

/// Side length of the square shared canvas, in model pixels.
pub const CANVAS_WIDTH: usize = 1024;

/// Number of cells on the canvas.
pub const CANVAS_CELLS: usize = CANVAS_WIDTH * CANVAS_WIDTH;

/// Rejection of a local paint or mutation request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("coordinate ({x}, {y}) outside the {CANVAS_WIDTH}x{CANVAS_WIDTH} canvas")]
    CoordinateOutOfRange { x: u32, y: u32 },
    #[error("color index {0} outside the palette")]
    ColorOutOfRange(u8),
}

/// Checks a paint target against the canvas bounds and the palette.
pub fn validate_paint(x: u32, y: u32, color: u8) -> Result<(), ValidationError> {
    if x as usize >= CANVAS_WIDTH || y as usize >= CANVAS_WIDTH {
        return Err(ValidationError::CoordinateOutOfRange { x, y });
    }
    if !palette::is_valid(color as usize) {
        return Err(ValidationError::ColorOutOfRange(color));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_paint_accepts_canvas_corners() {
        assert!(validate_paint(0, 0, 0).is_ok());
        assert!(validate_paint(1023, 1023, 23).is_ok());
    }

    #[test]
    fn validate_paint_rejects_out_of_bounds() {
        assert_eq!(
            validate_paint(1024, 5, 1),
            Err(ValidationError::CoordinateOutOfRange { x: 1024, y: 5 })
        );
        assert_eq!(
            validate_paint(3, 4, 24),
            Err(ValidationError::ColorOutOfRange(24))
        );
    }
}
