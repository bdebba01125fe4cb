//! Bit-packed frames exchanged with the canvas server.
//!
//! A pixel record packs four fields into 32 bits, most significant first:
//!
//! ```text
//! | color (6) | x (10) | y (10) | code (6) |
//! ```
//!
//! Inbound frames carry no header; the frame kind is inferred from its length
//! alone (1 byte control, 4 bytes pixel update, [`SNAPSHOT_LEN`] bytes full
//! snapshot).

use bytes::Bytes;

use crate::{CANVAS_CELLS, ValidationError, validate_paint};

const FIELD_MASK: u8 = 0x3F;

pub const CONTROL_FRAME_LEN: usize = 1;
pub const PIXEL_FRAME_LEN: usize = 4;

/// Byte length of a full snapshot: 6 bits per cell, rounded up.
pub const SNAPSHOT_LEN: usize = (CANVAS_CELLS * 6).div_ceil(8);

/// Command tags carried in the low six bits of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Server-side rate limit hit; the paint was not applied.
    TooSoon = 0,
    SetColor = 1,
    FullImage = 2,
}

impl Command {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Command::TooSoon),
            1 => Some(Command::SetColor),
            2 => Some(Command::FullImage),
            _ => None,
        }
    }
}

/// The four logical fields of a pixel frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRecord {
    pub color: u8,
    pub x: u16,
    pub y: u16,
    pub code: u8,
}

impl PixelRecord {
    /// Builds a `SET_COLOR` request after checking canvas bounds and palette range.
    pub fn paint(color: u8, x: u32, y: u32) -> Result<Self, ValidationError> {
        validate_paint(x, y, color)?;
        Ok(Self {
            color,
            x: x as u16,
            y: y as u16,
            code: Command::SetColor.code(),
        })
    }

    pub fn command(&self) -> Option<Command> {
        Command::from_code(self.code)
    }
}

/// A decoded inbound frame. Produced by [`decode`] and consumed immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Control { code: u8 },
    PixelUpdate(PixelRecord),
    FullImage(Bytes),
    Invalid { len: usize },
}

/// Packs a client paint request.
///
/// Fields are not range checked: values wider than their bitfield bleed into
/// the neighbouring field. Use [`PixelRecord::paint`] to validate first.
pub fn encode_paint(record: &PixelRecord) -> [u8; PIXEL_FRAME_LEN] {
    let color = record.color as u32;
    let x = record.x as u32;
    let y = record.y as u32;
    let code = record.code as u32;
    [
        ((color << 2) | (x >> 8)) as u8,
        (x & 0xFF) as u8,
        (y >> 2) as u8,
        (((y & 0x3) << 6) | code) as u8,
    ]
}

pub fn encode_control(code: u8) -> [u8; CONTROL_FRAME_LEN] {
    [code & FIELD_MASK]
}

/// One-byte frame asking the server for a full snapshot.
pub fn snapshot_request() -> [u8; CONTROL_FRAME_LEN] {
    encode_control(Command::FullImage.code())
}

/// Unpacks a server pixel update frame.
pub fn decode_pixel(frame: [u8; PIXEL_FRAME_LEN]) -> PixelRecord {
    let [b0, b1, b2, b3] = frame;
    PixelRecord {
        color: b0 >> 2,
        x: (((b0 & 0x3) as u16) << 8) | b1 as u16,
        y: ((b2 as u16) << 2) | (b3 >> 6) as u16,
        code: b3 & FIELD_MASK,
    }
}

/// Classifies an inbound frame by length and unpacks it.
pub fn decode(frame: Bytes) -> WireMessage {
    match frame.len() {
        CONTROL_FRAME_LEN => WireMessage::Control {
            code: frame[0] & FIELD_MASK,
        },
        PIXEL_FRAME_LEN => {
            WireMessage::PixelUpdate(decode_pixel([frame[0], frame[1], frame[2], frame[3]]))
        }
        SNAPSHOT_LEN => WireMessage::FullImage(frame),
        len => WireMessage::Invalid { len },
    }
}

/// Expands a 6-bit packed bitstream into one raw index per cell.
///
/// Indices are not sanitized here; a trailing partial group is zero padded.
pub fn unpack_snapshot(payload: &[u8]) -> Vec<u8> {
    let groups = payload.len().div_ceil(3);
    let mut out = Vec::with_capacity(groups * 4);
    for chunk in payload.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied().unwrap_or(0);
        let b2 = chunk.get(2).copied().unwrap_or(0);
        out.extend_from_slice(&[
            b0 >> 2,
            ((b0 & 0x3) << 4) | (b1 >> 4),
            ((b1 & 0xF) << 2) | (b2 >> 6),
            b2 & FIELD_MASK,
        ]);
    }
    out
}

/// Packs cell indices four to every three bytes. Inverse of [`unpack_snapshot`].
pub fn pack_snapshot(indices: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity((indices.len() * 6).div_ceil(8));
    for chunk in indices.chunks(4) {
        let i0 = chunk[0] & FIELD_MASK;
        let i1 = chunk.get(1).copied().unwrap_or(0) & FIELD_MASK;
        let i2 = chunk.get(2).copied().unwrap_or(0) & FIELD_MASK;
        let i3 = chunk.get(3).copied().unwrap_or(0) & FIELD_MASK;
        out.extend_from_slice(&[(i0 << 2) | (i1 >> 4), (i1 << 4) | (i2 >> 2), (i2 << 6) | i3]);
    }
    out
}
