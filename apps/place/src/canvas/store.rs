use place_proto::palette::{self, FALLBACK_INDEX, PALETTE, PALETTE_SIZE};
use place_proto::{CANVAS_CELLS, CANVAS_WIDTH, ValidationError, validate_paint};
use thiserror::Error;
use tracing::{trace, warn};

use super::Revision;

const BYTES_PER_TEXEL: usize = 4;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot holds {actual} cells, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
}

/// Authoritative W×W indexed-color grid with its derived RGBA texels.
pub struct PixelStore {
    indices: Vec<u8>,
    rgba: Vec<u8>,
    revision: Revision,
}

impl PixelStore {
    /// A blank canvas, every cell at the fallback index.
    pub fn new() -> Self {
        let white = PALETTE[FALLBACK_INDEX as usize].to_rgba();
        let mut rgba = Vec::with_capacity(CANVAS_CELLS * BYTES_PER_TEXEL);
        for _ in 0..CANVAS_CELLS {
            rgba.extend_from_slice(&white);
        }
        Self {
            indices: vec![FALLBACK_INDEX; CANVAS_CELLS],
            rgba,
            revision: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        CANVAS_WIDTH
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn index_at(&self, x: u32, y: u32) -> Option<u8> {
        cell_offset(x, y).map(|cell| self.indices[cell])
    }

    /// Writes one cell. Out-of-range coordinates or colors are logged and
    /// leave the store untouched.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: u8) -> Result<(), ValidationError> {
        if let Err(err) = validate_paint(x, y, color) {
            warn!(target: "place::canvas", x, y, color, error = %err, "rejected pixel update");
            return Err(err);
        }
        let cell = y as usize * CANVAS_WIDTH + x as usize;
        self.indices[cell] = color;
        self.write_texel(cell, color);
        self.revision += 1;
        trace!(target: "place::canvas", x, y, color, revision = self.revision, "pixel updated");
        Ok(())
    }

    /// Replaces the whole grid in one pass. Out-of-palette entries become
    /// [`FALLBACK_INDEX`].
    pub fn load_snapshot(&mut self, indices: &[u8]) -> Result<(), SnapshotError> {
        if indices.len() != CANVAS_CELLS {
            warn!(
                target: "place::canvas",
                actual = indices.len(),
                expected = CANVAS_CELLS,
                "rejected snapshot with wrong cell count"
            );
            return Err(SnapshotError::WrongLength {
                expected: CANVAS_CELLS,
                actual: indices.len(),
            });
        }
        let mut sanitized = 0usize;
        for (cell, &raw) in indices.iter().enumerate() {
            let index = palette::sanitize(raw);
            if index != raw {
                sanitized += 1;
            }
            self.indices[cell] = index;
            self.write_texel(cell, index);
        }
        self.revision += 1;
        if sanitized > 0 {
            warn!(
                target: "place::canvas",
                sanitized,
                "snapshot carried out-of-palette indices; replaced with fallback"
            );
        }
        trace!(target: "place::canvas", revision = self.revision, "snapshot loaded");
        Ok(())
    }

    /// Read-only RGBA view, 4 bytes per cell, row-major.
    pub fn export_rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Cell count per palette index.
    pub fn histogram(&self) -> [usize; PALETTE_SIZE] {
        let mut counts = [0usize; PALETTE_SIZE];
        for &index in &self.indices {
            counts[index as usize] += 1;
        }
        counts
    }

    #[inline]
    fn write_texel(&mut self, cell: usize, index: u8) {
        let offset = cell * BYTES_PER_TEXEL;
        self.rgba[offset..offset + BYTES_PER_TEXEL]
            .copy_from_slice(&PALETTE[index as usize].to_rgba());
    }
}

impl Default for PixelStore {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn cell_offset(x: u32, y: u32) -> Option<usize> {
    let (x, y) = (x as usize, y as usize);
    if x < CANVAS_WIDTH && y < CANVAS_WIDTH {
        Some(y * CANVAS_WIDTH + x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use place_proto::wire::{pack_snapshot, unpack_snapshot};

    fn texel(store: &PixelStore, x: usize, y: usize) -> [u8; 4] {
        let offset = (y * CANVAS_WIDTH + x) * BYTES_PER_TEXEL;
        let mut out = [0u8; 4];
        out.copy_from_slice(&store.export_rgba()[offset..offset + 4]);
        out
    }

    #[test]
    fn new_store_is_white() {
        let store = PixelStore::new();
        assert_eq!(store.export_rgba().len(), CANVAS_CELLS * 4);
        assert_eq!(store.index_at(0, 0), Some(FALLBACK_INDEX));
        assert_eq!(texel(&store, 1023, 1023), [255, 255, 255, 255]);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn set_pixel_updates_index_and_texel() {
        let mut store = PixelStore::new();
        store.set_pixel(10, 20, 1).expect("valid pixel");
        assert_eq!(store.index_at(10, 20), Some(1));
        assert_eq!(texel(&store, 10, 20), [255, 69, 0, 255]);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn set_pixel_rejects_without_mutation() {
        let mut store = PixelStore::new();
        assert_eq!(
            store.set_pixel(1024, 0, 1),
            Err(ValidationError::CoordinateOutOfRange { x: 1024, y: 0 })
        );
        assert_eq!(
            store.set_pixel(0, 0, 24),
            Err(ValidationError::ColorOutOfRange(24))
        );
        assert_eq!(store.revision(), 0);
        assert_eq!(store.index_at(0, 0), Some(FALLBACK_INDEX));
    }

    #[test]
    fn snapshot_sanitizes_out_of_palette_indices() {
        let mut indices = vec![3u8; CANVAS_CELLS];
        indices[0] = 24;
        indices[1] = 63;
        indices[2] = 23;
        let mut store = PixelStore::new();
        store.load_snapshot(&indices).expect("full snapshot");
        assert_eq!(store.index_at(0, 0), Some(FALLBACK_INDEX));
        assert_eq!(store.index_at(1, 0), Some(FALLBACK_INDEX));
        assert_eq!(store.index_at(2, 0), Some(23));
        assert_eq!(store.index_at(5, 9), Some(3));
        assert_eq!(texel(&store, 2, 0), [0, 0, 0, 255]);
        assert!(store.indices().iter().all(|&i| (i as usize) < PALETTE_SIZE));
    }

    #[test]
    fn snapshot_overwrites_earlier_pixel_updates() {
        let mut store = PixelStore::new();
        store.set_pixel(0, 0, 5).expect("valid pixel");
        store
            .load_snapshot(&vec![0u8; CANVAS_CELLS])
            .expect("full snapshot");
        assert_eq!(store.index_at(0, 0), Some(0));
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn short_snapshot_is_rejected() {
        let mut store = PixelStore::new();
        assert_eq!(
            store.load_snapshot(&[1, 2, 3]),
            Err(SnapshotError::WrongLength {
                expected: CANVAS_CELLS,
                actual: 3
            })
        );
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn packed_snapshot_head_lands_in_first_cells() {
        let mut payload = vec![0u8; place_proto::SNAPSHOT_LEN];
        payload[0] = 0b0000_0100;
        let mut store = PixelStore::new();
        store
            .load_snapshot(&unpack_snapshot(&payload))
            .expect("full snapshot");
        let head: Vec<u8> = (0..4).map(|x| store.index_at(x, 0).unwrap()).collect();
        assert_eq!(head, vec![1, 0, 0, 0]);
        assert_eq!(pack_snapshot(store.indices()), payload);
    }

    #[test]
    fn histogram_counts_cells() {
        let mut store = PixelStore::new();
        store.set_pixel(0, 0, 2).expect("valid pixel");
        let counts = store.histogram();
        assert_eq!(counts[2], 1);
        assert_eq!(counts[FALLBACK_INDEX as usize], CANVAS_CELLS - 1);
    }
}
