//! Local mirror of the shared canvas.
//!
//! [`PixelStore`] holds one palette index per cell plus the RGBA buffer derived
//! from it. Both are only ever mutated together, so a renderer reading
//! [`PixelStore::export_rgba`] always sees the same picture as the index grid.
//!
//! ```
//! # use place_client_core::canvas::PixelStore;
//! let mut store = PixelStore::new();
//! store.set_pixel(3, 4, 0).unwrap();
//! assert_eq!(store.index_at(3, 4), Some(0));
//! assert_eq!(&store.export_rgba()[..4], &[255, 255, 255, 255]);
//! ```

pub mod store;

pub use store::{PixelStore, SnapshotError};

/// Monotonic counter bumped on every successful mutation.
pub type Revision = u64;
