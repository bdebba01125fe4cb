//! Client sync engine for a shared 1024×1024 pixel canvas.

pub mod canvas;
pub mod client;
pub mod config;
pub mod identity;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod viewport;

pub use place_proto as proto;
