//! Garage board: mark holds on a board photo, keep a local collection of
//! climbs, and export it with rendered previews for static publishing.

pub mod climb;
pub mod compositor;
pub mod config;
pub mod editor;
pub mod export;
pub mod session;
pub mod store;
