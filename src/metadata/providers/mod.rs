//! Bundled metadata providers.
//!
//! - [`LocalProvider`]: zero-auth, derives metadata purely from names.
//! - [`TmdbProvider`]: primary external catalog (The Movie Database).
//! - [`OmdbProvider`]: secondary external catalog (the Open Movie Database).
//! - [`FfprobeProvider`]: technical probe over the underlying file.

mod disk_cache;
mod ffprobe;
mod local;
mod omdb;
mod tmdb;

pub use disk_cache::DiskCache;
pub use ffprobe::FfprobeProvider;
pub use local::LocalProvider;
pub use omdb::OmdbProvider;
pub use tmdb::TmdbProvider;
