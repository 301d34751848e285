//! Bundled filesystem backends.

mod memfs;

pub use memfs::MemFs;
