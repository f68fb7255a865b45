//! Instance store implementations

pub mod file;
pub mod memory;

pub use file::FileInstanceStore;
pub use memory::MemoryInstanceStore;
