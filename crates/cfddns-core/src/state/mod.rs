// # State Store Implementations
//
// Backends for the advisory address cache.

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemoryStateStore;
