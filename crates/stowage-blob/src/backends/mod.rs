//! Durable backend implementations.

pub mod filesystem;
pub mod object;

pub use filesystem::FilesystemBackend;
pub use object::ObjectStoreBackend;
