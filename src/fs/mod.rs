pub mod builder;
pub mod entry;

pub use builder::SmartFsBuilder;
pub use entry::DirEntry;
