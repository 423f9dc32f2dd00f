//! Host-backed filesystems: a local-disk backend rooted at a directory
//! ([`OsFs`]) and an ephemeral temporary-directory backend ([`TempFs`])
//! used as staging space by archive writers.

mod os_fs;
mod temp_fs;

pub use os_fs::OsFs;
pub use temp_fs::TempFs;
