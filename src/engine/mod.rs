//! Engine module: CLI wiring, hashing, path helpers, progress display

pub mod arg_parser;
pub mod cli;
pub mod hashing;
pub mod progress;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::handle_run;
pub use hashing::{Checksum, hash_file};
pub use tools::{item_name, parent_name, path_relative_to};
