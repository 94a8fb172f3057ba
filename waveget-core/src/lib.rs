pub mod analysis;
pub mod core;
pub mod fs_paths;
pub mod models;
