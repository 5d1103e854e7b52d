//! Stacks application library.
//!
//! Service modules (catalog CRUD and signed cover-image URLs) wired onto
//! the kernel's module lifecycle.

pub mod modules;

pub use modules::register_all;
