//! Terminal output.

pub mod output;
pub mod theme;

pub use output::Output;
pub use theme::{Theme, format_size};
