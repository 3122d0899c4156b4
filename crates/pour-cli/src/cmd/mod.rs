//! Command handlers, one module per subcommand.

pub mod clean;
pub mod completions;
pub mod hash;
pub mod history;
pub mod info;
pub mod install;
pub mod list;
pub mod pin;
pub mod uninstall;
pub mod r#use;
