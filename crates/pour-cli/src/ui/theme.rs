//! Colors, icons and size formatting shared by every command.

use crossterm::style::Color;

/// Colors for the different parts of a status line.
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub package_name: Color,
    pub version: Color,
    pub secondary: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub active: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            package_name: Color::Cyan,
            version: Color::White,
            secondary: Color::DarkGrey,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            active: Color::Blue,
        }
    }
}

/// Status icons.
#[derive(Debug, Clone)]
pub struct Icons {
    pub active: &'static str,
    pub success: &'static str,
    pub error: &'static str,
    pub warning: &'static str,
    pub info: &'static str,
}

impl Default for Icons {
    fn default() -> Self {
        Self {
            active: "●",
            success: "✓",
            error: "✗",
            warning: "⚠",
            info: "ℹ",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub colors: ColorScheme,
    pub icons: Icons,
}

/// Column width for package names in status lines.
pub const NAME_WIDTH: usize = 16;
/// Column width for versions in status lines.
pub const VERSION_WIDTH: usize = 12;

/// Format bytes for human-readable display
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;
    let mb = kb / 1024.0;
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else if kb >= 1024.0 {
        format!("{mb:.1} MB")
    } else if kb >= 1.0 {
        format!("{kb:.1} KB")
    } else {
        format!("{bytes} B")
    }
}
