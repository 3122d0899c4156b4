//! List command

use anyhow::{Context as _, Result};
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, Color, Table};

use crate::ops::{Context, Stage};
use crate::store::db::PackageRow;
use crate::ui::format_size;

/// List all installed packages
pub fn list(ctx: &Context) -> Result<()> {
    let db = ctx
        .open_db(Stage::Query)
        .context("Failed to open state database")?;
    let packages = db.list_packages()?;

    if packages.is_empty() {
        println!("No packages installed.");
        println!("Run 'pour install <formula>' to get started.");
        return Ok(());
    }

    println!("{}", render(&packages));
    let total: u64 = packages.iter().map(|p| p.size_bytes).sum();
    println!("{} installed, {}", packages.len(), format_size(total));
    Ok(())
}

fn render(packages: &[PackageRow]) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING).set_header(vec![
        Cell::new("name"),
        Cell::new("version"),
        Cell::new("size").set_alignment(CellAlignment::Right),
        Cell::new("installed"),
        Cell::new(""),
    ]);

    for pkg in packages {
        let date = chrono::DateTime::from_timestamp(pkg.installed_at, 0)
            .unwrap_or_default()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d")
            .to_string();
        let marker = if pkg.active {
            Cell::new("active").fg(Color::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![
            Cell::new(pkg.name.as_str()).fg(Color::Cyan),
            Cell::new(pkg.version.as_str()),
            Cell::new(format_size(pkg.size_bytes)).set_alignment(CellAlignment::Right),
            Cell::new(date),
            marker,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pour_schema::{PackageName, Version};

    #[test]
    fn table_marks_the_active_version() {
        let row = |v: &str, active| PackageRow {
            name: PackageName::new("pomodoromac"),
            version: Version::new(v),
            sha256: "00".repeat(32),
            prefix: "/p".into(),
            size_bytes: 2048,
            installed_at: 0,
            active,
        };
        let text = render(&[row("0.1", false), row("0.2", true)]).to_string();
        assert!(text.contains("pomodoromac"));
        assert!(text.contains("2.0 KB"));
        assert_eq!(text.matches("active").count(), 1);
    }

    #[test]
    fn unreadable_registry_is_reported_as_a_query_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = crate::ops::install::tests::context(&dir);
        std::fs::create_dir_all(ctx.layout.root()).unwrap();
        std::fs::write(ctx.layout.root().join("var"), "not a directory").unwrap();

        let err = list(&ctx).unwrap_err();
        assert!(format!("{err:#}").contains("query failed"));
    }
}
