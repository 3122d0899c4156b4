//! Info command

use anyhow::{Context as _, Result, bail};
use crossterm::style::Stylize;
use pour_schema::PackageName;

use crate::ops::{Context, Stage};
use crate::ui::format_size;

/// Show every installed version of a package, its launchers and its pin.
pub fn info(ctx: &Context, raw: &str) -> Result<()> {
    let name = PackageName::new(raw);
    let db = ctx
        .open_db(Stage::Query)
        .context("Failed to open state database")?;

    let versions = db.list_versions(&name)?;
    if versions.is_empty() {
        bail!("Package '{name}' is not installed");
    }
    let pinned = db.pinned_version(&name)?;

    let lw = 12;
    println!();
    println!("  {}", name.as_str().white().bold());
    println!();

    for row in &versions {
        let date = chrono::DateTime::from_timestamp(row.installed_at, 0)
            .unwrap_or_default()
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d")
            .to_string();
        let mut tags = Vec::new();
        if row.active {
            tags.push("active");
        }
        if pinned.as_ref() == Some(&row.version) {
            tags.push("pinned");
        }
        println!(
            "  {:<lw$}{}, {} {}",
            row.version.as_str(),
            format_size(row.size_bytes),
            date,
            tags.join(", ").green()
        );
        println!("  {:<lw$}{}", "", row.prefix.display().to_string().dark_grey());
        println!("  {:<lw$}{}", "", format!("sha256 {}", row.sha256).dark_grey());
    }

    if let Some(active) = db.active_package(&name)? {
        if !active.wrappers.is_empty() {
            println!();
            for w in &active.wrappers {
                let link = ctx.layout.bin_dir().join(&w.name);
                println!("  {:<lw$}{} -> {}", "launcher", link.display(), w.target.display());
            }
        }
    }
    println!();
    Ok(())
}
