//! History command

use anyhow::{Context as _, Result};
use chrono::DateTime;
use pour_core::Reporter;
use pour_schema::PackageName;

use crate::ops::{Context, Stage};
use crate::store::db::HistoryEvent;
use crate::ui::Output;

pub fn history(ctx: &Context, output: &Output, raw: &str) -> Result<()> {
    let name = PackageName::new(raw);
    let db = ctx
        .open_db(Stage::Query)
        .context("Failed to open state database")?;
    let history = db.get_history(&name)?;

    if history.is_empty() {
        output.info(&format!("No history found for '{name}'"));
        return Ok(());
    }

    output.section(&format!("History for '{name}'"));
    for event in &history {
        let dt = DateTime::from_timestamp_millis(event.timestamp)
            .unwrap_or_default()
            .with_timezone(&chrono::Local);
        let status = if event.success { "" } else { " (failed)" };
        println!("[{}] {}{status}", dt.format("%Y-%m-%d %H:%M:%S"), describe(event));
    }
    Ok(())
}

fn describe(event: &HistoryEvent) -> String {
    let from = event.version_from.as_deref();
    let to = event.version_to.as_deref().unwrap_or("?");
    match (event.action.as_str(), from) {
        ("install", Some(from)) if from != to => format!("Installed {to} (was {from})"),
        ("install", _) => format!("Installed {to}"),
        ("use", Some(from)) => format!("Switched from {from} to {to}"),
        ("use", None) => format!("Activated {to}"),
        ("pin", _) => format!("Pinned to {to}"),
        ("unpin", from) => format!("Unpinned from {}", from.unwrap_or("?")),
        ("uninstall", from) => match event.version_to.as_deref() {
            Some(next) => format!("Removed {}, {next} now active", from.unwrap_or("?")),
            None => format!("Removed {}", from.unwrap_or("?")),
        },
        (action, _) => format!("{action} {to}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(action: &str, from: Option<&str>, to: Option<&str>) -> HistoryEvent {
        HistoryEvent {
            action: action.to_string(),
            version_from: from.map(str::to_string),
            version_to: to.map(str::to_string),
            timestamp: 0,
            success: true,
        }
    }

    #[test]
    fn describes_common_actions() {
        assert_eq!(describe(&event("install", None, Some("0.1"))), "Installed 0.1");
        assert_eq!(
            describe(&event("use", Some("0.1"), Some("0.2"))),
            "Switched from 0.1 to 0.2"
        );
        assert_eq!(
            describe(&event("uninstall", Some("0.2"), Some("0.1"))),
            "Removed 0.2, 0.1 now active"
        );
    }
}
