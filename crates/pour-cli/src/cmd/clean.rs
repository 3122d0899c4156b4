//! Clean command: drop cached downloads and leftover staging

use std::path::Path;

use anyhow::Result;
use pour_core::Reporter;
use pour_core::io::fs::{dir_size, remove_path};

use crate::ops::Context;
use crate::ui::{Output, format_size};

/// Empty `cache/` and `tmp/`. Installed prefixes are never touched.
pub fn clean(ctx: &Context, output: &Output, dry_run: bool) -> Result<()> {
    let mut freed = 0u64;
    for dir in [ctx.layout.cache_dir(), ctx.layout.tmp_dir()] {
        freed += clean_dir(&dir, output, dry_run);
    }

    if dry_run {
        output.info(&format!("(dry run) would free {}", format_size(freed)));
    } else {
        output.success(&format!("Freed {}", format_size(freed)));
    }
    Ok(())
}

fn clean_dir(dir: &Path, output: &Output, dry_run: bool) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut freed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let size = dir_size(&path);
        if dry_run {
            output.info(&format!("would remove {}", path.display()));
            freed += size;
            continue;
        }
        match remove_path(&path) {
            Ok(()) => freed += size,
            // An in-flight install may still hold its staging directory.
            Err(e) => output.warning(&format!("could not remove {}: {e}", path.display())),
        }
    }
    freed
}
