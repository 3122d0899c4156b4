//! Launcher scripts in the shared `bin` directory.
//!
//! A launcher is a small POSIX shell script that execs a file inside a
//! package prefix, forwarding every argument. The second line carries a
//! marker so pour can tell its own launchers apart from foreign files:
//!
//! ```text
//! #!/bin/sh
//! # pour wrapper: pomodoromac 0.1
//! exec '/home/me/.pour/cellar/pomodoromac/0.1/pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac' "$@"
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use pour_schema::{PackageName, Version};

const MARKER: &str = "# pour wrapper:";

/// Script text for a launcher that execs `target`.
pub fn render(name: &PackageName, version: &Version, target: &Path) -> String {
    format!(
        "#!/bin/sh\n{MARKER} {name} {version}\nexec {} \"$@\"\n",
        shell_quote(&target.to_string_lossy())
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A launcher written to a temp file next to its destination, not yet visible.
///
/// Dropping it without [`commit`](Self::commit) removes the temp file.
#[derive(Debug)]
pub struct StagedWrapper {
    file: NamedTempFile,
    dest: PathBuf,
}

impl StagedWrapper {
    /// Write `contents` into a temp file inside `bin_dir`, mode 0755.
    pub fn stage(bin_dir: &Path, link_name: &str, contents: &str) -> io::Result<Self> {
        std::fs::create_dir_all(bin_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{link_name}."))
            .tempfile_in(bin_dir)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(Self {
            file,
            dest: bin_dir.join(link_name),
        })
    }

    /// Final location of the launcher.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Atomically rename the launcher into place, replacing any existing file.
    pub fn commit(self) -> io::Result<PathBuf> {
        self.file.persist(&self.dest).map_err(|e| e.error)?;
        Ok(self.dest)
    }
}

/// The exec target of a pour launcher, or `None` for any other file.
pub fn read_target(path: &Path) -> Option<PathBuf> {
    let script = std::fs::read_to_string(path).ok()?;
    let mut lines = script.lines();
    if lines.next()? != "#!/bin/sh" || !lines.next()?.starts_with(MARKER) {
        return None;
    }
    let quoted = lines.next()?.strip_prefix("exec '")?.strip_suffix("' \"$@\"")?;
    Some(PathBuf::from(quoted.replace(r"'\''", "'")))
}

/// Whether the launcher at `path` execs something under `prefix`.
pub fn points_into(path: &Path, prefix: &Path) -> bool {
    read_target(path).is_some_and(|target| target.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(bin_dir: &Path, link_name: &str, contents: &str) -> io::Result<PathBuf> {
        StagedWrapper::stage(bin_dir, link_name, contents)?.commit()
    }

    fn ids() -> (PackageName, Version) {
        (PackageName::new("pomodoromac"), Version::new("0.1"))
    }

    #[test]
    fn render_quotes_target() {
        let (name, version) = ids();
        let script = render(&name, &version, Path::new("/opt/it's here/tool"));
        assert!(script.starts_with("#!/bin/sh\n# pour wrapper: pomodoromac 0.1\n"));
        assert!(script.contains(r"exec '/opt/it'\''s here/tool' "));
    }

    #[test]
    fn written_launcher_reads_back() {
        let dir = tempdir().unwrap();
        let (name, version) = ids();
        let prefix = dir.path().join("cellar/pomodoromac/0.1");
        let target = prefix.join("it's/tool");

        let path = write(
            &dir.path().join("bin"),
            "pomodoromac",
            &render(&name, &version, &target),
        )
        .unwrap();

        assert_eq!(read_target(&path), Some(target));
        assert!(points_into(&path, &prefix));
        assert!(!points_into(&path, &dir.path().join("cellar/pomodoromac/0.2")));
    }

    #[test]
    fn foreign_files_are_not_launchers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, "#!/bin/sh\nexec /usr/bin/true\n").unwrap();
        assert_eq!(read_target(&path), None);
        assert!(!points_into(&path, dir.path()));
    }

    #[test]
    fn dropped_stage_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let bin = dir.path().join("bin");
        let staged = StagedWrapper::stage(&bin, "tool", "#!/bin/sh\n").unwrap();
        assert_eq!(staged.dest(), bin.join("tool"));
        drop(staged);
        assert_eq!(std::fs::read_dir(&bin).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn launcher_forwards_args_and_exit_code() {
        use std::os::unix::fs::PermissionsExt;
        use std::process::Command;

        let dir = tempdir().unwrap();
        let (name, version) = ids();
        let target = dir.path().join("prefix/echo args");
        std::fs::create_dir_all(target.parent().unwrap()).unwrap();
        std::fs::write(&target, "#!/bin/sh\nprintf '%s|' \"$@\"\nexit 7\n").unwrap();
        std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)).unwrap();

        let launcher = write(
            &dir.path().join("bin"),
            "echoer",
            &render(&name, &version, &target),
        )
        .unwrap();
        let mode = std::fs::metadata(&launcher).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        let output = Command::new(&launcher)
            .args(["a b", "c"])
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "a b|c|");
        assert_eq!(output.status.code(), Some(7));
    }
}
