//! Reporter trait for dependency injection
//!
//! This trait allows core logic to report progress and status without
//! being coupled to a specific terminal implementation.

use pour_schema::{PackageName, Version};

pub trait Reporter: Send + Sync {
    /// Updates the progress of a download.
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>);

    /// The archive is being checked against its declared digest.
    fn verifying(&self, name: &PackageName, version: &Version);

    /// The archive is being unpacked into staging.
    fn extracting(&self, name: &PackageName, version: &Version);

    /// Install actions are being applied.
    fn installing(&self, name: &PackageName, version: &Version);

    /// Updates the state of a package to 'removing'.
    fn removing(&self, name: &PackageName, version: &Version);

    /// Marks a package operation as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str, size: Option<u64>);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn downloading(&self, name: &PackageName, version: &Version, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn verifying(&self, name: &PackageName, version: &Version) {
        (**self).verifying(name, version);
    }
    fn extracting(&self, name: &PackageName, version: &Version) {
        (**self).extracting(name, version);
    }
    fn installing(&self, name: &PackageName, version: &Version) {
        (**self).installing(name, version);
    }
    fn removing(&self, name: &PackageName, version: &Version) {
        (**self).removing(name, version);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str, size: Option<u64>) {
        (**self).done(name, version, detail, size);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn downloading(&self, _: &PackageName, _: &Version, _: u64, _: Option<u64>) {}
    fn verifying(&self, _: &PackageName, _: &Version) {}
    fn extracting(&self, _: &PackageName, _: &Version) {}
    fn installing(&self, _: &PackageName, _: &Version) {}
    fn removing(&self, _: &PackageName, _: &Version) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str, _: Option<u64>) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
