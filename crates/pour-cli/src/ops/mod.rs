//! Package operations: the install pipeline, uninstall, and activation.

pub mod context;
pub mod error;
pub mod flow;
pub mod install;
pub mod remove;
pub mod switch;

pub use context::Context;
pub use error::{InstallError, Stage};

use pour_core::Layout;
use pour_core::lock::PackageLock;
use pour_schema::PackageName;

use crate::store::StateDb;

/// Open the registry belonging to `layout`.
pub(crate) fn open_db(layout: &Layout, stage: Stage) -> Result<StateDb, InstallError> {
    StateDb::open_at(&layout.db_path()).map_err(InstallError::registry(stage))
}

/// Serialize with every other pour process working on `name`.
pub(crate) async fn lock_package(
    layout: &Layout,
    name: &PackageName,
    stage: Stage,
) -> Result<PackageLock, InstallError> {
    PackageLock::acquire_async(layout, name)
        .await
        .map_err(|e| InstallError::io(stage, format!("cannot lock {name}"), e))
}
