//! Shared installation context.
//!
//! Groups the state every operation needs so signatures stay short.

use std::fmt;
use std::sync::Arc;

use pour_core::{Layout, Reporter, Settings};

use crate::ops::{InstallError, Stage};
use crate::store::StateDb;

/// Groups common state used during package operations.
#[derive(Clone)]
pub struct Context {
    pub layout: Layout,
    pub settings: Settings,
    pub client: reqwest::Client,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("layout", &self.layout)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        layout: Layout,
        settings: Settings,
        client: reqwest::Client,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            layout,
            settings,
            client,
            reporter,
        }
    }

    /// Open the registry for one operation.
    pub fn open_db(&self, stage: Stage) -> Result<StateDb, InstallError> {
        super::open_db(&self.layout, stage)
    }
}
