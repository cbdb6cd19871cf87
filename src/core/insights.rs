//! Append-only business insights memo.
//!
//! Lives in process memory only, separate from the relational store.

use crate::core::error::DispatchError;
use serde::Serialize;
use std::sync::Mutex;

/// Resource identifier under which the rendered memo is exposed.
pub const INSIGHTS_URI: &str = "memo://insights";
pub const INSIGHTS_MIME_TYPE: &str = "text/plain";

const SEPARATOR: &str = "\n\n";

/// Resource descriptor as advertised by `resources/list`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mime_type: &'static str,
}

pub fn insights_resource() -> ResourceDescriptor {
    ResourceDescriptor {
        uri: INSIGHTS_URI,
        name: "Business Insights Memo",
        description: "A living document of discovered business insights",
        mime_type: INSIGHTS_MIME_TYPE,
    }
}

#[derive(Debug, Default)]
pub struct InsightsLog {
    entries: Mutex<Vec<String>>,
}

impl InsightsLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, insight: impl Into<String>) -> Result<(), DispatchError> {
        self.entries
            .lock()
            .map_err(|_| DispatchError::internal("insights lock poisoned"))?
            .push(insight.into());
        Ok(())
    }

    /// All entries in insertion order, blank-line separated.
    pub fn render_all(&self) -> Result<String, DispatchError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| DispatchError::internal("insights lock poisoned"))?;
        Ok(entries.join(SEPARATOR))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the resource at `uri`. Only [`INSIGHTS_URI`] exists.
    pub fn read_resource(&self, uri: &str) -> Result<String, DispatchError> {
        if uri != INSIGHTS_URI {
            return Err(DispatchError::unknown_resource(uri));
        }
        self.render_all()
    }
}
