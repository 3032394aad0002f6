//! References to result sets living in the backend.

use serde::Serialize;

/// A lightweight reference to a named table in the backend.
///
/// The templated name is the logical role (e.g. `__fslink__df_blocked`), the
/// physical name is what the backend knows the table as. Handles are cheap to
/// clone; cloning does not copy data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResultHandle {
    /// Logical role of the table.
    pub templated_name: String,
    /// Backend-unique identifier of the table.
    pub physical_name: String,
    /// Statement that produced the table; `None` for registered inputs.
    pub creating_statement: Option<String>,
    /// Session that owns the table.
    pub session_id: String,
}

impl ResultHandle {
    /// Handle for a table materialised by the engine.
    pub fn created(
        templated_name: impl Into<String>,
        physical_name: impl Into<String>,
        creating_statement: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            templated_name: templated_name.into(),
            physical_name: physical_name.into(),
            creating_statement: Some(creating_statement.into()),
            session_id: session_id.into(),
        }
    }

    /// Handle for a table that already exists in the backend.
    pub fn existing(
        templated_name: impl Into<String>,
        physical_name: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            templated_name: templated_name.into(),
            physical_name: physical_name.into(),
            creating_statement: None,
            session_id: session_id.into(),
        }
    }

    /// Whether the engine created this table (and may therefore drop it).
    pub fn is_engine_created(&self) -> bool {
        self.creating_statement.is_some()
    }

    /// Whether the logical and physical names differ.
    pub fn is_aliased(&self) -> bool {
        self.templated_name != self.physical_name
    }
}
