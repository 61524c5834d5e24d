//! Edit-and-continue operation log vocabulary.

use std::fmt;

use crate::Handle;

/// Operation recorded against a row in the EncLog table.
///
/// `Default` marks a plain added or updated row. The `Add*` operations are
/// logged against the *owner* (type, property map, event map, or method)
/// immediately before the row being attached to it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EncOperation {
    #[default]
    Default = 0,
    AddMethod = 1,
    AddField = 2,
    AddParameter = 3,
    AddProperty = 4,
    AddEvent = 5,
}

impl EncOperation {
    pub fn from_u32(value: u32) -> Option<EncOperation> {
        Some(match value {
            0 => EncOperation::Default,
            1 => EncOperation::AddMethod,
            2 => EncOperation::AddField,
            3 => EncOperation::AddParameter,
            4 => EncOperation::AddProperty,
            5 => EncOperation::AddEvent,
            _ => return None,
        })
    }

    /// Whether the entry registers a row against a structural owner.
    #[inline]
    pub const fn is_addition(self) -> bool {
        !matches!(self, EncOperation::Default)
    }
}

/// One EncLog entry.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct EncLogEntry {
    pub handle: Handle,
    pub operation: EncOperation,
}

impl EncLogEntry {
    #[inline]
    pub const fn new(handle: Handle, operation: EncOperation) -> Self {
        EncLogEntry { handle, operation }
    }
}

impl fmt::Debug for EncLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Row({}, {:?}, {:?})",
            self.handle.row(),
            self.handle.table(),
            self.operation
        )
    }
}
