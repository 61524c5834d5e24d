//! Error codes for emitter diagnostics.
//!
//! The first digit names the failure category:
//! - E1xxx: structural rejections (the batch is not representable as a delta)
//! - E2xxx: internal inconsistencies (a collaborator broke its contract)
//! - E3xxx: host write failures
//! - W1xxx: warnings attached to a successful delta

use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Structural rejections (E1xxx)
    /// Method body contains a late-bound (dynamically dispatched) operation
    E1001,
    /// Method body references a type embedded by value from another module
    E1002,
    /// Reference to a member added to another module during this session
    E1003,
    /// Update changes the signature or identity of a member
    E1004,
    /// Live local maps to a slot whose synthesized type is unreachable
    E1005,
    /// Edit shape cannot be expressed as a delta
    E1006,

    // Internal inconsistencies (E2xxx)
    /// Prior module image cannot be parsed
    E2001,
    /// Symbol cannot be resolved against the compilation or baseline
    E2002,
    /// Baseline handle refers to a row that does not exist
    E2003,
    /// Compilation and baseline use different interners
    E2004,
    /// Generation chain invariant violated while assembling a delta
    E2005,

    // Host write failures (E3xxx)
    /// Delta sink failed to persist bytes
    E3001,

    // Warnings (W1xxx)
    /// Private dispatch helper skipped in a delta
    W1001,
}

impl ErrorCode {
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::E1001,
        ErrorCode::E1002,
        ErrorCode::E1003,
        ErrorCode::E1004,
        ErrorCode::E1005,
        ErrorCode::E1006,
        ErrorCode::E2001,
        ErrorCode::E2002,
        ErrorCode::E2003,
        ErrorCode::E2004,
        ErrorCode::E2005,
        ErrorCode::E3001,
        ErrorCode::W1001,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::E3001 => "E3001",
            ErrorCode::W1001 => "W1001",
        }
    }

    pub fn is_structural_rejection(&self) -> bool {
        self.as_str().starts_with("E1")
    }

    pub fn is_internal_inconsistency(&self) -> bool {
        self.as_str().starts_with("E2")
    }

    pub fn is_warning(&self) -> bool {
        self.as_str().starts_with('W')
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests;
