use thiserror::Error;

/// Failure taxonomy for the table engine.
///
/// The engine's uniform policy is to degrade and keep editing: none of these
/// variants is ever surfaced to the user as a blocking failure. Callers either
/// fall through to default editor behaviour, recover with a reconstruction
/// heuristic, or (for [`EngineError::HostIndexDesync`]) count the failure
/// toward the session-wide safe-mode latch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A line index no longer exists in the host document. Line numbers shift
    /// under concurrent edits, so this is an expected race, not a bug.
    #[error("line {line} is out of range")]
    LineOutOfRange { line: usize },

    /// The line carries no decodable table metadata. Treated as "fall through
    /// to default editor behaviour", never as an error condition.
    #[error("line {line} is not a table line")]
    NotATableLine { line: usize },

    /// Declared column count disagrees with the delimiter-segment count.
    /// Recovered locally by the canonical rewriter or the renderer.
    #[error("structure mismatch: expected {expected} segments, found {found}")]
    StructureMismatch { expected: usize, found: usize },

    /// The host's internal node index lost an entry we rely on, typically
    /// because a third party mutated the DOM directly. Counted toward the
    /// safe-mode threshold.
    #[error("host node index is missing an entry for line {line}")]
    HostIndexDesync { line: usize },

    /// Refusal to delete the last remaining column of a table.
    #[error("cannot delete the last remaining column")]
    LastColumn,
}
