//! # Engine Constants
//!
//! Hardcoded runtime constants for the Freshet CORE.
//!
//! The engine starts each session with zero state but fixed limits.
//! These constants are compiled into the binary and are immutable at runtime.
//!
//! ## Groups
//!
//! 1. **Format constants**: magic bytes and version for the canonical snapshot.
//! 2. **Budget constants**: bounds on propagation and slicing work.
//! 3. **Input validation limits**: bounds on what a host may register.

/// Magic bytes for the Freshet canonical snapshot header.
///
/// - Snapshot = Magic Bytes ("FRSH") + Version (u8) before payload.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"FRSH";

/// Current canonical snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Maximum number of symbols accepted when importing a snapshot.
///
/// Validated against the header BEFORE deserializing the body, so a
/// corrupted or malicious snapshot cannot exhaust memory.
pub const MAX_IMPORT_SYMBOL_COUNT: u64 = 1_000_000;

/// Maximum number of dependency edges accepted when importing a snapshot.
///
/// Validated against the header BEFORE deserializing the body.
pub const MAX_IMPORT_EDGE_COUNT: u64 = 10_000_000;

/// Maximum number of symbol visits in a single propagation pass.
///
/// Propagation must be computationally bounded. Exceeding the budget marks
/// the remaining frontier unknown instead of looping; it never fails the
/// execution that triggered it.
pub const MAX_PROPAGATION_VISITS: usize = 1_000_000;

/// Maximum number of statements a single slice may contain.
///
/// Slices over well-formed histories are finite, but the budget bounds the
/// damage of a corrupted graph. Exceeding it is reported as an error.
pub const MAX_SLICE_STATEMENTS: usize = 100_000;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for a symbol or attribute name.
///
/// Names longer than this are rejected at the hook boundary.
/// This prevents memory exhaustion from malformed host input.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum number of statements in a single cell.
///
/// Cells longer than this are rejected at registration.
pub const MAX_STATEMENTS_PER_CELL: usize = 1_000;

/// Maximum length for a statement's source text.
///
/// Statement sources longer than this (64KB) are rejected at registration.
pub const MAX_STATEMENT_SOURCE_LENGTH: usize = 65536;

/// Maximum number of cells a session will register.
///
/// Registrations beyond this are rejected to prevent DoS.
pub const MAX_CELLS: usize = 100_000;

/// Maximum bytes of captured output stored per cell run.
///
/// Longer captures are truncated at this boundary, not rejected.
pub const MAX_CAPTURED_OUTPUT: usize = 1_048_576;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_magic_correct() {
        assert_eq!(&SNAPSHOT_MAGIC, b"FRSH");
    }

    #[test]
    fn import_limits_ordered() {
        // Edge cap must dominate the symbol cap (graphs are edge-heavy)
        assert!(MAX_IMPORT_EDGE_COUNT > MAX_IMPORT_SYMBOL_COUNT);
    }
}
