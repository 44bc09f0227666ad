//! # Canonical Snapshot Module
//!
//! Deterministic, bit-exact serialization of a whole session. Two sessions
//! with the same history export identical bytes, so snapshots can be
//! compared, content-addressed, and diffed byte-wise.
//!
//! Layout:
//!
//! ```text
//! [header_len: u32 LE] [SnapshotHeader (postcard)] [SnapshotBody (postcard)]
//! ```
//!
//! The header carries counts and a checksum. Imports validate the header,
//! then the size limits, and only then deserialize the body, so a corrupted
//! or hostile snapshot cannot exhaust memory before being rejected.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cell::{Cell, Execution};
use crate::external::CallResolver;
use crate::graph::SymbolGraph;
use crate::primitives::{
    MAX_CELLS, MAX_IMPORT_EDGE_COUNT, MAX_IMPORT_SYMBOL_COUNT, SNAPSHOT_MAGIC, SNAPSHOT_VERSION,
};
use crate::session::{Session, SessionConfig};
use crate::types::{CellId, FreshetError};

// =============================================================================
// SNAPSHOT HEADER
// =============================================================================

/// Header for canonical snapshot files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Magic bytes to identify the format.
    pub magic: [u8; 4],

    /// Format version for compatibility.
    pub version: u8,

    /// Number of symbols in the snapshot, tombstones included.
    pub symbol_count: u64,

    /// Number of dependency edges in the snapshot.
    pub edge_count: u64,

    /// Number of registered cells.
    pub cell_count: u64,

    /// Number of retained execution records.
    pub execution_count: u64,

    /// Checksum of the body (XOR-based, deterministic).
    pub checksum: u64,
}

impl SnapshotHeader {
    /// Create a header with the given counts.
    #[must_use]
    pub fn new(
        symbol_count: u64,
        edge_count: u64,
        cell_count: u64,
        execution_count: u64,
        checksum: u64,
    ) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            symbol_count,
            edge_count,
            cell_count,
            execution_count,
            checksum,
        }
    }

    /// Validate magic and version.
    ///
    /// Error messages are intentionally generic; they must not leak format
    /// internals to whoever supplied the bytes.
    pub fn validate(&self) -> Result<(), FreshetError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(FreshetError::DeserializationError(
                "Invalid snapshot format".to_string(),
            ));
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(FreshetError::DeserializationError(
                "Unsupported snapshot version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// SNAPSHOT BODY
// =============================================================================

/// Everything a session needs to resume, in canonical order.
///
/// All collections inside are `BTreeMap`-backed or sorted by construction,
/// so `postcard` encoding is bit-exact across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotBody {
    /// Session policy at export time.
    pub config: SessionConfig,

    /// The session execution counter.
    pub exec_counter: u64,

    /// The full symbol graph, tombstones and identities included.
    pub graph: SymbolGraph,

    /// Registered cells, sorted by id.
    pub cells: Vec<Cell>,

    /// Retained execution records, sorted by counter.
    pub executions: Vec<Execution>,

    /// External-call resolver tables, host registrations included.
    pub resolver: CallResolver,
}

impl SnapshotBody {
    /// Capture a session's state.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            config: session.config(),
            exec_counter: session.exec_counter(),
            graph: session.graph().clone(),
            cells: session.cells().values().cloned().collect(),
            executions: session.executions().values().cloned().collect(),
            resolver: session.resolver().clone(),
        }
    }

    /// Compute a deterministic checksum of the body.
    ///
    /// XOR-based hashing; no floating point, no randomness. This is **not**
    /// a cryptographic hash. It detects accidental corruption and verifies
    /// export/import integrity; it does not resist deliberate tampering.
    /// For that, compute a BLAKE3 hash of the exported bytes (see
    /// [`snapshot_crypto_hash`] under the `crypto-hash` feature).
    #[must_use]
    pub fn checksum(&self) -> u64 {
        let mut hash: u64 = 0;

        // Hash symbols
        for symbol in self.graph.symbols() {
            hash ^= symbol.id.0.rotate_left(13);
            hash ^= symbol.scope.0.rotate_left(7);
            hash ^= (symbol.updated_timestamps.len() as u64).rotate_left(17);
            let ts = symbol.updated_ts();
            hash ^= (ts.cell as u64).rotate_left(11);
            hash ^= (ts.stmt as u64).rotate_left(5);
            hash ^= (symbol.parents.len() as u64).rotate_left(19);
            if symbol.tombstone {
                hash ^= symbol.id.0.rotate_left(23);
            }
        }

        // Hash scopes
        for scope in self.graph.scopes() {
            hash ^= scope.id.0.rotate_left(29);
            hash ^= (scope.bindings.len() as u64).rotate_left(31);
        }

        // Hash cells
        for cell in &self.cells {
            hash ^= cell.id.0.rotate_left(37);
            hash ^= cell.fingerprint.rotate_left(41);
        }

        // Hash executions
        for execution in &self.executions {
            hash ^= execution.counter.rotate_left(43);
            hash ^= execution.cell.0.rotate_left(47);
        }

        // Hash metadata
        hash ^= self.exec_counter.rotate_left(3);

        hash
    }
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a session to the canonical snapshot format.
///
/// Two exports of the same session are bit-identical.
pub fn export_snapshot(session: &Session) -> Result<Vec<u8>, FreshetError> {
    let body = SnapshotBody::from_session(session);
    let counts = body.graph.counts();

    let header = SnapshotHeader::new(
        counts.symbols + counts.tombstones,
        counts.edges,
        body.cells.len() as u64,
        body.executions.len() as u64,
        body.checksum(),
    );

    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| FreshetError::SerializationError(format!("Header: {e}")))?;
    let body_bytes = postcard::to_allocvec(&body)
        .map_err(|e| FreshetError::SerializationError(format!("Body: {e}")))?;

    // Combine: [header_len: u32] [header] [body]
    let mut result = Vec::with_capacity(4 + header_bytes.len() + body_bytes.len());
    result.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    result.extend_from_slice(&header_bytes);
    result.extend_from_slice(&body_bytes);

    Ok(result)
}

/// Import a session from canonical snapshot bytes.
///
/// Size limits from the header are enforced before the body is touched.
pub fn import_snapshot(data: &[u8]) -> Result<Session, FreshetError> {
    if data.len() < 4 {
        return Err(FreshetError::DeserializationError(
            "Data too short".to_string(),
        ));
    }

    let header_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if data.len() < 4 + header_len {
        return Err(FreshetError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    }

    let header: SnapshotHeader = postcard::from_bytes(&data[4..4 + header_len])
        .map_err(|e| FreshetError::DeserializationError(format!("Header: {e}")))?;

    header.validate()?;

    // Enforce size limits BEFORE deserializing the body
    if header.symbol_count > MAX_IMPORT_SYMBOL_COUNT {
        return Err(FreshetError::LimitExceeded(format!(
            "symbol count {} exceeds import maximum {MAX_IMPORT_SYMBOL_COUNT}",
            header.symbol_count
        )));
    }
    if header.edge_count > MAX_IMPORT_EDGE_COUNT {
        return Err(FreshetError::LimitExceeded(format!(
            "edge count {} exceeds import maximum {MAX_IMPORT_EDGE_COUNT}",
            header.edge_count
        )));
    }
    if header.cell_count > MAX_CELLS as u64 {
        return Err(FreshetError::LimitExceeded(format!(
            "cell count {} exceeds import maximum {MAX_CELLS}",
            header.cell_count
        )));
    }

    let body: SnapshotBody = postcard::from_bytes(&data[4 + header_len..])
        .map_err(|e| FreshetError::DeserializationError(format!("Body: {e}")))?;

    // Verify checksum
    let computed = body.checksum();
    if computed != header.checksum {
        return Err(FreshetError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {computed}",
            header.checksum
        )));
    }

    // Verify counts
    let counts = body.graph.counts();
    if counts.symbols + counts.tombstones != header.symbol_count {
        return Err(FreshetError::DeserializationError(
            "Symbol count mismatch".to_string(),
        ));
    }
    if counts.edges != header.edge_count {
        return Err(FreshetError::DeserializationError(
            "Edge count mismatch".to_string(),
        ));
    }
    if body.cells.len() as u64 != header.cell_count {
        return Err(FreshetError::DeserializationError(
            "Cell count mismatch".to_string(),
        ));
    }
    if body.executions.len() as u64 != header.execution_count {
        return Err(FreshetError::DeserializationError(
            "Execution count mismatch".to_string(),
        ));
    }

    let SnapshotBody {
        config,
        exec_counter,
        graph,
        cells,
        executions,
        resolver,
    } = body;

    let cells: BTreeMap<CellId, Cell> = cells.into_iter().map(|c| (c.id, c)).collect();
    let executions: BTreeMap<u64, Execution> =
        executions.into_iter().map(|e| (e.counter, e)).collect();

    Ok(Session::from_parts(
        config,
        graph,
        cells,
        executions,
        exec_counter,
        resolver,
    ))
}

/// Verify that a session matches a snapshot.
pub fn verify_snapshot(session: &Session, data: &[u8]) -> Result<bool, FreshetError> {
    let imported = import_snapshot(data)?;

    if session.stats() != imported.stats() {
        return Ok(false);
    }

    let original = SnapshotBody::from_session(session);
    let restored = SnapshotBody::from_session(&imported);

    Ok(original.checksum() == restored.checksum())
}

/// Compute the canonical checksum of a session.
///
/// Quick equality check between two sessions without serializing either.
#[must_use]
pub fn snapshot_checksum(session: &Session) -> u64 {
    SnapshotBody::from_session(session).checksum()
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// Compute a BLAKE3 hash of the canonical snapshot.
///
/// Collision-resistant, for security-sensitive comparisons where the
/// XOR checksum is not enough. Returns the hash as a 64-character hex
/// string. Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn snapshot_crypto_hash(session: &Session) -> String {
    let data = export_snapshot(session).unwrap_or_default();
    let hash = blake3::hash(&data);
    hash.to_hex().to_string()
}

/// Verify a session against a BLAKE3 hash.
///
/// Returns `true` if the session's canonical snapshot matches the provided
/// hash. Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn verify_crypto_hash(session: &Session, expected_hash: &str) -> bool {
    snapshot_crypto_hash(session) == expected_hash
}

/// Compute a BLAKE3 hash of raw bytes.
///
/// Only available with the `crypto-hash` feature.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn compute_blake3_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex().to_string()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::StatementInfo;
    use crate::slice::ContextPolicy;
    use crate::tracer::TraceEvent;
    use crate::types::{ObjectId, SymbolFlags};

    fn info(source: &str, reads: &[&str], writes: &[&str]) -> StatementInfo {
        StatementInfo::new(
            source,
            reads.iter().map(|s| (*s).to_string()).collect(),
            writes.iter().map(|s| (*s).to_string()).collect(),
        )
    }

    fn store(name: &str, obj: u64) -> TraceEvent {
        TraceEvent::StoreName {
            name: name.to_string(),
            obj: ObjectId(obj),
            flags: SymbolFlags::default(),
            type_note: None,
            import_origin: None,
        }
    }

    fn load(name: &str) -> TraceEvent {
        TraceEvent::LoadName {
            name: name.to_string(),
        }
    }

    fn run_cell(session: &mut Session, id: CellId, events: Vec<TraceEvent>) {
        session.begin_run(id).expect("begin run");
        session.begin_statement(0).expect("begin statement");
        for event in events {
            session.observe(event).expect("observe");
        }
        session.finish_statement().expect("finish statement");
        session.finish_run("", "").expect("finish run");
    }

    /// Two cells, two runs, one dependency edge.
    fn seeded_session() -> Session {
        let mut session = Session::default();
        session
            .register_cell(CellId(1), 0, vec![info("x = 1", &[], &["x"])])
            .expect("register");
        session
            .register_cell(CellId(2), 1, vec![info("y = x + 1", &["x"], &["y"])])
            .expect("register");
        run_cell(&mut session, CellId(1), vec![store("x", 100)]);
        run_cell(&mut session, CellId(2), vec![load("x"), store("y", 101)]);
        session
    }

    #[test]
    fn snapshot_roundtrip_restores_state() {
        let session = seeded_session();

        let exported = export_snapshot(&session).expect("export should succeed");
        let imported = import_snapshot(&exported).expect("import should succeed");

        assert_eq!(session.stats(), imported.stats());
        assert_eq!(
            session.symbol_named("y").expect("y"),
            imported.symbol_named("y").expect("y")
        );
    }

    #[test]
    fn snapshot_export_deterministic() {
        let session = seeded_session();

        let export1 = export_snapshot(&session).expect("export 1");
        let export2 = export_snapshot(&session).expect("export 2");

        assert_eq!(export1, export2, "Exports must be bit-identical");
    }

    #[test]
    fn snapshot_checksum_deterministic() {
        let session = seeded_session();

        assert_eq!(snapshot_checksum(&session), snapshot_checksum(&session));
    }

    #[test]
    fn imported_session_keeps_slicing() {
        let session = seeded_session();
        let exported = export_snapshot(&session).expect("export");
        let imported = import_snapshot(&exported).expect("import");

        let slice = imported
            .slice_backward("y", None, ContextPolicy::PreferDynamic)
            .expect("slice");
        assert_eq!(slice.code(), "x = 1\ny = x + 1\n");
    }

    #[test]
    fn imported_session_accepts_new_runs() {
        let session = seeded_session();
        let exported = export_snapshot(&session).expect("export");
        let mut imported = import_snapshot(&exported).expect("import");

        let counter = imported.begin_run(CellId(1)).expect("begin run");
        assert_eq!(counter, 3, "counter continues past imported history");
        imported.begin_statement(0).expect("begin statement");
        imported.observe(store("x", 200)).expect("observe");
        imported.finish_statement().expect("finish statement");
        let outcome = imported.finish_run("", "").expect("finish run");
        assert_eq!(outcome.counter, 3);
    }

    #[test]
    fn verify_snapshot_success() {
        let session = seeded_session();
        let exported = export_snapshot(&session).expect("export");

        assert!(verify_snapshot(&session, &exported).expect("verify"));
    }

    #[test]
    fn verify_snapshot_detects_drift() {
        let session = seeded_session();
        let exported = export_snapshot(&session).expect("export");

        let mut drifted = seeded_session();
        run_cell(&mut drifted, CellId(1), vec![store("x", 300)]);

        assert!(!verify_snapshot(&drifted, &exported).expect("verify"));
    }

    #[test]
    fn empty_session_roundtrip() {
        let session = Session::default();

        let exported = export_snapshot(&session).expect("export empty");
        let imported = import_snapshot(&exported).expect("import empty");

        assert_eq!(imported.stats().cells, 0);
        assert_eq!(imported.stats().executions, 0);
    }

    #[test]
    fn snapshot_file_roundtrip() {
        let session = seeded_session();
        let exported = export_snapshot(&session).expect("export");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.frsh");
        std::fs::write(&path, &exported).expect("write");
        let read = std::fs::read(&path).expect("read");

        let imported = import_snapshot(&read).expect("import");
        assert_eq!(session.stats(), imported.stats());
    }

    // =========================================================================
    // Corrupted imports
    // =========================================================================

    #[test]
    fn corrupted_import_empty_data() {
        let result = import_snapshot(&[]);
        assert!(matches!(
            result,
            Err(FreshetError::DeserializationError(_))
        ));
    }

    #[test]
    fn corrupted_import_too_short_for_header_len() {
        // Only 3 bytes, need at least 4 for header length
        let result = import_snapshot(&[0x01, 0x02, 0x03]);
        assert!(result.is_err());
    }

    #[test]
    fn corrupted_import_header_length_exceeds_data() {
        // Header length claims 1000 bytes, only 3 present
        let mut data = vec![0xe8, 0x03, 0x00, 0x00];
        data.extend_from_slice(&[0x00, 0x00, 0x00]);

        let result = import_snapshot(&data);
        assert!(result.is_err());
    }

    #[test]
    fn corrupted_import_invalid_magic_bytes() {
        let session = seeded_session();
        let mut exported = export_snapshot(&session).expect("export");

        // Magic bytes sit right after the header length
        exported[4] = 0xFF;
        exported[5] = 0xFF;
        exported[6] = 0xFF;
        exported[7] = 0xFF;

        let result = import_snapshot(&exported);
        assert!(matches!(
            result,
            Err(FreshetError::DeserializationError(_))
        ));
    }

    #[test]
    fn corrupted_import_invalid_version() {
        let session = seeded_session();
        let mut exported = export_snapshot(&session).expect("export");

        // Version is the byte after the 4 magic bytes inside the header
        exported[4 + 4] = 99;

        let result = import_snapshot(&exported);
        assert!(result.is_err());
    }

    #[test]
    fn corrupted_import_checksum_mismatch() {
        let session = seeded_session();
        let mut exported = export_snapshot(&session).expect("export");

        if let Some(last) = exported.last_mut() {
            *last ^= 0xFF;
        }

        // Either the checksum catches it or the body fails to decode
        let result = import_snapshot(&exported);
        assert!(result.is_err());
    }

    #[test]
    fn corrupted_import_truncated_body() {
        let session = seeded_session();
        let exported = export_snapshot(&session).expect("export");

        let header_len =
            u32::from_le_bytes([exported[0], exported[1], exported[2], exported[3]]) as usize;
        let truncated = exported[..4 + header_len + 1].to_vec();

        let result = import_snapshot(&truncated);
        assert!(result.is_err());
    }

    #[test]
    fn oversized_header_counts_rejected() {
        // A header claiming too many symbols is rejected before any body
        // bytes are deserialized
        let header = SnapshotHeader::new(MAX_IMPORT_SYMBOL_COUNT + 1, 0, 0, 0, 0);
        let header_bytes = postcard::to_allocvec(&header).expect("header");
        let mut data = (header_bytes.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&header_bytes);

        let result = import_snapshot(&data);
        assert!(matches!(result, Err(FreshetError::LimitExceeded(_))));
    }

    #[test]
    fn header_validation() {
        let header = SnapshotHeader::new(10, 5, 2, 2, 12345);
        assert!(header.validate().is_ok());

        let bad_magic = SnapshotHeader {
            magic: *b"XXXX",
            ..header.clone()
        };
        assert!(bad_magic.validate().is_err());

        let bad_version = SnapshotHeader {
            version: 99,
            ..header
        };
        assert!(bad_version.validate().is_err());
    }
}
