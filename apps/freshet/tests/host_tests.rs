//! End-to-end tests driving the engine through the script host.
//!
//! Every scenario loads a real script, runs it through the interpreter's
//! trace stream, and checks the dataflow consequences the way a front-end
//! would: cell reports, symbol status, slices, and snapshots.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use freshet::cli::{parse_flow_order, parse_policy, parse_schedule, parse_timestamp};
use freshet::host::{HostError, Notebook};
use freshet_core::{
    CellId, CellReport, CellStatus, ContextPolicy, ExecutionSchedule, FlowOrder, FreshetError,
    Session, SessionConfig, SymbolStatus, Timestamp,
};

// =============================================================================
// HELPERS
// =============================================================================

/// Load `script` and run every cell, asserting every run is clean.
fn booted(script: &str) -> Notebook {
    let mut nb = Notebook::new(SessionConfig::default());
    nb.load_script(script).expect("load script");
    for run in nb.run_all().expect("run all") {
        assert!(run.clean(), "cell {} failed: {}", run.cell.0, run.stderr);
    }
    nb
}

fn report_for(nb: &Notebook, id: CellId) -> CellReport {
    nb.reports()
        .into_iter()
        .find(|r| r.cell == id)
        .expect("cell report")
}

fn symbol_status(nb: &Notebook, name: &str) -> SymbolStatus {
    let sym = nb.session().symbol_named(name).expect("symbol");
    nb.session()
        .graph()
        .symbol(sym)
        .expect("symbol data")
        .status()
}

// =============================================================================
// STALENESS & SCHEDULING
// =============================================================================

#[test]
fn producer_rerun_walks_staleness_down_the_chain() {
    let mut nb = booted("# %%\nx = 10\n# %%\ny = x + 1\n# %%\nz = y * 2\n");
    assert!(nb.reports().iter().all(|r| r.status == CellStatus::Fresh));
    assert!(nb.reports().iter().all(|r| !r.ready));

    nb.run_cell(CellId(1)).expect("rerun producer");

    // The direct consumer is stale and offered; the transitive one is
    // waiting behind it and withheld
    let c2 = report_for(&nb, CellId(2));
    assert_eq!(c2.status, CellStatus::Stale);
    assert!(c2.ready);
    assert_eq!(c2.stale_inputs, vec!["x".to_string()]);
    let c3 = report_for(&nb, CellId(3));
    assert_eq!(c3.status, CellStatus::Waiting);
    assert!(!c3.ready);
    assert_eq!(symbol_status(&nb, "y"), SymbolStatus::Waiting);
    assert_eq!(symbol_status(&nb, "z"), SymbolStatus::Waiting);

    // Re-running the middle cell clears its mark and passes the offer on
    nb.run_cell(CellId(2)).expect("rerun consumer");
    assert_eq!(report_for(&nb, CellId(2)).status, CellStatus::Fresh);
    let c3 = report_for(&nb, CellId(3));
    assert_eq!(c3.status, CellStatus::Stale);
    assert!(c3.ready);

    nb.run_cell(CellId(3)).expect("rerun tail");
    assert!(nb.reports().iter().all(|r| r.status == CellStatus::Fresh));
}

#[test]
fn augmented_assignment_does_not_stale_its_own_cell() {
    let mut nb = Notebook::new(SessionConfig::default());
    nb.load_script("# %%\nx = 1\n# %%\nx += 1\nprint(x)\n")
        .expect("load");
    let runs = nb.run_all().expect("run all");
    assert_eq!(runs[1].stdout, "2\n");
    assert!(nb.reports().iter().all(|r| r.status == CellStatus::Fresh));

    // The increment reads its own previous write, so re-running it works
    // from the current value and still leaves itself fresh
    let run = nb.run_cell(CellId(2)).expect("rerun");
    assert_eq!(run.stdout, "3\n");
    assert_eq!(report_for(&nb, CellId(2)).status, CellStatus::Fresh);
}

#[test]
fn in_order_flow_withholds_forward_consumers() {
    let mut nb = booted("# %%\nx = 1\n# %%\ny = x + 1\n");
    // Move the producer below its consumer without changing its text
    let outcome = nb
        .register_cell(CellId(1), Some(5), "x = 1\n")
        .expect("move");
    assert!(!outcome.changed);

    nb.set_config(SessionConfig {
        schedule: ExecutionSchedule::Liveness,
        flow_order: FlowOrder::InOrder,
    });
    nb.run_cell(CellId(1)).expect("rerun producer");

    let c2 = report_for(&nb, CellId(2));
    assert_eq!(c2.status, CellStatus::Stale);
    assert!(c2.forward_only);
    assert!(!c2.ready);

    // The same layout under any-order flow is offered
    nb.set_config(SessionConfig::default());
    let c2 = report_for(&nb, CellId(2));
    assert!(!c2.forward_only);
    assert!(c2.ready);
}

#[test]
fn strict_schedule_reports_but_never_offers() {
    let mut nb = booted("# %%\nx = 1\n# %%\ny = x + 1\n");
    nb.set_config(SessionConfig {
        schedule: ExecutionSchedule::Strict,
        flow_order: FlowOrder::AnyOrder,
    });
    nb.run_cell(CellId(1)).expect("rerun");

    let c2 = report_for(&nb, CellId(2));
    assert_eq!(c2.status, CellStatus::Stale);
    assert!(nb.reports().iter().all(|r| !r.ready));
}

// =============================================================================
// CONTAINER PRECISION
// =============================================================================

#[test]
fn element_reads_survive_sibling_writes() {
    let mut nb = booted("# %%\nxs = [1, 2, 3]\n# %%\nhead = xs[0]\n# %%\ntail = xs[2]\n");
    nb.register_cell(CellId(4), None, "xs[2] = 30\n")
        .expect("register");
    let run = nb.run_cell(CellId(4)).expect("run");
    assert!(run.clean());

    // Only the reader of the overwritten slot is disturbed
    assert_eq!(symbol_status(&nb, "head"), SymbolStatus::Fresh);
    assert_eq!(symbol_status(&nb, "tail"), SymbolStatus::Waiting);
    assert_eq!(report_for(&nb, CellId(2)).status, CellStatus::Fresh);
    let c3 = report_for(&nb, CellId(3));
    assert_eq!(c3.status, CellStatus::Stale);
    assert!(c3.ready);
    assert_eq!(c3.stale_inputs, vec!["[2]".to_string()]);
}

#[test]
fn append_disturbs_whole_list_readers_but_not_element_readers() {
    let mut nb = Notebook::new(SessionConfig::default());
    nb.load_script(
        "# %%\nxs = [1, 2]\n# %%\nhead = xs[0]\n# %%\ncopy = list(xs)\n# %%\ntotal = sum(xs)\n# %%\nxs.append(99)\n",
    )
    .expect("load");
    let runs = nb.run_all().expect("run all");
    let append = runs.last().expect("append run");
    assert_eq!(
        append.updated,
        vec!["[2]".to_string(), "xs".to_string()]
    );
    // The copies' own elements ride along with their container
    assert_eq!(
        append.waiting,
        vec![
            "[0]".to_string(),
            "[1]".to_string(),
            "copy".to_string(),
            "total".to_string()
        ]
    );

    // A subscript read pinned only its element; list() and sum() read the
    // container and see the growth
    assert_eq!(symbol_status(&nb, "head"), SymbolStatus::Fresh);
    assert_eq!(symbol_status(&nb, "copy"), SymbolStatus::Waiting);
    assert_eq!(symbol_status(&nb, "total"), SymbolStatus::Waiting);
    assert_eq!(report_for(&nb, CellId(2)).status, CellStatus::Fresh);
    let c3 = report_for(&nb, CellId(3));
    assert_eq!(c3.status, CellStatus::Stale);
    assert!(c3.ready);
    assert_eq!(c3.stale_inputs, vec!["xs".to_string()]);
    assert_eq!(report_for(&nb, CellId(4)).status, CellStatus::Stale);
}

#[test]
fn pop_through_an_alias_tombstones_the_exact_slot() {
    let mut nb = booted("# %%\nxs = [1, 2, 3]\n# %%\nys = xs\n# %%\nlast = xs[2]\n# %%\nys.pop()\n");

    // One shared identity: the pop through ys removed xs's slot 2
    let xs = nb.session().symbol_named("xs").expect("xs");
    let xs_obj = nb.session().graph().symbol(xs).expect("xs symbol").obj.id;
    assert_eq!(nb.session().graph().namespace_children(xs_obj).len(), 2);

    // The reader of the removed slot can no longer trust its input
    let c3 = report_for(&nb, CellId(3));
    assert_eq!(c3.status, CellStatus::Waiting);
    assert!(!c3.ready);
    assert_eq!(report_for(&nb, CellId(2)).status, CellStatus::Stale);
}

#[test]
fn map_keys_are_tracked_as_elements() {
    let mut nb = booted("# %%\nm = {\"a\": 1, \"b\": 2}\n# %%\nva = m[\"a\"]\n# %%\nm[\"c\"] = va + 10\n");
    {
        let m = nb.session().symbol_named("m").expect("m");
        let m_obj = nb.session().graph().symbol(m).expect("m symbol").obj.id;
        assert_eq!(nb.session().graph().namespace_children(m_obj).len(), 3);
    }
    assert_eq!(symbol_status(&nb, "va"), SymbolStatus::Fresh);

    // Deleting the key the reader depends on puts that reader on hold
    nb.register_cell(CellId(4), None, "del m[\"a\"]\n")
        .expect("register");
    let run = nb.run_cell(CellId(4)).expect("run");
    assert!(run.clean());

    let c2 = report_for(&nb, CellId(2));
    assert_eq!(c2.status, CellStatus::Waiting);
    assert_eq!(c2.stale_inputs, vec!["[\"a\"]".to_string()]);
    let m = nb.session().symbol_named("m").expect("m");
    let m_obj = nb.session().graph().symbol(m).expect("m symbol").obj.id;
    assert_eq!(nb.session().graph().namespace_children(m_obj).len(), 2);
}

#[test]
fn deleting_a_name_unbinds_it_and_holds_its_readers() {
    let mut nb = booted("# %%\nx = 1\n# %%\ny = x + 1\n# %%\ndel x\n");
    assert!(nb.session().symbol_named("x").is_none());
    let c2 = report_for(&nb, CellId(2));
    assert_eq!(c2.status, CellStatus::Waiting);
    assert_eq!(c2.stale_inputs, vec!["x".to_string()]);
}

// =============================================================================
// RUNTIME FAILURES
// =============================================================================

#[test]
fn runtime_failure_keeps_the_committed_prefix() {
    let mut nb = Notebook::new(SessionConfig::default());
    nb.load_script("# %%\na = 1\nb = a + boom\nc = 3\n")
        .expect("load");
    let run = nb.run_cell(CellId(1)).expect("run");
    assert!(!run.clean());
    assert!(run.stderr.contains("boom"));
    assert!(run.stderr.contains("not defined"));

    // The first statement committed; the failing and following ones did not
    assert!(nb.session().symbol_named("a").is_some());
    assert!(nb.session().symbol_named("b").is_none());
    assert!(nb.session().symbol_named("c").is_none());
    // The aborted run still spent its execution counter
    assert_eq!(nb.session().stats().exec_counter, 1);
}

#[test]
fn print_renders_values_the_way_literals_are_written() {
    let mut nb = Notebook::new(SessionConfig::default());
    nb.load_script("# %%\nxs = [1, 2]\nm = {\"k\": xs}\nprint(len(xs), sum(xs))\nprint(m)\n")
        .expect("load");
    let runs = nb.run_all().expect("run all");
    assert_eq!(runs[0].stdout, "2 3\n{\"k\": [1, 2]}\n");
}

// =============================================================================
// SLICING
// =============================================================================

#[test]
fn backward_slice_reconstructs_the_value() {
    let nb = booted("# %%\na = 1\n# %%\nb = a + 1\n# %%\nc = b * 2\n# %%\nd = 100\n");
    let slice = nb
        .session()
        .slice_backward("c", None, ContextPolicy::PreferDynamic)
        .expect("slice");
    assert_eq!(slice.code(), "a = 1\nb = a + 1\nc = b * 2\n");
    assert_eq!(
        slice.timestamps(),
        vec![
            Timestamp::new(1, 0),
            Timestamp::new(2, 0),
            Timestamp::new(3, 0)
        ]
    );

    // Replaying the slice in a fresh notebook reproduces the value
    let mut replay = Notebook::new(SessionConfig::default());
    replay.load_script(&slice.code()).expect("load slice");
    for run in replay.run_all().expect("run slice") {
        assert!(run.clean(), "slice failed: {}", run.stderr);
    }
    replay
        .register_cell(CellId(2), None, "print(c)\n")
        .expect("probe");
    let run = replay.run_cell(CellId(2)).expect("print");
    assert_eq!(run.stdout, "4\n");
}

#[test]
fn forward_slice_covers_the_downstream_cone() {
    let nb = booted("# %%\na = 1\n# %%\nb = a + 1\n# %%\nc = b * 2\n# %%\nd = 100\n");
    let slice = nb
        .session()
        .slice_forward("a", None, ContextPolicy::PreferDynamic)
        .expect("slice");
    assert_eq!(slice.code(), "a = 1\nb = a + 1\nc = b * 2\n");
}

#[test]
fn historical_anchor_resolves_against_the_old_run() {
    let mut nb = booted("# %%\na = 1\n# %%\nb = a + 1\n# %%\nc = b * 2\n");
    nb.run_cell(CellId(2)).expect("rerun b");

    // The latest slice of b sees the rerun
    let latest = nb
        .session()
        .slice_backward("b", None, ContextPolicy::PreferDynamic)
        .expect("latest");
    assert_eq!(
        latest.timestamps(),
        vec![Timestamp::new(1, 0), Timestamp::new(4, 0)]
    );

    // A pinned slice stays with the historical update
    let pinned = nb
        .session()
        .slice_backward("b", Some(Timestamp::new(2, 0)), ContextPolicy::PreferDynamic)
        .expect("pinned");
    assert_eq!(
        pinned.timestamps(),
        vec![Timestamp::new(1, 0), Timestamp::new(2, 0)]
    );

    // c still refers to the b version it actually read, not the rerun
    let c_slice = nb
        .session()
        .slice_backward("c", None, ContextPolicy::PreferDynamic)
        .expect("c slice");
    assert_eq!(
        c_slice.timestamps(),
        vec![
            Timestamp::new(1, 0),
            Timestamp::new(2, 0),
            Timestamp::new(3, 0)
        ]
    );
}

#[test]
fn slicing_an_unknown_name_is_an_error() {
    let nb = booted("# %%\nx = 1\n");
    let err = nb
        .session()
        .slice_backward("ghost", None, ContextPolicy::PreferDynamic)
        .expect_err("must fail");
    assert!(matches!(err, FreshetError::NameNotFound(_)));
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

#[test]
fn snapshot_restores_reports_and_slices() {
    let mut nb = booted("# %%\nx = 1\n# %%\ny = x + 1\n");
    nb.run_cell(CellId(1)).expect("rerun");
    let bytes = nb.session().export_snapshot().expect("export");

    let restored = Session::import_snapshot(&bytes).expect("import");
    assert_eq!(restored.stats(), nb.session().stats());
    assert_eq!(restored.reports(), nb.session().reports());
    assert_eq!(
        restored
            .slice_backward("y", None, ContextPolicy::PreferDynamic)
            .expect("restored slice")
            .code(),
        nb.session()
            .slice_backward("y", None, ContextPolicy::PreferDynamic)
            .expect("slice")
            .code()
    );
}

// =============================================================================
// REGISTRATION & PARSE ERRORS
// =============================================================================

#[test]
fn cell_source_with_separators_is_rejected() {
    let mut nb = Notebook::new(SessionConfig::default());
    let err = nb
        .register_cell(CellId(1), None, "# %%\nx = 1\n# %%\ny = 2\n")
        .expect_err("must reject");
    assert!(matches!(err, HostError::Parse { .. }));
}

#[test]
fn running_an_unknown_cell_is_an_error() {
    let mut nb = Notebook::new(SessionConfig::default());
    let err = nb.run_cell(CellId(7)).expect_err("must fail");
    assert!(matches!(
        err,
        HostError::Engine(FreshetError::CellNotFound(CellId(7)))
    ));
}

#[test]
fn parse_errors_carry_the_line_number() {
    let mut nb = Notebook::new(SessionConfig::default());
    let err = nb.load_script("# %%\nx = 1\ny = ((2\n").expect_err("must fail");
    match err {
        HostError::Parse { line, .. } => assert_eq!(line, 3),
        other => panic!("expected a parse error, got {other}"),
    }
}

// =============================================================================
// CLI ARGUMENT PARSING
// =============================================================================

#[test]
fn cli_parsers_accept_the_documented_forms() {
    assert_eq!(parse_schedule("dag").expect("dag"), ExecutionSchedule::Dag);
    assert_eq!(
        parse_schedule("hybrid").expect("hybrid"),
        ExecutionSchedule::Hybrid
    );
    assert_eq!(
        parse_flow_order("in_order").expect("in order"),
        FlowOrder::InOrder
    );
    assert_eq!(
        parse_policy("static_only").expect("static"),
        ContextPolicy::StaticOnly
    );
    assert_eq!(parse_timestamp("3:0").expect("timestamp"), Timestamp::new(3, 0));
}

#[test]
fn cli_parsers_reject_junk() {
    assert!(matches!(parse_schedule("eager"), Err(HostError::Argument(_))));
    assert!(matches!(
        parse_flow_order("sideways"),
        Err(HostError::Argument(_))
    ));
    assert!(matches!(parse_policy("mixed"), Err(HostError::Argument(_))));
    assert!(matches!(parse_timestamp("3"), Err(HostError::Argument(_))));
    assert!(matches!(parse_timestamp("-1:0"), Err(HostError::Argument(_))));
    assert!(matches!(parse_timestamp("a:b"), Err(HostError::Argument(_))));
}
