// LogSift - tests/e2e_sort.rs
//
// End-to-end tests for the sort -> analyse -> detect -> filter pipeline.
//
// Every test writes a real log file to a temporary directory and drives the
// public entry points against it: real memory-mapped splitting, real worker
// pools, real merges. No mocks.

use chrono::{TimeZone, Utc};
use logsift::app::sort::{CancelToken, LogSorter, SortConfig, SortResult};
use logsift::core::filter::{Field, FilterCondition, FilterSpec, FilterValue, LogicalOp, Operator};
use logsift::core::model::{LogEntry, MalformedPlacement};
use logsift::core::patterns::DetectionConfig;
use logsift::util::error::{LogSiftError, SortError};
use logsift::{analyze_log_statistics, detect_patterns, filter_entries, sort_log_file};
use std::io::Write;
use std::path::Path;

// =============================================================================
// Helpers
// =============================================================================

fn write_log(lines: &[String]) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp log");
    for line in lines {
        writeln!(f, "{line}").expect("write line");
    }
    f.flush().expect("flush");
    f
}

/// Small deterministic generator so the mixed-content fixture is stable
/// across runs without a rand dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

/// ~2000 lines over one hour with duplicate timestamps, optional fractions,
/// every level, lines without a level, and interleaved malformed lines.
fn mixed_lines() -> Vec<String> {
    let levels = ["ERROR", "WARN", "INFO", "DEBUG", "TRACE", "[INFO]", "WARNING:"];
    let mut rng = Lcg(42);
    let mut lines = Vec::new();
    for n in 0..2000 {
        match rng.next() % 29 {
            0 => lines.push(format!("    at com.example.Worker.run(Worker.java:{n})")),
            1 => lines.push(String::new()),
            2 => {
                let secs = rng.next() % 3600;
                lines.push(format!(
                    "2024-03-01 09:{:02}:{:02} request {n} completed",
                    secs / 60,
                    secs % 60
                ));
            }
            _ => {
                let secs = rng.next() % 3600;
                let level = levels[(rng.next() % levels.len() as u64) as usize];
                let frac = if rng.next() % 3 == 0 {
                    format!(".{:03}", rng.next() % 1000)
                } else {
                    String::new()
                };
                lines.push(format!(
                    "2024-03-01 09:{:02}:{:02}{frac} {level} event {n} user={}",
                    secs / 60,
                    secs % 60,
                    rng.next() % 50
                ));
            }
        }
    }
    lines
}

fn sorter(chunk_size_bytes: u64, max_workers: usize, placement: MalformedPlacement) -> LogSorter {
    LogSorter::new(SortConfig {
        chunk_size_bytes,
        max_workers,
        malformed_placement: placement,
        ..Default::default()
    })
    .expect("valid sort config")
}

fn raw_lines(entries: impl Iterator<Item = LogEntry>) -> Vec<String> {
    entries.map(|e| e.raw_text).collect()
}

/// Sort with the chunk count capped at `chunks` (tiny target, capped workers).
fn sort_in_chunks(path: &Path, chunks: usize, placement: MalformedPlacement) -> SortResult {
    let result = sorter(1, chunks, placement)
        .sort_file(path)
        .expect("sort succeeds");
    assert!(
        result.chunks_used <= chunks,
        "asked for {chunks} chunks, got {}",
        result.chunks_used
    );
    result
}

fn boom_lines(count: usize, malformed_every: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(count);
    for n in 0..count {
        if n % malformed_every == malformed_every / 2 {
            lines.push(format!("!! malformed line {n}"));
        } else {
            lines.push(format!("2024-01-15 10:00:0{} ERROR boom", (n * 7) % 10));
        }
    }
    lines
}

// =============================================================================
// Sort properties
// =============================================================================

/// Well-formed output is non-decreasing by (timestamp, offset).
#[test]
fn e2e_sort_output_is_ordered() {
    let f = write_log(&mixed_lines());
    let result = sorter(4096, 8, MalformedPlacement::Separate)
        .sort_file(f.path())
        .unwrap();
    assert!(result.chunks_used > 1, "fixture should span several chunks");

    let entries: Vec<LogEntry> = result.ordered_entries.collect();
    assert!(!entries.is_empty());
    for pair in entries.windows(2) {
        let a = (pair[0].timestamp, pair[0].source_offset);
        let b = (pair[1].timestamp, pair[1].source_offset);
        assert!(a < b, "out of order: {:?} then {:?}", pair[0].raw_text, pair[1].raw_text);
    }
}

/// No line is lost or duplicated, and the counts add up.
#[test]
fn e2e_sort_conserves_lines() {
    let lines = mixed_lines();
    let f = write_log(&lines);
    let result = sorter(2048, 16, MalformedPlacement::Separate)
        .sort_file(f.path())
        .unwrap();

    assert_eq!(result.total_lines, lines.len());
    assert_eq!(
        result.total_lines,
        result.well_formed_count + result.malformed_count
    );
    assert_eq!(result.ordered_entries.len(), result.well_formed_count);
    assert_eq!(result.malformed.len(), result.malformed_count);

    let mut out = raw_lines(result.ordered_entries.chain(result.malformed));
    let mut expected = lines;
    out.sort();
    expected.sort();
    assert_eq!(out, expected);
}

/// Sorting already-sorted output reproduces it byte for byte.
#[test]
fn e2e_sort_is_idempotent() {
    let f = write_log(&mixed_lines());
    let once = raw_lines(
        sorter(4096, 8, MalformedPlacement::Attached)
            .sort_file(f.path())
            .unwrap()
            .ordered_entries,
    );

    let g = write_log(&once);
    let twice = raw_lines(
        sorter(1500, 8, MalformedPlacement::Attached)
            .sort_file(g.path())
            .unwrap()
            .ordered_entries,
    );
    assert_eq!(once, twice);
    assert_eq!(
        std::fs::read(g.path()).unwrap(),
        format!("{}\n", twice.join("\n")).into_bytes()
    );
}

/// 1, 4 and 16 chunks give the same global order in every placement mode.
#[test]
fn e2e_sort_is_chunk_invariant() {
    let f = write_log(&mixed_lines());
    for placement in [
        MalformedPlacement::Separate,
        MalformedPlacement::Trailing,
        MalformedPlacement::Attached,
    ] {
        let single = sort_in_chunks(f.path(), 1, placement);
        assert_eq!(single.chunks_used, 1);
        let reference_malformed = raw_lines(single.malformed.into_iter());
        let reference = raw_lines(single.ordered_entries);

        for chunks in [4, 16] {
            let result = sort_in_chunks(f.path(), chunks, placement);
            assert!(result.chunks_used > 1);
            assert_eq!(
                raw_lines(result.malformed.into_iter()),
                reference_malformed,
                "{placement:?} with {chunks} chunks"
            );
            assert_eq!(
                raw_lines(result.ordered_entries),
                reference,
                "{placement:?} with {chunks} chunks"
            );
        }
    }
}

#[test]
fn e2e_trailing_places_malformed_last() {
    let lines = mixed_lines();
    let f = write_log(&lines);
    let result = sort_in_chunks(f.path(), 4, MalformedPlacement::Trailing);
    let well_formed = result.well_formed_count;
    let entries: Vec<LogEntry> = result.ordered_entries.collect();

    assert_eq!(entries.len(), lines.len());
    assert!(entries[..well_formed].iter().all(|e| e.well_formed));
    assert!(entries[well_formed..].iter().all(|e| !e.well_formed));
    // Trailing malformed lines keep file order.
    assert!(entries[well_formed..]
        .windows(2)
        .all(|w| w[0].source_offset < w[1].source_offset));
}

#[test]
fn e2e_attached_keeps_continuations_with_their_line() {
    let lines: Vec<String> = [
        "2024-01-15 10:00:05 ERROR request failed",
        "    at handler.rs:10",
        "    at server.rs:99",
        "2024-01-15 10:00:01 INFO started",
        "2024-01-15 10:00:03 WARN slow",
        "    (took 3s)",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let f = write_log(&lines);
    let result = sort_in_chunks(f.path(), 16, MalformedPlacement::Attached);
    assert_eq!(
        raw_lines(result.ordered_entries),
        vec![
            "2024-01-15 10:00:01 INFO started",
            "2024-01-15 10:00:03 WARN slow",
            "    (took 3s)",
            "2024-01-15 10:00:05 ERROR request failed",
            "    at handler.rs:10",
            "    at server.rs:99",
        ]
    );
}

#[test]
fn e2e_file_without_trailing_newline() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"2024-01-15 10:00:02 INFO b\n2024-01-15 10:00:01 INFO a")
        .unwrap();
    f.flush().unwrap();
    let result = sort_log_file(f.path(), Some(8), Some(4)).unwrap();
    assert_eq!(result.total_lines, 2);
    assert_eq!(
        raw_lines(result.ordered_entries),
        vec!["2024-01-15 10:00:01 INFO a", "2024-01-15 10:00:02 INFO b"]
    );
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn e2e_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = sort_log_file(&dir.path().join("absent.log"), None, None).unwrap_err();
    assert!(
        matches!(err, LogSiftError::Io { operation: "open", .. }),
        "got {err}"
    );
}

#[test]
fn e2e_cancelled_sort_reports_progress() {
    let f = write_log(&mixed_lines());
    let token = CancelToken::new();
    let sorter = sorter(1024, 4, MalformedPlacement::Separate).with_cancel_token(token.clone());
    token.cancel();
    match sorter.sort_file(f.path()) {
        Err(LogSiftError::Sort(SortError::Cancelled { completed, total })) => {
            assert_eq!(completed, 0);
            assert!(total >= 1);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[test]
fn e2e_invalid_config_rejected_before_io() {
    let err = LogSorter::new(SortConfig {
        max_workers: 100_000,
        ..Default::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("max_workers"), "got {err}");
}

// =============================================================================
// Analysis pipeline
// =============================================================================

/// 10,000 lines: 9,995 ERROR lines spread over ten seconds, 5 malformed.
#[test]
fn e2e_ten_thousand_line_pipeline() {
    let lines = boom_lines(10_000, 2000);
    assert_eq!(lines.iter().filter(|l| l.starts_with("!!")).count(), 5);
    let f = write_log(&lines);

    let result = sort_log_file(f.path(), Some(16 * 1024), Some(8)).unwrap();
    assert_eq!(result.well_formed_count, 9995);
    assert_eq!(result.malformed_count, 5);
    assert_eq!(result.total_lines, 10_000);

    let SortResult {
        ordered_entries,
        malformed,
        ..
    } = result;
    let ordered: Vec<LogEntry> = ordered_entries.collect();
    let seconds: Vec<u32> = ordered
        .iter()
        .map(|e| chrono::Timelike::second(&e.timestamp.unwrap()))
        .collect();
    assert!(seconds.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seconds.first(), Some(&0));
    assert_eq!(seconds.last(), Some(&9));

    let all: Vec<LogEntry> = ordered.iter().cloned().chain(malformed).collect();
    let stats = analyze_log_statistics(&all);
    assert_eq!(stats.total_count, 10_000);
    assert!((stats.data_quality_score - 0.9995).abs() < 1e-9);
    assert_eq!(stats.time_span_ms, 9_000);
    assert_eq!(
        stats.histogram.iter().map(|b| b.count).sum::<usize>(),
        9995
    );

    let config = DetectionConfig {
        min_cluster_size: 5,
        cluster_window_secs: 60,
        ..Default::default()
    };
    let report = detect_patterns(&ordered, Some(&config)).unwrap();
    assert_eq!(report.error_clusters.len(), 1);
    let cluster = &report.error_clusters[0];
    assert_eq!(cluster.start, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
    assert_eq!(cluster.end, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 9).unwrap());
    assert_eq!(cluster.count, 9995);

    assert_eq!(report.repeated_patterns.len(), 1);
    assert_eq!(report.repeated_patterns[0].template, "boom");
    assert_eq!(report.repeated_patterns[0].count, 9995);
}

fn ten_line_entries() -> Vec<LogEntry> {
    let mut lines = Vec::new();
    for i in (0..10).rev() {
        lines.push(format!("2024-01-15 10:00:0{i} ERROR boom"));
        if i % 2 == 0 {
            lines.push(format!("garbage {i}"));
        }
    }
    let f = write_log(&lines);
    let result = sort_log_file(f.path(), Some(64), Some(4)).unwrap();
    assert_eq!(result.malformed_count, 5);
    result.ordered_entries.chain(result.malformed).collect()
}

#[test]
fn e2e_time_window_filter() {
    let entries = ten_line_entries();
    let spec = FilterSpec::time_window(
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 5).unwrap(),
    );
    let (matched, stats) = filter_entries(entries, &spec).unwrap();
    assert_eq!(matched.len(), 5);
    assert_eq!(stats.examined, 15);
    assert_eq!(stats.matched, 5);
}

/// The same filter sent as JSON by an outer protocol layer.
#[test]
fn e2e_filter_spec_from_json() {
    let json = r#"{
        "name": "first five seconds",
        "logic": "and",
        "conditions": [
            {"field": "timestamp", "operator": "gte", "value": "2024-01-15 10:00:00"},
            {"field": "timestamp", "operator": "lt", "value": "2024-01-15T10:00:05Z"}
        ]
    }"#;
    let spec: FilterSpec = serde_json::from_str(json).unwrap();
    let (matched, _) = filter_entries(ten_line_entries(), &spec).unwrap();
    assert_eq!(matched.len(), 5);
}

/// `level = ERROR OR level = WARN` selects the same entries as
/// `level IN [ERROR, WARN]`.
#[test]
fn e2e_or_of_levels_equals_in_list() {
    let f = write_log(&mixed_lines());
    let entries: Vec<LogEntry> = sort_log_file(f.path(), Some(4096), Some(4))
        .unwrap()
        .ordered_entries
        .collect();

    let either = FilterSpec::new(
        "either",
        LogicalOp::Or,
        vec![
            FilterCondition::new(Field::Level, Operator::Eq, FilterValue::Text("ERROR".into())),
            FilterCondition::new(Field::Level, Operator::Eq, FilterValue::Text("WARN".into())),
        ],
    );
    let (a, a_stats) = filter_entries(entries.clone(), &either).unwrap();
    let (b, _) = filter_entries(entries, &FilterSpec::warnings_and_errors()).unwrap();
    assert!(!a.is_empty());
    assert_eq!(a, b);
    assert_eq!(a_stats.condition_hits.iter().sum::<usize>(), a.len());
}

#[test]
fn e2e_invalid_filter_rejected() {
    let spec = FilterSpec::new(
        "bad",
        LogicalOp::And,
        vec![FilterCondition::new(
            Field::Message,
            Operator::Matches,
            FilterValue::Text("(unclosed".into()),
        )],
    );
    let err = filter_entries(ten_line_entries(), &spec).unwrap_err();
    assert!(matches!(err, LogSiftError::Filter(_)), "got {err}");
}

// =============================================================================
// Scratch storage
// =============================================================================

#[test]
fn e2e_scratch_dir_emptied_after_stream_dropped() {
    let f = write_log(&mixed_lines());
    let base = tempfile::tempdir().expect("scratch base");
    let sorter = LogSorter::new(SortConfig {
        chunk_size_bytes: 1,
        max_workers: 8,
        scratch_dir: Some(base.path().to_path_buf()),
        ..Default::default()
    })
    .expect("valid sort config");

    let result = sorter.sort_file(f.path()).expect("sort succeeds");
    assert!(result.chunks_used > 1);
    assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 1);

    let expected = result.well_formed_count;
    let SortResult {
        ordered_entries,
        malformed,
        ..
    } = result;
    let errors = ordered_entries.error_slot();
    assert_eq!(ordered_entries.count(), expected);
    assert!(errors.take().is_none());

    // The malformed stream still holds the directory open.
    assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 1);
    drop(malformed);
    assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
}
