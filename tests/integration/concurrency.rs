//! Worker bounds and concurrent aggregation.

use std::collections::HashSet;

use slidetiler::resolver::InputSpec;

use crate::fixtures::{archive_entries, TestBench, ToolBehavior};

/// Given 6 images and a cap of 2 workers
/// Then the tool runs exactly 6 times with at most 2 in flight
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_cap_bounds_in_flight_invocations() {
    let bench = TestBench::new(ToolBehavior::Slow {
        seconds: "0.2",
        tiles: vec!["{stem}_001"],
    });
    let inputs: Vec<_> = (0..6)
        .map(|i| InputSpec::new(bench.image(&format!("slides/s{}/img{}.svs", i, i))))
        .collect();

    let summary = bench
        .run(bench.config(2))
        .execute(inputs, &bench.output_zip())
        .await
        .unwrap();

    assert_eq!(bench.invocations().len(), 6);
    let distinct: HashSet<_> = bench.invocations().into_iter().collect();
    assert_eq!(distinct.len(), 6, "every image is invoked exactly once");
    assert!(summary.peak_in_flight <= 2, "peak was {}", summary.peak_in_flight);
    assert_eq!(summary.succeeded, 6);
    assert_eq!(archive_entries(&bench.output_zip()).len(), 6);
}

/// Given two images finishing at about the same time with many tiles each
/// Then the archive holds the union of both, intact
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completion_keeps_all_entries() {
    let bench = TestBench::new(ToolBehavior::Numbered(40));
    let left = bench.image("left/left.svs");
    let right = bench.image("right/right.svs");

    let summary = bench
        .run(bench.config(2))
        .execute(
            vec![InputSpec::new(&left), InputSpec::new(&right)],
            &bench.output_zip(),
        )
        .await
        .unwrap();

    assert_eq!(summary.entries_written, 80);
    let entries = archive_entries(&bench.output_zip());
    assert_eq!(entries.len(), 80);
    assert!(entries.contains(&"left/left_000.png".to_string()));
    assert!(entries.contains(&"right/right_039.png".to_string()));
    assert!(entries
        .iter()
        .all(|e| e.starts_with("left/left_") || e.starts_with("right/right_")));
}

/// Failures in some images never block the others.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_outcomes_in_one_batch() {
    let bench = TestBench::new(ToolBehavior::Tiles(vec!["{stem}_001"]));
    let good = bench.image("slides/good.svs");
    let unsupported = bench.image("slides/readme.md");
    let missing = bench.root.join("slides/missing.svs");

    let summary = bench
        .run(bench.config(4))
        .execute(
            vec![
                InputSpec::new(&good),
                InputSpec::new(&unsupported),
                InputSpec::new(&missing),
            ],
            &bench.output_zip(),
        )
        .await
        .unwrap();

    assert_eq!(summary.tasks, 1);
    assert_eq!(summary.skipped_inputs, 2);
    assert_eq!(archive_entries(&bench.output_zip()), ["good/good_001.png"]);
}
