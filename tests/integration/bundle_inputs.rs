//! Zip bundles as inputs.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use slidetiler::resolver::InputSpec;
use slidetiler::Error;

use crate::fixtures::{archive_entries, TestBench, ToolBehavior};

/// Given a bundle with 2 accepted images and 1 unsupported file
/// Then exactly 2 tasks run, 1 skip is recorded, and at most 2 namespaces appear
#[tokio::test]
async fn test_bundle_with_one_invalid_entry() {
    let bench = TestBench::new(ToolBehavior::Tiles(vec!["{stem}_001", "{stem}_002"]));
    let bundle = bench.bundle("batch.zip", &["first.svs", "scans/second.jpg", "manifest.csv"]);

    let summary = bench
        .run(bench.config(2))
        .execute(vec![InputSpec::new(&bundle)], &bench.output_zip())
        .await
        .unwrap();

    assert_eq!(summary.tasks, 2);
    assert_eq!(summary.skipped_inputs, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(bench.invocations().len(), 2);
    assert!(bench.errors().is_empty());

    let entries = archive_entries(&bench.output_zip());
    let namespaces: HashSet<_> = entries
        .iter()
        .map(|e| e.split('/').next().unwrap().to_string())
        .collect();
    assert!(namespaces.len() <= 2);
    assert_eq!(
        entries,
        [
            "first/first_001.png",
            "first/first_002.png",
            "second/second_001.png",
            "second/second_002.png",
        ]
    );
}

#[tokio::test]
async fn test_workspace_is_removed_after_run() {
    let bench = TestBench::new(ToolBehavior::Tiles(vec!["{stem}_1"]));
    let bundle = bench.bundle("batch.zip", &["a.svs", "b.svs"]);

    bench
        .run(bench.config(2))
        .execute(vec![InputSpec::new(&bundle)], &bench.output_zip())
        .await
        .unwrap();

    let calls = bench.invocations();
    assert_eq!(calls.len(), 2);
    for image in calls {
        assert!(
            !Path::new(&image).exists(),
            "extracted image {} should be gone",
            image
        );
    }
}

#[tokio::test]
async fn test_workspace_is_removed_after_failed_tasks() {
    let bench = TestBench::new(ToolBehavior::Fail {
        code: 1,
        message: "boom",
    });
    let bundle = bench.bundle("batch.zip", &["a.svs"]);

    let summary = bench
        .run(bench.config(1))
        .execute(vec![InputSpec::new(&bundle)], &bench.output_zip())
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    for image in bench.invocations() {
        assert!(!Path::new(&image).exists());
    }
}

#[tokio::test]
async fn test_sole_corrupt_bundle_aborts_run() {
    let bench = TestBench::new(ToolBehavior::Tiles(vec!["{stem}_1"]));
    let bundle = bench.root.join("broken.zip");
    fs::write(&bundle, b"this is not a zip").unwrap();

    let result = bench
        .run(bench.config(1))
        .execute(vec![InputSpec::new(&bundle)], &bench.output_zip())
        .await;

    assert!(matches!(result, Err(Error::InvalidBundle { .. })));
    assert!(!bench.output_zip().exists());
    assert!(bench.invocations().is_empty());
}

#[tokio::test]
async fn test_bundle_and_single_image_together() {
    let bench = TestBench::new(ToolBehavior::Tiles(vec!["{stem}_001"]));
    let bundle = bench.bundle("batch.zip", &["a.svs"]);
    let image = bench.image("slides/b.tiff");

    let summary = bench
        .run(bench.config(2))
        .execute(
            vec![InputSpec::new(&bundle), InputSpec::named(&image, "patient-b")],
            &bench.output_zip(),
        )
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(
        archive_entries(&bench.output_zip()),
        ["a/a_001.png", "patient-b/patient-b_001.png"]
    );
}
