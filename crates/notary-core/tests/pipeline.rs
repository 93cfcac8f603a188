//! End-to-end notarization runs against fake backends

use notary_artifact::{build_root, ArtifactName, ContentDigest, Manifest};
use notary_core::store::{ANCHOR_PROOF_FILE, MANIFEST_FILE, PINS_FILE, STATUS_FILE};
use notary_core::{
    AnchorConfig, AnchorError, EvidenceKind, EvidenceStatus, NotaryConfig, NotaryError, NotaryJob,
    PinConfig, PinRecord, RunOutcome, RunState,
};
use notary_test_utils::{artifact_set, notary_with, FakeAnchor, FakePin, Workspace};
use pretty_assertions::assert_eq;
use std::fs;
use std::time::Duration;

fn name(s: &str) -> ArtifactName {
    ArtifactName::new(s).unwrap()
}

#[tokio::test]
async fn second_run_on_unchanged_set_is_a_no_op() {
    let ws = Workspace::new();
    let anchor = FakeAnchor::ok();
    let pin = FakePin::new().shared();
    let notary = notary_with(&ws.store(), anchor.clone(), pin.clone());
    let artifacts = artifact_set(&[("a.csv", b"1,2"), ("b.csv", b"3,4")]);

    let first = notary.run(artifacts.clone()).await.unwrap();
    let first_bundle = first.bundle().clone();
    let manifest_before = fs::read(first_bundle.path.join(MANIFEST_FILE)).unwrap();
    let pin_calls = pin.calls();

    let second = notary.run(artifacts).await.unwrap();
    assert!(second.is_unchanged());
    assert_eq!(second.root, first.root);
    assert_eq!(second.bundle(), &first_bundle);
    assert_eq!(
        second.trail,
        vec![
            RunState::Collecting,
            RunState::Hashing,
            RunState::RootComputed,
            RunState::Done
        ]
    );

    assert_eq!(anchor.calls().len(), 1);
    assert_eq!(pin.calls(), pin_calls);
    assert_eq!(notary.store().bundles().unwrap().len(), 1);
    assert_eq!(
        fs::read(first_bundle.path.join(MANIFEST_FILE)).unwrap(),
        manifest_before
    );
}

#[tokio::test]
async fn changed_content_persists_next_generation() {
    let ws = Workspace::new();
    let notary = notary_with(&ws.store(), FakeAnchor::ok(), FakePin::new().shared());

    notary.run(artifact_set(&[("a.csv", b"v1")])).await.unwrap();
    let second = notary.run(artifact_set(&[("a.csv", b"v2")])).await.unwrap();

    assert!(!second.is_unchanged());
    assert_eq!(second.bundle().generation, 2);
    assert_eq!(notary.store().latest().unwrap().unwrap(), *second.bundle());
}

#[tokio::test]
async fn foo_bar_scenario() {
    let ws = Workspace::new();
    let anchor = FakeAnchor::ok();
    let notary = notary_with(&ws.store(), anchor.clone(), FakePin::new().shared());

    let report = notary
        .run(artifact_set(&[("foo", b"foo"), ("bar", b"bar")]))
        .await
        .unwrap();

    let leaf_bar = ContentDigest::compute(b"bar");
    let leaf_foo = ContentDigest::compute(b"foo");
    let expected_root = ContentDigest::combine(&leaf_bar, &leaf_foo);
    assert_eq!(report.root, expected_root);
    assert_eq!(build_root(&[leaf_bar, leaf_foo]), expected_root);
    assert_eq!(anchor.calls(), vec![expected_root]);

    let text = fs::read_to_string(report.bundle().path.join(MANIFEST_FILE)).unwrap();
    assert_eq!(
        text,
        format!("{leaf_bar}  bar\n{leaf_foo}  foo\n{expected_root}  MERKLE_ROOT\n")
    );
    let parsed = Manifest::parse(&text).unwrap();
    assert_eq!(parsed.root(), expected_root);
}

#[tokio::test]
async fn anchor_timeout_still_persists_manifest() {
    let ws = Workspace::new();
    let notary = notary_with(&ws.store(), FakeAnchor::stalled(), FakePin::new().shared());

    let report = notary.run(artifact_set(&[("a.csv", b"1")])).await.unwrap();

    let RunOutcome::Persisted { bundle, status } = &report.outcome else {
        panic!("expected a persisted bundle, got {:?}", report.outcome);
    };
    assert!(bundle.path.join(MANIFEST_FILE).is_file());
    assert!(!bundle.path.join(ANCHOR_PROOF_FILE).exists());
    assert_eq!(status.missing, vec!["anchor missing".to_string()]);
    assert_eq!(
        status.produced,
        vec![EvidenceKind::Manifest, EvidenceKind::PinRecord]
    );
    assert_eq!(status.anchor_attempts, 2);
    assert!(status
        .anchor_error
        .as_deref()
        .unwrap()
        .contains("timed out"));

    let on_disk: EvidenceStatus =
        serde_json::from_slice(&fs::read(bundle.path.join(STATUS_FILE)).unwrap()).unwrap();
    assert_eq!(&on_disk, status);
}

#[tokio::test]
async fn non_retryable_anchor_failure_is_recorded_once() {
    let ws = Workspace::new();
    let anchor = FakeAnchor::failing(AnchorError::MalformedResponse("not json".into()));
    let notary = notary_with(&ws.store(), anchor.clone(), FakePin::new().shared());

    let report = notary.run(artifact_set(&[("a.csv", b"1")])).await.unwrap();
    assert_eq!(report.missing(), ["anchor missing".to_string()]);
    assert_eq!(anchor.calls().len(), 1);
}

#[tokio::test]
async fn two_of_three_pins_succeed() {
    let ws = Workspace::new();
    let pin = FakePin::new().failing_on("b.csv").shared();
    let notary = notary_with(&ws.store(), FakeAnchor::ok(), pin.clone());

    // Two artifacts plus the manifest make three pinned files
    let report = notary
        .run(artifact_set(&[("a.csv", b"a"), ("b.csv", b"b")]))
        .await
        .unwrap();

    let pins: PinRecord =
        serde_json::from_slice(&fs::read(report.bundle().path.join(PINS_FILE)).unwrap()).unwrap();
    assert_eq!(pins.pinned.len(), 2);
    assert_eq!(pins.cid(&name("a.csv")), Some(FakePin::cid_for(b"a").as_str()));
    assert!(pins.cid(&name("MANIFEST.sha256")).is_some());
    assert_eq!(pins.failed.len(), 1);
    assert!(pins.failed.contains_key(&name("b.csv")));

    assert_eq!(report.missing(), ["pin missing for file b.csv".to_string()]);
    // The failing file is retried once; the others are not
    assert_eq!(pin.calls(), 3 + 1);
}

#[tokio::test]
async fn stalled_pin_times_out_per_file() {
    let ws = Workspace::new();
    let pin = FakePin::new().stalling_on("slow.bin").shared();
    let notary = notary_with(&ws.store(), FakeAnchor::ok(), pin);

    let report = notary
        .run(artifact_set(&[("fast.bin", b"f"), ("slow.bin", b"s")]))
        .await
        .unwrap();
    assert_eq!(report.missing(), ["pin missing for file slow.bin".to_string()]);
    let status = report.status().unwrap();
    assert!(status.produced.contains(&EvidenceKind::AnchorProof));
}

#[tokio::test]
async fn empty_artifact_set_anchors_sentinel() {
    let ws = Workspace::new();
    let anchor = FakeAnchor::ok();
    let notary = notary_with(&ws.store(), anchor.clone(), FakePin::new().shared());

    let report = notary.run(artifact_set(&[])).await.unwrap();
    assert_eq!(report.root, ContentDigest::EMPTY_TREE);
    assert_eq!(report.artifacts, 0);
    assert_eq!(anchor.calls(), vec![ContentDigest::EMPTY_TREE]);

    let text = fs::read_to_string(report.bundle().path.join(MANIFEST_FILE)).unwrap();
    assert_eq!(text, format!("{}  MERKLE_ROOT\n", ContentDigest::EMPTY_TREE));
}

#[tokio::test]
async fn cancellation_during_anchoring_leaves_store_untouched() {
    let ws = Workspace::new();
    let notary = notary_with(&ws.store(), FakeAnchor::ok(), FakePin::new().shared());
    notary.run(artifact_set(&[("a.csv", b"v1")])).await.unwrap();
    let before = notary.store().latest().unwrap();

    let slow = notary_with(&ws.store(), FakeAnchor::stalled(), FakePin::new().shared());
    let err = slow
        .run_until(
            artifact_set(&[("a.csv", b"v2")]),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, NotaryError::Cancelled { stage: RunState::Anchoring }));
    assert_eq!(notary.store().latest().unwrap(), before);
    assert_eq!(notary.store().bundles().unwrap().len(), 1);
}

#[tokio::test]
async fn job_with_local_pinning_end_to_end() {
    let ws = Workspace::new();
    ws.write("results/summary.csv", b"n,mean\n10,0.5\n")
        .write("plots/fig1.svg", b"<svg/>")
        .write(".hidden", b"skip me");

    let cas = ws.root().join("cas");
    let config = NotaryConfig::new()
        .with_input_dir(ws.artifacts())
        .with_store_dir(ws.store())
        .with_pin(PinConfig::local(&cas));
    let report = NotaryJob::new(config).execute().await.unwrap();

    // Hidden files are not artifacts but are still checksummed
    assert_eq!(report.run.artifacts, 2);
    assert_eq!(report.checksummed, 3);
    let status = report.run.status().unwrap();
    assert_eq!(status.pin_backend, "local");
    assert_eq!(status.missing, vec!["anchor missing".to_string()]);

    let pins: PinRecord = serde_json::from_slice(
        &fs::read(report.run.bundle().path.join(PINS_FILE)).unwrap(),
    )
    .unwrap();
    assert_eq!(pins.pinned.len(), 3);
    let digest = ContentDigest::compute(b"<svg/>");
    assert_eq!(
        pins.cid(&name("plots/fig1.svg")),
        Some(format!("sha256:{digest}").as_str())
    );
    assert!(cas.join(digest.to_hex()).is_file());

    let sums = fs::read_to_string(&report.checksums_path).unwrap();
    let listed: Vec<&str> = sums
        .lines()
        .filter_map(|line| line.split_once("  ").map(|(_, name)| name))
        .collect();
    assert_eq!(listed, [".hidden", "plots/fig1.svg", "results/summary.csv"]);
}

#[tokio::test]
async fn job_reports_unreachable_anchor_as_missing() {
    let ws = Workspace::new();
    ws.write("a.csv", b"1");
    let config = NotaryConfig::new()
        .with_input_dir(ws.artifacts())
        .with_store_dir(ws.store())
        .with_anchor(
            AnchorConfig::http("http://127.0.0.1:1/anchor")
                .with_timeout_secs(2)
                .with_max_attempts(1),
        );

    let report = NotaryJob::new(config).execute().await.unwrap();
    assert_eq!(report.run.missing()[0], "anchor missing");
    assert!(report
        .run
        .status()
        .unwrap()
        .anchor_error
        .as_deref()
        .unwrap()
        .contains("unreachable"));
}

#[tokio::test]
async fn job_rejects_missing_input_dir() {
    let ws = Workspace::new();
    let config = NotaryConfig::new()
        .with_input_dir(ws.root().join("does-not-exist"))
        .with_store_dir(ws.store());

    let err = NotaryJob::new(config).execute().await.unwrap_err();
    assert!(matches!(err, NotaryError::Input(_)));
    assert_eq!(err.stage(), RunState::Collecting);
}
