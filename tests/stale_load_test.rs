#![cfg(not(target_arch = "wasm32"))]

use std::{sync::Arc, time::Duration};

use asset_viewer::{
    AssetFormat, AssetLoader, AssetSource, LoadError, LoadPhase, LoadStatus, PendingLoad,
    ViewerConfig,
};

use crate::common::test_utils::{ascii_cube, counting_scene, obj_with_objects};

mod common;

fn loader() -> AssetLoader {
    AssetLoader::new(
        Arc::new(ViewerConfig::default()),
        tokio::runtime::Handle::current(),
    )
}

fn cube() -> AssetSource {
    AssetSource::from_bytes("cube.stl", ascii_cube([0.0; 3], 1.0).into_bytes())
}

fn parts() -> AssetSource {
    AssetSource::from_bytes("parts.obj", obj_with_objects(&["a", "b"]))
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_load_supersedes_the_one_in_flight() {
    let loader = loader();
    let (mut scene, counters) = counting_scene(loader.config());

    let first = loader.start(cube());
    let second = loader.start(parts());
    assert!(!first.is_current());
    assert!(second.is_current());

    assert!(matches!(first.finish().await, LoadStatus::Discarded));
    let LoadStatus::Finished(Ok(outcome)) = second.finish().await else {
        panic!("the latest load should finish");
    };
    scene.replace(outcome.asset).expect("upload");

    let active = scene.active().expect("one asset is shown");
    assert_eq!(active.asset.format, AssetFormat::MeshText);
    assert_eq!(scene.asset_count(), 1);
    assert_eq!(counters.uploads(), 1);
}

/// Polls once per simulated frame until the load settles.
async fn settle(pending: &mut PendingLoad) -> LoadStatus {
    loop {
        match pending.poll() {
            LoadStatus::InFlight => tokio::time::sleep(Duration::from_millis(2)).await,
            status => return status,
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn late_result_of_an_older_load_never_replaces_the_newer_asset() {
    let loader = loader();
    let (mut scene, counters) = counting_scene(loader.config());

    let mut first = loader.start(cube());
    let mut second = loader.start(parts());

    // Show the second asset before looking at the first result at all
    let LoadStatus::Finished(Ok(outcome)) = settle(&mut second).await else {
        panic!("the latest load should finish");
    };
    scene.replace(outcome.asset).expect("upload");

    let status = settle(&mut first).await;
    // The first load ran to completion, its result just arrived too late
    assert_eq!(first.progress().phase(), LoadPhase::Complete);
    assert!(matches!(status, LoadStatus::Discarded));

    let active = scene.active().expect("one asset is shown");
    assert_eq!(active.asset.format, AssetFormat::MeshText);
    assert_eq!(scene.asset_count(), 1);
    assert_eq!(counters.uploads(), 1);
    assert_eq!(counters.disposals(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_loads_are_discarded() {
    let loader = loader();
    let pending = loader.start(cube());
    loader.cancel_all();
    assert!(matches!(pending.finish().await, LoadStatus::Discarded));
}

#[tokio::test(flavor = "multi_thread")]
async fn failures_are_reported_through_the_status() {
    let loader = loader();
    let pending = loader.start(AssetSource::from_bytes("notes.txt", b"hi".to_vec()));
    assert!(matches!(
        pending.finish().await,
        LoadStatus::Finished(Err(LoadError::UnsupportedFormat { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_file_is_a_failed_load() {
    let loader = loader();
    let pending = loader.start(std::path::PathBuf::from("/nonexistent/model.stl"));
    assert!(matches!(
        pending.finish().await,
        LoadStatus::Finished(Err(LoadError::ParseFailure { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn each_successful_load_replaces_and_disposes_the_previous_asset() {
    let loader = loader();
    let (mut scene, counters) = counting_scene(loader.config());

    for (i, source) in [cube(), parts(), cube()].into_iter().enumerate() {
        let LoadStatus::Finished(Ok(outcome)) = loader.start(source).finish().await else {
            panic!("load {i} should finish");
        };
        scene.replace(outcome.asset).expect("upload");

        assert_eq!(scene.asset_count(), 1);
        assert_eq!(counters.uploads(), i + 1);
        assert_eq!(counters.disposals(), i);
    }

    drop(scene);
    assert_eq!(counters.disposals(), 3);
}
