use std::sync::Arc;

use img_ingest::{
    AssetId, CancelCrop, CompressionConfig, CropDelta, Dimensions, ErrorKind, FixedRegion,
    InjectedFailure, MemoryStore, OutputFormat, Pipeline, PipelineOptions, PipelineResult,
    ScriptedDrag, SelectedFile, Stage, StoreOp,
};

mod common;
use common::*;

fn decoded_dimensions(bytes: &[u8]) -> Dimensions {
    let img = image::load_from_memory(bytes).unwrap();
    Dimensions::new(img.width(), img.height())
}

fn done_id(result: &PipelineResult) -> AssetId {
    match result {
        PipelineResult::Done(id) => id.clone(),
        other => panic!("expected Done, got {:?}", other),
    }
}

#[tokio::test]
async fn test_large_jpeg_with_drag_is_cropped_and_compressed() {
    let original = jpeg_bytes(4000, 3000, 95);
    let original_len = original.len();
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store)).with_crop_driver(ScriptedDrag(
        vec![CropDelta::resized(0.0, 20.0), CropDelta::moved(-10.0, -10.0)],
    ));
    let options = PipelineOptions::default()
        .with_compression(CompressionConfig::new(80, OutputFormat::Jpeg, false).unwrap());

    let events =
        collect_events(pipeline.run(SelectedFile::from_bytes(original).with_name("photo.jpg"), &options))
            .await;

    assert_eq!(
        stages(&events),
        vec![
            Stage::Selected,
            Stage::Cropping,
            Stage::Compressing,
            Stage::Uploading
        ]
    );
    let id = done_id(&finished(&events));
    let stored = store.get(&id).unwrap();
    assert!(stored.len() <= original_len);

    let dims = decoded_dimensions(&stored);
    assert!((dims.aspect() - 4.0 / 3.0).abs() < 0.01, "stored {}", dims);
}

#[tokio::test]
async fn test_oversized_bmp_skips_crop() {
    let original = bmp_bytes(1870, 1870);
    assert!(original.len() as u64 > 8 * 1024 * 1024);
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store)).with_crop_driver(CancelCrop);
    let options = PipelineOptions::default().accept_type("image/bmp");

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(original), &options)).await;

    assert!(!stages(&events).contains(&Stage::Cropping));
    let id = done_id(&finished(&events));
    let stored = store.get(&id).unwrap();
    assert_eq!(decoded_dimensions(&stored), Dimensions::new(1870, 1870));
}

#[tokio::test]
async fn test_quota_exceeded_keeps_previous_asset() {
    let store = Arc::new(MemoryStore::new().with_quota(10));
    let mut pipeline = Pipeline::with_store(Arc::clone(&store))
        .with_previous_asset(AssetId::new("previous"));

    let events = collect_events(
        pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &PipelineOptions::default()),
    )
    .await;

    assert_eq!(finished(&events).error_kind(), Some(ErrorKind::QuotaExceeded));
    assert!(store.ops().is_empty());
    assert_eq!(pipeline.previous_asset(), Some(&AssetId::new("previous")));
}

#[tokio::test]
async fn test_replacing_deletes_previous_after_create() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default();

    let first = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &options)).await;
    let a = done_id(&finished(&first));
    let second = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(80, 60)), &options)).await;
    let b = done_id(&finished(&second));

    assert_ne!(a, b);
    assert_eq!(
        store.ops(),
        vec![
            StoreOp::Create(a.clone()),
            StoreOp::Create(b.clone()),
            StoreOp::Delete(a.clone())
        ]
    );
    assert!(!store.contains(&a));
    assert!(store.contains(&b));
    assert_eq!(pipeline.previous_asset(), Some(&b));
}

#[tokio::test]
async fn test_cancelled_crop_never_touches_store() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store)).with_crop_driver(CancelCrop);

    let events = collect_events(
        pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &PipelineOptions::default()),
    )
    .await;

    assert_eq!(stages(&events), vec![Stage::Selected, Stage::Cropping]);
    assert_eq!(finished(&events).error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(store.create_attempts(), 0);
}

#[tokio::test]
async fn test_network_failure_retried_when_enabled() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next(InjectedFailure {
        kind: ErrorKind::NetworkFailure,
        after_chunks: 0,
    });
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default().with_network_retry(true);

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &options)).await;

    let id = done_id(&finished(&events));
    assert_eq!(store.create_attempts(), 2);
    assert_eq!(store.ops(), vec![StoreOp::Create(id)]);
}

#[tokio::test]
async fn test_network_failure_not_retried_by_default() {
    let store = Arc::new(MemoryStore::new());
    store.fail_next(InjectedFailure {
        kind: ErrorKind::NetworkFailure,
        after_chunks: 0,
    });
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));

    let events = collect_events(
        pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &PipelineOptions::default()),
    )
    .await;

    let result = finished(&events);
    assert_eq!(result.error_kind(), Some(ErrorKind::NetworkFailure));
    assert_eq!(
        result.user_message(),
        Some("Network error - check your connection and try again.")
    );
    assert_eq!(store.create_attempts(), 1);
    assert_eq!(store.object_count(), 0);
    assert!(!upload_progress(&events).contains(&1.0));
}

#[tokio::test]
async fn test_rejects_types_outside_accept_list() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));

    let events = collect_events(
        pipeline.run(SelectedFile::from_bytes(bmp_bytes(32, 32)), &PipelineOptions::default()),
    )
    .await;

    assert_eq!(finished(&events).error_kind(), Some(ErrorKind::UnsupportedType));
    assert!(stages(&events).is_empty());
    assert_eq!(store.create_attempts(), 0);
}

#[tokio::test]
async fn test_rejects_unrecognized_bytes() {
    let mut pipeline = Pipeline::with_store(MemoryStore::new());

    let events = collect_events(pipeline.run(
        SelectedFile::from_bytes(b"just some text".to_vec()).with_mime("image/png"),
        &PipelineOptions::default(),
    ))
    .await;

    assert_eq!(finished(&events).error_kind(), Some(ErrorKind::UnsupportedType));
}

#[tokio::test]
async fn test_truncated_png_is_decode_error() {
    let mut bytes = png_bytes(64, 48);
    bytes.truncate(60);
    let mut pipeline = Pipeline::with_store(MemoryStore::new());

    let events =
        collect_events(pipeline.run(SelectedFile::from_bytes(bytes), &PipelineOptions::default())).await;

    assert_eq!(finished(&events).error_kind(), Some(ErrorKind::DecodeError));
}

#[tokio::test]
async fn test_size_limit_checked_before_decoding() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default().with_max_file_bytes(10);

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &options)).await;

    let result = finished(&events);
    assert_eq!(result.error_kind(), Some(ErrorKind::SizeLimitExceeded));
    assert_eq!(result.user_message(), Some("File too large."));
    assert_eq!(store.create_attempts(), 0);
}

#[tokio::test]
async fn test_gif_passes_through_untouched() {
    let original = gif_bytes(32, 24);
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));

    let events =
        collect_events(pipeline.run(SelectedFile::from_bytes(original.clone()), &PipelineOptions::default()))
            .await;

    assert_eq!(
        stages(&events),
        vec![Stage::Selected, Stage::Compressing, Stage::Uploading]
    );
    let id = done_id(&finished(&events));
    assert_eq!(store.get(&id).unwrap().as_ref(), original.as_slice());
    assert_eq!(store.mime_of(&id).as_deref(), Some("image/gif"));
}

#[tokio::test]
async fn test_pixel_ratio_scales_crop_output() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default()
        .with_pixel_ratio(2.0)
        .with_compression(CompressionConfig::passthrough());

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &options)).await;

    let id = done_id(&finished(&events));
    assert_eq!(
        decoded_dimensions(&store.get(&id).unwrap()),
        Dimensions::new(116, 86)
    );
}

#[tokio::test]
async fn test_invalid_pixel_ratio_fails_crop() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default().with_pixel_ratio(0.0);

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &options)).await;

    assert!(finished(&events).error_kind().is_some());
    assert_eq!(store.create_attempts(), 0);
}

#[tokio::test]
async fn test_fixed_region_crop() {
    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store)).with_crop_driver(FixedRegion {
        x: 0.0,
        y: 0.0,
        width: 50.0,
        height: 50.0,
    });
    let options = PipelineOptions::default().with_compression(CompressionConfig::passthrough());

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(png_bytes(80, 60)), &options)).await;

    let id = done_id(&finished(&events));
    assert_eq!(
        decoded_dimensions(&store.get(&id).unwrap()),
        Dimensions::new(40, 30)
    );
}

#[tokio::test]
async fn test_upload_progress_is_monotonic_and_completes() {
    let store = Arc::new(MemoryStore::new().with_chunk_size(1024));
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default()
        .without_crop()
        .with_compression(CompressionConfig::passthrough());
    let original = noisy_png_bytes(200, 150);
    assert!(original.len() > 8 * 1024);

    let events = collect_events(pipeline.run(SelectedFile::from_bytes(original), &options)).await;

    let progress = upload_progress(&events);
    assert!(progress.len() > 2);
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "{:?}", progress);
    assert!(progress.iter().all(|p| *p > 0.0 && *p <= 1.0));
    assert_eq!(progress.last(), Some(&1.0));
    assert_eq!(progress.iter().filter(|p| **p == 1.0).count(), 1);
    done_id(&finished(&events));
}

#[tokio::test]
async fn test_dropping_stream_before_upload_has_no_side_effects() {
    use futures::StreamExt;

    let store = Arc::new(MemoryStore::new());
    let mut pipeline = Pipeline::with_store(Arc::clone(&store));
    let options = PipelineOptions::default();
    {
        let events = pipeline.run(SelectedFile::from_bytes(png_bytes(64, 48)), &options);
        futures::pin_mut!(events);
        let first = events.next().await;
        assert!(matches!(
            first,
            Some(img_ingest::PipelineEvent::Stage {
                stage: Stage::Selected,
                ..
            })
        ));
    }

    assert_eq!(store.create_attempts(), 0);
    assert!(store.ops().is_empty());
    assert!(pipeline.previous_asset().is_none());
}
