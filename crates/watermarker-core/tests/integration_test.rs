//! Integration tests for the watermarker core

use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use watermarker_core::{
    version, BatchEntry, BatchOrchestrator, Compositor, ConfigManager, ImageCrateCodec, ImageFormat,
    ProcessingConfig, SourceImage, WatermarkOptions, WatermarkSpec,
};

fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

fn orchestrator() -> BatchOrchestrator {
    BatchOrchestrator::new(
        Arc::new(ImageCrateCodec::new()),
        Compositor::default(),
        ProcessingConfig::default(),
    )
}

#[test]
fn test_version_info() {
    let version_str = version();
    assert!(!version_str.is_empty(), "Version should not be empty");
    assert_eq!(version_str, "0.1.0", "Version should match workspace version");
}

#[test]
fn test_config_manager() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("test_config.toml");

    let manager = ConfigManager::with_path(config_path.clone()).unwrap();
    let config = manager.config();
    assert_eq!(config.processing.encode_quality, 0.9);
    assert_eq!(config.processing.fallback_format, ImageFormat::Png);
    assert_eq!(config.processing.output_prefix, "watermarked_");

    let mut updated = config.clone();
    updated.processing.cache_logo = true;
    let mut manager = manager;
    manager.update_config(updated).unwrap();
    assert!(config_path.exists());

    let reloaded = ConfigManager::with_path(config_path).unwrap();
    assert!(reloaded.config().processing.cache_logo);
}

#[tokio::test]
async fn test_batch_with_one_corrupt_image() {
    let options = WatermarkOptions::from_json(
        r#"{"watermarkType": "logo", "logoSize": 30, "logoOpacity": 1.0,
            "logoHorizontalPosition": 0, "logoVerticalPosition": 0}"#,
    )
    .unwrap();
    let logo = png(30, 30, [255, 0, 0, 255]);
    let spec = WatermarkSpec::from_options(&options, Some(Arc::from(logo)));

    let sources: Vec<SourceImage> = (0..5)
        .map(|i| {
            let bytes = if i == 3 {
                b"\x89PNG truncated".to_vec()
            } else {
                png(80, 60, [255, 255, 255, 255])
            };
            SourceImage::new(format!("image_{}.png", i), bytes).with_mime("image/png")
        })
        .collect();

    let result = orchestrator().run_batch(sources, &spec).await;
    assert_eq!(result.len(), 5);

    for (i, entry) in result.entries.iter().enumerate() {
        assert_eq!(entry.name(), format!("image_{}.png", i));
        if i == 3 {
            assert!(!entry.is_success());
        } else {
            assert!(entry.is_success());
        }
    }

    // Logo sits in the top-left corner of every successful output
    let output = image::load_from_memory(result.entries[0].bytes().unwrap())
        .unwrap()
        .into_rgba8();
    assert_eq!((output.width(), output.height()), (80, 60));
    assert_eq!(*output.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
    assert_eq!(*output.get_pixel(50, 40), Rgba([255, 255, 255, 255]));
}

#[tokio::test]
async fn test_tiled_logo_batch_summary_serializes() {
    let options = WatermarkOptions::from_json(
        r#"{"watermarkType": "logo", "logoDistribution": "multi", "logoSize": 20, "logoSpacing": 50}"#,
    )
    .unwrap();
    let spec = WatermarkSpec::from_options(&options, Some(Arc::from(png(8, 4, [0, 0, 255, 255]))));
    let sources = vec![SourceImage::new("wide.png", png(200, 100, [255, 255, 255, 255]))];

    let result = orchestrator().run_batch(sources, &spec).await;
    match &result.entries[0] {
        BatchEntry::Succeeded { report, output_name, .. } => {
            // 20x10 logo: floor(180 / 50) + 1 = 4 columns, floor(90 / 50) + 1 = 2 rows
            assert_eq!(report.logo_placements, 8);
            assert_eq!(output_name, "watermarked_wide.png");
        }
        other => panic!("expected success, got {:?}", other),
    }

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["entries"][0]["status"], "succeeded");
    assert!(json["entries"][0].get("bytes").is_none());
    assert_eq!(result.summary().succeeded, 1);
}
