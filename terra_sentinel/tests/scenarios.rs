use image::{Rgb, RgbImage};
use std::sync::Arc;
use terra_sentinel::core_modules::image_helper::encode_png;
use terra_sentinel::core_modules::raster::FloatMap;
use terra_sentinel::pipeline::analyze_with_signal;
use terra_sentinel::{
    ActivationSignal, AerialClassifier, AerialPrediction, AnalysisEngine, AnalysisMode, BoundingBox, Detection,
    EngineConfig, GroundDetector, Result, Severity, SiteStatus,
};

const SIZE: u32 = 96;

fn engine() -> AnalysisEngine {
    AnalysisEngine::new(EngineConfig {
        canonical_size: SIZE,
        worker_count: 2,
        ..EngineConfig::default()
    })
    .unwrap()
}

/// Smooth field with a cluttered patch in the middle.
fn cluttered_scene() -> RgbImage {
    RgbImage::from_fn(SIZE, SIZE, |x, y| {
        if (32..64).contains(&x) && (32..64).contains(&y) {
            let v = ((x * 7919 + y * 104_729) % 251) as u8;
            Rgb([v, v / 2, 255 - v])
        } else {
            Rgb([90, 120, 70])
        }
    })
}

struct StubClassifier {
    score: f64,
}

impl AerialClassifier for StubClassifier {
    fn classify(&self, _image: &RgbImage) -> Result<AerialPrediction> {
        let mut map = FloatMap::zeros((12, 12));
        for row in 4..8 {
            for col in 4..8 {
                map[[row, col]] = 1.0;
            }
        }
        Ok(AerialPrediction {
            classification_score: self.score,
            spatial_activation_map: map,
        })
    }
}

struct StubDetector {
    detections: Vec<Detection>,
}

impl GroundDetector for StubDetector {
    fn detect(&self, _image: &RgbImage, confidence_floor: f32) -> Result<Vec<Detection>> {
        Ok(self
            .detections
            .iter()
            .copied()
            .filter(|d| d.confidence >= confidence_floor)
            .collect())
    }
}

#[test]
fn confident_classifier_on_flat_tile_is_safe() {
    let image = RgbImage::from_pixel(SIZE, SIZE, Rgb([100, 100, 100]));
    let engine = engine().with_classifier(Arc::new(StubClassifier { score: 0.9 }));
    let result = engine.analyze_site(&image, AnalysisMode::Satellite).unwrap();

    assert_eq!(result.chaos_index, 0.0);
    assert!((result.final_score - 0.277).abs() < 0.005);
    assert_eq!(result.status, SiteStatus::Safe);
}

#[test]
fn strong_ground_detection_is_illegal_dumping() {
    let image = RgbImage::from_pixel(SIZE, SIZE, Rgb([100, 100, 100]));
    let signal = ActivationSignal::from_detections(&[Detection {
        confidence: 0.8,
        bbox: BoundingBox::new(0.3, 0.3, 0.7, 0.7),
    }]);
    // Flat image: the detector alone decides.
    let result = analyze_with_signal(&image, AnalysisMode::Land, Some(&signal)).unwrap();
    assert!((result.raw_score - 0.6).abs() < 1e-6);
    assert_eq!(result.final_score, 0.99);
    assert_eq!(result.status, SiteStatus::IllegalDumping);
}

#[test]
fn detector_floor_is_passed_through() {
    let detector = StubDetector {
        detections: vec![
            Detection { confidence: 0.01, bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0) },
            Detection { confidence: 0.2, bbox: BoundingBox::new(0.4, 0.4, 0.6, 0.6) },
        ],
    };
    let engine = engine().with_detector(Arc::new(detector));
    let image = RgbImage::from_pixel(SIZE, SIZE, Rgb([100, 100, 100]));
    let signal = engine.gather_signal(&image, AnalysisMode::Land).unwrap().unwrap();
    match signal {
        ActivationSignal::Ground { max_confidence, boxes } => {
            assert!((max_confidence - 0.2).abs() < 1e-6);
            assert_eq!(boxes.len(), 1);
        }
        other => panic!("expected ground evidence, got {other:?}"),
    }
}

#[test]
fn scores_stay_in_bounds_across_scenes() {
    let scenes = [
        RgbImage::from_pixel(SIZE, SIZE, Rgb([0, 0, 0])),
        RgbImage::from_pixel(SIZE, SIZE, Rgb([255, 255, 255])),
        cluttered_scene(),
    ];
    for image in &scenes {
        for mode in [AnalysisMode::Satellite, AnalysisMode::Land] {
            let result = engine().analyze_site(image, mode).unwrap();
            assert!((0.01..=0.99).contains(&result.final_score));
            assert!((0.0..=1.0).contains(&result.chaos_index));
        }
    }
}

#[test]
fn heatmap_bytes_are_identical_across_runs() {
    let engine = engine().with_classifier(Arc::new(StubClassifier { score: 0.7 }));
    let image = cluttered_scene();
    let first = engine.analyze_site(&image, AnalysisMode::Satellite).unwrap();
    let second = engine.analyze_site(&image, AnalysisMode::Satellite).unwrap();
    assert_eq!(first.heatmap_png().unwrap(), second.heatmap_png().unwrap());
    assert_eq!(first.final_score, second.final_score);
}

#[test]
fn classifier_activation_lights_the_overlay() {
    let engine = engine().with_classifier(Arc::new(StubClassifier { score: 0.7 }));
    let image = cluttered_scene();
    let result = engine.analyze_site(&image, AnalysisMode::Satellite).unwrap();
    assert_ne!(result.heatmap_overlay.get_pixel(48, 48), image.get_pixel(48, 48));
    assert_eq!(result.heatmap_overlay.get_pixel(2, 2), image.get_pixel(2, 2));
}

#[test]
fn ground_texture_lights_the_overlay_without_detections() {
    let image = cluttered_scene();
    let result = engine().analyze_site(&image, AnalysisMode::Land).unwrap();
    assert_ne!(result.heatmap_overlay.get_pixel(48, 48), image.get_pixel(48, 48));
    assert_eq!(result.heatmap_overlay.get_pixel(2, 2), image.get_pixel(2, 2));

    let aerial = engine().analyze_site(&image, AnalysisMode::Satellite).unwrap();
    assert_eq!(aerial.heatmap_overlay, image);
}

#[test]
fn site_bytes_round_trip_through_png() {
    let png = encode_png(&cluttered_scene()).unwrap();
    let result = engine().analyze_site_bytes(&png, AnalysisMode::Land).unwrap();
    assert_eq!(result.heatmap_overlay.dimensions(), (SIZE, SIZE));
    assert!(result.heatmap_data_uri().unwrap().starts_with("data:image/png;base64,"));
}

#[test]
fn deforestation_grid_scenario() {
    let green = Rgb([30, 180, 40]);
    let bare = Rgb([150, 110, 80]);
    let block = |x0: u32, y0: u32, side: u32| {
        RgbImage::from_fn(10, 10, move |x, y| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) { green } else { bare }
        })
    };

    let before = block(0, 0, 4);
    let overlapping = block(2, 2, 4);
    let result = engine().analyze_deforestation(&before, &overlapping).unwrap();
    // 16 green pixels before, 4 of them still green after.
    assert_eq!(result.percent_loss, 75.0);
    assert_eq!(result.severity, Severity::Critical);

    let disjoint = block(6, 6, 4);
    let result = engine().analyze_deforestation(&before, &disjoint).unwrap();
    assert_eq!(result.percent_loss, 100.0);

    let unchanged = engine().analyze_deforestation(&before, &before).unwrap();
    assert_eq!(unchanged.percent_loss, 0.0);
    assert_eq!(unchanged.severity, Severity::Low);
}
