use img_ingest::{
    select_default_region, update_region, AspectRatio, CropDelta, CropSession, Dimensions, Quality,
};
use proptest::prelude::*;

fn aspect_strategy() -> impl Strategy<Value = AspectRatio> {
    (1u32..=21, 1u32..=21).prop_map(|(w, h)| AspectRatio::from_parts(w, h).unwrap())
}

fn source_strategy() -> impl Strategy<Value = Dimensions> {
    (16u32..=8000, 16u32..=8000).prop_map(|(w, h)| Dimensions::new(w, h))
}

fn delta_strategy() -> impl Strategy<Value = CropDelta> {
    (-60.0f64..60.0, -60.0f64..60.0, -60.0f64..60.0, -60.0f64..60.0)
        .prop_map(|(dx, dy, dw, dh)| CropDelta { dx, dy, dw, dh })
}

proptest! {
    #[test]
    fn default_region_keeps_aspect_and_bounds(
        source in source_strategy(),
        aspect in aspect_strategy(),
    ) {
        let region = select_default_region(source, aspect);
        prop_assert!(region.is_within_bounds(), "{:?}", region);
        let drift = (region.pixel_aspect(source) - aspect.value()).abs() / aspect.value();
        prop_assert!(drift < 1e-9, "aspect drift {}", drift);

        // centered
        prop_assert!((region.x - (100.0 - region.width - region.x)).abs() < 1e-9);
        prop_assert!((region.y - (100.0 - region.height - region.y)).abs() < 1e-9);
    }

    #[test]
    fn zero_delta_is_identity(source in source_strategy(), aspect in aspect_strategy()) {
        let region = select_default_region(source, aspect);
        prop_assert_eq!(update_region(&region, CropDelta::default(), source), region);
    }

    #[test]
    fn drags_keep_lock_and_bounds(
        source in source_strategy(),
        aspect in aspect_strategy(),
        deltas in prop::collection::vec(delta_strategy(), 1..8),
    ) {
        let mut session = CropSession::new(source, aspect);
        for delta in deltas {
            let region = *session.update(delta);
            prop_assert!(region.is_within_bounds(), "{:?}", region);
            let drift = (region.pixel_aspect(source) - aspect.value()).abs() / aspect.value();
            prop_assert!(drift < 1e-6, "aspect drift {}", drift);
        }
    }

    #[test]
    fn quality_percent_in_range(percent in 1u8..=100u8) {
        let quality = Quality::from_percent(percent).unwrap();
        prop_assert_eq!(quality.percent(), percent);
        prop_assert!(quality.value() > 0.0 && quality.value() <= 1.0);
    }

    #[test]
    fn quality_percent_out_of_range(percent in 0u8..=255u8) {
        let result = Quality::from_percent(percent);
        if percent == 0 || percent > 100 {
            prop_assert!(result.is_err());
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn quality_fraction_validation(value in -2.0f32..2.0f32) {
        let result = Quality::new(value);
        prop_assert_eq!(result.is_ok(), value > 0.0 && value <= 1.0);
    }
}
