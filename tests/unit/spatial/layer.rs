use super::*;
use crate::spatial::grid::Crs;

const ND: f32 = -9999.0;

fn grid(crs: Crs, origin: (f64, f64), px: f64, w: u32, h: u32) -> BoundingBox {
    BoundingBox::new(crs, origin, (px, px), w, h).unwrap()
}

fn utm(w: u32, h: u32, px: f64) -> BoundingBox {
    grid(Crs::parse("EPSG:32610"), (0.0, 100.0), px, w, h)
}

fn layer(g: BoundingBox, values: Vec<f32>) -> Layer {
    Layer::new(LayerYear::Year(2010), g, values, ND).unwrap()
}

#[test]
fn new_rejects_wrong_value_count() {
    let err = Layer::new(LayerYear::Static, utm(2, 2, 10.0), vec![1.0; 3], ND).unwrap_err();
    assert!(matches!(err, AnimError::DataSource(_)));
}

#[test]
fn reconcile_is_idempotent_and_shares_storage() {
    let src = layer(utm(4, 4, 10.0), (0..16).map(|v| v as f32).collect());
    let target = utm(2, 2, 20.0);
    let once = src.reconcile(&target, Resampling::Average).unwrap();
    let twice = once.reconcile(&target, Resampling::Average).unwrap();
    assert_eq!(once, twice);
    assert!(once.shares_storage_with(&twice));
    assert_eq!(once.fingerprint(), twice.fingerprint());

    let same = src.reconcile(&utm(4, 4, 10.0), Resampling::Bilinear).unwrap();
    assert!(same.shares_storage_with(&src));
}

#[test]
fn average_resampling_means_covered_cells() {
    let src = layer(utm(4, 4, 10.0), (0..16).map(|v| v as f32).collect());
    let out = src.reconcile(&utm(2, 2, 20.0), Resampling::Average).unwrap();
    // top-left 2x2 block: 0, 1, 4, 5
    assert_eq!(out.values(), &[2.5, 4.5, 10.5, 12.5]);
}

#[test]
fn average_skips_nodata_cells() {
    let src = layer(utm(2, 2, 10.0), vec![ND, 2.0, 4.0, ND]);
    let out = src.reconcile(&utm(1, 1, 20.0), Resampling::Average).unwrap();
    assert_eq!(out.values(), &[3.0]);
}

#[test]
fn nearest_preserves_codes_and_fills_outside_with_nodata() {
    let src = layer(utm(2, 2, 10.0), vec![1.0, 2.0, 3.0, 4.0]);
    let target = utm(4, 4, 5.0);
    let out = src.reconcile(&target, Resampling::Nearest).unwrap();
    assert_eq!(out.value(0, 0), Some(1.0));
    assert_eq!(out.value(3, 0), Some(2.0));
    assert_eq!(out.value(3, 3), Some(4.0));

    let shifted = grid(Crs::parse("EPSG:32610"), (10.0, 100.0), 10.0, 2, 2);
    let out = src.reconcile(&shifted, Resampling::Nearest).unwrap();
    assert_eq!(out.value(0, 0), Some(2.0));
    assert_eq!(out.value(1, 0), None);
}

#[test]
fn bilinear_interpolates_interior_and_falls_back_near_nodata() {
    let src = layer(utm(2, 1, 10.0), vec![0.0, 10.0]);
    let target = grid(Crs::parse("EPSG:32610"), (5.0, 100.0), 10.0, 1, 1);
    // 1-row source has no vertical neighbour pair, so this is the nearest fallback.
    let out = src.reconcile(&target, Resampling::Bilinear).unwrap();
    assert_eq!(out.values(), &[10.0]);

    let src = layer(utm(2, 2, 10.0), vec![0.0, 10.0, 0.0, 10.0]);
    let target = grid(Crs::parse("EPSG:32610"), (5.0, 95.0), 10.0, 1, 1);
    let out = src.reconcile(&target, Resampling::Bilinear).unwrap();
    assert!((out.values()[0] - 5.0).abs() < 1e-6);

    let src = layer(utm(2, 2, 10.0), vec![0.0, ND, 0.0, 10.0]);
    let out = src.reconcile(&target, Resampling::Bilinear).unwrap();
    assert_eq!(out.values(), &[10.0]);
}

#[test]
fn reconcile_reprojects_geographic_to_mercator() {
    let geo = grid(Crs::Geographic, (-1.0, 1.0), 1.0, 2, 2);
    let src = layer(geo, vec![1.0, 2.0, 3.0, 4.0]);
    let merc = grid(Crs::WebMercator, (-111_000.0, 111_000.0), 111_000.0, 2, 2);
    let out = src.reconcile(&merc, Resampling::Nearest).unwrap();
    assert_eq!(out.values(), &[1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn reconcile_between_unrelated_projections_fails() {
    let src = layer(utm(2, 2, 10.0), vec![1.0; 4]);
    let other = grid(Crs::parse("EPSG:3005"), (0.0, 100.0), 10.0, 2, 2);
    let err = src.reconcile(&other, Resampling::Nearest).unwrap_err();
    assert!(matches!(err, AnimError::GridMismatch(_)));
}

#[test]
fn mask_flatten_and_merge() {
    let g = utm(2, 2, 10.0);
    let data = layer(g.clone(), vec![1.0, 2.0, 3.0, 4.0]);
    let mask = layer(g.clone(), vec![1.0, ND, ND, 1.0]);
    let masked = data.masked_by(&mask).unwrap();
    assert_eq!(masked.values(), &[1.0, ND, ND, 4.0]);
    assert_eq!(masked.flatten(7.0).values(), &[7.0, ND, ND, 7.0]);

    let fire = layer(g.clone(), vec![1.0, ND, ND, ND]).with_interpretation(
        [(1, "Fire".to_string())].into_iter().collect(),
    );
    let harvest = layer(g.clone(), vec![2.0, 2.0, ND, ND]).with_interpretation(
        [(2, "Clearcut".to_string())].into_iter().collect(),
    );
    let merged = Layer::merge(&[fire, harvest]).unwrap();
    assert_eq!(merged.values(), &[1.0, 2.0, ND, ND]);
    assert_eq!(merged.interpretation().unwrap().len(), 2);
}

#[test]
fn merge_rejects_conflicting_interpretations() {
    let g = utm(1, 1, 10.0);
    let a = layer(g.clone(), vec![1.0]).with_interpretation([(1, "Fire".into())].into());
    let b = layer(g, vec![1.0]).with_interpretation([(1, "Harvest".into())].into());
    assert!(Layer::merge(&[a, b]).is_err());
}

#[test]
fn blend_adds_and_subtracts_with_nodata_as_zero() {
    let g = utm(3, 1, 10.0);
    let npp = layer(g.clone(), vec![5.0, 5.0, ND]);
    let rh = layer(g.clone(), vec![2.0, ND, 1.0]);
    let dist = layer(g, vec![1.0, 1.0, 1.0]);
    let nbp = npp
        .blend(&[(&rh, BlendMode::Subtract), (&dist, BlendMode::Subtract)])
        .unwrap();
    assert_eq!(nbp.values(), &[2.0, 0.0, 0.0]);
}

#[test]
fn reclassify_maps_through_labels() {
    let g = utm(3, 1, 10.0);
    let l = layer(g, vec![1.0, 2.0, 3.0])
        .with_interpretation([(1, "Fire".into()), (2, "Clearcut".into())].into());
    let out = l
        .reclassify(&[(3, "Fire".to_string())].into_iter().collect(), 0.0)
        .unwrap();
    assert_eq!(out.values(), &[3.0, 0.0, 0.0]);
    assert_eq!(out.nodata(), 0.0);
    assert_eq!(out.interpretation().unwrap().get(&3).unwrap(), "Fire");
}

#[test]
fn aggregate_and_data_extent() {
    let g = utm(4, 3, 10.0);
    #[rustfmt::skip]
    let l = layer(g, vec![
        ND, ND,  ND, ND,
        ND, 2.0, 4.0, ND,
        ND, ND,  ND, ND,
    ]);
    assert_eq!(l.aggregate(Aggregation::Sum), 6.0);
    assert_eq!(l.aggregate(Aggregation::Mean), 3.0);
    assert_eq!(l.min_max(), Some((2.0, 4.0)));
    assert_eq!(l.data_extent(), Some((1, 1, 2, 1)));

    let cropped = l.crop_to_data(0).unwrap();
    assert_eq!((cropped.grid().width, cropped.grid().height), (2, 1));
    assert_eq!(cropped.values(), &[2.0, 4.0]);
    assert_eq!(cropped.grid().origin_x, 10.0);
    assert_eq!(cropped.grid().origin_y, 90.0);

    let padded = l.crop_to_data(1).unwrap();
    assert_eq!((padded.grid().width, padded.grid().height), (4, 3));
}

#[test]
fn fingerprint_tracks_content() {
    let g = utm(2, 1, 10.0);
    let a = layer(g.clone(), vec![1.0, 2.0]);
    let b = layer(g.clone(), vec![1.0, 2.0]);
    let c = layer(g, vec![1.0, 3.0]);
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert_ne!(
        a.fingerprint(),
        a.clone().with_year(LayerYear::Year(2011)).fingerprint()
    );
}
