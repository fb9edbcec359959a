use super::*;

fn utm_box() -> BoundingBox {
    BoundingBox::new(
        Crs::parse("EPSG:32610"),
        (500_000.0, 5_000_000.0),
        (30.0, 30.0),
        4,
        3,
    )
    .unwrap()
}

#[test]
fn rejects_degenerate_grids() {
    assert!(BoundingBox::new(Crs::Geographic, (0.0, 0.0), (0.0, 1.0), 1, 1).is_err());
    assert!(BoundingBox::new(Crs::Geographic, (0.0, 0.0), (1.0, 1.0), 0, 1).is_err());
    assert!(BoundingBox::new(Crs::Geographic, (f64::NAN, 0.0), (1.0, 1.0), 1, 1).is_err());
}

#[test]
fn extent_and_cell_centers_follow_top_down_rows() {
    let b = utm_box();
    assert_eq!(b.extent(), (500_000.0, 4_999_910.0, 500_120.0, 5_000_000.0));
    assert_eq!(b.cell_center(0, 0), (500_015.0, 4_999_985.0));
    assert_eq!(b.cell_at(500_015.0, 4_999_985.0), Some((0, 0)));
    assert_eq!(b.cell_at(500_119.0, 4_999_911.0), Some((3, 2)));
    assert_eq!(b.cell_at(500_121.0, 4_999_985.0), None);
    assert_eq!(b.cell_at(499_999.0, 4_999_985.0), None);
}

#[test]
fn alignment_tolerates_float_noise_only() {
    let a = utm_box();
    let mut b = a.clone();
    b.origin_x += 1e-7;
    assert!(a.is_aligned_with(&b));
    b.origin_x += 1.0;
    assert!(!a.is_aligned_with(&b));
    let mut c = a.clone();
    c.crs = Crs::WebMercator;
    assert!(!a.is_aligned_with(&c));
}

#[test]
fn with_pixel_size_keeps_extent() {
    let coarse = utm_box().with_pixel_size(60.0, 60.0).unwrap();
    assert_eq!((coarse.width, coarse.height), (2, 2));
    assert_eq!(coarse.origin_x, 500_000.0);
    assert_eq!(coarse.origin_y, 5_000_000.0);
}

#[test]
fn window_offsets_origin() {
    let w = utm_box().window(1, 1, 2, 2).unwrap();
    assert_eq!(w.origin_x, 500_030.0);
    assert_eq!(w.origin_y, 4_999_970.0);
    assert!(utm_box().window(3, 0, 2, 1).is_err());
}

#[test]
fn scale_is_metric_for_projected_and_measured_for_geographic() {
    assert_eq!(utm_box().scale_m(), 30.0);
    let geo = BoundingBox::new(Crs::Geographic, (0.0, 0.5), (0.01, 0.01), 10, 100).unwrap();
    let expected = 0.01_f64.to_radians() * 6_378_137.0;
    assert!((geo.scale_m() - expected).abs() < 1.0);
}

#[test]
fn crs_identifiers_round_trip_through_serde() {
    assert_eq!(Crs::parse("epsg:4326"), Crs::Geographic);
    assert_eq!(Crs::parse("EPSG:900913"), Crs::WebMercator);
    let crs: Crs = serde_json::from_str("\"EPSG:3005\"").unwrap();
    assert_eq!(crs, Crs::Projected("EPSG:3005".to_string()));
    assert_eq!(serde_json::to_string(&crs).unwrap(), "\"EPSG:3005\"");
}
