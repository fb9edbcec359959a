use super::*;

#[test]
fn filled_frames_are_premultiplied() {
    let f = FrameRGBA::filled(2, 1, Rgba8::new(255, 0, 0, 128));
    assert_eq!(f.pixel(0, 0), Some([128, 0, 0, 128]));
    assert_eq!(f.pixel(2, 0), None);
    assert!(FrameRGBA::transparent(3, 3).is_fully_transparent());
}

#[test]
fn from_premul_checks_length() {
    assert!(FrameRGBA::from_premul(2, 2, vec![0; 15]).is_err());
    assert!(FrameRGBA::from_premul(2, 2, vec![0; 16]).is_ok());
}

#[test]
fn draw_over_clips_at_edges() {
    let mut dst = FrameRGBA::transparent(3, 3);
    let src = FrameRGBA::filled(2, 2, Rgba8::rgb(0, 0, 255));
    dst.draw_over(&src, 2, -1, 1.0);
    assert_eq!(dst.pixel(2, 0), Some([0, 0, 255, 255]));
    assert_eq!(dst.pixel(1, 0), Some([0, 0, 0, 0]));
    assert_eq!(dst.pixel(2, 1), Some([0, 0, 0, 0]));
}

#[test]
fn fit_within_preserves_aspect_and_scale() {
    let map = FrameRGBA::filled(100, 50, Rgba8::WHITE).with_scale(Some(30.0));
    let fitted = map.fit_within(40, 40);
    assert_eq!((fitted.width, fitted.height), (40, 20));
    assert_eq!(fitted.scale_m, Some(75.0));

    let up = FrameRGBA::filled(2, 4, Rgba8::BLACK).fit_within(100, 100);
    assert_eq!((up.width, up.height), (50, 100));
    assert_eq!(up.pixel(25, 50), Some([0, 0, 0, 255]));
}

#[test]
fn png_round_trip_keeps_transparency() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!(
        "forest_animator_frame_{}_{}.png",
        std::process::id(),
        nanos
    ));
    let mut f = FrameRGBA::transparent(2, 2);
    f.draw_over(&FrameRGBA::filled(1, 1, Rgba8::rgb(10, 200, 30)), 0, 0, 1.0);
    f.save_png(&path).unwrap();
    let back = FrameRGBA::load_png(&path).unwrap();
    assert_eq!(back.pixel(0, 0), Some([10, 200, 30, 255]));
    assert_eq!(back.pixel(1, 1), Some([0, 0, 0, 0]));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn content_fingerprint_sees_pixels() {
    let a = FrameRGBA::filled(2, 2, Rgba8::WHITE);
    let mut b = a.clone();
    assert_eq!(a.content_fingerprint(), b.content_fingerprint());
    b.data[0] = 0;
    assert_ne!(a.content_fingerprint(), b.content_fingerprint());
}
