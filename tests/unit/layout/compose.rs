use super::*;

const RED: Rgba8 = Rgba8::rgb(255, 0, 0);
const WHITE_PX: [u8; 4] = [255, 255, 255, 255];

fn full_box(scalebar: bool) -> BoxLayout {
    let mut b = BoxSpec::new("map", 100.0, 100.0);
    b.scalebar = scalebar;
    BoxLayout::new(vec![vec![b]]).unwrap().with_margin(0.0).unwrap()
}

fn canvas() -> Canvas {
    Canvas::new(100, 100).unwrap()
}

fn contents(frame: FrameRGBA) -> BTreeMap<String, FrameRGBA> {
    BTreeMap::from([("map".to_string(), frame)])
}

#[test]
fn content_is_scaled_to_fit_with_aspect_kept() {
    let svg = SvgRasterizer::new(None);
    let wide = FrameRGBA::filled(20, 10, RED);
    let out = compose(&full_box(false), &contents(wide), None, canvas(), &svg).unwrap();
    assert_eq!((out.width, out.height), (100, 100));
    assert_eq!(out.pixel(50, 50), Some(RED.to_premul()));
    // 100x50 centered vertically leaves white bands
    assert_eq!(out.pixel(50, 10), Some(WHITE_PX));
    assert_eq!(out.pixel(50, 90), Some(WHITE_PX));
}

#[test]
fn output_is_opaque() {
    let svg = SvgRasterizer::new(None);
    let faint = FrameRGBA::filled(4, 4, RED.with_alpha(64));
    let out = compose(&full_box(false), &contents(faint), None, canvas(), &svg).unwrap();
    assert!(out.data.chunks_exact(4).all(|px| px[3] == 255));
}

#[test]
fn content_for_unknown_slot_is_a_layout_error() {
    let svg = SvgRasterizer::new(None);
    let mut c = contents(FrameRGBA::filled(2, 2, RED));
    c.insert("chart".to_string(), FrameRGBA::filled(2, 2, RED));
    let err = compose(&full_box(false), &c, None, canvas(), &svg).unwrap_err();
    assert!(matches!(err, AnimError::Layout(_)));
}

#[test]
fn unfilled_slots_stay_blank() {
    let svg = SvgRasterizer::new(None);
    let layout = BoxLayout::panel_with_legend("map", "legend");
    let out = compose(
        &layout,
        &contents(FrameRGBA::filled(10, 10, RED)),
        None,
        Canvas::new(200, 100).unwrap(),
        &svg,
    )
    .unwrap();
    let legend = layout
        .geometry(Canvas::new(200, 100).unwrap(), false)
        .into_iter()
        .find(|g| g.name == "legend")
        .unwrap()
        .rect;
    let (cx, cy) = (legend.center().x as u32, legend.center().y as u32);
    assert_eq!(out.pixel(cx, cy), Some(WHITE_PX));
}

#[test]
fn scalebar_needs_a_map_scale() {
    let svg = SvgRasterizer::new(None);
    let map = FrameRGBA::transparent(100, 100).with_scale(Some(30.0));
    let with_bar = compose(&full_box(true), &contents(map.clone()), None, canvas(), &svg).unwrap();
    assert_ne!(with_bar.pixel(90, 95), Some(WHITE_PX));

    let no_scale = map.with_scale(None);
    let without = compose(&full_box(true), &contents(no_scale), None, canvas(), &svg).unwrap();
    assert_eq!(without.pixel(90, 95), Some(WHITE_PX));
}

#[test]
fn layout_spec_delegates_to_the_selected_layout() {
    let spec: LayoutSpec = serde_json::from_str(r#"{"kind": "quadrant", "legend_pct": 0}"#).unwrap();
    spec.validate().unwrap();
    assert_eq!(spec.name(), "quadrant");
    assert_eq!(spec.slots().len(), 4);
    assert_eq!(LayoutSpec::default().name(), "box");
}

#[test]
fn layout_key_tracks_geometry() {
    let key = |layout: &BoxLayout, titled: bool| {
        let mut kb = KeyBuilder::new("t");
        write_layout_key(layout, canvas(), titled, &mut kb);
        kb.finish()
    };
    let a = BoxLayout::panel_with_legend("map", "legend");
    assert_eq!(key(&a, false), key(&a, false));
    assert_ne!(key(&a, false), key(&a, true));
    assert_ne!(key(&a, false), key(&full_box(false), false));
}
