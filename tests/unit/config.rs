use super::*;
use crate::layout::BoxLayout;

const MINIMAL: &str = r#"{
    "name": "npp",
    "years": [2011, 2010],
    "canvas": {"width": 640, "height": 360},
    "legend_slot": "legend",
    "indicators": [
        {"name": "npp", "title": "NPP", "units": "tC/ha", "pattern": "npp_{year}.asc", "slot": "map"}
    ]
}"#;

#[test]
fn minimal_document_fills_defaults() {
    let cfg = AnimationConfig::from_json_str(MINIMAL).unwrap();
    assert_eq!(cfg.format, OutputFormat::Mp4);
    assert_eq!(cfg.fps, 1);
    assert!(!cfg.hold_last_frame);
    assert_eq!(cfg.strictness, Strictness::Strict);
    assert_eq!(cfg.resolution_policy, ResolutionPolicy::Reject);
    assert_eq!(cfg.layout, LayoutSpec::Box(BoxLayout::panel_with_legend("map", "legend")));
    assert_eq!(cfg.years(), Some(BTreeSet::from([2010, 2011])));
    assert_eq!(cfg.indicators[0].colorizer, ColorizerSpec::default());
}

#[test]
fn year_range_expands_inclusive() {
    let cfg = AnimationConfig::from_json_str(
        r#"{"start_year": 2010, "end_year": 2013,
            "indicators": [{"name": "a", "pattern": "a_{year}.asc", "slot": "map"}]}"#,
    )
    .unwrap();
    assert_eq!(cfg.years(), Some((2010..=2013).collect()));
}

#[test]
fn pattern_resolves_against_base_dir() {
    let cfg = AnimationConfig::from_json_str(MINIMAL).unwrap();
    let years = cfg.years().unwrap();
    let paths = cfg.indicators[0].paths().resolve(Path::new("/data"), Some(&years));
    assert_eq!(paths[&2010], PathBuf::from("/data/npp_2010.asc"));
    assert_eq!(paths[&2011], PathBuf::from("/data/npp_2011.asc"));
}

#[test]
fn explicit_layers_are_restricted_to_requested_years() {
    let layers = BTreeMap::from([
        (2010, PathBuf::from("a.asc")),
        (2011, PathBuf::from("/abs/b.asc")),
    ]);
    let paths = LayerPaths {
        layers: &layers,
        pattern: None,
    };
    let all = paths.resolve(Path::new("base"), None);
    assert_eq!(all[&2010], PathBuf::from("base/a.asc"));
    assert_eq!(all[&2011], PathBuf::from("/abs/b.asc"));
    let only = paths.resolve(Path::new("base"), Some(&BTreeSet::from([2011])));
    assert_eq!(only.keys().copied().collect::<Vec<_>>(), vec![2011]);
}

#[test]
fn rejects_inconsistent_documents() {
    let bad = [
        // unknown field
        r#"{"indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}], "colour": 1}"#,
        // slot missing from the layout
        r#"{"indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "nowhere"}]}"#,
        // slot bound twice
        r#"{"legend_slot": "map", "indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}]}"#,
        // pattern without years
        r#"{"indicators": [{"name": "a", "pattern": "a_{year}.asc", "slot": "map"}]}"#,
        // pattern without placeholder
        r#"{"years": [2010], "indicators": [{"name": "a", "pattern": "a.asc", "slot": "map"}]}"#,
        // both years and a range
        r#"{"years": [2010], "start_year": 2010, "end_year": 2011,
            "indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}]}"#,
        // reversed range
        r#"{"start_year": 2012, "end_year": 2010,
            "indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}]}"#,
        // odd canvas for mp4
        r#"{"canvas": {"width": 641, "height": 360},
            "indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}]}"#,
        // nothing to show
        r#"{"indicators": []}"#,
        // overlay on an unknown indicator
        r#"{"indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}],
            "disturbances": {"layers": {"2010": "d.asc"}, "codes": {"1": "Fire"}, "overlay": ["b"]}}"#,
    ];
    for doc in bad {
        let err = AnimationConfig::from_json_str(doc).unwrap_err();
        assert!(matches!(err, AnimError::Validation(_) | AnimError::Layout(_)), "{doc}: {err}");
    }
}

#[test]
fn odd_canvas_is_fine_for_gif() {
    let cfg = AnimationConfig::from_json_str(
        r#"{"format": "gif", "canvas": {"width": 641, "height": 361},
            "indicators": [{"name": "a", "layers": {"2010": "a.asc"}, "slot": "map"}]}"#,
    )
    .unwrap();
    assert_eq!(cfg.format, OutputFormat::Gif);
}

#[test]
fn disturbance_section_parses_codes() {
    let cfg = AnimationConfig::from_json_str(
        r#"{"layout": {"kind": "quadrant"},
            "indicators": [{"name": "nbp", "layers": {"2010": "nbp.asc"}, "slot": "q1"}],
            "disturbances": {"layers": {"2010": "d.asc"}, "codes": {"1": "Fire", "3": "Harvest"},
                             "slot": "q2", "overlay": ["nbp"]}}"#,
    )
    .unwrap();
    let dist = cfg.disturbances.as_ref().unwrap();
    assert_eq!(dist.codes[&3], "Harvest");
    assert_eq!(dist.overlay_opacity, 0.8);
}

#[test]
fn animator_opts_resolve_output_dir() {
    let cfg = AnimationConfig::from_json_str(MINIMAL).unwrap();
    let opts = cfg.animator_opts(Path::new("/runs/a"));
    assert_eq!(opts.output_dir, PathBuf::from("/runs/a/out"));
    assert_eq!(opts.name, "npp");
    assert_eq!(opts.canvas, Canvas::new(640, 360).unwrap());
}

#[test]
fn from_path_reports_missing_file() {
    let err = AnimationConfig::from_path(Path::new("/definitely/not/here.json")).unwrap_err();
    assert!(err.to_string().contains("here.json"));
}
