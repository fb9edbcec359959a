use super::*;
use crate::{
    foundation::core::{LayerYear, Year},
    spatial::grid::{BoundingBox, Crs},
    spatial::layer::Layer,
};

const ND: f32 = -9999.0;
const RED: Rgba8 = Rgba8::rgb(255, 0, 0);

fn colors() -> DisturbanceColorConfig {
    DisturbanceColorConfig::from_json_str(
        r##"[
            {"disturbance_types": ["Wildfire", "Fire2"], "label": "Fire", "color": "#ff0000"},
            {"disturbance_types": ["Clearcut"], "palette": "Greens"}
        ]"##,
    )
    .unwrap()
}

fn observed() -> Interpretation {
    [(1, "Wildfire"), (2, "Clearcut"), (3, "Mystery")]
        .into_iter()
        .map(|(c, l)| (c, l.to_string()))
        .collect()
}

fn grid() -> BoundingBox {
    BoundingBox::new(Crs::parse("EPSG:32610"), (0.0, 20.0), (10.0, 10.0), 2, 2).unwrap()
}

fn layer(year: Year, values: Vec<f32>, interp: &[(i64, &str)]) -> Layer {
    Layer::new(LayerYear::Year(year), grid(), values, ND)
        .unwrap()
        .with_interpretation(interp.iter().map(|(c, l)| (*c, l.to_string())).collect())
}

fn collection() -> LayerCollection {
    LayerCollection::from_layers(
        "disturbances",
        [
            layer(2010, vec![1.0, 2.0, ND, 0.0], &[(1, "Wildfire"), (2, "Clearcut")]),
            layer(2011, vec![5.0, 7.0, 7.0, ND], &[(5, "Clearcut"), (7, "Fire2")]),
        ],
    )
    .unwrap()
}

#[test]
fn parses_groups_and_substitutions() {
    let cfg = colors();
    assert_eq!(cfg.groups.len(), 2);
    let subs = cfg.substitutions();
    assert_eq!(subs.get("Wildfire"), Some(&"Fire"));
    assert_eq!(subs.get("Fire2"), Some(&"Fire"));
    assert_eq!(subs.get("Clearcut"), None);
    assert!(cfg.types().contains("Clearcut"));
}

#[test]
fn rejects_empty_groups_and_unknown_palettes() {
    let err = DisturbanceColorConfig::from_json_str(r#"[{"disturbance_types": []}]"#).unwrap_err();
    assert!(matches!(err, AnimError::Validation(_)));
    let err = DisturbanceColorConfig::from_json_str(
        r#"[{"disturbance_types": ["Fire"], "palette": "rainbow"}]"#,
    )
    .unwrap_err();
    assert!(matches!(err, AnimError::Validation(_)));
}

#[test]
fn configured_and_fallback_colors() {
    let configurer = DisturbanceLayerConfigurer::new(colors());
    let (colorizer, legend) = configurer.configure(&observed()).unwrap();

    assert_eq!(colorizer.classify(1.0), RED);
    let greens = Palette::parse("Greens").unwrap().colors(1)[0];
    assert_eq!(colorizer.classify(2.0), greens);
    // only "Mystery" is left for the fallback palette
    let fallback = Palette::default().colors(1)[0];
    assert_eq!(colorizer.classify(3.0), fallback);

    let labels: Vec<&str> = legend.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Fire", "Clearcut", "Mystery"]);
    assert_eq!(legend.title, "Disturbances");
}

#[test]
fn filter_drops_unlisted_types() {
    let configurer =
        DisturbanceLayerConfigurer::new(colors()).with_filter(["Wildfire".to_string()]);
    let (colorizer, legend) = configurer.configure(&observed()).unwrap();
    assert_eq!(legend.entries.len(), 1);
    assert_eq!(legend.entries[0].label, "Fire");
    // filtered codes fall through to the default color
    assert_eq!(colorizer.classify(2.0), Rgba8::rgb(128, 128, 128));
}

#[test]
fn no_observed_codes_is_not_an_error() {
    let configurer = DisturbanceLayerConfigurer::default();
    let (colorizer, legend) = configurer.configure(&Interpretation::new()).unwrap();
    assert!(legend.entries.is_empty());
    assert_eq!(colorizer.classify(4.0), Rgba8::rgb(128, 128, 128));
}

#[test]
fn normalize_merges_substituted_types_across_years() {
    let configurer = DisturbanceLayerConfigurer::new(colors());
    let normalized = configurer.normalize(&collection()).unwrap();

    let y2010 = normalized.get(2010).unwrap();
    let y2011 = normalized.get(2011).unwrap();
    let expected: Interpretation = [(1, "Clearcut".to_string()), (2, "Fire".to_string())]
        .into_iter()
        .collect();
    assert_eq!(y2010.interpretation(), Some(&expected));
    assert_eq!(y2011.interpretation(), Some(&expected));
    assert_eq!(y2010.values(), &[2.0, 1.0, 0.0, 0.0]);
    assert_eq!(y2011.values(), &[1.0, 2.0, 2.0, 0.0]);
    assert_eq!(normalized.observed_codes(), expected);
}

#[test]
fn normalize_turns_filtered_types_into_nodata() {
    let configurer =
        DisturbanceLayerConfigurer::new(colors()).with_filter(["Clearcut".to_string()]);
    let normalized = configurer.normalize(&collection()).unwrap();
    let y2011 = normalized.get(2011).unwrap();
    assert_eq!(y2011.values(), &[1.0, 0.0, 0.0, 0.0]);
    assert_eq!(normalized.observed_codes().len(), 1);
}

#[test]
fn indicator_paints_configured_colors() {
    let ctx = RunContext::in_memory();
    let configurer = DisturbanceLayerConfigurer::new(colors());
    let ind = configurer
        .build_indicator("disturbances", &collection(), &[], SpatialOptions::default(), &ctx)
        .unwrap();
    assert_eq!(ind.title(), "Disturbances");
    let panel = ind.render(2011, &ctx).unwrap();
    assert_eq!(panel.pixel(1, 0), Some(RED.to_premul()));
    assert_eq!(panel.pixel(1, 1), Some([0, 0, 0, 0]));
    let labels: Vec<String> = ind.legend().entries.into_iter().map(|e| e.label).collect();
    assert_eq!(labels, vec!["Clearcut".to_string(), "Fire".to_string()]);
}
