use std::collections::BTreeMap;

use super::*;

fn quantile(bins: usize) -> ColorizerSpec {
    ColorizerSpec::Quantile {
        bins,
        palette: "greens".to_string(),
        negative_palette: None,
        include_zero: false,
        empty_fallback: None,
    }
}

fn uppers(c: &Colorizer) -> Vec<f64> {
    match c {
        Colorizer::Quantile(r) | Colorizer::EqualInterval(r) => {
            r.bins().iter().map(|b| b.upper).collect()
        }
        Colorizer::Custom(_) => Vec::new(),
    }
}

#[test]
fn quantile_bins_are_increasing_and_bounded() {
    let population: Vec<f32> = (1..=100).map(|v| v as f32).collect();
    let c = quantile(5).build("NPP", &population).unwrap();
    let u = uppers(&c);
    assert_eq!(u.len(), 5);
    assert!(u.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*u.last().unwrap(), 100.0);
    assert_eq!(c.bin_index(1.0), Some(0));
    assert_eq!(c.bin_index(100.0), Some(4));
    assert_eq!(c.bin_index(1e9), Some(4));
}

#[test]
fn quantile_excludes_zero_and_nan_by_default() {
    let population = [0.0, 0.0, 0.0, f32::NAN, 2.0, 4.0, 6.0, 8.0];
    let c = quantile(2).build("NPP", &population).unwrap();
    assert_eq!(uppers(&c), vec![5.0, 8.0]);
    assert_eq!(c.classify(0.0), Rgba8::TRANSPARENT);
    assert_eq!(c.classify(f64::NAN), Rgba8::TRANSPARENT);
    assert_ne!(c.classify(2.0), Rgba8::TRANSPARENT);
}

#[test]
fn quantile_is_deterministic_under_reordering() {
    let a: Vec<f32> = vec![3.5, 1.25, 9.0, 4.0, 7.75, 2.0, 6.5];
    let mut b = a.clone();
    b.reverse();
    let ca = quantile(4).build("x", &a).unwrap();
    let cb = quantile(4).build("x", &b).unwrap();
    assert_eq!(ca, cb);
    assert_eq!(ca.fingerprint(), cb.fingerprint());
}

#[test]
fn degenerate_population_collapses_to_one_bin() {
    let c = quantile(6).build("x", &[5.0; 20]).unwrap();
    assert_eq!(c.bin_count(), 1);
    assert_eq!(c.legend().entries[0].label, "<= 5.00");
}

#[test]
fn small_population_never_gets_more_bins_than_values() {
    let c = quantile(6).build("x", &[1.0, 2.0]).unwrap();
    assert_eq!(c.bin_count(), 2);
    assert_eq!(c.bin_index(1.0), Some(0));
    assert_eq!(c.bin_index(2.0), Some(1));
}

#[test]
fn empty_population_is_an_error_without_fallback() {
    let err = quantile(4).build("x", &[0.0, f32::NAN]).unwrap_err();
    assert!(matches!(err, AnimError::Classification(_)));

    let spec = ColorizerSpec::Quantile {
        bins: 4,
        palette: "hls".to_string(),
        negative_palette: None,
        include_zero: false,
        empty_fallback: Some(Rgba8::rgb(200, 200, 200)),
    };
    let c = spec.build("x", &[]).unwrap();
    assert_eq!(c.classify(12.0), Rgba8::rgb(200, 200, 200));
}

#[test]
fn legend_labels_follow_bins() {
    let population: Vec<f32> = (1..=9).map(|v| v as f32).collect();
    let c = quantile(4).build("Biomass", &population).unwrap();
    let legend = c.legend();
    assert_eq!(legend.title, "Biomass");
    let labels: Vec<&str> = legend.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(
        labels,
        vec!["<= 3.00", "3.00 to 5.00", "5.00 to 7.00", "7.00 to 9.00"]
    );
    assert_eq!(legend.entries[2].color, c.classify(6.0));
}

#[test]
fn negative_palette_splits_at_zero() {
    let spec = ColorizerSpec::Quantile {
        bins: 4,
        palette: "greens".to_string(),
        negative_palette: Some("reds".to_string()),
        include_zero: false,
        empty_fallback: None,
    };
    let population = [-8.0, -6.0, -4.0, -2.0, 1.0, 3.0, 5.0, 7.0];
    let c = spec.build("NEP", &population).unwrap();
    let u = uppers(&c);
    assert_eq!(u.len(), 4);
    assert_eq!(u[1], 0.0);
    assert_eq!(c.bin_index(-0.5), Some(1));
    assert_eq!(c.bin_index(0.5), Some(2));
    let labels: Vec<String> = c.legend().entries.into_iter().map(|e| e.label).collect();
    assert_eq!(labels[2], "0.00 to 4.00");

    // darkest red for the most negative class
    let reds = Palette::parse("reds").unwrap().colors(2);
    assert_eq!(c.classify(-8.0), reds[1]);
}

#[test]
fn equal_interval_spans_half_unit_padding() {
    let spec = ColorizerSpec::EqualInterval {
        bins: 3,
        palette: "hls".to_string(),
        zero_transparent: false,
        empty_fallback: None,
    };
    let c = spec.build("x", &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
    let u = uppers(&c);
    assert_eq!(u.len(), 3);
    assert!((u[0] - 2.1666).abs() < 1e-3);
    assert_eq!(u[2], 5.5);
    let labels: Vec<String> = c.legend().entries.into_iter().map(|e| e.label).collect();
    assert_eq!(labels[0], "<= 2.17");
    assert_eq!(labels[2], "> 3.83");
    assert_eq!(c.bin_index(0.0), Some(0));
}

#[test]
fn custom_maps_codes_and_defaults_unmapped() {
    let spec = ColorizerSpec::Custom {
        entries: vec![
            CustomSpecEntry {
                code: 1,
                color: Rgba8::rgb(255, 0, 0),
                label: "Fire".to_string(),
            },
            CustomSpecEntry {
                code: 2,
                color: Rgba8::rgb(0, 0, 255),
                label: "Harvest".to_string(),
            },
        ],
        default_color: Rgba8::rgb(9, 9, 9),
    };
    let c = spec.build("Disturbances", &[]).unwrap();
    assert_eq!(c.classify(1.0), Rgba8::rgb(255, 0, 0));
    assert_eq!(c.classify(2.0), Rgba8::rgb(0, 0, 255));
    assert_eq!(c.classify(7.0), Rgba8::rgb(9, 9, 9));
    assert_eq!(c.classify(0.0), Rgba8::rgb(9, 9, 9));
    assert_eq!(c.classify(f64::NAN), Rgba8::TRANSPARENT);
    assert_eq!(c.bin_index(2.0), Some(1));
    assert_eq!(c.bin_index(7.0), None);
    assert_eq!(c.legend().entries.len(), 2);
}

#[test]
fn custom_legend_merges_shared_labels() {
    let mut entries = BTreeMap::new();
    let red = CustomEntry {
        color: Rgba8::rgb(255, 0, 0),
        label: "Fire".to_string(),
    };
    entries.insert(3, red.clone());
    entries.insert(5, red);
    let c = Colorizer::Custom(CustomColorizer::new("d", entries, Rgba8::BLACK));
    assert_eq!(c.legend().entries.len(), 1);
}

#[test]
fn custom_rejects_repeated_codes() {
    let e = CustomSpecEntry {
        code: 1,
        color: Rgba8::BLACK,
        label: "a".to_string(),
    };
    let spec = ColorizerSpec::Custom {
        entries: vec![e.clone(), e],
        default_color: Rgba8::BLACK,
    };
    assert!(matches!(spec.validate(), Err(AnimError::Validation(_))));
}

#[test]
fn spec_parses_from_json_with_defaults() {
    let spec: ColorizerSpec = serde_json::from_str(r#"{"kind":"quantile"}"#).unwrap();
    assert_eq!(spec, ColorizerSpec::default());
    let spec: ColorizerSpec =
        serde_json::from_str(r#"{"kind":"equal_interval","bins":4,"palette":"viridis"}"#).unwrap();
    assert!(matches!(spec, ColorizerSpec::EqualInterval { bins: 4, .. }));
    assert!(serde_json::from_str::<ColorizerSpec>(r#"{"kind":"rainbow"}"#).is_err());
}

#[test]
fn fingerprint_distinguishes_schemes() {
    let population: Vec<f32> = (1..=10).map(|v| v as f32).collect();
    let q = quantile(3).build("x", &population).unwrap();
    let e = ColorizerSpec::EqualInterval {
        bins: 3,
        palette: "greens".to_string(),
        zero_transparent: true,
        empty_fallback: None,
    }
    .build("x", &population)
    .unwrap();
    assert_ne!(q.fingerprint(), e.fingerprint());
}
