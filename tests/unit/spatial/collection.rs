use super::*;
use crate::spatial::grid::Crs;
use crate::spatial::source::{MemorySource, RasterData};

const ND: f32 = -9999.0;

fn grid(px: f64, w: u32, h: u32) -> BoundingBox {
    BoundingBox::new(Crs::parse("EPSG:32610"), (0.0, 40.0), (px, px), w, h).unwrap()
}

fn layer(year: Year, g: BoundingBox, values: Vec<f32>) -> Layer {
    Layer::new(LayerYear::Year(year), g, values, ND).unwrap()
}

struct Corrupt;

impl RasterSource for Corrupt {
    fn identity(&self) -> String {
        "corrupt".into()
    }

    fn read(&self) -> AnimResult<RasterData> {
        Err(AnimError::data_source("truncated raster"))
    }
}

fn mem(name: &str, v: f32) -> Box<dyn RasterSource> {
    Box::new(MemorySource::new(
        name,
        RasterData {
            grid: grid(10.0, 2, 2),
            nodata: ND,
            values: vec![v; 4],
        },
    ))
}

#[test]
fn load_isolates_failing_sources() {
    let sources: Vec<(Year, Box<dyn RasterSource>)> = vec![
        (2000, mem("a", 1.0)),
        (2001, Box::new(Corrupt)),
        (2002, mem("c", 3.0)),
    ];
    let (c, failures) = LayerCollection::load("npp", &sources, None);
    assert_eq!(c.years().collect::<Vec<_>>(), vec![2000, 2002]);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].year, 2001);
    assert!(matches!(failures[0].error, AnimError::DataSource(_)));
}

#[test]
fn insert_merges_same_year_and_rejects_static() {
    let g = grid(10.0, 2, 1);
    let mut c = LayerCollection::new("dist");
    c.insert(layer(2005, g.clone(), vec![1.0, ND])).unwrap();
    c.insert(layer(2005, g.clone(), vec![2.0, 2.0])).unwrap();
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(2005).unwrap().values(), &[1.0, 2.0]);
    assert!(c.get(2006).is_none());

    let static_layer = Layer::new(LayerYear::Static, g, vec![1.0, 1.0], ND).unwrap();
    assert!(c.insert(static_layer).is_err());
}

#[test]
fn failed_merge_keeps_the_existing_layer() {
    let mut c = LayerCollection::new("dist");
    c.insert(layer(2005, grid(10.0, 2, 1), vec![1.0, ND])).unwrap();
    let misaligned = layer(2005, grid(20.0, 2, 1), vec![5.0, 5.0]);
    assert!(c.insert(misaligned).is_err());
    assert_eq!(c.len(), 1);
    assert_eq!(c.get(2005).unwrap().values(), &[1.0, ND]);
}

#[test]
fn reference_grid_follows_policy() {
    let c = LayerCollection::from_layers(
        "npp",
        [
            layer(2000, grid(20.0, 2, 2), vec![1.0; 4]),
            layer(2001, grid(10.0, 4, 4), vec![1.0; 16]),
        ],
    )
    .unwrap();
    assert!(matches!(
        c.reference_grid(ResolutionPolicy::Reject),
        Err(AnimError::GridMismatch(_))
    ));
    assert_eq!(c.reference_grid(ResolutionPolicy::First).unwrap().pixel_width, 20.0);
    assert_eq!(c.reference_grid(ResolutionPolicy::Finest).unwrap().pixel_width, 10.0);
    assert_eq!(c.reference_grid(ResolutionPolicy::Coarsest).unwrap().pixel_width, 20.0);

    let finest = c.reference_grid(ResolutionPolicy::Finest).unwrap();
    let aligned = c.reconcile(&finest, Resampling::Nearest).unwrap();
    assert!(aligned.iter().all(|(_, l)| l.grid().is_aligned_with(&finest)));
    assert!(aligned.get(2001).unwrap().shares_storage_with(c.get(2001).unwrap()));
}

#[test]
fn reconcile_cached_computes_each_layer_once() {
    let c = LayerCollection::from_layers(
        "npp",
        [
            layer(2000, grid(20.0, 2, 2), vec![1.0; 4]),
            layer(2001, grid(20.0, 2, 2), vec![2.0; 4]),
        ],
    )
    .unwrap();
    let cache = RunCache::in_memory();
    let target = grid(10.0, 4, 4);
    let a = c.reconcile_cached(&target, Resampling::Nearest, &cache).unwrap();
    let b = c.reconcile_cached(&target, Resampling::Nearest, &cache).unwrap();
    assert_eq!(cache.layers.compute_count(), 2);
    assert!(a.get(2000).unwrap().shares_storage_with(b.get(2000).unwrap()));
}

#[test]
fn blend_fills_missing_years_with_zero_placeholder() {
    let g = grid(10.0, 2, 1);
    let npp = LayerCollection::from_layers("npp", [layer(2000, g.clone(), vec![5.0, 4.0])]).unwrap();
    let rh = LayerCollection::from_layers(
        "rh",
        [
            layer(2000, g.clone(), vec![1.0, 1.0]),
            layer(2001, g.clone(), vec![2.0, 2.0]),
        ],
    )
    .unwrap();
    let nep = npp.blend(&[(&rh, BlendMode::Subtract)]).unwrap();
    assert_eq!(nep.get(2000).unwrap().values(), &[4.0, 3.0]);
    assert_eq!(nep.get(2001).unwrap().values(), &[-2.0, -2.0]);
}

#[test]
fn normalize_gives_labels_consistent_codes() {
    let g = grid(10.0, 2, 1);
    let a = layer(2000, g.clone(), vec![1.0, 2.0])
        .with_interpretation([(1, "Wildfire".into()), (2, "Clearcut".into())].into());
    let b = layer(2001, g.clone(), vec![7.0, ND])
        .with_interpretation([(7, "Wildfire".into())].into());
    let c = LayerCollection::from_layers("dist", [a, b]).unwrap();
    let n = c.normalize_interpretations().unwrap();
    // sorted labels: Clearcut=1, Wildfire=2
    assert_eq!(n.get(2000).unwrap().values(), &[2.0, 1.0]);
    assert_eq!(n.get(2001).unwrap().values(), &[2.0, 0.0]);

    let observed = n.observed_codes();
    assert_eq!(observed.get(&1).unwrap(), "Clearcut");
    assert_eq!(observed.get(&2).unwrap(), "Wildfire");
    assert_eq!(observed.len(), 2);

    let again = n.normalize_interpretations().unwrap();
    assert_eq!(again.get(2000).unwrap().values(), n.get(2000).unwrap().values());
}

#[test]
fn population_spans_all_years() {
    let g = grid(10.0, 2, 1);
    let c = LayerCollection::from_layers(
        "npp",
        [
            layer(2000, g.clone(), vec![1.0, ND]),
            layer(2001, g, vec![2.0, 3.0]),
        ],
    )
    .unwrap();
    let mut pop = c.value_population();
    pop.sort_by(f32::total_cmp);
    assert_eq!(pop, vec![1.0, 2.0, 3.0]);
    let only = c.restrict(&[2001].into_iter().collect());
    assert_eq!(only.len(), 1);
}
