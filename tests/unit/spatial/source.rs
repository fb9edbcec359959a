use super::*;

fn temp_dir(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{name}_{}_{}", std::process::id(), nanos));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn parses_header_and_rows() {
    let text = "ncols 3\nnrows 2\nxllcorner 100\nyllcorner 200\ncellsize 10\nNODATA_value -1\n1 2 3\n4 -1 6\n";
    let data = parse_ascii_grid(text, Crs::WebMercator).unwrap();
    assert_eq!((data.grid.width, data.grid.height), (3, 2));
    assert_eq!(data.grid.origin_x, 100.0);
    assert_eq!(data.grid.origin_y, 220.0);
    assert_eq!(data.nodata, -1.0);
    assert_eq!(data.values, vec![1.0, 2.0, 3.0, 4.0, -1.0, 6.0]);
}

#[test]
fn center_registration_shifts_origin() {
    let text = "ncols 1\nnrows 1\nxllcenter 5\nyllcenter 5\ncellsize 10\n7\n";
    let data = parse_ascii_grid(text, Crs::WebMercator).unwrap();
    assert_eq!(data.grid.origin_x, 0.0);
    assert_eq!(data.grid.origin_y, 10.0);
    assert_eq!(data.nodata, -9999.0);
}

#[test]
fn truncated_or_garbled_grids_are_rejected() {
    let short = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";
    assert!(parse_ascii_grid(short, Crs::Geographic).is_err());
    let garbled = "ncols 1\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\nabc\n";
    assert!(parse_ascii_grid(garbled, Crs::Geographic).is_err());
    assert!(parse_ascii_grid("", Crs::Geographic).is_err());
}

#[test]
fn implausible_dimensions_are_data_errors() {
    let header = |cols: &str, rows: &str| {
        format!("ncols {cols}\nnrows {rows}\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3 4\n")
    };
    for (cols, rows) in [
        ("4000000000", "4000000000"),
        ("99999999999", "2"),
        ("-2", "2"),
        ("2.5", "2"),
        ("0", "2"),
        ("inf", "2"),
    ] {
        assert!(parse_ascii_grid(&header(cols, rows), Crs::Geographic).is_err(), "{cols}x{rows}");
    }
    assert!(parse_ascii_grid(&header("2", "2"), Crs::Geographic).is_ok());

    let dir = temp_dir("forest_animator_asc_huge");
    let path = dir.join("huge.asc");
    std::fs::write(&path, header("4000000000", "4000000000")).unwrap();
    let err = AsciiGridSource::new(&path).read().unwrap_err();
    assert!(matches!(err, AnimError::DataSource(_)), "{err}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn write_then_load_uses_prj_sidecar() {
    let dir = temp_dir("forest_animator_asc");
    let grid = BoundingBox::new(Crs::parse("EPSG:32610"), (0.0, 20.0), (10.0, 10.0), 2, 2).unwrap();
    let layer = Layer::new(LayerYear::Year(2010), grid, vec![1.5, -9999.0, 3.0, 4.0], -9999.0)
        .unwrap();
    let path = dir.join("npp_2010.asc");
    write_ascii_grid(&path, &layer).unwrap();

    let src = AsciiGridSource::new(&path);
    let loaded = load_layer(&src, LayerYear::Year(2010), None).unwrap();
    assert!(loaded.grid().is_aligned_with(layer.grid()));
    assert_eq!(loaded.values(), layer.values());
    assert_eq!(loaded.grid().crs, Crs::parse("EPSG:32610"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_file_is_a_data_source_error() {
    let src = AsciiGridSource::new("/definitely/not/here.asc");
    assert!(matches!(src.read(), Err(AnimError::DataSource(_))));
}

#[test]
fn memory_source_returns_its_data() {
    let grid = BoundingBox::new(Crs::Geographic, (0.0, 1.0), (1.0, 1.0), 1, 1).unwrap();
    let a = MemorySource::new(
        "a",
        RasterData {
            grid: grid.clone(),
            nodata: -1.0,
            values: vec![1.0],
        },
    );
    let b = MemorySource::new(
        "a",
        RasterData {
            grid,
            nodata: -1.0,
            values: vec![2.0],
        },
    );
    assert_eq!(a.read().unwrap().values, vec![1.0]);
    assert_eq!(b.read().unwrap().values, vec![2.0]);
    assert_eq!(a.identity(), "memory:a");
}
