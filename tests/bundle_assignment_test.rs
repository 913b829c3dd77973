use asset_viewer::{
    Asset, AssetFormat, AssetSource, LoadError, LoadProgress, ViewerConfig, load,
};

use crate::common::test_utils::{obj_with_objects, png, zip};

mod common;

fn load_bundle(bytes: Vec<u8>, config: &ViewerConfig) -> Asset {
    load(&AssetSource::from_bytes("bundle.zip", bytes), config, &LoadProgress::new())
        .expect("bundle loads")
        .asset
}

/// Part name to the key of its texture, or `None` for a flat colour.
fn texture_per_part(asset: &Asset) -> Vec<(String, Option<String>)> {
    asset
        .world_parts()
        .into_iter()
        .map(|(part, _)| {
            (
                part.name.clone(),
                part.material.texture().map(|t| t.key.clone()),
            )
        })
        .collect()
}

fn named(pairs: &[(&str, Option<&str>)]) -> Vec<(String, Option<String>)> {
    pairs
        .iter()
        .map(|(part, tex)| (part.to_string(), tex.map(str::to_string)))
        .collect()
}

#[test]
fn tile_names_pick_their_textures() {
    let obj = obj_with_objects(&["tile_1_1", "tile_2_1"]);
    let red = png(2, 2, [255, 0, 0, 255]);
    let blue = png(2, 2, [0, 0, 255, 255]);
    let asset = load_bundle(
        zip(&[
            ("model.obj", obj.as_slice()),
            ("tex_u1_v1.png", red.as_slice()),
            ("tex_u2_v1.png", blue.as_slice()),
        ]),
        &ViewerConfig::default(),
    );

    assert_eq!(asset.format, AssetFormat::Bundle);
    assert_eq!(
        texture_per_part(&asset),
        named(&[
            ("tile_1_1", Some("tex_u1_v1.png")),
            ("tile_2_1", Some("tex_u2_v1.png")),
        ])
    );
}

#[test]
fn tile_match_ignores_archive_order() {
    let obj = obj_with_objects(&["tile_1_1", "tile_2_1", "tile_3_1"]);
    let texture = png(1, 1, [10, 20, 30, 255]);
    let asset = load_bundle(
        zip(&[
            ("textures/tex_u3_v1.png", texture.as_slice()),
            ("textures/tex_u2_v1.png", texture.as_slice()),
            ("model.obj", obj.as_slice()),
            ("textures/tex_u1_v1.png", texture.as_slice()),
        ]),
        &ViewerConfig::default(),
    );

    assert_eq!(
        texture_per_part(&asset),
        named(&[
            ("tile_1_1", Some("tex_u1_v1.png")),
            ("tile_2_1", Some("tex_u2_v1.png")),
            ("tile_3_1", Some("tex_u3_v1.png")),
        ])
    );
}

#[test]
fn exact_names_match_regardless_of_entry_order() {
    let obj = obj_with_objects(&["wheel", "wheel_rim", "body"]);
    let texture = png(1, 1, [255, 255, 255, 255]);
    let expected = named(&[
        ("wheel", Some("wheel.png")),
        ("wheel_rim", Some("wheel_rim.png")),
        ("body", Some("body.png")),
    ]);

    let orders: [[&str; 3]; 3] = [
        ["wheel.png", "wheel_rim.png", "body.png"],
        ["body.png", "wheel_rim.png", "wheel.png"],
        ["wheel_rim.png", "body.png", "wheel.png"],
    ];
    for order in orders {
        let mut files: Vec<(&str, &[u8])> = order.iter().map(|n| (*n, texture.as_slice())).collect();
        files.push(("model.obj", obj.as_slice()));
        let asset = load_bundle(zip(&files), &ViewerConfig::default());
        assert_eq!(texture_per_part(&asset), expected, "order {order:?}");
    }
}

#[test]
fn bundle_without_textures_uses_the_default_colour() {
    let config = ViewerConfig {
        default_color: [0.2, 0.4, 0.6, 1.0],
        ..ViewerConfig::default()
    };
    let obj = obj_with_objects(&["a", "b"]);
    let asset = load_bundle(
        zip(&[("model.obj", obj.as_slice()), ("readme.txt", b"hello")]),
        &config,
    );

    for (part, _) in asset.world_parts() {
        assert!(part.material.is_color(config.default_color), "{}", part.name);
    }
}

#[test]
fn textures_in_nested_archives_are_found() {
    let texture = png(1, 1, [0, 255, 0, 255]);
    let inner = zip(&[("tex_u1_v1.png", texture.as_slice())]);
    let obj = obj_with_objects(&["tile_1_1"]);
    let asset = load_bundle(
        zip(&[("model.obj", obj.as_slice()), ("textures.zip", inner.as_slice())]),
        &ViewerConfig::default(),
    );

    assert_eq!(
        texture_per_part(&asset),
        named(&[("tile_1_1", Some("tex_u1_v1.png"))])
    );
    assert!(asset.scratch.is_some());
}

#[test]
fn nesting_deeper_than_configured_fails() {
    let obj = obj_with_objects(&["a"]);
    let mut data = zip(&[("model.obj", obj.as_slice())]);
    for _ in 0..3 {
        data = zip(&[("inner.zip", data.as_slice())]);
    }
    let shallow = ViewerConfig {
        max_archive_depth: 2,
        ..ViewerConfig::default()
    };

    let result = load(
        &AssetSource::from_bytes("deep.zip", data.clone()),
        &shallow,
        &LoadProgress::new(),
    );
    assert!(matches!(
        result,
        Err(LoadError::ParseFailure { format: AssetFormat::Bundle, .. })
    ));
    assert_eq!(load_bundle(data, &ViewerConfig::default()).part_count(), 1);
}

#[test]
fn bundle_without_mesh_is_rejected() {
    let texture = png(1, 1, [0, 0, 0, 255]);
    let result = load(
        &AssetSource::from_bytes("textures.zip", zip(&[("tex_u1_v1.png", texture.as_slice())])),
        &ViewerConfig::default(),
        &LoadProgress::new(),
    );
    assert!(matches!(result, Err(LoadError::MissingRequiredAsset { .. })));
}

#[test]
fn undecodable_texture_becomes_a_warning() {
    let obj = obj_with_objects(&["tile_1_1"]);
    let outcome = load(
        &AssetSource::from_bytes(
            "bundle.zip",
            zip(&[("model.obj", obj.as_slice()), ("tex_u1_v1.png", b"not a png")]),
        ),
        &ViewerConfig::default(),
        &LoadProgress::new(),
    )
    .expect("a broken texture doesn't fail the load");

    assert!(matches!(
        outcome.warnings.as_slice(),
        [LoadError::DecodeFailure { texture, .. }] if texture == "tex_u1_v1.png"
    ));
    let default = ViewerConfig::default().default_color;
    for (part, _) in outcome.asset.world_parts() {
        assert!(part.material.is_color(default));
    }
}
