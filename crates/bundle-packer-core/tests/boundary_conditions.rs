use std::collections::HashSet;

use bundle_packer_core::model::{PlacementKind, ATTR_BDL_OVERRIDE};
use bundle_packer_core::{pack_order, BundlePackerError, MachineTag, PackerConfig, Sku};

fn cfg() -> PackerConfig {
    PackerConfig::default()
}

/// S1 — one item exactly fitting the bottom row: a single bundle, one
/// PlacedSku at the origin, routed to MACH5, with packaging attached.
#[test]
fn s1_single_item_fits_bottom_row() {
    let config = cfg();
    let lookup = HashSet::new();
    let sku = Sku::new(0, "A.5", 200.0, 150.0, config.l_s, 5.0);

    let result = pack_order(vec![sku], 1000.0, 1000.0, &lookup, &config).unwrap();

    assert_eq!(result.bundles.len(), 1);
    assert!(result.removed.is_empty());
    let bundle = &result.bundles[0];
    assert_eq!(bundle.packing_machine, MachineTag::Mach5);
    let content: Vec<_> = bundle.content_items().filter(|p| !p.is_filler()).collect();
    assert_eq!(content.len(), 1);
    assert_eq!((content[0].x, content[0].y), (0.0, 0.0));
    assert!(bundle.placed.iter().any(|p| p.kind == PlacementKind::Packaging));
}

/// S2 — two identical items just under half the bundle's canonical length
/// stack together and share a placement origin.
#[test]
fn s2_half_length_pair_stacks_at_shared_origin() {
    let config = cfg();
    let lookup = HashSet::new();
    let half = config.l_s / 2.0 - 1.0;
    let a = Sku::new(0, "A.5", 200.0, 150.0, half, 5.0);
    let b = Sku::new(1, "A.5", 200.0, 150.0, half, 5.0);

    let result = pack_order(vec![a, b], 1000.0, 1000.0, &lookup, &config).unwrap();

    assert_eq!(result.bundles.len(), 1);
    let bundle = &result.bundles[0];
    let coords: Vec<(i64, i64)> = bundle
        .content_items()
        .filter(|p| !p.is_filler())
        .map(|p| (p.x.round() as i64, p.y.round() as i64))
        .collect();
    assert_eq!(coords.len(), 2);
    assert_eq!(coords[0], coords[1]);
}

/// S3 — weight overflow: N items each just over `max_weight / 2` force one
/// bundle per item, since no two can ever share a bundle.
#[test]
fn s3_weight_overflow_yields_one_bundle_per_item() {
    let mut config = cfg();
    config.max_weight = 12.0;
    let lookup = HashSet::new();
    let n = 4;
    let per_item_weight = config.max_weight / 2.0 + 1.0;
    let items: Vec<Sku> = (0..n)
        .map(|i| Sku::new(i, "A.5", 200.0, 150.0, config.l_s, per_item_weight))
        .collect();

    let result = pack_order(items, 1000.0, 1000.0, &lookup, &config).unwrap();

    assert_eq!(result.bundles.len(), n as usize);
    for bundle in &result.bundles {
        assert_eq!(bundle.content_items().filter(|p| !p.is_filler()).count(), 1);
    }
}

/// S4 — an override tag spanning both machine classes is the one fatal
/// error `pack_order` raises; no bundles are produced for that order.
#[test]
fn s4_override_tag_spanning_machines_is_fatal() {
    let config = cfg();
    let mut lookup = HashSet::new();
    lookup.insert("1".to_string());

    let mut a = Sku::new(0, "A.1", 200.0, 150.0, config.l_s, 5.0);
    a.opaque_attrs
        .insert(ATTR_BDL_OVERRIDE.to_string(), serde_json::json!("X"));
    let mut b = Sku::new(1, "A.9", 200.0, 150.0, config.l_s, 5.0);
    b.opaque_attrs
        .insert(ATTR_BDL_OVERRIDE.to_string(), serde_json::json!("X"));

    let result = pack_order(vec![a, b], 1000.0, 1000.0, &lookup, &config);
    match result {
        Err(BundlePackerError::OverrideMachineMismatch { tag, .. }) => assert_eq!(tag, "X"),
        other => panic!("expected OverrideMachineMismatch, got {other:?}"),
    }
}

/// S5 — a SKU too large for the cross-section in either orientation is
/// registered as removed and produces no bundle.
#[test]
fn s5_unplaceable_giant_is_removed() {
    let config = cfg();
    let lookup = HashSet::new();
    let giant = Sku::new(0, "Giant.5", 5000.0, 5000.0, config.l_s, 5.0);

    let result = pack_order(vec![giant], 1000.0, 1000.0, &lookup, &config).unwrap();

    assert!(result.bundles.is_empty());
    assert_eq!(result.removed.len(), 1);
    assert_eq!(result.removed[0].sku.id, "Giant.5");
}

/// S6 — tall narrow bottom-eligible items end up laid flat: every
/// placement in the final bundle is un-rotated.
#[test]
fn s6_tall_narrow_items_lay_flat_unrotated() {
    let config = cfg();
    let lookup = HashSet::new();
    let items: Vec<Sku> = (0..3)
        .map(|i| Sku::new(i, "A.5", 100.0, 350.0, config.l_s, 5.0))
        .collect();

    let result = pack_order(items, 400.0, 600.0, &lookup, &config).unwrap();

    assert!(!result.bundles.is_empty());
    for bundle in &result.bundles {
        for placed in bundle.content_items() {
            assert!(!placed.rotated, "expected lay-flat to leave every item un-rotated");
        }
    }
}

/// Cross-cutting invariant: no two non-packaging placements within a
/// bundle may overlap.
#[test]
fn placements_never_overlap_within_a_bundle() {
    let config = cfg();
    let lookup = HashSet::new();
    let items: Vec<Sku> = (0..12)
        .map(|i| Sku::new(i, format!("A.{}", i % 3), 150.0, 120.0, config.l_s, 4.0))
        .collect();

    let result = pack_order(items, 1200.0, 1200.0, &lookup, &config).unwrap();

    for bundle in &result.bundles {
        let placed: Vec<_> = bundle.placed.iter().filter(|p| !p.is_packaging()).collect();
        for i in 0..placed.len() {
            for j in (i + 1)..placed.len() {
                let (a, b) = (placed[i], placed[j]);
                // Stack companions share the anchor's exact (x, y) stall by
                // design — they chain along the length axis, which this
                // cross-sectional x/y view doesn't model.
                let same_stall = (a.x - b.x).abs() <= 1e-6 && (a.y - b.y).abs() <= 1e-6;
                if same_stall {
                    continue;
                }
                let x_overlap = a.x < b.right() && b.x < a.right();
                let y_overlap = a.y < b.top() && b.y < a.top();
                assert!(
                    !(x_overlap && y_overlap),
                    "placements {a:?} and {b:?} overlap"
                );
            }
        }
    }
}
