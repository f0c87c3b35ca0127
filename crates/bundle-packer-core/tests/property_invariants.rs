//! Property tests over randomized SKU pools: multiplicity conservation,
//! determinism, and the cross-cutting invariants of §8 (support, weight,
//! bottom-row eligibility, non-overlap). Each pool is constrained to one
//! machine and one color so the coordinator's grouping never splits it.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use bundle_packer_core::{pack_order, PackerConfig, Sku, SkuUid};

/// Deterministic per-trial seed so a failure is reproducible: every trial
/// reseeds from `trial as u64` rather than drawing from the process-global
/// `thread_rng`.
fn trial_rng(trial: u64) -> StdRng {
    StdRng::seed_from_u64(trial)
}

fn random_pool(rng: &mut impl Rng, count: usize, config: &PackerConfig) -> Vec<Sku> {
    (0..count)
        .map(|i| {
            let w = rng.gen_range(60.0..400.0);
            let h = rng.gen_range(60.0..400.0);
            let weight = rng.gen_range(1.0..20.0);
            let mut sku = Sku::new(i as u64, "Rail.5", w, h, config.l_s, weight);
            sku.can_be_bottom = rng.gen_bool(0.7);
            sku
        })
        .collect()
}

fn uid_multiset(uids: impl Iterator<Item = SkuUid>) -> Vec<SkuUid> {
    let mut uids: Vec<SkuUid> = uids.collect();
    uids.sort_unstable();
    uids
}

/// Multiplicity conservation (§8 invariant 7): every input piece ends up
/// either placed exactly once or in the removed list. Tracked by `uid`
/// rather than `id` — every generated piece shares the id `"Rail.5"`, so
/// an id-keyed count could not distinguish "piece 3 dropped, piece 7
/// duplicated" from a correct run; `uid` is the stable per-piece identity
/// the engine itself uses for this exact reason (§9).
#[test]
fn multiplicity_is_conserved_across_random_pools() {
    let config = PackerConfig::default();
    let lookup = HashSet::new();

    for trial in 0..8 {
        let mut rng = trial_rng(trial);
        let pool = random_pool(&mut rng, 8, &config);
        let expected = uid_multiset(pool.iter().map(|s| s.uid));

        let result = pack_order(pool, 500.0, 500.0, &lookup, &config).unwrap();

        let placed_uids = result
            .bundles
            .iter()
            .flat_map(|b| b.non_filler_items())
            .map(|p| p.sku.uid);
        let removed_uids = result.removed.iter().map(|r| r.sku.uid);
        let actual = uid_multiset(placed_uids.chain(removed_uids));

        assert_eq!(actual, expected, "trial {trial}: multiplicity mismatch");
    }
}

/// Invariants (1)-(4): no overlap, within bounds, weight cap honoured, and
/// every bottom-row placement is eligible, over many randomized pools.
#[test]
fn structural_invariants_hold_over_random_pools() {
    let config = PackerConfig::default();
    let lookup = HashSet::new();

    for trial in 0..8 {
        let mut rng = trial_rng(trial);
        let pool = random_pool(&mut rng, 6, &config);
        let result = pack_order(pool, 500.0, 500.0, &lookup, &config).unwrap();

        for bundle in &result.bundles {
            assert!(bundle.content_weight() <= config.max_weight + 1e-6);

            let placed: Vec<_> = bundle.placed.iter().filter(|p| !p.is_packaging()).collect();
            for p in &placed {
                assert!(p.x >= -1e-6 && p.right() <= bundle.width + 1e-6);
                assert!(p.y >= -1e-6 && p.top() <= bundle.height + 1e-6);
                if p.y <= 1e-9 && !p.is_filler() {
                    assert!(p.sku.can_be_bottom);
                }
            }
            for i in 0..placed.len() {
                for j in (i + 1)..placed.len() {
                    let (a, b) = (placed[i], placed[j]);
                    // Stack companions share the anchor's exact (x, y) stall
                    // by design — they chain along the length axis, which
                    // this cross-sectional x/y view doesn't model.
                    let same_stall = (a.x - b.x).abs() <= 1e-6 && (a.y - b.y).abs() <= 1e-6;
                    if same_stall {
                        continue;
                    }
                    let x_overlap = a.x < b.right() && b.x < a.right();
                    let y_overlap = a.y < b.top() && b.y < a.top();
                    assert!(!(x_overlap && y_overlap));
                }
            }
        }
    }
}

/// Packing the same input twice yields an identical bundle layout.
#[test]
fn packing_is_deterministic() {
    let config = PackerConfig::default();
    let lookup = HashSet::new();
    let mut rng = trial_rng(0);
    let pool = random_pool(&mut rng, 8, &config);

    let first = pack_order(pool.clone(), 500.0, 500.0, &lookup, &config).unwrap();
    let second = pack_order(pool, 500.0, 500.0, &lookup, &config).unwrap();

    assert_eq!(first.bundles.len(), second.bundles.len());
    for (a, b) in first.bundles.iter().zip(second.bundles.iter()) {
        assert_eq!(a.placed.len(), b.placed.len());
        for (pa, pb) in a.placed.iter().zip(b.placed.iter()) {
            assert_eq!(pa.sku.id, pb.sku.id);
            assert_eq!((pa.x, pa.y, pa.rotated), (pb.x, pb.y, pb.rotated));
        }
    }
}

/// Shuffling a pool of items that are all identical in id and dimensions
/// (only uids differ) produces the same shape of output: the row
/// packer's frequency/width sort makes these pieces indistinguishable up
/// to their tie-break ordering, so the resulting placements are the same
/// multiset of (x, y, rotated) triples regardless of input order.
#[test]
fn shuffling_equivalent_items_preserves_output_shape() {
    let config = PackerConfig::default();
    let lookup = HashSet::new();
    let pool: Vec<Sku> = (0..8)
        .map(|i| Sku::new(i, "Rail.5", 150.0, 120.0, config.l_s, 4.0))
        .collect();

    let mut shuffled = pool.clone();
    shuffled.shuffle(&mut trial_rng(0));

    let a = pack_order(pool, 500.0, 500.0, &lookup, &config).unwrap();
    let b = pack_order(shuffled, 500.0, 500.0, &lookup, &config).unwrap();

    assert_eq!(a.bundles.len(), b.bundles.len());
    assert_eq!(a.removed.len(), b.removed.len());

    let mut placements_a: Vec<(i64, i64, bool)> = a
        .bundles
        .iter()
        .flat_map(|bd| bd.content_items())
        .map(|p| (p.x.round() as i64, p.y.round() as i64, p.rotated))
        .collect();
    let mut placements_b: Vec<(i64, i64, bool)> = b
        .bundles
        .iter()
        .flat_map(|bd| bd.content_items())
        .map(|p| (p.x.round() as i64, p.y.round() as i64, p.rotated))
        .collect();
    placements_a.sort();
    placements_b.sort();
    assert_eq!(placements_a, placements_b);
}
