//! Multi-bundle coordinator and bundle merger: splits an
//! order's SKUs by override tag / component flag / color, packs each group
//! through [`crate::reshape::reshape_bundle`], then repeatedly tries
//! pairwise merges of the resulting bundles before packaging is attached.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::context::PackContext;
use crate::error::{BundlePackerError, Result};
use crate::filler::insert_filler;
use crate::model::{Bundle, MachineTag, PackResult, Sku};
use crate::packaging::attach_packaging;
use crate::reshape::{is_entirely_flat, lay_flat, reshape_bundle};

fn classify_machine(color: &str, ctx: &PackContext) -> MachineTag {
    if ctx.machine_lookup.contains(color) {
        MachineTag::Mach1
    } else {
        MachineTag::Mach5
    }
}

fn group_machines(skus: &[Sku], ctx: &PackContext) -> HashSet<MachineTag> {
    skus.iter()
        .map(|s| classify_machine(s.color_code(), ctx))
        .collect()
}

fn largest_index(pool: &[Sku]) -> Option<usize> {
    pool.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            (a.width * a.height)
                .partial_cmp(&(b.width * b.height))
                .unwrap()
        })
        .map(|(i, _)| i)
}

/// Repeatedly packs `pool` into bundles of the given cross-section until
/// it is empty. A round that places nothing is a stall: the
/// single largest remaining SKU is isolated and packed on its own — which
/// either succeeds as a degenerate bundle or falls through to
/// [`crate::reshape::reshape_bundle`]'s own removed-SKU bookkeeping —
/// and the rest of the pool gets another attempt on the next round.
fn pack_group_into_bundles(
    mut pool: Vec<Sku>,
    width: f64,
    height: f64,
    machine: MachineTag,
    ctx: &mut PackContext,
) -> Vec<Bundle> {
    let mut bundles = Vec::new();
    while !pool.is_empty() {
        let attempt = pool.clone();
        let (mut bundle, leftover) = reshape_bundle(attempt, width, height, ctx);
        if bundle.is_empty_of_content() {
            if pool.len() == 1 {
                // A single-SKU attempt that places nothing has already been
                // marked removed inside `reshape_bundle`; isolating it again
                // below would remove it a second time.
                break;
            }
            let Some(idx) = largest_index(&pool) else {
                break;
            };
            let sku = pool.remove(idx);
            debug!(sku_id = %sku.id, "group packer stalled, isolating largest SKU");
            let (mut solo, solo_leftover) = reshape_bundle(vec![sku], width, height, ctx);
            if !solo.is_empty_of_content() {
                solo.packing_machine = machine;
                bundles.push(solo);
            }
            debug_assert!(solo_leftover.is_empty());
            continue;
        }
        bundle.packing_machine = machine;
        bundles.push(bundle);
        pool = leftover;
    }
    bundles
}

/// Priority tier: bundles holding a bottom-eligible SKU longer than
/// 7000 mm are tried first, then any bundle with a bottom-eligible SKU,
/// then everything else.
fn merge_tier(bundle: &Bundle, ctx: &PackContext) -> u8 {
    let t_bot = ctx.config.t_bot;
    let mut has_bottom_eligible = false;
    let mut has_long_bottom_eligible = false;
    for p in bundle.content_items() {
        if p.sku.can_be_bottom && (p.sku.length - bundle.max_length_mm).abs() <= t_bot {
            has_bottom_eligible = true;
            if p.sku.length > 7000.0 {
                has_long_bottom_eligible = true;
                break;
            }
        }
    }
    if has_long_bottom_eligible {
        0
    } else if has_bottom_eligible {
        1
    } else {
        2
    }
}

fn merged_machine_tag(a: MachineTag, b: MachineTag, cross_machine: bool) -> MachineTag {
    if cross_machine || a != b {
        MachineTag::Mixed
    } else {
        a
    }
}

/// Reconstructs the raw SKU pool of a bundle for a merge attempt,
/// discarding placed filler. `PlacedSku::sku` already carries the
/// SKU's natural (un-rotated) dimensions regardless of how it was placed.
fn raw_pool(bundle: &Bundle) -> Vec<Sku> {
    bundle.non_filler_items().map(|p| p.sku.clone()).collect()
}

/// Cheap pre-check before attempting an expensive fresh pack:
/// combined content area must fit the allowed cross-section and combined
/// weight must stay under the weight cap.
fn feasible_bound(a: &Bundle, b: &Bundle, width: f64, height: f64, max_weight: f64) -> bool {
    if a.width * a.height + b.width * b.height > width * height {
        return false;
    }
    a.content_weight() + b.content_weight() <= max_weight
}

/// Bundle merger. Repeatedly tries every not-yet-attempted pair
/// (restricted to differing machines when `cross_machine` is set, same
/// machine otherwise), replacing a pair with a fresh single pack whenever
/// that pack places every item. Stabilises when no pair merges.
#[instrument(skip_all, fields(bundle_count = bundles.len(), cross_machine))]
pub fn merge_bundles(
    mut bundles: Vec<Bundle>,
    width: f64,
    height: f64,
    cross_machine: bool,
    ctx: &mut PackContext,
) -> Vec<Bundle> {
    for b in bundles.iter_mut().filter(|b| b.id == 0) {
        b.id = ctx.next_uid();
    }

    'restart: loop {
        let mut order: Vec<usize> = (0..bundles.len()).collect();
        order.sort_by_key(|&i| (merge_tier(&bundles[i], ctx), bundles[i].id));

        for a_pos in 0..order.len() {
            for b_pos in (a_pos + 1)..order.len() {
                let i = order[a_pos];
                let j = order[b_pos];
                let same_machine = bundles[i].packing_machine == bundles[j].packing_machine;
                if cross_machine == same_machine {
                    continue;
                }
                let id_i = bundles[i].id;
                let id_j = bundles[j].id;
                if ctx.merge_attempted(id_i, id_j) {
                    continue;
                }
                if !feasible_bound(&bundles[i], &bundles[j], width, height, ctx.config.max_weight) {
                    ctx.mark_merge_attempted(id_i, id_j);
                    continue;
                }

                let mut pool = raw_pool(&bundles[i]);
                pool.extend(raw_pool(&bundles[j]));
                let machine = merged_machine_tag(bundles[i].packing_machine, bundles[j].packing_machine, cross_machine);
                let (mut merged, leftover) = reshape_bundle(pool, width, height, ctx);

                if leftover.is_empty() {
                    merged.packing_machine = machine;
                    merged.id = ctx.next_uid();
                    debug!(id_i, id_j, new_id = merged.id, "bundles merged");
                    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
                    bundles.remove(hi);
                    bundles.remove(lo);
                    bundles.push(merged);
                    continue 'restart;
                } else {
                    ctx.mark_merge_attempted(id_i, id_j);
                }
            }
        }
        break;
    }
    bundles
}

/// Finalises the merger's output: bundles with no rotated
/// content are regrouped and re-stacked flat; the rest get a fresh filler
/// pass since the merge's raw re-pack may have left fresh voids.
fn restack_or_fill(bundles: Vec<Bundle>, width: f64, ctx: &mut PackContext) -> Vec<Bundle> {
    bundles
        .into_iter()
        .map(|bundle| {
            if is_entirely_flat(&bundle) && !bundle.is_empty_of_content() {
                let machine = bundle.packing_machine;
                let id = bundle.id;
                let (mut flat, leftover) = lay_flat(bundle, width, ctx);
                for sku in leftover {
                    ctx.mark_removed(sku, "did not fit back into its flat-restacked bundle");
                }
                flat.packing_machine = machine;
                flat.id = id;
                flat
            } else {
                let mut bundle = bundle;
                insert_filler(&mut bundle, ctx);
                bundle
            }
        })
        .collect()
}

fn pack_override_groups(
    items: Vec<Sku>,
    width: f64,
    height: f64,
    ctx: &mut PackContext,
) -> Result<Vec<Bundle>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<(String, Vec<Sku>)> = Vec::new();
    for sku in items {
        let tag = sku.bdl_override().unwrap_or_default().to_string();
        if let Some(idx) = order.iter().position(|t| *t == tag) {
            groups[idx].1.push(sku);
        } else {
            order.push(tag.clone());
            groups.push((tag, vec![sku]));
        }
    }

    let mut all = Vec::new();
    for (tag, skus) in groups {
        let machines = group_machines(&skus, ctx);
        if machines.len() > 1 {
            return Err(BundlePackerError::OverrideMachineMismatch {
                tag,
                detail: "override tag groups SKUs spanning both packing-machine classes".into(),
            });
        }
        let machine = machines.into_iter().next().unwrap_or(MachineTag::Mach5);
        let bundles = pack_group_into_bundles(skus, width, height, machine, ctx);
        let bundles = merge_bundles(bundles, width, height, false, ctx);
        all.extend(bundles);
    }
    Ok(all)
}

fn pack_component_group(items: Vec<Sku>, width: f64, height: f64, ctx: &mut PackContext) -> Vec<Bundle> {
    let machines = group_machines(&items, ctx);
    let machine = if machines.len() > 1 {
        MachineTag::Mixed
    } else {
        machines.into_iter().next().unwrap_or(MachineTag::Mach5)
    };
    pack_group_into_bundles(items, width, height, machine, ctx)
}

fn pack_regular_groups(items: Vec<Sku>, width: f64, height: f64, ctx: &mut PackContext) -> Vec<Bundle> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<(String, Vec<Sku>)> = Vec::new();
    for sku in items {
        let color = sku.color_code().to_string();
        if let Some(idx) = order.iter().position(|c| *c == color) {
            groups[idx].1.push(sku);
        } else {
            order.push(color.clone());
            groups.push((color, vec![sku]));
        }
    }

    let mut all = Vec::new();
    for (color, skus) in groups {
        let machine = classify_machine(&color, ctx);
        all.extend(pack_group_into_bundles(skus, width, height, machine, ctx));
    }
    all
}

/// Top-level entry point. Packs one order's already-quantity-expanded
/// SKUs into bundles, returning the finalised bundle list (packaging
/// attached, empty bundles filtered) plus whatever could not be placed.
/// The only error this returns is the fatal override/machine mismatch
/// every other failure mode is folded into the `removed` list.
#[instrument(skip_all, fields(item_count = items.len(), bundle_width, bundle_height))]
pub fn pack_order(
    items: Vec<Sku>,
    bundle_width: f64,
    bundle_height: f64,
    machine_lookup: &HashSet<String>,
    config: &crate::config::PackerConfig,
) -> Result<PackResult> {
    let uid_watermark = items.iter().map(|s| s.uid).max().map(|m| m + 1).unwrap_or(0);
    let mut ctx = PackContext::with_machine_lookup(config, uid_watermark, machine_lookup);

    let mut override_items = Vec::new();
    let mut component_items = Vec::new();
    let mut regular_items = Vec::new();
    for sku in items {
        if sku.bdl_override().is_some() {
            override_items.push(sku);
        } else if sku.is_component() {
            component_items.push(sku);
        } else {
            regular_items.push(sku);
        }
    }

    let override_bundles =
        pack_override_groups(override_items, bundle_width, bundle_height, &mut ctx)?;
    let component_bundles = pack_component_group(component_items, bundle_width, bundle_height, &mut ctx);
    let regular_bundles = pack_regular_groups(regular_items, bundle_width, bundle_height, &mut ctx);

    let mut mergeable: Vec<Bundle> = Vec::new();
    mergeable.extend(component_bundles);
    mergeable.extend(regular_bundles);
    let mergeable = merge_bundles(mergeable, bundle_width, bundle_height, false, &mut ctx);

    let mut all_bundles = override_bundles;
    all_bundles.extend(mergeable);
    let mut all_bundles = merge_bundles(all_bundles, bundle_width, bundle_height, true, &mut ctx);
    all_bundles = restack_or_fill(all_bundles, bundle_width, &mut ctx);

    for bundle in all_bundles.iter_mut() {
        if !bundle.is_empty_of_content() {
            attach_packaging(bundle, &mut ctx);
        }
    }
    all_bundles.retain(|b| !b.is_empty_of_content());

    debug!(
        bundle_count = all_bundles.len(),
        removed_count = ctx.removed().len(),
        "order packing complete"
    );

    let removed = ctx.into_removed();
    Ok(PackResult {
        bundles: all_bundles,
        removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackerConfig;

    fn cfg() -> PackerConfig {
        PackerConfig::default()
    }

    #[test]
    fn single_item_order_produces_one_bundle() {
        let config = cfg();
        let lookup = HashSet::new();
        let sku = Sku::new(0, "A.5", 200.0, 150.0, config.l_s, 5.0);
        let result = pack_order(vec![sku], 1000.0, 1000.0, &lookup, &config).unwrap();
        assert_eq!(result.bundles.len(), 1);
        assert!(result.removed.is_empty());
        assert_eq!(result.bundles[0].packing_machine, MachineTag::Mach5);
    }

    #[test]
    fn machine_classification_follows_color_lookup() {
        let config = cfg();
        let mut lookup = HashSet::new();
        lookup.insert("1".to_string());
        let sku = Sku::new(0, "A.1", 200.0, 150.0, config.l_s, 5.0);
        let result = pack_order(vec![sku], 1000.0, 1000.0, &lookup, &config).unwrap();
        assert_eq!(result.bundles[0].packing_machine, MachineTag::Mach1);
    }

    #[test]
    fn override_tag_spanning_machines_is_fatal() {
        let config = cfg();
        let mut lookup = HashSet::new();
        lookup.insert("1".to_string());
        let mut a = Sku::new(0, "A.1", 200.0, 150.0, config.l_s, 5.0);
        a.opaque_attrs.insert(
            crate::model::ATTR_BDL_OVERRIDE.to_string(),
            serde_json::json!("X"),
        );
        let mut b = Sku::new(1, "A.9", 200.0, 150.0, config.l_s, 5.0);
        b.opaque_attrs.insert(
            crate::model::ATTR_BDL_OVERRIDE.to_string(),
            serde_json::json!("X"),
        );
        let result = pack_order(vec![a, b], 1000.0, 1000.0, &lookup, &config);
        assert!(matches!(
            result,
            Err(BundlePackerError::OverrideMachineMismatch { .. })
        ));
    }

    #[test]
    fn weight_overflow_yields_one_bundle_per_item() {
        let mut config = cfg();
        config.max_weight = 10.0;
        let lookup = HashSet::new();
        let items: Vec<Sku> = (0..3)
            .map(|i| Sku::new(i, "A.5", 200.0, 150.0, config.l_s, 6.0))
            .collect();
        let result = pack_order(items, 1000.0, 1000.0, &lookup, &config).unwrap();
        assert_eq!(result.bundles.len(), 3);
        for bundle in &result.bundles {
            assert_eq!(bundle.content_items().count(), 1);
        }
    }
}
