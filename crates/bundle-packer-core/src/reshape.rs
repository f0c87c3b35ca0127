//! Bundle reshaper and flat restacker.
//!
//! Reshape probes are implemented by re-running [`pack_single_bundle`] on
//! a cloned copy of the original pool for each candidate dimension pair,
//! and keeping the trial that wins; discarded trials are simply dropped.
//! Simple over allocation-frugal: each probe pays for its own clone.

use tracing::{debug, instrument};

use crate::context::PackContext;
use crate::geometry::{ceiling_coverage, has_sufficient_ceiling_coverage, has_sufficient_support};
use crate::model::{Bundle, MaxLength, PlacedSku, PlacementKind, Sku};
use crate::single_bundle::pack_single_bundle;

fn retry_with_dims(original: &[Sku], w: f64, h: f64, ctx: &mut PackContext) -> (Bundle, Vec<Sku>) {
    pack_single_bundle(original.to_vec(), w, h, ctx)
}

fn wedge_filler_between_widest(bundle: &mut Bundle, ctx: &mut PackContext) -> bool {
    let config = ctx.config;
    let Some(filler) = config.catalogs.fillers.first().cloned() else {
        return false;
    };
    let mut candidates: Vec<usize> = (0..bundle.placed.len())
        .filter(|&i| {
            let p = &bundle.placed[i];
            !p.is_packaging() && !p.is_filler() && p.y <= 1e-9
        })
        .collect();
    if candidates.len() < 2 {
        return false;
    }
    candidates.sort_by(|&a, &b| {
        bundle.placed[b]
            .width()
            .partial_cmp(&bundle.placed[a].width())
            .unwrap()
    });
    let mut top_two = [candidates[0], candidates[1]];
    top_two.sort_by(|&a, &b| bundle.placed[a].x.partial_cmp(&bundle.placed[b].x).unwrap());
    let insertion_x = bundle.placed[top_two[0]].right();

    for p in bundle.placed.iter_mut() {
        if !p.is_packaging() && p.x >= insertion_x - 1e-6 {
            p.x += filler.width;
        }
    }
    bundle.width += filler.width;
    let uid = ctx.next_uid();
    let sku = filler.to_sku(uid);
    let mut placed = PlacedSku::new(sku, insertion_x, 0.0, false);
    placed.kind = PlacementKind::Filler;
    bundle.placed.push(placed);
    true
}

/// Groups already-placed content items by their shared `(x, y)` stall
/// (stack companions sit at identical coordinates), un-rotates each item,
/// and pours the resulting columns into a fresh vertical stack bounded by
/// `max_width_of_flat_bundle` and the weight cap. Columns that don't fit
/// are returned as leftover for the caller to place elsewhere.
pub(crate) fn lay_flat(mut bundle: Bundle, max_width_of_flat_bundle: f64, ctx: &mut PackContext) -> (Bundle, Vec<Sku>) {
    let config = ctx.config;
    bundle.placed.retain(|p| !p.is_filler());
    let mut by_xy: Vec<((i64, i64), Vec<Sku>)> = Vec::new();
    for p in bundle.content_items() {
        let key = (p.x.round() as i64, p.y.round() as i64);
        if let Some(entry) = by_xy.iter_mut().find(|(k, _)| *k == key) {
            entry.1.push(p.sku.clone());
        } else {
            by_xy.push((key, vec![p.sku.clone()]));
        }
    }
    let mut groups: Vec<Vec<Sku>> = by_xy.into_iter().map(|(_, v)| v).collect();

    // Try to attach a stack companion to every singleton column by pairing
    // it with another singleton whose un-rotated shape is within tolerance.
    let tol = config.stacking_max_diff;
    let mut merged: Vec<bool> = vec![false; groups.len()];
    for i in 0..groups.len() {
        if merged[i] || groups[i].len() != 1 {
            continue;
        }
        let anchor = groups[i][0].clone();
        for j in (i + 1)..groups.len() {
            if merged[j] || groups[j].len() != 1 {
                continue;
            }
            let candidate = &groups[j][0];
            let combined_len = anchor.length + candidate.length;
            if (candidate.width - anchor.width).abs() <= tol
                && (candidate.height - anchor.height).abs() <= tol
                && combined_len <= bundle.max_length_mm + 1e-6
            {
                let extra = groups[j][0].clone();
                groups[i].push(extra);
                merged[j] = true;
                break;
            }
        }
    }
    let mut kept_groups: Vec<Vec<Sku>> = groups
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !merged[*i])
        .map(|(_, g)| g)
        .collect();

    kept_groups.sort_by(|a, b| {
        let la = a.iter().map(|s| s.length).fold(0.0, f64::max);
        let lb = b.iter().map(|s| s.length).fold(0.0, f64::max);
        let wa = a.iter().map(|s| s.width).fold(0.0, f64::max);
        let wb = b.iter().map(|s| s.width).fold(0.0, f64::max);
        la.partial_cmp(&lb).unwrap().then_with(|| wa.partial_cmp(&wb).unwrap())
    });

    let mut flat = Bundle::new(
        max_width_of_flat_bundle,
        max_width_of_flat_bundle,
        bundle.max_length,
        bundle.max_length_mm,
    );
    flat.packing_machine = bundle.packing_machine;
    let mut y = 0.0f64;
    let mut leftover = Vec::new();

    for group in kept_groups {
        let group_h = group.iter().map(|s| s.height).fold(0.0, f64::max);
        let group_w = group.iter().map(|s| s.width).fold(0.0, f64::max);
        let group_weight: f64 = group.iter().map(|s| s.weight).sum();
        let fits_height = y + group_h <= max_width_of_flat_bundle + 1e-6;
        let fits_weight = flat.content_weight() + group_weight <= config.max_weight + 1e-9;
        let supported = y <= 1e-9 || has_sufficient_support(0.0, y, group_w, &flat, config);
        let bottom_ok = y > 1e-9 || group.iter().all(|s| s.can_be_bottom);
        if !fits_height || !fits_weight || !supported || !bottom_ok {
            leftover.extend(group);
            continue;
        }
        for sku in group {
            flat.placed.push(PlacedSku::new(sku, 0.0, y, false));
        }
        y += group_h;
    }
    flat.shrink_to_content();
    (flat, leftover)
}

/// Orchestrates [`pack_single_bundle`] with feedback: narrows the bundle
/// when it comes out too short relative to its width, probes reduced
/// height/width when ceiling coverage is insufficient, wedges a
/// stabilising filler into an all-bottom-row shape, and falls back to
/// laying the bundle flat when it remains taller than wide.
#[instrument(skip_all, fields(pool_len = pool.len(), max_width, max_height))]
pub fn reshape_bundle(
    pool: Vec<Sku>,
    max_width: f64,
    max_height: f64,
    ctx: &mut PackContext,
) -> (Bundle, Vec<Sku>) {
    let original = pool;
    let (mut bundle, mut leftover) = pack_single_bundle(original.clone(), max_width, max_height, ctx);
    let mut width = max_width;
    let mut height = max_height;

    let mut iters = 0;
    while bundle.width > 0.0
        && bundle.height / bundle.width < ctx.config.min_h_w_ratio
        && bundle.content_items().count() > 2
        && iters < ctx.config.max_reshape_iters
    {
        width = (width - ctx.config.reshape_step).max(1.0);
        let (b, l) = retry_with_dims(&original, width, height, ctx);
        bundle = b;
        leftover = l;
        iters += 1;
    }

    if !has_sufficient_ceiling_coverage(&bundle, ctx.config) || bundle.height > bundle.width {
        let topmost_h = bundle.content_items().map(|p| p.height()).fold(0.0, f64::max);
        let widest_w = bundle.content_items().map(|p| p.width()).fold(0.0, f64::max);
        let dec_h = topmost_h.min(ctx.config.reshape_step).max(1.0);
        let dec_w = widest_w.min(ctx.config.reshape_step).max(1.0);

        let cand_height = (height - dec_h).max(1.0);
        let cand_width = (width - dec_w).max(1.0);
        let (b_h, l_h) = retry_with_dims(&original, width, cand_height, ctx);
        let (b_w, l_w) = retry_with_dims(&original, cand_width, height, ctx);

        let placed_h = b_h.content_items().count();
        let placed_w = b_w.content_items().count();
        let cov_h = ceiling_coverage(&b_h, ctx.config);
        let cov_w = ceiling_coverage(&b_w, ctx.config);

        if placed_h > placed_w || (placed_h == placed_w && cov_h >= cov_w) {
            bundle = b_h;
            leftover = l_h;
            height = cand_height;
        } else {
            bundle = b_w;
            leftover = l_w;
            width = cand_width;
        }
    }

    if bundle.height > bundle.width {
        let content_count = bundle.content_items().count();
        let all_bottom = content_count >= 2 && bundle.content_items().all(|p| p.y <= 1e-9);
        if all_bottom {
            wedge_filler_between_widest(&mut bundle, ctx);
        }
    }

    if bundle.height > bundle.width {
        let cap = width.max(height);
        let (flat, flat_leftover) = lay_flat(bundle, cap, ctx);
        bundle = flat;
        leftover.extend(flat_leftover);
    }

    if bundle.is_empty_of_content() && original.len() == 1 {
        let sku = original.into_iter().next().unwrap();
        leftover.retain(|s| s.uid != sku.uid);
        ctx.mark_removed(
            sku,
            "does not fit within the bundle cross-section in any orientation",
        );
    }

    debug!(
        placed = bundle.content_items().count(),
        leftover = leftover.len(),
        width = bundle.width,
        height = bundle.height,
        "reshape complete"
    );
    (bundle, leftover)
}

/// Used by the merger to decide whether a bundle is "entirely
/// flat" and eligible for re-stacking: no rotated items among its content.
pub fn is_entirely_flat(bundle: &Bundle) -> bool {
    bundle.content_items().all(|p| !p.rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackerConfig;

    #[test]
    fn too_tall_narrow_items_lay_flat() {
        let config = PackerConfig::default();
        let mut ctx = PackContext::new(&config, 1000);
        let skus = vec![
            Sku::new(0, "A", 100.0, 900.0, config.l_s, 5.0),
            Sku::new(1, "A", 100.0, 900.0, config.l_s, 5.0),
            Sku::new(2, "A", 100.0, 900.0, config.l_s, 5.0),
        ];
        let (bundle, _leftover) = reshape_bundle(skus, 400.0, 400.0, &mut ctx);
        for p in bundle.content_items() {
            assert!(!p.rotated);
        }
    }

    #[test]
    fn unplaceable_giant_is_removed_as_degenerate_bundle() {
        let config = PackerConfig::default();
        let mut ctx = PackContext::new(&config, 1000);
        let giant = Sku::new(0, "Giant", 5000.0, 5000.0, config.l_s, 5.0);
        let (_bundle, _leftover) = reshape_bundle(vec![giant], 400.0, 400.0, &mut ctx);
        assert_eq!(ctx.removed().len(), 1);
    }
}
