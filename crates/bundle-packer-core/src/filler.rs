//! Greedy fillers, the structured filler inserter, and short-item-into-filler
//! tucking.

use std::collections::HashSet;

use crate::config::PackerConfig;
use crate::context::PackContext;
use crate::geometry::{can_place, has_sufficient_support};
use crate::model::{Bundle, FillerSku, PlacedSku, PlacementKind, Sku, SkuUid};
use crate::stacking::find_stackable;

fn candidate_points(bundle: &Bundle, grid_spacing: f64) -> Vec<(f64, f64)> {
    let mut pts: HashSet<(i64, i64)> = HashSet::new();
    for p in bundle.placed.iter().filter(|p| !p.is_packaging()) {
        pts.insert((p.right().round() as i64, p.y.round() as i64));
        pts.insert((p.x.round() as i64, p.top().round() as i64));
    }
    let mut gy = 0.0;
    while gy < bundle.height {
        let mut gx = 0.0;
        while gx < bundle.width {
            pts.insert((gx.round() as i64, gy.round() as i64));
            gx += grid_spacing;
        }
        gy += grid_spacing;
    }
    let mut out: Vec<(f64, f64)> = pts
        .into_iter()
        .map(|(x, y)| (x as f64, y as f64))
        .filter(|&(x, y)| x < bundle.width && y < bundle.height)
        .collect();
    out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap().then_with(|| a.0.partial_cmp(&b.0).unwrap()));
    out
}

fn free_extent(bundle: &Bundle, x: f64, y: f64) -> (f64, f64) {
    let mut max_w = bundle.width - x;
    let mut max_h = bundle.height - y;
    for p in bundle.placed.iter().filter(|p| !p.is_packaging()) {
        if p.x >= x - 1e-9 && y < p.top() && y >= p.y - 1e-9 {
            max_w = max_w.min(p.x - x);
        }
        if p.y >= y - 1e-9 && x < p.right() && x >= p.x - 1e-9 {
            max_h = max_h.min(p.y - y);
        }
    }
    (max_w.max(0.0), max_h.max(0.0))
}

fn ceiling_of(bundle: &Bundle) -> f64 {
    bundle
        .placed
        .iter()
        .filter(|p| !p.is_packaging())
        .map(|p| p.top())
        .fold(0.0, f64::max)
}

/// Shared greedy placement pass used by both [`fill_row_greedy`] and
/// [`fill_remaining_greedy`]. Returns true if an item was placed;
/// the caller loops until a pass returns false.
fn greedy_pass(
    bundle: &mut Bundle,
    pool: &mut Vec<Sku>,
    y_limit: f64,
    ctx: &mut PackContext,
) -> bool {
    let config = ctx.config;
    let points = candidate_points(bundle, config.greedy_grid_spacing);

    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by(|&a, &b| {
        let area_a = pool[a].width * pool[a].height;
        let area_b = pool[b].width * pool[b].height;
        area_b.partial_cmp(&area_a).unwrap()
    });

    for idx in order {
        let sku = pool[idx].clone();
        for rotated in [false, true] {
            for &(px, py) in &points {
                let (w, h) = if rotated {
                    (sku.height, sku.width)
                } else {
                    (sku.width, sku.height)
                };
                if w <= 0.0 || h <= 0.0 {
                    continue;
                }
                let within_limit = py + h <= y_limit + 1e-6
                    || (px >= config.right_edge_slack_fraction * bundle.width);
                if !within_limit {
                    continue;
                }
                // Greedy placement must respect the same "don't climb
                // taller than the bottom row is wide" ceiling the
                // structured row packer enforces, or it defeats the point
                // of that check by re-introducing a needle-thin stack
                // through the backfill path instead.
                if py > 1e-9 && py + h > ctx.bottom_row_length + 1e-6 {
                    continue;
                }
                if !can_place(&sku, px, py, w, h, bundle, config) {
                    continue;
                }
                if py <= 1e-9 {
                    if rotated {
                        continue;
                    }
                    if (sku.length - bundle.max_length_mm).abs() > config.t_bot {
                        continue;
                    }
                } else {
                    if !has_sufficient_support(px, py, w, bundle, config) {
                        continue;
                    }
                    if rotated && py + h > ceiling_of(bundle) + config.greedy_rotated_slack {
                        continue;
                    }
                }

                let mut final_x = px;
                if py <= 1e-9 {
                    while final_x > 0.0 {
                        let trial_x = (final_x - 1.0).max(0.0);
                        if can_place(&sku, trial_x, py, w, h, bundle, config) {
                            final_x = trial_x;
                        } else {
                            break;
                        }
                    }
                }

                let mut used = HashSet::new();
                used.insert(sku.uid);
                let companions = find_stackable(
                    &sku,
                    pool,
                    &used,
                    sku.uid,
                    bundle.max_length_mm,
                    rotated,
                    py <= 1e-9,
                    config,
                );
                let companion_weight: f64 = companions.iter().map(|c| c.weight).sum();
                if bundle.content_weight() + sku.weight + companion_weight
                    > config.max_weight + 1e-9
                {
                    continue;
                }

                let mut consumed: HashSet<SkuUid> = HashSet::new();
                consumed.insert(sku.uid);
                for c in &companions {
                    consumed.insert(c.uid);
                }
                pool.retain(|s| !consumed.contains(&s.uid));

                bundle
                    .placed
                    .push(PlacedSku::new(sku.clone(), final_x, py, rotated));
                for companion in companions {
                    bundle
                        .placed
                        .push(PlacedSku::new(companion, final_x, py, rotated));
                }
                return true;
            }
        }
    }
    false
}

/// Backfills the slab a just-completed row left behind, bounded by
/// `y_limit` (the row's ceiling), with a right-edge slack zone past
/// `right_edge_slack_fraction * bundle.width`.
pub fn fill_row_greedy(bundle: &mut Bundle, pool: &mut Vec<Sku>, y_limit: f64, ctx: &mut PackContext) {
    while !pool.is_empty() && greedy_pass(bundle, pool, y_limit, ctx) {}
}

/// Patches anything left over after the structured passes. Not bounded by
/// a row's own `y_limit`, but still subject to the bottom-row height
/// ceiling any non-bottom placement must respect.
pub fn fill_remaining_greedy(bundle: &mut Bundle, pool: &mut Vec<Sku>, ctx: &mut PackContext) {
    let y_limit = bundle.height;
    while !pool.is_empty() && greedy_pass(bundle, pool, y_limit, ctx) {}
}

fn free_area_score(bundle: &Bundle, x: f64, y: f64, margin: f64, interior_bonus: f64) -> f64 {
    let (w, h) = free_extent(bundle, x, y);
    let area = w * h;
    let interior = x >= margin && bundle.width - x >= margin && y >= margin && bundle.height - y >= margin;
    if interior {
        area * interior_bonus
    } else {
        area
    }
}

/// Inserts catalog filler into residual voids, preferring interior points
/// over edges. Loops until no placement is possible.
pub fn insert_filler(bundle: &mut Bundle, ctx: &mut PackContext) {
    let config = ctx.config;
    let fillers = config.catalogs.fillers.clone();
    loop {
        let mut points = candidate_points(bundle, config.filler_grid_spacing);
        points.retain(|&(_, y)| y > 1e-9);
        points.sort_by(|&a, &b| {
            let sa = free_area_score(
                bundle,
                a.0,
                a.1,
                config.filler_interior_margin,
                config.filler_interior_bonus_factor,
            );
            let sb = free_area_score(
                bundle,
                b.0,
                b.1,
                config.filler_interior_margin,
                config.filler_interior_bonus_factor,
            );
            sb.partial_cmp(&sa).unwrap()
        });

        let mut placed_any = false;
        'points: for (px, py) in points {
            let mut ranked: Vec<&FillerSku> = fillers.iter().collect();
            ranked.sort_by(|a, b| (b.width * b.height).partial_cmp(&(a.width * a.height)).unwrap());
            for filler in ranked {
                for rotated in [false, true] {
                    let (w, h) = if rotated {
                        (filler.height, filler.width)
                    } else {
                        (filler.width, filler.height)
                    };
                    let uid = ctx.next_uid();
                    let sku = filler.to_sku(uid);
                    if !can_place(&sku, px, py, w, h, bundle, config) {
                        continue;
                    }
                    if !has_sufficient_support(px, py, w, bundle, config) {
                        continue;
                    }
                    let mut placed = PlacedSku::new(sku.clone(), px, py, rotated);
                    placed.kind = PlacementKind::Filler;
                    bundle.placed.push(placed);

                    if matches!(bundle.max_length, crate::model::MaxLength::Long) {
                        let uid2 = ctx.next_uid();
                        let twin = filler.to_sku(uid2);
                        let mut placed2 = PlacedSku::new(twin, px, py, rotated);
                        placed2.kind = PlacementKind::Filler;
                        bundle.placed.push(placed2);
                    }
                    placed_any = true;
                    break 'points;
                }
            }
        }
        if !placed_any {
            break;
        }
    }
}

/// Short-item-into-filler tucking. For each still-unplaced short
/// SKU, looks for an existing filler it fits inside (1 mm tolerance) with
/// `sku.length <= filler.length`, and places it at that filler's
/// `(x, y)`, sharing geometry with the filler it displaces.
pub fn tuck_short_items_into_filler(bundle: &mut Bundle, pool: &mut Vec<Sku>, ctx: &PackContext) {
    let config = ctx.config;
    let tol = config.filler_tuck_tolerance;
    let filler_slots: Vec<(f64, f64, f64, f64, f64)> = bundle
        .placed
        .iter()
        .filter(|p| p.is_filler())
        .map(|p| (p.x, p.y, p.width(), p.height(), p.sku.length))
        .collect();

    let mut consumed = HashSet::new();
    for sku in pool.iter() {
        if !sku.is_short(config.short_max) {
            continue;
        }
        for &(fx, fy, fw, fh, flen) in &filler_slots {
            if sku.length > flen + tol {
                continue;
            }
            let fits_unrotated = sku.width <= fw + tol && sku.height <= fh + tol;
            let fits_rotated = sku.height <= fw + tol && sku.width <= fh + tol;
            if !fits_unrotated && !fits_rotated {
                continue;
            }
            let rotated = !fits_unrotated && fits_rotated;
            bundle
                .placed
                .push(PlacedSku::new(sku.clone(), fx, fy, rotated));
            consumed.insert(sku.uid);
            break;
        }
    }
    pool.retain(|s| !consumed.contains(&s.uid));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MaxLength;

    fn cfg() -> PackerConfig {
        PackerConfig::default()
    }

    #[test]
    fn fill_remaining_places_small_item_in_void() {
        let config = cfg();
        let mut ctx = PackContext::new(&config, 1000);
        let mut bundle = Bundle::new(500.0, 500.0, MaxLength::Short, 3680.0);
        let mut pool = vec![Sku::new(1, "A", 100.0, 100.0, 3680.0, 1.0)];
        fill_remaining_greedy(&mut bundle, &mut pool, &mut ctx);
        assert!(pool.is_empty());
        assert_eq!(bundle.placed.len(), 1);
    }

    #[test]
    fn insert_filler_fills_residual_void() {
        let config = cfg();
        let mut ctx = PackContext::new(&config, 1000);
        let mut bundle = Bundle::new(300.0, 300.0, MaxLength::Short, 3680.0);
        let content = Sku::new(1, "A", 200.0, 200.0, 3680.0, 1.0);
        bundle.placed.push(PlacedSku::new(content, 0.0, 0.0, false));
        insert_filler(&mut bundle, &mut ctx);
        assert!(bundle.placed.iter().any(|p| p.is_filler()));
    }

    #[test]
    fn tuck_short_item_into_filler_slot() {
        let config = cfg();
        let ctx = PackContext::new(&config, 1000);
        let mut bundle = Bundle::new(300.0, 300.0, MaxLength::Short, 3680.0);
        let mut filler_sku = Sku::new(900, "Pack_44Filler", 100.0, 100.0, 100.0, 1.8);
        filler_sku.can_be_bottom = false;
        let mut placed = PlacedSku::new(filler_sku, 50.0, 50.0, false);
        placed.kind = PlacementKind::Filler;
        bundle.placed.push(placed);

        let mut pool = vec![Sku::new(1, "short", 90.0, 90.0, 90.0, 0.5)];
        tuck_short_items_into_filler(&mut bundle, &mut pool, &ctx);
        assert!(pool.is_empty());
        assert_eq!(bundle.placed.len(), 2);
    }
}
