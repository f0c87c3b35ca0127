//! Row packer, bottom row packer, and the row-orientation state machine.

use std::collections::HashSet;

use crate::config::PackerConfig;
use crate::context::PackContext;
use crate::geometry::{can_place, has_sufficient_support, oriented_dims, should_rotate};
use crate::model::{Bundle, PlacedSku, Sku, SkuUid};
use crate::stacking::find_stackable;

/// Row-orientation state. The bottom row stands items tall
/// (`Vertical`); every row after it lays items with their long side
/// horizontal (`Horizontal`), the steady state for the remainder of the
/// bundle. `is_vertical_row` is simply `current_y == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrientation {
    Bottom,
    Horizontal,
}

impl RowOrientation {
    pub fn for_y(current_y: f64) -> Self {
        if current_y <= 1e-9 {
            RowOrientation::Bottom
        } else {
            RowOrientation::Horizontal
        }
    }

    pub fn is_vertical(self) -> bool {
        matches!(self, RowOrientation::Bottom)
    }
}

fn freq(id: &str, pool: &[Sku], placed: &[PlacedSku]) -> usize {
    pool.iter().filter(|s| s.id == id).count()
        + placed.iter().filter(|p| p.sku.id == id).count()
}

struct Reservation {
    sku: Sku,
    x: f64,
    h: f64,
    rotated: bool,
    companions: Vec<Sku>,
}

/// Places one horizontal band at `current_y`. Consumes placed items (and
/// their stack companions) out of `pool`. Returns the row's height, or
/// `0.0` if nothing could be placed.
pub fn pack_row(
    bundle: &mut Bundle,
    pool: &mut Vec<Sku>,
    current_y: f64,
    is_vertical_row: bool,
    ctx: &mut PackContext,
) -> f64 {
    let config = ctx.config;

    let mut order: Vec<usize> = (0..pool.len()).collect();
    order.sort_by(|&a, &b| {
        let (wa, _) = oriented_dims(&pool[a], is_vertical_row);
        let (wb, _) = oriented_dims(&pool[b], is_vertical_row);
        let fa = freq(&pool[a].id, pool, &bundle.placed) as f64;
        let fb = freq(&pool[b].id, pool, &bundle.placed) as f64;
        (fb * wb)
            .partial_cmp(&(fa * wa))
            .unwrap()
            .then_with(|| fb.partial_cmp(&fa).unwrap())
            .then_with(|| wb.partial_cmp(&wa).unwrap())
            .then_with(|| pool[a].uid.cmp(&pool[b].uid))
    });

    let mut used: HashSet<SkuUid> = HashSet::new();
    let mut reservations: Vec<Reservation> = Vec::new();
    let mut x = 0.0f64;
    let mut row_height: Option<f64> = None;
    let mut reserved_weight = 0.0f64;

    for idx in order {
        let sku = &pool[idx];
        if used.contains(&sku.uid) {
            continue;
        }
        let (w, h) = oriented_dims(sku, is_vertical_row);
        if w <= 0.0 || h <= 0.0 {
            continue;
        }
        if let Some(established) = row_height {
            if (h - established).abs() > config.sku_max_height_diff {
                continue;
            }
        }
        if x + w > bundle.width + 1e-6 {
            continue;
        }
        // A row stacked above the bottom row must not climb taller than the
        // bottom row is wide — the "don't stack taller than the bottom row
        // is wide" heuristic that keeps the cross-section from growing
        // needle-thin.
        if current_y > 1e-9 && current_y + h > ctx.bottom_row_length + 1e-6 {
            continue;
        }
        if !can_place(sku, x, current_y, w, h, bundle, config) {
            continue;
        }
        if current_y > 1e-9 && !has_sufficient_support(x, current_y, w, bundle, config) {
            continue;
        }

        let rotated = should_rotate(sku, is_vertical_row);
        let max_length_mm = bundle.max_length_mm;
        let companions = find_stackable(
            sku,
            pool,
            &used,
            sku.uid,
            max_length_mm,
            rotated,
            current_y <= 1e-9,
            config,
        );
        let companion_weight: f64 = companions.iter().map(|c| c.weight).sum();
        if bundle.content_weight() + reserved_weight + sku.weight + companion_weight
            > config.max_weight + 1e-9
        {
            continue;
        }

        used.insert(sku.uid);
        for c in &companions {
            used.insert(c.uid);
        }
        reserved_weight += sku.weight + companion_weight;
        row_height = Some(row_height.map_or(h, |r: f64| r.max(h)));
        reservations.push(Reservation {
            sku: sku.clone(),
            x,
            h,
            rotated,
            companions,
        });
        x += w;
    }

    if reservations.is_empty() {
        return 0.0;
    }

    let max_height = reservations.iter().map(|r| r.h).fold(0.0, f64::max);
    if current_y <= 1e-9 {
        // This row is serving as the base row (no separate bottom-eligible
        // pass placed anything beforehand), so it establishes the width
        // ceiling later rows must not climb taller than. Items were placed
        // left to right with no gaps, so the final `x` accumulator already
        // is that extent.
        ctx.bottom_row_length = x;
    }
    pool.retain(|s| !used.contains(&s.uid));

    for r in reservations {
        bundle
            .placed
            .push(PlacedSku::new(r.sku, r.x, current_y, r.rotated));
        for companion in r.companions {
            bundle
                .placed
                .push(PlacedSku::new(companion, r.x, current_y, r.rotated));
        }
    }

    max_height
}

/// Bottom-eligible items within `t_bot` of the bundle's `max_length_mm`,
/// sorted `(length, freq*width, freq, height)` descending.
pub fn bottom_eligible_indices(pool: &[Sku], bundle: &Bundle, config: &PackerConfig) -> Vec<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, s)| s.can_be_bottom)
        .filter(|(_, s)| (s.length - bundle.max_length_mm).abs() <= config.t_bot)
        .map(|(i, _)| i)
        .collect()
}

/// Same structure as [`pack_row`], restricted to bottom-eligible items,
/// with a half-length doubling pass: an item whose length lands
/// within `t_bot` of [`PackerConfig::half_bundle_length`] tries to pull a
/// second same-id item alongside it (sharing the same `(x, 0)` slot) so
/// the pair completes the bundle's full length.
pub fn pack_bottom_row(bundle: &mut Bundle, pool: &mut Vec<Sku>, ctx: &mut PackContext) -> f64 {
    let config = ctx.config;
    let eligible: HashSet<SkuUid> = bottom_eligible_indices(pool, bundle, config)
        .into_iter()
        .map(|i| pool[i].uid)
        .collect();
    if eligible.is_empty() {
        return 0.0;
    }

    let mut order: Vec<usize> = (0..pool.len())
        .filter(|&i| eligible.contains(&pool[i].uid))
        .collect();
    order.sort_by(|&a, &b| {
        let sa = &pool[a];
        let sb = &pool[b];
        let fa = freq(&sa.id, pool, &bundle.placed) as f64;
        let fb = freq(&sb.id, pool, &bundle.placed) as f64;
        sb.length
            .partial_cmp(&sa.length)
            .unwrap()
            .then_with(|| (fb * sb.width).partial_cmp(&(fa * sa.width)).unwrap())
            .then_with(|| fb.partial_cmp(&fa).unwrap())
            .then_with(|| sb.height.partial_cmp(&sa.height).unwrap())
            .then_with(|| sa.uid.cmp(&sb.uid))
    });

    let mut used: HashSet<SkuUid> = HashSet::new();
    let mut reservations: Vec<Reservation> = Vec::new();
    let mut x = 0.0f64;
    let mut row_height: Option<f64> = None;
    let mut reserved_weight = 0.0f64;
    let half_len = config.half_bundle_length();

    for idx in order {
        let sku = &pool[idx];
        if used.contains(&sku.uid) {
            continue;
        }
        let (w, h) = oriented_dims(sku, true);
        if w <= 0.0 || h <= 0.0 {
            continue;
        }
        if let Some(established) = row_height {
            if (h - established).abs() > config.sku_max_height_diff {
                continue;
            }
        }
        if x + w > bundle.width + 1e-6 {
            continue;
        }
        if !can_place(sku, x, 0.0, w, h, bundle, config) {
            continue;
        }

        let rotated = should_rotate(sku, true);
        let max_length_mm = bundle.max_length_mm;
        let mut companions = find_stackable(
            sku, pool, &used, sku.uid, max_length_mm, rotated, true, config,
        );

        if (sku.length - half_len).abs() <= config.half_bundle_length_tolerance {
            if let Some(partner_idx) = pool.iter().position(|c| {
                c.id == sku.id
                    && c.uid != sku.uid
                    && c.can_be_bottom
                    && !used.contains(&c.uid)
                    && !companions.iter().any(|k| k.uid == c.uid)
            }) {
                companions.push(pool[partner_idx].clone());
            }
        }

        let companion_weight: f64 = companions.iter().map(|c| c.weight).sum();
        if bundle.content_weight() + reserved_weight + sku.weight + companion_weight
            > config.max_weight + 1e-9
        {
            continue;
        }

        used.insert(sku.uid);
        for c in &companions {
            used.insert(c.uid);
        }
        reserved_weight += sku.weight + companion_weight;
        row_height = Some(row_height.map_or(h, |r: f64| r.max(h)));
        reservations.push(Reservation {
            sku: sku.clone(),
            x,
            h,
            rotated,
            companions,
        });
        x += w;
    }

    if reservations.is_empty() {
        return 0.0;
    }

    let max_height = reservations.iter().map(|r| r.h).fold(0.0, f64::max);
    // Items were placed left to right with no gaps, so `x` already holds
    // the row's total extent.
    ctx.bottom_row_length = x;
    pool.retain(|s| !used.contains(&s.uid));

    for r in reservations {
        bundle.placed.push(PlacedSku::new(r.sku, r.x, 0.0, r.rotated));
        for companion in r.companions {
            bundle
                .placed
                .push(PlacedSku::new(companion, r.x, 0.0, r.rotated));
        }
    }

    max_height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MaxLength;

    fn cfg() -> PackerConfig {
        PackerConfig::default()
    }

    #[test]
    fn orientation_state_machine_follows_y() {
        assert_eq!(RowOrientation::for_y(0.0), RowOrientation::Bottom);
        assert_eq!(RowOrientation::for_y(100.0), RowOrientation::Horizontal);
        assert!(RowOrientation::for_y(0.0).is_vertical());
        assert!(!RowOrientation::for_y(5.0).is_vertical());
    }

    #[test]
    fn pack_row_places_fitting_items_left_to_right() {
        let config = cfg();
        let mut ctx = PackContext::new(&config, 1000);
        ctx.bottom_row_length = 1000.0;
        let mut bundle = Bundle::new(1000.0, 1000.0, MaxLength::Short, 3680.0);
        let mut pool = vec![
            Sku::new(1, "A", 300.0, 200.0, 3680.0, 5.0),
            Sku::new(2, "A", 300.0, 200.0, 3680.0, 5.0),
        ];
        let h = pack_row(&mut bundle, &mut pool, 0.0, false, &mut ctx);
        assert!(h > 0.0);
        assert!(pool.is_empty());
        assert_eq!(bundle.placed.len(), 2);
    }
}
