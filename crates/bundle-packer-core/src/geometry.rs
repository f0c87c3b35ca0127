//! Rectangle placement, overlap, support and ceiling-coverage primitives
//! Every other module builds on these; none of them mutate a
//! [`Sku`]'s stored `width`/`height` — orientation is always a derived
//! quantity computed here from the `rotated` flag a placement carries.

use crate::config::PackerConfig;
use crate::model::{Bundle, PlacedSku, Sku};

/// Width of `sku` under the given orientation, without mutating `sku`.
pub fn oriented_width(sku: &Sku, rotated: bool) -> f64 {
    if rotated {
        sku.height
    } else {
        sku.width
    }
}

/// Height of `sku` under the given orientation, without mutating `sku`.
pub fn oriented_height(sku: &Sku, rotated: bool) -> f64 {
    if rotated {
        sku.width
    } else {
        sku.height
    }
}

/// `vertical` ⇒ `(min(w,h), max(w,h))`; `horizontal` ⇒ `(max(w,h), min(w,h))`.
pub fn oriented_dims(sku: &Sku, vertical: bool) -> (f64, f64) {
    let (w, h) = (sku.width, sku.height);
    if vertical {
        (w.min(h), w.max(h))
    } else {
        (w.max(h), w.min(h))
    }
}

/// Whether `rotated` must flip to satisfy a row's preferred orientation:
/// true iff the current orientation contradicts the row direction.
pub fn should_rotate(sku: &Sku, is_vertical_row: bool) -> bool {
    let natural_is_vertical = sku.height >= sku.width;
    natural_is_vertical != is_vertical_row
}

fn intervals_overlap(a0: f64, a1: f64, b0: f64, b1: f64) -> bool {
    a0 < b1 && b0 < a1
}

fn rects_overlap(x: f64, y: f64, w: f64, h: f64, other: &PlacedSku) -> bool {
    intervals_overlap(x, x + w, other.x, other.right())
        && intervals_overlap(y, y + h, other.y, other.top())
}

/// True iff `sku` fits at `(x, y)` with footprint `(w, h)` inside `bundle`:
/// within cross-section bounds, within the weight cap, bottom-row
/// eligible when `y == 0`, and non-overlapping with existing placements.
/// Overlap uses half-open intervals, so touching edges are not a conflict.
pub fn can_place(
    sku: &Sku,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    bundle: &Bundle,
    config: &PackerConfig,
) -> bool {
    if x + w > bundle.width + 1e-9 || y + h > bundle.height + 1e-9 {
        return false;
    }
    if sku.weight + bundle.content_weight() > config.max_weight + 1e-9 {
        return false;
    }
    if y <= 1e-9 && !sku.can_be_bottom {
        return false;
    }
    for placed in bundle.placed.iter().filter(|p| !p.is_packaging()) {
        if rects_overlap(x, y, w, h, placed) {
            return false;
        }
    }
    true
}

/// Fraction (or, with `get_value`, the raw ratio) of `[x, x+w)` covered by
/// the union of x-extents of load-bearing items (`length > short_max`)
/// whose top edge lies in the band `[y - buffer, y + buffer]`.
pub fn sufficient_support(
    x: f64,
    y: f64,
    w: f64,
    bundle: &Bundle,
    config: &PackerConfig,
) -> f64 {
    if w <= 0.0 {
        return 1.0;
    }
    let buffer = config.sku_coverage_height_buffer;
    let mut intervals: Vec<(f64, f64)> = bundle
        .placed
        .iter()
        .filter(|p| !p.is_packaging())
        .filter(|p| p.sku.length > config.short_max)
        .filter(|p| {
            let top = p.top();
            top >= y - buffer && top <= y + buffer
        })
        .filter_map(|p| {
            let lo = x.max(p.x);
            let hi = (x + w).min(p.right());
            (hi > lo).then_some((lo, hi))
        })
        .collect();

    if intervals.is_empty() {
        return 0.0;
    }
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mut covered = 0.0;
    let (mut cur_lo, mut cur_hi) = intervals[0];
    for &(lo, hi) in &intervals[1..] {
        if lo > cur_hi {
            covered += cur_hi - cur_lo;
            cur_lo = lo;
            cur_hi = hi;
        } else {
            cur_hi = cur_hi.max(hi);
        }
    }
    covered += cur_hi - cur_lo;
    (covered / w).min(1.0)
}

pub fn has_sufficient_support(
    x: f64,
    y: f64,
    w: f64,
    bundle: &Bundle,
    config: &PackerConfig,
) -> bool {
    sufficient_support(x, y, w, bundle, config) >= config.base_coverage_threshold
}

/// x-mm coverage provided by items whose top edge is within
/// `max_dist_from_ceiling` of `bundle.height`, normalised by `bundle.width`.
pub fn ceiling_coverage(bundle: &Bundle, config: &PackerConfig) -> f64 {
    if bundle.width <= 0.0 {
        return 0.0;
    }
    let ceiling = bundle.height - config.max_dist_from_ceiling;
    let mut intervals: Vec<(f64, f64)> = bundle
        .non_filler_items()
        .chain(bundle.placed.iter().filter(|p| p.is_filler()))
        .filter(|p| p.top() >= ceiling)
        .map(|p| (p.x, p.right()))
        .collect();
    if intervals.is_empty() {
        return 0.0;
    }
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mut covered = 0.0;
    let (mut cur_lo, mut cur_hi) = intervals[0];
    for &(lo, hi) in &intervals[1..] {
        if lo > cur_hi {
            covered += cur_hi - cur_lo;
            cur_lo = lo;
            cur_hi = hi;
        } else {
            cur_hi = cur_hi.max(hi);
        }
    }
    covered += cur_hi - cur_lo;
    (covered / bundle.width).min(1.0)
}

pub fn has_sufficient_ceiling_coverage(bundle: &Bundle, config: &PackerConfig) -> bool {
    ceiling_coverage(bundle, config) >= config.min_ceiling_coverage
}
