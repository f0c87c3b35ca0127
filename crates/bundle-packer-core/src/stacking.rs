//! Stacking finder: chains compatible items end-to-end along the
//! length axis so each `(x, y)` stall in a bundle is fully used.

use std::collections::HashSet;

use crate::config::PackerConfig;
use crate::geometry::{oriented_height, oriented_width};
use crate::model::{Sku, SkuUid};

/// Returns, in the order they should be stacked, candidates from `pool`
/// compatible with `target` under orientation `rotated`: within
/// `stacking_max_diff` of `target`'s oriented width/height, not `target`
/// itself, not in `forbidden`, and chainable without exceeding
/// `max_length` cumulative length. Candidates are tried longest-first so
/// the stack fills as much of the length budget as possible.
///
/// `require_bottom_eligible` must be set whenever the caller is about to
/// place `target` at `y == 0`: a companion shares `target`'s `(x, y)`
/// stall exactly, so it rests on the floor too and must itself be
/// `can_be_bottom` — stacking two same-shape items end-to-end doesn't
/// excuse the bottom-row restriction.
pub fn find_stackable(
    target: &Sku,
    pool: &[Sku],
    forbidden: &HashSet<SkuUid>,
    target_uid: SkuUid,
    max_length: f64,
    rotated: bool,
    require_bottom_eligible: bool,
    config: &PackerConfig,
) -> Vec<Sku> {
    let target_w = oriented_width(target, rotated);
    let target_h = oriented_height(target, rotated);
    let tol = config.stacking_max_diff;

    let mut candidates: Vec<&Sku> = pool
        .iter()
        .filter(|c| c.uid != target_uid)
        .filter(|c| !forbidden.contains(&c.uid))
        .filter(|c| !require_bottom_eligible || c.can_be_bottom)
        .filter(|c| {
            let w = oriented_width(c, rotated);
            let h = oriented_height(c, rotated);
            (w - target_w).abs() <= tol && (h - target_h).abs() <= tol
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.length
            .partial_cmp(&a.length)
            .unwrap()
            .then_with(|| a.uid.cmp(&b.uid))
    });

    let mut chosen = Vec::new();
    let mut cumulative = target.length;
    for c in candidates {
        if cumulative + c.length <= max_length + 1e-6 {
            cumulative += c.length;
            let mut placed = c.clone();
            // Callers place the companion with the same `rotated` flag as
            // `target`, so its natural dims must be pre-inverted here —
            // applying `rotated` again must yield `target`'s actual
            // (already-oriented) footprint, not re-rotate it.
            if rotated {
                placed.width = target_h;
                placed.height = target_w;
            } else {
                placed.width = target_w;
                placed.height = target_h;
            }
            chosen.push(placed);
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PackerConfig {
        PackerConfig::default()
    }

    #[test]
    fn chains_same_shape_items_until_length_budget() {
        let config = cfg();
        let target = Sku::new(0, "A", 100.0, 100.0, 1000.0, 1.0);
        let pool = vec![
            Sku::new(1, "A", 100.0, 100.0, 1000.0, 1.0),
            Sku::new(2, "A", 100.0, 100.0, 1000.0, 1.0),
            Sku::new(3, "A", 100.0, 100.0, 1000.0, 1.0),
        ];
        let forbidden = HashSet::new();
        let chosen = find_stackable(&target, &pool, &forbidden, 0, 2500.0, false, false, &config);
        assert_eq!(chosen.len(), 1);
    }

    #[test]
    fn excludes_forbidden_and_mismatched_shapes() {
        let config = cfg();
        let target = Sku::new(0, "A", 100.0, 100.0, 1000.0, 1.0);
        let pool = vec![
            Sku::new(1, "A", 100.0, 100.0, 1000.0, 1.0),
            Sku::new(2, "B", 500.0, 500.0, 1000.0, 1.0),
        ];
        let mut forbidden = HashSet::new();
        forbidden.insert(1u64);
        let chosen = find_stackable(&target, &pool, &forbidden, 0, 5000.0, false, false, &config);
        assert!(chosen.is_empty());
    }

    #[test]
    fn rotated_companion_footprint_matches_target_when_oriented() {
        use crate::geometry::{oriented_height, oriented_width};
        // Non-square target so a rotation bug would be visible: with
        // rotated=true the target's actual footprint is (100, 200).
        let target = Sku::new(0, "A", 200.0, 100.0, 1000.0, 1.0);
        let pool = vec![Sku::new(1, "A", 200.0, 100.0, 1000.0, 1.0)];
        let forbidden = HashSet::new();
        let chosen = find_stackable(&target, &pool, &forbidden, 0, 2500.0, true, false, &cfg());
        assert_eq!(chosen.len(), 1);
        let companion = &chosen[0];
        // Applying the same `rotated=true` flag used at placement time
        // must reproduce target's oriented footprint, not re-rotate it.
        assert_eq!(oriented_width(companion, true), oriented_width(&target, true));
        assert_eq!(oriented_height(companion, true), oriented_height(&target, true));
    }

    #[test]
    fn bottom_eligible_requirement_excludes_non_bottom_companions() {
        let config = cfg();
        let target = Sku::new(0, "A", 100.0, 100.0, 1000.0, 1.0);
        let mut companion = Sku::new(1, "A", 100.0, 100.0, 1000.0, 1.0);
        companion.can_be_bottom = false;
        let pool = vec![companion];
        let forbidden = HashSet::new();
        let chosen = find_stackable(&target, &pool, &forbidden, 0, 2500.0, false, true, &config);
        assert!(chosen.is_empty());
    }
}
