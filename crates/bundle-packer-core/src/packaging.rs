//! Packaging attachment: weight-only SKUs appended to a finished
//! bundle. Packaging placements carry `kind = Packaging`, sit at `(0, 0)`,
//! and are excluded from every geometric invariant and from the
//! content-extent computation used to report actual bundle dimensions.

use crate::context::PackContext;
use crate::model::{Bundle, MaxLength, PlacedSku, PlacementKind, Sku};

fn push_packaging(bundle: &mut Bundle, ctx: &mut PackContext, id: &str, weight: f64) {
    let uid = ctx.next_uid();
    let mut sku = Sku::new(uid, id, 0.0, 0.0, 0.0, weight);
    sku.can_be_bottom = false;
    let mut placed = PlacedSku::new(sku, 0.0, 0.0, false);
    placed.kind = PlacementKind::Packaging;
    bundle.placed.push(placed);
}

fn qty_for(max_length: MaxLength, short: u32, long: u32) -> u32 {
    match max_length {
        MaxLength::Short => short,
        MaxLength::Long => long,
    }
}

fn pad_item_for(dim_mm: f64, entry: &crate::model::PackagingCatalogEntry) -> Option<(&str, f64)> {
    if dim_mm < entry.min_pad_size_mm {
        return None;
    }
    entry
        .pad_steps
        .iter()
        .find(|step| dim_mm <= step.max_dim_mm)
        .map(|step| (step.item.id.as_str(), step.item.weight))
}

/// Appends the catalog's angleboards, dunnage, wraps, pads, and (when
/// eligible) one or two lumber pieces to `bundle`, keyed by its
/// `max_length` — the lumber quantity mirrors the angleboard split
/// (`lumber_qty_short`/`lumber_qty_long`), one piece for the short
/// canonical length and two for the long one.
pub fn attach_packaging(bundle: &mut Bundle, ctx: &mut PackContext) {
    let config = ctx.config;
    let Some(entry) = config.catalogs.packaging_for(bundle.max_length).cloned() else {
        return;
    };

    let angleboard_qty = qty_for(bundle.max_length, entry.angleboard_qty_short, entry.angleboard_qty_long);
    for _ in 0..angleboard_qty {
        push_packaging(bundle, ctx, &entry.angleboard.id, entry.angleboard.weight);
    }

    push_packaging(bundle, ctx, &entry.dunnage_a.id, entry.dunnage_a.weight);
    push_packaging(bundle, ctx, &entry.dunnage_b.id, entry.dunnage_b.weight);
    push_packaging(
        bundle,
        ctx,
        &entry.sub_bundle_wrap.id,
        entry.sub_bundle_wrap.weight,
    );
    push_packaging(
        bundle,
        ctx,
        &entry.master_bundle_wrap.id,
        entry.master_bundle_wrap.weight,
    );

    if let Some((id, weight)) = pad_item_for(bundle.width, &entry) {
        push_packaging(bundle, ctx, id, weight);
    }
    if let Some((id, weight)) = pad_item_for(bundle.height, &entry) {
        push_packaging(bundle, ctx, id, weight);
    }

    let every_unrotated = bundle.non_filler_items().all(|p| !p.rotated);
    if every_unrotated && bundle.height > 100.0 {
        let lumber_qty = qty_for(bundle.max_length, entry.lumber_qty_short, entry.lumber_qty_long);
        for _ in 0..lumber_qty {
            push_packaging(bundle, ctx, &entry.lumber.id, entry.lumber.weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackerConfig;
    use crate::model::{MaxLength as ML, PlacedSku as PS};

    #[test]
    fn packaging_is_appended_at_origin_and_excluded_from_weight_only_when_marked() {
        let config = PackerConfig::default();
        let mut ctx = PackContext::new(&config, 1000);
        let mut bundle = Bundle::new(300.0, 300.0, ML::Short, config.l_s);
        let content = Sku::new(0, "A", 200.0, 200.0, config.l_s, 5.0);
        bundle.placed.push(PS::new(content, 0.0, 0.0, false));
        attach_packaging(&mut bundle, &mut ctx);
        assert!(bundle.placed.iter().any(|p| p.is_packaging()));
        let content_weight = bundle.content_weight();
        assert!((content_weight - 5.0).abs() < 1e-6, "packaging weight must not count toward content weight");
    }
}
