//! Single-bundle packer: orchestrates bottom-row selection,
//! alternating row passes, the short-item pass, filler insertion, and
//! short-items-into-filler embedding for one bundle.

use tracing::{debug, instrument};

use crate::context::PackContext;
use crate::filler::{fill_remaining_greedy, fill_row_greedy, insert_filler, tuck_short_items_into_filler};
use crate::model::{Bundle, MaxLength, PlacedSku, Sku};
use crate::row::pack_row;
use crate::row::pack_bottom_row;

fn choose_max_length(pool: &[Sku], ctx: &PackContext) -> (MaxLength, f64) {
    let config = ctx.config;
    let all_short = pool
        .iter()
        .all(|s| s.length.max(0.0) < config.short_bundle_threshold);
    if all_short {
        (MaxLength::Short, config.l_s)
    } else {
        (MaxLength::Long, config.l_l)
    }
}

/// Alternates `pack_row`/`fill_row_greedy` over `remaining` until a row
/// pass places nothing or the bundle runs out of height. Used for both the
/// long-item pool and, separately, the short-item pool partitioned out of
/// it — each pool is run through this loop independently so a short item
/// is never made to compete with a long one for the same row.
fn run_row_passes(bundle: &mut Bundle, remaining: &mut Vec<Sku>, current_y: &mut f64, ctx: &mut PackContext) {
    while !remaining.is_empty() && *current_y < bundle.height {
        let row_h = pack_row(bundle, remaining, *current_y, false, ctx);
        if row_h <= 0.0 {
            break;
        }
        fill_row_greedy(bundle, remaining, *current_y + row_h, ctx);
        *current_y += row_h;
    }
}

/// Produces one bundle from `pool`, returning the bundle and whatever
/// could not be placed. Never removes SKUs itself — callers decide
/// whether leftovers go to another bundle, a reshape retry, or the
/// removed registry.
#[instrument(skip_all, fields(pool_len = pool.len(), bundle_width, bundle_height))]
pub fn pack_single_bundle(
    pool: Vec<Sku>,
    bundle_width: f64,
    bundle_height: f64,
    ctx: &mut PackContext,
) -> (Bundle, Vec<Sku>) {
    let (max_length, max_length_mm) = choose_max_length(&pool, ctx);
    let mut bundle = Bundle::new(bundle_width, bundle_height, max_length, max_length_mm);
    let mut remaining = pool;
    let mut current_y = 0.0f64;
    // Each bundle establishes its own base-row width; a value left over
    // from a previous bundle in this context must not leak into this one.
    ctx.bottom_row_length = 0.0;

    let bottom_h = pack_bottom_row(&mut bundle, &mut remaining, ctx);
    if bottom_h > 0.0 {
        current_y = bottom_h;
    }

    let short_max = ctx.config.short_max;
    let mut short_pool: Vec<Sku> = remaining.iter().filter(|s| s.is_short(short_max)).cloned().collect();
    remaining.retain(|s| !s.is_short(short_max));

    run_row_passes(&mut bundle, &mut remaining, &mut current_y, ctx);
    fill_remaining_greedy(&mut bundle, &mut remaining, ctx);

    bundle.shrink_to_content();
    insert_filler(&mut bundle, ctx);
    tuck_short_items_into_filler(&mut bundle, &mut short_pool, ctx);

    if !short_pool.is_empty() {
        debug!(
            short_pool = short_pool.len(),
            "short items remain after tucking, discarding filler for a dedicated short-item pass"
        );
        bundle.placed.retain(|p| !p.is_filler());
        run_row_passes(&mut bundle, &mut short_pool, &mut current_y, ctx);
        fill_remaining_greedy(&mut bundle, &mut short_pool, ctx);

        bundle.shrink_to_content();
        insert_filler(&mut bundle, ctx);
        tuck_short_items_into_filler(&mut bundle, &mut short_pool, ctx);
    }

    if !short_pool.is_empty() {
        let filler_slot = bundle.placed.iter().find(|p| p.is_filler()).map(|p| (p.x, p.y));
        if let Some((fx, fy)) = filler_slot {
            for sku in short_pool.drain(..) {
                bundle.placed.push(PlacedSku::new(sku, fx, fy, false));
            }
        }
    }
    remaining.append(&mut short_pool);

    debug!(placed = bundle.placed.len(), leftover = remaining.len(), "single bundle pack complete");
    (bundle, remaining)
}
