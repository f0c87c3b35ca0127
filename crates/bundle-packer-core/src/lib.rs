//! Deterministic 2-D bin-packing engine for palletizing rectangular SKUs
//! into fixed-cross-section shipping bundles.
//!
//! - Geometry: axis-aligned rectangles with optional 90° rotation, overlap,
//!   support-coverage, and ceiling-coverage primitives ([`geometry`]).
//! - Placement: a row packer, greedy void fillers, a length-wise stacking
//!   finder, a structured filler inserter, and a bundle reshaper that
//!   narrows or lays bundles flat when their shape comes out wrong.
//! - Coordination: splits an order by override tag / component flag /
//!   color, packs each group, then merges compatible bundles pairwise.
//!
//! Quick example:
//! ```
//! use std::collections::HashSet;
//! use bundle_packer_core::{pack_order, PackerConfig, Sku};
//!
//! let config = PackerConfig::default();
//! let machine_lookup = HashSet::new();
//! let items = vec![Sku::new(0, "Rail.5", 200.0, 150.0, config.l_s, 12.0)];
//! let result = pack_order(items, 1200.0, 1200.0, &machine_lookup, &config).unwrap();
//! println!("bundles: {}", result.bundles.len());
//! ```

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod filler;
pub mod geometry;
pub mod model;
pub mod packaging;
pub mod reshape;
pub mod row;
pub mod single_bundle;
pub mod stacking;

pub use config::{PackerConfig, PackerConfigBuilder};
pub use coordinator::pack_order;
pub use error::{BundlePackerError, Result};
pub use model::{
    Bundle, Catalogs, FillerSku, MachineTag, MaxLength, PackResult, PackagingCatalogEntry,
    PackagingItem, PadStep, PlacedSku, PlacementKind, RemovedSku, Sku, SkuUid,
};

/// Convenience prelude bringing the primary types and entry points into scope.
pub mod prelude {
    pub use crate::config::{PackerConfig, PackerConfigBuilder};
    pub use crate::coordinator::pack_order;
    pub use crate::error::{BundlePackerError, Result};
    pub use crate::model::{Bundle, MachineTag, PackResult, PlacedSku, RemovedSku, Sku};
}

/// One order's packing inputs, for batch use with [`pack_orders_parallel`].
#[cfg(feature = "parallel")]
#[derive(Debug, Clone)]
pub struct OrderInput {
    pub items: Vec<model::Sku>,
    pub bundle_width: f64,
    pub bundle_height: f64,
}

/// Packs a batch of independent orders concurrently. Orders share no
/// mutable state, so this is a thin `rayon` fan-out over
/// [`pack_order`]; each order still gets its own [`context::PackContext`].
#[cfg(feature = "parallel")]
pub fn pack_orders_parallel(
    orders: &[OrderInput],
    machine_lookup: &std::collections::HashSet<String>,
    config: &config::PackerConfig,
) -> Vec<Result<model::PackResult>> {
    use rayon::prelude::*;

    orders
        .par_iter()
        .map(|order| {
            pack_order(
                order.items.clone(),
                order.bundle_width,
                order.bundle_height,
                machine_lookup,
                config,
            )
        })
        .collect()
}
