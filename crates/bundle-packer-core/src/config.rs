use serde::{Deserialize, Serialize};

use crate::error::{BundlePackerError, Result};
use crate::model::{Catalogs, FillerSku, MaxLength, PackagingCatalogEntry, PackagingItem, PadStep};

/// Tuning constants governing the packing heuristics. All dimensions are in
/// millimetres, weights in kilograms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackerConfig {
    /// Hard upper bound on non-packaging weight per bundle.
    pub max_weight: f64,
    /// If `height / width` falls below this the reshaper narrows the bundle.
    pub min_h_w_ratio: f64,
    /// Minimum fraction of bundle width that must be covered near the
    /// ceiling for a bundle shape to be accepted without laying flat.
    pub min_ceiling_coverage: f64,
    /// How close (mm, from the top) an item's top edge must be to count
    /// toward ceiling coverage.
    pub max_dist_from_ceiling: f64,
    /// Width/height tolerance (mm) for two items to be considered
    /// stackable end-to-end along the length axis.
    pub stacking_max_diff: f64,
    /// Row height homogeneity tolerance (mm).
    pub sku_max_height_diff: f64,
    /// Support-coverage threshold for non-bottom-row placements.
    pub base_coverage_threshold: f64,
    /// Vertical tolerance (mm) for counting an item as support.
    pub sku_coverage_height_buffer: f64,
    /// Canonical short bundle length (mm).
    pub l_s: f64,
    /// Canonical long bundle length (mm).
    pub l_l: f64,
    /// Length threshold below which every remaining item forces the short
    /// canonical length to be chosen for a new bundle.
    pub short_bundle_threshold: f64,
    /// Tolerance (mm) between an item's length and the bundle's
    /// `max_length` for bottom-row eligibility.
    pub t_bot: f64,
    /// Boundary (mm) between "short" items (fit length-wise inside a
    /// filler void) and "long" items (load-bearing, row-packed).
    pub short_max: f64,
    /// Tolerance (mm) used when tucking a short item into an existing
    /// filler's footprint.
    pub filler_tuck_tolerance: f64,
    /// Coarse grid spacing (mm) used by the greedy fillers' candidate
    /// point scheme.
    pub greedy_grid_spacing: f64,
    /// Fine grid spacing (mm) used by the structured filler inserter.
    pub filler_grid_spacing: f64,
    /// Minimum distance (mm) from every bundle edge for a filler candidate
    /// point to earn the interior-void priority bonus.
    pub filler_interior_margin: f64,
    /// Slack (mm) allowed above a row's ceiling for rotated items placed
    /// by the greedy fillers.
    pub greedy_rotated_slack: f64,
    /// Width fraction (of bundle width) past which `fill_row_greedy`
    /// tolerates placements slightly above `y_limit`.
    pub right_edge_slack_fraction: f64,
    /// Step (mm) the reshaper narrows width/height by per iteration.
    pub reshape_step: f64,
    /// Maximum number of reshape iterations before giving up and laying
    /// the bundle flat.
    pub max_reshape_iters: u32,
    /// The magic "half of `L_s`" length (mm) that triggers in-place
    /// same-id doubling in the bottom row packer.
    pub half_bundle_length: f64,
    /// Tolerance (mm) around `half_bundle_length` for the doubling check.
    pub half_bundle_length_tolerance: f64,
    /// Multiplier applied to a filler candidate point's free-area score
    /// when it sits at least `filler_interior_margin` mm from every edge.
    pub filler_interior_bonus_factor: f64,
    pub catalogs: Catalogs,
}

impl PackerConfig {
    pub fn validate(&self) -> Result<()> {
        let checks: &[(&str, bool)] = &[
            ("max_weight", self.max_weight > 0.0),
            (
                "min_h_w_ratio",
                (0.0..=1.0).contains(&self.min_h_w_ratio),
            ),
            (
                "min_ceiling_coverage",
                (0.0..=1.0).contains(&self.min_ceiling_coverage),
            ),
            ("max_dist_from_ceiling", self.max_dist_from_ceiling >= 0.0),
            ("stacking_max_diff", self.stacking_max_diff >= 0.0),
            ("sku_max_height_diff", self.sku_max_height_diff >= 0.0),
            (
                "base_coverage_threshold",
                (0.0..=1.0).contains(&self.base_coverage_threshold),
            ),
            (
                "sku_coverage_height_buffer",
                self.sku_coverage_height_buffer >= 0.0,
            ),
            ("l_s", self.l_s > 0.0),
            ("l_l", self.l_l > self.l_s),
            ("t_bot", self.t_bot >= 0.0),
            ("short_max", self.short_max > 0.0 && self.short_max < self.l_s),
            (
                "filler_tuck_tolerance",
                self.filler_tuck_tolerance >= 0.0,
            ),
            ("greedy_grid_spacing", self.greedy_grid_spacing > 0.0),
            ("filler_grid_spacing", self.filler_grid_spacing > 0.0),
            (
                "right_edge_slack_fraction",
                (0.0..=1.0).contains(&self.right_edge_slack_fraction),
            ),
            ("reshape_step", self.reshape_step > 0.0),
            ("half_bundle_length", self.half_bundle_length > 0.0),
            (
                "half_bundle_length_tolerance",
                self.half_bundle_length_tolerance >= 0.0,
            ),
            (
                "filler_interior_bonus_factor",
                self.filler_interior_bonus_factor >= 1.0,
            ),
        ];
        for (name, ok) in checks {
            if !ok {
                return Err(BundlePackerError::InvalidConfig(format!(
                    "{name} is out of the allowed range"
                )));
            }
        }
        if self.catalogs.fillers.is_empty() {
            return Err(BundlePackerError::InvalidConfig(
                "filler catalog must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// The magic "half of `L_s`" length (mm) that triggers in-place
    /// same-id doubling in the bottom row packer. Not literally
    /// `l_s / 2` — the reference source hardcodes this independent of
    /// `L_s`'s configured value.
    pub fn half_bundle_length(&self) -> f64 {
        self.half_bundle_length
    }

    pub fn max_length_mm(&self, max_length: MaxLength) -> f64 {
        match max_length {
            MaxLength::Short => self.l_s,
            MaxLength::Long => self.l_l,
        }
    }
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            max_weight: 2500.0,
            min_h_w_ratio: 0.5,
            min_ceiling_coverage: 0.85,
            max_dist_from_ceiling: 50.0,
            stacking_max_diff: 15.0,
            sku_max_height_diff: 100.0,
            base_coverage_threshold: 0.7,
            sku_coverage_height_buffer: 10.0,
            l_s: 3680.0,
            l_l: 7340.0,
            short_bundle_threshold: 3700.0,
            t_bot: 30.0,
            short_max: 609.0,
            filler_tuck_tolerance: 1.0,
            greedy_grid_spacing: 40.0,
            filler_grid_spacing: 5.0,
            filler_interior_margin: 50.0,
            greedy_rotated_slack: 10.0,
            right_edge_slack_fraction: 0.7,
            reshape_step: 20.0,
            max_reshape_iters: 8,
            half_bundle_length: 3650.0,
            half_bundle_length_tolerance: 50.0,
            filler_interior_bonus_factor: 2.0,
            catalogs: default_catalogs(),
        }
    }
}

/// Default filler and packaging catalogs, grounded in the reference
/// implementation's `add_filler_materials` and packaging-attachment logic.
pub fn default_catalogs() -> Catalogs {
    Catalogs {
        fillers: vec![
            FillerSku {
                id: "Pack_44Filler".into(),
                width: 100.0,
                height: 100.0,
                length: 100.0,
                weight: 1.810,
            },
            FillerSku {
                id: "Pack_62Filler".into(),
                width: 150.0,
                height: 50.0,
                length: 50.0,
                weight: 2.268,
            },
        ],
        packaging: vec![
            packaging_entry(MaxLength::Short, "S"),
            packaging_entry(MaxLength::Long, "L"),
        ],
    }
}

fn packaging_entry(max_length: MaxLength, suffix: &str) -> PackagingCatalogEntry {
    PackagingCatalogEntry {
        max_length,
        angleboard: PackagingItem {
            id: format!("Pack_Angleboard_{suffix}"),
            weight: 0.9,
        },
        angleboard_qty_short: 2,
        angleboard_qty_long: 4,
        dunnage_a: PackagingItem {
            id: format!("Pack_Dunnage_A_{suffix}"),
            weight: 0.5,
        },
        dunnage_b: PackagingItem {
            id: format!("Pack_Dunnage_B_{suffix}"),
            weight: 0.5,
        },
        sub_bundle_wrap: PackagingItem {
            id: format!("Pack_SubWrap_{suffix}"),
            weight: 0.3,
        },
        master_bundle_wrap: PackagingItem {
            id: format!("Pack_MasterWrap_{suffix}"),
            weight: 0.6,
        },
        pad_steps: vec![
            PadStep {
                max_dim_mm: 200.0,
                item: PackagingItem {
                    id: format!("Pack_Pad_200_{suffix}"),
                    weight: 0.2,
                },
            },
            PadStep {
                max_dim_mm: 400.0,
                item: PackagingItem {
                    id: format!("Pack_Pad_400_{suffix}"),
                    weight: 0.35,
                },
            },
            PadStep {
                max_dim_mm: 800.0,
                item: PackagingItem {
                    id: format!("Pack_Pad_800_{suffix}"),
                    weight: 0.6,
                },
            },
            PadStep {
                max_dim_mm: f64::MAX,
                item: PackagingItem {
                    id: format!("Pack_Pad_Large_{suffix}"),
                    weight: 0.9,
                },
            },
        ],
        lumber: PackagingItem {
            id: format!("Pack_Lumber_{suffix}"),
            weight: 1.2,
        },
        lumber_qty_short: 1,
        lumber_qty_long: 2,
        min_pad_size_mm: 152.0,
    }
}

/// Fluent builder for [`PackerConfig`].
#[derive(Debug, Default, Clone)]
pub struct PackerConfigBuilder {
    cfg: PackerConfig,
}

impl PackerConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: PackerConfig::default(),
        }
    }
    pub fn max_weight(mut self, v: f64) -> Self {
        self.cfg.max_weight = v;
        self
    }
    pub fn min_h_w_ratio(mut self, v: f64) -> Self {
        self.cfg.min_h_w_ratio = v;
        self
    }
    pub fn min_ceiling_coverage(mut self, v: f64) -> Self {
        self.cfg.min_ceiling_coverage = v;
        self
    }
    pub fn max_dist_from_ceiling(mut self, v: f64) -> Self {
        self.cfg.max_dist_from_ceiling = v;
        self
    }
    pub fn stacking_max_diff(mut self, v: f64) -> Self {
        self.cfg.stacking_max_diff = v;
        self
    }
    pub fn sku_max_height_diff(mut self, v: f64) -> Self {
        self.cfg.sku_max_height_diff = v;
        self
    }
    pub fn base_coverage_threshold(mut self, v: f64) -> Self {
        self.cfg.base_coverage_threshold = v;
        self
    }
    pub fn sku_coverage_height_buffer(mut self, v: f64) -> Self {
        self.cfg.sku_coverage_height_buffer = v;
        self
    }
    pub fn canonical_lengths(mut self, l_s: f64, l_l: f64) -> Self {
        self.cfg.l_s = l_s;
        self.cfg.l_l = l_l;
        self
    }
    pub fn t_bot(mut self, v: f64) -> Self {
        self.cfg.t_bot = v;
        self
    }
    pub fn short_max(mut self, v: f64) -> Self {
        self.cfg.short_max = v;
        self
    }
    pub fn catalogs(mut self, v: Catalogs) -> Self {
        self.cfg.catalogs = v;
        self
    }
    pub fn build(self) -> PackerConfig {
        self.cfg
    }
}

impl PackerConfig {
    pub fn builder() -> PackerConfigBuilder {
        PackerConfigBuilder::new()
    }
}
