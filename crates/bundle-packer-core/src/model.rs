use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value carried through `opaque_attrs` verbatim. Never interpreted by the
/// engine except for the handful of tagged keys read out explicitly.
pub type AttrValue = serde_json::Value;

/// A logistics-facing identifier, unique within a single `pack_order` call.
/// Assigned once, at input-expansion time, and never recomputed; stacking
/// and merge bookkeeping use this instead of `id` so that multiple pieces
/// sharing the same SKU id are still distinguishable.
pub type SkuUid = u64;

/// Keys the engine reads out of `opaque_attrs`. Everything else in the map
/// passes through untouched.
pub const ATTR_BDL_OVERRIDE: &str = "Bdl_Override";
pub const ATTR_COMPONENT: &str = "Component";
pub const ATTR_ORDER_NBR: &str = "OrderNbr";

/// A rectangular item to be packed. `width`/`height` describe its natural
/// (un-rotated) cross-section; a placement's actual footprint is derived via
/// [`crate::geometry::oriented_dims`] from the `rotated` flag carried on
/// [`PlacedSku`], never by mutating this struct in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sku {
    pub uid: SkuUid,
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub length: f64,
    pub weight: f64,
    pub bundle_qty: u32,
    pub can_be_bottom: bool,
    pub description: String,
    #[serde(default)]
    pub opaque_attrs: BTreeMap<String, AttrValue>,
}

impl Sku {
    pub fn new(
        uid: SkuUid,
        id: impl Into<String>,
        width: f64,
        height: f64,
        length: f64,
        weight: f64,
    ) -> Self {
        Self {
            uid,
            id: id.into(),
            width,
            height,
            length,
            weight,
            bundle_qty: 1,
            can_be_bottom: true,
            description: String::new(),
            opaque_attrs: BTreeMap::new(),
        }
    }

    pub fn bdl_override(&self) -> Option<&str> {
        self.opaque_attrs.get(ATTR_BDL_OVERRIDE)?.as_str()
    }

    pub fn is_component(&self) -> bool {
        self.opaque_attrs
            .get(ATTR_COMPONENT)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn order_nbr(&self) -> Option<&str> {
        self.opaque_attrs.get(ATTR_ORDER_NBR)?.as_str()
    }

    /// Color code embedded in `id` after the last `.`, with any trailing
    /// `_Partial` annotation stripped. Falls back to the whole id when there
    /// is no `.` separator.
    pub fn color_code(&self) -> &str {
        let tail = match self.id.rfind('.') {
            Some(idx) => &self.id[idx + 1..],
            None => self.id.as_str(),
        };
        tail.strip_suffix("_Partial").unwrap_or(tail)
    }

    pub fn is_short(&self, short_max: f64) -> bool {
        self.length <= short_max
    }
}

/// One input line before quantity expansion: a single record covers every
/// identical piece of a SKU in the order, with `bundle_qty` pieces per
/// sub-bundle. `pack_order` expects SKUs already expanded by quantity, so
/// callers run this first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuRequest {
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub length: f64,
    pub weight: f64,
    #[serde(default = "default_bundle_qty")]
    pub bundle_qty: u32,
    #[serde(default = "default_can_be_bottom")]
    pub can_be_bottom: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub opaque_attrs: BTreeMap<String, AttrValue>,
}

fn default_bundle_qty() -> u32 {
    1
}

fn default_can_be_bottom() -> bool {
    true
}

/// Expands each [`SkuRequest`] into `bundle_qty` individual [`Sku`]s,
/// assigning sequential [`SkuUid`]s starting at `0`. `id` and the rest of
/// the record are cloned onto every resulting piece; `bundle_qty` itself
/// is carried through unchanged as descriptive metadata only — it plays
/// no further role once expansion has happened.
pub fn expand_quantities(requests: Vec<SkuRequest>) -> Vec<Sku> {
    let mut out = Vec::new();
    let mut uid: SkuUid = 0;
    for req in requests {
        for _ in 0..req.bundle_qty.max(1) {
            out.push(Sku {
                uid,
                id: req.id.clone(),
                width: req.width,
                height: req.height,
                length: req.length,
                weight: req.weight,
                bundle_qty: req.bundle_qty,
                can_be_bottom: req.can_be_bottom,
                description: req.description.clone(),
                opaque_attrs: req.opaque_attrs.clone(),
            });
            uid += 1;
        }
    }
    out
}

/// Where and how a [`Sku`] was placed inside a bundle's cross-section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedSku {
    pub sku: Sku,
    pub x: f64,
    pub y: f64,
    pub rotated: bool,
    pub kind: PlacementKind,
}

/// Distinguishes ordinary content from filler and packaging, which carry
/// relaxed invariants (filler still occupies geometry; packaging does not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlacementKind {
    Content,
    Filler,
    Packaging,
}

impl PlacedSku {
    pub fn new(sku: Sku, x: f64, y: f64, rotated: bool) -> Self {
        Self {
            sku,
            x,
            y,
            rotated,
            kind: PlacementKind::Content,
        }
    }

    pub fn width(&self) -> f64 {
        crate::geometry::oriented_width(&self.sku, self.rotated)
    }

    pub fn height(&self) -> f64 {
        crate::geometry::oriented_height(&self.sku, self.rotated)
    }

    pub fn top(&self) -> f64 {
        self.y + self.height()
    }

    pub fn right(&self) -> f64 {
        self.x + self.width()
    }

    pub fn is_filler(&self) -> bool {
        self.kind == PlacementKind::Filler
    }

    pub fn is_packaging(&self) -> bool {
        self.kind == PlacementKind::Packaging
    }
}

/// The two canonical bundle lengths the engine ever produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxLength {
    Short,
    Long,
}

/// Which packing machine a bundle is destined for. `Mixed` only arises from
/// cross-machine merges or component bundles spanning both machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineTag {
    Mach1,
    Mach5,
    Mixed,
}

impl std::fmt::Display for MachineTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MachineTag::Mach1 => "MACH1",
            MachineTag::Mach5 => "MACH5",
            MachineTag::Mixed => "MIXED",
        })
    }
}

/// A fixed-cross-section container accumulating placed SKUs, filler, and
/// (once finalised) packaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    /// Assigned by the coordinator once a bundle becomes a candidate for
    /// merging; `0` until then. Used only as a memo key for "this pair was
    /// already attempted", never for placement logic.
    #[serde(default)]
    pub id: u64,
    pub width: f64,
    pub height: f64,
    pub max_length: MaxLength,
    pub max_length_mm: f64,
    pub packing_machine: MachineTag,
    pub placed: Vec<PlacedSku>,
}

impl Bundle {
    pub fn new(width: f64, height: f64, max_length: MaxLength, max_length_mm: f64) -> Self {
        Self {
            id: 0,
            width,
            height,
            max_length,
            max_length_mm,
            packing_machine: MachineTag::Mach5,
            placed: Vec::new(),
        }
    }

    /// Sum of weight over non-packaging content (fillers count; packaging
    /// does not).
    pub fn content_weight(&self) -> f64 {
        self.placed
            .iter()
            .filter(|p| !p.is_packaging())
            .map(|p| p.sku.weight)
            .sum()
    }

    pub fn content_items(&self) -> impl Iterator<Item = &PlacedSku> {
        self.placed.iter().filter(|p| !p.is_packaging())
    }

    pub fn non_filler_items(&self) -> impl Iterator<Item = &PlacedSku> {
        self.placed
            .iter()
            .filter(|p| !p.is_packaging() && !p.is_filler())
    }

    pub fn is_empty_of_content(&self) -> bool {
        self.content_items().next().is_none()
    }

    /// Actual occupied extent, ignoring packaging, used to shrink the
    /// bundle to its content before filler insertion and on finalisation.
    pub fn content_extent(&self) -> (f64, f64) {
        let mut max_x: f64 = 0.0;
        let mut max_y: f64 = 0.0;
        for p in self.content_items() {
            max_x = max_x.max(p.right());
            max_y = max_y.max(p.top());
        }
        (max_x, max_y)
    }

    pub fn shrink_to_content(&mut self) {
        let (w, h) = self.content_extent();
        if w > 0.0 {
            self.width = w;
        }
        if h > 0.0 {
            self.height = h;
        }
    }
}

/// A catalog-provided filler shape, chained end to end along the length
/// axis to stabilise residual voids. See [`crate::config::PackerConfig`]
/// for the shipped default catalog (`Pack_44Filler`, `Pack_62Filler`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillerSku {
    pub id: String,
    pub width: f64,
    pub height: f64,
    pub length: f64,
    pub weight: f64,
}

impl FillerSku {
    pub fn to_sku(&self, uid: SkuUid) -> Sku {
        let mut sku = Sku::new(
            uid,
            self.id.clone(),
            self.width,
            self.height,
            self.length,
            self.weight,
        );
        sku.can_be_bottom = false;
        sku.description = format!("Filler Material {}x{}mm", self.width, self.height);
        sku
    }
}

/// One weight-only entry in the packaging catalog: an id and a per-piece
/// weight. Packaging SKUs never participate in geometric invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingItem {
    pub id: String,
    pub weight: f64,
}

/// A four-step pad size table keyed by the mm threshold each step covers;
/// a step is skipped when the matching bundle dimension is below the
/// catalog's `min_pad_size_mm`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PadStep {
    pub max_dim_mm: f64,
    pub item: PackagingItem,
}

/// Packaging catalog entries keyed by a bundle's canonical `max_length`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingCatalogEntry {
    pub max_length: MaxLength,
    pub angleboard: PackagingItem,
    pub angleboard_qty_short: u32,
    pub angleboard_qty_long: u32,
    pub dunnage_a: PackagingItem,
    pub dunnage_b: PackagingItem,
    pub sub_bundle_wrap: PackagingItem,
    pub master_bundle_wrap: PackagingItem,
    pub pad_steps: Vec<PadStep>,
    pub lumber: PackagingItem,
    pub lumber_qty_short: u32,
    pub lumber_qty_long: u32,
    pub min_pad_size_mm: f64,
}

/// Read-only inputs shared across an entire `pack_order` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalogs {
    pub fillers: Vec<FillerSku>,
    pub packaging: Vec<PackagingCatalogEntry>,
}

impl Catalogs {
    pub fn packaging_for(&self, max_length: MaxLength) -> Option<&PackagingCatalogEntry> {
        self.packaging
            .iter()
            .find(|entry| matches_max_length(entry.max_length, max_length))
    }
}

fn matches_max_length(a: MaxLength, b: MaxLength) -> bool {
    matches!(
        (a, b),
        (MaxLength::Short, MaxLength::Short) | (MaxLength::Long, MaxLength::Long)
    )
}

/// A SKU the engine could not place in any bundle of the order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedSku {
    pub sku: Sku,
    pub reason: String,
}

/// Final output of `pack_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackResult {
    pub bundles: Vec<Bundle>,
    pub removed: Vec<RemovedSku>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_quantities_assigns_distinct_sequential_uids() {
        let requests = vec![
            SkuRequest {
                id: "A.5".into(),
                width: 100.0,
                height: 50.0,
                length: 3680.0,
                weight: 2.0,
                bundle_qty: 3,
                can_be_bottom: true,
                description: String::new(),
                opaque_attrs: BTreeMap::new(),
            },
            SkuRequest {
                id: "B.9".into(),
                width: 80.0,
                height: 40.0,
                length: 3680.0,
                weight: 1.0,
                bundle_qty: 1,
                can_be_bottom: true,
                description: String::new(),
                opaque_attrs: BTreeMap::new(),
            },
        ];
        let skus = expand_quantities(requests);
        assert_eq!(skus.len(), 4);
        let uids: Vec<SkuUid> = skus.iter().map(|s| s.uid).collect();
        assert_eq!(uids, vec![0, 1, 2, 3]);
        assert_eq!(skus.iter().filter(|s| s.id == "A.5").count(), 3);
    }

    #[test]
    fn color_code_strips_partial_suffix() {
        let sku = Sku::new(0, "Rail.5_Partial", 10.0, 10.0, 10.0, 1.0);
        assert_eq!(sku.color_code(), "5");
    }
}
