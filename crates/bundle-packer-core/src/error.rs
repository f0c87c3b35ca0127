use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundlePackerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Fatal per-order: a bundle-override tag was applied to SKUs spanning
    /// more than one packing-machine class. The only error variant the
    /// engine raises out of `pack_order` rather than folding into the
    /// removed-SKU / bundle-list return data.
    #[error("override tag '{tag}' mixes packing machines: {detail}")]
    OverrideMachineMismatch { tag: String, detail: String },
}

pub type Result<T> = std::result::Result<T, BundlePackerError>;
