use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use bundle_packer_core::model::{expand_quantities, SkuRequest};
use bundle_packer_core::{pack_order, PackResult, PackerConfig};
use clap::{ArgAction, Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "bundle-packer",
    about = "Pack JSON SKU orders into shipping bundles",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Suppress the progress bar for Batch runs (implied by --quiet)
    #[arg(long, default_value_t = false, global = true, help_heading = "Logging/UX")]
    no_progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(short, long, default_value_t = false, global = true, help_heading = "Logging/UX")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a single order (one JSON file: bundle dims + machine lookup + items)
    Pack(PackArgs),
    /// Pack every order in a JSON array of order files, one result each
    Batch(BatchArgs),
    /// Pack once and print elapsed time plus bundle/removed counts
    Bench(PackArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    /// Order input file (JSON: see `OrderRequest` in the crate docs)
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Where to write the packed result (JSON). Defaults to stdout.
    #[arg(short, long, help_heading = "Input/Output")]
    output: Option<PathBuf>,
    /// YAML file overriding the default tuning constants
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Pretty-print the JSON result
    #[arg(long, default_value_t = true, help_heading = "Input/Output")]
    pretty: bool,
    /// Print the merged configuration and exit without packing
    #[arg(long, default_value_t = false, help_heading = "Input/Output")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Input/Output")]
    print_config_format: String,
}

#[derive(Parser, Debug, Clone)]
struct BatchArgs {
    /// JSON array of order requests
    input: PathBuf,
    /// Directory to write one `order-N.json` result file per input order
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// YAML file overriding the default tuning constants, applied to every order
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
}

/// One order's packing input as read from disk: bundle cross-section,
/// the set of colors routed to machine 1, and the (not yet
/// quantity-expanded) SKU lines.
#[derive(Debug, Deserialize)]
struct OrderRequest {
    bundle_width: f64,
    bundle_height: f64,
    #[serde(default)]
    machine_lookup: Vec<String>,
    items: Vec<SkuRequest>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Pack(args) => run_pack(args),
        Commands::Batch(args) => run_batch(args, !cli.no_progress && !cli.quiet),
        Commands::Bench(args) => run_bench(args),
    }
}

fn load_config(path: &Option<PathBuf>) -> anyhow::Result<PackerConfig> {
    let Some(path) = path else {
        return Ok(PackerConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let overrides: ConfigOverrides = serde_yaml::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    let cfg = overrides.into_packer_config(PackerConfig::default());
    cfg.validate().context("merged configuration is invalid")?;
    Ok(cfg)
}

fn load_order(path: &PathBuf) -> anyhow::Result<OrderRequest> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

fn run_pack(cli: &PackArgs) -> anyhow::Result<()> {
    let cfg = load_config(&cli.config)?;

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&cfg)?),
            _ => println!("{}", serde_json::to_string_pretty(&cfg)?),
        }
        return Ok(());
    }

    let order = load_order(&cli.input)?;
    let result = pack_one(&order, &cfg)?;
    write_result(&result, cli.output.as_ref(), cli.pretty)
}

fn pack_one(order: &OrderRequest, cfg: &PackerConfig) -> anyhow::Result<PackResult> {
    let machine_lookup = order.machine_lookup.iter().cloned().collect();
    let items = expand_quantities(order.items.clone());
    info!(
        item_count = items.len(),
        bundle_width = order.bundle_width,
        bundle_height = order.bundle_height,
        "packing order"
    );
    pack_order(items, order.bundle_width, order.bundle_height, &machine_lookup, cfg)
        .map_err(|e| anyhow::anyhow!(e))
}

fn write_result(result: &PackResult, output: Option<&PathBuf>, pretty: bool) -> anyhow::Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
            info!(?path, bundles = result.bundles.len(), removed = result.removed.len(), "wrote result");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_batch(cli: &BatchArgs, show_progress: bool) -> anyhow::Result<()> {
    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create out_dir {}", cli.out_dir.display()))?;
    let cfg = load_config(&cli.config)?;

    let text = fs::read_to_string(&cli.input).with_context(|| format!("read {}", cli.input.display()))?;
    let orders: Vec<OrderRequest> =
        serde_json::from_str(&text).with_context(|| format!("parse {}", cli.input.display()))?;
    info!(order_count = orders.len(), "packing batch");

    #[cfg(feature = "parallel")]
    let results = {
        let _ = show_progress;
        run_batch_parallel(&orders, &cfg)
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<anyhow::Result<PackResult>> = {
        let bar = batch_progress_bar(orders.len(), show_progress);
        let results = orders
            .iter()
            .map(|order| {
                let r = pack_one(order, &cfg);
                if let Some(b) = &bar {
                    b.inc(1);
                }
                r
            })
            .collect();
        if let Some(b) = &bar {
            b.finish_and_clear();
        }
        results
    };

    for (idx, result) in results.into_iter().enumerate() {
        match result {
            Ok(result) => {
                let path = cli.out_dir.join(format!("order-{idx}.json"));
                write_result(&result, Some(&path), true)?;
            }
            Err(e) => warn!(order_index = idx, error = %e, "order failed"),
        }
    }
    Ok(())
}

fn batch_progress_bar(len: usize, show: bool) -> Option<indicatif::ProgressBar> {
    if !show {
        return None;
    }
    let bar = indicatif::ProgressBar::new(len as u64);
    bar.set_style(
        indicatif::ProgressStyle::with_template(
            "{spinner:.green} packing {pos}/{len} [{elapsed_precise}] {wide_msg}",
        )
        .unwrap(),
    );
    Some(bar)
}

#[cfg(feature = "parallel")]
fn run_batch_parallel(orders: &[OrderRequest], cfg: &PackerConfig) -> Vec<anyhow::Result<PackResult>> {
    use bundle_packer_core::OrderInput;
    use std::collections::HashSet;

    let machine_lookup: HashSet<String> = orders
        .iter()
        .flat_map(|o| o.machine_lookup.iter().cloned())
        .collect();
    let inputs: Vec<OrderInput> = orders
        .iter()
        .map(|o| OrderInput {
            items: expand_quantities(o.items.clone()),
            bundle_width: o.bundle_width,
            bundle_height: o.bundle_height,
        })
        .collect();
    bundle_packer_core::pack_orders_parallel(&inputs, &machine_lookup, cfg)
        .into_iter()
        .map(|r| r.map_err(|e| anyhow::anyhow!(e)))
        .collect()
}

fn run_bench(cli: &PackArgs) -> anyhow::Result<()> {
    let cfg = load_config(&cli.config)?;
    let order = load_order(&cli.input)?;
    let start = Instant::now();
    let result = pack_one(&order, &cfg)?;
    let elapsed = start.elapsed();
    println!(
        "bundles={} removed={} time={}",
        result.bundles.len(),
        result.removed.len(),
        fmt_dur(elapsed)
    );
    Ok(())
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms >= 1.0 {
        format!("{ms:.1}ms")
    } else {
        format!("{}us", d.as_micros())
    }
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

/// Optional overrides merged onto [`PackerConfig::default`]. Only the
/// tunables an operator is likely to want to adjust per deployment are
/// exposed here; the filler/packaging catalogs stay code-defined.
#[derive(Debug, Deserialize, Default)]
struct ConfigOverrides {
    max_weight: Option<f64>,
    min_h_w_ratio: Option<f64>,
    min_ceiling_coverage: Option<f64>,
    base_coverage_threshold: Option<f64>,
    l_s: Option<f64>,
    l_l: Option<f64>,
    t_bot: Option<f64>,
    short_max: Option<f64>,
    reshape_step: Option<f64>,
    max_reshape_iters: Option<u32>,
    half_bundle_length: Option<f64>,
    half_bundle_length_tolerance: Option<f64>,
    filler_interior_bonus_factor: Option<f64>,
}

impl ConfigOverrides {
    fn into_packer_config(self, mut cfg: PackerConfig) -> PackerConfig {
        if let Some(v) = self.max_weight {
            cfg.max_weight = v;
        }
        if let Some(v) = self.min_h_w_ratio {
            cfg.min_h_w_ratio = v;
        }
        if let Some(v) = self.min_ceiling_coverage {
            cfg.min_ceiling_coverage = v;
        }
        if let Some(v) = self.base_coverage_threshold {
            cfg.base_coverage_threshold = v;
        }
        if let Some(v) = self.l_s {
            cfg.l_s = v;
        }
        if let Some(v) = self.l_l {
            cfg.l_l = v;
        }
        if let Some(v) = self.t_bot {
            cfg.t_bot = v;
        }
        if let Some(v) = self.short_max {
            cfg.short_max = v;
        }
        if let Some(v) = self.reshape_step {
            cfg.reshape_step = v;
        }
        if let Some(v) = self.max_reshape_iters {
            cfg.max_reshape_iters = v;
        }
        if let Some(v) = self.half_bundle_length {
            cfg.half_bundle_length = v;
        }
        if let Some(v) = self.half_bundle_length_tolerance {
            cfg.half_bundle_length_tolerance = v;
        }
        if let Some(v) = self.filler_interior_bonus_factor {
            cfg.filler_interior_bonus_factor = v;
        }
        cfg
    }
}
