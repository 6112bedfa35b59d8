use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::Serialize;
use shiny_sprite_wasm::{Config, FamilyInfo, RegionInfo, ShinySession, decode_rgba, encode_png};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Derive shiny recolors of pixel-art sprites from paired reference textures.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// One or more sprite image paths
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Reference pair as `key=normal.png,shiny.png` (repeatable)
    #[arg(long = "pair", value_name = "KEY=NORMAL,SHINY")]
    pairs: Vec<String>,

    /// Number of color families
    #[arg(short = 'k', long)]
    families: Option<usize>,

    /// Seed text; integers are used as-is, anything else is hashed
    #[arg(short, long)]
    seed: Option<String>,

    /// Extended seed (`seed|ink=..|k=..|...`); overrides --seed and settings
    #[arg(short = 'e', long)]
    extended_seed: Option<String>,

    /// JSON file with base settings
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Ink protection threshold (0-50)
    #[arg(long)]
    ink: Option<u8>,

    /// Global contrast (0.5-1.7)
    #[arg(long)]
    contrast: Option<f32>,

    /// References blended per family
    #[arg(long)]
    breadth: Option<usize>,

    /// Output directory
    #[arg(short = 'd', long)]
    out_dir: Option<PathBuf>,

    /// Output filename prefix (ignored when --out-dir supplied)
    #[arg(short = 'p', long, default_value = "shiny_")]
    prefix: String,

    /// Print family and region state as JSON
    #[arg(long)]
    report: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    input: String,
    extended_seed: String,
    families: &'a [FamilyInfo],
    regions: &'a [RegionInfo],
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).context("parsing config")?
        }
        None => Config::default(),
    };
    if let Some(k) = args.families {
        config.family_count = k;
    }
    if let Some(ink) = args.ink {
        config.ink_threshold = ink;
    }
    if let Some(contrast) = args.contrast {
        config.contrast = contrast;
    }
    if let Some(breadth) = args.breadth {
        config.consensus_breadth = breadth;
    }
    Ok(config)
}

fn parse_pair(arg: &str) -> Result<(String, PathBuf, PathBuf)> {
    let (key, files) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("pair `{arg}` is missing `key=`"))?;
    let (normal, shiny) = files
        .split_once(',')
        .ok_or_else(|| anyhow!("pair `{arg}` needs `normal,shiny`"))?;
    if key.trim().is_empty() {
        bail!("pair `{arg}` has an empty key");
    }
    Ok((key.trim().to_string(), PathBuf::from(normal.trim()), PathBuf::from(shiny.trim())))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shiny_sprite_wasm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let seed = shiny_sprite_wasm::rng::parse_seed(args.seed.as_deref());
    let mut session = ShinySession::new(config, seed);
    if let Some(ext) = &args.extended_seed {
        session.apply_extended_seed(ext)?;
    }

    for arg in &args.pairs {
        let (key, normal_path, shiny_path) = parse_pair(arg)?;
        let normal = fs::read(&normal_path)
            .with_context(|| format!("reading {}", normal_path.display()))?;
        let shiny = fs::read(&shiny_path)
            .with_context(|| format!("reading {}", shiny_path.display()))?;
        let normal = decode_rgba(&normal).context("decoding normal texture")?;
        let shiny = decode_rgba(&shiny).context("decoding shiny texture")?;
        if let Err(e) = session.add_reference_pair(&key, normal, shiny) {
            tracing::warn!("skipping pair {key}: {e}");
        }
    }

    for input in &args.inputs {
        let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
        session
            .load_sprite(decode_rgba(&bytes).context("decoding sprite")?)
            .context("loading sprite")?;
        session.recluster()?;
        let png = encode_png(&session.render().context("shinify processing failed")?)?;

        let out_path = if let Some(dir) = &args.out_dir {
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            dir.join(format!("{stem}.png"))
        } else {
            let name = input
                .file_name()
                .ok_or_else(|| anyhow!("input has no file name"))?
                .to_string_lossy();
            PathBuf::from(format!("{}{}", args.prefix, name))
        };

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&out_path, png)?;
        println!("Saved → {}", out_path.display());
        println!("Seed: {}", session.extended_seed());

        if args.report {
            let families = session.families();
            let regions = session.regions();
            let report = Report {
                input: input.display().to_string(),
                extended_seed: session.extended_seed(),
                families: &families,
                regions: &regions,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
