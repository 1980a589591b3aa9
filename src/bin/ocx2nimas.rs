//! ocx2nimas - convert an OCX HTML document into a NIMAS bundle.
//!
//! Usage:
//!   ocx2nimas lesson.html -o out/ --zip
//!   ocx2nimas lesson.html --xml g6.xml --opf g6.opf --cover cover.pdf
//!
//! Logging is controlled with `RUST_LOG` (default `ocx_nimas=info`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ocx_nimas::{Converter, GenerateOptions, GenerateReport, Templates};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ocx2nimas")]
#[command(about = "Convert an OCX HTML document into a NIMAS XML/OPF bundle")]
#[command(version)]
struct Args {
    /// OCX HTML input file
    input: PathBuf,

    /// Output directory (images go to <OUT_DIR>/images)
    #[arg(short, long, value_name = "OUT_DIR", default_value = ".")]
    output: PathBuf,

    /// NIMAS XML file name (default: <unix timestamp>.xml)
    #[arg(long, value_name = "NAME")]
    xml: Option<String>,

    /// OPF file name (default: <unix timestamp>.opf)
    #[arg(long, value_name = "NAME")]
    opf: Option<String>,

    /// Cover PDF to copy into the bundle
    #[arg(long, value_name = "PDF")]
    cover: Option<PathBuf>,

    /// Also write <xml name>.zip with every bundle file
    #[arg(long)]
    zip: bool,

    /// Fetch images even if they already exist
    #[arg(long)]
    force_download: bool,

    /// Base URL for relative image sources
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Per-image fetch timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    timeout: u64,

    /// Replacement OPF template
    #[arg(long, value_name = "PATH")]
    opf_template: Option<PathBuf>,

    /// Replacement style-transform ruleset (JSON)
    #[arg(long, value_name = "PATH")]
    stylesheet: Option<PathBuf>,

    /// Print a JSON summary instead of plain text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    xml: PathBuf,
    opf: PathBuf,
    cover: Option<PathBuf>,
    zip: Option<PathBuf>,
    images: Vec<String>,
    fetched: usize,
    image_errors: Vec<String>,
}

impl From<&GenerateReport> for Summary {
    fn from(report: &GenerateReport) -> Self {
        Self {
            xml: report.xml_path.clone(),
            opf: report.opf_path.clone(),
            cover: report.cover_path.clone(),
            zip: report.zip_path.clone(),
            images: report.images.iter().map(str::to_string).collect(),
            fetched: report.fetched,
            image_errors: report.image_errors.iter().map(ToString::to_string).collect(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ocx_nimas=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let templates = Templates::from_paths(args.opf_template.as_deref(), args.stylesheet.as_deref())
        .context("Failed to load templates")?;
    let converter = Converter::from_bytes(&bytes)
        .with_context(|| format!("Failed to load OCX document {}", args.input.display()))?
        .with_templates(templates);

    let options = GenerateOptions {
        force_download: args.force_download,
        xml_filename: args.xml,
        opf_filename: args.opf,
        cover_pdf: args.cover,
        zip: args.zip,
        base_url: args.base_url,
        base_dir: args.input.parent().map(PathBuf::from),
        fetch_timeout: Duration::from_secs(args.timeout),
        date: None,
    };

    let report = converter
        .generate(&args.output, &options)
        .with_context(|| format!("Failed to generate bundle in {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&Summary::from(&report))?);
    } else {
        println!("{}", report.xml_path.display());
        println!("{}", report.opf_path.display());
        if let Some(cover) = &report.cover_path {
            println!("{}", cover.display());
        }
        if let Some(zip) = &report.zip_path {
            println!("{}", zip.display());
        }
        for err in &report.image_errors {
            eprintln!("warning: {err}");
        }
    }

    Ok(())
}
