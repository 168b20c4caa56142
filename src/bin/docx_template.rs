//! Fill a tagged DOCX template.
//!
//! Usage:
//!   docx-template extract --docx template.docx -o tags.json
//!   docx-template tags --tags tags.json
//!   docx-template render --docx template.docx --tags tags.json -o out.docx

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docx_templater::{RewriteOptions, TabularConfig, TagMap, Template, TemplateError};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "docx-template")]
#[command(about = "Extract, inspect and resolve |TAG| placeholders in DOCX templates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every tag of a template to a new JSON tag file
    Extract {
        /// Template DOCX file
        #[arg(long)]
        docx: PathBuf,

        /// Tag file to create (must not exist)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a tag map in tag order
    Tags {
        /// Tag file to print
        #[arg(long, conflicts_with = "docx")]
        tags: Option<PathBuf>,

        /// Template to extract tags from instead
        #[arg(long)]
        docx: Option<PathBuf>,
    },

    /// Apply a tag file to a template and save the result
    Render {
        /// Template DOCX file
        #[arg(long)]
        docx: PathBuf,

        /// Tag file; relative image and table paths are resolved against its directory
        #[arg(long)]
        tags: PathBuf,

        /// Output DOCX file
        #[arg(short, long)]
        output: PathBuf,

        /// Display width of inserted images in inches
        #[arg(long, default_value = "6.0")]
        image_width: f64,

        /// Field separator of table CSV files
        #[arg(long, env = "DOCX_TEMPLATE_SEPARATOR", default_value = ",")]
        separator: char,

        /// Encoding of table CSV files (utf-8 or latin-1)
        #[arg(long, env = "DOCX_TEMPLATE_ENCODING", default_value = "utf-8")]
        encoding: String,

        /// Print the resolve report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<TemplateError>()
            .map(TemplateError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract { docx, output } => extract(&docx, &output),
        Commands::Tags { tags, docx } => print_tags(tags.as_deref(), docx.as_deref()),
        Commands::Render {
            docx,
            tags,
            output,
            image_width,
            separator,
            encoding,
            json,
        } => {
            if image_width.is_nan() || image_width <= 0.0 {
                bail!("--image-width must be positive, got {}", image_width);
            }
            let options = RewriteOptions {
                image_width_inches: image_width,
                tabular: TabularConfig::new(separator, &encoding)?,
                base_dir: tags
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .map(Path::to_path_buf),
            };
            render(&docx, &tags, &output, options, json)
        }
    }
}

fn extract(docx: &Path, output: &Path) -> Result<()> {
    println!("Opening DOCX: {}", docx.display());
    let template = Template::open(docx)?;
    let map = template
        .export_tags(output)
        .with_context(|| format!("Failed to export tags to {}", output.display()))?;
    println!("  {} tags written to {}", map.len(), output.display());
    Ok(())
}

fn print_tags(tags: Option<&Path>, docx: Option<&Path>) -> Result<()> {
    let map = match (tags, docx) {
        (Some(path), _) => TagMap::load(path)?,
        (None, Some(path)) => Template::open(path)?.extract_tags(),
        (None, None) => bail!("pass --tags or --docx"),
    };
    print!("{}", map);
    println!(
        "{} tags, {} unresolved",
        map.len(),
        map.unresolved_count()
    );
    Ok(())
}

fn render(
    docx: &Path,
    tags: &Path,
    output: &Path,
    options: RewriteOptions,
    json: bool,
) -> Result<()> {
    println!("Opening DOCX: {}", docx.display());
    let mut template = Template::open(docx)?.with_options(options);
    let map = template.load_tag_map(tags)?;
    println!("  {} tags loaded from {}", map.len(), tags.display());

    let report = template
        .resolve()
        .with_context(|| format!("Failed to resolve {}", tags.display()))?;
    template
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("\nWrote {}", output.display());
    println!("  Text replacements: {}", report.text_replacements);
    println!("  Images inserted:   {}", report.images);
    println!("  Tables inserted:   {}", report.tables);
    if !report.skipped.is_empty() {
        println!("  Skipped (no value): {}", report.skipped.join(", "));
    }
    if !report.unmatched.is_empty() {
        println!("  Not found in document: {}", report.unmatched.join(", "));
    }
    Ok(())
}
