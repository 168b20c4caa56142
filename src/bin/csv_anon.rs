//! Consistently anonymize columns of a CSV file.
//!
//! Every distinct value of a selected column is replaced by one synthetic
//! value of the column's category, everywhere it appears.
//!
//! Usage:
//!   csv-anon --input clientes.csv -o anon.csv \
//!     --column nome=nome --column documento=cpf_cnpj [--seed 42] \
//!     [--separator ';' --encoding latin-1] [--mapping-out mapping.csv]

use anyhow::{Context, Result};
use clap::Parser;
use docx_templater::anonymize::{remap_column_with, Category, FakeData};
use docx_templater::{Grid, TabularConfig, TemplateError};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "csv-anon", about = "Consistently anonymize CSV columns with synthetic pt-BR data")]
struct Cli {
    /// Input CSV file
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV file
    #[arg(short, long)]
    output: PathBuf,

    /// Column to anonymize as NAME=CATEGORY (nome, email, cpf_cnpj, telefone, endereco, data)
    #[arg(long = "column", value_parser = parse_column_spec, required = true)]
    columns: Vec<(String, Category)>,

    /// Seed for reproducible output
    #[arg(long, env = "CSV_ANON_SEED")]
    seed: Option<u64>,

    /// Field separator of input and output
    #[arg(long, default_value = ",")]
    separator: char,

    /// Encoding of input and output (utf-8 or latin-1)
    #[arg(long, default_value = "utf-8")]
    encoding: String,

    /// Write the applied mapping (column, original, synthetic) to this CSV
    #[arg(long)]
    mapping_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct MappingRow<'a> {
    column: &'a str,
    original: &'a str,
    synthetic: &'a str,
}

fn parse_column_spec(spec: &str) -> std::result::Result<(String, Category), String> {
    let (name, category) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=CATEGORY, got '{}'", spec))?;
    let category = category.parse::<Category>().map_err(|e| e.to_string())?;
    Ok((name.trim().to_string(), category))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<TemplateError>()
            .map(TemplateError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = TabularConfig::new(cli.separator, &cli.encoding)?;

    println!("Reading {}", cli.input.display());
    let mut grid = Grid::from_path(&cli.input, &config)?;
    println!("  {} rows, {} columns", grid.row_count(), grid.columns().len());

    let mut fake = FakeData::from_seed(cli.seed);
    let mut mappings = Vec::with_capacity(cli.columns.len());
    for (column, category) in &cli.columns {
        let mapping = remap_column_with(&mut grid, column, *category, &mut fake)
            .with_context(|| format!("Failed to anonymize column '{}'", column))?;
        println!(
            "  {}: {} distinct values mapped as {}",
            column,
            mapping.len(),
            category
        );
        mappings.push((column.as_str(), mapping));
    }

    grid.write_to_path(&cli.output, &config)?;
    println!("\nWrote {}", cli.output.display());

    if let Some(ref path) = cli.mapping_out {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut count = 0;
        for (column, mapping) in &mappings {
            for (original, synthetic) in mapping {
                writer.serialize(MappingRow {
                    column,
                    original,
                    synthetic,
                })?;
                count += 1;
            }
        }
        writer.flush()?;
        println!("  {} mapping rows written to {}", count, path.display());
    }
    Ok(())
}
