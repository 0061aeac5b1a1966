//! Preprocess command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use image_quant::import::MeasurementImporter;
use image_quant::preprocess::Preprocessor;
use image_quant::report::write_table;

pub fn run(input: PathBuf, groups: Vec<String>, output: Option<PathBuf>, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("Importing from: {}", input.display());
    }

    let records = MeasurementImporter::new()
        .import(&input)
        .with_context(|| format!("Failed to import CSV from {}", input.display()))?;

    let whitelist: Vec<String> = groups
        .into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect();
    let preprocessor = if whitelist.is_empty() {
        Preprocessor::new()
    } else {
        Preprocessor::new().with_whitelist(whitelist)
    };
    let out = preprocessor
        .run(&records)
        .context("Preprocessing failed")?;

    let report = &out.report;
    println!("Rows read:            {}", report.rows_read);
    println!("Rows retained:        {}", report.rows_retained);
    println!("Dropped (malformed):  {}", report.dropped_malformed);
    println!("Dropped (numeric):    {}", report.dropped_missing_numeric);
    println!("Dropped (zero total): {}", report.dropped_zero_total);
    println!("Dropped (groups):     {}", report.dropped_not_whitelisted);
    println!("fracIn recomputed:    {}", report.frac_in_recomputed);

    println!("Groups:");
    for group in out.table.groups() {
        let rows = out.table.rows().iter().filter(|r| r.group == group).count();
        let images = out
            .table
            .image_groups()
            .values()
            .filter(|g| **g == group)
            .count();
        println!("  {group}: {images} images, {rows} series");
    }

    if let Some(output_path) = output {
        write_table(&output_path, &out.table)
            .with_context(|| format!("Failed to write to {}", output_path.display()))?;
        println!("Saved to: {}", output_path.display());
    }

    Ok(())
}
