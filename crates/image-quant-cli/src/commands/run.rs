//! Full analysis command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image_quant::config::AnalysisConfig;
use image_quant::pipeline::{Analysis, analyze_batch, load};
use image_quant::preprocess::PreprocessReport;
use image_quant::report::ReportWriter;

pub fn run(
    config_path: Option<PathBuf>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    dependent_variable: Vec<String>,
    no_save: bool,
    verbose: bool,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => AnalysisConfig::from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    apply_overrides(&mut config, input, output, dependent_variable, no_save);

    let plan = config.validate().context("Invalid configuration")?;
    let input_path = config
        .input_path()
        .context("No input table: pass --input or set input_table in the config")?;

    if verbose {
        eprintln!("Loading measurements from: {}", input_path.display());
    }
    let prepared = load(&input_path, &plan)
        .with_context(|| format!("Failed to prepare {}", input_path.display()))?;
    print_report(&prepared.report);

    let outcomes = analyze_batch(&prepared.table, &plan);

    let mut succeeded: Vec<&Analysis> = Vec::new();
    let mut failures = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(analysis) => succeeded.push(analysis),
            Err(e) => failures.push(format!("{}: {e}", outcome.measure)),
        }
    }

    for analysis in &succeeded {
        println!();
        print_results(analysis);
        if plan.display_plots {
            println!();
            print_summaries(analysis);
        }
        if analysis.annotated.overflowed {
            eprintln!(
                "Note: significance brackets for {} exceed the plot headroom",
                analysis.measure()
            );
        }
    }

    if plan.save_artifacts && !succeeded.is_empty() {
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let writer = ReportWriter::dated(config.output_root(), date);
        save(&writer, &config, &succeeded)?;
        println!();
        println!("Saved artifacts to: {}", writer.dir().display());
    }

    if !failures.is_empty() {
        for failure in &failures {
            eprintln!("Analysis failed for {failure}");
        }
        anyhow::bail!("{} of {} analyses failed", failures.len(), outcomes.len());
    }

    Ok(())
}

fn apply_overrides(
    config: &mut AnalysisConfig,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    dependent_variable: Vec<String>,
    no_save: bool,
) {
    if let Some(input) = input {
        // A path given on the command line is relative to the working directory.
        if config.output_path.is_none() {
            config.output_path = config.input_dir.take();
        }
        config.input_dir = None;
        config.input_table = Some(input);
    }
    if let Some(output) = output {
        config.output_path = Some(output);
    }
    if !dependent_variable.is_empty() {
        *config = std::mem::take(config).with_dependent_variables(dependent_variable);
    }
    if no_save {
        config.save_artifacts = false;
    }
}

fn save(writer: &ReportWriter, config: &AnalysisConfig, analyses: &[&Analysis]) -> Result<()> {
    let dir: &Path = writer.dir();
    for analysis in analyses {
        writer
            .write_analysis(analysis)
            .with_context(|| format!("Failed to write artifacts to {}", dir.display()))?;
    }
    writer
        .write_config(config)
        .with_context(|| format!("Failed to write config snapshot to {}", dir.display()))?;
    Ok(())
}

fn print_report(report: &PreprocessReport) {
    println!(
        "Rows: {} read, {} retained, {} dropped",
        report.rows_read,
        report.rows_retained,
        report.dropped_total()
    );
    if report.dropped_total() > 0 {
        println!(
            "  malformed: {}, bad numeric: {}, zero intTot: {}, not in groups: {}",
            report.dropped_malformed,
            report.dropped_missing_numeric,
            report.dropped_zero_total,
            report.dropped_not_whitelisted
        );
    }
}

fn print_results(analysis: &Analysis) {
    let r = &analysis.results;
    println!(
        "Mixed model: {} ~ group + (1 | image)  [{} correction]",
        r.dependent_variable, r.correction
    );
    println!(
        "  {} series, {} images; residual var {:.4e}, image var {:.4e}",
        r.fit.n_obs, r.fit.n_images, r.fit.residual_variance, r.fit.random_intercept_variance
    );
    println!("{:-<92}", "");
    println!(
        "{:<8} {:<8} {:>11} {:>10} {:>8} {:>11} {:>11} {:>20} {:>5}",
        "group1", "group2", "estimate", "se", "z", "p", "p_adj", "95% CI", "sig"
    );
    for row in &r.rows {
        println!(
            "{:<8} {:<8} {:>11.5} {:>10.5} {:>8.3} {:>11.3e} {:>11.3e} {:>20} {:>5}",
            row.group1,
            row.group2,
            row.estimate,
            row.se,
            row.z_value,
            row.p_value,
            row.p_value_adj,
            format!("[{:.4}, {:.4}]", row.ci_lower, row.ci_upper),
            row.significance
        );
    }
}

fn print_summaries(analysis: &Analysis) {
    println!("Group summary ({}):", analysis.measure());
    println!("{:-<60}", "");
    println!(
        "{:<8} {:>6} {:>10} {:>10} {:>10} {:>10}",
        "group", "n", "mean", "sem", "ci_lower", "ci_upper"
    );
    for s in &analysis.annotated.summaries {
        println!(
            "{:<8} {:>6} {:>10.5} {:>10.5} {:>10.5} {:>10.5}",
            s.group, s.n, s.mean, s.sem, s.ci_lower, s.ci_upper
        );
    }
}
