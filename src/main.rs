//! Questionnaire Analyzer: PCA and K-means clustering of survey data
//!
//! This is the main entrypoint that wires the command line to the analysis
//! pipeline and prints the report.

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use questionnaire_analyzer::{sample, Analyzer, Args, RunReport};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    args.validate()?;

    if args.generate_sample && !args.input.exists() {
        sample::write_sample(&args.input, args.sample_rows, args.seed)?;
        println!(
            "✓ Sample questionnaire created: {} ({} rows)",
            args.input.display(),
            args.sample_rows
        );
    }

    run_full_pipeline(&args)
}

/// Run the analysis pipeline and print its report
fn run_full_pipeline(args: &Args) -> Result<()> {
    println!("=== Questionnaire Analysis ===\n");
    if args.verbose {
        println!("  Input file: {}", args.input.display());
        if !args.exclude.is_empty() {
            println!("  Excluded columns: {:?}", args.exclude);
        }
    }

    let start_time = Instant::now();
    let mut analyzer = Analyzer::new(args.config());
    let report = analyzer.run(&args.input, &args.run_options());

    // Print what the completed stages produced, even if a later one failed
    print_stage_details(&analyzer, args.verbose);

    let report = match report {
        Ok(report) => report,
        Err(failure) => {
            eprintln!("\n✗ Analysis stopped: {failure}");
            anyhow::bail!(failure);
        }
    };

    if let Some(summary) = analyzer.summary() {
        if !summary.is_empty() {
            println!("\n{summary}");
        }
        if let Some(path) = &args.summary_json {
            summary.write_json(path)?;
            println!("Cluster characteristics written to: {}", path.display());
        }
    }

    print_completion(&report, start_time);
    Ok(())
}

fn print_stage_details(analyzer: &Analyzer, verbose: bool) {
    if let Some(table) = analyzer.table() {
        println!(
            "✓ Data loaded: {} rows, {} columns",
            table.n_rows(),
            table.n_columns()
        );
        if verbose {
            println!("  Columns: {:?}", table.column_names());
        }
    }

    if let Some(matrix) = analyzer.standardized() {
        println!(
            "✓ Preprocessing complete: {} rows x {} numeric columns",
            matrix.n_rows(),
            matrix.n_columns()
        );
        if !matrix.dropped_non_numeric.is_empty() {
            println!(
                "  Non-numeric columns ignored: {:?}",
                matrix.dropped_non_numeric
            );
        }
    }

    if let Some(projection) = analyzer.projection() {
        println!("✓ PCA complete");
        if let Some(matrix) = analyzer.standardized() {
            println!("  Original dimensions: {}", matrix.n_columns());
        }
        println!("  Reduced dimensions: {}", projection.n_components());
        println!(
            "  Explained variance: {:.4}",
            projection.total_explained_variance()
        );
        if verbose {
            for (i, ratio) in projection.full_variance_ratio.iter().enumerate() {
                println!("    PC{}: {:.4}", i + 1, ratio);
            }
        }
    }

    if let Some(search) = analyzer.search() {
        println!("\n=== Cluster Count Search ===");
        println!("  k | Inertia      | Silhouette");
        println!("  --|--------------|-----------");
        for ((k, inertia), score) in search
            .k_values
            .iter()
            .zip(&search.inertias)
            .zip(&search.silhouette_scores)
        {
            println!("  {k:>2}| {inertia:>12.2} | {score:>9.3}");
        }
        if let Some(best) = search.best_k() {
            println!("Suggested number of clusters: {best}");
        }
    }

    if let Some(assignment) = analyzer.assignment() {
        println!("\n✓ K-means complete: {} clusters", assignment.n_clusters);
        let total = assignment.labels.len();
        for (i, &size) in assignment.cluster_sizes().iter().enumerate() {
            let percentage = (size as f64 / total as f64) * 100.0;
            println!("  Cluster {}: {} samples ({:.1}%)", i, size, percentage);
        }
        println!("  Within-cluster sum of squares: {:.2}", assignment.inertia);
    }
}

fn print_completion(report: &RunReport, start_time: Instant) {
    println!("=== Analysis Complete ===");
    println!(
        "Principal components: {} ({:.1}% of variance)",
        report.n_components,
        report.explained_variance * 100.0
    );
    println!("Clusters: {}", report.n_clusters);
    println!("Results saved to: {}", report.output_path.display());
    for plot in &report.plots {
        println!("Plot saved to: {}", plot.display());
    }
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
}
