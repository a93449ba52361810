//! Integration tests for Questionnaire Analyzer

use std::collections::BTreeSet;
use std::io::Write;

use questionnaire_analyzer::sample::{write_sample, SAMPLE_SEED};
use questionnaire_analyzer::{
    load_table, AnalysisConfig, AnalysisError, Analyzer, RunOptions, Stage, CLUSTER_COLUMN,
};
use tempfile::{tempdir, NamedTempFile};

/// Create a CSV file with the given content
fn create_test_csv(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_end_to_end_pipeline() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("sample_questionnaire_data.csv");
    let output = dir.path().join("cluster_results.csv");
    write_sample(&input, 200, SAMPLE_SEED).unwrap();

    let mut analyzer = Analyzer::default();
    let options = RunOptions {
        n_clusters: Some(3),
        output_path: output.clone(),
        ..RunOptions::default()
    };
    let report = analyzer.run(&input, &options).unwrap();

    assert_eq!(report.n_clusters, 3);
    assert!(report.n_components >= 1 && report.n_components <= 8);
    assert!(report.explained_variance >= 0.95 - 1e-9);
    assert!(report.plots.is_empty());

    let results = load_table(&output).unwrap();
    assert_eq!(results.n_rows(), 200);

    let names = results.column_names();
    assert_eq!(&names[..8], &load_table(&input).unwrap().column_names()[..]);
    assert_eq!(names[8], CLUSTER_COLUMN);
    assert_eq!(names[9], "PC1");

    let labels: BTreeSet<i64> = results
        .numeric_values(CLUSTER_COLUMN)
        .unwrap()
        .into_iter()
        .map(|v| v.unwrap() as i64)
        .collect();
    assert_eq!(labels, BTreeSet::from([0, 1, 2]));

    let pc1 = results.numeric_values("PC1").unwrap();
    assert!(pc1.iter().all(|v| v.is_some_and(f64::is_finite)));

    let summary = analyzer.summary().unwrap();
    assert_eq!(summary.clusters.len(), 3);
    assert_eq!(
        summary.clusters.iter().map(|c| c.count).sum::<usize>(),
        200
    );
}

#[test]
fn test_automatic_cluster_selection() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("survey.csv");
    write_sample(&input, 80, SAMPLE_SEED).unwrap();

    let config = AnalysisConfig {
        max_k: 6,
        ..AnalysisConfig::default()
    };
    let mut analyzer = Analyzer::new(config);
    let options = RunOptions {
        output_path: dir.path().join("out.csv"),
        ..RunOptions::default()
    };
    let report = analyzer.run(&input, &options).unwrap();

    let search = analyzer.search().unwrap();
    assert_eq!(search.k_values, vec![2, 3, 4, 5, 6]);
    assert_eq!(Some(report.n_clusters), search.best_k());

    let best = search
        .silhouette_scores
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let position = search.k_values.iter().position(|&k| k == report.n_clusters).unwrap();
    assert_eq!(search.silhouette_scores[position], best);
}

#[test]
fn test_repeated_runs_are_identical() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("survey.csv");
    write_sample(&input, 120, SAMPLE_SEED).unwrap();

    let options = RunOptions {
        n_clusters: Some(4),
        output_path: dir.path().join("out.csv"),
        ..RunOptions::default()
    };

    let mut first = Analyzer::default();
    first.run(&input, &options).unwrap();
    let mut second = Analyzer::default();
    second.run(&input, &options).unwrap();

    assert_eq!(
        first.assignment().unwrap().labels,
        second.assignment().unwrap().labels
    );
}

#[test]
fn test_too_many_clusters_is_invalid_k() {
    let file = create_test_csv("a,b\n1,2\n3,5\n4,4\n8,1\n");
    let dir = tempdir().unwrap();
    let options = RunOptions {
        n_clusters: Some(5),
        output_path: dir.path().join("out.csv"),
        ..RunOptions::default()
    };

    let mut analyzer = Analyzer::default();
    let failure = analyzer.run(file.path(), &options).unwrap_err();

    assert_eq!(failure.stage, Stage::Cluster);
    assert!(matches!(failure.source, AnalysisError::InvalidK { k: 5, .. }));
    assert!(!dir.path().join("out.csv").exists());
}

#[test]
fn test_no_numeric_columns_fails_cleanly() {
    let file = create_test_csv("ID,姓名,城市\n1,张三,北京\n2,李四,上海\n3,王五,广州\n");
    let options = RunOptions {
        exclude_columns: vec!["ID".to_string()],
        n_clusters: Some(2),
        ..RunOptions::default()
    };

    let mut analyzer = Analyzer::default();
    let failure = analyzer.run(file.path(), &options).unwrap_err();

    assert_eq!(failure.stage, Stage::Reduce);
    assert!(matches!(failure.source, AnalysisError::EmptyMatrix(_)));
    assert_eq!(analyzer.standardized().unwrap().n_columns(), 0);
}

#[test]
fn test_missing_values_are_filled() {
    let file = create_test_csv(
        "年龄,满意度,备注\n\
         25,8,好\n\
         ,6,\n\
         45,,一般\n\
         35,4,差\n\
         55,9,好\n",
    );
    let dir = tempdir().unwrap();
    let options = RunOptions {
        n_clusters: Some(2),
        output_path: dir.path().join("out.csv"),
        ..RunOptions::default()
    };

    let mut analyzer = Analyzer::default();
    analyzer.run(file.path(), &options).unwrap();

    let matrix = analyzer.standardized().unwrap();
    assert_eq!(matrix.columns, vec!["年龄", "满意度"]);
    assert!(matrix.values.iter().all(|v| v.is_finite()));

    let results = load_table(dir.path().join("out.csv")).unwrap();
    assert_eq!(results.n_rows(), 5);
    // Missing cells are written back as missing
    assert_eq!(results.numeric_values("年龄").unwrap()[1], None);
}

#[test]
fn test_na_markers_are_filled_not_dropped() {
    let file = create_test_csv(
        "年龄,满意度\n\
         25,8\n\
         NA,6\n\
         45,N/A\n\
         35,4\n\
         55,9\n",
    );
    let dir = tempdir().unwrap();
    let options = RunOptions {
        n_clusters: Some(2),
        output_path: dir.path().join("out.csv"),
        ..RunOptions::default()
    };

    let mut analyzer = Analyzer::default();
    analyzer.run(file.path(), &options).unwrap();

    let matrix = analyzer.standardized().unwrap();
    assert_eq!(matrix.columns, vec!["年龄", "满意度"]);
    assert!(matrix.dropped_non_numeric.is_empty());
    assert!(matrix.values.iter().all(|v| v.is_finite()));
}

#[test]
fn test_duplicate_rows_cap_cluster_count() {
    let file = create_test_csv("a,b\n1,2\n1,2\n1,2\n1,2\n7,9\n");
    let options = RunOptions {
        n_clusters: Some(3),
        ..RunOptions::default()
    };

    let mut analyzer = Analyzer::default();
    let failure = analyzer.run(file.path(), &options).unwrap_err();

    assert_eq!(failure.stage, Stage::Cluster);
    assert!(matches!(
        failure.source,
        AnalysisError::InvalidK { k: 3, max: 2, .. }
    ));
}
