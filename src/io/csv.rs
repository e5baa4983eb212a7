//! Delimited-text reading and writing for measurement tables, schemas and results

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ndarray::Array2;

use super::results::PadeResults;
use crate::data::{MeasurementTable, Schema};
use crate::error::{PadeError, Result};
use crate::testing::STAT_SENTINEL;

/// Tab if the header line has one, comma otherwise
fn detect_delimiter(text: &str) -> u8 {
    let header = text
        .lines()
        .find(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .unwrap_or("");
    if header.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

fn reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(text))
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes())
}

/// Read a measurement table.
/// Expected format: first column is feature IDs, header row holds sample IDs
pub fn read_measurement_table<P: AsRef<Path>>(path: P) -> Result<MeasurementTable> {
    let text = std::fs::read_to_string(path)?;
    let mut rdr = reader(&text);

    let header = rdr.headers()?.clone();
    if header.len() < 2 {
        return Err(PadeError::InvalidMeasurementTable {
            reason: "header needs a feature id column and at least one sample".to_string(),
        });
    }
    let sample_ids: Vec<String> = header.iter().skip(1).map(|s| s.to_string()).collect();
    let n_samples = sample_ids.len();

    let mut feature_ids = Vec::new();
    let mut data: Vec<f64> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let id = record.get(0).unwrap_or("").to_string();
        for (j, field) in record.iter().skip(1).enumerate() {
            let value = field.parse::<f64>().map_err(|_| PadeError::InvalidMeasurementTable {
                reason: format!(
                    "feature '{}', sample '{}': '{}' is not a number (missing values are not supported)",
                    id, sample_ids[j], field
                ),
            })?;
            data.push(value);
        }
        feature_ids.push(id);
    }

    if feature_ids.is_empty() {
        return Err(PadeError::EmptyData {
            reason: "no features found in measurement table".to_string(),
        });
    }

    let values = Array2::from_shape_vec((feature_ids.len(), n_samples), data).map_err(|e| {
        PadeError::InvalidMeasurementTable {
            reason: e.to_string(),
        }
    })?;
    log::info!(
        "Read measurement table: {} features x {} samples",
        feature_ids.len(),
        n_samples
    );
    MeasurementTable::new(values, feature_ids, sample_ids)
}

/// Read a schema.
/// Expected format: first column is sample IDs, one column per factor
pub fn read_schema<P: AsRef<Path>>(path: P) -> Result<Schema> {
    let text = std::fs::read_to_string(path)?;
    let mut rdr = reader(&text);

    let header = rdr.headers()?.clone();
    let factor_names: Vec<String> = header.iter().skip(1).map(|s| s.to_string()).collect();
    if factor_names.is_empty() {
        return Err(PadeError::InvalidSchema {
            reason: "header needs a sample id column and at least one factor".to_string(),
        });
    }

    let mut sample_ids = Vec::new();
    let mut columns: Vec<Vec<String>> = vec![Vec::new(); factor_names.len()];
    for record in rdr.records() {
        let record = record?;
        sample_ids.push(record.get(0).unwrap_or("").to_string());
        for (column, field) in columns.iter_mut().zip(record.iter().skip(1)) {
            column.push(field.to_string());
        }
    }

    if sample_ids.is_empty() {
        return Err(PadeError::EmptyData {
            reason: "no samples found in schema".to_string(),
        });
    }

    let mut schema = Schema::new(sample_ids)?;
    for (name, values) in factor_names.iter().zip(columns) {
        schema.add_factor(name, values)?;
    }
    Ok(schema)
}

/// Read replicate sample indexes: one row per replicate, whitespace- or
/// comma-separated source positions
pub fn read_sample_indexes<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<usize>>> {
    let text = std::fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row: Result<Vec<usize>> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .map(|f| {
                f.parse::<usize>().map_err(|_| PadeError::InvalidSampleIndexes {
                    reason: format!("line {}: '{}' is not a sample index", n + 1, f),
                })
            })
            .collect();
        rows.push(row?);
    }
    Ok(rows)
}

fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "NA".to_string()
    } else if v >= STAT_SENTINEL {
        "inf".to_string()
    } else {
        format!("{:.6}", v)
    }
}

/// Write one row per feature as tab-separated text
pub fn write_results<P: AsRef<Path>>(path: P, results: &PadeResults) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;

    let mut header = vec![
        "feature_id".to_string(),
        "ftest".to_string(),
        "pvalue".to_string(),
        "best_stat".to_string(),
    ];
    header.extend(results.tuning_params.iter().map(|a| format!("stat_{}", a)));
    header.push("best_conf".to_string());
    header.extend(results.tuning_params.iter().map(|a| format!("conf_{}", a)));
    header.extend(results.group_names.iter().map(|g| format!("mean ({})", g)));
    header.extend(results.classes.iter().map(|c| format!("coeff_{}", c)));
    header.extend(results.classes.iter().map(|c| format!("fold_{}", c)));
    wtr.write_record(&header)?;

    for (i, id) in results.feature_ids.iter().enumerate() {
        let best = &results.best[i];
        let mut row = vec![
            id.clone(),
            fmt_value(results.ftest[i]),
            format!("{:.6e}", results.ftest_pvalues[i]),
            fmt_value(best.statistic),
        ];
        row.extend(results.statistics.row(i).iter().map(|&v| fmt_value(v)));
        row.push(fmt_value(best.confidence));
        row.extend(results.confidence.feature(i).iter().map(|&v| fmt_value(v)));
        row.extend(results.group_means.row(i).iter().map(|&v| fmt_value(v)));
        row.extend(results.coefficients.row(i).iter().map(|&v| fmt_value(v)));
        row.extend(results.fold_change.row(i).iter().map(|&v| fmt_value(v)));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Serialize the whole results object as JSON
pub fn write_results_json<P: AsRef<Path>>(path: P, results: &PadeResults) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, results)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_measurement_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t1.5\t2\t-0.25").unwrap();
        writeln!(file, "gene2\t0\t7.5\t3").unwrap();

        let table = read_measurement_table(file.path()).unwrap();
        assert_eq!(table.n_features(), 2);
        assert_eq!(table.n_samples(), 3);
        assert_eq!(table.sample_ids(), &["s1", "s2", "s3"]);
        assert_eq!(table.values()[[0, 2]], -0.25);
        assert_eq!(table.feature_index("gene2"), Some(1));
    }

    #[test]
    fn test_comma_delimited_table() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,a,b").unwrap();
        writeln!(file, "f1,1,2").unwrap();
        let table = read_measurement_table(file.path()).unwrap();
        assert_eq!(table.values()[[0, 1]], 2.0);
    }

    #[test]
    fn test_missing_value_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1.0\tNA").unwrap();
        let err = read_measurement_table(file.path()).unwrap_err();
        assert!(matches!(err, PadeError::InvalidMeasurementTable { .. }));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id\ts1\ts2").unwrap();
        writeln!(file, "gene1\t1.0").unwrap();
        assert!(read_measurement_table(file.path()).is_err());
    }

    #[test]
    fn test_read_sample_indexes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1 0 3 2").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "3,2,1,0").unwrap();
        let rows = read_sample_indexes(file.path()).unwrap();
        assert_eq!(rows, vec![vec![1, 0, 3, 2], vec![3, 2, 1, 0]]);

        writeln!(file, "0 x").unwrap();
        assert!(read_sample_indexes(file.path()).is_err());
    }

    #[test]
    fn test_write_results() {
        let samples: Vec<String> = (0..6).map(|j| format!("s{}", j)).collect();
        let table = MeasurementTable::new(
            ndarray::array![
                [1.0, 1.2, 0.9, 5.0, 5.3, 4.8],
                [2.0, 2.0, 2.0, 2.0, 2.0, 2.0],
                [3.0, 2.5, 3.2, 2.9, 3.1, 2.7]
            ],
            vec!["up".to_string(), "flat".to_string(), "noise".to_string()],
            samples.clone(),
        )
        .unwrap();
        let mut schema = Schema::new(samples).unwrap();
        let levels = ["ctl", "ctl", "ctl", "drug", "drug", "drug"];
        schema
            .add_factor("treatment", levels.iter().map(|l| l.to_string()).collect())
            .unwrap();
        let settings = crate::config::Settings {
            tuning_params: vec![0.1, 1.0],
            num_samples: 20,
            num_bins: 5,
            ..Default::default()
        };
        let results = crate::run_pade(&table, &schema, &settings).unwrap();

        let out = NamedTempFile::new().unwrap();
        write_results(out.path(), &results).unwrap();
        let text = std::fs::read_to_string(out.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("feature_id\tftest\tpvalue\tbest_stat\tstat_0.1\tstat_1"));
        assert!(lines[0].ends_with("coeff_drug\tfold_drug"));
        assert!(lines[2].starts_with("flat\t0.000000\t"));

        let json = NamedTempFile::new().unwrap();
        write_results_json(json.path(), &results).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json.path()).unwrap()).unwrap();
        assert_eq!(value["feature_ids"][0], "up");
        assert_eq!(value["classes"][0], "drug");
    }

    #[test]
    fn test_fmt_value() {
        assert_eq!(fmt_value(1.5), "1.500000");
        assert_eq!(fmt_value(f64::NAN), "NA");
        assert_eq!(fmt_value(STAT_SENTINEL), "inf");
        assert_eq!(fmt_value(f64::INFINITY), "inf");
    }

    #[test]
    fn test_json_roundtrip_with_zero_baseline() {
        let samples: Vec<String> = (0..6).map(|j| format!("s{}", j)).collect();
        let table = MeasurementTable::new(
            ndarray::array![
                [-1.0, 0.0, 1.0, 2.0, 3.0, 4.0],
                [1.0, 1.2, 0.9, 5.0, 5.3, 4.8],
                [2.0, 2.0, 2.0, 2.0, 2.0, 2.0],
                [3.0, 2.5, 3.2, 2.9, 3.1, 2.7]
            ],
            (0..4).map(|i| format!("f{}", i)).collect(),
            samples.clone(),
        )
        .unwrap();
        let mut schema = Schema::new(samples).unwrap();
        let levels = ["ctl", "ctl", "ctl", "drug", "drug", "drug"];
        schema
            .add_factor("treatment", levels.iter().map(|l| l.to_string()).collect())
            .unwrap();
        let settings = crate::config::Settings {
            tuning_params: vec![0.1, 1.0],
            num_samples: 20,
            num_bins: 5,
            ..Default::default()
        };
        let results = crate::run_pade(&table, &schema, &settings).unwrap();
        assert!(results.fold_change[[0, 0]].is_nan());

        let out = NamedTempFile::new().unwrap();
        write_results_json(out.path(), &results).unwrap();
        let text = std::fs::read_to_string(out.path()).unwrap();
        let back: PadeResults = serde_json::from_str(&text).unwrap();

        assert_eq!(back.feature_ids, results.feature_ids);
        assert!(back.fold_change[[0, 0]].is_nan());
        assert!((back.fold_change[[1, 0]] - results.fold_change[[1, 0]]).abs() < 1e-12);
        assert_eq!(back.fold_change[[2, 0]], 1.0);
        assert_eq!(back.statistics.dim(), results.statistics.dim());
        for (a, b) in back.statistics.iter().zip(results.statistics.iter()) {
            assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
        }
    }

    #[test]
    fn test_read_schema() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# sample factors").unwrap();
        writeln!(file, "sample\ttreatment\tbatch").unwrap();
        writeln!(file, "s1\tctl\tb1").unwrap();
        writeln!(file, "s2\tdrug\tb1").unwrap();
        writeln!(file, "s3\tctl\tb2").unwrap();
        writeln!(file, "s4\tdrug\tb2").unwrap();

        let schema = read_schema(file.path()).unwrap();
        assert_eq!(schema.n_samples(), 4);
        assert_eq!(schema.factor_names(), vec!["treatment", "batch"]);
        assert_eq!(schema.levels("batch").unwrap(), &["b1", "b2"]);
    }
}
