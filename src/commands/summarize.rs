use crate::error::{Result, ScoreError};
use crate::summary::{summarize, CoalescenceSummary};
use log::info;
use std::path::{Path, PathBuf};

/// Finalization over partial files left behind by earlier scoring runs.
pub fn run_summarize(
    partial_files: &[PathBuf],
    output_file: &Path,
    mismatch_path: Option<&Path>,
    label: &str,
) -> Result<CoalescenceSummary> {
    if partial_files.is_empty() {
        return Err(ScoreError::Format(
            "At least one partial results file is required".to_string(),
        ));
    }
    info!("Summarizing {} partial files", partial_files.len());
    let summary = summarize(partial_files, output_file, mismatch_path, label)?;
    info!(
        "Identical: {}, early: {}, late: {}",
        summary.aggregate.identical, summary.aggregate.early, summary.aggregate.late
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_summarize_multiple_partials() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("unit_0.tsv");
        let second = dir.path().join("unit_1.tsv");
        fs::write(
            &first,
            "coalescence\tA\tchr1\t1\tB\tchr1\t2\tidentical\n\
             mismatch\tA\tchr1\t1\tC\tchr1\t3\tAB\troot\tearly\t(a,b);\t(a,b);\n\
             coalescence\tA\tchr1\t1\tC\tchr1\t3\tearly\n",
        )
        .unwrap();
        fs::write(&second, "coalescence\tB\tchr2\t5\tA\tchr2\t6\tlate\n").unwrap();

        let output = dir.path().join("report.xml");
        let mismatches = dir.path().join("mismatches.tsv");
        let summary = run_summarize(
            &[first, second],
            &output,
            Some(mismatches.as_path()),
            "run.hal",
        )
        .unwrap();

        assert_eq!(summary.aggregate.total(), 3);
        assert_eq!(summary.pair("A", "B").identical, 1);
        assert_eq!(summary.pair("A", "B").late, 1);
        assert_eq!(summary.pair("C", "A").early, 1);
        assert_eq!(summary.genome("A").unwrap().aggregate.total(), 3);
        assert_eq!(
            fs::read_to_string(&mismatches).unwrap(),
            "mismatch\tA\tchr1\t1\tC\tchr1\t3\tAB\troot\tearly\t(a,b);\t(a,b);\n"
        );
        assert!(fs::read_to_string(&output)
            .unwrap()
            .starts_with("<coalescenceTest file=\"run.hal\">"));
    }

    #[test]
    fn test_summarize_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.xml");
        assert!(run_summarize(&[], &output, None, "x").is_err());

        let partial = dir.path().join("bad.tsv");
        fs::write(&partial, "coalescence\tA\tchr1\t1\tB\n").unwrap();
        assert!(matches!(
            run_summarize(&[partial], &output, None, "x"),
            Err(ScoreError::Format(_))
        ));

        let missing = dir.path().join("missing.tsv");
        assert!(matches!(
            run_summarize(&[missing], &output, None, "x"),
            Err(ScoreError::Io(_))
        ));
    }
}
