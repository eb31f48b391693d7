//! Integration tests driving the halcoal binary. External tools are replaced
//! by small shell commands working on files in the test directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const SPECIES_TREE: &str = "((A:1,B:1)AB:1,C:2)root;";
const HAL_TREE: &str = "((A.chr1|10,B.chr1|20)AB.anc|5,C.chr1|30)root.anc|1;";
const RECONCILED_TREE: &str = "((A.chr1|10,B.chr1|20)AB,C.chr1|30)root;";

fn get_halcoal_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_halcoal"))
}

fn run_halcoal(work_dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new(get_halcoal_binary())
        .current_dir(work_dir)
        .args(args)
        .output()
}

/// Writes the files the fake tools read from.
fn setup_fake_tools(work_dir: &Path, reconciled: &str) -> std::io::Result<()> {
    fs::write(work_dir.join("species.nwk"), SPECIES_TREE)?;
    fs::write(work_dir.join("sizes.txt"), "chr1\t1000\nchr2\t500\n")?;
    fs::write(
        work_dir.join("column.txt"),
        format!(
            "#{}\n>A.chr1|10\nACGTACGT\n>B.chr1|20\nACGTACGA\n>C.chr1|30\nACCTACGA\n",
            HAL_TREE
        ),
    )?;
    fs::write(work_dir.join("estimate.nwk"), reconciled)?;
    fs::write(work_dir.join("reconciled.nwk"), reconciled)?;
    Ok(())
}

fn score_args<'a>(output: &'a str, aligner: &'a str, extra: &[&'a str]) -> Vec<&'a str> {
    let mut args = vec![
        "score",
        "test.hal",
        "A",
        output,
        "--num-samples",
        "4",
        "--samples-per-job",
        "2",
        "--seed",
        "42",
        "-t",
        "2",
        "--species-tree-command",
        "cat species.nwk",
        "--chrom-sizes-command",
        "cat sizes.txt",
        "--extract-command",
        "cat column.txt",
        "--aligner-command",
        aligner,
        "--estimator-command",
        "cp estimate.nwk OUTPUT",
        "--reconcile-command",
        "cat reconciled.nwk",
    ];
    args.extend_from_slice(extra);
    args
}

#[test]
fn test_score_identical_trees() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    setup_fake_tools(work_dir, RECONCILED_TREE)?;

    let output = run_halcoal(
        work_dir,
        &score_args("report.xml", "cp INPUT OUTPUT", &["--min-sequences", "3"]),
    )?;
    assert!(
        output.status.success(),
        "score failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = fs::read_to_string(work_dir.join("report.xml"))?;
    assert!(report.starts_with("<coalescenceTest file=\"test.hal\">"));
    assert!(report.contains(
        "<aggregateCoalescenceResults identical=\"12\" early=\"0\" late=\"0\" identicalFraction=\"1.000000\" earlyFraction=\"0.000000\" lateFraction=\"0.000000\" />"
    ));
    assert!(report.contains("<coalescenceResults genome1=\"A\" genome2=\"B\" identical=\"4\""));
    assert!(report.contains("<coalescenceResults genome1=\"C\" genome2=\"A\" identical=\"4\""));
    Ok(())
}

#[test]
fn test_score_writes_mismatches() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    // The estimate joins A with C, putting the A-B coalescence at the root
    let reconciled = "((A.chr1|10,C.chr1|30)root,B.chr1|20)root;";
    setup_fake_tools(work_dir, reconciled)?;

    let output = run_halcoal(
        work_dir,
        &score_args(
            "report.xml",
            "cp INPUT OUTPUT",
            &[
                "--min-sequences",
                "3",
                "--write-mismatches-to-file",
                "mismatches.tsv",
            ],
        ),
    )?;
    assert!(
        output.status.success(),
        "score failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = fs::read_to_string(work_dir.join("report.xml"))?;
    assert!(report.contains("<aggregateCoalescenceResults identical=\"8\" early=\"4\" late=\"0\""));
    let mismatches = fs::read_to_string(work_dir.join("mismatches.tsv"))?;
    assert_eq!(mismatches.lines().count(), 4);
    for line in mismatches.lines() {
        assert!(line.starts_with("mismatch\tA\tchr1\t10\tB\tchr1\t20\tAB\troot\tearly\t"));
        assert!(line.ends_with(reconciled));
    }
    Ok(())
}

#[test]
fn test_score_skips_small_columns() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    setup_fake_tools(work_dir, RECONCILED_TREE)?;

    // Three sequences are below the default minimum of four
    let output = run_halcoal(work_dir, &score_args("report.xml", "cp INPUT OUTPUT", &[]))?;
    assert!(output.status.success());
    let report = fs::read_to_string(work_dir.join("report.xml"))?;
    assert!(report.contains("identical=\"0\" early=\"0\" late=\"0\" identicalFraction=\"0.000000\""));
    assert!(!report.contains("genomeCoalescenceTest"));
    Ok(())
}

#[test]
fn test_score_tool_failure() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    setup_fake_tools(work_dir, RECONCILED_TREE)?;

    let mut args = score_args("report.xml", "false", &["--min-sequences", "3"]);
    let output = run_halcoal(work_dir, &args)?;
    assert!(!output.status.success());
    assert!(!work_dir.join("report.xml").exists());

    args.push("--skip-failed-columns");
    let output = run_halcoal(work_dir, &args)?;
    assert!(output.status.success());
    let report = fs::read_to_string(work_dir.join("report.xml"))?;
    assert!(report.contains("<aggregateCoalescenceResults identical=\"0\""));
    Ok(())
}

#[test]
fn test_summarize_partial_files() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    fs::write(
        work_dir.join("unit_0.tsv"),
        "coalescence\tgenome2\tchr1\t1\tgenome10\tchr1\t2\tidentical\n\
         mismatch\tgenome2\tchr1\t1\tgenome2\tchr3\t9\tAnc0\tAnc1\tlate\t(x,y);\t(x,y);\n\
         coalescence\tgenome2\tchr1\t1\tgenome2\tchr3\t9\tlate\n",
    )?;
    fs::write(
        work_dir.join("unit_1.tsv"),
        "coalescence\tgenome10\tchr1\t4\tgenome2\tchr1\t8\tearly\n",
    )?;

    let output = run_halcoal(
        work_dir,
        &[
            "summarize",
            "-o",
            "report.xml",
            "--label",
            "run.hal",
            "--write-mismatches-to-file",
            "mismatches.tsv",
            "unit_0.tsv",
            "unit_1.tsv",
        ],
    )?;
    assert!(
        output.status.success(),
        "summarize failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = fs::read_to_string(work_dir.join("report.xml"))?;
    let lines: Vec<&str> = report.lines().collect();
    assert_eq!(lines[0], "<coalescenceTest file=\"run.hal\">");
    assert!(lines[1].contains("identical=\"1\" early=\"1\" late=\"1\""));
    assert_eq!(lines[2], "  <genomeCoalescenceTest genome=\"genome2\">");
    assert!(lines[3].contains("identical=\"1\" early=\"1\" late=\"1\""));
    assert!(report.contains(
        "<coalescenceResults genome1=\"genome10\" genome2=\"genome2\" identical=\"1\" early=\"1\" late=\"0\""
    ));
    assert_eq!(
        fs::read_to_string(work_dir.join("mismatches.tsv"))?,
        "mismatch\tgenome2\tchr1\t1\tgenome2\tchr3\t9\tAnc0\tAnc1\tlate\t(x,y);\t(x,y);\n"
    );
    Ok(())
}

#[test]
fn test_summarize_rejects_malformed_partial() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    fs::write(work_dir.join("bad.tsv"), "coalescence\tA\tchr1\t1\n")?;
    let output = run_halcoal(work_dir, &["summarize", "-o", "report.xml", "bad.tsv"])?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_compare_prints_records() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    fs::write(work_dir.join("species.nwk"), SPECIES_TREE)?;
    fs::write(work_dir.join("hal.nwk"), HAL_TREE)?;
    fs::write(work_dir.join("reconciled.nwk"), RECONCILED_TREE)?;

    let output = run_halcoal(
        work_dir,
        &[
            "compare",
            "-s",
            "species.nwk",
            "-a",
            "hal.nwk",
            "-r",
            "reconciled.nwk",
            "--required-entry",
            "A.chr1|10",
            "--seed",
            "5",
        ],
    )?;
    assert!(
        output.status.success(),
        "compare failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "coalescence\tA\tchr1\t10\tB\tchr1\t20\tidentical",
            "coalescence\tA\tchr1\t10\tC\tchr1\t30\tidentical",
        ]
    );
    Ok(())
}

#[test]
fn test_compare_missing_leaf_fails() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    fs::write(work_dir.join("species.nwk"), SPECIES_TREE)?;
    fs::write(work_dir.join("hal.nwk"), HAL_TREE)?;
    fs::write(work_dir.join("reconciled.nwk"), "(A.chr1|10,B.chr1|20)AB;")?;

    let output = run_halcoal(
        work_dir,
        &[
            "compare",
            "-s",
            "species.nwk",
            "-a",
            "hal.nwk",
            "-r",
            "reconciled.nwk",
        ],
    )?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("C.chr1|30"));
    Ok(())
}
