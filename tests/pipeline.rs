use std::fs;
use std::path::Path;

use verification_allocator::diagnostics::RunLog;
use verification_allocator::loader::TableLoader;
use verification_allocator::models::{Config, Table};
use verification_allocator::pipeline::{self, DEBUG_FILE, WARNINGS_FILE};

const RAW_HEADER: &str = "Patient Acct No,Patient Name,Appointment Provider Name,Visit Type,Visit Status,Primary Insurance Name,Appointment Date,Patient DOB";

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path.display().to_string()
}

fn config(dir: &Path, input: String, help: Option<String>, tracker: Option<String>) -> Config {
    Config {
        input_file: input,
        help_file: help,
        escalation_file: tracker,
        output_directory: Some(dir.join("outputs").display().to_string()),
        log_directory: Some(dir.join("logs").display().to_string()),
        ..Config::default()
    }
}

fn load(path: &Path) -> Table {
    TableLoader::new().load_file(path).unwrap()
}

fn column<'a>(table: &'a Table, name: &str) -> Vec<&'a str> {
    let idx = table.find_column(name).unwrap();
    table.rows.iter().map(|r| r[idx].as_str()).collect()
}

const HELP: &str = "\
Provider,State,Visit Type,Workable,Primary Insurance Name
Dr Adams,TX,Lab Only,N,Self Pay
Dr Baker,NM,,,
";

#[test]
fn seventeen_new_patients_fill_eight_balanced_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let mut raw = format!("{}\n", RAW_HEADER);
    for i in 0..17 {
        let provider = if i % 2 == 0 { "Dr Adams" } else { "Dr Baker" };
        raw.push_str(&format!(
            "{},Patient {},{},New Patient,PEN,Aetna,3/{}/2024,1/2/1980\n",
            1000 + i,
            i,
            provider,
            i + 1
        ));
    }
    let input = write(dir.path(), "export.csv", &raw);
    let help = write(dir.path(), "help.csv", HELP);

    let mut log = RunLog::in_memory();
    let summary = pipeline::run_from_files(&config(dir.path(), input, Some(help), None), &mut log).unwrap();
    assert_eq!(summary.processed_count, 17);
    assert_eq!(summary.excluded_count, 0);

    let output = load(&summary.output_path);
    assert_eq!(output.headers[0], "Organization");
    let codes = column(&output, "Allocation Priority");
    let mut sizes = [0usize; 8];
    for code in &codes {
        assert!(code.starts_with("NP") && code.len() == 5, "bad code {}", code);
        let seq: usize = code[2..].parse().unwrap();
        assert!((1..=8).contains(&seq));
        sizes[seq - 1] += 1;
    }
    assert_eq!(sizes, [3, 2, 2, 2, 2, 2, 2, 2]);
    assert_eq!(summary.scopes.len(), 1);
    assert_eq!(summary.scopes[0].bucket_sizes, vec![3, 2, 2, 2, 2, 2, 2, 2]);

    // contiguous clusters, not interleaved
    let mut sorted = codes.clone();
    sorted.sort();
    assert_eq!(codes, sorted);

    assert!(column(&output, "DOB").iter().all(|d| *d == "01/02/1980"));
    // NM (Dr Baker, odd rows) sorts ahead of TX
    assert_eq!(column(&output, "Date of Service")[0], "03/02/2024");
}

#[test]
fn audit_and_debug_artifacts_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let raw = format!(
        "{}\n\
         1001 ,Ann,Dr Adams,Follow Up,PEN,Aetna,3/1/2024,\n\
         1002,Bob,Dr Baker,Follow Up,PR,BCBS WC OF TX,3/2/2024,\n\
         1003,Cy,Dr Baker,Follow Up,CANCELLED,Aetna,3/3/2024,\n\
         1004,Di,Dr Adams,Lab Only,PEN,Aetna,3/4/2024,\n\
         1005,Ed,Dr Baker,Follow Up,PEN,self pay,3/5/2024,\n\
         1006,Fy,Dr Baker,Follow Up,PEN,Aetna,3/6/2024,\n\
         1007,Gus,Dr Adams,New Patient,PEN,Cigna,3/7/2024,\n",
        RAW_HEADER
    );
    let input = write(dir.path(), "export.csv", &raw);
    let help = write(dir.path(), "help.csv", HELP);
    let tracker = write(dir.path(), "tracker.csv", "Acc#,Notes\n1001,escalated\nnan,\n");

    let mut log = RunLog::in_memory();
    let summary = pipeline::run_from_files(
        &config(dir.path(), input, Some(help), Some(tracker)),
        &mut log,
    )
    .unwrap();
    assert_eq!(summary.processed_count, 2);
    assert_eq!(summary.excluded_count, 5);
    assert_eq!(summary.warnings_path, dir.path().join("outputs").join(WARNINGS_FILE));

    let warnings = load(&summary.warnings_path);
    assert_eq!(warnings.headers.last().map(String::as_str), Some("reason"));
    assert_eq!(
        column(&warnings, "reason"),
        vec!["visit_status", "wc_payer", "workable_n", "excluded_insurance", "escalation"]
    );
    assert_eq!(
        column(&warnings, "Patient Acct No"),
        vec!["1003", "1002", "1004", "1005", "1001 "]
    );

    let output = load(&summary.output_path);
    assert_eq!(column(&output, "Patient Account Number"), vec!["1007", "1006"]);
    assert_eq!(column(&output, "Allocation Priority"), vec!["NP001", "FU001"]);
    assert_eq!(column(&output, "Appointment Location"), vec!["TX", "NM"]);

    let debug = load(&dir.path().join("outputs").join(DEBUG_FILE));
    assert_eq!(column(&debug, "Assigned Agent"), vec!["Agent-1", "Agent-2"]);
    assert!(debug.find_column("Allocation Seq").is_some());
}

#[test]
fn missing_tracker_file_does_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let raw = format!("{}\n1001,Ann,Dr Adams,Follow Up,PEN,Aetna,3/1/2024,\n", RAW_HEADER);
    let input = write(dir.path(), "export.csv", &raw);
    let tracker = dir.path().join("nope.csv").display().to_string();

    let mut log = RunLog::in_memory();
    let summary = pipeline::run_from_files(&config(dir.path(), input, None, Some(tracker)), &mut log).unwrap();
    assert_eq!(summary.processed_count, 1);
    assert!(log
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("cannot read tracker")));
}

#[test]
fn spreadsheet_input_aborts_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "export.xlsx", "not really a workbook");

    let mut log = RunLog::in_memory();
    let result = pipeline::run_from_files(&config(dir.path(), input, None, None), &mut log);
    assert!(result.is_err());
    assert!(log.stages().is_empty());
    assert!(!dir.path().join("outputs").exists());
}
