//! Harness behaviour with real child processes (`sh` parsers).

use std::time::{Duration, Instant};

use parsegen::controller::Controller;
use parsegen::core::decision::RunStatus;
use parsegen::core::state::GeneratedCode;
use parsegen::core::verdict::{DefectKind, Verdict};
use parsegen::harness::{Harness, ParserHarness};
use parsegen::io::document::DocumentExtractor;
use parsegen::io::loader::ProcessLoader;
use parsegen::io::prompt::PromptBuilder;
use parsegen::prepare::ContextPreparer;
use parsegen::test_support::{
    SAMPLE_REFERENCE_CSV, SAMPLE_TABLE_JSON, ScriptedGenerator, Workspace, printing_script,
};

const TARGET: &str = "icici";

fn workspace() -> Workspace {
    Workspace::new().with_target(TARGET, "statement text", SAMPLE_REFERENCE_CSV)
}

fn harness(ws: &Workspace) -> ParserHarness<ProcessLoader> {
    ParserHarness::new(ProcessLoader::from_config(&ws.config, ws.root()))
}

fn code(source: &str) -> GeneratedCode {
    GeneratedCode {
        source: source.to_string(),
        prompt: String::new(),
        diagnostic: None,
    }
}

fn judge(ws: &Workspace, source: &str) -> Verdict {
    harness(ws)
        .execute_and_test(&code(source), &ws.run_context(TARGET))
        .expect("harness")
}

fn description(verdict: &Verdict) -> String {
    verdict.description().unwrap_or_default().to_string()
}

#[test]
fn matching_output_succeeds() {
    let ws = workspace();
    assert_eq!(judge(&ws, &printing_script(SAMPLE_TABLE_JSON)), Verdict::Success);
}

#[test]
fn string_and_numeric_representations_compare_equal() {
    let ws = workspace();
    let stringly = r#"{"columns":["Date","Description","Amount"],"rows":[["01-08-2024","Salary Credit XYZ Pvt Ltd","1935.30"],["02-08-2024","Card Swipe Grocery","-1652.61"],["03-08-2024","UPI Transfer","-250.0"],["04-08-2024","Interest Credit",12.05],["05-08-2024","ATM Withdrawal",-2000]]}"#;
    assert_eq!(judge(&ws, &printing_script(stringly)), Verdict::Success);
}

#[test]
fn missing_column_is_a_schema_mismatch() {
    let ws = workspace();
    let output = r#"{"columns":["Date","Description"],"rows":[["01-08-2024","Salary"]]}"#;
    let verdict = judge(&ws, &printing_script(output));

    assert_eq!(verdict.kind(), Some(DefectKind::Schema));
    let text = description(&verdict);
    assert!(text.contains("expected set: {Date, Description, Amount}"));
    assert!(text.contains("actual set:   {Date, Description}"));
    assert!(text.contains("missing: {Amount}"));
}

#[test]
fn raising_parser_reports_fault_and_trace() {
    let ws = workspace();
    let script = "echo 'Traceback (most recent call last):' >&2\n\
                  echo 'ValueError: could not convert string to float' >&2\n\
                  exit 1\n";
    let verdict = judge(&ws, script);

    assert_eq!(verdict.kind(), Some(DefectKind::Runtime));
    let text = description(&verdict);
    assert!(text.contains("parser exited with"));
    assert!(text.contains("ValueError: could not convert string to float"));
}

#[test]
fn silent_parser_has_no_entry_point() {
    let ws = workspace();
    let verdict = judge(&ws, "true\n");
    assert_eq!(verdict.kind(), Some(DefectKind::EntryPoint));
    assert!(description(&verdict).contains("printed no table"));
}

#[test]
fn non_json_output_is_malformed() {
    let ws = workspace();
    let verdict = judge(&ws, "echo 'Date,Description,Amount'\n");
    assert_eq!(verdict.kind(), Some(DefectKind::EntryPoint));
    assert!(description(&verdict).contains("not JSON"));
}

#[test]
fn hung_parser_is_killed() {
    let mut ws = workspace();
    ws.config.attempt_timeout_secs = 1;
    let verdict = judge(&ws, "exec sleep 10\n");

    assert_eq!(verdict.kind(), Some(DefectKind::Runtime));
    assert!(description(&verdict).contains("timed out after 1s"));
}

#[test]
fn parser_waiting_on_a_subprocess_is_killed_on_time() {
    let mut ws = workspace();
    ws.config.attempt_timeout_secs = 1;
    let started = Instant::now();
    let verdict = judge(&ws, "sleep 8\necho done\n");

    assert_eq!(verdict.kind(), Some(DefectKind::Runtime));
    assert!(description(&verdict).contains("timed out after 1s"));
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
}

#[test]
fn reordered_rows_are_a_value_mismatch() {
    let ws = workspace();
    let swapped = SAMPLE_TABLE_JSON.replacen(
        r#"["01-08-2024","Salary Credit XYZ Pvt Ltd",1935.3],["02-08-2024","Card Swipe Grocery",-1652.61]"#,
        r#"["02-08-2024","Card Swipe Grocery",-1652.61],["01-08-2024","Salary Credit XYZ Pvt Ltd",1935.3]"#,
        1,
    );
    let verdict = judge(&ws, &printing_script(&swapped));

    assert_eq!(verdict.kind(), Some(DefectKind::Values));
    let text = description(&verdict);
    assert!(text.contains("first mismatch at row 1, column \"Date\""));
    assert!(text.contains("6 of 15 cells differ"));
}

#[test]
fn identical_inputs_yield_identical_verdicts() {
    let ws = workspace();
    let output = r#"{"columns":["Date","Description","Amount"],"rows":[["01-08-2024","Salary",1]]}"#;
    let first = judge(&ws, &printing_script(output));
    let second = judge(&ws, &printing_script(output));
    assert_eq!(first.kind(), Some(DefectKind::Shape));
    assert_eq!(first, second);
}

#[test]
fn agent_repairs_a_failing_parser() {
    let ws = workspace();
    let broken = "```sh\necho 'KeyError: Amount' >&2\nexit 1\n```";
    let fixed = format!("```sh\n{}```", printing_script(SAMPLE_TABLE_JSON));
    let controller = Controller::new(
        ContextPreparer::new(DocumentExtractor::from_config(&ws.config, ws.root())),
        ScriptedGenerator::new(vec![
            Ok("1. print the table".to_string()),
            Ok(broken.to_string()),
            Ok(fixed),
        ]),
        harness(&ws),
        PromptBuilder::from_config(&ws.config),
        "#",
    );

    let outcome = controller
        .run(ws.run_context(TARGET), 3, |_| {})
        .expect("run");

    assert_eq!(outcome.status, RunStatus::Succeeded);
    assert_eq!(outcome.attempts_left, 1);
    assert_eq!(outcome.error_history.len(), 1);
    assert!(outcome.error_history[0].contains("KeyError: Amount"));
    assert!(controller.generator().prompts()[2].contains("KeyError: Amount"));
    let artifact = std::fs::read_to_string(ws.artifact(TARGET)).expect("artifact");
    assert!(artifact.contains("PARSEGEN_EOF"));
}
