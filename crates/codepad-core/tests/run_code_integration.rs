//! End-to-end runs through the embedded engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use codepad_core::config::ConfigLoader;
use codepad_core::validator::{
    DYNAMIC_CODE_MESSAGE, GLOBAL_ACCESS_MESSAGE, NETWORK_MESSAGE, TEMPLATE_LITERAL_MESSAGE,
};
use codepad_core::{
    CodeRunner, CodeSession, ConsoleLevel, ExecutionRequest, OutputSink,
};

fn runner() -> CodeRunner {
    CodeRunner::embedded()
        .with_timeout(Duration::from_millis(300))
        .with_console_echo(false)
}

#[tokio::test]
async fn console_log_of_an_expression() {
    let result = runner().run_code("console.log(1+1)").await;
    assert_eq!(result.output, "2");
    assert_eq!(result.error, None);
    assert!(result.execution_time.is_some());
}

#[tokio::test]
async fn template_literal_is_rejected_without_running() {
    let result = runner().run_code("`hello`").await;
    assert_eq!(result.error.as_deref(), Some(TEMPLATE_LITERAL_MESSAGE));
    assert_eq!(result.output, "");
    assert_eq!(result.execution_time, None);
}

#[tokio::test]
async fn infinite_loop_times_out() {
    let result = runner().run_code("while(true){}").await;
    assert_eq!(result.error.as_deref(), Some("Execution timed out"));
    assert_eq!(result.output, "");
    assert!(result.execution_time.unwrap() >= 300.0);
}

#[tokio::test]
async fn never_settling_promise_times_out() {
    let result = runner()
        .run_code("console.log('waiting');\nawait new Promise(() => {});")
        .await;
    assert_eq!(result.error.as_deref(), Some("Execution timed out"));
    assert_eq!(result.output, "");
}

#[tokio::test]
async fn thrown_error_message_is_reported() {
    let result = runner().run_code("throw new Error(\"boom\")").await;
    assert_eq!(result.error.as_deref(), Some("boom"));
    assert_eq!(result.output, "");
    assert!(result.execution_time.is_some());
}

#[tokio::test]
async fn dom_access_is_rejected() {
    let result = runner().run_code("document.title = \"x\"").await;
    assert_eq!(result.error.as_deref(), Some(GLOBAL_ACCESS_MESSAGE));
    assert_eq!(result.execution_time, None);
}

#[tokio::test]
async fn every_rule_rejects_before_execution() {
    let runner = runner();
    for (source, message) in [
        ("eval('2')", DYNAMIC_CODE_MESSAGE),
        ("const m = require('os');", DYNAMIC_CODE_MESSAGE),
        ("window.alert(1)", GLOBAL_ACCESS_MESSAGE),
        ("fetch('/questions')", NETWORK_MESSAGE),
    ] {
        let result = runner.run_code(source).await;
        assert_eq!(result.error.as_deref(), Some(message), "{source}");
        assert_eq!(result.execution_time, None, "{source}");
    }
}

#[tokio::test]
async fn multiple_console_calls_join_in_call_order() {
    let source = "console.log('a', 1);\nconsole.warn('b');\nconsole.error({ c: true });\nconsole.info([1, 'two']);";
    let result = runner().run_code(source).await;
    assert_eq!(
        result.output,
        "a 1\nb\n{\n  \"c\": true\n}\n[\n  1,\n  \"two\"\n]"
    );
}

#[tokio::test]
async fn returned_value_is_the_output_without_console_calls() {
    let result = runner()
        .run_code("function add(a, b) { return a + b; }\nreturn { sum: add(2, 3) };")
        .await;
    assert_eq!(result.output, "{\n  \"sum\": 5\n}");
    assert_eq!(result.error, None);
}

#[tokio::test]
async fn console_output_wins_over_returned_value() {
    let result = runner().run_code("console.log('printed');\nreturn 'returned';").await;
    assert_eq!(result.output, "printed");
}

#[tokio::test]
async fn async_code_is_awaited() {
    let source = r#"
const delayed = (value) => new Promise((resolve) => resolve(value));
const values = await Promise.all([delayed(1), delayed(2)]);
console.log(values.join(","));
"#;
    let result = runner().run_code(source).await;
    assert_eq!(result.output, "1,2");
}

#[tokio::test]
async fn concurrent_runs_keep_their_own_output() {
    let runner = Arc::new(runner());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let runner = runner.clone();
            tokio::spawn(async move {
                let source = format!("for (let i = 0; i < 3; i++) console.log({}, i);", i);
                (i, runner.run_code(&source).await)
            })
        })
        .collect();

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert_eq!(result.output, format!("{i} 0\n{i} 1\n{i} 2"));
    }
}

#[derive(Default)]
struct Collector {
    lines: Mutex<Vec<(ConsoleLevel, String)>>,
}

impl OutputSink for Collector {
    fn record(&self, level: ConsoleLevel, line: &str) {
        self.lines.lock().unwrap().push((level, line.to_string()));
    }
}

#[tokio::test]
async fn observer_sees_lines_with_their_levels() {
    let collector = Arc::new(Collector::default());
    let result = runner()
        .run_code_with_observer("console.warn('w');\nconsole.log('l');", collector.clone())
        .await;
    assert_eq!(result.output, "w\nl");
    assert_eq!(
        *collector.lines.lock().unwrap(),
        vec![
            (ConsoleLevel::Warn, "w".to_string()),
            (ConsoleLevel::Log, "l".to_string())
        ]
    );
}

#[tokio::test]
async fn execute_takes_a_request_record() {
    let result = runner()
        .execute(ExecutionRequest::new("return [1, 2].length;"))
        .await;
    assert_eq!(result.output, "2");
}

#[tokio::test]
async fn runner_built_from_yaml_config() {
    let config = ConfigLoader::from_str(
        "runner:\n  timeout_ms: 200\n  max_code_length: 32\nlogging:\n  echo_console: false\n",
    )
    .unwrap();
    let runner = CodeRunner::from_config(&config).unwrap();
    assert_eq!(runner.timeout(), Duration::from_millis(200));

    let result = runner.run_code("console.log('this snippet is far too long to pass')").await;
    assert_eq!(
        result.error.as_deref(),
        Some("Code exceeds the maximum length of 32 bytes")
    );
}

#[tokio::test]
async fn session_reset_restores_initial_code() {
    let session = CodeSession::new(Arc::new(runner()), "console.log('start')");
    let first = session.run().await;
    assert_eq!(first.output, "start");

    session.set_code("throw new Error('broken')").await;
    session.run().await;
    assert_eq!(session.snapshot().await.error.as_deref(), Some("broken"));

    session.reset().await;
    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.code, "console.log('start')");
    assert_eq!(snapshot.output, "");
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.execution_time, None);
    assert!(!snapshot.is_running);
}

#[tokio::test]
async fn timers_behave_like_a_browser_page() {
    let source = "await new Promise(r => setTimeout(r, 10));\nconsole.log('done');";
    let result = runner().run_code(source).await;
    assert_eq!(result.output, "done");
    assert_eq!(result.error, None);

    let result = runner().run_code("await new Promise(r => setTimeout(r, 60000));").await;
    assert_eq!(result.error.as_deref(), Some("Execution timed out"));
}

#[tokio::test]
async fn awkward_objects_are_printed_without_failing_the_run() {
    let source = "const o = { items: [1, undefined] };\no.self = o;\nconsole.log({ at: new Date(0), skip: undefined });\nconsole.log(o);";
    let result = runner().run_code(source).await;
    assert_eq!(result.error, None);
    assert_eq!(
        result.output,
        "{\n  \"at\": \"1970-01-01T00:00:00.000Z\"\n}\n[object Object]"
    );
}
