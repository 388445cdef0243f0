use bqferry::pipeline::{QueryExecutor, QueryToGcs, QueryToGcsConfig};
use bqferry::schema::{GcsUri, TableRef};
use bqferry::template::{QueryParams, SqlTemplate};
use bqferry::warehouse::{CallKind, MockWarehouse, WarehouseCall};
use bqferry::FerryError;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn sql_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_render_without_placeholders_is_identity() {
    let sql = "SELECT 1 AS one\nFROM `p.d.t`\n";
    let rendered = SqlTemplate::new(sql).render(&QueryParams::new()).unwrap();
    assert_eq!(rendered, sql);
}

#[test]
fn test_render_replaces_each_occurrence() {
    let template = SqlTemplate::new("SELECT '{d}' AS a, '{d}' AS b FROM {t}");
    let params = QueryParams::new().with("d", "2024-01-01").with("t", "p.d.t");
    assert_eq!(
        template.render(&params).unwrap(),
        "SELECT '2024-01-01' AS a, '2024-01-01' AS b FROM p.d.t"
    );
}

#[test]
fn test_render_uses_display_of_values() {
    let template = SqlTemplate::new("LIMIT {n} -- {flag}");
    let params = QueryParams::new().with("n", 100).with("flag", true);
    assert_eq!(template.render(&params).unwrap(), "LIMIT 100 -- true");
}

#[test]
fn test_render_ignores_extra_keys() {
    let template = SqlTemplate::new("SELECT {a}");
    let params = QueryParams::new().with("a", 1).with("unused", 2);
    assert_eq!(template.render(&params).unwrap(), "SELECT 1");
}

#[test]
fn test_escaped_braces_are_literal() {
    let template = SqlTemplate::new("SELECT '{{\"k\": {v}}}'");
    let params = QueryParams::new().with("v", 3);
    assert_eq!(template.render(&params).unwrap(), "SELECT '{\"k\": 3}'");
    assert_eq!(template.placeholders().unwrap(), vec!["v"]);
}

#[test]
fn test_missing_parameter() {
    let template = SqlTemplate::new("SELECT * FROM {table} WHERE d = '{date}'");
    let params = QueryParams::new().with("table", "t");

    match template.render(&params) {
        Err(FerryError::MissingParameter { placeholder, .. }) => assert_eq!(placeholder, "date"),
        other => panic!("expected MissingParameter, got {:?}", other),
    }
}

#[test]
fn test_malformed_template() {
    let err = SqlTemplate::new("SELECT {a").render(&QueryParams::new()).unwrap_err();
    assert!(matches!(err, FerryError::MalformedTemplate { .. }));
    assert!(err.is_template_error());

    let err = SqlTemplate::new("SELECT {}").render(&QueryParams::new()).unwrap_err();
    assert!(matches!(err, FerryError::MalformedTemplate { .. }));
}

#[test]
fn test_template_from_fixture() {
    let template = SqlTemplate::from_file(fixture("queries/daily_users.sql")).unwrap();
    assert_eq!(template.placeholders().unwrap(), vec!["source_table", "run_date"]);
    assert!(template.source().ends_with("daily_users.sql"));

    let params = QueryParams::from_file(fixture("params.yaml")).unwrap();
    let sql = template.render(&params).unwrap();
    assert!(sql.contains("FROM `proj.raw.events`"));
    assert!(sql.contains("= '2024-03-05'"));
}

#[test]
fn test_params_from_json_fixture() {
    let params = QueryParams::from_file(fixture("params.json")).unwrap();
    assert_eq!(params.get("limit"), Some("500"));

    let template = SqlTemplate::from_file(fixture("queries/daily_users.sql")).unwrap();
    let sql = template.render(&params).unwrap();
    assert!(sql.contains("FROM `proj.raw.events`"));
}

#[test]
fn test_missing_template_file() {
    let err = SqlTemplate::from_file("does/not/exist.sql").unwrap_err();
    assert!(matches!(err, FerryError::SqlFileNotFound(_)));
}

#[test]
fn test_params_from_pairs_and_merge() {
    let file_params = QueryParams::parse_mapping("a: 1\nb: x\nc: null").unwrap();
    let cli_params = QueryParams::from_pairs(["b=y", "expr=a=b"]).unwrap();

    let merged = file_params.merge(cli_params);
    assert_eq!(merged.get("a"), Some("1"));
    assert_eq!(merged.get("b"), Some("y"));
    assert_eq!(merged.get("c"), Some("NULL"));
    assert_eq!(merged.get("expr"), Some("a=b"));
    assert_eq!(merged.len(), 4);
}

#[test]
fn test_params_reject_bad_input() {
    assert!(matches!(QueryParams::from_pairs(["novalue"]), Err(FerryError::InvalidParameter(_))));
    assert!(QueryParams::from_pairs(["=v"]).is_err());
    assert!(QueryParams::parse_mapping("a: [1, 2]").is_err());
}

#[tokio::test]
async fn test_executor_missing_parameter_makes_no_calls() {
    let file = sql_file("SELECT * FROM {table}");
    let mock = MockWarehouse::new("proj");

    let result = QueryExecutor::new(&mock)
        .execute(file.path(), &QueryParams::new(), &TableRef::new("proj", "d", "t"))
        .await;

    assert!(matches!(result, Err(FerryError::MissingParameter { .. })));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_executor_missing_file_makes_no_calls() {
    let mock = MockWarehouse::new("proj");

    let result = QueryExecutor::new(&mock)
        .execute("missing.sql", &QueryParams::new(), &TableRef::new("proj", "d", "t"))
        .await;

    assert!(matches!(result, Err(FerryError::SqlFileNotFound(_))));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_executor_submits_rendered_sql() {
    let file = sql_file("SELECT {n} AS n");
    let mock = MockWarehouse::new("proj");
    let destination = TableRef::new("proj", "d", "t");

    QueryExecutor::new(&mock)
        .with_location("EU")
        .execute(file.path(), &QueryParams::new().with("n", 7), &destination)
        .await
        .unwrap();

    assert_eq!(
        mock.calls(),
        vec![WarehouseCall::Query {
            sql: "SELECT 7 AS n".to_string(),
            destination: destination.clone(),
            location: Some("EU".to_string()),
        }]
    );
    assert!(mock.table_exists(&destination));
}

#[tokio::test]
async fn test_pipeline_missing_parameter_makes_no_calls() {
    let mock = MockWarehouse::new("proj");
    let pipeline = QueryToGcs::new(&mock, QueryToGcsConfig::new("proj"));
    let target = GcsUri::parse("gs://bucket/out").unwrap();

    let result = pipeline
        .run(fixture("queries/daily_users.sql"), &target, &QueryParams::new().with("run_date", "2024-01-01"))
        .await;

    assert!(matches!(result, Err(FerryError::MissingParameter { ref placeholder, .. }) if placeholder == "source_table"));
    assert!(!mock.call_kinds().contains(&CallKind::CreateDataset));
    assert!(mock.calls().is_empty());
}
