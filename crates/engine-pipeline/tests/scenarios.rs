//! Workspace-level end-to-end scenarios: a YAML configuration document
//! bound through `engine_adapters::bind_source`/`bind_sink` and driven to
//! completion by `engine_pipeline::run`, rather than exercising one adapter
//! in isolation.

use std::io::BufRead;

use engine_core::RawConfig;
use engine_pipeline::{EngineOpts, Outcome};
use regex::Regex;

fn tmp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("engine-scenario-{}-{name}", uuid::Uuid::new_v4()))
}

async fn run_config(yaml: &str) -> Outcome {
    let config = RawConfig::parse(yaml).unwrap();
    let source = engine_adapters::bind_source(&config).unwrap();
    let warehouse_root = std::env::temp_dir().join(format!("engine-scenario-warehouse-{}", uuid::Uuid::new_v4()));
    let sink = engine_adapters::bind_sink(&config, &warehouse_root).unwrap();
    engine_pipeline::run(source, sink, EngineOpts::default()).await.unwrap()
}

#[tokio::test]
async fn synthetic_to_jsonl_produces_exactly_pagelimit_times_pagesize_lines() {
    let out = tmp_path("scenario1.jsonl");
    let yaml = format!(
        "in:\n\
         \x20 type: random\n\
         \x20 page_limit: 10\n\
         \x20 page_size: 50\n\
         \x20 fields:\n\
         \x20   id:\n\
         \x20     type: uuid\n\
         \x20   name:\n\
         \x20     type: string\n\
         \x20   age:\n\
         \x20     type: int\n\
         \x20     min: 10\n\
         \x20     max: 100\n\
         \x20   created_at:\n\
         \x20     type: unixtime\n\
         out:\n\
         \x20 type: file\n\
         \x20 format: jsonl\n\
         \x20 path: {}\n",
        out.display()
    );

    let outcome = run_config(&yaml).await;
    assert_eq!(outcome, Outcome::Completed);

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 500);

    let uuid_re = Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap();
    for line in &lines {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        let obj = v.as_object().unwrap();
        assert!(uuid_re.is_match(obj["id"].as_str().unwrap()));
        let age = obj["age"].as_i64().unwrap();
        assert!((10..=100).contains(&age), "age {age} out of range");
        assert!(obj["created_at"].is_i64(), "created_at should be an integer, got {:?}", obj["created_at"]);
    }

    std::fs::remove_file(&out).ok();
}

#[tokio::test]
async fn synthetic_to_csv_keeps_declared_key_order() {
    let out = tmp_path("scenario2.csv");
    let yaml = format!(
        "in:\n\
         \x20 type: random\n\
         \x20 page_limit: 1\n\
         \x20 page_size: 3\n\
         \x20 fields:\n\
         \x20   id:\n\
         \x20     type: uuid\n\
         \x20   name:\n\
         \x20     type: string\n\
         \x20   age:\n\
         \x20     type: int\n\
         \x20     min: 10\n\
         \x20     max: 100\n\
         \x20   created_at:\n\
         \x20     type: unixtime\n\
         out:\n\
         \x20 type: file\n\
         \x20 format: csv\n\
         \x20 path: {}\n",
        out.display()
    );

    let outcome = run_config(&yaml).await;
    assert_eq!(outcome, Outcome::Completed);

    let file = std::fs::File::open(&out).unwrap();
    let lines: Vec<String> = std::io::BufReader::new(file).lines().map(|l| l.unwrap()).collect();
    // header row + 3 data rows, each with the four declared fields in order.
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "id,name,age,created_at");
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), 4);
    }

    std::fs::remove_file(&out).ok();
}

#[tokio::test]
async fn rename_relabels_without_changing_values_or_order() {
    let out_renamed = tmp_path("rename-on.jsonl");
    let out_plain = tmp_path("rename-off.jsonl");

    let yaml = |path: &std::path::Path, rename: &str| {
        format!(
            "in:\n\
             \x20 type: random\n\
             \x20 page_limit: 1\n\
             \x20 page_size: 5\n\
             \x20 fields:\n\
             \x20   id:\n\
             \x20     type: uuid\n\
             \x20   name:\n\
             \x20     type: string{rename}\n\
             out:\n\
             \x20 type: file\n\
             \x20 format: jsonl\n\
             \x20 path: {}\n",
            path.display()
        )
    };

    run_config(&yaml(&out_renamed, "\n\x20     rename: user_name")).await;
    run_config(&yaml(&out_plain, "")).await;

    for line in std::fs::read_to_string(&out_renamed).unwrap().lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        let obj = v.as_object().unwrap();
        assert!(obj.contains_key("user_name"), "expected user_name in {obj:?}");
        assert!(!obj.contains_key("name"), "name should have been relabeled away in {obj:?}");
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["id", "user_name"]);
    }
    for line in std::fs::read_to_string(&out_plain).unwrap().lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        let obj = v.as_object().unwrap();
        assert!(obj.contains_key("name"));
        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["id", "name"]);
    }

    std::fs::remove_file(&out_renamed).ok();
    std::fs::remove_file(&out_plain).ok();
}

#[tokio::test]
async fn offset_paged_sql_renames_and_reformats_time() {
    let dsn = seed_sqlite().await;
    let out = tmp_path("scenario3.jsonl");
    let yaml = format!(
        "in:\n\
         \x20 type: sql\n\
         \x20 dsn: {dsn}\n\
         \x20 table: people\n\
         \x20 page_size: 2\n\
         \x20 fields:\n\
         \x20   id:\n\
         \x20     type: int\n\
         \x20   name:\n\
         \x20     type: string\n\
         \x20     rename: user_name\n\
         \x20   birthday:\n\
         \x20     type: time\n\
         \x20     transforms:\n\
         \x20       - type: string\n\
         \x20         format: \"2006-01-02 15:04:05\"\n\
         out:\n\
         \x20 type: file\n\
         \x20 format: jsonl\n\
         \x20 path: {}\n",
        out.display()
    );

    let outcome = run_config(&yaml).await;
    assert_eq!(outcome, Outcome::Completed);

    let birthday_re = Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    let mut saw_any = false;
    for line in text.lines() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        let obj = v.as_object().unwrap();
        assert!(obj.contains_key("user_name"));
        assert!(!obj.contains_key("name"));
        let birthday = obj["birthday"].as_str().unwrap();
        assert!(birthday_re.is_match(birthday), "{birthday} doesn't match expected layout");
        assert!(chrono::NaiveDateTime::parse_from_str(birthday, "%Y-%m-%d %H:%M:%S").is_ok());
        saw_any = true;
    }
    assert!(saw_any);

    std::fs::remove_file(&out).ok();
}

async fn seed_sqlite() -> String {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.db");
    let dsn = format!("sqlite://{}?mode=rwc", path.display());
    let pool = sqlx::sqlite::SqlitePoolOptions::new().connect(&dsn).await.unwrap();
    sqlx::query("CREATE TABLE people (id INTEGER, name TEXT, birthday INTEGER)")
        .execute(&pool)
        .await
        .unwrap();
    for i in 0..5 {
        sqlx::query("INSERT INTO people (id, name, birthday) VALUES (?, ?, ?)")
            .bind(i)
            .bind(format!("person-{i}"))
            .bind(0i64)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
    std::mem::forget(dir);
    dsn
}

#[tokio::test]
async fn csv_source_every_row_miscoerced_exceeds_error_budget() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("bad.csv");
    let mut body = String::from("id\n");
    for _ in 0..100 {
        body.push_str("not-an-int\n");
    }
    std::fs::write(&csv_path, body).unwrap();

    let yaml = format!(
        "in:\n\
         \x20 type: csv\n\
         \x20 path: {}\n\
         \x20 batch_rows: 10\n\
         \x20 fields:\n\
         \x20   id:\n\
         \x20     type: int\n\
         out:\n\
         \x20 type: stdout\n",
        csv_path.display()
    );

    let config = RawConfig::parse(&yaml).unwrap();
    let source = engine_adapters::bind_source(&config).unwrap();
    let warehouse_root = std::env::temp_dir().join(format!("engine-scenario-warehouse-{}", uuid::Uuid::new_v4()));
    let sink = engine_adapters::bind_sink(&config, &warehouse_root).unwrap();
    let opts = EngineOpts { error_budget: 50, error_capacity: 200, ..Default::default() };
    let outcome = engine_pipeline::run(source, sink, opts).await.unwrap();
    assert_eq!(outcome, Outcome::Aborted);
}
