//! Run command - execute a join job over JSON-lines files
//!
//! Only the root stream is closed after loading. Joined streams stay open, so
//! a drained child stream ends a join through the broker's poll timeout rather
//! than ending the whole mill.

use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use watermill::broker::MemoryBroker;
use watermill::codec::JsonRecord;
use watermill::config::WaterMillConfig;
use watermill::join::Joins;
use watermill::mill::{MillStats, WaterMill};
use watermill::process::{ProcessOutput, Roots};

use crate::job::JobSpec;
use crate::{CliError, CliResult};

/// Run a job and write its results as JSON lines
#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// Job description file
    #[arg(long, short, value_name = "FILE")]
    pub job: PathBuf,

    /// Output file, overriding the job's
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Results and counters of a finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Records published to the job's return stream
    pub records: Vec<Value>,
    /// Mill statistics
    pub stats: MillStats,
}

impl RunCommand {
    /// Execute the run command
    pub async fn execute(&self, config: &WaterMillConfig) -> CliResult<()> {
        let job = JobSpec::load(&self.job)?;
        let start = Instant::now();
        let report = run_job(&job, config).await?;

        let output = self.output.as_ref().or(job.output.as_ref());
        match output {
            Some(path) => write_json_lines(&report.records, BufWriter::new(File::create(path)?))?,
            None => write_json_lines(&report.records, std::io::stdout().lock())?,
        }

        eprintln!(
            "{} {} records from {} root elements in {:.2}s",
            "Done:".green().bold(),
            report.records.len(),
            report.stats.roots_pulled,
            start.elapsed().as_secs_f64()
        );
        if report.stats.roots_skipped > 0 {
            eprintln!(
                "{} {} root elements skipped, a joined stream ran ahead",
                "Warning:".yellow(),
                report.stats.roots_skipped
            );
        }
        if let Some(path) = output {
            eprintln!("  Output: {}", path.display());
        }
        Ok(())
    }
}

/// Load every stream of `job`, run a mill over them and collect its output
pub async fn run_job(job: &JobSpec, config: &WaterMillConfig) -> CliResult<JobReport> {
    let broker = Arc::new(MemoryBroker::new(config.broker.clone()));
    for (stream, path) in &job.streams {
        let count = load_json_lines(&broker, stream, path)?;
        debug!(stream = %stream, count, "stream loaded");
    }
    broker.close(job.root.as_str());

    let mut mill = WaterMill::<JsonRecord, JsonRecord>::builder(broker.clone())
        .join_tree(job.join_tree()?)
        .return_type(job.return_type.as_str())
        .settings(config.mill.clone())
        .process(|roots, joins, _ctx| Ok(ProcessOutput::One(invocation_record(roots, joins))))
        .build()?;

    let stats = mill.run().await?;
    info!(?stats, "job finished");

    Ok(JobReport {
        records: broker.published(job.return_type.as_str()),
        stats,
    })
}

/// Append the JSON lines of `path` to `stream`, returning how many were read
///
/// Blank lines are skipped.
pub fn load_json_lines(broker: &MemoryBroker, stream: &str, path: &Path) -> CliResult<usize> {
    let file = File::open(path)
        .map_err(|_| CliError::NotFound(format!("input file {}", path.display())))?;
    broker.declare(stream);

    let mut count = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let element: Value = serde_json::from_str(&line).map_err(|source| CliError::InvalidInput {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        broker.push(stream, element);
        count += 1;
    }
    Ok(count)
}

/// Write one JSON document per line
pub fn write_json_lines<W: Write>(records: &[Value], mut writer: W) -> CliResult<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Output record of one invocation
///
/// `roots` lists the root elements; `joins` maps every join name to its
/// parents, each with the children attached to it.
pub fn invocation_record(roots: Roots<JsonRecord>, joins: Joins<JsonRecord>) -> JsonRecord {
    let roots: Vec<Value> = roots.into_vec().into_iter().map(|root| root.0).collect();

    let mut joined = serde_json::Map::new();
    for (name, mapping) in joins.iter() {
        let mut groups: Vec<(String, Value)> = mapping
            .iter()
            .map(|(parent, children)| {
                let children: Vec<Value> = children.iter().map(|child| child.0.clone()).collect();
                (
                    parent.0.to_string(),
                    json!({ "parent": parent.0.clone(), "children": children }),
                )
            })
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        joined.insert(
            name.to_string(),
            Value::Array(groups.into_iter().map(|(_, group)| group).collect()),
        );
    }

    JsonRecord(json!({ "roots": roots, "joins": joined }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use watermill::broker::MemoryBrokerConfig;

    fn write_lines(dir: &TempDir, name: &str, lines: &[Value]) -> PathBuf {
        let path = dir.path().join(name);
        let file = File::create(&path).unwrap();
        write_json_lines(lines, BufWriter::new(file)).unwrap();
        path
    }

    fn fast_config() -> WaterMillConfig {
        WaterMillConfig {
            broker: MemoryBrokerConfig { poll_timeout_ms: 10 },
            ..WaterMillConfig::default()
        }
    }

    fn orders_job(dir: &TempDir) -> JobSpec {
        let orders = write_lines(dir, "orders.jsonl", &[json!({"order_id": 1}), json!({"order_id": 2})]);
        let lines = write_lines(
            dir,
            "lines.jsonl",
            &[
                json!({"order_id": 1, "n": 1}),
                json!({"order_id": 1, "n": 2}),
                json!({"order_id": 2, "n": 3}),
            ],
        );

        JobSpec {
            root: "orders".to_string(),
            streams: [("orders".to_string(), orders), ("lines".to_string(), lines)]
                .into_iter()
                .collect(),
            joins: vec![crate::job::JoinSpec {
                name: "lines".to_string(),
                parent: None,
                child: "lines".to_string(),
                left: "/order_id".to_string(),
                right: "/order_id".to_string(),
                time: false,
            }],
            window: None,
            return_type: "out".to_string(),
            output: None,
        }
    }

    #[tokio::test]
    async fn test_run_job_with_join() {
        let dir = TempDir::new().unwrap();
        let job = orders_job(&dir);

        let report = run_job(&job, &fast_config()).await.unwrap();

        assert_eq!(report.stats.roots_pulled, 2);
        assert_eq!(
            report.records,
            vec![
                json!({
                    "roots": [{"order_id": 1}],
                    "joins": {"lines": [{
                        "parent": {"order_id": 1},
                        "children": [{"order_id": 1, "n": 1}, {"order_id": 1, "n": 2}],
                    }]},
                }),
                json!({
                    "roots": [{"order_id": 2}],
                    "joins": {"lines": [{
                        "parent": {"order_id": 2},
                        "children": [{"order_id": 2, "n": 3}],
                    }]},
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_job_with_window() {
        let dir = TempDir::new().unwrap();
        let ticks = write_lines(
            &dir,
            "ticks.jsonl",
            &[json!({"ts": 0}), json!({"ts": 500}), json!({"ts": 1500})],
        );
        let job = JobSpec {
            root: "ticks".to_string(),
            streams: [("ticks".to_string(), ticks)].into_iter().collect(),
            joins: Vec::new(),
            window: Some(crate::job::WindowSpec {
                size_ms: 1000,
                time: "/ts".to_string(),
                offset_ms: 0,
            }),
            return_type: "out".to_string(),
            output: None,
        };

        let report = run_job(&job, &fast_config()).await.unwrap();

        let roots: Vec<&Value> = report.records.iter().map(|record| &record["roots"]).collect();
        assert_eq!(
            roots,
            vec![&json!([{"ts": 0}, {"ts": 500}]), &json!([{"ts": 1500}])]
        );
        assert_eq!(report.stats.windows_flushed, 2);
    }

    #[test]
    fn test_invalid_input_line_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"a\": 1}\n\n{not json}\n").unwrap();

        let broker = MemoryBroker::new(MemoryBrokerConfig::default());
        let err = load_json_lines(&broker, "bad", &path).unwrap_err();

        match err {
            CliError::InvalidInput { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(broker.pending("bad"), 1);
    }

    #[test]
    fn test_missing_input_file() {
        let dir = TempDir::new().unwrap();
        let broker = MemoryBroker::new(MemoryBrokerConfig::default());
        let err = load_json_lines(&broker, "absent", &dir.path().join("absent.jsonl")).unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[test]
    fn test_write_json_lines() {
        let mut buffer = Vec::new();
        write_json_lines(&[json!({"a": 1}), json!([1, 2])], &mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "{\"a\":1}\n[1,2]\n");
    }
}
