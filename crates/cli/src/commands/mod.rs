//! CLI subcommands

pub mod describe;
pub mod run;

pub use describe::DescribeCommand;
pub use run::{invocation_record, load_json_lines, run_job, write_json_lines, JobReport, RunCommand};
