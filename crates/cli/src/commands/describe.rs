//! Describe command - print the join tree of a job

use clap::Args;
use std::path::PathBuf;

use crate::job::JobSpec;
use crate::CliResult;

/// Print the join tree a job builds, as JSON
#[derive(Args, Debug, Clone)]
pub struct DescribeCommand {
    /// Job description file
    #[arg(long, short, value_name = "FILE")]
    pub job: PathBuf,
}

impl DescribeCommand {
    /// Execute the describe command
    pub fn execute(&self) -> CliResult<()> {
        let job = JobSpec::load(&self.job)?;
        let description = job.join_tree()?.describe();
        println!("{}", serde_json::to_string_pretty(&description)?);
        Ok(())
    }
}
