//! jetsql command-line runner
//!
//! Loads a JSON join job, plans it and prints the joined rows.

mod error;
mod formatter;
mod job;

use std::path::PathBuf;

use clap::Parser;
use jetsql_core::JoinConfig;
use jetsql_proto::QueryId;

use error::CliError;
use formatter::OutputFormat;
use job::JobSpec;

/// jetsql join job runner
#[derive(Parser, Debug)]
#[command(name = "jetsql")]
#[command(version, about = "Run a join job described in JSON")]
pub struct Args {
    /// Path to the job file
    pub job: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Split the source into this many partitions
    #[arg(long, default_value_t = 1)]
    pub partitions: usize,

    /// Worker threads for partitioned execution (defaults to available cores)
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Maximum rows materialized from one right relation
    #[arg(long, conflicts_with = "unlimited_build")]
    pub max_build_rows: Option<usize>,

    /// Remove the build-side row limit
    #[arg(long)]
    pub unlimited_build: bool,

    /// Member id used to issue the query id
    #[arg(long, default_value_t = 0)]
    pub member_id: u64,

    /// Print the plan explanation instead of running the job
    #[arg(long)]
    pub explain: bool,
}

impl Args {
    /// Build a join configuration from the command-line arguments.
    pub fn join_config(&self) -> JoinConfig {
        let mut config = JoinConfig::default();
        if let Some(parallelism) = self.parallelism {
            config = config.with_parallelism(parallelism);
        }
        if let Some(max) = self.max_build_rows {
            config = config.with_max_build_rows(max);
        }
        if self.unlimited_build {
            config = config.unlimited_build();
        }
        config
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jetsql=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    match run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> Result<String, CliError> {
    let job = JobSpec::load(&args.job)?;
    let formatter = formatter::create_formatter(args.format);
    let query_id = QueryId::generate(args.member_id);

    if args.explain {
        return Ok(job.plan(query_id)?.explain()?);
    }

    let output = job.run(&args.join_config(), args.partitions.max(1), query_id)?;
    Ok(match &output.sink {
        Some(target) => formatter.format_insert(target, output.rows.len()),
        None => formatter.format_output(&output),
    })
}
