use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bqferry::error::{BigQueryError, FerryError};
use bqferry::pipeline::{download_sharded, DEFAULT_DATASET, DEFAULT_LOCATION};
use bqferry::{
    BqClient, Cleanup, Compression, ExtractOptions, FileFormat, Frame, GcsStorage, GcsUri,
    LoadOptions, LoadSchema, MockWarehouse, QueryParams, QueryToGcs, QueryToGcsConfig,
    TableImporter, TableRef, TabularBridge, Warehouse,
};
use object_store::memory::InMemory;

#[derive(Parser)]
#[command(name = "bqferry")]
#[command(about = "Move query results and tables between BigQuery, GCS and CSV files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GCP project ID
    #[arg(short, long, env = "GCP_PROJECT_ID", global = true)]
    project: Option<String>,

    /// Service account key file (defaults to application default credentials)
    #[arg(long, global = true)]
    key_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Record the BigQuery jobs that would run instead of submitting them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL template and export the result to sharded files in GCS
    QueryToGcs {
        /// SQL template with {placeholder} parameters
        sql_file: PathBuf,

        /// Export root, e.g. gs://bucket/exports
        target: String,

        /// Template parameter (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// YAML or JSON file of template parameters (--param wins on conflict)
        #[arg(long)]
        params_file: Option<PathBuf>,

        /// Dataset holding the temporary table
        #[arg(long, default_value = DEFAULT_DATASET)]
        dataset: String,

        /// Location of the dataset and jobs
        #[arg(long, default_value = DEFAULT_LOCATION)]
        location: String,

        /// Leave the temporary table in place after export
        #[arg(long)]
        keep_temp_table: bool,

        /// Export file format
        #[arg(long, value_enum, default_value = "csv")]
        format: FormatArg,

        /// Export compression
        #[arg(long, value_enum, default_value = "none")]
        compression: CompressionArg,
    },

    /// Load files from GCS into a table, replacing its contents
    GcsToBq {
        /// Source URI, wildcards allowed (gs://bucket/path/part_*.csv)
        source: String,

        dataset: String,

        table: String,

        /// "auto" or name:TYPE,name:TYPE,...
        #[arg(long, default_value = "auto", conflicts_with = "schema_file")]
        schema: String,

        /// YAML mapping of column name to type, or a bq JSON schema (.json)
        #[arg(long)]
        schema_file: Option<PathBuf>,

        /// Header rows to skip
        #[arg(long, default_value = "1")]
        skip_leading_rows: u32,

        #[arg(long)]
        location: Option<String>,
    },

    /// Upload a local CSV file into a table, replacing its contents
    Upload {
        csv_file: PathBuf,

        dataset: String,

        table: String,

        /// GCS directory used to stage the file before loading
        #[arg(long, env = "BQFERRY_STAGING_URI")]
        staging: String,

        #[arg(long)]
        location: Option<String>,
    },

    /// Read sharded CSV exports from GCS into one table
    Download {
        /// GCS directory holding the shards
        prefix: String,

        /// Shard name prefix relative to the directory
        file_prefix: String,

        /// Write the combined rows to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rows to print
        #[arg(long, default_value = "10")]
        preview: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Json,
    Avro,
    Parquet,
}

impl From<FormatArg> for FileFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Csv => FileFormat::Csv,
            FormatArg::Json => FileFormat::Json,
            FormatArg::Avro => FileFormat::Avro,
            FormatArg::Parquet => FileFormat::Parquet,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CompressionArg {
    None,
    Gzip,
    Snappy,
    Deflate,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Compression::None,
            CompressionArg::Gzip => Compression::Gzip,
            CompressionArg::Snappy => Compression::Snappy,
            CompressionArg::Deflate => Compression::Deflate,
        }
    }
}

#[derive(Tabled)]
struct PlannedCall {
    #[tabled(rename = "#")]
    step: usize,
    #[tabled(rename = "Call")]
    kind: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

enum Backend {
    Live(BqClient),
    DryRun(MockWarehouse),
}

impl Backend {
    async fn connect(project: &str, key_file: Option<&Path>, dry_run: bool) -> Result<Self, Box<dyn std::error::Error>> {
        if dry_run {
            return Ok(Backend::DryRun(MockWarehouse::new(project)));
        }
        let client = match key_file {
            Some(path) => BqClient::from_service_account_key_file(path, project).await?,
            None => BqClient::new(project).await?,
        };
        Ok(Backend::Live(client))
    }

    fn warehouse(&self) -> &dyn Warehouse {
        match self {
            Backend::Live(client) => client,
            Backend::DryRun(mock) => mock,
        }
    }

    fn print_plan(&self) {
        if let Backend::DryRun(mock) = self {
            let rows: Vec<PlannedCall> = mock
                .calls()
                .iter()
                .enumerate()
                .map(|(i, call)| PlannedCall {
                    step: i + 1,
                    kind: format!("{:?}", call.kind()),
                    detail: call.to_string(),
                })
                .collect();

            println!("\nDry run, nothing was submitted:\n");
            let mut table = Table::new(rows);
            table.with(Style::markdown());
            println!("{}", table);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("bqferry=debug,info")
    } else {
        EnvFilter::new("bqferry=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

fn print_error(err: Box<dyn std::error::Error>) {
    match err.downcast_ref::<FerryError>() {
        Some(FerryError::BigQuery(bq)) => print_bq_error(bq),
        Some(FerryError::TempTableLeaked { table, .. }) => {
            eprintln!("\x1b[33m⚠ {}\x1b[0m", err);
            eprintln!("  Drop it manually: bq rm -f -t {}", table.replacen('.', ":", 1));
        }
        _ => eprintln!("\x1b[31m✗ Error:\x1b[0m {}", err),
    }
}

fn print_bq_error(err: &BigQueryError) {
    eprintln!("\n\x1b[31m✗ BigQuery Error [{}]\x1b[0m", err.error_code());
    eprintln!("  {}", err);
    eprintln!("\n\x1b[33mTry:\x1b[0m");
    for hint in err.hints() {
        eprintln!("  • {}", hint);
    }
    eprintln!();
}

fn require_project(project: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    Ok(project.ok_or("Project ID required (--project or GCP_PROJECT_ID)")?)
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::QueryToGcs {
            sql_file,
            target,
            params,
            params_file,
            dataset,
            location,
            keep_temp_table,
            format,
            compression,
        } => {
            let project = require_project(cli.project)?;
            let target = GcsUri::parse(&target)?;

            let mut query_params = match params_file {
                Some(path) => QueryParams::from_file(path)?,
                None => QueryParams::new(),
            };
            query_params = query_params.merge(QueryParams::from_pairs(&params)?);

            let mut config = QueryToGcsConfig::new(&project)
                .with_dataset(dataset)
                .with_location(location)
                .with_extract(
                    ExtractOptions::default()
                        .with_format(format.into())
                        .with_compression(compression.into()),
                );
            if keep_temp_table {
                config = config.keep_temp_table();
            }

            let backend = Backend::connect(&project, cli.key_file.as_deref(), cli.dry_run).await?;
            let outcome = QueryToGcs::new(backend.warehouse(), config)
                .run(&sql_file, &target, &query_params)
                .await?;

            println!("✓ Exported to {}", outcome.output_uri);
            match outcome.cleanup {
                Cleanup::Deleted => println!("  Dropped temporary table {}", outcome.temp_table),
                Cleanup::AlreadyAbsent => println!("  Temporary table {} was already gone", outcome.temp_table),
                Cleanup::Kept => println!("  Kept temporary table {}", outcome.temp_table),
            }
            backend.print_plan();
        }

        Commands::GcsToBq {
            source,
            dataset,
            table,
            schema,
            schema_file,
            skip_leading_rows,
            location,
        } => {
            let project = require_project(cli.project)?;
            let source = GcsUri::parse(&source)?;
            let destination = TableRef::new(&project, dataset, table);

            let schema = match schema_file {
                Some(path) => LoadSchema::from_file(path)?,
                None => LoadSchema::parse_inline(&schema)?,
            };

            let mut options = LoadOptions::default()
                .with_schema(schema)
                .with_skip_leading_rows(skip_leading_rows);
            if let Some(location) = location {
                options = options.with_location(location);
            }

            let backend = Backend::connect(&project, cli.key_file.as_deref(), cli.dry_run).await?;
            let report = TableImporter::new(backend.warehouse())
                .import_to(std::slice::from_ref(&source), &destination, &options)
                .await?;

            match report.rows {
                Some(rows) => println!("✓ Loaded {} rows into {}", rows, report.destination),
                None => println!("✓ Loaded {}", report.destination),
            }
            backend.print_plan();
        }

        Commands::Upload {
            csv_file,
            dataset,
            table,
            staging,
            location,
        } => {
            let project = require_project(cli.project)?;
            let staging = GcsUri::parse(&staging)?;
            let destination = TableRef::new(&project, dataset, table);
            let frame = Frame::read_csv_path(&csv_file)?;
            info!("Read {} rows from {}", frame.num_rows(), csv_file.display());

            let storage = if cli.dry_run {
                GcsStorage::registered_only().with_bucket(staging.bucket.clone(), Arc::new(InMemory::new()))
            } else {
                GcsStorage::from_env()
            };

            let backend = Backend::connect(&project, cli.key_file.as_deref(), cli.dry_run).await?;
            let mut bridge = TabularBridge::new(backend.warehouse(), &storage);
            if let Some(location) = location {
                bridge = bridge.with_location(location);
            }
            let table = bridge.upload(&frame, &destination, &staging).await?;

            println!("✓ Uploaded {} rows to {}", frame.num_rows(), table);
            backend.print_plan();
        }

        Commands::Download {
            prefix,
            file_prefix,
            output,
            preview,
        } => {
            let prefix = GcsUri::parse(&prefix)?;
            if cli.dry_run {
                println!("Dry run: would read shards under {} starting with '{}'", prefix, file_prefix);
                return Ok(());
            }

            let storage = GcsStorage::from_env();
            let frame = download_sharded(&storage, &prefix, &file_prefix).await?;

            if let Some(path) = output {
                frame.write_csv_path(&path)?;
                println!("✓ Wrote {} rows to {}", frame.num_rows(), path.display());
            }
            print_preview(&frame, preview);
        }
    }

    Ok(())
}

fn print_preview(frame: &Frame, limit: usize) {
    if frame.num_columns() == 0 {
        warn!("Shards have no columns");
        return;
    }

    let mut builder = Builder::default();
    builder.push_record(frame.columns().iter().cloned());
    for row in frame.head(limit).rows() {
        builder.push_record(row.iter().cloned());
    }

    let mut table = builder.build();
    table.with(Style::markdown());
    println!("{}", table);

    if frame.num_rows() > limit {
        println!("... {} more rows", frame.num_rows() - limit);
    }
}
