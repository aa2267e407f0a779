//! slotdb command-line utility: build heap files from text rows and inspect them.

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use log::info;
use slotdb::access::{Field, FieldType, RecordSchema, TupleRecord};
use slotdb::executor::{AggregateExecutor, AggregateOp, Operator, SeqScanExecutor};
use slotdb::{Database, DatabaseConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// slotdb - slotted-page heap files with a transactional execution core
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Buffer pool capacity in pages
    #[arg(short = 'b', long, global = true, default_value_t = slotdb::config::DEFAULT_BUFFER_POOL_FRAMES)]
    buffer_pool_frames: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode whitespace-separated text rows into a heap file
    Convert {
        /// Text file with one row per line
        #[arg(short, long)]
        input: PathBuf,

        /// Heap file to write; replaced if it exists
        #[arg(short, long)]
        output: PathBuf,

        /// Column types, e.g. int,int,text:8
        #[arg(short, long)]
        types: String,
    },
    /// Print every row of a heap file, optionally aggregated
    Dump {
        /// Heap file to read
        #[arg(short, long)]
        file: PathBuf,

        /// Column types, e.g. int,int,text:8
        #[arg(short, long)]
        types: String,

        /// Aggregate to compute over the rows
        #[arg(short, long)]
        aggregate: Option<AggregateOp>,

        /// Column the aggregate is computed over
        #[arg(long, default_value_t = 0)]
        aggregate_field: usize,

        /// Column to group by
        #[arg(short, long, requires = "aggregate")]
        group_by: Option<usize>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match args.command {
        Command::Convert {
            input,
            output,
            types,
        } => convert(&input, &output, &parse_schema(&types)?, args.buffer_pool_frames),
        Command::Dump {
            file,
            types,
            aggregate,
            aggregate_field,
            group_by,
        } => dump(
            &file,
            parse_schema(&types)?,
            aggregate.map(|op| (op, aggregate_field, group_by)),
            args.buffer_pool_frames,
        ),
    }
}

fn parse_schema(types: &str) -> Result<RecordSchema> {
    let types = types
        .split(',')
        .map(|t| t.parse::<FieldType>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid column types '{}'", types))?;
    if types.is_empty() {
        bail!("At least one column type is required");
    }
    Ok(RecordSchema::from_types(&types))
}

fn parse_row(line: &str, schema: &RecordSchema) -> Result<TupleRecord> {
    let values: Vec<&str> = line.split_whitespace().collect();
    if values.len() != schema.len() {
        bail!("expected {} values, found {}", schema.len(), values.len());
    }
    let fields = values
        .iter()
        .zip(schema.fields())
        .map(|(value, column)| match column.field_type {
            FieldType::Int => value
                .parse::<i32>()
                .map(Field::Int)
                .with_context(|| format!("'{}' is not an int", value)),
            FieldType::Text(_) => Ok(Field::from(*value)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TupleRecord::new(fields))
}

fn open_database(file: &Path, frames: usize) -> Result<Database> {
    let data_dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let config = DatabaseConfig::new(data_dir).with_buffer_pool_frames(frames);
    Database::open(config).context("Failed to open database")
}

fn table_name(file: &Path) -> String {
    file.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string())
}

fn convert(input: &Path, output: &Path, schema: &RecordSchema, frames: usize) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let db = open_database(output, frames)?;
    let table = db
        .catalog()
        .create_table(&table_name(output), schema.clone(), output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let heap = db.table_heap(table.id())?;

    let txn = db.transaction();
    let mut count = 0usize;
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let tuple = parse_row(line, schema).with_context(|| format!("line {}", number + 1))?;
        heap.insert_tuple(txn.id(), &tuple)?;
        count += 1;
    }
    txn.commit()?;
    db.shutdown()?;

    info!(
        "wrote {} rows in {} pages to {}",
        count,
        table.num_pages()?,
        output.display()
    );
    Ok(())
}

fn dump(
    file: &Path,
    schema: RecordSchema,
    aggregate: Option<(AggregateOp, usize, Option<usize>)>,
    frames: usize,
) -> Result<()> {
    let db = open_database(file, frames)?;
    let table_id = db
        .attach_table(&table_name(file), schema, file)
        .with_context(|| format!("Failed to open {}", file.display()))?;

    let txn = db.transaction();
    let scan = Operator::from(SeqScanExecutor::new(txn.context(), table_id, None)?);
    let mut root = match aggregate {
        Some((op, field, group_by)) => Operator::from(AggregateExecutor::new(scan, field, group_by, op)?),
        None => scan,
    };

    let header: Vec<&str> = root
        .output_schema()
        .fields()
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    println!("{}", header.join("\t"));

    root.open()?;
    let mut count = 0usize;
    while root.has_next()? {
        let tuple = root.next()?;
        let values: Vec<String> = tuple.fields().iter().map(|f| f.to_string()).collect();
        println!("{}", values.join("\t"));
        count += 1;
    }
    root.close();
    drop(root);
    txn.commit()?;
    db.shutdown()?;

    info!("{} rows", count);
    Ok(())
}
