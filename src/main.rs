use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use pagedb::{
    ColumnDef, ColumnStats, DEFAULT_POOL_SIZE, DataType, Database, PredicateOp, TupleDesc, Value,
};

#[derive(Parser)]
#[command(name = "pagedb", version, about = "Paged storage engine with heap and B+Tree tables")]
struct Cli {
    /// Data directory holding the catalog and table files
    #[arg(short, long, default_value = "data")]
    dir: PathBuf,

    /// Number of pages cached in memory
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pool_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a table, e.g. `create users --fields id:int,name:text --key id`
    Create {
        name: String,
        /// Comma separated `name:type` pairs; types are int, double and text
        #[arg(long)]
        fields: String,
        /// INT field to key a B+Tree table on; omit for a heap table
        #[arg(long)]
        key: Option<String>,
    },
    /// Append the rows of a headerless CSV file to a table
    Load {
        table: String,
        file: PathBuf,
        #[arg(long, default_value_t = ',')]
        delimiter: char,
    },
    /// Print the tuples of a table
    Scan {
        table: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List tables
    Tables,
    /// Drop a table and delete its file
    Drop { table: String },
    /// Build a histogram over an INT field and estimate a predicate
    Stats {
        table: String,
        field: String,
        #[arg(long, default_value_t = 10)]
        buckets: usize,
        /// Lower bound of the histogram; defaults to the smallest value
        #[arg(long)]
        min: Option<i32>,
        /// Upper bound of the histogram; defaults to the largest value
        #[arg(long)]
        max: Option<i32>,
        /// Comparison to estimate: =, !=, <, <=, >, >=
        #[arg(long, requires = "value", allow_hyphen_values = true)]
        op: Option<PredicateOp>,
        #[arg(long, allow_hyphen_values = true)]
        value: Option<i32>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut db = Database::open_with_capacity(&cli.dir, cli.pool_size)?;

    match cli.command {
        Command::Create { name, fields, key } => {
            let desc = parse_fields(&fields)?;
            match key {
                Some(key) => {
                    let key_index = desc.index_of(&key)?;
                    db.create_btree_table(&name, desc, key_index)?;
                    eprintln!("Created B+Tree table {} keyed on {}", name, key);
                }
                None => {
                    db.create_heap_table(&name, desc)?;
                    eprintln!("Created heap table {}", name);
                }
            }
        }
        Command::Load {
            table,
            file,
            delimiter,
        } => {
            if !delimiter.is_ascii() {
                return Err(format!("delimiter must be an ASCII character: {:?}", delimiter).into());
            }
            let total = db.load_csv(&table, &file, delimiter as u8)?;
            db.flush()?;
            eprintln!("Loaded {} rows from {} into {}", total, file.display(), table);
        }
        Command::Scan { table, limit } => {
            let desc = db.get(&table)?.tuple_desc().clone();
            let mut output = Table::new();
            output.set_titles(Row::new(
                desc.columns().iter().map(|c| Cell::new(&c.name)).collect(),
            ));

            let mut shown = 0;
            for tuple in db.scan(&table)?.take(limit.unwrap_or(usize::MAX)) {
                let tuple = tuple?;
                output.add_row(Row::new(
                    tuple
                        .fields()
                        .iter()
                        .map(|v| Cell::new(&v.to_string()))
                        .collect(),
                ));
                shown += 1;
            }

            output.printstd();
            eprintln!("{} rows", shown);
        }
        Command::Tables => {
            for name in db.table_names() {
                let metadata = db.catalog().get_table(&name)?;
                let columns: Vec<String> = metadata
                    .columns
                    .iter()
                    .map(|c| format!("{} {}", c.name, c.data_type))
                    .collect();
                println!("{} {:?} ({})", name, metadata.kind, columns.join(", "));
            }
        }
        Command::Drop { table } => {
            db.drop_table(&table)?;
            eprintln!("Dropped table {}", table);
        }
        Command::Stats {
            table,
            field,
            buckets,
            min,
            max,
            op,
            value,
        } => {
            let index = db.get(&table)?.tuple_desc().index_of(&field)?;
            let mut values = Vec::new();
            for tuple in db.scan(&table)? {
                let tuple = tuple?;
                match &tuple.fields()[index] {
                    Value::Int(v) => values.push(*v),
                    other => {
                        return Err(format!("{} is a {} field", field, other.data_type()).into());
                    }
                }
            }

            let lo = min.or_else(|| values.iter().copied().min()).unwrap_or(0);
            let hi = max.or_else(|| values.iter().copied().max()).unwrap_or(0);
            let mut stats = ColumnStats::new(buckets, lo, hi)?;
            for &v in &values {
                stats.add_value(v);
            }

            println!(
                "{}.{}: {} values in [{}, {}], bucket width {}",
                table,
                field,
                stats.total(),
                lo,
                hi,
                stats.bucket_width()
            );
            for (i, count) in stats.bucket_counts().iter().enumerate() {
                let left = i64::from(lo) + i as i64 * stats.bucket_width();
                println!("  bucket {:>3} from {:>11}: {}", i, left, count);
            }

            if let (Some(op), Some(value)) = (op, value) {
                println!(
                    "estimate {} {:?} {}: {}",
                    field,
                    op,
                    value,
                    stats.estimate_cardinality(op, value)
                );
            }
        }
    }

    Ok(())
}

/// Parse `id:int,name:text` into a schema
fn parse_fields(fields: &str) -> Result<TupleDesc, Box<dyn Error>> {
    let columns = fields
        .split(',')
        .map(|part| {
            let (name, ty) = part
                .split_once(':')
                .ok_or_else(|| format!("expected name:type, got {:?}", part))?;
            let data_type = match ty.trim().to_ascii_lowercase().as_str() {
                "int" => DataType::Int,
                "double" => DataType::Double,
                "text" => DataType::Text,
                other => return Err(format!("unknown type {:?}", other)),
            };
            Ok(ColumnDef::new(name.trim(), data_type))
        })
        .collect::<Result<Vec<_>, String>>()?;
    Ok(TupleDesc::new(columns)?)
}
