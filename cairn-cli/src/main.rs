use cairn::assets::{Fit, OutputFormat as ImageFormat};
use cairn::schema::parse_schema;
use cairn::{
    ContentStore, ContentWatcher, ListAssetsOptions, ListOptions, RegistrySnapshot, SortDirection,
    TransformOptions, UploadOptions,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;
use std::process;

/// Cairn CLI: read and write a content directory from the command line
#[derive(Parser)]
#[command(name = "cairn", version, about)]
struct Cli {
    /// Path to the content directory (default: current directory)
    #[arg(long, default_value = ".")]
    content_dir: PathBuf,

    /// Schema file to use instead of <content-dir>/schema.yaml
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Get a single entry by ID
    Get {
        /// Collection name
        collection: String,
        /// Entry ID
        id: String,
        /// Reference fields to resolve (repeatable)
        #[arg(long)]
        include: Vec<String>,
    },

    /// List entries in a collection
    List {
        /// Collection name
        collection: String,
        /// Filter as JSON (e.g. --filter '{"status":"published"}')
        #[arg(long)]
        filter: Option<String>,
        /// Sort key, applied in order (e.g. --sort createdAt:desc)
        #[arg(long, value_parser = parse_sort)]
        sort: Vec<(String, SortDirection)>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// Reference fields to resolve (repeatable)
        #[arg(long)]
        include: Vec<String>,
        /// Report how many entries matched before pagination
        #[arg(long)]
        count: bool,
    },

    /// Create or replace an entry
    Set {
        /// Collection name
        collection: String,
        /// Entry ID
        id: String,
        /// Entry data as JSON
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// Read entry data from a JSON or YAML file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Field values (e.g. --field title="Hello"), merged over --data/--file
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete an entry
    Delete {
        /// Collection name
        collection: String,
        /// Entry ID
        id: String,
    },

    /// Read or write global values
    Global {
        #[command(subcommand)]
        command: GlobalCommand,
    },

    /// Manage assets
    Asset {
        #[command(subcommand)]
        command: AssetCommand,
    },

    /// Check all stored entries and globals against the schema
    Validate,

    /// Print content changes until interrupted
    Watch,
}

#[derive(Subcommand)]
enum GlobalCommand {
    /// Print a global value
    Get { name: String },
    /// Validate and store a global value
    Set {
        name: String,
        /// Value as JSON
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// Read the value from a JSON or YAML file
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },
}

#[derive(Subcommand)]
enum AssetCommand {
    /// Store a file in the assets directory
    Upload {
        /// File to upload
        path: PathBuf,
        /// Stored filename (default: the file's own name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Fetch an asset, optionally as a resized or reformatted derivative
    Get {
        filename: String,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Output image format (jpeg, png, webp, gif)
        #[arg(long)]
        format: Option<ImageFormat>,
        #[arg(long)]
        quality: Option<u8>,
        /// cover, contain, fill, inside or outside
        #[arg(long)]
        fit: Option<Fit>,
        /// Write the bytes here; otherwise only metadata is printed
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List assets in filename order
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        start_after: Option<String>,
    },
    /// Delete an asset
    Delete { filename: String },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_sort(s: &str) -> Result<(String, SortDirection), String> {
    let (field, direction) = match s.rsplit_once(':') {
        Some((field, "asc")) => (field, SortDirection::Asc),
        Some((field, "desc")) => (field, SortDirection::Desc),
        Some((_, other)) => return Err(format!("Invalid sort direction '{other}', expected asc or desc")),
        None => (s, SortDirection::Asc),
    };
    if field.is_empty() {
        return Err("Sort field must not be empty".to_string());
    }
    Ok((field.to_string(), direction))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn open_store(cli: &Cli) -> Result<ContentStore, Box<dyn std::error::Error>> {
    let store = ContentStore::open(&cli.content_dir)?;
    if let Some(schema) = &cli.schema {
        log::debug!("Loading schema from {}", schema.display());
        let definition = parse_schema(schema)?;
        store.configure(RegistrySnapshot::from_definition(definition)?);
    }
    Ok(store)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&cli)?;

    match cli.command {
        Command::Get {
            collection,
            id,
            include,
        } => {
            let include: Vec<&str> = include.iter().map(String::as_str).collect();
            let entry = store
                .get_entry(collection.as_str(), &id, &include)?
                .ok_or_else(|| format!("Entry not found: {collection}/{id}"))?;
            print_output(&entry, &cli.format);
        }

        Command::List {
            collection,
            filter,
            sort,
            limit,
            offset,
            include,
            count,
        } => {
            let filters = filter
                .map(|f| serde_json::from_str::<Value>(&f))
                .transpose()
                .map_err(|e| format!("Invalid --filter JSON: {e}"))?;
            let options = ListOptions {
                filters: filters.map(Into::into),
                sort,
                limit,
                offset,
                include,
                include_count: count,
            };
            let list = store.get_entries(collection.as_str(), &options)?;
            print_output(&serde_json::to_value(&list)?, &cli.format);
        }

        Command::Set {
            collection,
            id,
            data,
            file,
            fields,
        } => {
            let data = read_input(data, file, &fields)?;
            let stored = store.set_entry(collection.as_str(), &id, data)?;
            print_output(&serde_json::json!({ "ok": true, "id": id, "data": stored }), &cli.format);
        }

        Command::Delete { collection, id } => {
            let deleted = store.delete_entry(collection.as_str(), &id)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": deleted }), &cli.format);
        }

        Command::Global { command } => match command {
            GlobalCommand::Get { name } => {
                let value = store
                    .get_global_value(name.as_str())?
                    .ok_or_else(|| format!("Global value not found: {name}"))?;
                print_output(&value, &cli.format);
            }
            GlobalCommand::Set {
                name,
                data,
                file,
                fields,
            } => {
                let data = read_input(data, file, &fields)?;
                let stored = store.set_global_value(name.as_str(), data)?;
                print_output(&stored, &cli.format);
            }
        },

        Command::Asset { command } => run_asset(&store, command, &cli.format)?,

        Command::Validate => {
            let report = store.validate_all()?;
            print_output(&report, &cli.format);
        }

        Command::Watch => {
            let watcher = ContentWatcher::start(store.root())?;
            for event in watcher.event_rx.iter() {
                println!("{:?} {:?}", event.kind, event.target);
            }
        }
    }

    Ok(())
}

fn run_asset(
    store: &ContentStore,
    command: AssetCommand,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AssetCommand::Upload {
            path,
            name,
            content_type,
        } => {
            let bytes = std::fs::read(&path)
                .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;
            let filename = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| format!("Cannot derive a filename from '{}'", path.display()))?
                    .to_string(),
            };
            let info = store.upload_asset(
                &bytes,
                &UploadOptions {
                    filename,
                    content_type,
                },
            )?;
            print_output(&serde_json::to_value(&info)?, format);
        }

        AssetCommand::Get {
            filename,
            width,
            height,
            format: image_format,
            quality,
            fit,
            out,
        } => {
            let options = TransformOptions {
                width,
                height,
                format: image_format,
                quality,
                fit,
                ..Default::default()
            };
            let asset = store
                .get_asset(&filename, &options)
                .ok_or_else(|| format!("Asset not found: {filename}"))?;
            if let Some(out) = &out {
                std::fs::write(out, &asset.bytes)?;
            }
            print_output(
                &serde_json::json!({
                    "filename": asset.filename,
                    "size": asset.size,
                    "contentType": asset.content_type,
                    "width": asset.width,
                    "height": asset.height,
                    "out": out,
                }),
                format,
            );
        }

        AssetCommand::List {
            search,
            limit,
            start_after,
        } => {
            let assets = store.list_assets(&ListAssetsOptions {
                search,
                limit,
                start_after,
            })?;
            print_output(&serde_json::to_value(&assets)?, format);
        }

        AssetCommand::Delete { filename } => {
            let deleted = store.delete_asset(&filename)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": deleted }), format);
        }
    }
    Ok(())
}

/// Build a document from `--data`/`--file`, with `--field` values merged on top.
fn read_input(
    data: Option<String>,
    file: Option<PathBuf>,
    fields: &[(String, String)],
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut value = if let Some(data) = data {
        serde_json::from_str(&data).map_err(|e| format!("Invalid --data JSON: {e}"))?
    } else if let Some(path) = file {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read '{}': {e}", path.display()))?;
        // YAML is a superset of JSON
        serde_yaml::from_str(&content)
            .map_err(|e| format!("Invalid document in '{}': {e}", path.display()))?
    } else {
        Value::Object(serde_json::Map::new())
    };

    if !fields.is_empty() {
        let map = value
            .as_object_mut()
            .ok_or("--field can only be combined with an object document")?;
        for (key, val) in fields {
            // Try to parse as JSON value (for numbers, booleans, arrays, objects)
            let json_val = serde_json::from_str(val).unwrap_or(Value::String(val.clone()));
            map.insert(key.clone(), json_val);
        }
    }
    Ok(value)
}

fn print_output(value: &Value, format: &OutputFormat) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map(|s| s + "\n").map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(text) => print!("{text}"),
        Err(e) => {
            eprintln!("ERROR:{e}");
            process::exit(1);
        }
    }
}
