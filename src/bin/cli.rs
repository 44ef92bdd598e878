//! Hexad CLI
//!
//! Command-line interface for operating on an embedded Hexad store.

use clap::{Parser, Subcommand};

use hexad::{Config, StorageContext};

/// Hexad CLI
#[derive(Parser, Debug)]
#[command(name = "hexad-cli")]
#[command(about = "CLI for the Hexad multi-model data store")]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./hexad_data")]
    data_dir: String,

    /// Database to operate on
    #[arg(short = 'b', long, default_value = "default")]
    database: String,

    /// Namespace to operate in
    #[arg(short, long, default_value_t = 1)]
    namespace: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a scalar value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a scalar key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key of any shape
    Del {
        /// The key to delete
        key: String,
    },

    /// List keys, optionally filtered by a glob pattern
    Keys {
        /// Glob pattern (* and ?)
        pattern: Option<String>,
    },

    /// Schedule a key to expire
    Expire {
        key: String,

        /// Seconds from now
        seconds: u64,
    },

    /// Remaining seconds before a key expires
    Ttl {
        key: String,
    },

    /// Increment a numeric key by one
    Incr {
        key: String,
    },

    /// Append to a list
    Lpush {
        key: String,
        value: String,
    },

    /// Show a whole list
    Lget {
        key: String,
    },

    /// Store a geo point
    Geoadd {
        key: String,
        latitude: f64,
        longitude: f64,
    },

    /// Distance in kilometers between two stored points
    Geocalc {
        key: String,
        other: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> hexad::Result<()> {
    let config = Config::builder().data_dir(&args.data_dir).build();
    let ctx = StorageContext::open(config)?;
    let session = ctx.session(&args.database, args.namespace)?;

    let outcome = match &args.command {
        Commands::Get { key } => session.get(key)?,
        Commands::Set { key, value } => session.set(key, value)?,
        Commands::Del { key } => session.delete(key)?,
        Commands::Keys { pattern } => session.keys(pattern.as_deref())?,
        Commands::Expire { key, seconds } => session.expire(key, *seconds)?,
        Commands::Ttl { key } => session.ttl(key)?,
        Commands::Incr { key } => session.incr(key)?,
        Commands::Lpush { key, value } => session.list().push(key, value)?,
        Commands::Lget { key } => session.list().all(key)?,
        Commands::Geoadd {
            key,
            latitude,
            longitude,
        } => session.geo_add(key, *latitude, *longitude)?,
        Commands::Geocalc { key, other } => session.geo_calc(key, other)?,
    };

    println!("{}", outcome.access.code());
    if let Some(scalar) = &outcome.scalar {
        println!("{scalar}");
    }
    for item in &outcome.items {
        println!("{item}");
    }
    for (field, value) in &outcome.pairs {
        println!("{field} = {value}");
    }

    ctx.shutdown()
}
