//! Operator CLI for ordergate.
//!
//! Covers the setup work the HTTP surface deliberately does not expose:
//! migrations, user provisioning, and reference-data seeding (states and
//! payment journals). Connects with the same `OGW_DATABASE_URL` env the
//! daemon uses.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ogw_schemas::JournalKind;
use ogw_store::{pg::NewUser, PgStore};

/// Provinces seeded by `ogw seed states` when no names are given.
const DEFAULT_STATES: &[&str] = &[
    "Aceh",
    "Bali",
    "Banten",
    "Bengkulu",
    "Gorontalo",
    "Jakarta",
    "Jambi",
    "Jawa Barat",
    "Jawa Tengah",
    "Jawa Timur",
    "Kalimantan Barat",
    "Kalimantan Selatan",
    "Kalimantan Tengah",
    "Kalimantan Timur",
    "Kalimantan Utara",
    "Kepulauan Bangka Belitung",
    "Kepulauan Riau",
    "Lampung",
    "Maluku",
    "Maluku Utara",
    "Nusa Tenggara Barat",
    "Nusa Tenggara Timur",
    "Papua",
    "Papua Barat",
    "Riau",
    "Sulawesi Barat",
    "Sulawesi Selatan",
    "Sulawesi Tengah",
    "Sulawesi Tenggara",
    "Sulawesi Utara",
    "Sumatera Barat",
    "Sumatera Selatan",
    "Sumatera Utara",
    "Yogyakarta",
];

#[derive(Parser)]
#[command(name = "ogw")]
#[command(about = "ordergate operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Seed reference data
    Seed {
        #[command(subcommand)]
        cmd: SeedCmd,
    },

    /// User provisioning
    User {
        #[command(subcommand)]
        cmd: UserCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Check connectivity and whether the schema is present
    Status,

    /// Apply SQL migrations
    Migrate,
}

#[derive(Subcommand)]
enum SeedCmd {
    /// Insert states. With no names, seeds the default province list.
    States {
        /// State names to insert instead of the defaults
        names: Vec<String>,
    },

    /// Insert a payment journal for a company
    Journal {
        #[arg(long)]
        company_id: i64,

        /// Journal kind: bank | cash
        #[arg(long, default_value = "bank")]
        kind: String,

        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum UserCmd {
    /// Create a gateway user. The password is hashed before storage.
    Create {
        #[arg(long)]
        login: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        company_id: i64,

        /// Partner row backing this user's contact identity
        #[arg(long)]
        partner_id: i64,

        #[arg(long)]
        company_name: String,

        #[arg(long, default_value = "Indonesia")]
        country: String,

        #[arg(long, default_value = "")]
        contact_address: String,

        #[arg(long, default_value = "en_US")]
        lang: String,

        #[arg(long, default_value = "UTC")]
        tz: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let store = PgStore::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = store.status().await?;
                    println!("db_ok={} has_schema={}", s.ok, s.has_schema);
                }
                DbCmd::Migrate => {
                    store.migrate().await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Seed { cmd } => {
            let store = PgStore::connect_from_env().await?;
            match cmd {
                SeedCmd::States { names } => {
                    let names: Vec<&str> = if names.is_empty() {
                        DEFAULT_STATES.to_vec()
                    } else {
                        names.iter().map(String::as_str).collect()
                    };
                    for name in &names {
                        let id = store.insert_state(name).await?;
                        println!("state id={id} name={name}");
                    }
                    println!("states_seeded={}", names.len());
                }
                SeedCmd::Journal {
                    company_id,
                    kind,
                    name,
                } => {
                    let kind = JournalKind::parse(&kind)?;
                    let id = store.insert_journal(company_id, kind, &name).await?;
                    println!("journal id={id} company_id={company_id} kind={}", kind.as_str());
                }
            }
        }

        Commands::User { cmd } => {
            let store = PgStore::connect_from_env().await?;
            match cmd {
                UserCmd::Create {
                    login,
                    password,
                    company_id,
                    partner_id,
                    company_name,
                    country,
                    contact_address,
                    lang,
                    tz,
                } => {
                    let id = store
                        .insert_user(&NewUser {
                            login: login.clone(),
                            password,
                            company_id,
                            company_ids: vec![company_id],
                            partner_id,
                            company_name,
                            country,
                            contact_address,
                            lang,
                            tz,
                        })
                        .await?;
                    println!("user id={id} login={login}");
                }
            }
        }
    }

    Ok(())
}
