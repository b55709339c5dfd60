//! StegVault - CLI
//!
//! Command-line interface for vault operations.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use stegvault::{
    DocumentVault, ExtractionRequest, UploadRequest, VaultConfig, VaultError, VaultResult,
};

#[derive(Parser)]
#[command(name = "stegvault")]
#[command(author = "Karen Tonoyan")]
#[command(version = stegvault::VERSION)]
#[command(about = "StegVault - Time-limited documents hidden in cover images")]
struct Cli {
    /// Config file
    #[arg(short, long, default_value = "./stegvault.json")]
    config: PathBuf,

    /// Data directory (overrides config)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to the config file
    Init,

    /// Enroll a reference face and PIN
    Enroll {
        /// Owner ID
        owner: String,

        /// Face image path
        #[arg(short, long)]
        face: PathBuf,

        /// 4-digit PIN
        #[arg(short, long)]
        pin: String,
    },

    /// Upload a document
    Upload {
        /// Owner ID
        owner: String,

        /// Document path
        path: PathBuf,

        /// MIME type (detected from content if omitted)
        #[arg(short, long)]
        mime: Option<String>,

        /// Hours until the document expires
        #[arg(short = 'e', long, default_value_t = 24)]
        hours: i64,
    },

    /// List documents
    List {
        /// Owner ID
        owner: String,
    },

    /// Extract a document
    Extract {
        /// Owner ID
        owner: String,

        /// Document ID
        id: String,

        /// Face image path
        #[arg(short, long)]
        face: PathBuf,

        /// 4-digit PIN
        #[arg(short, long)]
        pin: String,

        /// Output path (defaults to the original filename)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a document
    Delete {
        /// Owner ID
        owner: String,

        /// Document ID
        id: String,
    },

    /// Show recent access log entries
    Logs {
        /// Owner ID
        owner: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> VaultResult<()> {
    let mut config = VaultConfig::load(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    if let Commands::Init = cli.command {
        config.save(&cli.config)?;
        println!("✅ Config written to: {}", cli.config.display());
        println!("   Data directory: {}", config.data_dir.display());
        return Ok(());
    }

    let vault = DocumentVault::open(config)?;

    match cli.command {
        Commands::Init => {}

        Commands::Enroll { owner, face, pin } => {
            println!("🧬 Enrolling biometrics for {}...", owner);
            vault.enroll(&owner, &face_payload(&face)?, &pin).await?;
            println!("✅ Enrolled!");
        }

        Commands::Upload {
            owner,
            path,
            mime,
            hours,
        } => {
            println!("📥 Uploading document: {}", path.display());

            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();

            let request = UploadRequest {
                filename,
                mime_type: mime.unwrap_or_default(),
                data: std::fs::read(&path)?,
                expiry_time: Utc::now() + Duration::hours(hours),
            };

            let summary = vault.upload(&owner, request, None).await?;
            println!("✅ Document stored with ID: {}", summary.id);
            println!("   Expires: {}", summary.expiry_time);
        }

        Commands::List { owner } => {
            let docs = vault.list(&owner).await?;

            if docs.is_empty() {
                println!("📭 No documents in vault");
            } else {
                println!("📄 Documents ({}):", docs.len());
                println!("{:-<60}", "");
                for doc in docs {
                    let expired = if doc.is_expired { "⌛" } else { "  " };
                    println!(
                        "{} {} - {} ({} bytes, {} accesses)",
                        expired, doc.id, doc.original_filename, doc.file_size, doc.access_count
                    );
                }
            }
        }

        Commands::Extract {
            owner,
            id,
            face,
            pin,
            output,
        } => {
            println!("📤 Extracting document: {}", id);

            let request = ExtractionRequest {
                owner_id: owner,
                document_id: id,
                face_image: face_payload(&face)?,
                pin,
                origin: Some("cli".into()),
            };

            match vault.extract(&request).await {
                Ok(delivery) => {
                    let output = output.unwrap_or_else(|| default_output(&delivery.filename));
                    std::fs::write(&output, &delivery.bytes)?;
                    println!("✅ Document written to: {}", output.display());
                    println!("   Type: {}", delivery.mime_type);
                    if let Some(count) = delivery.access_count {
                        println!("   Access count: {}", count);
                    }
                }
                Err(e) => {
                    println!("🚫 {}", serde_json::to_string(&e.to_failure_response())?);
                    return Err(e);
                }
            }
        }

        Commands::Delete { owner, id } => {
            println!("🗑️ Deleting document: {}", id);
            vault.delete(&owner, &id).await?;
            println!("✅ Document deleted!");
        }

        Commands::Logs { owner } => {
            let logs = vault.logs(&owner).await?;

            println!("📜 Access log for {} ({}):", owner, logs.len());
            println!("{:-<60}", "");
            for entry in logs {
                println!(
                    "{} {:<15} {:<8} {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.action.as_str(),
                    entry.status.as_str(),
                    entry.document_id,
                    entry.reason.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

/// Output path derived from a stored filename, confined to the working
/// directory
fn default_output(filename: &str) -> PathBuf {
    Path::new(filename)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("document.bin"))
}

/// Read an image file as a data URL
fn face_payload(path: &Path) -> VaultResult<String> {
    let data = std::fs::read(path)?;
    let format = image::guess_format(&data)
        .map_err(|_| VaultError::InvalidImage(format!("{} is not an image", path.display())))?;

    Ok(format!(
        "data:image/{};base64,{}",
        format.extensions_str().first().copied().unwrap_or("png"),
        STANDARD.encode(&data)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_stays_in_working_dir() {
        assert_eq!(default_output("report.pdf"), PathBuf::from("report.pdf"));
        assert_eq!(default_output("../x"), PathBuf::from("x"));
        assert_eq!(default_output("/etc/passwd"), PathBuf::from("passwd"));
        assert_eq!(default_output("a/b/c.txt"), PathBuf::from("c.txt"));
        assert_eq!(default_output(".."), PathBuf::from("document.bin"));
        assert_eq!(default_output(""), PathBuf::from("document.bin"));
    }
}
