use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::archive::BuildOptions;
use crate::mail::SmtpConfig;
use crate::server::{DEFAULT_MAX_MAIL_BYTES, DEFAULT_MAX_UPLOAD_BYTES, ServerConfig};
use crate::zip::CompressionMethod;

#[derive(Parser, Debug)]
#[command(name = "archive-api")]
#[command(version)]
#[command(about = "Bundle uploads into ZIP archives and inspect uploaded ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  archive-api serve --listen 127.0.0.1:8080     run the HTTP service\n  \
  archive-api inspect upload.zip --verify       print a JSON summary and check CRCs\n  \
  archive-api build -o out.zip a.png b.xml      bundle local files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service
    Serve(ServeArgs),
    /// Summarize a local ZIP file as JSON
    Inspect(InspectArgs),
    /// Build a ZIP file from local files
    Build(BuildArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Deflate,
    Stored,
}

impl From<Compression> for CompressionMethod {
    fn from(value: Compression) -> Self {
        match value {
            Compression::Deflate => CompressionMethod::Deflate,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Upload cap for archive build and inspection, in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Upload cap for the mail relay, in bytes
    #[arg(long, env = "MAX_MAIL_BYTES", default_value_t = DEFAULT_MAX_MAIL_BYTES)]
    pub max_mail_bytes: usize,

    /// Compression for built archives
    #[arg(long, env = "ARCHIVE_COMPRESSION", value_enum, default_value_t = Compression::Deflate)]
    pub compression: Compression,

    /// SMTP server; the mail relay is disabled when unset
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    pub smtp_password: Option<String>,

    /// Sender address (defaults to the SMTP username)
    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: Option<String>,

    /// Connect without STARTTLS
    #[arg(long, env = "SMTP_INSECURE")]
    pub smtp_insecure: bool,
}

impl ServeArgs {
    pub fn into_config(self) -> Result<ServerConfig> {
        let smtp = match self.smtp_host {
            Some(host) => {
                let from = self
                    .smtp_from
                    .or_else(|| self.smtp_username.clone())
                    .context("SMTP_FROM or SMTP_USERNAME is required when SMTP_HOST is set")?;
                Some(SmtpConfig {
                    host,
                    port: self.smtp_port,
                    username: self.smtp_username,
                    password: self.smtp_password,
                    from,
                    insecure: self.smtp_insecure,
                })
            }
            None => None,
        };

        Ok(ServerConfig {
            listen: self.listen,
            max_upload_bytes: self.max_upload_bytes,
            max_mail_bytes: self.max_mail_bytes,
            build_options: BuildOptions {
                compression: self.compression.into(),
                ..BuildOptions::default()
            },
            smtp,
        })
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// ZIP file to inspect
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Decompress every member and check its CRC-32
    #[arg(long)]
    pub verify: bool,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Output archive path
    #[arg(short = 'o', value_name = "OUT")]
    pub output: PathBuf,

    /// Files to bundle; each is stored under its base name
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long, value_enum, default_value_t = Compression::Deflate)]
    pub compression: Compression,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["archive-api", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config().unwrap();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.max_upload_bytes, 32 * 1024 * 1024);
        assert_eq!(config.max_mail_bytes, 10 * 1024 * 1024);
        assert_eq!(config.build_options.compression, CompressionMethod::Deflate);
    }

    #[test]
    fn smtp_sender_falls_back_to_username() {
        let cli = Cli::try_parse_from([
            "archive-api",
            "serve",
            "--smtp-host",
            "mail.example.com",
            "--smtp-username",
            "robot@example.com",
            "--compression",
            "stored",
        ])
        .unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.into_config().unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.from, "robot@example.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(config.build_options.compression, CompressionMethod::Stored);
    }

    #[test]
    fn build_requires_files() {
        assert!(Cli::try_parse_from(["archive-api", "build", "-o", "out.zip"]).is_err());
    }
}
