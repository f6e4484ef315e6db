use crate::models::UploadOptions;
use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

const ENV_PREFIX: &str = "ATTACHMENT_STORE_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Prefix of the paths handed out for stored files.
    pub base_url: String,
    pub bucket: String,
    pub multiple: bool,
    pub upload_path: String,
    pub allowed_mime_types: Vec<String>,
    pub max_size: Option<u64>,
    pub body_limit: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Record attachment service")]
pub struct Args {
    /// Host to bind to (overrides ATTACHMENT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ATTACHMENT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where stored files live (overrides ATTACHMENT_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ATTACHMENT_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL of file paths (overrides ATTACHMENT_STORE_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bucket new uploads go to (overrides ATTACHMENT_STORE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Records hold an ordered list of files (overrides ATTACHMENT_STORE_MULTIPLE)
    #[arg(long)]
    pub multiple: bool,

    /// Key template, e.g. `{id}/{filename}` (overrides ATTACHMENT_STORE_UPLOAD_PATH)
    #[arg(long)]
    pub upload_path: Option<String>,

    /// Allowed mime types, comma separated (overrides ATTACHMENT_STORE_MIME_TYPES)
    #[arg(long, value_delimiter = ',')]
    pub mime_types: Option<Vec<String>>,

    /// Largest accepted file in bytes (overrides ATTACHMENT_STORE_MAX_SIZE)
    #[arg(long)]
    pub max_size: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        let env_host = env_or("HOST", "0.0.0.0");
        let env_port: u16 = env_parse("PORT")?.unwrap_or(3000);
        let env_storage = env_or("STORAGE_DIR", "./data/files");
        let env_db = env_or("DATABASE_URL", "sqlite://./data/meta/attachments.db");
        let env_multiple: bool = env_parse("MULTIPLE")?.unwrap_or(false);
        let env_mime_types = env::var(format!("{ENV_PREFIX}MIME_TYPES"))
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let port = args.port.unwrap_or(env_port);
        let max_size = match args.max_size {
            Some(size) => Some(size),
            None => env_parse("MAX_SIZE")?,
        };

        let cfg = Self {
            base_url: args
                .base_url
                .unwrap_or_else(|| env_or("BASE_URL", &format!("http://localhost:{port}/files"))),
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bucket: args.bucket.unwrap_or_else(|| env_or("BUCKET", "uploads")),
            multiple: args.multiple || env_multiple,
            upload_path: args
                .upload_path
                .unwrap_or_else(|| env_or("UPLOAD_PATH", "{id}/{filename}")),
            allowed_mime_types: args.mime_types.unwrap_or(env_mime_types),
            max_size,
            body_limit: env_parse("BODY_LIMIT")?.unwrap_or(64 * 1024 * 1024),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upload configuration for the service. Every optional metadata field
    /// is stored under its default name.
    pub fn upload_options(&self) -> Result<UploadOptions> {
        let mut builder = UploadOptions::builder()
            .bucket_property("bucket")
            .size_property("size")
            .mime_type_property("mimeType")
            .filename_property("filename")
            .upload_path(self.upload_path.clone())
            .multiple(self.multiple);
        if !self.allowed_mime_types.is_empty() {
            builder = builder.allowed_mime_types(self.allowed_mime_types.clone());
        }
        if let Some(max) = self.max_size {
            builder = builder.max_size(max);
        }
        builder.build().context("building upload options")
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(format!("{ENV_PREFIX}{name}")).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let var = format!("{ENV_PREFIX}{name}");
    match env::var(&var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", var, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", var)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            storage_dir: "./data".into(),
            database_url: "sqlite::memory:".into(),
            base_url: "http://localhost:8080/files".into(),
            bucket: "uploads".into(),
            multiple: true,
            upload_path: "{id}/{uuid}".into(),
            allowed_mime_types: vec!["image/*".into()],
            max_size: Some(1024),
            body_limit: 1024,
        }
    }

    #[test]
    fn builds_upload_options_from_config() {
        let opts = config().upload_options().unwrap();
        assert!(opts.multiple());
        assert_eq!(opts.upload_path(), "{id}/{uuid}");
        assert_eq!(opts.max_size(), Some(1024));
        assert_eq!(opts.properties().bucket.as_deref(), Some("bucket"));
        assert!(opts.allowed_mime_types().unwrap().contains("image/*"));
    }

    #[test]
    fn invalid_template_is_reported() {
        let mut cfg = config();
        cfg.upload_path = "static".into();
        assert!(cfg.upload_options().is_err());
    }

    #[test]
    fn addr_joins_host_and_port() {
        assert_eq!(config().addr(), "127.0.0.1:8080");
    }
}
