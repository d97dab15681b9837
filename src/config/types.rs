use serde::Deserialize;

/// Main configuration structure for Wiki-Sync
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    pub storage: ObjectStorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Remote page source (wiki REST API) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Base URL of the wiki site, e.g. `https://example.atlassian.net`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Account email; when empty the token is sent as a bearer credential
    #[serde(default)]
    pub email: String,

    /// File holding the API token
    #[serde(rename = "api-token-file", default)]
    pub api_token_file: Option<String>,

    /// Environment variable holding the API token
    #[serde(rename = "api-token-env", default)]
    pub api_token_env: Option<String>,

    /// Resolved API token. Never read from the file itself.
    #[serde(skip)]
    pub api_token: String,

    /// Collection (space) keys to synchronize
    pub collections: Vec<String>,

    /// Number of pages requested per listing call
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Per-request timeout in seconds
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl SourceConfig {
    /// Base URL without trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Durable object storage configuration for relocated attachments
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectStorageConfig {
    /// Destination, e.g. `s3://bucket/attachments/`
    #[serde(rename = "attachments-uri")]
    pub attachments_uri: String,

    /// Local directory backing the filesystem object store
    #[serde(default = "default_object_root")]
    pub root: String,

    #[serde(rename = "storage-class", default)]
    pub storage_class: StorageClass,
}

impl ObjectStorageConfig {
    /// Splits `attachments-uri` into scheme, bucket and key prefix
    pub fn target(&self) -> Option<AttachmentsTarget> {
        AttachmentsTarget::parse(&self.attachments_uri)
    }
}

/// Parsed form of `attachments-uri`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentsTarget {
    pub scheme: String,
    pub bucket: String,
    /// Key prefix, empty or ending with `/`
    pub prefix: String,
}

impl AttachmentsTarget {
    pub fn parse(uri: &str) -> Option<Self> {
        let (scheme, rest) = uri.split_once("://")?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }

        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_start_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() || prefix.split('/').any(|part| part == "..") {
            return None;
        }

        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        Some(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

/// Storage tier requested for uploaded objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageClass {
    Standard,
    #[default]
    InfrequentAccess,
    IntelligentTiering,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::InfrequentAccess => "STANDARD_IA",
            Self::IntelligentTiering => "INTELLIGENT_TIERING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STANDARD" => Some(Self::Standard),
            "STANDARD_IA" => Some(Self::InfrequentAccess),
            "INTELLIGENT_TIERING" => Some(Self::IntelligentTiering),
            _ => None,
        }
    }
}

/// Document store (search index) configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default)]
    pub kind: IndexKind,

    /// Batch upsert endpoint, required when `kind = "http"`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Optional bearer token for the upsert endpoint
    #[serde(rename = "endpoint-token-env", default)]
    pub endpoint_token_env: Option<String>,

    /// SQLite database holding documents, checkpoints and run history
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Prefix of every document identifier (`<prefix>-<page_id>`)
    #[serde(rename = "source-prefix", default = "default_source_prefix")]
    pub source_prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::default(),
            endpoint: None,
            endpoint_token_env: None,
            database_path: default_database_path(),
            source_prefix: default_source_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    #[default]
    Sqlite,
    Http,
}

/// Checkpoint store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointConfig {
    /// Name of the parameter holding the JSON checkpoint map
    #[serde(rename = "parameter-name", default = "default_parameter_name")]
    pub parameter_name: String,

    /// Attempts per checkpoint store operation before giving up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay in milliseconds, doubled per attempt
    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            parameter_name: default_parameter_name(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// Sync behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Maximum redirect hops followed when downloading an attachment
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Largest attachment body accepted, in bytes
    #[serde(rename = "max-attachment-bytes", default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,

    /// Hosts that may receive source credentials on a redirect hop
    #[serde(rename = "trusted-redirect-hosts", default)]
    pub trusted_redirect_hosts: Vec<String>,

    /// Process collections concurrently, one worker each
    #[serde(rename = "parallel-collections", default = "default_true")]
    pub parallel_collections: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_redirects: default_max_redirects(),
            max_attachment_bytes: default_max_attachment_bytes(),
            trusted_redirect_hosts: Vec::new(),
            parallel_collections: true,
        }
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_request_timeout() -> u64 {
    30
}

fn default_object_root() -> String {
    "./objects".to_string()
}

fn default_database_path() -> String {
    "./wiki-sync.db".to_string()
}

fn default_source_prefix() -> String {
    "confluence".to_string()
}

fn default_parameter_name() -> String {
    "wiki-sync/crawl-state".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_redirects() -> u32 {
    5
}

/// Attachment size cap applied when none is configured
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 50 * 1024 * 1024;

fn default_max_attachment_bytes() -> u64 {
    DEFAULT_MAX_ATTACHMENT_BYTES
}

fn default_true() -> bool {
    true
}
