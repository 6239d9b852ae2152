//! Automation configuration (`launch.toml`).
//!
//! One explicit struct carries every setting the commands need: ticket API
//! access, custom-field UUIDs, the notification address, the job queue, the
//! pipeline table and the request routes. It is loaded and validated once at
//! startup and passed down by reference.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::classifier::RequestRoute;
use crate::core::eligibility::StartPolicy;
use crate::core::types::Action;

pub const CONFIG_ENV: &str = "PIPELINE_LAUNCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "launch.toml";

pub const FIELD_EMAIL_ALERTED: &str = "Email Alerted";
pub const FIELD_RUN_PATH: &str = "Run Path";
pub const FIELD_ARCHIVE_PATH: &str = "Archive Path";
pub const FIELD_BLOCK_AUTO_IMPORT: &str = "Block Auto Import";
pub const FIELD_FASTQ_CHECKED: &str = "FASTQ Checked";
pub const FIELD_PIPELINE_VERSION: &str = "Pipeline Version";
pub const FIELD_DELIVERY_PATH: &str = "Delivery Path";

const REQUIRED_FIELDS: [&str; 4] = [
    FIELD_EMAIL_ALERTED,
    FIELD_RUN_PATH,
    FIELD_ARCHIVE_PATH,
    FIELD_BLOCK_AUTO_IMPORT,
];

/// Default queue line; rendered with minijinja.
pub const DEFAULT_LAUNCH_COMMAND: &str = "{{ script }} {{ request_file }} {{ run_path }} {{ email }} {{ rsync_dir }} > {{ run_path }}/start_pipeline.log 2>&1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AutomationConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub clickup: ClickupConfig,
    /// Custom-field display name -> field UUID.
    pub fields: BTreeMap<String, String>,
    pub notify: NotifyConfig,
    pub queue: QueueConfig,
    pub pipelines: BTreeMap<String, PipelineConfig>,
    /// Ordered; the first route whose key matches a request title wins.
    #[serde(default)]
    pub requests: Vec<RequestRoute>,
    #[serde(default)]
    pub fastq: Option<FastqConfig>,
    /// Helper operators can run by hand when auto import is blocked.
    #[serde(default)]
    pub manual_import_script: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClickupConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Literal API token. Prefer `token_env`.
    #[serde(default)]
    pub token: Option<String>,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Automation user tickets must be assigned to.
    pub user_id: u64,
    /// List scanned by `request-actions`.
    pub request_list_id: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on pages fetched per list query.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl ClickupConfig {
    /// Resolve the API token from the config or the environment.
    pub fn resolve_token(&self) -> Result<String> {
        if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok(token.trim().to_string());
        }
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("no API token: set clickup.token or ${}", self.token_env))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Operator address; used as both sender and recipient.
    pub email: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    #[serde(default = "default_sendmail")]
    pub sendmail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    pub path: PathBuf,
    #[serde(default = "default_queue_retries")]
    pub max_retries: u32,
    #[serde(default = "default_queue_delay_secs")]
    pub retry_delay_secs: u64,
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// List polled by `start-runs` for this pipeline.
    pub list_id: String,
    pub work_dir: PathBuf,
    /// rsync destination of final results (`host:path` or a path).
    pub rsync_dir: String,
    pub acceptable_tickets: Vec<String>,
    #[serde(default)]
    pub siblings_to_start: Vec<String>,
    pub mapping_glob: String,
    #[serde(default)]
    pub sample_key_glob: Option<String>,
    #[serde(default)]
    pub sample_comp_glob: Option<String>,
    pub request_file_glob: String,
    /// Launcher script referenced by the queue line.
    pub launch_script: PathBuf,
    #[serde(default = "default_launch_command")]
    pub launch_command: String,
    #[serde(default)]
    pub manual_pipeline_comment: String,
    /// Generates pipeline input files from the mapping file before launch.
    #[serde(default)]
    pub create_nf_files: Option<PathBuf>,
    #[serde(default)]
    pub import_script: Option<PathBuf>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
}

impl PipelineConfig {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    pub fn start_policy<'a>(&'a self, user_id: u64) -> StartPolicy<'a> {
        StartPolicy {
            user_id,
            list_id: &self.list_id,
            acceptable_tickets: &self.acceptable_tickets,
            siblings_to_start: &self.siblings_to_start,
            manual_pipeline_comment: &self.manual_pipeline_comment,
            work_dir: &self.work_dir,
            rsync_dir: &self.rsync_dir,
            alert_field: FIELD_EMAIL_ALERTED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FastqConfig {
    /// Description line prefixes that carry project ids.
    pub keywords: Vec<String>,
    /// argv; `{{ project_id }}` is substituted.
    pub lims_command: Vec<String>,
    /// argv; `{{ project_id }}` is substituted. Any output means missing permissions.
    pub permissions_command: Vec<String>,
    #[serde(default = "default_script_timeout_secs")]
    pub timeout_secs: u64,
}

impl FastqConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_url() -> String {
    "https://api.clickup.com/api/v2".to_string()
}

fn default_token_env() -> String {
    "CLICKUP_TOKEN".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_page_limit() -> u32 {
    20
}

fn default_subject_prefix() -> String {
    "BIC_PIPELINE_LAUNCH".to_string()
}

fn default_sendmail() -> String {
    "/usr/sbin/sendmail".to_string()
}

fn default_queue_retries() -> u32 {
    4
}

fn default_queue_delay_secs() -> u64 {
    4
}

fn default_launch_command() -> String {
    DEFAULT_LAUNCH_COMMAND.to_string()
}

fn default_script_timeout_secs() -> u64 {
    60 * 60
}

impl AutomationConfig {
    /// UUID of a custom field by display name.
    pub fn field_id(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("no UUID configured for custom field '{name}'"))
    }

    pub fn pipeline(&self, name: &str) -> Result<&PipelineConfig> {
        self.pipelines
            .get(name)
            .ok_or_else(|| anyhow!("pipeline '{name}' is not configured"))
    }

    pub fn validate(&self) -> Result<()> {
        for name in REQUIRED_FIELDS {
            if self.fields.get(name).is_none_or(|id| id.trim().is_empty()) {
                bail!("fields.\"{name}\" must be set to the custom field UUID");
            }
        }
        if self.notify.email.trim().is_empty() {
            bail!("notify.email must be non-empty");
        }
        if self.queue.max_retries == 0 {
            bail!("queue.max_retries must be > 0");
        }
        if self.clickup.page_limit == 0 {
            bail!("clickup.page_limit must be > 0");
        }

        for (name, pipeline) in &self.pipelines {
            if pipeline.acceptable_tickets.is_empty() {
                bail!("pipelines.{name}.acceptable_tickets must list at least one suffix");
            }
            if pipeline.script_timeout_secs == 0 {
                bail!("pipelines.{name}.script_timeout_secs must be > 0");
            }
            let mut env = minijinja::Environment::new();
            env.add_template("launch_command", &pipeline.launch_command)
                .with_context(|| format!("pipelines.{name}.launch_command is not a valid template"))?;
        }

        for route in &self.requests {
            let pipeline = self.pipelines.get(&route.pipeline).ok_or_else(|| {
                anyhow!(
                    "requests entry '{}' references unknown pipeline '{}'",
                    route.key,
                    route.pipeline
                )
            })?;
            for action in &route.actions {
                match action {
                    Action::CheckFastq if self.fastq.is_none() => {
                        bail!("requests entry '{}' uses check_fastq but [fastq] is missing", route.key)
                    }
                    Action::CheckFastq
                        if self
                            .fields
                            .get(FIELD_FASTQ_CHECKED)
                            .is_none_or(|id| id.trim().is_empty()) =>
                    {
                        bail!(
                            "requests entry '{}' uses check_fastq but fields.\"{FIELD_FASTQ_CHECKED}\" is unset",
                            route.key
                        )
                    }
                    Action::ImportProject if pipeline.import_script.is_none() => bail!(
                        "requests entry '{}' uses import_project but pipelines.{}.import_script is unset",
                        route.key,
                        route.pipeline
                    ),
                    Action::TagProject if pipeline.tag.is_none() => bail!(
                        "requests entry '{}' uses tag_project but pipelines.{}.tag is unset",
                        route.key,
                        route.pipeline
                    ),
                    _ => {}
                }
            }
        }

        if let Some(fastq) = &self.fastq {
            if fastq.lims_command.is_empty() || fastq.permissions_command.is_empty() {
                bail!("fastq.lims_command and fastq.permissions_command must be non-empty");
            }
            if fastq.keywords.is_empty() {
                bail!("fastq.keywords must list at least one line prefix");
            }
        }
        Ok(())
    }

    /// Resolve relative script and queue paths against `base`.
    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.queue.path);
        for pipeline in self.pipelines.values_mut() {
            resolve(&mut pipeline.launch_script);
            if let Some(script) = pipeline.create_nf_files.as_mut() {
                resolve(script);
            }
            if let Some(script) = pipeline.import_script.as_mut() {
                resolve(script);
            }
        }
    }
}

/// Config path from the CLI flag, `$PIPELINE_LAUNCH_CONFIG`, or `./launch.toml`.
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_FILE),
    }
}

/// Parse configuration text; relative paths resolve against `base`.
pub fn parse_config(contents: &str, base: &Path) -> Result<AutomationConfig> {
    let mut cfg: AutomationConfig = toml::from_str(contents).context("parse config toml")?;
    cfg.resolve_paths(base);
    cfg.validate()?;
    Ok(cfg)
}

/// Load and validate the configuration file.
pub fn load_config(path: &Path) -> Result<AutomationConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let base = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    parse_config(&contents, base).with_context(|| format!("load {}", path.display()))
}
