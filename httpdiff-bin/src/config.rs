use crate::request::Method;
use crate::timing::parse_duration;
use http::Uri;
use httpdiff_client::ClientConfig;
use serde::{Deserialize, Deserializer};
use slog::Level;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(2);

/// Accept either `"a,b"` or `["a", "b"]`, trimming entries and dropping empty ones.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    let raw = match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => s.split(',').map(String::from).collect(),
        StringOrVec::Vec(v) => v,
    };
    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct AppFileConfig {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogFileConfig {
    pub level: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HttpFileConfig {
    pub timeout: Option<String>,
    pub connect_timeout: Option<String>,
    pub max_idle_per_host: Option<usize>,
    pub max_response_body: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DiffFileConfig {
    pub name: Option<String>,
    pub concurrency: Option<i64>,
    pub wait_time: Option<String>,
    pub warm_up: Option<String>,
    pub queue_capacity: Option<usize>,
    pub work_dir: Option<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub payload: Vec<String>,
    pub url_a: Option<String>,
    pub url_b: Option<String>,
    pub method: Option<String>,
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub ignore_fields: Vec<String>,
    pub output_show_no_diff_line: Option<bool>,
    pub log_statistics: Option<bool>,
    #[serde(default, deserialize_with = "comma_list")]
    pub success_conditions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub app: Option<AppFileConfig>,
    pub log: Option<LogFileConfig>,
    pub http: Option<HttpFileConfig>,
    #[serde(default)]
    pub diff_configs: Vec<DiffFileConfig>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub log: LogConfig,
    pub http: ClientConfig,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub level: Option<Level>,
    pub path: Option<PathBuf>,
}

/// Everything one comparison task needs, validated and immutable for the run.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub name: String,
    pub work_dir: PathBuf,
    /// File names relative to `work_dir`, read in this order
    pub payload_files: Vec<String>,
    /// Pause before each payload is sent
    pub wait_time: Duration,
    /// Pause between starting the reader and starting the workers
    pub warm_up: Duration,
    pub queue_capacity: usize,
    pub concurrency: usize,
    pub url_a: String,
    pub url_b: String,
    pub method: Method,
    pub content_type: String,
    pub ignore_fields: Vec<String>,
    pub output_show_no_diff_line: bool,
    pub log_statistics: bool,
    pub success_conditions: Vec<String>,
}

impl TaskConfig {
    /// A config with every optional knob at its default.
    pub fn new<S: Into<String>>(
        name: S,
        work_dir: PathBuf,
        payload_files: Vec<String>,
        url_a: S,
        url_b: S,
        method: Method,
    ) -> TaskConfig {
        TaskConfig {
            name: name.into(),
            work_dir,
            payload_files,
            wait_time: Duration::from_secs(0),
            warm_up: DEFAULT_WARM_UP,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            concurrency: 1,
            url_a: url_a.into(),
            url_b: url_b.into(),
            method,
            content_type: String::new(),
            ignore_fields: Vec::new(),
            output_show_no_diff_line: false,
            log_statistics: false,
            success_conditions: Vec::new(),
        }
    }

    pub fn payload_paths(&self) -> Vec<PathBuf> {
        self.payload_files
            .iter()
            .map(|f| self.work_dir.join(f))
            .collect()
    }

    pub fn output_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}_output.txt", self.name))
    }

    pub fn failure_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}_failed_payload.txt", self.name))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("diff_configs cannot be empty")]
    NoTasks,
    #[error("diff config name cannot be empty, index: [{0}]")]
    MissingName(usize),
    #[error("diff config name is duplicated: {name}, first defined at index [{first}], current index [{index}]")]
    DuplicateName {
        name: String,
        first: usize,
        index: usize,
    },
    #[error("diff config {task}: {field} cannot be empty")]
    MissingField { task: String, field: &'static str },
    #[error("diff config {task}: unsupported method {method}")]
    UnsupportedMethod { task: String, method: String },
    #[error("diff config {task}: invalid {field} '{url}'")]
    InvalidUrl {
        task: String,
        field: &'static str,
        url: String,
    },
    #[error("invalid duration for {field}: {message}")]
    InvalidDuration { field: String, message: String },
    #[error("invalid log level '{0}'")]
    InvalidLevel(String),
}

fn duration(field: &str, value: Option<&String>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|v| {
            parse_duration(v).map_err(|message| ConfigError::InvalidDuration {
                field: field.to_string(),
                message,
            })
        })
        .transpose()
}

pub fn parse_level(s: &str) -> Result<Level, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::Trace),
        "debug" => Ok(Level::Debug),
        "info" => Ok(Level::Info),
        "warn" | "warning" => Ok(Level::Warning),
        "error" => Ok(Level::Error),
        "critical" => Ok(Level::Critical),
        _ => Err(ConfigError::InvalidLevel(s.to_string())),
    }
}

fn required(task: &str, field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingField {
            task: task.to_string(),
            field,
        }),
    }
}

fn endpoint(task: &str, field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    let url = required(task, field, value)?;
    let valid = url
        .parse::<Uri>()
        .map(|u| u.host().is_some() && matches!(u.scheme_str(), Some("http") | Some("https")))
        .unwrap_or(false);
    if !valid {
        return Err(ConfigError::InvalidUrl {
            task: task.to_string(),
            field,
            url,
        });
    }
    Ok(url)
}

impl Config {
    fn resolve_task(
        fc: DiffFileConfig,
        name: String,
        base: &Path,
    ) -> Result<TaskConfig, ConfigError> {
        let work_dir = PathBuf::from(required(&name, "work_dir", fc.work_dir)?);
        if fc.payload.is_empty() {
            return Err(ConfigError::MissingField {
                task: name,
                field: "payload",
            });
        }
        let url_a = endpoint(&name, "url_a", fc.url_a)?;
        let url_b = endpoint(&name, "url_b", fc.url_b)?;
        let method_str = required(&name, "method", fc.method)?;
        let method = method_str
            .parse::<Method>()
            .map_err(|_| ConfigError::UnsupportedMethod {
                task: name.clone(),
                method: method_str,
            })?;
        let wait_time = duration(&format!("{}.wait_time", name), fc.wait_time.as_ref())?;
        let warm_up = duration(&format!("{}.warm_up", name), fc.warm_up.as_ref())?;
        Ok(TaskConfig {
            work_dir: base.join(work_dir),
            payload_files: fc.payload,
            wait_time: wait_time.unwrap_or_default(),
            warm_up: warm_up.unwrap_or(DEFAULT_WARM_UP),
            queue_capacity: fc.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY).max(1),
            concurrency: fc.concurrency.filter(|c| *c > 0).unwrap_or(1) as usize,
            url_a,
            url_b,
            method,
            content_type: fc.content_type.unwrap_or_default(),
            ignore_fields: fc.ignore_fields,
            output_show_no_diff_line: fc.output_show_no_diff_line.unwrap_or(false),
            log_statistics: fc.log_statistics.unwrap_or(false),
            success_conditions: fc.success_conditions,
            name,
        })
    }

    fn fill_defaults(unresolved: FileConfig, base: &Path) -> Result<Config, ConfigError> {
        if unresolved.diff_configs.is_empty() {
            return Err(ConfigError::NoTasks);
        }

        let app_name = unresolved
            .app
            .and_then(|a| a.name)
            .unwrap_or_else(|| "http-diff".into());

        let log_file = unresolved.log.unwrap_or_default();
        let log = LogConfig {
            level: log_file.level.as_deref().map(parse_level).transpose()?,
            path: log_file.path.map(|p| base.join(p)),
        };

        let http_file = unresolved.http.unwrap_or_default();
        let defaults = ClientConfig::default();
        let http = ClientConfig {
            timeout: duration("http.timeout", http_file.timeout.as_ref())?.or(defaults.timeout),
            connect_timeout: duration("http.connect_timeout", http_file.connect_timeout.as_ref())?
                .or(defaults.connect_timeout),
            max_idle_per_host: http_file
                .max_idle_per_host
                .unwrap_or(defaults.max_idle_per_host),
            max_response_body: http_file
                .max_response_body
                .unwrap_or(defaults.max_response_body),
            ..defaults
        };

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut tasks = Vec::with_capacity(unresolved.diff_configs.len());
        for (index, fc) in unresolved.diff_configs.into_iter().enumerate() {
            let name = match fc.name.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => n.to_string(),
                _ => return Err(ConfigError::MissingName(index)),
            };
            if let Some(&first) = seen.get(&name) {
                return Err(ConfigError::DuplicateName { name, first, index });
            }
            seen.insert(name.clone(), index);
            tasks.push(Config::resolve_task(fc, name, base)?);
        }

        Ok(Config {
            app_name,
            log,
            http,
            tasks,
        })
    }

    /// Parse config text. Relative paths inside it are resolved against `base`.
    pub fn parse(contents: &str, base: &Path) -> Result<Config, ConfigError> {
        let config: FileConfig = toml::from_str(contents)?;
        Config::fill_defaults(config, base)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let p = path.as_ref().parent().unwrap_or_else(|| Path::new("."));
        Config::parse(&contents, p)
    }
}
