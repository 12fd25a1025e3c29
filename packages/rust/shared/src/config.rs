//! Layered application configuration for gitblog.
//!
//! Two tiers are merged key-by-key:
//! - the bundled reference tier (`reference.toml`, compiled into the binary)
//! - an optional override tier at `<container home>/conf/blog.conf`
//!
//! Override keys win; anything the override leaves unset falls through to
//! the bundled tier. A missing or malformed override never fails startup.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use toml::{Table, Value};
use tracing::{debug, info, trace, warn};

use crate::error::{BlogError, Result};

/// The bundled reference configuration.
const BUNDLED_CONFIG: &str = include_str!("../reference.toml");

/// Root table every accessor is relative to.
const ROOT_KEY: &str = "blog";

/// Override file name, looked up inside the container's conf directory.
pub const OVERRIDE_FILE_NAME: &str = "blog.conf";

/// Conf directory name under a container home.
const CONTAINER_CONF_DIRNAME: &str = "conf";

/// Container home environment variables, in priority order.
/// The first variable that is set wins, whether or not it holds an override.
pub const CONTAINER_HOME_VARS: [(&str, &str); 3] = [
    ("GITBLOG_HOME", "gitblog"),
    ("JETTY_HOME", "Jetty"),
    ("CATALINA_HOME", "Catalina (Tomcat)"),
];

// ---------------------------------------------------------------------------
// Configuration tree
// ---------------------------------------------------------------------------

/// Immutable merged configuration tree.
///
/// Built once at startup and shared behind an `Arc`; accessors take dotted
/// paths relative to the `[blog]` table (e.g. `clone.pull-update-interval`).
#[derive(Debug, Clone)]
pub struct Configuration {
    root: Table,
}

impl Configuration {
    /// Load the bundled tier plus any override found via the container
    /// home environment variables.
    pub fn load() -> Result<Self> {
        let override_tier = locate_override_file().and_then(|path| load_override(&path));
        Self::from_tiers(bundled_tier()?, override_tier)
    }

    /// Load the bundled tier plus the override file at `path`, if it parses.
    pub fn load_with_override(path: &Path) -> Result<Self> {
        Self::from_tiers(bundled_tier()?, load_override(path))
    }

    /// The bundled tier alone.
    pub fn bundled() -> Result<Self> {
        Self::from_tiers(bundled_tier()?, None)
    }

    /// Merge an override tier over a reference tier.
    pub fn from_tiers(mut reference: Table, override_tier: Option<Table>) -> Result<Self> {
        match override_tier {
            Some(overlay) => {
                debug!("found valid override configuration; using override");
                merge_tables(&mut reference, overlay);
            }
            None => {
                debug!("found no valid override configuration; using bundled defaults");
            }
        }

        let root = match reference.remove(ROOT_KEY) {
            Some(Value::Table(root)) => root,
            _ => {
                return Err(BlogError::config(format!(
                    "configuration has no [{ROOT_KEY}] table"
                )));
            }
        };

        let config = Self { root };
        config.trace_entries();
        Ok(config)
    }

    /// Look up a raw value by dotted path.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_table()?.get(segment)?;
        }
        Some(current)
    }

    fn require(&self, path: &str) -> Result<&Value> {
        self.lookup(path).ok_or_else(|| BlogError::key_missing(path))
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        self.require(path)?
            .as_bool()
            .ok_or_else(|| type_error(path, "boolean"))
    }

    pub fn get_string(&self, path: &str) -> Result<String> {
        self.require(path)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| type_error(path, "string"))
    }

    pub fn get_int(&self, path: &str) -> Result<i64> {
        self.require(path)?
            .as_integer()
            .ok_or_else(|| type_error(path, "integer"))
    }

    /// Durations are either integer milliseconds or a human-readable string
    /// such as `"90s"`, `"15m"` or `"1h 30m"`.
    pub fn get_duration(&self, path: &str) -> Result<Duration> {
        match self.require(path)? {
            Value::Integer(ms) if *ms >= 0 => Ok(Duration::from_millis(*ms as u64)),
            Value::String(s) => {
                humantime::parse_duration(s.trim()).map_err(|_| type_error(path, "duration"))
            }
            _ => Err(type_error(path, "duration")),
        }
    }

    pub fn get_table(&self, path: &str) -> Result<&Table> {
        self.require(path)?
            .as_table()
            .ok_or_else(|| type_error(path, "table"))
    }

    /// Render the merged tree back to TOML, wrapped in its `[blog]` table.
    pub fn to_toml_string(&self) -> Result<String> {
        let mut wrapped = Table::new();
        wrapped.insert(ROOT_KEY.to_string(), Value::Table(self.root.clone()));
        toml::to_string_pretty(&wrapped).map_err(|e| BlogError::config(e.to_string()))
    }

    fn trace_entries(&self) {
        let mut stack: Vec<(String, &Table)> = vec![(String::new(), &self.root)];
        while let Some((prefix, table)) = stack.pop() {
            for (key, value) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match value {
                    Value::Table(child) => stack.push((path, child)),
                    other => trace!(key = %path, value = %other, "loaded config"),
                }
            }
        }
    }
}

fn type_error(path: &str, expected: &'static str) -> BlogError {
    BlogError::ConfigType {
        key: path.to_string(),
        expected,
    }
}

/// Recursively layer `overlay` onto `base`. Tables merge; everything else
/// in the overlay replaces the base value.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tier loading
// ---------------------------------------------------------------------------

fn bundled_tier() -> Result<Table> {
    toml::from_str(BUNDLED_CONFIG)
        .map_err(|e| BlogError::config(format!("bundled reference config is invalid: {e}")))
}

/// Find the override file via the container home environment variables.
pub fn locate_override_file() -> Option<PathBuf> {
    locate_override_file_with(|name| std::env::var_os(name))
}

/// Same as [`locate_override_file`] with an injectable environment lookup.
pub fn locate_override_file_with<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    let (var, container, home) = CONTAINER_HOME_VARS
        .iter()
        .find_map(|(var, container)| lookup(var).map(|home| (*var, *container, home)))?;

    let path = PathBuf::from(home)
        .join(CONTAINER_CONF_DIRNAME)
        .join(OVERRIDE_FILE_NAME);

    if path.is_file() {
        info!(?path, container, "found container specific {OVERRIDE_FILE_NAME}");
        Some(path)
    } else {
        debug!(?path, var, "container home set but no override file present");
        None
    }
}

/// Read and parse an override file. Any failure is logged and treated as
/// "no override".
pub fn load_override(path: &Path) -> Option<Table> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(?path, error = %e, "failed to read override {OVERRIDE_FILE_NAME}");
            return None;
        }
    };

    match toml::from_str::<Table>(&content) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!(?path, error = %e, "failed to parse override {OVERRIDE_FILE_NAME}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Typed settings (read once at startup)
// ---------------------------------------------------------------------------

/// Every key the application needs, resolved once so a missing key fails
/// at boot rather than mid-sync.
#[derive(Debug, Clone)]
pub struct BlogSettings {
    pub dev_mode: bool,
    pub title: String,
    pub sub_title: String,
    pub context_path: String,
    pub hostname: String,
    pub full_uri: String,
    pub clone: CloneSettings,
    pub content: ContentSettings,
    pub twitter_feed_url: String,
}

/// `[blog.clone]` section.
#[derive(Debug, Clone)]
pub struct CloneSettings {
    /// Remote repository address.
    pub url: String,
    /// Force a fresh clone at process start.
    pub on_startup: bool,
    /// Local working-copy directory.
    pub path: PathBuf,
    /// Branch to track; `None` follows the remote's default branch.
    pub branch: Option<String>,
    pub pull_update_interval: Duration,
    pub pull_timeout: Duration,
}

/// `[blog.content]` section.
#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub root: String,
    pub templates: String,
    pub entries: String,
    pub pages: String,
    pub entry_limit: usize,
}

impl ContentSettings {
    /// Entries directory inside a working copy.
    pub fn entries_dir(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.root).join(&self.entries)
    }

    /// Pages directory inside a working copy.
    pub fn pages_dir(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.root).join(&self.pages)
    }

    /// Templates directory inside a working copy.
    pub fn templates_dir(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.root).join(&self.templates)
    }
}

impl BlogSettings {
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let branch = config.get_string("clone.branch")?;
        let entry_limit = config.get_int("content.entry-limit")?;
        let entry_limit =
            usize::try_from(entry_limit).map_err(|_| type_error("content.entry-limit", "count"))?;

        Ok(Self {
            dev_mode: config.get_bool("dev-mode")?,
            title: config.get_string("title")?,
            sub_title: config.get_string("sub-title")?,
            context_path: config.get_string("context-path")?,
            hostname: config.get_string("hostname")?,
            full_uri: config.get_string("fullUri")?,
            clone: CloneSettings {
                url: config.get_string("clone.url")?,
                on_startup: config.get_bool("clone.on-startup")?,
                path: PathBuf::from(config.get_string("clone.path")?),
                branch: (!branch.trim().is_empty()).then(|| branch.trim().to_string()),
                pull_update_interval: config.get_duration("clone.pull-update-interval")?,
                pull_timeout: config.get_duration("clone.pull-timeout")?,
            },
            content: ContentSettings {
                root: config.get_string("content.root")?,
                templates: config.get_string("content.templates")?,
                entries: config.get_string("content.entries")?,
                pages: config.get_string("content.pages")?,
                entry_limit,
            },
            twitter_feed_url: config.get_string("services.twitter.feed-url")?,
        })
    }
}
