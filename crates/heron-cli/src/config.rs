//! Configuration file parsing for heron.toml.

use heron_bytecode::DEFAULT_FORMAT_VERSION;
use heron_inspector::InspectorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file names to search for
const CONFIG_NAMES: &[&str] = &["heron.toml", ".heronrc.toml"];

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Cache location and format
    #[serde(default)]
    pub cache: CacheConfig,

    /// Inspector listener
    #[serde(default)]
    pub inspector: InspectorSection,
}

/// Cache configuration.
#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    /// Directory holding cache entries
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Format version expected when decoding
    #[serde(default = "default_format_version")]
    pub format_version: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            format_version: DEFAULT_FORMAT_VERSION,
        }
    }
}

impl CacheConfig {
    /// Resolve a cache file argument.
    ///
    /// Paths that exist are used as given; anything else is looked up in
    /// the cache directory, so entries can be named by their key.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.exists() || file.is_absolute() {
            return file.to_path_buf();
        }
        let in_dir = self.dir.join(file);
        if in_dir.exists() {
            return in_dir;
        }
        let with_ext = in_dir.with_extension(heron_bytecode::store::CACHE_EXTENSION);
        if with_ext.exists() {
            with_ext
        } else {
            file.to_path_buf()
        }
    }
}

/// Inspector listener configuration.
#[derive(Debug, Deserialize)]
pub struct InspectorSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for InspectorSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl From<&InspectorSection> for InspectorConfig {
    fn from(section: &InspectorSection) -> Self {
        Self {
            host: section.host.clone(),
            port: section.port,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".heron-cache")
}

fn default_format_version() -> u16 {
    DEFAULT_FORMAT_VERSION
}

fn default_host() -> String {
    InspectorConfig::default().host
}

fn default_port() -> u16 {
    heron_inspector::server::DEFAULT_PORT
}

/// Load configuration from a file or search for default config files.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path
        && !path.exists()
    {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    let Some(path) = path.map(PathBuf::from).or_else(find_config_file) else {
        return Ok(Config::default());
    };

    let content = std::fs::read_to_string(&path)?;
    let mut config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;

    // A relative cache dir is relative to the file that names it
    if config.cache.dir.is_relative()
        && let Some(parent) = path.parent()
    {
        config.cache.dir = parent.join(&config.cache.dir);
    }
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Search for configuration file in the current directory and parent directories.
fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_ancestors(&cwd)
}

fn find_config_in_ancestors(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        for name in CONFIG_NAMES {
            let path = current.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        dir = current.parent();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.dir, PathBuf::from(".heron-cache"));
        assert_eq!(config.cache.format_version, DEFAULT_FORMAT_VERSION);
        assert_eq!(config.inspector.host, "127.0.0.1");
        assert_eq!(config.inspector.port, 9922);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[cache]
dir = "/var/cache/heron"
format_version = 7

[inspector]
port = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.dir, PathBuf::from("/var/cache/heron"));
        assert_eq!(config.cache.format_version, 7);
        assert_eq!(config.inspector.host, "127.0.0.1");
        assert_eq!(config.inspector.port, 0);

        let listener = InspectorConfig::from(&config.inspector);
        assert_eq!(listener.port, 0);
    }

    #[test]
    fn test_load_relative_cache_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("heron.toml");
        std::fs::write(&path, "[cache]\ndir = \"out\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.cache.dir, dir.path().join("out"));
    }

    #[test]
    fn test_missing_explicit_config() {
        let dir = TempDir::new().unwrap();
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().starts_with("Config file not found"));
    }

    #[test]
    fn test_find_config_in_parent() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("heron.toml"), "").unwrap();

        assert_eq!(
            find_config_in_ancestors(&nested),
            Some(dir.path().join("heron.toml"))
        );
    }

    #[test]
    fn test_resolve_by_key() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("abc.hbc"), b"").unwrap();
        let cache = CacheConfig {
            dir: dir.path().to_path_buf(),
            format_version: 1,
        };

        assert_eq!(cache.resolve(Path::new("abc")), dir.path().join("abc.hbc"));
        assert_eq!(cache.resolve(Path::new("abc.hbc")), dir.path().join("abc.hbc"));
        assert_eq!(cache.resolve(Path::new("missing")), PathBuf::from("missing"));
    }
}
