use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{env_subst::substitute_env, schema::RelaygramConfig};

/// Config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "relaygram.toml",
    "relaygram.yaml",
    "relaygram.yml",
    "relaygram.json",
];

/// Load config from `path`, picking the format from its extension.
pub fn load_config(path: &Path) -> anyhow::Result<RelaygramConfig> {
    let value = load_config_value(path)?;
    serde_json::from_value(value)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
}

/// Read, env-substitute and parse `path` into an untyped tree.
pub fn load_config_value(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config_value(&substitute_env(&raw), path)
}

/// Load `path` if given, else the first discovered config file, else
/// defaults. Unlike discovery, an explicit path that fails to load is an error.
pub fn load_or_discover(path: Option<&Path>) -> anyhow::Result<(RelaygramConfig, Option<PathBuf>)> {
    let found = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };
    match found {
        Some(p) => {
            debug!(path = %p.display(), "loading config");
            Ok((load_config(&p)?, Some(p)))
        },
        None => {
            debug!("no config file found, using defaults");
            Ok((RelaygramConfig::default(), None))
        },
    }
}

/// First config file in `./`, then the user config dir.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

/// User-level config directory (`~/.config/relaygram/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "relaygram").map(|d| d.config_dir().to_path_buf())
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

pub(crate) fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            // An empty YAML document is null; treat it like an empty table.
            if v.is_null() {
                return Ok(serde_json::Value::Object(Default::default()));
            }
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, relaygram_bridge::ActorId, secrecy::ExposeSecret};

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "relaygram.toml",
            "[telegram]\npoll_limit = 50\n\n[[actors]]\nid = 7\ntoken = \"t\"\nadmin = \"@a:b\"\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.telegram.poll_limit, 50);
        assert_eq!(cfg.actors[0].id, ActorId(7));
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write(
            dir.path(),
            "relaygram.yaml",
            "telegram:\n  api_url: http://localhost:8081/\nactors:\n  - id: 1\n    token: t\n    admin: \"@a:b\"\n",
        );
        let cfg = load_config(&yaml).unwrap();
        assert_eq!(cfg.telegram.api_url.as_deref(), Some("http://localhost:8081/"));
        assert_eq!(cfg.actors.len(), 1);

        let json = write(
            dir.path(),
            "relaygram.json",
            r#"{"telegram": {"poll_timeout_secs": 5}}"#,
        );
        let cfg = load_config(&json).unwrap();
        assert_eq!(cfg.telegram.poll_timeout_secs, 5);
        assert!(cfg.actors.is_empty());
    }

    #[test]
    fn empty_yaml_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "relaygram.yml", "");
        assert!(load_config(&path).unwrap().actors.is_empty());
    }

    #[test]
    fn unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "relaygram.ini", "x=1");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains(".ini"));
    }

    #[test]
    fn unresolved_placeholder_survives_into_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "relaygram.toml",
            "[[actors]]\nid = 1\ntoken = \"${RELAYGRAM_TEST_UNSET_TOKEN_9F2}\"\nadmin = \"@a:b\"\n",
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(
            cfg.actors[0].token.expose_secret(),
            "${RELAYGRAM_TEST_UNSET_TOKEN_9F2}"
        );
    }

    #[test]
    fn find_in_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "relaygram.json", "{}");
        write(dir.path(), "relaygram.toml", "");
        assert_eq!(
            find_in(dir.path()).unwrap().file_name().unwrap(),
            "relaygram.toml"
        );
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_discover(Some(dir.path().join("nope.toml").as_path())).is_err());
    }
}
