use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::session::ClientSettings;

pub const DEFAULT_API_URL: &str =
  "http://localhost:5000/api";
pub const DEFAULT_PAGE_SIZE: usize = 6;
pub const DEFAULT_TIMEOUT_SECS: u64 =
  30;

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("api.url", DEFAULT_API_URL),
      ("data.location", "~/.tasklane"),
      ("page.size", "6"),
      ("color", "on"),
      ("theme", "system"),
      ("request.timeout", "30")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let rc = resolve_rc_path(
      rc_override
    )?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading config");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no tasklanerc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn page_size(
    &self
  ) -> anyhow::Result<usize> {
    let Some(raw) = self.get("page.size")
    else {
      return Ok(DEFAULT_PAGE_SIZE);
    };
    let size = raw
      .trim()
      .parse::<usize>()
      .map_err(|_| {
        anyhow!(
          "invalid page.size: {raw}"
        )
      })?;
    if size == 0 {
      return Err(anyhow!(
        "page.size must be at least 1"
      ));
    }
    Ok(size)
  }

  pub fn client_settings(
    &self
  ) -> anyhow::Result<ClientSettings> {
    let base_url = self
      .get("api.url")
      .unwrap_or_else(|| {
        DEFAULT_API_URL.to_string()
      });
    let timeout_secs = match self
      .get("request.timeout")
    {
      | Some(raw) => {
        raw.trim().parse::<u64>().map_err(
          |_| {
            anyhow!(
              "invalid request.timeout: \
               {raw}"
            )
          }
        )?
      }
      | None => DEFAULT_TIMEOUT_SECS
    };

    Ok(ClientSettings {
      base_url,
      timeout: Duration::from_secs(
        timeout_secs
      )
    })
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = if let Some(path) =
    override_dir
  {
    path.to_path_buf()
  } else if let Some(cfg_value) =
    cfg.get("data.location")
  {
    expand_tilde(Path::new(&cfg_value))
  } else {
    default_data_dir()?
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var("TASKLANERC")
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       ~/.tasklanerc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(".tasklanerc");
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn default_data_dir()
-> anyhow::Result<PathBuf> {
  let home = dirs::home_dir()
    .ok_or_else(|| {
      anyhow!(
        "cannot determine home \
         directory"
      )
    })?;
  Ok(home.join(".tasklane"))
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(
  s: &str
) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn defaults_cover_client_and_paging()
  {
    let cfg = Config::default();
    assert_eq!(
      cfg.page_size().expect("page size"),
      DEFAULT_PAGE_SIZE
    );
    let settings = cfg
      .client_settings()
      .expect("settings");
    assert_eq!(
      settings.base_url,
      DEFAULT_API_URL
    );
    assert_eq!(
      settings.timeout,
      Duration::from_secs(30)
    );
  }

  #[test]
  fn rc_file_with_include_and_overrides()
  {
    let temp = tempdir().expect("tempdir");
    let extra = temp.path().join("extra.rc");
    fs::write(&extra, "page.size = 4\n")
      .expect("write include");
    let rc = temp.path().join("tasklanerc");
    fs::write(
      &rc,
      "# api\napi.url = https://todo.example/api # trailing\ninclude extra.rc\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load config");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.get("api.url").as_deref(),
      Some("https://todo.example/api")
    );
    assert_eq!(
      cfg.page_size().expect("page size"),
      4
    );

    cfg.apply_overrides([(
      "rc.page.size".to_string(),
      "9".to_string()
    )]);
    assert_eq!(
      cfg.page_size().expect("page size"),
      9
    );
  }

  #[test]
  fn bool_keys_accept_common_spellings()
  {
    let mut cfg = Config::default();
    assert_eq!(cfg.get_bool("color"), Some(true));
    assert_eq!(cfg.get_bool("missing"), None);

    for (raw, expected) in [
      ("off", false),
      ("0", false),
      ("Y", true),
      ("true", true)
    ] {
      cfg.apply_overrides([(
        "color".to_string(),
        raw.to_string()
      )]);
      assert_eq!(
        cfg.get_bool("color"),
        Some(expected),
        "{raw}"
      );
    }
  }

  #[test]
  fn rejects_zero_page_size_and_bad_lines()
  {
    let mut cfg = Config::default();
    cfg.apply_overrides([(
      "page.size".to_string(),
      "0".to_string()
    )]);
    assert!(cfg.page_size().is_err());

    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("bad.rc");
    fs::write(&rc, "no equals sign\n")
      .expect("write rc");
    assert!(Config::load(Some(&rc)).is_err());
  }
}
