//! Where the client config and token files live.
//!
//! Two layouts are supported:
//!
//! | Layout | Client config | Token for `me@example.com` |
//! |--------|---------------|----------------------------|
//! | XDG    | `$XDG_CONFIG_HOME/relaykey/config.json` | `$XDG_CONFIG_HOME/relaykey/token.me@example.com.json` |
//! | Legacy | `~/.relaykey.json` | `~/.relaykey.me@example.com.json` |
//!
//! XDG wins unless only the legacy config file exists.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::identity::Identity;

/// Directory name under the XDG config home.
pub const APP_DIR: &str = "relaykey";

/// File layout for config and tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayout {
    /// Files under `<config home>/relaykey/`.
    Xdg {
        /// The `relaykey` directory itself.
        dir: PathBuf,
    },
    /// Dot-files in the home directory.
    Legacy {
        /// The user's home directory.
        home: PathBuf,
    },
}

impl ConfigLayout {
    /// XDG layout rooted at a config home (e.g. `~/.config`).
    #[must_use]
    pub fn xdg(config_home: impl AsRef<Path>) -> Self {
        Self::Xdg {
            dir: config_home.as_ref().join(APP_DIR),
        }
    }

    /// Legacy dot-file layout in a home directory.
    #[must_use]
    pub fn legacy(home: impl Into<PathBuf>) -> Self {
        Self::Legacy { home: home.into() }
    }

    /// Picks the layout from what already exists on disk.
    ///
    /// The XDG directory takes precedence; the legacy layout is used only when
    /// its config file exists and the XDG directory does not. A fresh machine
    /// gets XDG.
    #[must_use]
    pub fn detect(config_home: &Path, home: &Path) -> Self {
        let xdg = Self::xdg(config_home);
        let legacy = Self::legacy(home);
        if xdg.dir().is_dir() {
            xdg
        } else if legacy.config_path().is_file() {
            legacy
        } else {
            xdg
        }
    }

    /// Detects the layout for the current user.
    ///
    /// The config home is `$XDG_CONFIG_HOME` when set and non-empty, otherwise
    /// `~/.config` on every platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine the home directory".into()))?;
        let config_home = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map_or_else(|| home.join(".config"), PathBuf::from);
        Ok(Self::detect(&config_home, &home))
    }

    /// Directory that holds the files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        match self {
            Self::Xdg { dir } => dir,
            Self::Legacy { home } => home,
        }
    }

    /// Path of the provider client config.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        match self {
            Self::Xdg { dir } => dir.join("config.json"),
            Self::Legacy { home } => home.join(format!(".{APP_DIR}.json")),
        }
    }

    /// Path of the token file for an account.
    #[must_use]
    pub fn token_path(&self, identity: &Identity) -> PathBuf {
        match self {
            Self::Xdg { dir } => dir.join(format!("token.{identity}.json")),
            Self::Legacy { home } => home.join(format!(".{APP_DIR}.{identity}.json")),
        }
    }
}
