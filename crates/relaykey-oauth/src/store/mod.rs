//! Token persistence, one JSON file per account.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ConfigLayout;
use crate::error::{Error, Result};
use crate::flow::OAuthClient;
use crate::identity::Identity;
use crate::token::{TokenRecord, TokenSource};

/// Reads and writes token files under a [`ConfigLayout`].
///
/// Files are only readable by the owner. Writes go to a temporary file next to
/// the target and are renamed into place, so a crash never leaves a truncated
/// token behind.
#[derive(Debug, Clone)]
pub struct TokenStore {
    layout: ConfigLayout,
}

impl TokenStore {
    /// Creates a store for the given layout.
    #[must_use]
    pub const fn new(layout: ConfigLayout) -> Self {
        Self { layout }
    }

    /// Token file of an account.
    #[must_use]
    pub fn path(&self, identity: &Identity) -> PathBuf {
        self.layout.token_path(identity)
    }

    /// Persists a token, replacing any previous one for the account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be written.
    pub fn save(&self, identity: &Identity, token: &TokenRecord) -> Result<()> {
        let path = self.path(identity);
        if let Some(parent) = path.parent() {
            create_private_dir(parent).map_err(|e| Error::storage(parent, e))?;
        }

        let mut data = serde_json::to_vec_pretty(token)?;
        data.push(b'\n');
        write_private(&path, &data).map_err(|e| Error::storage(&path, e))?;

        info!("saved token for {identity} to {}", path.display());
        Ok(())
    }

    /// Loads the token of an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TokenNotFound`] if setup has not been run,
    /// [`Error::Storage`] if the file cannot be read and [`Error::Json`] if it
    /// is corrupt.
    pub fn load(&self, identity: &Identity) -> Result<TokenRecord> {
        let path = self.path(identity);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::TokenNotFound(path));
            }
            Err(e) => return Err(Error::storage(path, e)),
        };

        debug!("loaded token for {identity} from {}", path.display());
        Ok(serde_json::from_slice(&data)?)
    }

    /// Loads the account's token and wraps it in a refreshing source.
    ///
    /// Refreshed tokens whose refresh token was rotated by the provider are
    /// written back through this store.
    ///
    /// # Errors
    ///
    /// See [`TokenStore::load`].
    pub fn token_source(&self, identity: &Identity, client: OAuthClient) -> Result<TokenSource> {
        let token = self.load(identity)?;
        Ok(TokenSource::new(client, token).persist_to(self.clone(), identity.clone()))
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

fn write_private(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let result = (|| {
        let mut file = options.open(&tmp)?;
        // mode() only applies on creation; tighten a leftover temp file too
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
