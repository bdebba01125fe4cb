use directories::BaseDirs;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_CAPTCHA: &str = "0";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("unable to determine home directory")]
    NoHome,
    #[error("identity file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed identity file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize identity: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Nickname and verification token sent when opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub nick: String,
    pub captcha: String,
}

impl Identity {
    pub fn new(nick: impl Into<String>, captcha: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            captcha: captcha.into(),
        }
    }
}

pub fn random_nick() -> String {
    format!("User{}", rand::thread_rng().gen_range(0..10_000))
}

/// On-disk record; every field is optional so partial files stay readable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub captcha: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

impl StoredIdentity {
    /// Applies overrides, filling gaps with a random nick and the default
    /// captcha. Returns whether anything changed and should be written back.
    pub fn merge(
        &mut self,
        nick: Option<String>,
        captcha: Option<String>,
        server: Option<String>,
    ) -> bool {
        let before = self.clone();
        if let Some(nick) = nick {
            self.nick = Some(nick);
        }
        if let Some(captcha) = captcha {
            self.captcha = Some(captcha);
        }
        if let Some(server) = server {
            self.server = Some(server);
        }
        self.nick.get_or_insert_with(random_nick);
        self.captcha
            .get_or_insert_with(|| DEFAULT_CAPTCHA.to_string());
        *self != before
    }

    pub fn identity(&self) -> Identity {
        Identity {
            nick: self.nick.clone().unwrap_or_else(random_nick),
            captcha: self
                .captcha
                .clone()
                .unwrap_or_else(|| DEFAULT_CAPTCHA.to_string()),
        }
    }
}

/// TOML file holding the [`StoredIdentity`], by default `~/.place/identity.toml`.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn default_path() -> Result<PathBuf, IdentityError> {
        let base = BaseDirs::new().ok_or(IdentityError::NoHome)?;
        Ok(base.home_dir().join(".place").join("identity.toml"))
    }

    pub fn open_default() -> Result<Self, IdentityError> {
        Ok(Self::at(Self::default_path()?))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<StoredIdentity, IdentityError> {
        if !self.path.exists() {
            return Ok(StoredIdentity::default());
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| self.io(source))?;
        toml::from_str(&raw).map_err(|source| IdentityError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, stored: &StoredIdentity) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io(source))?;
        }

        let serialized = toml::to_string_pretty(stored)?;
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(|source| self.io(source))?;
        file.write_all(serialized.as_bytes())
            .map_err(|source| self.io(source))?;
        tracing::debug!(target: "place::identity", path = ?self.path, "identity saved");
        Ok(())
    }

    fn io(&self, source: std::io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
