//! Repository configuration.
//!
//! Loaded from a TOML file with optional `[user]`, `[index]` and `[tree]`
//! sections; every missing key takes its default.
//!
//! ```toml
//! [user]
//! name = "Ada"
//! email = "ada@example.com"
//!
//! [index]
//! quad_max_depth = 10
//! max_leaf_entries = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use geovc_index::IndexConfig;
use geovc_tree::{TreeConfig, MAX_BUCKETS_PER_LEVEL};
use geovc_types::Person;

use crate::error::{RepoError, RepoResult};

/// Settings scoped to one repository session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Identity recorded as author and committer.
    pub user: UserConfig,

    /// Shape of secondary index trees.
    pub index: IndexConfig,

    /// Shape of canonical trees. Must not change once a repository has
    /// commits, or tree ids stop being comparable.
    pub tree: TreeConfig,
}

/// Committer identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserConfig {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: Some(email.into()),
        }
    }

    /// The configured identity, stamped with the current time.
    pub fn person(&self) -> RepoResult<Person> {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) if !name.is_empty() => Ok(Person::now(name, email)),
            (Some(name), None) if !name.is_empty() => {
                let mut person = Person::now(name, "");
                person.email = None;
                Ok(person)
            }
            _ => Err(RepoError::Config("user.name is not set".into())),
        }
    }
}

impl RepoConfig {
    /// A default configuration committing as `name <email>`.
    pub fn for_user(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user: UserConfig::new(name, email),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| RepoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject tree and index shapes that cannot be built.
    pub fn validate(&self) -> RepoResult<()> {
        self.tree
            .validate()
            .map_err(|e| RepoError::Config(format!("tree: {e}")))?;
        if !(1..=MAX_BUCKETS_PER_LEVEL).contains(&self.index.buckets_per_level) {
            return Err(RepoError::Config(format!(
                "index: buckets_per_level must be between 1 and {MAX_BUCKETS_PER_LEVEL}, got {}",
                self.index.buckets_per_level
            )));
        }
        Ok(())
    }

    /// Read the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string(self).map_err(|e| RepoError::Config(e.to_string()))
    }
}
