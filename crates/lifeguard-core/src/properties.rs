//! Property listings through `zpool list` and `zfs list`.
//!
//! Both tools print one tab-separated line per object when run with
//! `-p -H -o <props>`, with columns in the requested order. The fetcher turns
//! those lines into [`PropertyRow`]s and registers every `name` column with
//! the identifier vault, which is where raw identifiers first become tokens.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::PropertyError;
use crate::exec::CommandRunner;
use crate::pool::{Property, PropertyRow};
use crate::sanitize::sanitize;
use crate::vault::IdentifierVault;

/// Property whose values are identifiers and receive a vault token.
pub const IDENTIFIER_PROPERTY: &str = "name";

/// Absolute paths of the storage tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub zpool: String,
    pub zfs: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            zpool: "/sbin/zpool".to_owned(),
            zfs: "/sbin/zfs".to_owned(),
        }
    }
}

/// Which tool family performs the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCommand {
    Pool,
    Dataset,
}

impl ListCommand {
    fn family(self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Dataset => "dataset",
        }
    }
}

/// Recursive type filter for dataset listings (`-t <type> -r`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Filesystem,
    Snapshot,
}

impl TypeFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs listing commands and shapes their output.
pub struct PropertyFetcher {
    runner: Arc<dyn CommandRunner>,
    vault: Arc<IdentifierVault>,
    tools: ToolPaths,
}

impl PropertyFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, vault: Arc<IdentifierVault>, tools: ToolPaths) -> Self {
        Self {
            runner,
            vault,
            tools,
        }
    }

    /// Build the argument vector for a listing.
    ///
    /// `target` has already been resolved from the vault and is passed as a
    /// single argument; `None` lists every object of the family.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a filter is given for pool listings
    /// or if nothing is left of `properties` after sanitization.
    pub fn command(
        &self,
        target: Option<&str>,
        kind: ListCommand,
        filter: Option<TypeFilter>,
        properties: &str,
    ) -> Result<Vec<String>, PropertyError> {
        let names = property_names(properties);
        if names.is_empty() {
            return Err(PropertyError::EmptyPropertyList);
        }

        let binary = match kind {
            ListCommand::Pool => &self.tools.zpool,
            ListCommand::Dataset => &self.tools.zfs,
        };

        let mut argv = vec![
            binary.clone(),
            "list".to_owned(),
            "-p".to_owned(),
            "-H".to_owned(),
            "-o".to_owned(),
            names.join(","),
        ];

        if let Some(filter) = filter {
            if kind != ListCommand::Dataset {
                return Err(PropertyError::FilterNotSupported {
                    family: kind.family(),
                });
            }
            argv.extend(["-t".to_owned(), filter.as_str().to_owned(), "-r".to_owned()]);
        }

        argv.extend(target.map(str::to_owned));
        Ok(argv)
    }

    /// List `properties` for `target`, one row per object printed.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration (see [`Self::command`]) and when the
    /// tool exits unsuccessfully. No partial rows are returned.
    pub async fn fetch(
        &self,
        target: Option<&str>,
        kind: ListCommand,
        filter: Option<TypeFilter>,
        properties: &str,
    ) -> Result<Vec<PropertyRow>, PropertyError> {
        let argv = self.command(target, kind, filter, properties)?;
        let output = self.runner.run(&argv, None).await?;

        let names = property_names(properties);
        let rows = self.parse_rows(&output.stdout, &names);
        debug!(family = kind.family(), rows = rows.len(), "listed properties");
        Ok(rows)
    }

    /// Shape tab-separated listing output into rows keyed by `names`.
    pub fn parse_rows(&self, stdout: &str, names: &[String]) -> Vec<PropertyRow> {
        stdout
            .split('\n')
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                names
                    .iter()
                    .zip(line.split('\t'))
                    .map(|(name, value)| self.property(name, value))
                    .collect()
            })
            .collect()
    }

    fn property(&self, name: &str, value: &str) -> Property {
        let value = value.strip_suffix('\n').unwrap_or(value).to_owned();
        let token = (name == IDENTIFIER_PROPERTY).then(|| self.vault.mint(&value));
        Property {
            name: name.to_owned(),
            value,
            token,
        }
    }
}

/// Sanitize a comma-separated property list and split it into names.
pub fn property_names(properties: &str) -> Vec<String> {
    sanitize(properties)
        .split(',')
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}
