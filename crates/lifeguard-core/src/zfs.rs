//! Facade over the `zpool` and `zfs` tools.
//!
//! Every operation the server offers goes through [`Zfs`], which owns the
//! argument vectors, the escalation wrapper and the mapping of known
//! standard-error messages to typed errors.
//!
//! The storage tools have no structured error codes, so a handful of their
//! human-readable messages are matched as substrings. Each message has its
//! own adapter function below; a tool upgrade that rewords one of them only
//! needs that function changed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ExecError, ZfsError};
use crate::exec::CommandRunner;
use crate::pool::{DataInfo, Pool, PropertyRow};
use crate::properties::{ListCommand, PropertyFetcher, ToolPaths, TypeFilter};
use crate::sanitize::sanitize_strict;
use crate::status::StatusParser;
use crate::vault::IdentifierVault;

/// Sentinel the tools print instead of an empty pool list.
const NO_POOLS: &str = "no pools available";

/// Default property lists for each kind of object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyLists {
    pub pool: String,
    pub dataset: String,
    pub snapshot: String,
}

impl Default for PropertyLists {
    fn default() -> Self {
        Self {
            pool: "name,health,capacity,free,size,fragmentation,ashift".to_owned(),
            dataset: "name,used,avail,encryption,keystatus,mounted,usedsnap,usedds".to_owned(),
            snapshot: "name,used,avail,refer".to_owned(),
        }
    }
}

/// Static configuration of the facade.
#[derive(Debug, Clone, Default)]
pub struct ZfsConfig {
    pub tools: ToolPaths,
    /// Privilege wrapper run as `<sudo> -n <tool> ...` for operations that
    /// cannot be delegated with `zfs allow`. `None` runs them directly.
    pub sudo: Option<String>,
    pub properties: PropertyLists,
    /// Log the parser's header map for every status report.
    pub dump_headers: bool,
}

/// Outcome of a key load that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLoad {
    Loaded,
    AlreadyLoaded,
}

// ── stderr adapters ──────────────────────────────────────────────────

/// `zfs load-key` rejected the passphrase.
pub fn is_incorrect_key(stderr: &str) -> bool {
    stderr.contains("Incorrect key provided")
}

/// `zfs load-key` found the key already loaded.
pub fn is_key_already_loaded(stderr: &str) -> bool {
    stderr.contains("Key already loaded")
}

/// `zfs unload-key` refused because the dataset is in use.
pub fn is_dataset_busy(stderr: &str) -> bool {
    stderr.contains("is busy")
}

/// `zfs mount` refused because the key is not loaded.
pub fn is_key_not_loaded(stderr: &str) -> bool {
    stderr.contains("encryption key not loaded")
}

/// Entry point for every storage operation.
pub struct Zfs {
    runner: Arc<dyn CommandRunner>,
    fetcher: PropertyFetcher,
    parser: StatusParser,
    config: ZfsConfig,
}

impl Zfs {
    pub fn new(runner: Arc<dyn CommandRunner>, vault: Arc<IdentifierVault>, config: ZfsConfig) -> Self {
        let fetcher = PropertyFetcher::new(Arc::clone(&runner), vault, config.tools.clone());
        let parser = StatusParser::new().with_header_dump(config.dump_headers);
        Self {
            runner,
            fetcher,
            parser,
            config,
        }
    }

    pub fn fetcher(&self) -> &PropertyFetcher {
        &self.fetcher
    }

    pub fn property_lists(&self) -> &PropertyLists {
        &self.config.properties
    }

    /// Names of all imported pools.
    pub async fn list_pools(&self) -> Result<Vec<String>, ZfsError> {
        let argv = self.zpool(&["list", "-p", "-H", "-o", "name"]);
        let output = self.runner.run(&argv, None).await?;

        let mut lines = output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
        if lines.peek() == Some(&NO_POOLS) {
            return Ok(Vec::new());
        }
        Ok(lines.map(str::to_owned).collect())
    }

    /// Parse `zpool status` for one pool. The returned record carries no
    /// property rows.
    pub async fn pool_status(&self, name: &str) -> Result<Pool, ZfsError> {
        let name = pool_argument(name)?;
        let argv = self.zpool(&["status", &name]);
        let output = self.runner.run(&argv, None).await?;
        Ok(self.parser.parse(&output.stdout))
    }

    /// Status plus the pool's own property row, as shown in pool listings.
    pub async fn pool_summary(&self, name: &str) -> Result<Pool, ZfsError> {
        let name = pool_argument(name)?;
        let mut pool = self.pool_status(&name).await?;
        pool.properties = self
            .first_row(&name, ListCommand::Pool, None, &self.config.properties.pool)
            .await?;
        Ok(pool)
    }

    /// Summaries of every pool.
    pub async fn pools(&self) -> Result<Vec<Pool>, ZfsError> {
        let mut pools = Vec::new();
        for name in self.list_pools().await? {
            pools.push(self.pool_summary(&name).await?);
        }
        Ok(pools)
    }

    /// Full detail of one pool: status, properties, datasets and snapshots.
    pub async fn pool(&self, name: &str) -> Result<Pool, ZfsError> {
        let name = pool_argument(name)?;
        let mut pool = self.pool_summary(&name).await?;
        pool.datasets = self
            .fetcher
            .fetch(
                Some(&name),
                ListCommand::Dataset,
                Some(TypeFilter::Filesystem),
                &self.config.properties.dataset,
            )
            .await?;
        pool.snapshots = self
            .fetcher
            .fetch(
                Some(&name),
                ListCommand::Dataset,
                Some(TypeFilter::Snapshot),
                &self.config.properties.snapshot,
            )
            .await?;
        Ok(pool)
    }

    /// Type, default properties and internal properties of one dataset or
    /// snapshot.
    pub async fn data_info(&self, name: &str) -> Result<DataInfo, ZfsError> {
        let kind = self.first_row(name, ListCommand::Dataset, None, "type").await?;
        let kind = kind
            .value("type")
            .ok_or_else(|| ZfsError::MissingProperty {
                property: "type".to_owned(),
            })?
            .to_owned();

        let properties = self
            .first_row(name, ListCommand::Dataset, None, &self.config.properties.dataset)
            .await?;
        let internal = self
            .first_row(name, ListCommand::Dataset, None, "keylocation")
            .await?;

        Ok(DataInfo {
            name: name.to_owned(),
            kind,
            properties,
            internal,
        })
    }

    /// Userland version, the first line of `zpool version`.
    pub async fn version(&self) -> Result<String, ZfsError> {
        let output = self.runner.run(&self.zpool(&["version"]), None).await?;
        Ok(output.stdout.lines().next().unwrap_or_default().trim().to_owned())
    }

    /// Load the encryption key of `dataset`, delivering the passphrase on
    /// standard input.
    pub async fn load_key(&self, dataset: &str, passphrase: &str) -> Result<KeyLoad, ZfsError> {
        let argv = self.zfs(&["load-key", dataset]);
        match self.runner.run(&argv, Some(passphrase.as_bytes())).await {
            Ok(_) => {
                info!(dataset = %dataset, "encryption key loaded");
                Ok(KeyLoad::Loaded)
            }
            Err(e) => match e.stderr() {
                Some(s) if is_incorrect_key(s) => Err(ZfsError::IncorrectKey),
                Some(s) if is_key_already_loaded(s) => {
                    debug!(dataset = %dataset, "encryption key was already loaded");
                    Ok(KeyLoad::AlreadyLoaded)
                }
                _ => Err(unexpected("load-key", dataset, e)),
            },
        }
    }

    pub async fn unload_key(&self, dataset: &str) -> Result<(), ZfsError> {
        let argv = self.zfs(&["unload-key", dataset]);
        match self.runner.run(&argv, None).await {
            Ok(_) => {
                info!(dataset = %dataset, "encryption key unloaded");
                Ok(())
            }
            Err(e) if e.stderr().is_some_and(is_dataset_busy) => Err(ZfsError::DatasetBusy),
            Err(e) => Err(unexpected("unload-key", dataset, e)),
        }
    }

    pub async fn mount(&self, dataset: &str) -> Result<(), ZfsError> {
        let argv = self.privileged(&self.config.tools.zfs, &["mount", dataset]);
        match self.runner.run(&argv, None).await {
            Ok(_) => {
                info!(dataset = %dataset, "dataset mounted");
                Ok(())
            }
            Err(e) if e.stderr().is_some_and(is_key_not_loaded) => Err(ZfsError::KeyNotLoaded),
            Err(e) => Err(unexpected("mount", dataset, e)),
        }
    }

    pub async fn unmount(&self, dataset: &str) -> Result<(), ZfsError> {
        let argv = self.privileged(&self.config.tools.zfs, &["unmount", dataset]);
        self.runner
            .run(&argv, None)
            .await
            .map_err(|e| unexpected("unmount", dataset, e))?;
        info!(dataset = %dataset, "dataset unmounted");
        Ok(())
    }

    /// Start (or resume) a scrub.
    pub async fn scrub(&self, pool: &str) -> Result<(), ZfsError> {
        let pool = pool_argument(pool)?;
        let argv = self.privileged(&self.config.tools.zpool, &["scrub", &pool]);
        self.runner
            .run(&argv, None)
            .await
            .map_err(|e| unexpected("scrub", &pool, e))?;
        info!(pool = %pool, "scrub started");
        Ok(())
    }

    pub async fn pause_scrub(&self, pool: &str) -> Result<(), ZfsError> {
        let pool = pool_argument(pool)?;
        let argv = self.privileged(&self.config.tools.zpool, &["scrub", "-p", &pool]);
        self.runner
            .run(&argv, None)
            .await
            .map_err(|e| unexpected("scrub -p", &pool, e))?;
        info!(pool = %pool, "scrub paused");
        Ok(())
    }

    async fn first_row(
        &self,
        target: &str,
        kind: ListCommand,
        filter: Option<TypeFilter>,
        properties: &str,
    ) -> Result<PropertyRow, ZfsError> {
        let rows = self.fetcher.fetch(Some(target), kind, filter, properties).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    fn zpool(&self, args: &[&str]) -> Vec<String> {
        command(&self.config.tools.zpool, args)
    }

    fn zfs(&self, args: &[&str]) -> Vec<String> {
        command(&self.config.tools.zfs, args)
    }

    fn privileged(&self, tool: &str, args: &[&str]) -> Vec<String> {
        let mut argv = Vec::with_capacity(args.len() + 3);
        if let Some(sudo) = &self.config.sudo {
            argv.push(sudo.clone());
            argv.push("-n".to_owned());
        }
        argv.extend(command(tool, args));
        argv
    }
}

fn command(tool: &str, args: &[&str]) -> Vec<String> {
    std::iter::once(tool)
        .chain(args.iter().copied())
        .map(str::to_owned)
        .collect()
}

fn pool_argument(name: &str) -> Result<String, ZfsError> {
    let clean = sanitize_strict(name);
    if clean.is_empty() {
        return Err(ZfsError::InvalidName);
    }
    Ok(clean)
}

fn unexpected(operation: &str, target: &str, error: ExecError) -> ZfsError {
    warn!(
        operation = operation,
        target = %target,
        error = %error,
        "storage command failed"
    );
    ZfsError::Command(error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;

    const STATUS: &str = "  pool: tank
 state: ONLINE
  scan: none requested
config:

        NAME        STATE     READ WRITE CKSUM
        tank        ONLINE       0     0     0
          sda       ONLINE       0     0     0

errors: No known data errors
";

    fn make_zfs(runner: &Arc<ScriptedRunner>) -> Zfs {
        let vault = Arc::new(IdentifierVault::new(b"test-session-key").unwrap());
        let config = ZfsConfig {
            sudo: Some("/usr/bin/sudo".to_owned()),
            ..ZfsConfig::default()
        };
        Zfs::new(Arc::clone(runner) as Arc<dyn CommandRunner>, vault, config)
    }

    fn script_pool(runner: &ScriptedRunner) {
        runner.on_success(&["/sbin/zpool", "status", "tank"], STATUS);
        runner.on_success(
            &[
                "/sbin/zpool", "list", "-p", "-H", "-o",
                "name,health,capacity,free,size,fragmentation,ashift", "tank",
            ],
            "tank\tONLINE\t3\t960000000\t1000000000\t1\t12\n",
        );
    }

    // ── stderr adapters ──────────────────────────────────────────────

    #[test]
    fn adapters_match_known_messages() {
        assert!(is_incorrect_key("Key load error: Incorrect key provided for 'tank/secret'."));
        assert!(is_key_already_loaded("Key load error: Key already loaded for 'tank/secret'."));
        assert!(is_dataset_busy("Key unload error: 'tank/secret' is busy."));
        assert!(is_key_not_loaded("cannot mount 'tank/secret': encryption key not loaded"));
        assert!(!is_incorrect_key("permission denied"));
    }

    // ── Listing ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn no_pools_sentinel_means_empty() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zpool", "list", "-p", "-H", "-o", "name"], "no pools available\n");
        let zfs = make_zfs(&runner);
        assert!(zfs.list_pools().await.unwrap().is_empty());
        assert!(zfs.pools().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pools_carry_properties() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zpool", "list", "-p", "-H", "-o", "name"], "tank\n\n");
        script_pool(&runner);
        let zfs = make_zfs(&runner);

        let pools = zfs.pools().await.unwrap();
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].name, "tank");
        assert_eq!(pools[0].properties.value("capacity"), Some("3"));
        assert!(pools[0].properties.get("name").unwrap().token.is_some());
        assert!(pools[0].datasets.is_empty());
    }

    #[tokio::test]
    async fn status_sanitizes_pool_name() {
        let runner = Arc::new(ScriptedRunner::new());
        script_pool(&runner);
        let zfs = make_zfs(&runner);

        let pool = zfs.pool_status("tank; reboot").await;
        assert!(pool.is_err(), "tankreboot is not scripted");
        assert_eq!(runner.calls()[0].argv, ["/sbin/zpool", "status", "tankreboot"]);

        assert!(matches!(zfs.pool_status("../").await, Err(ZfsError::InvalidName)));
    }

    #[tokio::test]
    async fn every_pool_command_gets_the_sanitized_name() {
        let runner = Arc::new(ScriptedRunner::new());
        script_pool(&runner);
        runner.on_success(
            &[
                "/sbin/zfs", "list", "-p", "-H", "-o",
                "name,used,avail,encryption,keystatus,mounted,usedsnap,usedds",
                "-t", "filesystem", "-r", "tank",
            ],
            "tank\t1\t2\toff\t-\tyes\t0\t1\n",
        );
        runner.on_success(
            &["/sbin/zfs", "list", "-p", "-H", "-o", "name,used,avail,refer", "-t", "snapshot", "-r", "tank"],
            "",
        );
        let zfs = make_zfs(&runner);

        let pool = zfs.pool("ta;n$()k").await.unwrap();
        assert_eq!(pool.properties.value("health"), Some("ONLINE"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 4);
        for call in calls {
            assert_eq!(call.argv.last().map(String::as_str), Some("tank"), "{:?}", call.argv);
        }

        assert!(matches!(zfs.pool_summary("$()").await, Err(ZfsError::InvalidName)));
        assert_eq!(runner.calls().len(), 4);
    }

    #[tokio::test]
    async fn pool_detail_lists_datasets_and_snapshots() {
        let runner = Arc::new(ScriptedRunner::new());
        script_pool(&runner);
        runner.on_success(
            &[
                "/sbin/zfs", "list", "-p", "-H", "-o",
                "name,used,avail,encryption,keystatus,mounted,usedsnap,usedds",
                "-t", "filesystem", "-r", "tank",
            ],
            "tank\t1\t2\toff\t-\tyes\t0\t1\ntank/home\t1\t2\taes-256-gcm\tavailable\tyes\t0\t1\n",
        );
        runner.on_success(
            &["/sbin/zfs", "list", "-p", "-H", "-o", "name,used,avail,refer", "-t", "snapshot", "-r", "tank"],
            "tank/home@monday\t0\t-\t1\n",
        );
        let zfs = make_zfs(&runner);

        let pool = zfs.pool("tank").await.unwrap();
        assert_eq!(pool.datasets.len(), 2);
        assert_eq!(pool.datasets[1].value("keystatus"), Some("available"));
        assert_eq!(pool.snapshots.len(), 1);
        assert_eq!(pool.containers.len(), 2);
    }

    #[tokio::test]
    async fn data_info_collects_type_and_keylocation() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zfs", "list", "-p", "-H", "-o", "type", "tank/home"], "filesystem\n");
        runner.on_success(
            &[
                "/sbin/zfs", "list", "-p", "-H", "-o",
                "name,used,avail,encryption,keystatus,mounted,usedsnap,usedds", "tank/home",
            ],
            "tank/home\t1\t2\taes-256-gcm\tunavailable\tno\t0\t1\n",
        );
        runner.on_success(&["/sbin/zfs", "list", "-p", "-H", "-o", "keylocation", "tank/home"], "prompt\n");
        let zfs = make_zfs(&runner);

        let info = zfs.data_info("tank/home").await.unwrap();
        assert_eq!(info.kind, "filesystem");
        assert_eq!(info.internal.value("keylocation"), Some("prompt"));
        assert_eq!(info.properties.value("keystatus"), Some("unavailable"));
    }

    #[tokio::test]
    async fn data_info_without_type_is_an_error() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zfs", "list", "-p", "-H", "-o", "type", "tank/x"], "");
        let zfs = make_zfs(&runner);
        assert!(matches!(
            zfs.data_info("tank/x").await,
            Err(ZfsError::MissingProperty { .. })
        ));
    }

    #[tokio::test]
    async fn version_is_first_line() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zpool", "version"], "zfs-2.1.5-1\nzfs-kmod-2.1.5-1\n");
        let zfs = make_zfs(&runner);
        assert_eq!(zfs.version().await.unwrap(), "zfs-2.1.5-1");
    }

    // ── Keys ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn passphrase_goes_to_stdin_only() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zfs", "load-key", "tank/secret"], "");
        let zfs = make_zfs(&runner);

        assert_eq!(zfs.load_key("tank/secret", "hunter22").await.unwrap(), KeyLoad::Loaded);
        let call = &runner.calls()[0];
        assert!(!call.argv.iter().any(|a| a.contains("hunter22")));
        assert_eq!(call.stdin.as_deref(), Some(&b"hunter22"[..]));
    }

    #[tokio::test]
    async fn load_key_maps_known_failures() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_failure(
            &["/sbin/zfs", "load-key", "tank/a"],
            "Key load error: Incorrect key provided for 'tank/a'.",
        );
        runner.on_failure(
            &["/sbin/zfs", "load-key", "tank/b"],
            "Key load error: Key already loaded for 'tank/b'.",
        );
        runner.on_failure(&["/sbin/zfs", "load-key", "tank/c"], "something else");
        let zfs = make_zfs(&runner);

        assert!(matches!(zfs.load_key("tank/a", "x").await, Err(ZfsError::IncorrectKey)));
        assert_eq!(zfs.load_key("tank/b", "x").await.unwrap(), KeyLoad::AlreadyLoaded);
        assert!(matches!(zfs.load_key("tank/c", "x").await, Err(ZfsError::Command(_))));
    }

    #[tokio::test]
    async fn unload_busy_dataset() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_failure(&["/sbin/zfs", "unload-key", "tank/a"], "Key unload error: 'tank/a' is busy.");
        let zfs = make_zfs(&runner);
        assert!(matches!(zfs.unload_key("tank/a").await, Err(ZfsError::DatasetBusy)));
    }

    // ── Privileged operations ────────────────────────────────────────

    #[tokio::test]
    async fn mount_goes_through_sudo() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/usr/bin/sudo", "-n", "/sbin/zfs", "mount", "tank/a"], "");
        runner.on_failure(
            &["/usr/bin/sudo", "-n", "/sbin/zfs", "mount", "tank/b"],
            "cannot mount 'tank/b': encryption key not loaded",
        );
        let zfs = make_zfs(&runner);

        zfs.mount("tank/a").await.unwrap();
        assert!(matches!(zfs.mount("tank/b").await, Err(ZfsError::KeyNotLoaded)));
    }

    #[tokio::test]
    async fn scrub_and_pause_without_sudo() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_success(&["/sbin/zpool", "scrub", "tank"], "");
        runner.on_success(&["/sbin/zpool", "scrub", "-p", "tank"], "");
        let vault = Arc::new(IdentifierVault::new(b"k").unwrap());
        let zfs = Zfs::new(Arc::clone(&runner) as Arc<dyn CommandRunner>, vault, ZfsConfig::default());

        zfs.scrub("tank").await.unwrap();
        zfs.pause_scrub("tank").await.unwrap();
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn unmount_failure_is_generic() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.on_failure(
            &["/usr/bin/sudo", "-n", "/sbin/zfs", "unmount", "tank/a"],
            "cannot unmount '/tank/a': pool or dataset is busy",
        );
        let zfs = make_zfs(&runner);
        assert!(matches!(zfs.unmount("tank/a").await, Err(ZfsError::Command(_))));
    }
}
