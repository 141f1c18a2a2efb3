//! Watch mode
//!
//! A polling watcher reports file-system changes every `poll` milliseconds.
//! Changes are coalesced until `aggregate_timeout` has passed since the
//! last one, then exactly one rebuild runs.

mod aggregate;

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use colored::Colorize;
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::bundler::{BuildResult, Bundler};
use crate::error::{Error, Result};

pub use aggregate::ChangeAggregator;

/// Errors that stop a watch session
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("file watcher failed: {0}")]
    Notify(#[from] notify::Error),
}

/// Rebuilds the project whenever its sources change
pub struct WatchSession {
    bundler: Bundler,

    /// Files the last successful build wrote
    written: Mutex<HashSet<PathBuf>>,
}

impl WatchSession {
    pub fn new(bundler: Bundler) -> Self {
        Self {
            bundler,
            written: Mutex::new(HashSet::new()),
        }
    }

    /// Run the initial build.
    ///
    /// Only configuration errors are returned. A build that fails for any
    /// other reason is reported and yields `None`; the next change retries.
    pub async fn initial_build(&self) -> Result<Option<BuildResult>> {
        match self.bundler.build().await {
            Ok(result) => {
                self.remember_outputs(&result);
                Ok(Some(result))
            }
            Err(e @ Error::Configuration(_)) => Err(e),
            Err(e) => {
                eprintln!("  {} Build failed: {}", "✗".red(), e);
                Ok(None)
            }
        }
    }

    /// Watch the project directory until Ctrl+C
    pub async fn run(&self) -> Result<(), WatchError> {
        let config = self.bundler.config();
        let (tx, rx) = mpsc::unbounded_channel();

        let notify_config = notify::Config::default()
            .with_poll_interval(config.watch().poll_interval());

        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means the session ended
                let _ = tx.send(res);
            },
            notify_config,
        )?;
        watcher.watch(config.root(), RecursiveMode::Recursive)?;

        info!(
            "Watching {} (poll {}ms, aggregate {}ms)",
            config.root().display(),
            config.watch().poll_interval().as_millis(),
            config.watch().aggregate_timeout().as_millis()
        );

        self.run_loop(rx, tokio::signal::ctrl_c()).await;

        Ok(())
    }

    /// Drive rebuilds from `events` until `shutdown` completes or the
    /// channel closes. Returns the instants at which rebuilds started.
    pub async fn run_loop<F>(
        &self,
        mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
        shutdown: F,
    ) -> Vec<Instant>
    where
        F: Future,
    {
        let config = self.bundler.config();
        let mut aggregator = ChangeAggregator::new(config.watch().aggregate_timeout());
        let mut rebuilds = Vec::new();

        tokio::pin!(shutdown);

        loop {
            // Disabled branches still build their future, so always give it a time
            let wake_at = aggregator
                .deadline()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Watch session stopped");
                    break;
                }
                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        if self.is_relevant(&event) {
                            debug!("Change detected: {:?}", event.paths);
                            aggregator.record(Instant::now());
                        }
                    }
                    Some(Err(e)) => error!("Watch error: {:?}", e),
                    None => break,
                },
                _ = sleep_until(wake_at), if aggregator.deadline().is_some() => {
                    if let Some(changes) = aggregator.take_due(Instant::now()) {
                        rebuilds.push(Instant::now());
                        self.rebuild(changes).await;
                    }
                }
            }
        }

        rebuilds
    }

    async fn rebuild(&self, changes: usize) {
        eprintln!(
            "  {} {} change(s) detected, rebuilding...",
            "↻".yellow(),
            changes
        );

        match self.bundler.build().await {
            Ok(result) => {
                self.remember_outputs(&result);
                eprintln!(
                    "  {} Rebuilt {} module(s) in {}",
                    "✓".green(),
                    result.modules,
                    crate::utils::format_duration(result.duration).dimmed()
                );
            }
            // A broken edit is fixed by the next change, keep watching
            Err(e) => eprintln!("  {} Rebuild failed: {}", "✗".red(), e),
        }
    }

    fn remember_outputs(&self, result: &BuildResult) {
        *self.written.lock() = result.files().map(|f| f.output_path.clone()).collect();
    }

    /// Ignore reads, the build's own outputs and anything in an output
    /// directory nested under the project root
    fn is_relevant(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }

        let config = self.bundler.config();
        let nested_output = Some(config.output_dir())
            .filter(|out| *out != config.root() && out.starts_with(config.root()));
        let written = self.written.lock();

        event.paths.iter().any(|p| {
            !written.contains(p) && !nested_output.is_some_and(|out| p.starts_with(out))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use notify::event::{AccessKind, ModifyKind};

    use crate::config::RawConfig;

    fn modify(path: PathBuf) -> notify::Result<Event> {
        Ok(Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path))
    }

    fn session_with(dir: &Path, config: &str, entry_source: &str) -> WatchSession {
        fs::write(dir.join("bootstrap.js"), entry_source).unwrap();
        let config = RawConfig::from_toml(config).unwrap().resolve(dir).unwrap();
        WatchSession::new(Bundler::new(Arc::new(config)).unwrap())
    }

    fn session(dir: &Path) -> WatchSession {
        session_with(
            dir,
            "entry = \"bootstrap.js\"\n[watch_options]\naggregate_timeout = 200\npoll = 200\n",
            "console.log(1);",
        )
    }

    #[test]
    fn test_is_relevant() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());

        assert!(session.is_relevant(&modify(dir.path().join("index.js")).unwrap()));
        assert!(!session.is_relevant(&modify(dir.path().join("dist/main.js")).unwrap()));

        let read = Event::new(EventKind::Access(AccessKind::Any)).add_path(dir.path().join("a.js"));
        assert!(!session.is_relevant(&read));
    }

    #[tokio::test]
    async fn test_output_dir_equal_to_root_ignores_only_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(
            dir.path(),
            "entry = \"bootstrap.js\"\noutput = { path = \".\", filename = \"bundle.js\" }\n",
            "console.log(1);",
        );

        session.initial_build().await.unwrap().unwrap();

        assert!(session.is_relevant(&modify(dir.path().join("bootstrap.js")).unwrap()));
        assert!(!session.is_relevant(&modify(dir.path().join("bundle.js")).unwrap()));
    }

    #[tokio::test]
    async fn test_failed_initial_build_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(
            dir.path(),
            "entry = \"bootstrap.js\"\n[watch_options]\naggregate_timeout = 0\npoll = 10\n",
            "import * as wasm from './pkg/index_bg.wasm';",
        );

        assert!(session.initial_build().await.unwrap().is_none());
        assert!(!dir.path().join("dist/main.js").exists());
    }

    #[tokio::test]
    async fn test_missing_entry_stops_the_initial_build() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        fs::remove_file(dir.path().join("bootstrap.js")).unwrap();

        let err = session.initial_build().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_triggers_one_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (tx, rx) = mpsc::unbounded_channel();
        let source = dir.path().join("bootstrap.js");

        let sender = tokio::spawn(async move {
            let mut last = Instant::now();
            for delay in [0, 20, 25] {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                last = Instant::now();
                tx.send(modify(source.clone())).unwrap();
            }
            // Keep the channel open until the session shuts down
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(tx);
            last
        });

        let rebuilds = session
            .run_loop(rx, tokio::time::sleep(Duration::from_secs(2)))
            .await;
        let last_change = sender.await.unwrap();

        assert_eq!(rebuilds.len(), 1);
        assert!(rebuilds[0] >= last_change + Duration::from_millis(200));
        assert!(dir.path().join("dist/main.js").is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_output_changes_do_not_trigger_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(modify(dir.path().join("dist/main.js"))).unwrap();

        let rebuilds = session
            .run_loop(rx, tokio::time::sleep(Duration::from_secs(1)))
            .await;

        assert!(rebuilds.is_empty());
        drop(tx);
    }
}
