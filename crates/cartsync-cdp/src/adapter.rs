//! List access adapter: domain operations over page scripts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cartsync_core::{Item, Side, Snapshot, normalize};
use cartsync_settings::RemoteSettings;
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::selectors::{PageItem, ScriptReply, SelectorStrategy};
use crate::traits::{ListAccess, PageEvaluator, RemoteList};

/// [`ListAccess`] implementation driving the list page through scripts.
pub struct PageListAdapter {
    evaluator: Arc<dyn PageEvaluator>,
    strategy: Arc<dyn SelectorStrategy>,
    confirm_attempts: u32,
    confirm_interval: Duration,
}

impl PageListAdapter {
    /// Create an adapter with default confirmation polling.
    pub fn new(evaluator: Arc<dyn PageEvaluator>, strategy: Arc<dyn SelectorStrategy>) -> Self {
        Self::from_settings(evaluator, strategy, &RemoteSettings::default())
    }

    /// Create an adapter using the confirmation bounds in `remote`.
    pub fn from_settings(
        evaluator: Arc<dyn PageEvaluator>,
        strategy: Arc<dyn SelectorStrategy>,
        remote: &RemoteSettings,
    ) -> Self {
        Self {
            evaluator,
            strategy,
            confirm_attempts: remote.confirm_attempts.max(1),
            confirm_interval: Duration::from_millis(remote.confirm_interval_ms),
        }
    }

    /// Override confirmation polling.
    #[must_use]
    pub fn with_confirmation(mut self, attempts: u32, interval: Duration) -> Self {
        self.confirm_attempts = attempts.max(1);
        self.confirm_interval = interval;
        self
    }

    async fn run(&self, script: &str) -> Result<ScriptReply, RemoteError> {
        let value = self.evaluator.evaluate(script).await?;
        let reply: ScriptReply = serde_json::from_value(value)
            .map_err(|e| RemoteError::PageStructure(format!("unrecognized script result: {e}")))?;
        match reply {
            ScriptReply::Login { url } => Err(RemoteError::AuthenticationRequired { url }),
            ScriptReply::Missing { detail } => Err(RemoteError::PageStructure(format!("not found: {detail}"))),
            other => Ok(other),
        }
    }

    /// Every row on the page, ticked ones included.
    pub async fn read_rows(&self) -> Result<Vec<PageItem>, RemoteError> {
        match self.run(&self.strategy.read_script()).await? {
            ScriptReply::Ok { items } => Ok(items),
            other => Err(unexpected("read", &other)),
        }
    }

    /// Capture the remote snapshot.
    pub async fn read_snapshot(&self) -> Result<Snapshot, RemoteError> {
        Ok(Snapshot::capture(Side::Remote, self.read_items().await?))
    }

    async fn is_listed(&self, key: &str) -> Result<bool, RemoteError> {
        Ok(self.read_items().await?.iter().any(|i| i.key == key))
    }
}

fn unexpected(op: &str, reply: &ScriptReply) -> RemoteError {
    RemoteError::PageStructure(format!("unexpected reply to {op}: {reply:?}"))
}

#[async_trait]
impl ListAccess for PageListAdapter {
    async fn read_items(&self) -> Result<Vec<Item>, RemoteError> {
        Ok(self.read_list().await?.open)
    }

    async fn read_list(&self) -> Result<RemoteList, RemoteError> {
        let mut list = RemoteList::default();
        for row in self.read_rows().await? {
            let item = Item::new(row.name);
            if row.completed {
                list.ticked.push(item);
            } else {
                list.open.push(item);
            }
        }
        debug!(open = list.open.len(), ticked = list.ticked.len(), "read remote list");
        Ok(list)
    }

    async fn add_item(&self, name: &str) -> Result<(), RemoteError> {
        let key = normalize(name);
        if key.is_empty() {
            return Err(RemoteError::Evaluation("refusing to add an empty item".into()));
        }
        if self.is_listed(&key).await? {
            debug!(item = name, "already on remote list, not adding");
            return Ok(());
        }

        match self.run(&self.strategy.add_script(name)).await? {
            ScriptReply::Submitted => {}
            other => return Err(unexpected("add", &other)),
        }

        for attempt in 1..=self.confirm_attempts {
            tokio::time::sleep(self.confirm_interval).await;
            if self.is_listed(&key).await? {
                info!(item = name, attempt, "added to remote list");
                return Ok(());
            }
        }
        Err(RemoteError::PageStructure(format!(
            "'{name}' not listed after {} confirmation reads",
            self.confirm_attempts
        )))
    }

    async fn remove_item(&self, name: &str) -> Result<bool, RemoteError> {
        match self.run(&self.strategy.remove_script(name)).await? {
            ScriptReply::Removed => {
                info!(item = name, "removed from remote list");
                Ok(true)
            }
            ScriptReply::Absent => {
                debug!(item = name, "not on remote list, nothing to remove");
                Ok(false)
            }
            other => Err(unexpected("remove", &other)),
        }
    }
}
