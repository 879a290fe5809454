//! The polling and reconciliation loop of one client session.
//!
//! A session fetches the queue once, retrying on each tick until that
//! succeeds, then keeps polling cursor and machine status on a fixed interval. Actions are never applied locally: each one
//! is sent to the daemon and followed by an immediate re-poll, so the view
//! only ever shows daemon-confirmed state. The one exception is a pending
//! cursor edit, which is displayed locally and pauses polling until it is
//! committed or cancelled.

use std::future::Future;
use std::time::Duration;

use ayab_proto::{
    CursorAction, CursorState, DaemonAction, DaemonReply, MachineAction, MachineParams,
    MachineStatus, PlatformAction, QueueAction, QueueState, RESOURCE_CURSOR, RESOURCE_MACHINE,
    RESOURCE_QUEUE,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::schedule::{PollSchedule, sleep_until_deadline};
use crate::transport::{BridgeApi, DEFAULT_FETCH_TIMEOUT, SyncError};
use crate::view::{ClientViewModel, PendingCursorEdit};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Requests a UI (or CLI) can make of a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    RefreshQueue,
    ProposeCursor(u64),
    CommitCursor { boundary: bool },
    CancelEdit,
    RemoveEntry { index: usize, delete: bool },
    AddFile { file_path: String, web_url: String },
    ApplyParams(MachineParams),
    RestartMachine,
    RestartPlatform { shutdown: bool },
}

pub struct Synchronizer<A> {
    api: A,
    config: SyncConfig,
    view: ClientViewModel,
    schedule: PollSchedule,
    /// Set while the last queue fetch failed; the next tick retries it.
    queue_stale: bool,
}

impl<A: BridgeApi> Synchronizer<A> {
    pub fn new(api: A, config: SyncConfig) -> Self {
        Self {
            api,
            config,
            view: ClientViewModel::default(),
            schedule: PollSchedule::default(),
            queue_stale: true,
        }
    }

    #[must_use]
    pub fn view(&self) -> &ClientViewModel {
        &self.view
    }

    #[must_use]
    pub fn schedule(&self) -> &PollSchedule {
        &self.schedule
    }

    /// Fetches the queue and chains the cursor and status fetch.
    pub async fn refresh_queue(&mut self) -> Result<(), SyncError> {
        match self.fetch::<QueueState>(RESOURCE_QUEUE).await {
            Ok(state) => {
                self.queue_stale = false;
                self.view.apply_queue(state);
                self.refresh_cursor().await
            }
            Err(error) => {
                self.queue_stale = true;
                debug!(
                    resource = RESOURCE_QUEUE,
                    error_kind = error.kind(),
                    error = %error,
                    "queue poll failed"
                );
                self.reschedule();
                Err(error)
            }
        }
    }

    /// One poll tick: cursor, then machine status, then arm the next tick.
    /// The next tick is armed whether or not the fetches succeeded.
    pub async fn refresh_cursor(&mut self) -> Result<(), SyncError> {
        let result = match self.fetch::<CursorState>(RESOURCE_CURSOR).await {
            Ok(cursor) => {
                self.view.apply_cursor(cursor);
                self.refresh_machine().await
            }
            Err(error) => {
                // Status was not re-read this tick; it cannot be shown as ready.
                self.view.mark_machine_stale();
                debug!(
                    resource = RESOURCE_CURSOR,
                    error_kind = error.kind(),
                    error = %error,
                    "cursor poll failed"
                );
                Err(error)
            }
        };
        self.reschedule();
        result
    }

    pub async fn refresh_machine(&mut self) -> Result<(), SyncError> {
        match self.fetch::<MachineStatus>(RESOURCE_MACHINE).await {
            Ok(status) => {
                self.view.apply_machine(status);
                Ok(())
            }
            Err(error) => {
                self.view.mark_machine_stale();
                debug!(
                    resource = RESOURCE_MACHINE,
                    error_kind = error.kind(),
                    error = %error,
                    "machine status poll failed"
                );
                Err(error)
            }
        }
    }

    /// Runs the poll tick if its deadline has passed. Returns whether it ran.
    ///
    /// The tick re-reads cursor and status, or the whole queue while the
    /// last queue fetch has not succeeded.
    pub async fn poll_if_due(&mut self) -> bool {
        if !self.schedule.take_due(tokio::time::Instant::now()) {
            return false;
        }
        let _ = if self.queue_stale {
            self.refresh_queue().await
        } else {
            self.refresh_cursor().await
        };
        true
    }

    /// Shows `position` locally and stops polling; nothing is sent yet.
    pub fn propose_cursor(&mut self, position: u64) {
        self.schedule.cancel();
        self.view.pending_edit = Some(PendingCursorEdit { position });
    }

    /// Sends the pending edit. On acknowledgement the edit is dropped and the
    /// cursor is re-polled at once. On failure the edit stays pending and
    /// polling stays paused. Returns `false` when there was nothing to commit.
    pub async fn commit_cursor(&mut self, boundary: bool) -> Result<bool, SyncError> {
        let Some(edit) = self.view.pending_edit else {
            return Ok(false);
        };
        self.schedule.cancel();
        let action = CursorAction {
            position: edit.position,
            boundary,
        };
        self.send(&action).await?;
        self.view.pending_edit = None;
        let _ = self.refresh_cursor().await;
        Ok(true)
    }

    /// Drops the pending edit and resumes the normal schedule. No network.
    pub fn cancel_edit(&mut self) {
        self.view.pending_edit = None;
        if !self.schedule.is_armed() {
            self.schedule.arm_after(self.config.poll_interval);
        }
    }

    pub async fn remove_entry(&mut self, index: usize, delete: bool) -> Result<(), SyncError> {
        self.send(&QueueAction::RemoveFile { index, delete })
            .await?;
        let _ = self.refresh_queue().await;
        Ok(())
    }

    pub async fn add_file(&mut self, file_path: String, web_url: String) -> Result<(), SyncError> {
        self.send(&QueueAction::AddFile { file_path, web_url })
            .await?;
        let _ = self.refresh_queue().await;
        Ok(())
    }

    /// Geometry changes are re-read from the daemon, never applied locally.
    pub async fn apply_params(&mut self, params: MachineParams) -> Result<(), SyncError> {
        self.send(&MachineAction::SetParams(params)).await?;
        let _ = self.refresh_queue().await;
        Ok(())
    }

    pub async fn restart_machine(&mut self) -> Result<(), SyncError> {
        self.send(&MachineAction::Restart).await?;
        let _ = self.refresh_machine().await;
        Ok(())
    }

    /// No re-poll: the host running the bridge may be going away.
    pub async fn restart_platform(&mut self, shutdown: bool) -> Result<(), SyncError> {
        let action = if shutdown {
            PlatformAction::Shutdown
        } else {
            PlatformAction::Restart
        };
        self.send(&action).await.map(|_| ())
    }

    pub async fn handle(&mut self, command: SyncCommand) -> Result<(), SyncError> {
        match command {
            SyncCommand::RefreshQueue => self.refresh_queue().await,
            SyncCommand::ProposeCursor(position) => {
                self.propose_cursor(position);
                Ok(())
            }
            SyncCommand::CommitCursor { boundary } => self.commit_cursor(boundary).await.map(|_| ()),
            SyncCommand::CancelEdit => {
                self.cancel_edit();
                Ok(())
            }
            SyncCommand::RemoveEntry { index, delete } => self.remove_entry(index, delete).await,
            SyncCommand::AddFile { file_path, web_url } => self.add_file(file_path, web_url).await,
            SyncCommand::ApplyParams(params) => self.apply_params(params).await,
            SyncCommand::RestartMachine => self.restart_machine().await,
            SyncCommand::RestartPlatform { shutdown } => self.restart_platform(shutdown).await,
        }
    }

    /// Drives a session until the command channel closes. Every change to
    /// the view is published on `updates`.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SyncCommand>,
        updates: watch::Sender<ClientViewModel>,
    ) -> ClientViewModel {
        let _ = self.refresh_queue().await;
        updates.send_replace(self.view.clone());

        loop {
            let deadline = self.schedule.deadline();
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    let is_poll = matches!(command, SyncCommand::RefreshQueue);
                    if let Err(error) = self.handle(command).await {
                        // Poll failures are already logged at debug by the fetch.
                        if !is_poll {
                            warn!(error_kind = error.kind(), error = %error, "daemon action failed");
                        }
                    }
                }
                () = sleep_until_deadline(deadline) => {
                    self.poll_if_due().await;
                }
            }
            updates.send_if_modified(|current| {
                if *current == self.view {
                    false
                } else {
                    current.clone_from(&self.view);
                    true
                }
            });
        }

        self.view
    }

    fn reschedule(&mut self) {
        if self.view.pending_edit.is_none() {
            self.schedule.arm_after(self.config.poll_interval);
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, resource: &str) -> Result<T, SyncError> {
        let value = self.bounded(self.api.get(resource)).await?;
        let reply: DaemonReply<T> =
            serde_json::from_value(value).map_err(|error| SyncError::Decode {
                message: error.to_string(),
            })?;
        Ok(reply.into_result()?)
    }

    async fn send<D: DaemonAction + Sync>(&self, action: &D) -> Result<Value, SyncError> {
        let resource = action.resource();
        let result = async {
            let value = self
                .bounded(self.api.post(resource, action.payload()))
                .await?;
            let reply: DaemonReply<Value> =
                serde_json::from_value(value).map_err(|error| SyncError::Decode {
                    message: error.to_string(),
                })?;
            Ok::<Value, SyncError>(reply.into_ack()?)
        }
        .await;
        if let Err(error) = &result {
            warn!(resource, error_kind = error.kind(), error = %error, "daemon action rejected");
        }
        result
    }

    async fn bounded<F>(&self, request: F) -> Result<Value, SyncError>
    where
        F: Future<Output = Result<Value, SyncError>>,
    {
        timeout(self.config.fetch_timeout, request)
            .await
            .map_err(|_| SyncError::Timeout)?
    }
}
