mod gate;
mod vote;

pub use vote::SubmitOutcome;

use crate::config::ViewKind;
use crate::db::LocalFlagStore;
use crate::error::{Result, VoteError};
use crate::models::{OptionId, VoteInserted};
use crate::service::VoteStore;
use crate::tasks::debounce::Debouncer;
use crate::voting::Tally;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};
use std::future;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

const COMMAND_CAPACITY: usize = 16;

/// What a view shows at a point in time. Published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub kind: ViewKind,
    pub tally: Tally,
    pub voted: bool,
    pub submitting: bool,
    /// Set once the first aggregation pass has finished, successfully or not.
    pub loaded: bool,
    /// Most recent vote write failure, cleared by a successful vote.
    pub last_error: Option<String>,
}

enum Command {
    Vote {
        option: OptionId,
        reply: oneshot::Sender<Result<SubmitOutcome>>,
    },
    Refresh,
}

/// Everything a view needs to run; mounted once per page.
pub struct View {
    pub kind: ViewKind,
    pub debounce: Duration,
    pub fingerprint: String,
    pub store: Arc<dyn VoteStore>,
    pub flags: Arc<dyn LocalFlagStore>,
}

impl View {
    /// Spawns the session task. All tally and voted-state mutation happens on
    /// that task; callers see it through `Snapshot`s.
    pub fn mount(
        self,
        changes: broadcast::Receiver<VoteInserted>,
        stop: CancellationToken,
    ) -> ViewHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
        let debouncer = Debouncer::new(self.debounce);
        let session = Session::new(self);
        let state = session.state.subscribe();

        let task = tokio::spawn(session.run(commands_rx, changes, debouncer, stop.clone()));

        ViewHandle {
            commands: commands_tx,
            state,
            _guard: stop.clone().drop_guard(),
            stop,
            task,
        }
    }
}

pub struct ViewHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<Snapshot>,
    stop: CancellationToken,
    // Dropping the handle tears the view down.
    _guard: DropGuard,
    task: JoinHandle<()>,
}

impl ViewHandle {
    pub async fn vote(&self, option: OptionId) -> Result<SubmitOutcome> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Vote { option, reply })
            .await
            .map_err(|_| VoteError::SessionClosed)?;
        response.await.map_err(|_| VoteError::SessionClosed)?
    }

    pub async fn refresh(&self) -> Result<()> {
        self.commands
            .send(Command::Refresh)
            .await
            .map_err(|_| VoteError::SessionClosed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.clone()
    }

    pub async fn wait_until<F>(&self, predicate: F) -> Result<Snapshot>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(predicate)
            .await
            .map_err(|_| VoteError::SessionClosed)?
            .clone();
        Ok(snapshot)
    }

    /// Stops the session and anything sharing its stop token (the change feed).
    pub async fn shutdown(self) {
        let ViewHandle { stop, task, .. } = self;
        stop.cancel();
        if let Err(e) = task.await {
            warn!("View session ended abnormally: {}", e);
        }
    }
}

struct Session {
    view: View,
    tally: Tally,
    voted: bool,
    loaded: bool,
    last_error: Option<String>,
    submission: Option<BoxFuture<'static, vote::Stage>>,
    refresh: Option<BoxFuture<'static, Result<Vec<i64>>>>,
    refresh_again: bool,
    /// Bumped every time a recompute replaces the tally.
    aggregations: u64,
    state: watch::Sender<Snapshot>,
}

impl Session {
    fn new(view: View) -> Self {
        let (state, _) = watch::channel(Snapshot {
            kind: view.kind,
            tally: Tally::default(),
            voted: false,
            submitting: false,
            loaded: false,
            last_error: None,
        });
        Self {
            view,
            tally: Tally::default(),
            voted: false,
            loaded: false,
            last_error: None,
            submission: None,
            refresh: None,
            refresh_again: false,
            aggregations: 0,
            state,
        }
    }

    fn publish(&self) {
        self.state.send_replace(Snapshot {
            kind: self.view.kind,
            tally: self.tally,
            voted: self.voted,
            submitting: self.submission.is_some(),
            loaded: self.loaded,
            last_error: self.last_error.clone(),
        });
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut changes: broadcast::Receiver<VoteInserted>,
        mut debouncer: Debouncer,
        stop: CancellationToken,
    ) {
        tokio::select! {
            _ = stop.cancelled() => return,
            _ = self.open_gate() => {}
        }
        self.start_refresh();

        let mut feed_open = true;
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                command = commands.recv() => {
                    match command {
                        Some(Command::Vote { option, reply }) => self.begin_vote(option, reply).await,
                        Some(Command::Refresh) => self.start_refresh(),
                        None => break,
                    }
                }
                stage = next(&mut self.submission) => self.advance_submission(stage).await,
                result = next(&mut self.refresh) => self.finish_refresh(result),
                event = changes.recv(), if feed_open => {
                    match event {
                        Ok(event) => {
                            if let Some(record) = &event.record {
                                debug!(
                                    "Vote {:?} inserted for option {} at {:?}",
                                    record.id, record.option_id, record.created_at
                                );
                            }
                            debouncer.arm();
                        }
                        Err(RecvError::Lagged(missed)) => {
                            debug!("Change feed lagged by {} notifications", missed);
                            debouncer.arm();
                        }
                        Err(RecvError::Closed) => {
                            warn!("Change feed closed; tally will only update on demand");
                            feed_open = false;
                        }
                    }
                }
                _ = debouncer.fired() => {
                    debug!("Change feed quiet for {:?}, re-aggregating", debouncer.window());
                    self.start_refresh();
                }
            }
        }

        info!("{:?} view torn down", self.view.kind);
    }

    fn start_refresh(&mut self) {
        if self.refresh.is_some() {
            self.refresh_again = true;
            return;
        }
        let store = Arc::clone(&self.view.store);
        self.refresh = Some(async move { store.option_ids().await }.boxed());
    }

    fn finish_refresh(&mut self, result: Result<Vec<i64>>) {
        match result {
            Ok(option_ids) => {
                self.tally = Tally::from_option_ids(option_ids);
                self.aggregations += 1;
                debug!("Tally recomputed: {} votes", self.tally.total());
            }
            Err(e) => warn!("Error loading vote counts: {}", e),
        }
        self.loaded = true;
        self.publish();

        if mem::take(&mut self.refresh_again) {
            self.start_refresh();
        }
    }
}

/// Drives the future in `slot` to completion and empties the slot. Pending
/// forever when the slot is empty. Dropping this mid-way leaves the future
/// in place to be resumed.
async fn next<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot.as_mut() {
        Some(pending) => {
            let output = pending.await;
            *slot = None;
            output
        }
        None => future::pending().await,
    }
}
