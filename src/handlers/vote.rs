use super::Session;
use crate::config::ViewKind;
use crate::error::{Result, VoteError};
use crate::models::{BallotOption, NewVote, OptionId};
use futures::future::FutureExt;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The vote was written and the session is now closed to voting.
    Recorded,
    /// Nothing was written because this device already voted.
    AlreadyVoted,
    /// Another submission from this view is still in flight.
    Busy,
}

type Reply = oneshot::Sender<Result<SubmitOutcome>>;

/// Progress of the single in-flight submission.
pub(super) enum Stage {
    Checked {
        option: OptionId,
        reply: Reply,
        found: Result<bool>,
    },
    Inserted {
        option: OptionId,
        reply: Reply,
        /// Aggregation count when the optimistic increment was applied.
        counted_at: u64,
        result: Result<()>,
    },
}

impl Session {
    pub(super) async fn begin_vote(&mut self, option: OptionId, reply: Reply) {
        if self.view.kind == ViewKind::Results {
            let _ = reply.send(Err(VoteError::ReadOnlyView));
            return;
        }
        if BallotOption::find(option).is_none() {
            let _ = reply.send(Err(VoteError::UnknownOption(option.0)));
            return;
        }
        if self.voted {
            let _ = reply.send(Ok(SubmitOutcome::AlreadyVoted));
            return;
        }
        if self.submission.is_some() {
            let _ = reply.send(Ok(SubmitOutcome::Busy));
            return;
        }

        match self.view.flags.has_voted().await {
            Ok(true) => {
                self.voted = true;
                self.publish();
                let _ = reply.send(Ok(SubmitOutcome::AlreadyVoted));
                return;
            }
            Ok(false) => {}
            Err(e) => warn!("Error reading local vote flag: {}", e),
        }

        let store = Arc::clone(&self.view.store);
        let fingerprint = self.view.fingerprint.clone();
        self.submission = Some(
            async move {
                let found = store.find_vote(&fingerprint).await;
                Stage::Checked { option, reply, found }
            }
            .boxed(),
        );
        self.publish();
    }

    pub(super) async fn advance_submission(&mut self, stage: Stage) {
        match stage {
            Stage::Checked { option, reply, found } => {
                let found = found.unwrap_or_else(|e| {
                    warn!("Error re-checking voting status: {}", e);
                    false
                });
                if found {
                    info!("Vote already recorded for this device, not submitting");
                    self.voted = true;
                    self.publish();
                    let _ = reply.send(Ok(SubmitOutcome::AlreadyVoted));
                    return;
                }

                // Shown immediately; the next aggregation pass replaces it.
                self.tally.increment(option);

                let counted_at = self.aggregations;
                let store = Arc::clone(&self.view.store);
                let vote = NewVote::new(option, &self.view.fingerprint);
                self.submission = Some(
                    async move {
                        let result = store.insert_vote(vote).await;
                        Stage::Inserted {
                            option,
                            reply,
                            counted_at,
                            result,
                        }
                    }
                    .boxed(),
                );
                self.publish();
            }
            Stage::Inserted {
                option,
                reply,
                result: Ok(()),
                ..
            } => {
                if let Err(e) = self.view.flags.mark_voted().await {
                    warn!("Vote recorded but local flag could not be saved: {}", e);
                }
                info!("Vote recorded for option {}", option);
                self.voted = true;
                self.last_error = None;
                self.publish();
                let _ = reply.send(Ok(SubmitOutcome::Recorded));
            }
            Stage::Inserted {
                option,
                reply,
                counted_at,
                result: Err(e),
            } => {
                error!("Error submitting vote: {}", e);
                if self.aggregations == counted_at {
                    self.tally.decrement(option);
                } else {
                    // A recompute already dropped the optimistic vote.
                    self.start_refresh();
                }
                self.last_error = Some(e.to_string());
                self.publish();
                let _ = reply.send(Err(e));
            }
        }
    }
}
