use super::Session;
use log::{info, warn};

impl Session {
    /// Decides once per mount whether this fingerprint has already voted.
    /// A failed remote lookup counts as "not found" and leaves the local flag
    /// as the only signal.
    pub(super) async fn open_gate(&mut self) {
        let remote = match self.view.store.find_vote(&self.view.fingerprint).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Error checking voting status: {}", e);
                false
            }
        };

        let local = match self.view.flags.has_voted().await {
            Ok(voted) => voted,
            Err(e) => {
                warn!("Error reading local vote flag: {}", e);
                false
            }
        };

        if remote || local {
            info!(
                "Fingerprint {} has already voted (remote: {}, local: {})",
                self.view.fingerprint, remote, local
            );
            self.voted = true;
        }
        self.publish();
    }
}
