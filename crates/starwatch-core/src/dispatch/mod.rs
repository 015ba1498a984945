//! Per-item fan-out across the active connector set
//!
//! For each newly detected repository the dispatcher renders the canonical
//! message once, builds one [`Envelope`], and invokes `safe_post` on every
//! active connector in turn. There is no item-level transaction: a subset
//! of connectors may succeed while others fail, and nothing is retried
//! within the cycle.

use tracing::{debug, info, warn};

use crate::template::MessageTemplate;
use crate::traits::connector::{Connector, Envelope, PostOutcome};
use crate::traits::snapshot_source::Repo;

/// Per-connector delivery record for one item, kept for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Connector name
    pub connector: &'static str,
    /// What happened
    pub outcome: PostOutcome,
}

/// Builds envelopes and fans them out.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    template: MessageTemplate,
}

impl Dispatcher {
    pub fn new(template: MessageTemplate) -> Self {
        Self { template }
    }

    /// Fan one newly starred repository out to every active connector.
    ///
    /// The envelope (message + metadata + handles map) is built once and
    /// shared across the whole fan-out, so a connector that writes its
    /// created-message identifier into the handles makes it visible to the
    /// connectors that follow within this item only.
    pub async fn dispatch(
        &self,
        connectors: &[Box<dyn Connector>],
        repo: &Repo,
    ) -> Vec<DispatchOutcome> {
        let message = self.template.render(repo);
        let mut envelope = Envelope::new(message, repo.clone());

        let mut outcomes = Vec::with_capacity(connectors.len());
        for connector in connectors {
            let outcome = connector.safe_post(&mut envelope).await;
            match outcome {
                PostOutcome::Delivered => {
                    info!(connector = connector.name(), repo = %repo.full_name, "posted");
                }
                PostOutcome::Failed => {
                    warn!(connector = connector.name(), repo = %repo.full_name, "post failed");
                }
                PostOutcome::Skipped => {
                    debug!(connector = connector.name(), repo = %repo.full_name, "skipped");
                }
            }
            outcomes.push(DispatchOutcome {
                connector: connector.name(),
                outcome,
            });
        }

        outcomes
    }
}
