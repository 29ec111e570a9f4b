use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{ChatTransport, RequestOutcome, NETWORK_ERROR_MESSAGE};
use crate::transcript::{EntryId, Role, Transcript};

pub const PENDING_TEXT: &str = "...";

/// Identifies one submit → settle round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(u64);

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeOrdering {
    /// Every submit dispatches right away; replies render in arrival order
    #[default]
    Concurrent,
    /// One request in flight at a time; later submits wait their turn
    Serialized,
}

/// Terminal state of a sent exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    BotRendered,
    ProtocolErrorRendered,
    NetworkErrorRendered,
}

/// A request ready to go out on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub exchange: ExchangeId,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub exchange: ExchangeId,
    pub outcome: RequestOutcome,
}

/// What a submit did: nothing for blank input, otherwise the exchange was sent or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    NoOp,
    Dispatched(Dispatch),
    Queued(ExchangeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    /// Terminal state, or None for a settlement whose exchange is unknown
    pub state: Option<ExchangeState>,
    /// Next queued request released by this settlement
    pub next: Option<Dispatch>,
}

/// Bookkeeping for every outstanding exchange. The transcript itself is owned
/// by the caller and passed in, so each step stays a plain synchronous mutation.
#[derive(Debug, Default)]
pub struct Pipeline {
    ordering: ExchangeOrdering,
    next_exchange: u64,
    pending: HashMap<ExchangeId, EntryId>,
    queue: VecDeque<Dispatch>,
    in_flight: usize,
}

impl Pipeline {
    pub fn new(ordering: ExchangeOrdering) -> Self {
        Self {
            ordering,
            ..Self::default()
        }
    }

    pub fn ordering(&self) -> ExchangeOrdering {
        self.ordering
    }

    /// Exchanges submitted but not yet settled, queued ones included.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn submit(&mut self, transcript: &mut Transcript, raw: &str) -> Submission {
        let query = raw.trim();
        if query.is_empty() {
            debug!("ignoring empty submission");
            return Submission::NoOp;
        }

        self.next_exchange += 1;
        let exchange = ExchangeId(self.next_exchange);

        transcript.append(Role::User, query);
        let indicator = transcript.append(Role::Pending, PENDING_TEXT);
        self.pending.insert(exchange, indicator);

        let dispatch = Dispatch {
            exchange,
            query: query.to_string(),
        };

        match self.ordering {
            ExchangeOrdering::Concurrent => {
                self.in_flight += 1;
                info!(%exchange, "exchange sent");
                Submission::Dispatched(dispatch)
            }
            ExchangeOrdering::Serialized => {
                self.queue.push_back(dispatch);
                match self.release() {
                    Some(dispatch) => {
                        info!(%exchange, "exchange sent");
                        Submission::Dispatched(dispatch)
                    }
                    None => {
                        info!(%exchange, queued = self.queue.len(), "exchange queued");
                        Submission::Queued(exchange)
                    }
                }
            }
        }
    }

    pub fn settle(&mut self, transcript: &mut Transcript, settlement: Settlement) -> Settled {
        let Settlement { exchange, outcome } = settlement;

        let Some(indicator) = self.pending.remove(&exchange) else {
            debug!(%exchange, "dropping settlement for unknown exchange");
            return Settled {
                state: None,
                next: None,
            };
        };
        self.in_flight = self.in_flight.saturating_sub(1);

        // Indicator goes first so it never coexists with this exchange's reply
        if transcript.contains(indicator) {
            transcript.remove(indicator);
        }

        let kind = outcome.kind();
        let state = match outcome {
            RequestOutcome::Success(reply) => {
                transcript.append(Role::Bot, reply);
                ExchangeState::BotRendered
            }
            RequestOutcome::ProtocolError(message) => {
                transcript.append(Role::Error, message);
                ExchangeState::ProtocolErrorRendered
            }
            RequestOutcome::NetworkError(message) => {
                transcript.append(Role::Error, message);
                ExchangeState::NetworkErrorRendered
            }
        };
        info!(%exchange, outcome = kind, ?state, "exchange settled");

        let next = self.release();
        if let Some(dispatch) = &next {
            info!(exchange = %dispatch.exchange, "queued exchange sent");
        }

        Settled {
            state: Some(state),
            next,
        }
    }

    /// Abort queued requests that never went out. Each one settles like a
    /// cancelled in-flight exchange: indicator removed, network error rendered.
    pub fn drain_queue(&mut self, transcript: &mut Transcript) -> usize {
        let drained = self.queue.len();
        for dispatch in self.queue.drain(..) {
            if let Some(indicator) = self.pending.remove(&dispatch.exchange) {
                transcript.remove(indicator);
                transcript.append(Role::Error, NETWORK_ERROR_MESSAGE);
                info!(exchange = %dispatch.exchange, "queued exchange aborted");
            }
        }
        drained
    }

    fn release(&mut self) -> Option<Dispatch> {
        if self.in_flight > 0 {
            return None;
        }
        let dispatch = self.queue.pop_front()?;
        self.in_flight += 1;
        Some(dispatch)
    }
}

/// Run one dispatched request to settlement. Cancellation counts as an aborted request.
pub async fn run_exchange(
    transport: Arc<dyn ChatTransport>,
    dispatch: Dispatch,
    cancel: CancellationToken,
) -> Settlement {
    let outcome = tokio::select! {
        outcome = transport.send(&dispatch.query) => outcome,
        _ = cancel.cancelled() => {
            info!(exchange = %dispatch.exchange, "exchange aborted");
            RequestOutcome::network_failure()
        }
    };

    Settlement {
        exchange: dispatch.exchange,
        outcome,
    }
}
