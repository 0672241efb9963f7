use std::sync::Arc;

use tokio::sync::watch;

use crate::model::MarketHandle;

/// State that changes only through typed actions.
pub trait Reducer: Clone + Send + Sync + 'static {
    type Action;

    /// Applies `action`; returns false when it was ignored.
    fn reduce(&mut self, action: Self::Action) -> bool;
}

/// Single owner of a piece of application state. Observers subscribe to changes.
pub struct Store<S: Reducer> {
    tx: watch::Sender<S>,
}

impl<S: Reducer> Store<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn dispatch(&self, action: S::Action) -> bool {
        let mut applied = false;
        self.tx.send_if_modified(|state| {
            applied = state.reduce(action);
            applied
        });
        applied
    }

    pub fn snapshot(&self) -> S {
        self.tx.borrow().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

impl<S: Reducer + Default> Default for Store<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConvertState {
    pub from_token: Option<String>,
    pub to_token: Option<String>,
    pub size: Option<f64>,
    pub balance: Option<f64>,
    pub market: Option<Arc<MarketHandle>>,
    /// Latest market request; older load results are dropped.
    pub market_seq: u64,
    pub converting: bool,
}

#[derive(Debug, Clone)]
pub enum ConvertAction {
    SelectFrom(Option<String>),
    SelectTo(Option<String>),
    SetSize(Option<f64>),
    UseMax,
    MarketRequested { seq: u64 },
    MarketLoaded { seq: u64, market: Option<Arc<MarketHandle>> },
    BalanceLoaded { seq: u64, balance: Option<f64> },
    ConvertStarted,
    ConvertFinished,
    Reset,
}

impl ConvertState {
    pub fn can_convert(&self) -> bool {
        self.market.is_some() && self.size.map(|s| s > 0.0).unwrap_or(false) && !self.converting
    }

    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.from_token.as_deref(), self.to_token.as_deref()) {
            (Some(f), Some(t)) => Some((f, t)),
            _ => None,
        }
    }
}

impl Reducer for ConvertState {
    type Action = ConvertAction;

    fn reduce(&mut self, action: ConvertAction) -> bool {
        match action {
            ConvertAction::SelectFrom(token) => {
                if self.from_token == token {
                    return false;
                }
                self.from_token = token;
                self.to_token = None;
                self.balance = None;
                self.market = None;
                true
            }
            ConvertAction::SelectTo(token) => {
                if self.to_token == token {
                    return false;
                }
                self.to_token = token;
                self.balance = None;
                self.market = None;
                true
            }
            ConvertAction::SetSize(size) => {
                self.size = size.filter(|s| s.is_finite());
                true
            }
            ConvertAction::UseMax => {
                if self.balance.is_none() {
                    return false;
                }
                self.size = self.balance;
                true
            }
            ConvertAction::MarketRequested { seq } => {
                if seq <= self.market_seq {
                    return false;
                }
                self.market_seq = seq;
                self.market = None;
                self.balance = None;
                true
            }
            ConvertAction::MarketLoaded { seq, market } => {
                if seq != self.market_seq {
                    return false;
                }
                self.market = market;
                true
            }
            ConvertAction::BalanceLoaded { seq, balance } => {
                if seq != self.market_seq || self.market.is_none() {
                    return false;
                }
                self.balance = balance;
                true
            }
            ConvertAction::ConvertStarted => {
                if self.converting {
                    return false;
                }
                self.converting = true;
                true
            }
            ConvertAction::ConvertFinished => {
                let was = self.converting;
                self.converting = false;
                was
            }
            ConvertAction::Reset => {
                self.from_token = None;
                self.to_token = None;
                self.size = None;
                self.balance = None;
                true
            }
        }
    }
}
