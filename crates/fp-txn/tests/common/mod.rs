//! Shared stubs for the fp-txn integration tests.
//!
//! `Journal` is a context that records every lifecycle call, so ordering
//! properties can be asserted on its `events`.

#![allow(dead_code)]

use async_trait::async_trait;
use fp_core::{Document, Value};
use fp_txn::{
    CommitError, HistoryConfig, ReplayError, Request, RequestHandle, RequestRegistry, RequestType,
    TransactionManager, TxnError,
};
use tokio::sync::oneshot;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn apartment() -> Document {
    Document::from_json(include_str!("../fixtures/apartment.json")).unwrap()
}

// ─── Journal context ────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Journal {
    pub total: i64,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    Commit,
    Undo,
    Redo,
}

/// Adds `amount` to the journal total and logs each lifecycle call.
pub struct Record {
    pub name: String,
    pub amount: i64,
    pub fault: Fault,
}

#[async_trait]
impl Request<Journal> for Record {
    async fn commit(&mut self, ctx: &mut Journal) -> Result<Value, CommitError> {
        ctx.events.push(format!("commit {}", self.name));
        if self.fault == Fault::Commit {
            return Err(CommitError::Rejected(format!("{} refused", self.name)));
        }
        ctx.total += self.amount;
        Ok(Value::Int(ctx.total))
    }

    fn undo(&mut self, ctx: &mut Journal) -> Result<(), ReplayError> {
        ctx.events.push(format!("undo {}", self.name));
        if self.fault == Fault::Undo {
            return Err(ReplayError::Failed(format!("{} cannot undo", self.name)));
        }
        ctx.total -= self.amount;
        Ok(())
    }

    fn redo(&mut self, ctx: &mut Journal) -> Result<(), ReplayError> {
        ctx.events.push(format!("redo {}", self.name));
        if self.fault == Fault::Redo {
            return Err(ReplayError::Failed(format!("{} cannot redo", self.name)));
        }
        ctx.total += self.amount;
        Ok(())
    }
}

/// A commit that suspends until its release channel fires.
pub struct Gated {
    pub name: String,
    pub release: Option<oneshot::Receiver<()>>,
}

#[async_trait]
impl Request<Journal> for Gated {
    async fn commit(&mut self, ctx: &mut Journal) -> Result<Value, CommitError> {
        let release = self.release.take().ok_or(CommitError::Cancelled)?;
        release.await.map_err(|_| CommitError::Cancelled)?;
        ctx.events.push(format!("commit {}", self.name));
        Ok(Value::Null)
    }

    fn undo(&mut self, ctx: &mut Journal) -> Result<(), ReplayError> {
        ctx.events.push(format!("undo {}", self.name));
        Ok(())
    }

    fn redo(&mut self, ctx: &mut Journal) -> Result<(), ReplayError> {
        ctx.events.push(format!("redo {}", self.name));
        Ok(())
    }
}

// ─── Journal manager ────────────────────────────────────────────────────

/// Registry with a `Record` leaf type: `[name, amount, fault?]` where
/// `fault` is one of `"commit"`, `"undo"`, `"redo"`.
pub fn journal_registry() -> RequestRegistry<Journal> {
    let mut registry = RequestRegistry::<Journal>::new();
    registry.register("Record", |_, args| {
        let invalid = |reason: &str| TxnError::InvalidArguments {
            request_type: "Record".to_string(),
            reason: reason.to_string(),
        };
        let name = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("argument 0 must be a name"))?
            .to_string();
        let amount = args
            .get(1)
            .and_then(Value::as_int)
            .ok_or_else(|| invalid("argument 1 must be an int"))?;
        let fault = match args.get(2).and_then(Value::as_str) {
            None => Fault::None,
            Some("commit") => Fault::Commit,
            Some("undo") => Fault::Undo,
            Some("redo") => Fault::Redo,
            Some(_) => return Err(invalid("unknown fault")),
        };
        Ok(Box::new(Record {
            name,
            amount,
            fault,
        }))
    });
    registry
}

pub fn journal_manager(max_depth: usize) -> TransactionManager<Journal> {
    init_logger();
    let config = HistoryConfig {
        max_depth,
        ..HistoryConfig::default()
    };
    TransactionManager::new(Journal::default(), journal_registry(), config)
}

pub fn record(m: &TransactionManager<Journal>, name: &str, amount: i64) -> RequestHandle<Journal> {
    m.create_request("Record", vec![name.into(), amount.into()])
        .unwrap()
        .with_description(name)
}

pub fn faulty(
    m: &TransactionManager<Journal>,
    name: &str,
    amount: i64,
    fault: &str,
) -> RequestHandle<Journal> {
    m.create_request("Record", vec![name.into(), amount.into(), fault.into()])
        .unwrap()
        .with_description(name)
}

pub fn gated(name: &str) -> (RequestHandle<Journal>, oneshot::Sender<()>) {
    let (tx, rx) = oneshot::channel();
    let request = RequestHandle::new(
        RequestType::from_tag("Gated"),
        Gated {
            name: name.to_string(),
            release: Some(rx),
        },
    )
    .with_description(name);
    (request, tx)
}

pub async fn journal_events(m: &TransactionManager<Journal>) -> Vec<String> {
    m.read(|j| j.events.clone()).await
}

pub async fn journal_total(m: &TransactionManager<Journal>) -> i64 {
    m.read(|j| j.total).await
}
