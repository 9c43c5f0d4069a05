//! Scripted accrual source for tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{AccrualError, AccrualOutcome, AccrualSource, ScoreReply};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Reply(ScoreReply),
    /// Fail as if upstream answered with this HTTP status
    Fail(u16),
}

/// Replays per-order scripts, falling back to a default reply
pub struct ScriptedAccrual {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Mutex<ScoreReply>,
    asked: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl Default for ScriptedAccrual {
    fn default() -> Self {
        Self::new(ScoreReply::Scored(AccrualOutcome::Unregistered))
    }
}

impl ScriptedAccrual {
    pub fn new(fallback: ScoreReply) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: Mutex::new(fallback),
            asked: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every unscripted call with `outcome`
    pub fn always(outcome: AccrualOutcome) -> Self {
        Self::new(ScoreReply::Scored(outcome))
    }

    /// Queue the next reply for `order`
    pub fn push(&self, order: &str, reply: ScoreReply) {
        lock(&self.scripts)
            .entry(order.to_string())
            .or_default()
            .push_back(Step::Reply(reply));
    }

    /// Queue a failure with the given upstream HTTP status for `order`
    pub fn push_failure(&self, order: &str, http_status: u16) {
        lock(&self.scripts)
            .entry(order.to_string())
            .or_default()
            .push_back(Step::Fail(http_status));
    }

    pub fn set_fallback(&self, reply: ScoreReply) {
        *lock(&self.fallback) = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Order numbers asked about, in call order
    pub fn asked(&self) -> Vec<String> {
        lock(&self.asked).clone()
    }
}

#[async_trait]
impl AccrualSource for ScriptedAccrual {
    async fn get_score(&self, order: &str) -> Result<ScoreReply, AccrualError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.asked).push(order.to_string());

        let step = lock(&self.scripts)
            .get_mut(order)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(code)) => Err(AccrualError::UnexpectedStatus(code)),
            None => Ok(*lock(&self.fallback)),
        }
    }
}
