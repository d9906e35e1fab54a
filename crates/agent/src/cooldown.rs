// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session cooldown ledgers (§3). In-memory, short-TTL maps that
//! deduplicate outbound actions on repeated triggers. One ledger lives and
//! dies with its Session; a single mutex per ledger is adequate (§5).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DELIVERY_WINDOW: Duration = Duration::from_secs(10 * 60);
const CONFIRM_WINDOW: Duration = Duration::from_secs(10 * 60);
const NOTIFICATION_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct LedgerState {
    last_delivery_at: HashMap<String, Instant>,
    confirmed_orders: HashMap<String, Instant>,
    last_notification_at: HashMap<String, Instant>,
}

/// Cooldown ledger for one Session.
pub struct CooldownLedger {
    state: Mutex<LedgerState>,
}

impl CooldownLedger {
    pub fn new() -> Self {
        CooldownLedger { state: Mutex::new(LedgerState::default()) }
    }

    /// `true` if a delivery for `order_id` is still within its 10-minute
    /// cooldown window (§4.7 step 2).
    pub fn delivery_on_cooldown(&self, order_id: &str) -> bool {
        let state = self.state.lock();
        state
            .last_delivery_at
            .get(order_id)
            .is_some_and(|at| at.elapsed() < DELIVERY_WINDOW)
    }

    pub fn mark_delivered(&self, order_id: &str) {
        self.state.lock().last_delivery_at.insert(order_id.to_owned(), Instant::now());
    }

    pub fn is_confirmed(&self, order_id: &str) -> bool {
        let state = self.state.lock();
        state.confirmed_orders.get(order_id).is_some_and(|at| at.elapsed() < CONFIRM_WINDOW)
    }

    pub fn mark_confirmed(&self, order_id: &str) {
        self.state.lock().confirmed_orders.insert(order_id.to_owned(), Instant::now());
    }

    /// `true` if a notification of `kind` was already sent within its
    /// 5-minute rate-limit window (§4.9).
    pub fn notification_on_cooldown(&self, kind: &str) -> bool {
        let state = self.state.lock();
        state.last_notification_at.get(kind).is_some_and(|at| at.elapsed() < NOTIFICATION_WINDOW)
    }

    pub fn mark_notified(&self, kind: &str) {
        self.state.lock().last_notification_at.insert(kind.to_owned(), Instant::now());
    }
}

impl Default for CooldownLedger {
    fn default() -> Self {
        Self::new()
    }
}
