// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Timeouts expressed as derived cancellation
//!
//! A [`Deadline`] owns a child of the caller's token and a timer that cancels
//! the child when it fires. Awaiting `deadline.token().cancelled()` therefore
//! wakes on either caller cancellation or expiry; [`Deadline::expired`] tells
//! the two apart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Deadline {
    token: CancellationToken,
    expired: Arc<AtomicBool>,
    timer: Option<JoinHandle<()>>,
}

impl Deadline {
    /// Derive a token from `parent` that is also cancelled after `timeout`.
    /// `None` derives a plain child token with no timer.
    pub fn after(parent: &CancellationToken, timeout: Option<Duration>) -> Self {
        let token = parent.child_token();
        let expired = Arc::new(AtomicBool::new(false));

        let timer = timeout.map(|timeout| {
            let token = token.clone();
            let expired = expired.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        expired.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                }
            })
        });

        Self {
            token,
            expired,
            timer,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True when the timer, not the caller, cancelled the token.
    pub fn expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
