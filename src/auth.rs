// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session provider interface

/// What the chat needs to know about the signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSnapshot {
    pub is_authenticated: bool,
    pub is_premium_tier: bool,
}

/// Source of the current authentication state, polled once per operation
pub trait SessionProvider: Send + Sync {
    fn snapshot(&self) -> AuthSnapshot;
}

/// A fixed snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSession(pub AuthSnapshot);

impl StaticSession {
    pub fn premium() -> Self {
        Self(AuthSnapshot {
            is_authenticated: true,
            is_premium_tier: true,
        })
    }

    pub fn free() -> Self {
        Self(AuthSnapshot {
            is_authenticated: true,
            is_premium_tier: false,
        })
    }

    pub fn anonymous() -> Self {
        Self(AuthSnapshot::default())
    }
}

impl SessionProvider for StaticSession {
    fn snapshot(&self) -> AuthSnapshot {
        self.0
    }
}
