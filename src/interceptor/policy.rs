// SPDX-License-Identifier: Apache-2.0

//! Policy Store
//!
//! The per-handle rule set the danger evaluator checks statements against.

use std::collections::BTreeSet;

use guard_core::{ErrorMode, StatementKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::GuardConfig;

/// Safety rules for one database handle
///
/// The default policy disallows dropping, checks every DELETE for being
/// unbounded, bans nothing and propagates every failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    allow_dropping: bool,
    check_delete_statements: bool,
    banned_kinds: BTreeSet<StatementKind>,
    /// Case-sensitive fragments that may not appear in a statement
    banned_syntax: BTreeSet<String>,
    error_mode: ErrorMode,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allow_dropping: false,
            check_delete_statements: true,
            banned_kinds: BTreeSet::new(),
            banned_syntax: BTreeSet::new(),
            error_mode: ErrorMode::Propagate,
        }
    }
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            allow_dropping: config.allow_dropping,
            check_delete_statements: config.check_delete_statements,
            banned_kinds: config.banned_statements.iter().copied().collect(),
            banned_syntax: config.banned_syntax.iter().cloned().collect(),
            error_mode: config.error_mode(),
        }
    }

    pub fn allow_dropping(&self) -> bool {
        self.allow_dropping
    }

    pub fn set_allow_dropping(&mut self, allow: bool) {
        debug!(allow, "Dropping {}", if allow { "allowed" } else { "disallowed" });
        self.allow_dropping = allow;
    }

    pub fn check_delete_statements(&self) -> bool {
        self.check_delete_statements
    }

    pub fn set_check_delete_statements(&mut self, enabled: bool) {
        self.check_delete_statements = enabled;
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub fn set_error_mode(&mut self, mode: ErrorMode) {
        self.error_mode = mode;
    }

    pub fn banned_kinds(&self) -> &BTreeSet<StatementKind> {
        &self.banned_kinds
    }

    pub fn is_kind_banned(&self, kind: StatementKind) -> bool {
        self.banned_kinds.contains(&kind)
    }

    /// Returns true if the kind was not already banned
    pub fn add_banned_kind(&mut self, kind: StatementKind) -> bool {
        self.banned_kinds.insert(kind)
    }

    /// Returns true if the kind was banned
    pub fn remove_banned_kind(&mut self, kind: StatementKind) -> bool {
        self.banned_kinds.remove(&kind)
    }

    pub fn add_banned_kinds(&mut self, kinds: impl IntoIterator<Item = StatementKind>) {
        self.banned_kinds.extend(kinds);
    }

    pub fn remove_banned_kinds(&mut self, kinds: impl IntoIterator<Item = StatementKind>) {
        for kind in kinds {
            self.banned_kinds.remove(&kind);
        }
    }

    pub fn banned_syntax(&self) -> &BTreeSet<String> {
        &self.banned_syntax
    }

    /// Returns true if the fragment was not already banned. Empty fragments
    /// would match every statement and are ignored.
    pub fn add_banned_syntax(&mut self, fragment: impl Into<String>) -> bool {
        let fragment = fragment.into();
        if fragment.is_empty() {
            return false;
        }
        self.banned_syntax.insert(fragment)
    }

    pub fn remove_banned_syntax(&mut self, fragment: &str) -> bool {
        self.banned_syntax.remove(fragment)
    }

    pub fn add_banned_syntaxes<I, S>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for fragment in fragments {
            self.add_banned_syntax(fragment);
        }
    }

    pub fn remove_banned_syntaxes<I, S>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for fragment in fragments {
            self.banned_syntax.remove(fragment.as_ref());
        }
    }

    /// The first banned fragment that occurs in `text`
    pub fn banned_fragment_in(&self, text: &str) -> Option<&str> {
        self.banned_syntax
            .iter()
            .find(|fragment| text.contains(fragment.as_str()))
            .map(String::as_str)
    }
}
