// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Print barrier.
//!
//! Ordinary commands run concurrently. A print waits for in-flight commands
//! to finish and holds new ones back until the tree has been written, so the
//! output reflects a quiescent namespace.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use treefs_proto::Command;

#[derive(Debug, Default)]
struct GateState {
    active: usize,
    printing: bool,
}

#[derive(Debug, Default)]
pub struct PrintGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl PrintGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'g>(
        &self,
        guard: MutexGuard<'g, GateState>,
        condition: impl FnMut(&mut GateState) -> bool,
    ) -> MutexGuard<'g, GateState> {
        self.changed
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit an ordinary command, waiting out any print in progress
    pub fn enter(&self) -> CommandPass<'_> {
        let mut state = self.wait_while(self.lock(), |s| s.printing);
        state.active += 1;
        CommandPass { gate: self }
    }

    /// Wait for exclusive access: no print and no command in flight
    pub fn exclusive(&self) -> PrintPass<'_> {
        let mut state = self.wait_while(self.lock(), |s| s.printing);
        state.printing = true;
        let _state = self.wait_while(state, |s| s.active > 0);
        PrintPass { gate: self }
    }

    /// Run `f` under the pass `command` requires
    pub fn run<T>(&self, command: &Command, f: impl FnOnce() -> T) -> T {
        if command.is_print() {
            let _pass = self.exclusive();
            f()
        } else {
            let _pass = self.enter();
            f()
        }
    }

    pub fn active(&self) -> usize {
        self.lock().active
    }
}

/// Held while an ordinary command runs
pub struct CommandPass<'g> {
    gate: &'g PrintGate,
}

impl Drop for CommandPass<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.active -= 1;
        if state.active == 0 {
            self.gate.changed.notify_all();
        }
    }
}

/// Held while the tree is printed
pub struct PrintPass<'g> {
    gate: &'g PrintGate,
}

impl Drop for PrintPass<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.lock();
        state.printing = false;
        self.gate.changed.notify_all();
    }
}
