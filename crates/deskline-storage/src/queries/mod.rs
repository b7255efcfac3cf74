// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query functions over a [`Database`](crate::Database).

pub mod agents;
pub mod contacts;
pub mod instances;
pub mod messages;
pub mod queues;
pub mod settings;
pub mod tickets;

/// Outcome of a guarded write: the row after the write, or the row as found
/// when the guard rejected it (`None` if it does not exist).
#[derive(Debug)]
pub enum Guarded<T> {
    Applied(T),
    Rejected(Option<T>),
}

impl<T> Guarded<T> {
    pub(crate) fn from_write(changed: usize, row: Option<T>) -> Self {
        match (changed, row) {
            (1, Some(row)) => Guarded::Applied(row),
            (_, row) => Guarded::Rejected(row),
        }
    }
}
