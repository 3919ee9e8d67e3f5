//! Deduplicated warning collection
//!
//! Rendering can emit the same warning once per block, which for long files
//! means thousands of identical lines. Warnings are collected here keyed by
//! message; each unique message is reported once, with a final count for
//! messages that repeated.

use std::collections::HashMap;

/// Collects warnings, deduplicating repeated messages.
#[derive(Debug, Default)]
pub struct Warnings {
    order: Vec<String>,
    counts: HashMap<String, usize>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning message.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        match self.counts.get_mut(&message) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(message.clone(), 1);
                self.order.push(message);
            }
        }
    }

    /// Has any warning been recorded?
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Unique messages in first-seen order, with their repeat counts.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.order
            .iter()
            .map(move |m| (m.as_str(), self.counts[m]))
    }

    /// Drain into formatted lines, appending a count to repeated messages.
    pub fn into_lines(self) -> Vec<String> {
        self.order
            .into_iter()
            .map(|m| {
                let count = self.counts[&m];
                if count > 1 {
                    format!("{} (repeated {} times)", m, count)
                } else {
                    m
                }
            })
            .collect()
    }
}
