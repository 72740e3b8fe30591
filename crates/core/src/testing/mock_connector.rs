//! Mock connector for testing.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::connector::{Connector, ConnectorError};
use crate::content::FetchedItem;
use crate::source::Source;

/// Mock implementation of the Connector trait.
///
/// Returns the configured items for every source and records the IDs of the
/// sources it was asked to fetch. Failures can be injected for a number of
/// calls or for good.
#[derive(Debug, Default)]
pub struct MockConnector {
    items: Mutex<Vec<FetchedItem>>,
    /// Source IDs in call order.
    calls: Mutex<Vec<String>>,
    /// Remaining calls that fail; `None` means every call fails.
    failures: Mutex<Option<Option<u32>>>,
    failure_message: Mutex<String>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<FetchedItem>) -> Self {
        let connector = Self::new();
        connector.set_items(items);
        connector
    }

    /// Replace the items returned by later fetches.
    pub fn set_items(&self, items: Vec<FetchedItem>) {
        *lock(&self.items) = items;
    }

    /// Fail the next `times` fetches.
    pub fn fail_times(&self, times: u32, message: &str) {
        *lock(&self.failures) = Some(Some(times));
        *lock(&self.failure_message) = message.to_string();
    }

    /// Fail every fetch from now on.
    pub fn fail_always(&self, message: &str) {
        *lock(&self.failures) = Some(None);
        *lock(&self.failure_message) = message.to_string();
    }

    /// Number of fetches made.
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Source IDs of the fetches made, in order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn take_failure(&self) -> Option<ConnectorError> {
        let mut failures = lock(&self.failures);
        let fail = match *failures {
            None => false,
            Some(None) => true,
            Some(Some(0)) => {
                *failures = None;
                false
            }
            Some(Some(n)) => {
                *failures = if n == 1 { None } else { Some(Some(n - 1)) };
                true
            }
        };
        fail.then(|| ConnectorError::Http(lock(&self.failure_message).clone()))
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, source: &Source) -> Result<Vec<FetchedItem>, ConnectorError> {
        lock(&self.calls).push(source.id.clone());

        if let Some(e) = self.take_failure() {
            return Err(e);
        }
        Ok(lock(&self.items).clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
