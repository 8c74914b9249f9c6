//! Item sink registry
//!
//! Maps an item's runtime type to the channel that receives items of that
//! type. Registration happens before a crawl starts; during the crawl the
//! registry is only read, concurrently, by the workers. At shutdown every
//! sender is dropped exactly once, which is how downstream consumers learn
//! that no more items will arrive.

use crate::crawler::strategy::CrawledItem;
use crate::output::CrawlFailure;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// A sink whose item type is only known at runtime
trait ErasedSink: Send + Sync {
    fn item_type_name(&self) -> &'static str;

    /// Delivers the item, blocking the calling thread while the channel is full
    fn send_blocking(&self, item: CrawledItem) -> Result<(), CrawlFailure>;
}

struct TypedSink<T> {
    sender: mpsc::Sender<T>,
}

impl<T: Any + Send> ErasedSink for TypedSink<T> {
    fn item_type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn send_blocking(&self, item: CrawledItem) -> Result<(), CrawlFailure> {
        let value = item.downcast::<T>().map_err(|item| CrawlFailure::Sink {
            item_type: item.type_name().to_string(),
            reason: format!("sink expects {}", self.item_type_name()),
        })?;

        self.sender
            .blocking_send(value)
            .map_err(|_| CrawlFailure::Sink {
                item_type: self.item_type_name().to_string(),
                reason: "receiver was dropped".to_string(),
            })
    }
}

/// Type-keyed registry of item sinks
#[derive(Default)]
pub struct SinkRegistry {
    sinks: RwLock<HashMap<TypeId, Arc<dyn ErasedSink>>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the sink for items of type `T`
    ///
    /// A later registration for the same type replaces the earlier one and
    /// drops its sender. Returns true if a sink was replaced.
    pub fn register<T: Any + Send>(&self, sender: mpsc::Sender<T>) -> bool {
        let sink: Arc<dyn ErasedSink> = Arc::new(TypedSink { sender });
        let replaced = self
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), sink)
            .is_some();

        if replaced {
            tracing::debug!(
                "Replaced sink for item type {}",
                std::any::type_name::<T>()
            );
        }
        replaced
    }

    /// Sends an item to the sink registered for its runtime type
    ///
    /// Must be called from a thread that may block (not from inside an
    /// async task): a full channel blocks until the consumer catches up.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The item was delivered
    /// * `Ok(false)` - No sink is registered for the item's type; the item was dropped
    /// * `Err(CrawlFailure::Sink)` - The sink's receiver is gone
    pub fn dispatch(&self, item: CrawledItem) -> Result<bool, CrawlFailure> {
        let sink = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item.item_type())
            .cloned();

        match sink {
            Some(sink) => sink.send_blocking(item).map(|()| true),
            None => {
                tracing::trace!("No sink for item type {}, dropping item", item.type_name());
                Ok(false)
            }
        }
    }

    /// Closes every registered sink; returns how many were closed
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, sink)| sink)
            .collect();

        for sink in &drained {
            tracing::debug!("Closing sink for item type {}", sink.item_type_name());
        }
        drained.len()
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.sinks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_list()
            .entries(sinks.values().map(|sink| sink.item_type_name()))
            .finish()
    }
}
