use std::sync::Arc;

use crate::message::Operation;
use crate::store::Store;

/// Learner: applies operations the cluster decided on to the local store.
#[derive(Debug, Default)]
pub struct Replica {
    name: String,
    store: Arc<Store>,
}

impl Replica {
    pub fn new(name: String) -> Self {
        Replica {
            name,
            store: Arc::new(Store::new()),
        }
    }

    /// Applies a decided operation. Applying the same operation again leaves
    /// the store unchanged. Invalid operations are logged and dropped.
    pub fn learn(&self, operation: Operation) {
        if !operation.is_valid() {
            warn!("{} discarding invalid learned value {:?}", self.name, operation);
            return;
        }
        info!("{} executing {}", self.name, operation);
        match operation {
        | Operation::Put { key, value } => {
            self.store.put(key, value);
        }
        | Operation::Delete { key } => {
            self.store.delete(&key);
        }
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}
