pub mod connection;
pub mod memory;
pub mod mongo;
pub mod stores;

use std::sync::Arc;

use memory::MemoryStore;
use mongo::MongoStore;
use stores::{ActivityStore, CatalogStore, IdentityStore, OrderStore, TransactionStore};

/// The persistence collaborators the services are built from.
#[derive(Clone)]
pub struct Stores {
    pub transactions: Arc<dyn TransactionStore>,
    pub identity: Arc<dyn IdentityStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub orders: Arc<dyn OrderStore>,
    pub activities: Arc<dyn ActivityStore>,
}

impl Stores {
    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Stores {
            transactions: store.clone(),
            identity: store.clone(),
            catalog: store.clone(),
            orders: store.clone(),
            activities: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Stores {
            transactions: store.clone(),
            identity: store.clone(),
            catalog: store.clone(),
            orders: store.clone(),
            activities: store,
        }
    }
}
