use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::Mutex;
use tether_connection::Link;
use tether_primitives::ChainId;

use crate::listener::{upsert, visible};
use crate::{ConnectionEventSink, ConnectionInformation, ManagedConnectionListener};

/// Mirrors orchestrator events one to one, without merging duplicates.
pub struct ForwardingListener {
    listener: Arc<dyn ManagedConnectionListener>,
    entries: Mutex<LinkedHashMap<ChainId, ConnectionInformation>>,
}

impl ForwardingListener {
    pub fn new(listener: Arc<dyn ManagedConnectionListener>) -> Self {
        Self {
            listener,
            entries: Mutex::new(LinkedHashMap::new()),
        }
    }

    fn publish(&self, entries: &LinkedHashMap<ChainId, ConnectionInformation>) {
        self.listener.on_connections(&visible(entries));
    }
}

impl ConnectionEventSink for ForwardingListener {
    fn added(&self, info: ConnectionInformation) {
        let mut entries = self.entries.lock();
        upsert(&mut entries, info);
        self.publish(&entries);
    }

    fn updated(&self, info: ConnectionInformation, _link: Option<Link>) {
        let mut entries = self.entries.lock();
        upsert(&mut entries, info);
        self.publish(&entries);
    }

    fn removed(&self, chain_id: ChainId) {
        let mut entries = self.entries.lock();
        if entries.remove(&chain_id).is_some() {
            self.publish(&entries);
        }
    }
}
