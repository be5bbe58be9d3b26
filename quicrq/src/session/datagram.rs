use std::collections::{hash_map, HashMap};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::data;
use crate::serve::ServeError;

// Datagrams larger than this risk exceeding the path MTU; fragments are
// split before sending so header plus payload stay under it.
pub(super) const MAX_DATAGRAM: usize = 1200;

#[derive(Default)]
struct DispatcherState {
    lookup: HashMap<u64, mpsc::UnboundedSender<data::Datagram>>,
    next_id: u64,
}

/// Per-connection demultiplexer of incoming datagrams by media id.
#[derive(Clone, Default)]
pub(super) struct Dispatcher {
    state: Arc<Mutex<DispatcherState>>,
}

impl Dispatcher {
    /// Claim a media id chosen by the local subscriber.
    pub fn register(
        &self,
        media_id: u64,
    ) -> Result<mpsc::UnboundedReceiver<data::Datagram>, ServeError> {
        let mut state = self.state.lock().unwrap();
        let (send, recv) = mpsc::unbounded_channel();

        match state.lookup.entry(media_id) {
            hash_map::Entry::Occupied(_) => return Err(ServeError::Duplicate),
            hash_map::Entry::Vacant(entry) => entry.insert(send),
        };

        Ok(recv)
    }

    /// Allocate a fresh media id, for the responder side of a POST.
    pub fn allocate(&self) -> (u64, mpsc::UnboundedReceiver<data::Datagram>) {
        let mut state = self.state.lock().unwrap();

        let media_id = loop {
            let id = state.next_id;
            state.next_id += 1;
            if !state.lookup.contains_key(&id) {
                break id;
            }
        };

        let (send, recv) = mpsc::unbounded_channel();
        state.lookup.insert(media_id, send);

        (media_id, recv)
    }

    pub fn remove(&self, media_id: u64) {
        self.state.lock().unwrap().lookup.remove(&media_id);
    }

    /// Route one received datagram, or drop it if nothing owns the id
    /// (datagrams can outrace the control stream).
    pub fn dispatch(&self, datagram: data::Datagram) {
        let state = self.state.lock().unwrap();
        match state.lookup.get(&datagram.media_id) {
            Some(sender) => {
                sender.send(datagram).ok();
            }
            None => {
                log::debug!("dropping datagram for unknown media_id={}", datagram.media_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn datagram(media_id: u64) -> data::Datagram {
        data::Datagram {
            media_id,
            group_id: 0,
            object_id: 0,
            offset: 0,
            is_last_fragment: true,
            queue_delay: 0,
            flags: 0,
            nb_objects_previous_group: 0,
            payload: Bytes::from_static(b"x"),
        }
    }

    #[tokio::test]
    async fn routes_by_media_id() {
        let dispatch = Dispatcher::default();

        let mut first = dispatch.register(1).unwrap();
        let (id, mut second) = dispatch.allocate();
        assert_ne!(id, 1);

        dispatch.dispatch(datagram(1));
        dispatch.dispatch(datagram(id));
        dispatch.dispatch(datagram(99)); // dropped

        assert_eq!(first.recv().await.unwrap().media_id, 1);
        assert_eq!(second.recv().await.unwrap().media_id, id);

        dispatch.remove(1);
        dispatch.dispatch(datagram(1));
        assert!(first.recv().await.is_none());
    }

    #[test]
    fn duplicate_registration_refused() {
        let dispatch = Dispatcher::default();
        let _keep = dispatch.register(7).unwrap();
        assert!(dispatch.register(7).is_err());
    }
}
