use std::collections::VecDeque;

use crate::coding::Url;
use crate::message::TransportMode;
use crate::watch::State;

use super::ServeError;

#[derive(Default)]
struct Backlog {
    pending: VecDeque<(Url, TransportMode)>,
}

/// URLs that need fetching from upstream.
///
/// The registry requests on every miss; a relay's upstream manager drains.
/// A URL already in the backlog is not queued twice — one upstream
/// subscription serves every subscriber waiting on it, so later misses fold
/// into the pending request (whatever transport mode they asked for).
pub struct FetchQueue {
    state: State<Backlog>,
}

impl FetchQueue {
    /// Queue a fetch for the URL, unless one is already pending. Fails once
    /// the draining side is gone.
    pub fn request(&mut self, url: Url, transport_mode: TransportMode) -> Result<(), ServeError> {
        let mut state = self.state.lock_mut().ok_or(ServeError::Cancel)?;

        if state.pending.iter().any(|(pending, _)| *pending == url) {
            return Ok(());
        }
        state.pending.push_back((url, transport_mode));

        Ok(())
    }

    /// Wait for the next URL to fetch. None once the requesting side is
    /// gone and the backlog is drained.
    pub async fn next(&mut self) -> Option<(Url, TransportMode)> {
        loop {
            {
                let state = self.state.lock();
                if !state.pending.is_empty() {
                    return state.into_mut()?.pending.pop_front();
                }
                state.modified()?
            }
            .await;
        }
    }

    /// Split into the requesting and draining halves.
    pub fn split(self) -> (Self, Self) {
        let state = self.state.split();
        (Self { state: state.0 }, Self { state: state.1 })
    }
}

impl Clone for FetchQueue {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl Default for FetchQueue {
    fn default() -> Self {
        Self {
            state: State::new(Default::default()),
        }
    }
}
