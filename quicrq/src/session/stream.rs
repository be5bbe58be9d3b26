use crate::message::{Message, TransportMode};

use super::SessionError;

/// Protocol state of one bidirectional stream.
///
/// Both roles walk the same machine: one request-class message, one ACCEPT,
/// then data per the negotiated mode until FIN. Receiving a message that is
/// not legal in the current state moves to [StreamState::Errored]; the
/// caller closes the stream with the error's code and releases the
/// subscription.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StreamState {
    #[default]
    Idle,

    /// Request sent; nothing but ACCEPT may arrive.
    WaitAccept,

    /// Accepted in single-stream mode; fragments ride this stream.
    Streaming,

    /// Accepted in datagram mode; this stream carries only control traffic.
    Datagram,

    /// FIN seen; only repair traffic may still arrive.
    Finishing,

    Closed,
    Errored,
}

impl StreamState {
    /// Validate receipt of `msg`, returning the successor state.
    pub fn receive(&mut self, msg: &Message) -> Result<StreamState, SessionError> {
        use StreamState::*;

        let next = match (*self, msg) {
            (WaitAccept, Message::Accept(accept)) => match accept.transport_mode {
                TransportMode::SingleStream => Streaming,
                TransportMode::Datagram => Datagram,
            },

            (Streaming, Message::Fragment(_)) => Streaming,
            (Streaming, Message::StartPoint(_)) => Streaming,
            (Streaming, Message::CachePolicy(_)) => Streaming,
            (Streaming, Message::FinDatagram(_)) => Finishing,

            (Datagram, Message::StartPoint(_)) => Datagram,
            (Datagram, Message::CachePolicy(_)) => Datagram,
            // Repair retransmissions ride the control stream.
            (Datagram, Message::Fragment(_)) => Datagram,
            (Datagram, Message::RequestRepair(_)) => Datagram,
            (Datagram, Message::FinDatagram(_)) => Finishing,

            // Stragglers while the subscription drains.
            (Finishing, Message::Fragment(_)) => Finishing,
            (Finishing, Message::RequestRepair(_)) => Finishing,

            _ => {
                *self = Errored;
                return Err(SessionError::UnexpectedMessage(msg.name()));
            }
        };

        *self = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{self, Accept};
    use bytes::Bytes;

    fn fragment() -> Message {
        message::Fragment {
            group_id: 0,
            object_id: 0,
            nb_objects_previous_group: 0,
            offset: 0,
            is_last_fragment: true,
            flags: 0,
            payload: Bytes::from_static(b"x"),
        }
        .into()
    }

    #[test]
    fn fragment_before_accept_is_unexpected() {
        let mut state = StreamState::WaitAccept;
        let err = state.receive(&fragment()).unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedMessage(_)));
        assert_eq!(err.code(), 0x2);
        assert_eq!(state, StreamState::Errored);
    }

    #[test]
    fn accept_selects_mode() {
        let mut state = StreamState::WaitAccept;
        state
            .receive(
                &Accept {
                    transport_mode: TransportMode::SingleStream,
                    media_id: None,
                }
                .into(),
            )
            .unwrap();
        assert_eq!(state, StreamState::Streaming);

        state.receive(&fragment()).unwrap();

        let mut state = StreamState::WaitAccept;
        state
            .receive(
                &Accept {
                    transport_mode: TransportMode::Datagram,
                    media_id: Some(3),
                }
                .into(),
            )
            .unwrap();
        assert_eq!(state, StreamState::Datagram);
    }

    #[test]
    fn fin_then_only_repairs() {
        let mut state = StreamState::Datagram;
        state
            .receive(
                &message::FinDatagram {
                    media_id: 3,
                    final_group_id: 1,
                    final_object_id: 2,
                }
                .into(),
            )
            .unwrap();
        assert_eq!(state, StreamState::Finishing);

        state.receive(&fragment()).unwrap();

        let err = state
            .receive(
                &message::StartPoint {
                    group_id: 0,
                    object_id: 0,
                }
                .into(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedMessage(_)));
    }

    #[test]
    fn errored_rejects_everything() {
        let mut state = StreamState::Errored;
        assert!(state.receive(&fragment()).is_err());
    }
}
