use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::coding::Url;
use crate::data;
use crate::message::{self, Intent, Message, TransportMode};
use crate::serve::CacheReader;

use super::publisher::{serve_cursor_datagrams, serve_cursor_stream};
use super::{
    Config, Consumer, ConsumerStatus, Dispatcher, GapTracker, Reader, SessionError, StreamState,
    Writer,
};

/// The initiator role of a connection: opens subscriptions and pushes local
/// media to the peer.
#[derive(Clone)]
pub struct Subscriber {
    session: web_transport::Session,
    dispatch: Dispatcher,
    config: Arc<Config>,
    clock: Clock,
}

impl Subscriber {
    pub(super) fn new(
        session: web_transport::Session,
        dispatch: Dispatcher,
        config: Arc<Config>,
        clock: Clock,
    ) -> Self {
        Self {
            session,
            dispatch,
            config,
            clock,
        }
    }

    /// Fetch a media over a single stream, feeding the consumer until the
    /// media ends (or the consumer reports itself finished).
    pub async fn subscribe_stream<C: Consumer>(
        &mut self,
        url: Url,
        intent: Intent,
        mut consumer: C,
    ) -> Result<(), SessionError> {
        let (send, recv) = self.session.open_bi().await?;
        let mut writer = Writer::new(send);
        let mut reader = Reader::new(recv);

        writer
            .encode(&Message::from(message::RequestStream { url, intent }))
            .await?;

        let mut state = StreamState::WaitAccept;

        loop {
            if reader.finished().await? {
                // The publisher went away; what arrived is all there is.
                consumer.close();
                return Ok(());
            }

            let msg: Message = reader.decode().await?;
            let next = state.receive(&msg)?;
            let now = self.clock.now();

            let status = match msg {
                Message::Accept(_) => {
                    if next != StreamState::Streaming {
                        return Err(SessionError::UnexpectedMessage("Accept"));
                    }
                    ConsumerStatus::Active
                }
                Message::StartPoint(sp) => {
                    consumer.start_point(now, sp.group_id, sp.object_id)?
                }
                Message::Fragment(fragment) => consumer.fragment(now, fragment.into())?,
                Message::CachePolicy(cp) => consumer.cache_policy(cp.policy)?,
                Message::FinDatagram(fin) => {
                    consumer.final_object(fin.final_group_id, fin.final_object_id)?
                }
                other => return Err(SessionError::UnexpectedMessage(other.name())),
            };

            if status == ConsumerStatus::Finished {
                consumer.close();
                return Ok(());
            }
        }
    }

    /// Fetch a media as datagrams, repairing losses via the control stream.
    pub async fn subscribe_datagram<C: Consumer>(
        &mut self,
        url: Url,
        intent: Intent,
        consumer: C,
    ) -> Result<(), SessionError> {
        let (media_id, incoming) = self.dispatch.allocate();
        let res = self
            .subscribe_datagram_inner(url, intent, media_id, incoming, consumer)
            .await;
        self.dispatch.remove(media_id);
        res
    }

    async fn subscribe_datagram_inner<C: Consumer>(
        &mut self,
        url: Url,
        intent: Intent,
        media_id: u64,
        incoming: mpsc::UnboundedReceiver<data::Datagram>,
        consumer: C,
    ) -> Result<(), SessionError> {
        let (send, recv) = self.session.open_bi().await?;
        let mut writer = Writer::new(send);
        let mut reader = Reader::new(recv);

        writer
            .encode(&Message::from(message::RequestDatagram {
                url,
                intent,
                media_id,
            }))
            .await?;

        let mut state = StreamState::WaitAccept;
        let msg: Message = reader.decode().await?;
        let next = state.receive(&msg)?;

        match msg {
            Message::Accept(accept) => {
                if next != StreamState::Datagram {
                    return Err(SessionError::UnexpectedMessage("Accept"));
                }
                if accept.media_id != Some(media_id) {
                    return Err(SessionError::Malformed("media id"));
                }
            }
            other => return Err(SessionError::UnexpectedMessage(other.name())),
        }

        consume_datagrams(
            consumer,
            incoming,
            &mut writer,
            &mut reader,
            state,
            &self.config,
            &self.clock,
        )
        .await
    }

    /// Push a local media to the peer, serving it from the given cache.
    pub async fn post(
        &mut self,
        url: Url,
        transport_mode: TransportMode,
        intent: Intent,
        cache: CacheReader,
    ) -> Result<(), SessionError> {
        let mut cursor = cache.subscribe(intent)?;
        let (group_id, object_id) = cursor.position();

        let (send, recv) = self.session.open_bi().await?;
        let mut writer = Writer::new(send);
        let mut reader = Reader::new(recv);

        writer
            .encode(&Message::from(message::Post {
                url,
                transport_mode,
                intent,
                group_id,
                object_id,
            }))
            .await?;

        let mut state = StreamState::WaitAccept;
        let msg: Message = reader.decode().await?;
        state.receive(&msg)?;

        let media_id = match msg {
            Message::Accept(accept) => {
                if accept.transport_mode != transport_mode {
                    return Err(SessionError::UnexpectedMessage("Accept"));
                }
                accept.media_id
            }
            other => return Err(SessionError::UnexpectedMessage(other.name())),
        };

        // The receiving cache inherits our eviction policy.
        if cache.policy() != Default::default() {
            writer
                .encode(&Message::from(message::CachePolicy {
                    policy: cache.policy(),
                }))
                .await?;
        }

        match transport_mode {
            TransportMode::SingleStream => {
                serve_cursor_stream(&mut writer, &cache, &mut cursor).await
            }
            TransportMode::Datagram => {
                let media_id = media_id.ok_or(SessionError::Malformed("media id"))?;
                let mut session = self.session.clone();
                serve_cursor_datagrams(
                    &mut session,
                    &mut writer,
                    &mut reader,
                    &cache,
                    &mut cursor,
                    media_id,
                    &self.config,
                    &self.clock,
                )
                .await
            }
        }
    }
}

/// Shared receive loop for datagram-mode media: datagrams feed the
/// consumer, losses age into REQUEST_REPAIR messages, and control-stream
/// traffic (START_POINT, FIN, repair retransmissions) is folded in.
pub(super) async fn consume_datagrams<C: Consumer>(
    mut consumer: C,
    mut incoming: mpsc::UnboundedReceiver<data::Datagram>,
    writer: &mut Writer,
    reader: &mut Reader,
    mut state: StreamState,
    config: &Config,
    clock: &Clock,
) -> Result<(), SessionError> {
    let mut tracker = GapTracker::new();
    let scan_every = Duration::from_micros((config.repair_delay / 2).max(1_000));

    loop {
        let status = tokio::select! {
            datagram = incoming.recv() => {
                // The dispatcher dropped us; the subscription is over.
                let Some(datagram) = datagram else {
                    consumer.close();
                    return Ok(());
                };

                let now = clock.now();
                tracker.feed(
                    now,
                    datagram.group_id,
                    datagram.object_id,
                    datagram.offset,
                    datagram.payload.len() as u64,
                    datagram.is_last_fragment,
                    datagram.nb_objects_previous_group,
                );
                consumer.fragment(now, datagram.into())?
            },

            msg = reader.decode::<Message>() => {
                let msg: Message = msg?;
                state.receive(&msg)?;
                let now = clock.now();

                match msg {
                    Message::StartPoint(sp) => {
                        tracker.set_start(sp.group_id, sp.object_id);
                        consumer.start_point(now, sp.group_id, sp.object_id)?
                    }
                    Message::FinDatagram(fin) => {
                        tracker.set_final(fin.final_group_id, fin.final_object_id);
                        consumer.final_object(fin.final_group_id, fin.final_object_id)?
                    }
                    // A repair retransmission.
                    Message::Fragment(fragment) => {
                        tracker.feed(
                            now,
                            fragment.group_id,
                            fragment.object_id,
                            fragment.offset,
                            fragment.payload.len() as u64,
                            fragment.is_last_fragment,
                            fragment.nb_objects_previous_group,
                        );
                        consumer.fragment(now, fragment.into())?
                    }
                    Message::CachePolicy(cp) => consumer.cache_policy(cp.policy)?,
                    other => return Err(SessionError::UnexpectedMessage(other.name())),
                }
            },

            _ = tokio::time::sleep(scan_every) => {
                let now = clock.now();
                for repair in tracker.scan(now, config.repair_delay) {
                    log::debug!(
                        "requesting repair: group={} object={} offset={} length={}",
                        repair.group_id, repair.object_id, repair.offset, repair.length
                    );
                    writer.encode(&Message::from(message::RequestRepair {
                        group_id: repair.group_id,
                        object_id: repair.object_id,
                        offset: repair.offset,
                        length: repair.length,
                        is_last_fragment: repair.is_last_fragment,
                    })).await?;
                }
                ConsumerStatus::Active
            },
        };

        if status == ConsumerStatus::Finished {
            consumer.close();
            return Ok(());
        }
    }
}
