use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;

use crate::clock::Clock;
use crate::coding::Encode;
use crate::data;
use crate::message::{self, EvictionPolicy, Message, TransportMode};
use crate::serve::{CacheCursor, CacheReader, CachedFragment, MediaSources, Publication};

use super::datagram::MAX_DATAGRAM;
use super::subscriber::consume_datagrams;
use super::{CacheBridge, Config, Dispatcher, Reader, SessionError, StreamState, Writer};

/// The responder role of a connection: serves requests out of the node's
/// published sources and ingests pushed media.
#[derive(Clone)]
pub struct Publisher {
    session: web_transport::Session,
    sources: MediaSources,
    dispatch: Dispatcher,
    config: Arc<Config>,
    clock: Clock,

    // Media posted by the peer stay published for the session's lifetime.
    publications: Arc<Mutex<Vec<Publication>>>,
}

impl Publisher {
    pub(super) fn new(
        session: web_transport::Session,
        sources: MediaSources,
        dispatch: Dispatcher,
        config: Arc<Config>,
        clock: Clock,
    ) -> Self {
        Self {
            session,
            sources,
            dispatch,
            config,
            clock,
            publications: Default::default(),
        }
    }

    /// Drive one incoming bidirectional stream from its first message to
    /// completion.
    pub(super) async fn recv_stream(
        mut self,
        send: web_transport::SendStream,
        recv: web_transport::RecvStream,
    ) -> Result<(), SessionError> {
        let mut writer = Writer::new(send);
        let mut reader = Reader::new(recv);

        let msg: Message = reader.decode().await?;
        log::debug!("received request: {:?}", msg);

        match msg {
            Message::RequestStream(msg) => self.serve_stream(&mut writer, msg).await,
            Message::RequestDatagram(msg) => {
                self.serve_datagram(&mut writer, &mut reader, msg).await
            }
            Message::Post(msg) => self.recv_post(&mut writer, &mut reader, msg).await,
            Message::Subscribe(msg) => self.recv_subscribe(&mut writer, msg).await,
            other => Err(SessionError::UnexpectedMessage(other.name())),
        }
    }

    async fn serve_stream(
        &mut self,
        writer: &mut Writer,
        msg: message::RequestStream,
    ) -> Result<(), SessionError> {
        let cache = self
            .sources
            .resolve(
                &msg.url,
                TransportMode::SingleStream,
                self.config.wait_for_publish,
            )
            .await?;
        let mut cursor = cache.subscribe(msg.intent)?;

        writer
            .encode(&Message::from(message::Accept {
                transport_mode: TransportMode::SingleStream,
                media_id: None,
            }))
            .await?;

        serve_cursor_stream(writer, &cache, &mut cursor).await
    }

    async fn serve_datagram(
        &mut self,
        writer: &mut Writer,
        reader: &mut Reader,
        msg: message::RequestDatagram,
    ) -> Result<(), SessionError> {
        let cache = self
            .sources
            .resolve(&msg.url, TransportMode::Datagram, self.config.wait_for_publish)
            .await?;
        let mut cursor = cache.subscribe(msg.intent)?;

        writer
            .encode(&Message::from(message::Accept {
                transport_mode: TransportMode::Datagram,
                media_id: Some(msg.media_id),
            }))
            .await?;

        let mut session = self.session.clone();
        serve_cursor_datagrams(
            &mut session,
            writer,
            reader,
            &cache,
            &mut cursor,
            msg.media_id,
            &self.config,
            &self.clock,
        )
        .await
    }

    // The peer pushes a media to us; ingest it into a local cache entry.
    async fn recv_post(
        &mut self,
        writer: &mut Writer,
        reader: &mut Reader,
        msg: message::Post,
    ) -> Result<(), SessionError> {
        let (mut cache_writer, publication) = self
            .sources
            .publish_cache(msg.url.clone(), EvictionPolicy::default())?;

        if (msg.group_id, msg.object_id) != (0, 0) {
            cache_writer.set_start(msg.group_id, msg.object_id)?;
        }

        match msg.transport_mode {
            TransportMode::SingleStream => {
                writer
                    .encode(&Message::from(message::Accept {
                        transport_mode: TransportMode::SingleStream,
                        media_id: None,
                    }))
                    .await?;
                self.publications.lock().unwrap().push(publication);

                let mut state = StreamState::Streaming;
                loop {
                    if reader.finished().await? {
                        return Ok(());
                    }

                    let msg: Message = reader.decode().await?;
                    state.receive(&msg)?;

                    match msg {
                        Message::Fragment(fragment) => {
                            cache_writer.insert(fragment.into())?;
                        }
                        Message::StartPoint(sp) => {
                            cache_writer.set_start(sp.group_id, sp.object_id)?;
                        }
                        Message::CachePolicy(cp) => cache_writer.set_policy(cp.policy)?,
                        Message::FinDatagram(fin) => {
                            cache_writer.set_final(fin.final_group_id, fin.final_object_id)?;
                        }
                        other => return Err(SessionError::UnexpectedMessage(other.name())),
                    }
                }
            }
            TransportMode::Datagram => {
                let (media_id, incoming) = self.dispatch.allocate();
                writer
                    .encode(&Message::from(message::Accept {
                        transport_mode: TransportMode::Datagram,
                        media_id: Some(media_id),
                    }))
                    .await?;
                self.publications.lock().unwrap().push(publication);

                let bridge = CacheBridge::new(cache_writer, None);
                let res = consume_datagrams(
                    bridge,
                    incoming,
                    writer,
                    reader,
                    StreamState::Datagram,
                    &self.config,
                    &self.clock,
                )
                .await;
                self.dispatch.remove(media_id);
                res
            }
        }
    }

    // Respond with NOTIFY once the URL shows up.
    async fn recv_subscribe(
        &mut self,
        writer: &mut Writer,
        msg: message::Subscribe,
    ) -> Result<(), SessionError> {
        self.sources.wait_for(&msg.url).await?;
        writer
            .encode(&Message::from(message::Notify { url: msg.url }))
            .await?;
        Ok(())
    }
}

/// Pump a cache cursor into FRAGMENT messages on the stream, ending with a
/// FIN_DATAGRAM terminator.
pub(super) async fn serve_cursor_stream(
    writer: &mut Writer,
    cache: &CacheReader,
    cursor: &mut CacheCursor,
) -> Result<(), SessionError> {
    let mut sent_any = false;

    while let Some(fragment) = cursor.next().await? {
        if !sent_any {
            sent_any = true;
            if (fragment.group_id, fragment.object_id) != (0, 0) {
                writer
                    .encode(&Message::from(message::StartPoint {
                        group_id: fragment.group_id,
                        object_id: fragment.object_id,
                    }))
                    .await?;
            }
        }

        writer
            .encode(&Message::from(message::Fragment {
                group_id: fragment.group_id,
                object_id: fragment.object_id,
                nb_objects_previous_group: fragment.nb_objects_previous_group,
                offset: fragment.offset,
                is_last_fragment: fragment.is_last_fragment,
                flags: fragment.flags,
                payload: fragment.payload,
            }))
            .await?;
    }

    let (final_group_id, final_object_id) =
        cache.final_point().ok_or(SessionError::Internal)?;
    writer
        .encode(&Message::from(message::FinDatagram {
            media_id: 0,
            final_group_id,
            final_object_id,
        }))
        .await?;

    Ok(())
}

/// Pump a cache cursor into datagrams, answering repair requests on the
/// control stream and optionally repeating each datagram once.
#[allow(clippy::too_many_arguments)]
pub(super) async fn serve_cursor_datagrams(
    session: &mut web_transport::Session,
    writer: &mut Writer,
    reader: &mut Reader,
    cache: &CacheReader,
    cursor: &mut CacheCursor,
    media_id: u64,
    config: &Config,
    clock: &Clock,
) -> Result<(), SessionError> {
    let mut state = StreamState::Datagram;
    let mut sent_any = false;
    let mut finished = false;
    let mut repeats: VecDeque<(u64, data::Datagram)> = VecDeque::new();

    loop {
        let repeat_sleep = repeats
            .front()
            .map(|(due, _)| Duration::from_micros(due.saturating_sub(clock.now())));

        tokio::select! {
            next = cursor.next(), if !finished => match next? {
                Some(fragment) => {
                    if !sent_any {
                        sent_any = true;
                        if (fragment.group_id, fragment.object_id) != (0, 0) {
                            writer.encode(&Message::from(message::StartPoint {
                                group_id: fragment.group_id,
                                object_id: fragment.object_id,
                            })).await?;
                        }
                    }

                    for datagram in split_datagrams(media_id, fragment) {
                        send_datagram(session, &datagram).await?;
                        if config.extra_repeat {
                            repeats.push_back((clock.now() + config.extra_repeat_delay, datagram));
                        }
                    }
                }
                None => {
                    finished = true;
                    let (final_group_id, final_object_id) =
                        cache.final_point().ok_or(SessionError::Internal)?;
                    writer.encode(&Message::from(message::FinDatagram {
                        media_id,
                        final_group_id,
                        final_object_id,
                    })).await?;
                }
            },

            msg = reader.decode::<Message>() => {
                let msg = match msg {
                    Ok(msg) => msg,
                    // The subscriber went away; done once we finished.
                    Err(_) if finished => return Ok(()),
                    Err(err) => return Err(err),
                };
                state.receive(&msg)?;

                match msg {
                    Message::RequestRepair(repair) => {
                        send_repair(writer, cache, repair).await?;
                    }
                    other => return Err(SessionError::UnexpectedMessage(other.name())),
                }
            },

            _ = tokio::time::sleep(repeat_sleep.unwrap_or_default()), if repeat_sleep.is_some() => {
                if let Some((_, datagram)) = repeats.pop_front() {
                    send_datagram(session, &datagram).await?;
                }
            },
        }
    }
}

async fn send_datagram(
    session: &mut web_transport::Session,
    datagram: &data::Datagram,
) -> Result<(), SessionError> {
    let mut buf = BytesMut::with_capacity(datagram.payload.len() + 64);
    datagram.encode(&mut buf)?;
    session.send_datagram(buf.freeze()).await?;
    Ok(())
}

// Slice a cached fragment into datagrams that fit the size budget.
fn split_datagrams(media_id: u64, fragment: CachedFragment) -> Vec<data::Datagram> {
    // Conservative allowance for the datagram header fields.
    const HEADER_MAX: usize = 48;
    let budget = MAX_DATAGRAM - HEADER_MAX;

    let mut datagrams = Vec::new();
    let mut at = 0usize;

    loop {
        let len = budget.min(fragment.payload.len() - at);
        let end = at + len;
        let is_tail = end == fragment.payload.len();

        datagrams.push(data::Datagram {
            media_id,
            group_id: fragment.group_id,
            object_id: fragment.object_id,
            offset: fragment.offset + at as u64,
            is_last_fragment: fragment.is_last_fragment && is_tail,
            queue_delay: fragment.queue_delay,
            flags: fragment.flags,
            nb_objects_previous_group: match at {
                0 => fragment.nb_objects_previous_group,
                _ => 0,
            },
            payload: fragment.payload.slice(at..end),
        });

        if is_tail {
            return datagrams;
        }
        at = end;
    }
}

// Retransmit a missing range on the control stream. A zero length asks for
// everything from the offset to the end of the object.
async fn send_repair(
    writer: &mut Writer,
    cache: &CacheReader,
    repair: message::RequestRepair,
) -> Result<(), SessionError> {
    let object_len = cache.object_len(repair.group_id, repair.object_id);

    if let Some(len) = object_len {
        // A range past the object's end crosses into the next object.
        if repair.length > 0 && repair.offset + repair.length > len {
            return Err(SessionError::Malformed("repair range"));
        }
    }

    let (length, is_last) = match repair.length {
        0 => match object_len {
            Some(len) if len > repair.offset => (len - repair.offset, true),
            // The extent is unknown here too; nothing useful to send.
            _ => return Ok(()),
        },
        length => (length, repair.is_last_fragment),
    };

    let nb_objects_previous_group = match repair.object_id == 0
        && repair.offset == 0
        && repair.group_id > 0
    {
        true => cache.group_size(repair.group_id - 1).unwrap_or(0),
        false => 0,
    };

    match cache.read_range(repair.group_id, repair.object_id, repair.offset, length) {
        Some(payload) => {
            writer
                .encode(&Message::from(message::Fragment {
                    group_id: repair.group_id,
                    object_id: repair.object_id,
                    nb_objects_previous_group,
                    offset: repair.offset,
                    is_last_fragment: is_last,
                    flags: 0,
                    payload,
                }))
                .await?;
        }
        None => log::debug!(
            "repair range not cached: group={} object={} offset={} length={}",
            repair.group_id,
            repair.object_id,
            repair.offset,
            length
        ),
    }

    Ok(())
}
