use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use str0m::channel::ChannelId;
use str0m::media::Mid;
use str0m::{Event, IceConnectionState, Input, Output, Rtc};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep_until;

use crate::codec::{pcm16_to_f32, OpusCodec};
use crate::manager::WebrtcEvent;

/// Pumps `str0m`'s Sans-IO event loop against a real UDP socket: reads
/// incoming datagrams into `rtc.handle_input`, and writes whatever
/// `rtc.poll_output` wants transmitted. Host-candidate-only ICE, no TURN
/// relay and no ICE restart — this process runs on the same machine as the
/// realtime service's media relay, so a single local UDP socket is enough.
pub(crate) async fn drive_io(
    rtc: Arc<Mutex<Rtc>>,
    socket: UdpSocket,
    data_channel: ChannelId,
    audio_track: Mid,
    decoder: Arc<Mutex<OpusCodec>>,
    dc_open: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<WebrtcEvent>,
) {
    let mut recv_buf = vec![0u8; 2048];

    loop {
        let timeout = {
            let mut guard = rtc.lock().await;
            loop {
                match guard.poll_output() {
                    Ok(Output::Timeout(deadline)) => break deadline,
                    Ok(Output::Transmit(transmit)) => {
                        if let Err(e) = socket.send_to(&transmit.contents, transmit.destination).await {
                            tracing::warn!("webrtc transmit failed: {e}");
                        }
                    }
                    Ok(Output::Event(event)) => {
                        drop(guard);
                        handle_event(event, data_channel, audio_track, &decoder, &dc_open, &events).await;
                        guard = rtc.lock().await;
                    }
                    Err(e) => {
                        tracing::warn!("webrtc poll_output failed: {e}");
                        let _ = events.send(WebrtcEvent::Closed);
                        return;
                    }
                }
            }
        };

        let deadline = tokio::time::Instant::from_std(timeout);

        tokio::select! {
            _ = sleep_until(deadline) => {
                let mut guard = rtc.lock().await;
                let _ = guard.handle_input(Input::Timeout(Instant::now()));
            }
            received = socket.recv_from(&mut recv_buf) => {
                match received {
                    Ok((n, source)) => {
                        let mut guard = rtc.lock().await;
                        let contents = recv_buf[..n].to_vec().try_into();
                        if let Ok(contents) = contents {
                            let input = Input::Receive(
                                Instant::now(),
                                str0m::net::Receive {
                                    source,
                                    destination: socket.local_addr().unwrap_or(source),
                                    contents,
                                },
                            );
                            if let Err(e) = guard.handle_input(input) {
                                tracing::warn!("webrtc handle_input failed: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("webrtc socket recv failed: {e}");
                        let _ = events.send(WebrtcEvent::Closed);
                        return;
                    }
                }
            }
        }
    }
}

async fn handle_event(
    event: Event,
    data_channel: ChannelId,
    audio_track: Mid,
    decoder: &Arc<Mutex<OpusCodec>>,
    dc_open: &Arc<AtomicBool>,
    events: &mpsc::UnboundedSender<WebrtcEvent>,
) {
    match event {
        Event::ChannelOpen(id, _label) if id == data_channel => {
            dc_open.store(true, Ordering::Release);
            let _ = events.send(WebrtcEvent::DataChannelOpen);
        }
        Event::ChannelData(data) if data.id == data_channel => {
            let _ = events.send(WebrtcEvent::DataChannelMessage(data.data));
        }
        Event::MediaData(media) if media.mid == audio_track => {
            match decoder.lock().await.decode(&media.data) {
                Ok(pcm) => {
                    let _ = events.send(WebrtcEvent::RemoteAudio(pcm16_to_f32(&pcm)));
                }
                Err(e) => tracing::warn!("failed to decode incoming opus frame: {e}"),
            }
        }
        Event::Connected => {}
        Event::IceConnectionStateChange(IceConnectionState::Disconnected) => {
            // §4.1/§7: ICE failure is fatal to the current attempt, no retry —
            // reported the same way a transport close is (`WebrtcEvent::Closed`),
            // which the controller maps to `ERROR`.
            tracing::warn!("ice connection disconnected");
            let _ = events.send(WebrtcEvent::Closed);
        }
        Event::IceConnectionStateChange(_) => {}
        _ => {}
    }
}
