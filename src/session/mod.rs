//! Realtime API session worker
//!
//! Owns a tokio runtime on a dedicated thread. Lifecycle commands arrive from
//! the controller; results go back as `SessionEvent`s on the controller
//! channel. One command pair maps to one connection: `Start` connects,
//! configures the session and streams until `Stop` or failure. Failures are
//! reported and the worker goes quiet — a retry is always a fresh,
//! user-initiated `Start`.

pub mod protocol;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use futures_util::{SinkExt, StreamExt};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
};
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::shared::{ControlEvent, SessionCommand, SessionEvent, TranscriptDelta};

use protocol::{ClientEvent, ServerEvent};

/// Capacity of the audio chunk channel; roughly three seconds of audio
/// before the capture side starts dropping
pub const AUDIO_CHANNEL_CAPACITY: usize = 64;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

fn emit(events_tx: &Sender<ControlEvent>, event: SessionEvent) {
    let _ = events_tx.send(ControlEvent::Session(event));
}

/// Spawn the session worker thread
///
/// `commands_rx` is the controller-facing command channel; `audio_rx`
/// carries PCM16 chunks from the capture stream.
pub fn spawn(
    api: ApiConfig,
    commands_rx: crossbeam_channel::Receiver<SessionCommand>,
    audio_rx: mpsc::Receiver<Vec<i16>>,
    events_tx: Sender<ControlEvent>,
) -> JoinHandle<()> {
    // Bridge the controller's channel into the async world; lives as long as
    // the controller holds its sender
    let (async_commands_tx, async_commands_rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while let Ok(command) = commands_rx.recv() {
            if async_commands_tx.send(command).is_err() {
                break;
            }
        }
    });

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                emit(&events_tx, SessionEvent::Error(format!("runtime: {e}")));
                return;
            }
        };

        runtime.block_on(worker_loop(api, async_commands_rx, audio_rx, events_tx));
        info!("Session worker exiting");
    })
}

async fn worker_loop(
    api: ApiConfig,
    mut commands_rx: mpsc::UnboundedReceiver<SessionCommand>,
    mut audio_rx: mpsc::Receiver<Vec<i16>>,
    events_tx: Sender<ControlEvent>,
) {
    probe_api_key(&api).await;

    while let Some(command) = commands_rx.recv().await {
        match command {
            SessionCommand::Start => {
                info!("Starting Realtime API session");
                let result =
                    run_session(&api, &mut commands_rx, &mut audio_rx, &events_tx).await;
                match result {
                    Ok(()) => info!("Session ended"),
                    Err(e) => {
                        warn!("Session failed: {:#}", e);
                        emit(&events_tx, SessionEvent::Error(format!("{e:#}")));
                    }
                }
                // Every attempt terminates in Stopped, success or not
                emit(&events_tx, SessionEvent::Stopped);
            }
            SessionCommand::Stop => {
                debug!("Stop with no active session, ignoring");
            }
        }
    }
}

/// One connection: configure, stream, tear down
async fn run_session(
    api: &ApiConfig,
    commands_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    audio_rx: &mut mpsc::Receiver<Vec<i16>>,
    events_tx: &Sender<ControlEvent>,
) -> Result<()> {
    let url = format!("{}?model={}", api.base_url, api.model);
    let mut request = url
        .clone()
        .into_client_request()
        .context("Invalid Realtime API URL")?;
    let headers = request.headers_mut();
    headers.insert(
        "Authorization",
        format!("Bearer {}", api.api_key)
            .parse()
            .context("API key is not a valid header value")?,
    );
    headers.insert(
        "OpenAI-Beta",
        "realtime=v1".parse().context("header value")?,
    );

    // Bounded connect keeps a Stop issued mid-start from waiting forever
    let (ws_stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
        .await
        .map_err(|_| anyhow!("Timed out connecting to {url}"))?
        .with_context(|| format!("Failed to connect to {url}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Instructions are re-read on every connect so edits apply to the next
    // session without a restart
    let update = ClientEvent::session_update(api, api.load_instructions());
    ws_tx
        .send(Message::Text(serde_json::to_string(&update)?))
        .await
        .context("Failed to send session configuration")?;
    ws_tx
        .send(Message::Text(serde_json::to_string(
            &ClientEvent::ResponseCreate,
        )?))
        .await
        .context("Failed to request initial response")?;

    emit(events_tx, SessionEvent::Started);
    emit(
        events_tx,
        SessionEvent::Transcript(TranscriptDelta::Notice(
            "Connected to Realtime API, listening...".to_string(),
        )),
    );

    // Discard audio captured while no session was running
    while audio_rx.try_recv().is_ok() {}
    let mut audio_alive = true;

    loop {
        tokio::select! {
            command = commands_rx.recv() => match command {
                Some(SessionCommand::Stop) | None => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(SessionCommand::Start) => {
                    debug!("Start while running, ignoring");
                }
            },
            chunk = audio_rx.recv(), if audio_alive => match chunk {
                Some(chunk) => {
                    let frame = ClientEvent::audio_append(&chunk);
                    ws_tx
                        .send(Message::Text(serde_json::to_string(&frame)?))
                        .await
                        .context("Failed to send audio")?;
                }
                None => {
                    warn!("Audio capture channel closed");
                    audio_alive = false;
                }
            },
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => handle_server_message(&text, events_tx)?,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(anyhow!("Connection closed by server"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(anyhow::Error::from(e).context("WebSocket stream error"));
                }
            },
        }
    }
}

/// Parse and forward one server frame; API error events fail the session
fn handle_server_message(text: &str, events_tx: &Sender<ControlEvent>) -> Result<()> {
    let event: ServerEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            debug!("Unparseable server frame ignored: {}", e);
            return Ok(());
        }
    };

    match event {
        ServerEvent::ResponseTextDelta { delta } => {
            emit(
                events_tx,
                SessionEvent::Transcript(TranscriptDelta::Delta(delta)),
            );
        }
        ServerEvent::ResponseDone => {
            emit(
                events_tx,
                SessionEvent::Transcript(TranscriptDelta::Completed),
            );
        }
        ServerEvent::Error { error } => {
            return Err(anyhow!("API error: {}", error.message));
        }
        ServerEvent::Other => {}
    }
    Ok(())
}

/// One-shot advisory check that the configured key can reach the API
async fn probe_api_key(api: &ApiConfig) {
    let models_url = models_endpoint(&api.base_url);
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(_) => return,
    };

    match client
        .get(&models_url)
        .bearer_auth(&api.api_key)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => {
            info!("API key check passed");
        }
        Ok(response) => {
            warn!("API key check failed: HTTP {}", response.status());
        }
        Err(e) => {
            warn!("API key check could not reach {}: {}", models_url, e);
        }
    }
}

/// Derive the REST models endpoint from the WebSocket base URL
fn models_endpoint(base_url: &str) -> String {
    let http = base_url
        .replacen("wss://", "https://", 1)
        .replacen("ws://", "http://", 1);
    match http.rfind("/realtime") {
        Some(idx) => format!("{}/models", &http[..idx]),
        None => format!("{}/models", http.trim_end_matches('/')),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_models_endpoint_from_ws_base() {
        assert_eq!(
            models_endpoint("wss://api.openai.com/v1/realtime"),
            "https://api.openai.com/v1/models"
        );
        assert_eq!(
            models_endpoint("ws://localhost:8080/v1/realtime"),
            "http://localhost:8080/v1/models"
        );
        assert_eq!(
            models_endpoint("wss://proxy.example.com/v1"),
            "https://proxy.example.com/v1/models"
        );
    }

    #[test]
    fn test_text_delta_is_forwarded() {
        let (events_tx, events_rx) = unbounded();

        handle_server_message(r#"{"type":"response.text.delta","delta":"Hi"}"#, &events_tx)
            .unwrap();

        assert_eq!(
            events_rx.try_recv().unwrap(),
            ControlEvent::Session(SessionEvent::Transcript(TranscriptDelta::Delta(
                "Hi".to_string()
            )))
        );
    }

    #[test]
    fn test_response_done_seals_block() {
        let (events_tx, events_rx) = unbounded();

        handle_server_message(r#"{"type":"response.done"}"#, &events_tx).unwrap();

        assert_eq!(
            events_rx.try_recv().unwrap(),
            ControlEvent::Session(SessionEvent::Transcript(TranscriptDelta::Completed))
        );
    }

    #[test]
    fn test_api_error_fails_the_session() {
        let (events_tx, _events_rx) = unbounded();

        let result = handle_server_message(
            r#"{"type":"error","error":{"message":"bad key"}}"#,
            &events_tx,
        );

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("bad key"));
    }

    #[test]
    fn test_unknown_and_garbage_frames_are_ignored() {
        let (events_tx, events_rx) = unbounded();

        handle_server_message(r#"{"type":"session.created"}"#, &events_tx).unwrap();
        handle_server_message("not json at all", &events_tx).unwrap();

        assert!(events_rx.try_recv().is_err());
    }
}
