// Socket plumbing: turn a venue endpoint into a stream of raw text frames.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

use crate::market_data::adapters::FeedError;

/// Raw text frames from one connection. Ends when the server closes; yields
/// a single `Err` and then ends on transport failure.
pub type RawStream = BoxStream<'static, Result<String, FeedError>>;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str, subscribe: Option<String>) -> Result<RawStream, FeedError>;
}

/// Live websocket connector (tokio-tungstenite).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str, subscribe: Option<String>) -> Result<RawStream, FeedError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| FeedError::Transport(format!("connect {endpoint}: {e}")))?;
        info!(endpoint, status = %response.status(), "Websocket connected");

        let (mut write, read) = ws_stream.split();
        if let Some(msg) = subscribe {
            debug!(endpoint, %msg, "Sending subscription");
            write
                .send(Message::Text(msg))
                .await
                .map_err(|e| FeedError::Transport(format!("subscribe: {e}")))?;
        }

        // The write half rides along in the state so the connection stays
        // fully open for as long as the stream is read.
        let frames = stream::unfold(Some((read, write)), |state| async move {
            let (mut read, write) = state?;
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => return Some((Ok(text), Some((read, write)))),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => return Some((Ok(text), Some((read, write)))),
                        Err(_) => debug!("Dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        info!(?frame, "Server closed websocket");
                        return None;
                    }
                    // ping/pong are answered by tungstenite itself
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Some((Err(FeedError::Transport(e.to_string())), None)),
                    None => return None,
                }
            }
        });
        Ok(frames.boxed())
    }
}

/// Connector that replays canned frames; useful to drive pipelines offline.
#[derive(Debug, Clone, Default)]
pub struct ReplayConnector {
    frames: Vec<Result<String, String>>,
}

impl ReplayConnector {
    pub fn new<I, S>(frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { frames: frames.into_iter().map(|f| Ok(f.into())).collect() }
    }

    /// Append a transport failure after the canned frames.
    pub fn then_fail(mut self, reason: &str) -> Self {
        self.frames.push(Err(reason.to_string()));
        self
    }
}

#[async_trait]
impl Connector for ReplayConnector {
    async fn connect(&self, endpoint: &str, _subscribe: Option<String>) -> Result<RawStream, FeedError> {
        debug!(endpoint, frames = self.frames.len(), "Replaying canned frames");
        let frames = self.frames.clone().into_iter().map(|f| f.map_err(FeedError::Transport));
        Ok(stream::iter(frames).boxed())
    }
}
