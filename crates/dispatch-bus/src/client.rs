//! Bus client connect helper, shared by the scheduler and producer binaries.
//!
//! Connects, sends the single `register` frame for the given role, and
//! hands back the split sink/source so the caller drives its own loop
//! (schedulers decode job payloads into `TaskDescription`s; producers push
//! `job_request` frames). Keeping this crate ignorant of `SchedulerManager`
//! or producer timing keeps the wire plumbing reusable for both roles.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use dispatch_common::wire::{Envelope, RegisterKind};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
pub type WsSource = futures_util::stream::SplitStream<WsStream>;

/// Connects to `url` and registers as `kind`. Returns the split halves of
/// the connection for the caller to drive.
pub async fn connect(url: &str, kind: RegisterKind) -> anyhow::Result<(WsSink, WsSource)> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
    let (mut sink, source) = ws_stream.split();
    sink.send(Message::Text(Envelope::register(kind).to_frame().into()))
        .await?;
    Ok((sink, source))
}
