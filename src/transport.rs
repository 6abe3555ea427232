use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{self, Duration, Instant};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, trace};

use crate::constants::*;
use crate::types::Axis;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("link not connected")]
    LinkNotOpen,
    #[error("no response terminator within {0:?}")]
    Timeout(Duration),
    #[error("device rejected command (code {0:?})")]
    DeviceRejected(String),
    #[error("malformed response: {0:?}")]
    MalformedResponse(String),
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ChannelError {
    /// Whether the link itself failed and should be dropped.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, ChannelError::Io(_))
    }
}

/// Outcome of one command: the payload between `=` and `\r`, or why there is none.
pub type Response = Result<String, ChannelError>;

/// Open `port` with the mount's fixed framing: 8 data bits, no parity, one
/// stop bit, no flow control.
pub fn open_serial(port: &str, baud_rate: u32) -> Result<SerialStream, tokio_serial::Error> {
    tokio_serial::new(port, baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open_native_async()
}

/// Serialized request/response exchange with the mount.
///
/// Every command is one frame out, `:<opcode><axis><data>\r`, and one frame
/// back, `=<data>\r` or `!<code>\r`. The channel owns the link, so taking
/// `&mut self` in [`CommandChannel::send`] is what keeps exchanges from
/// interleaving.
pub struct CommandChannel<L> {
    link: Option<L>,
    name: String,
    timeout: Duration,
}

impl<L> CommandChannel<L>
where
    L: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(timeout: Duration) -> Self {
        CommandChannel {
            link: None,
            name: String::new(),
            timeout,
        }
    }

    pub fn open(&mut self, name: impl Into<String>, link: L) {
        self.name = name.into();
        self.link = Some(link);
        debug!(port = %self.name, "link open");
    }

    /// Release the link. Sending afterwards fails with [`ChannelError::LinkNotOpen`].
    pub fn close(&mut self) -> Option<L> {
        let link = self.link.take();
        if link.is_some() {
            debug!(port = %self.name, "link closed");
        }
        link
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Name the link was opened under, e.g. the serial port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one command and wait for its reply.
    ///
    /// Stale input is discarded before the frame goes out. The whole exchange
    /// shares one deadline, the timeout the channel was created with. A link
    /// that never falls quiet times out without the frame being sent.
    pub async fn send(&mut self, axis: Axis, opcode: char, data: &str) -> Response {
        let timeout = self.timeout;
        let link = self.link.as_mut().ok_or(ChannelError::LinkNotOpen)?;
        let deadline = Instant::now() + timeout;

        let stale = drain(link, deadline, timeout).await?;
        if stale > 0 {
            debug!(port = %self.name, "discarded {stale} stale bytes");
        }

        let frame = format!("{START_CHAR_OUT}{opcode}{}{data}\r", axis.as_char());
        debug!(port = %self.name, "-> {:?}", frame);
        link.write_all(frame.as_bytes()).await?;
        link.flush().await?;

        let reply = read_reply(link, deadline, timeout).await;
        match &reply {
            Ok(payload) => debug!(port = %self.name, "<- ={:?}", payload),
            Err(e) => debug!(port = %self.name, "<- {e}"),
        }
        reply
    }
}

/// Read and throw away whatever is waiting on the link, until it has been
/// quiet for [`DRAIN_POLL`] or `deadline` passes.
async fn drain<L: AsyncRead + Unpin>(
    link: &mut L,
    deadline: Instant,
    timeout: Duration,
) -> Result<usize, ChannelError> {
    let mut discard = [0u8; 64];
    let mut total = 0;
    loop {
        if Instant::now() >= deadline {
            debug!("link still busy after {total} stale bytes");
            return Err(ChannelError::Timeout(timeout));
        }
        match time::timeout(DRAIN_POLL, link.read(&mut discard)).await {
            // silent, or closed; the read phase reports a closed link
            Err(_) | Ok(Ok(0)) => return Ok(total),
            Ok(Ok(n)) => {
                trace!("drained {:?}", String::from_utf8_lossy(&discard[..n]));
                total += n;
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => return Ok(total),
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

/// Next byte, or `None` once the deadline passes.
async fn read_byte<L: AsyncRead + Unpin>(
    link: &mut L,
    deadline: Instant,
) -> Result<Option<u8>, ChannelError> {
    let mut byte = [0u8; 1];
    match time::timeout_at(deadline, link.read(&mut byte)).await {
        Err(_) => Ok(None),
        Ok(Ok(0)) => Err(ChannelError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "link closed by device",
        ))),
        Ok(Ok(_)) => Ok(Some(byte[0])),
        Ok(Err(e)) => Err(e.into()),
    }
}

async fn read_reply<L: AsyncRead + Unpin>(
    link: &mut L,
    deadline: Instant,
    timeout: Duration,
) -> Response {
    let Some(lead) = read_byte(link, deadline).await? else {
        return Err(ChannelError::Timeout(timeout));
    };

    let mut body = Vec::new();
    let terminated = loop {
        match read_byte(link, deadline).await? {
            Some(END_CHAR) => break true,
            Some(b) => body.push(b),
            None => break false,
        }
    };

    let text = String::from_utf8_lossy(&body).into_owned();
    match lead {
        START_CHAR_IN | ERROR_CHAR if !terminated => Err(ChannelError::Timeout(timeout)),
        _ if !body.is_ascii() => Err(ChannelError::MalformedResponse(text)),
        START_CHAR_IN => Ok(text),
        ERROR_CHAR => Err(ChannelError::DeviceRejected(text)),
        other => {
            let mut raw = String::from(other as char);
            raw.push_str(&text);
            Err(ChannelError::MalformedResponse(raw))
        }
    }
}
