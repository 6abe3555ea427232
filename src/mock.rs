//! Scripted stand-in for a mount on the far end of an in-memory link.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::constants::END_CHAR;

const LINK_BUFFER: usize = 1024;

/// A device task answering each received frame through a handler.
///
/// The handler sees the frame without its trailing `\r` (e.g. `":j1"`) and
/// returns the raw bytes to send back, or `None` to stay silent. Replies are
/// written verbatim, so a handler can produce malformed frames on purpose.
pub struct MockMount {
    frames: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl MockMount {
    /// Start the device. Returns the host end of the link and the device handle.
    pub fn spawn<F>(handler: F) -> (DuplexStream, MockMount)
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        let (host, device) = duplex(LINK_BUFFER);
        let frames = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(serve(device, Arc::clone(&frames), handler));
        (host, MockMount { frames, task })
    }

    /// Start a device answering with `replies`.
    pub fn with_replies(replies: MountReplies) -> (DuplexStream, MockMount) {
        MockMount::spawn(move |frame| replies.reply(frame))
    }

    /// Every frame received so far, in order.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn clear_frames(&self) {
        self.frames.lock().clear();
    }
}

impl Drop for MockMount {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<F>(mut device: DuplexStream, frames: Arc<Mutex<Vec<String>>>, mut handler: F)
where
    F: FnMut(&str) -> Option<String>,
{
    let mut pending = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = match device.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            if b != END_CHAR {
                pending.push(b);
                continue;
            }
            let frame = String::from_utf8_lossy(&pending).into_owned();
            pending.clear();
            trace!("mock received {:?}", frame);
            frames.lock().push(frame.clone());

            if let Some(reply) = handler(&frame) {
                if device.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Canned answers of a healthy mount.
///
/// Position and parameter reads return the configured payloads, frames
/// starting with one of `rejected` get `!0`, frames starting with one of
/// `silent` get nothing, and every other command is acknowledged with `=`.
#[derive(Debug, Clone)]
pub struct MountReplies {
    pub ra_position: String,
    pub dec_position: String,
    pub steps_per_rev: String,
    pub version: String,
    pub rejected: Vec<String>,
    pub silent: Vec<String>,
}

impl Default for MountReplies {
    fn default() -> Self {
        MountReplies {
            ra_position: "0.000000".to_string(),
            dec_position: "0.000000".to_string(),
            steps_per_rev: "00204E".to_string(),
            version: "020A01".to_string(),
            rejected: Vec::new(),
            silent: Vec::new(),
        }
    }
}

impl MountReplies {
    pub fn positions(mut self, ra: &str, dec: &str) -> Self {
        self.ra_position = ra.to_string();
        self.dec_position = dec.to_string();
        self
    }

    pub fn steps_per_rev(mut self, payload: &str) -> Self {
        self.steps_per_rev = payload.to_string();
        self
    }

    pub fn reject(mut self, prefix: &str) -> Self {
        self.rejected.push(prefix.to_string());
        self
    }

    pub fn ignore(mut self, prefix: &str) -> Self {
        self.silent.push(prefix.to_string());
        self
    }

    pub fn reply(&self, frame: &str) -> Option<String> {
        if self.silent.iter().any(|p| frame.starts_with(p.as_str())) {
            return None;
        }
        if self.rejected.iter().any(|p| frame.starts_with(p.as_str())) {
            return Some("!0\r".to_string());
        }

        let payload = match frame {
            ":j1" => self.ra_position.as_str(),
            ":j2" => self.dec_position.as_str(),
            ":a1" | ":a2" => self.steps_per_rev.as_str(),
            ":e1" | ":e2" => self.version.as_str(),
            _ => "",
        };
        Some(format!("={payload}\r"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_replies() {
        let replies = MountReplies::default()
            .positions("123.5", "-10.25")
            .reject(":S2")
            .ignore(":K");
        assert_eq!(replies.reply(":j1").as_deref(), Some("=123.5\r"));
        assert_eq!(replies.reply(":j2").as_deref(), Some("=-10.25\r"));
        assert_eq!(replies.reply(":a1").as_deref(), Some("=00204E\r"));
        assert_eq!(replies.reply(":S2001000").as_deref(), Some("!0\r"));
        assert_eq!(replies.reply(":S1001000").as_deref(), Some("=\r"));
        assert_eq!(replies.reply(":K1"), None);
    }

    #[tokio::test]
    async fn records_frames_and_answers() {
        let (mut host, mount) = MockMount::spawn(|frame| Some(format!("={}\r", frame.len())));
        host.write_all(b":e1\r:F2\r").await.unwrap();

        let mut reply = [0u8; 6];
        host.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"=3\r=3\r");
        assert_eq!(mount.frames(), vec![":e1", ":F2"]);

        mount.clear_frames();
        assert!(mount.frames().is_empty());
    }
}
