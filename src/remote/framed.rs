use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::error::{RemoteError, WireError};
use crate::remote::wire::{MAX_FRAME_LENGTH, Message};

/// Length-prefixed message stream: `[u32 LE length][tag][payload]`.
#[derive(Debug)]
pub struct FramedStream<S> {
    reader: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::new(stream),
        }
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), RemoteError> {
        let body = message.encode();
        let stream = self.reader.get_mut();
        stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
        stream.write_all(&body).await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Result<Message, RemoteError> {
        let mut length_bytes = [0u8; 4];
        match self.reader.read_exact(&mut length_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Connection closed while reading frame length");
                return Err(RemoteError::Disconnected);
            }
            Err(e) => return Err(RemoteError::Io(e)),
        }

        let frame_length = u32::from_le_bytes(length_bytes) as usize;
        if frame_length == 0 || frame_length > MAX_FRAME_LENGTH {
            return Err(WireError::InvalidFrameLength(frame_length).into());
        }
        debug!("Read frame length: {}", frame_length);

        let mut frame_data = vec![0u8; frame_length];
        match self.reader.read_exact(&mut frame_data).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Connection closed mid-frame");
                return Err(RemoteError::Disconnected);
            }
            Err(e) => return Err(RemoteError::Io(e)),
        }

        Ok(Message::try_from(frame_data.as_slice())?)
    }
}
