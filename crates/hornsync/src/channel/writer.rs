use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use super::ChannelError;
use super::CommandChannel;
use crate::horn::HornState;

/// [`CommandChannel`] over any async byte sink.
pub struct WriterChannel<W> {
    name: String,
    writer: Option<W>,
    write_timeout: Duration,
}

impl<W> WriterChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(name: impl Into<String>, writer: W, write_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            writer: Some(writer),
            write_timeout,
        }
    }
}

#[async_trait]
impl<W> CommandChannel for WriterChannel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn send(&mut self, state: HornState) -> Result<(), ChannelError> {
        let writer = self.writer.as_mut().ok_or(ChannelError::NotConnected)?;
        let command = [state.command_byte()];

        let write = async {
            writer.write_all(&command).await?;
            writer.flush().await
        };

        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(Ok(())) => {
                tracing::debug!("Sent {} to {}", state, self.name);
                Ok(())
            }
            Ok(Err(e)) => Err(ChannelError::Closed(e)),
            Err(_) => Err(ChannelError::Timeout(self.write_timeout)),
        }
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
            tracing::debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn test_writes_one_byte_per_command() {
        let (client, mut device) = tokio::io::duplex(64);
        let mut channel = WriterChannel::new("duplex", client, Duration::from_secs(1));

        channel.send(HornState::On).await.unwrap();
        channel.send(HornState::Off).await.unwrap();
        channel.send(HornState::On).await.unwrap();
        channel.close().await.unwrap();

        let mut received = Vec::new();
        device.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"101");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_device_times_out() {
        // Nobody reads, so the one byte buffer fills after the first command.
        let (client, _device) = tokio::io::duplex(1);
        let mut channel = WriterChannel::new("duplex", client, Duration::from_millis(200));

        channel.send(HornState::On).await.unwrap();
        let err = channel.send(HornState::Off).await.unwrap_err();
        assert!(matches!(err, ChannelError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (client, _device) = tokio::io::duplex(8);
        let mut channel = WriterChannel::new("duplex", client, Duration::from_secs(1));

        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert!(matches!(
            channel.send(HornState::On).await,
            Err(ChannelError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_vanished_device_is_io_error() {
        let (client, device) = tokio::io::duplex(8);
        drop(device);
        let mut channel = WriterChannel::new("duplex", client, Duration::from_secs(1));

        assert!(matches!(
            channel.send(HornState::On).await,
            Err(ChannelError::Closed(_))
        ));
    }
}
