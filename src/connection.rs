use anyhow::{anyhow, Result};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::http::Frame;

pub(crate) struct Connection {
    stream: BufWriter<TcpStream>,

    buf: BytesMut,
    interim_sent: bool,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(stream),
            buf: BytesMut::with_capacity(1024 * 4),
            interim_sent: false,
        }
    }

    pub async fn read<T: Frame>(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(frame) = self.parse()? {
                self.interim_sent = false;
                return Ok(Some(frame));
            }

            if !self.interim_sent {
                if let Some(reply) = T::interim(&self.buf[..]) {
                    self.stream.write_all(reply).await?;
                    self.stream.flush().await?;
                    self.interim_sent = true;
                }
            }

            if 0 == self.stream.read_buf(&mut self.buf).await? {
                if self.buf.is_empty() {
                    return Ok(None);
                } else {
                    return Err(anyhow!("connection reset by peer"));
                }
            }
        }
    }

    fn parse<T: Frame>(&mut self) -> Result<Option<T>> {
        match T::parse(&self.buf[..])? {
            Some((frame, len)) => {
                self.buf.advance(len);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    pub async fn write<T: Frame>(&mut self, frame: &T) -> Result<()> {
        self.stream.write_all(&frame.encode()).await?;

        self.stream.flush().await.map_err(|e| anyhow!(e))
    }
}
