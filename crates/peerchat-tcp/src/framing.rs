//! Length-delimited framing of protocol messages
//!
//! Each frame carries one bincode-encoded [`Msg`]. The reader rejects message
//! codes the negotiated protocol does not define.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use peerchat_core::{Msg, MsgReader, MsgWriter, Protocol, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec, LengthDelimitedCodecError};

pub(crate) fn codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_len)
        .new_codec()
}

/// The codec reports an over-long frame as an IO error wrapping its own error type
fn frame_error(e: std::io::Error, limit: usize) -> TransportError {
    let too_large = e
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if too_large {
        TransportError::FrameTooLarge { limit }
    } else {
        TransportError::NetworkIo(e)
    }
}

// ----------------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------------

pub(crate) struct FrameReader<R> {
    inner: FramedRead<R, LengthDelimitedCodec>,
    protocol: Protocol,
}

impl<R> FrameReader<R> {
    pub(crate) fn new(inner: FramedRead<R, LengthDelimitedCodec>, protocol: Protocol) -> Self {
        Self { inner, protocol }
    }
}

#[async_trait::async_trait]
impl<R> MsgReader for FrameReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async fn read_msg(&mut self) -> peerchat_core::Result<Msg> {
        let frame = match self.inner.next().await {
            Some(frame) => {
                frame.map_err(|e| frame_error(e, self.inner.decoder().max_frame_length()))?
            }
            None => return Err(TransportError::Eof),
        };

        let msg: Msg = bincode::deserialize(&frame).map_err(TransportError::decode)?;
        if !self.protocol.accepts(msg.code) {
            return Err(TransportError::UnknownCode {
                code: msg.code,
                length: self.protocol.length,
            });
        }
        Ok(msg)
    }
}

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

pub(crate) struct FrameWriter<W> {
    inner: FramedWrite<W, LengthDelimitedCodec>,
}

impl<W> FrameWriter<W> {
    pub(crate) fn new(inner: FramedWrite<W, LengthDelimitedCodec>) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<W> MsgWriter for FrameWriter<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_msg(&mut self, msg: Msg) -> peerchat_core::Result<()> {
        let frame = bincode::serialize(&msg).map_err(TransportError::encode)?;
        let limit = self.inner.encoder().max_frame_length();
        self.inner
            .send(Bytes::from(frame))
            .await
            .map_err(|e| frame_error(e, limit))
    }
}
