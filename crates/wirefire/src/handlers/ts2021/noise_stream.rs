//! asyncread/asyncwrite adapter over the post-upgrade noise transport.
//!
//! wraps the raw upgraded tcp stream with noise record framing so hyper can
//! run http/2 on top. records on the wire are
//! `[type:1=0x04][len:2 be][ciphertext]`; ciphertext is plaintext plus the
//! 16-byte aead tag, with at most 4077 plaintext bytes per record.

use bytes::{Buf, BytesMut};
use hyper_util::rt::TokioIo;
use std::io::{self, ErrorKind};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

use wirefire_proto::NoiseTransport;

use super::{MAX_PLAINTEXT_SIZE, MSG_TYPE_RECORD};

/// cap on the record accumulation buffer. a record's length field is u16,
/// so ~64k covers any single record; headroom for reads spanning records.
const MAX_PENDING_RECORD_SIZE: usize = 128 * 1024;

/// noise-encrypted stream over an upgraded http connection.
pub(super) struct NoiseStream {
    io: TokioIo<hyper::upgrade::Upgraded>,
    transport: NoiseTransport,
    /// decrypted plaintext not yet returned to the caller.
    read_buffer: BytesMut,
    /// wire bytes of a record that has not fully arrived.
    pending_record: BytesMut,
    /// encrypted record bytes not yet fully written. records are atomic;
    /// a partial write must be completed before the next record starts.
    write_buffer: BytesMut,
    /// plaintext length represented by `write_buffer`, reported to the
    /// caller once the buffered record is flushed.
    write_pending_plaintext_len: usize,
}

impl NoiseStream {
    pub(super) fn new(io: TokioIo<hyper::upgrade::Upgraded>, transport: NoiseTransport) -> Self {
        Self {
            io,
            transport,
            read_buffer: BytesMut::new(),
            pending_record: BytesMut::new(),
            write_buffer: BytesMut::new(),
            write_pending_plaintext_len: 0,
        }
    }
}

impl AsyncRead for NoiseStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // serve buffered plaintext first
        if !this.read_buffer.is_empty() {
            let len = std::cmp::min(buf.remaining(), this.read_buffer.len());
            buf.put_slice(&this.read_buffer[..len]);
            this.read_buffer.advance(len);
            return Poll::Ready(Ok(()));
        }

        loop {
            // try to parse a complete record from what we have
            if this.pending_record.len() >= 3 {
                let msg_type = this.pending_record[0];
                let msg_len =
                    u16::from_be_bytes([this.pending_record[1], this.pending_record[2]]) as usize;
                let total_len = 3 + msg_len;

                if msg_type != MSG_TYPE_RECORD {
                    return Poll::Ready(Err(io::Error::new(
                        ErrorKind::InvalidData,
                        format!(
                            "unexpected noise message type: expected 0x{:02x}, got 0x{:02x}",
                            MSG_TYPE_RECORD, msg_type
                        ),
                    )));
                }

                if this.pending_record.len() >= total_len {
                    let plaintext = this
                        .transport
                        .decrypt(&this.pending_record[3..total_len])
                        .map_err(|e| {
                            io::Error::new(
                                ErrorKind::InvalidData,
                                format!("noise decrypt failed: {}", e),
                            )
                        })?;

                    this.pending_record.advance(total_len);

                    let copy_len = std::cmp::min(buf.remaining(), plaintext.len());
                    buf.put_slice(&plaintext[..copy_len]);
                    if copy_len < plaintext.len() {
                        this.read_buffer.extend_from_slice(&plaintext[copy_len..]);
                    }

                    return Poll::Ready(Ok(()));
                }
            }

            // need more wire data
            let mut tmp = [0u8; 4096];
            let mut read_buf = ReadBuf::new(&mut tmp);

            match Pin::new(&mut this.io).poll_read(cx, &mut read_buf) {
                Poll::Ready(Ok(())) => {
                    let received = read_buf.filled();
                    if received.is_empty() {
                        if this.pending_record.is_empty() {
                            debug!("noise stream: clean eof");
                            return Poll::Ready(Ok(()));
                        }
                        return Poll::Ready(Err(io::Error::new(
                            ErrorKind::UnexpectedEof,
                            "connection closed with incomplete noise record",
                        )));
                    }

                    this.pending_record.extend_from_slice(received);

                    if this.pending_record.len() > MAX_PENDING_RECORD_SIZE {
                        return Poll::Ready(Err(io::Error::new(
                            ErrorKind::InvalidData,
                            "noise record accumulation buffer exceeded maximum size",
                        )));
                    }
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl AsyncWrite for NoiseStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        // finish a partially written record before accepting new data
        if !this.write_buffer.is_empty() {
            let pending = &this.write_buffer[..];
            match Pin::new(&mut this.io).poll_write(cx, pending) {
                Poll::Ready(Ok(written)) => {
                    this.write_buffer.advance(written);
                    if this.write_buffer.is_empty() {
                        let plaintext_len = this.write_pending_plaintext_len;
                        this.write_pending_plaintext_len = 0;
                        return Poll::Ready(Ok(plaintext_len));
                    }
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }

        // chunk to the per-record plaintext limit
        let to_write = std::cmp::min(buf.len(), MAX_PLAINTEXT_SIZE);

        let ciphertext = this.transport.encrypt(&buf[..to_write]).map_err(|e| {
            io::Error::new(ErrorKind::InvalidData, format!("noise encrypt failed: {}", e))
        })?;

        let mut msg = BytesMut::with_capacity(3 + ciphertext.len());
        msg.extend_from_slice(&[MSG_TYPE_RECORD]);
        msg.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        msg.extend_from_slice(&ciphertext);

        let msg_len = msg.len();
        match Pin::new(&mut this.io).poll_write(cx, &msg) {
            Poll::Ready(Ok(written)) => {
                if written == msg_len {
                    Poll::Ready(Ok(to_write))
                } else {
                    msg.advance(written);
                    this.write_buffer = msg;
                    this.write_pending_plaintext_len = to_write;
                    cx.waker().wake_by_ref();
                    Poll::Pending
                }
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => {
                // the record is already encrypted; it must go out next
                this.write_buffer = msg;
                this.write_pending_plaintext_len = to_write;
                Poll::Pending
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        while !this.write_buffer.is_empty() {
            let pending = this.write_buffer.clone();
            match Pin::new(&mut this.io).poll_write(cx, &pending) {
                Poll::Ready(Ok(written)) => {
                    this.write_buffer.advance(written);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        this.write_pending_plaintext_len = 0;
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}
