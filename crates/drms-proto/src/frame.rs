//! Request/response framing over the client-server TCP connection (spec
//! §6): a 32-bit opcode followed by a length-prefixed key-value argument
//! list, and a 32-bit `rinfo` status word written back immediately.
//! Grounded on the length-prefix-then-payload pattern in
//! `connector_proxy::connector_runners::commandutils::handle_stream`,
//! ported from sync `std::io::Read`/`Write` to `tokio::io::AsyncRead`/
//! `AsyncWrite` (the teacher's async I/O stack for network connections).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::Result;
use crate::opcode::Opcode;

pub struct RequestFrame {
    pub opcode: Opcode,
    pub args: Vec<u8>,
}

/// Reads one request frame: `i32` opcode, `u32` payload length, payload.
pub async fn read_request<R: AsyncReadExt + Unpin>(r: &mut R) -> Result<RequestFrame> {
    let opcode = r.read_i32().await?;
    let len = r.read_u32().await? as usize;
    let mut args = vec![0u8; len];
    r.read_exact(&mut args).await?;
    Ok(RequestFrame {
        opcode: Opcode::try_from(opcode)?,
        args,
    })
}

pub async fn write_request<W: AsyncWriteExt + Unpin>(w: &mut W, opcode: Opcode, args: &[u8]) -> Result<()> {
    w.write_i32(opcode.to_i32()).await?;
    w.write_u32(args.len() as u32).await?;
    w.write_all(args).await?;
    w.flush().await?;
    Ok(())
}

/// Writes the immediate `rinfo` acknowledgement (spec §4.6 step 4).
pub async fn write_rinfo<W: AsyncWriteExt + Unpin>(w: &mut W, rinfo: i32) -> Result<()> {
    w.write_i32(rinfo).await?;
    w.flush().await?;
    Ok(())
}

pub async fn read_rinfo<R: AsyncReadExt + Unpin>(r: &mut R) -> Result<i32> {
    Ok(r.read_i32().await?)
}
