//! Minimal Discord IPC client.
//!
//! Frames are a little-endian `u32` opcode, a little-endian `u32` payload
//! length and a JSON payload.

use anyhow::{bail, Context, Result};
use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

pub(crate) const OP_HANDSHAKE: u32 = 0;
pub(crate) const OP_FRAME: u32 = 1;
pub(crate) const OP_CLOSE: u32 = 2;

// Discord refuses larger payloads.
const MAX_PAYLOAD: usize = 64 * 1024;

pub(crate) fn encode(op: u32, payload: &Value) -> Result<BytesMut> {
    let body = serde_json::to_vec(payload)?;
    let mut buf = BytesMut::with_capacity(8 + body.len());
    buf.put_u32_le(op);
    buf.put_u32_le(u32::try_from(body.len()).context("payload too large")?);
    buf.put_slice(&body);
    Ok(buf)
}

pub(crate) async fn read_frame(stream: &mut UnixStream) -> Result<(u32, Value)> {
    let mut header = [0u8; 8];
    stream
        .read_exact(&mut header)
        .await
        .context("read frame header")?;
    let mut header = &header[..];
    let op = header.get_u32_le();
    let len = header.get_u32_le() as usize;
    if len > MAX_PAYLOAD {
        bail!("frame of {len} bytes exceeds limit");
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .context("read frame body")?;
    let value = serde_json::from_slice(&body).context("decode frame")?;
    Ok((op, value))
}

/// Candidate socket paths, in the order Discord clients are usually found.
pub(crate) fn candidate_sockets() -> Vec<PathBuf> {
    let mut bases: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(std::env::var_os)
        .map(PathBuf::from)
        .collect();
    bases.push(PathBuf::from("/tmp"));

    let subdirs = [
        "",
        "app/com.discordapp.Discord",
        "app/com.discordapp.DiscordCanary",
        "snap.discord",
        ".flatpak/dev.vencord.Vesktop/xdg-run",
    ];

    let mut out = Vec::new();
    for base in &bases {
        for sub in subdirs {
            for i in 0..10 {
                out.push(base.join(sub).join(format!("discord-ipc-{i}")));
            }
        }
    }
    out
}

pub(crate) struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect to the first reachable socket among `candidates`.
    pub(crate) async fn connect_any(candidates: &[PathBuf], client_id: &str) -> Result<Self> {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            if let Ok(client) = Self::connect(path, client_id).await {
                return Ok(client);
            }
        }
        bail!("no Discord IPC socket available")
    }

    pub(crate) async fn connect(path: &Path, client_id: &str) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .await
            .with_context(|| format!("connect {}", path.display()))?;
        let mut client = Self { stream };

        client
            .send(OP_HANDSHAKE, &json!({ "v": 1, "client_id": client_id }))
            .await
            .context("handshake")?;
        let (op, ready) = read_frame(&mut client.stream).await.context("handshake")?;
        if op == OP_CLOSE || ready["evt"] != "READY" {
            bail!("handshake rejected: {ready}");
        }
        Ok(client)
    }

    async fn send(&mut self, op: u32, payload: &Value) -> Result<()> {
        let frame = encode(op, payload)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    /// Replace the presence; `None` clears it.
    pub(crate) async fn set_activity(&mut self, activity: Option<Value>) -> Result<()> {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce: String = nonce.iter().map(|b| format!("{b:02x}")).collect();

        let cmd = json!({
            "cmd": "SET_ACTIVITY",
            "args": { "pid": std::process::id(), "activity": activity },
            "nonce": nonce,
        });
        self.send(OP_FRAME, &cmd).await.context("send SET_ACTIVITY")?;

        let (op, reply) = read_frame(&mut self.stream)
            .await
            .context("read SET_ACTIVITY reply")?;
        if op == OP_CLOSE {
            bail!("Discord closed the connection: {reply}");
        }
        if reply["evt"] == "ERROR" {
            bail!("SET_ACTIVITY failed: {}", reply["data"]["message"]);
        }
        Ok(())
    }

    pub(crate) async fn close(mut self) {
        let _ = self.send(OP_CLOSE, &json!({})).await;
        let _ = self.stream.shutdown().await;
    }
}
