//! Minimal nsqd stand-in for exercising the TCP producer
//!
//! Accepts any number of connections, checks the `V2` magic, answers
//! `IDENTIFY` with `OK`, and records every `PUB`. Behaviour on `PUB` can be
//! adjusted to reject messages, interleave a heartbeat, or hang up.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

const FRAME_TYPE_RESPONSE: u32 = 0;
const FRAME_TYPE_ERROR: u32 = 1;

#[derive(Debug, Clone, Default)]
pub struct Behaviour {
    /// Answer every `PUB` with this error frame
    pub reject_with: Option<String>,
    /// Send a heartbeat and wait for `NOP` before answering `PUB`
    pub heartbeat_before_ok: bool,
    /// Close the connection after answering this many `PUB`s on it
    pub close_after: Option<usize>,
    /// Never answer `PUB`
    pub stall: bool,
}

#[derive(Debug, Default)]
pub struct Received {
    pub identify: Mutex<Vec<serde_json::Value>>,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub connections: AtomicUsize,
    pub nops: AtomicUsize,
}

pub struct MockNsqd {
    addr: SocketAddr,
    received: Arc<Received>,
    handle: JoinHandle<()>,
}

impl MockNsqd {
    pub async fn start(behaviour: Behaviour) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let received = Arc::new(Received::default());

        let handle = {
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    received.connections.fetch_add(1, Ordering::SeqCst);
                    let received = Arc::clone(&received);
                    let behaviour = behaviour.clone();
                    tokio::spawn(async move {
                        let _ = handle_connection(socket, &behaviour, &received).await;
                    });
                }
            })
        };

        Self {
            addr,
            received,
            handle,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn connections(&self) -> usize {
        self.received.connections.load(Ordering::SeqCst)
    }

    pub fn nops(&self) -> usize {
        self.received.nops.load(Ordering::SeqCst)
    }

    pub fn identify(&self) -> Vec<serde_json::Value> {
        self.received.identify.lock().clone()
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.received.published.lock().clone()
    }
}

impl Drop for MockNsqd {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    socket: TcpStream,
    behaviour: &Behaviour,
    received: &Received,
) -> std::io::Result<()> {
    let mut stream = BufStream::new(socket);

    let mut magic = [0; 4];
    stream.read_exact(&mut magic).await?;
    if &magic != b"  V2" {
        return Ok(());
    }

    let mut answered = 0;
    let mut line = Vec::new();

    loop {
        line.clear();
        if stream.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&line).trim_end().to_string();

        if command == "IDENTIFY" {
            let body = read_body(&mut stream).await?;
            received
                .identify
                .lock()
                .push(serde_json::from_slice(&body).unwrap_or_default());
            write_frame(&mut stream, FRAME_TYPE_RESPONSE, b"OK").await?;
        } else if let Some(topic) = command.strip_prefix("PUB ") {
            let body = read_body(&mut stream).await?;
            received.published.lock().push((topic.to_string(), body));

            if behaviour.stall {
                continue;
            }

            if behaviour.heartbeat_before_ok {
                write_frame(&mut stream, FRAME_TYPE_RESPONSE, b"_heartbeat_").await?;
                line.clear();
                stream.read_until(b'\n', &mut line).await?;
                if line == b"NOP\n" {
                    received.nops.fetch_add(1, Ordering::SeqCst);
                }
            }

            match &behaviour.reject_with {
                Some(error) => write_frame(&mut stream, FRAME_TYPE_ERROR, error.as_bytes()).await?,
                None => write_frame(&mut stream, FRAME_TYPE_RESPONSE, b"OK").await?,
            }

            answered += 1;
            if behaviour.close_after == Some(answered) {
                return Ok(());
            }
        } else if command == "NOP" {
            received.nops.fetch_add(1, Ordering::SeqCst);
        } else {
            write_frame(&mut stream, FRAME_TYPE_ERROR, b"E_INVALID").await?;
            return Ok(());
        }
    }
}

async fn read_body(stream: &mut BufStream<TcpStream>) -> std::io::Result<Vec<u8>> {
    let size = stream.read_u32().await?;
    let mut body = vec![0; size as usize];
    stream.read_exact(&mut body).await?;
    Ok(body)
}

async fn write_frame(
    stream: &mut BufStream<TcpStream>,
    frame_type: u32,
    data: &[u8],
) -> std::io::Result<()> {
    let size = u32::try_from(data.len() + 4).expect("frame fits");
    stream.write_u32(size).await?;
    stream.write_u32(frame_type).await?;
    stream.write_all(data).await?;
    stream.flush().await
}
