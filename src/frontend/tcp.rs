use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesOrdered, StreamExt};
use futures::{FutureExt, select_biased};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::proto::{DecodeError, Packet};
use crate::state::State;
use crate::upstream::Upstream;

use super::{OnError, handle_query};

/// How long a connection may stay idle before it is closed.
const TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Maximum number of currently progressing pipelined queries.
///
/// The server will stop accepting new queries from the client once this number of queries is
/// reached and only continue once queries resolve.
const MAX_QUEUED_QUERIES: usize = 64;

#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    on_error: OnError,
}

impl TcpServer {
    pub async fn new(addr: SocketAddr, on_error: OnError) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, on_error })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    /// Accepts connections until the listener fails. Every connection is served in its own task.
    pub async fn poll<U>(&self, state: Arc<State<U>>) -> Result<(), io::Error>
    where
        U: Upstream + 'static,
    {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            tracing::debug!("accepting TCP connection from {}", addr);

            let state = state.clone();
            let on_error = self.on_error;
            tokio::spawn(async move { handle_conn(stream, &state, on_error).await });
        }
    }
}

async fn handle_conn<U>(stream: TcpStream, state: &State<U>, on_error: OnError)
where
    U: Upstream,
{
    let (reader, mut writer) = stream.into_split();

    if let Err(err) = handle_conn_inner(reader, &mut writer, state, on_error).await {
        tracing::debug!("failed to serve tcp connection: {:?}", err);
    }

    if let Err(err) = writer.shutdown().await {
        tracing::debug!("failed to shutdown tcp connection: {}", err);
    }
}

async fn handle_conn_inner<U>(
    reader: OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    state: &State<U>,
    on_error: OnError,
) -> Result<(), StreamError>
where
    U: Upstream,
{
    let mut tasks = FuturesOrdered::new();

    // The read future owns the reader so that a partially read message is
    // never lost when a response becomes ready first.
    let read = read_query(reader).fuse();
    futures::pin_mut!(read);

    loop {
        select_biased! {
            resp = tasks.select_next_some() => {
                if let Some(resp) = resp {
                    write_packet(writer, resp).await?;
                }
            }
            (reader, res) = read => {
                let packet = match res {
                    Ok(packet) => packet,
                    Err(StreamError::Closed) => break,
                    Err(err) => return Err(err),
                };

                state.metrics.requests_total_tcp.inc();
                tasks.push_back(handle_query(state, packet, on_error));

                while tasks.len() >= MAX_QUEUED_QUERIES {
                    if let Some(Some(resp)) = tasks.next().await {
                        write_packet(writer, resp).await?;
                    }
                }

                read.set(read_query(reader).fuse());
            }
        }
    }

    // The client closed its side. Answer what it already asked for.
    while let Some(resp) = tasks.next().await {
        if let Some(resp) = resp {
            write_packet(writer, resp).await?;
        }
    }

    Ok(())
}

async fn read_query(mut reader: OwnedReadHalf) -> (OwnedReadHalf, Result<Packet, StreamError>) {
    let res = read_packet(&mut reader).await;
    (reader, res)
}

async fn read_packet(reader: &mut OwnedReadHalf) -> Result<Packet, StreamError> {
    let len = match tokio::time::timeout(TIMEOUT, reader.read_u16()).await {
        Ok(Ok(len)) => len,
        Ok(Err(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(StreamError::Closed);
        }
        Ok(Err(err)) => return Err(StreamError::Io(err)),
        Err(_) => return Err(StreamError::Timeout),
    };

    let mut buf = vec![0; len as usize];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(StreamError::Io)?;

    match Packet::decode(&buf) {
        Ok(packet) => Ok(packet),
        Err(err) => {
            tracing::debug!("failed to decode packet: {:?}", err);
            Err(StreamError::Decode(err))
        }
    }
}

async fn write_packet(writer: &mut OwnedWriteHalf, packet: Packet) -> Result<(), StreamError> {
    writer
        .write_all(&encode_packet(packet))
        .await
        .map_err(StreamError::Io)
}

/// Encodes `packet` with its two byte length prefix, truncating it if it does not fit.
fn encode_packet(mut packet: Packet) -> Vec<u8> {
    let mut buf = vec![0, 0];
    packet.encode(&mut buf);

    let len = match u16::try_from(buf.len() - 2) {
        Ok(len) => len,
        Err(_) => {
            packet.truncated = true;

            buf.truncate(2);
            packet.encode(&mut buf);
            buf.truncate(usize::from(u16::MAX) + 2);

            u16::MAX
        }
    };

    buf[0..2].copy_from_slice(&len.to_be_bytes());
    buf
}

#[derive(Debug)]
enum StreamError {
    Io(io::Error),
    Decode(DecodeError),
    Timeout,
    /// The client closed the connection between two messages.
    Closed,
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::cache::Cache;
    use crate::frontend::OnError;
    use crate::proto::{Packet, ResponseCode};
    use crate::state::State;
    use crate::upstream::tests::{MockAnswer, MockUpstream, a_record, question};

    use super::{TcpServer, encode_packet};

    async fn read_response(stream: &mut TcpStream) -> Packet {
        let len = stream.read_u16().await.unwrap();
        let mut buf = vec![0; len as usize];
        stream.read_exact(&mut buf).await.unwrap();
        Packet::decode(&buf).unwrap()
    }

    #[test]
    fn encode_packet_length_prefix() {
        let packet = Packet::query(0xbeef, question("example.test."));
        let mut plain = Vec::new();
        packet.encode(&mut plain);

        let framed = encode_packet(packet);
        assert_eq!(framed.len(), plain.len() + 2);
        assert_eq!(
            u16::from_be_bytes([framed[0], framed[1]]) as usize,
            plain.len()
        );
        assert_eq!(&framed[2..], &plain[..]);
    }

    #[tokio::test]
    async fn tcp_pipelined_queries_answered_in_order() {
        let state = Arc::new(State::new(
            Cache::new(1 << 20, Duration::from_secs(30)),
            MockUpstream::default(),
            true,
        ));
        state.upstream.answer(
            "a.test.",
            MockAnswer::Records(
                ResponseCode::Ok,
                vec![a_record("a.test.", Ipv4Addr::new(10, 0, 0, 1), 60)],
            ),
        );

        let server = TcpServer::new("127.0.0.1:0".parse().unwrap(), OnError::Drop)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn({
            let state = state.clone();
            async move { server.poll(state).await }
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Both messages are sent in a single write.
        let mut buf = encode_packet(Packet::query(1, question("a.test.")));
        buf.extend(encode_packet(Packet::query(2, question("missing.test."))));
        stream.write_all(&buf).await.unwrap();

        let first = read_response(&mut stream).await;
        assert_eq!(first.transaction_id, 1);
        assert_eq!(first.response_code, ResponseCode::Ok);
        assert_eq!(first.answers.len(), 1);

        let second = read_response(&mut stream).await;
        assert_eq!(second.transaction_id, 2);
        assert_eq!(second.response_code, ResponseCode::NameError);

        // Closing our side still flushes pending answers and then closes the connection.
        stream
            .write_all(&encode_packet(Packet::query(3, question("a.test."))))
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let third = read_response(&mut stream).await;
        assert_eq!(third.transaction_id, 3);
        assert_eq!(third.answers.len(), 1);

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert_eq!(state.upstream.calls(), 2);
        assert_eq!(state.metrics.requests_total_tcp.get(), 3);
    }
}
