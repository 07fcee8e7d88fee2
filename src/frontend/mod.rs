use crate::proto::{Packet, Qr, ResponseCode};
use crate::state::State;
use crate::upstream::Upstream;

pub mod tcp;
pub mod udp;

/// What a frontend sends back when a query could not be resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OnError {
    /// Send nothing and let the client time out and retry.
    Drop,
    /// Send a SERVFAIL response.
    ServFail,
}

impl OnError {
    pub fn new(servfail_on_error: bool) -> Self {
        match servfail_on_error {
            true => Self::ServFail,
            false => Self::Drop,
        }
    }
}

/// Resolves a decoded query. Returns the packet to send back, if any.
pub async fn handle_query<U>(state: &State<U>, packet: Packet, on_error: OnError) -> Option<Packet>
where
    U: Upstream,
{
    if packet.qr == Qr::Response {
        tracing::trace!("ignoring response packet {:#06x}", packet.transaction_id);
        return None;
    }

    match state.resolve(&packet).await {
        Ok(resp) => Some(resp),
        Err(err) => {
            tracing::error!(
                "failed to resolve query {:#06x} for {:?}: {}",
                packet.transaction_id,
                packet.questions,
                err
            );

            match on_error {
                OnError::Drop => None,
                OnError::ServFail => {
                    let mut resp = Packet::response_to(&packet, ResponseCode::ServerFailure);
                    resp.recursion_available = state.recursion_available();
                    Some(resp)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::cache::Cache;
    use crate::proto::{Packet, Qr, ResponseCode};
    use crate::state::State;
    use crate::upstream::tests::{MockAnswer, MockUpstream, question};

    use super::{OnError, handle_query};

    fn state() -> State<MockUpstream> {
        let state = State::new(
            Cache::new(1 << 20, Duration::from_secs(30)),
            MockUpstream::default(),
            true,
        );
        state.upstream.answer("slow.test.", MockAnswer::Timeout);
        state
    }

    #[tokio::test]
    async fn upstream_failure_sends_nothing_by_default() {
        let state = state();
        let query = Packet::query(0x4242, question("slow.test."));

        assert!(handle_query(&state, query, OnError::Drop).await.is_none());
    }

    #[tokio::test]
    async fn upstream_failure_servfail() {
        let state = state();
        let query = Packet::query(0x4242, question("slow.test."));

        let resp = handle_query(&state, query.clone(), OnError::ServFail)
            .await
            .unwrap();
        assert_eq!(resp.transaction_id, 0x4242);
        assert_eq!(resp.qr, Qr::Response);
        assert_eq!(resp.response_code, ResponseCode::ServerFailure);
        assert_eq!(resp.questions, query.questions);
        assert!(resp.answers.is_empty());
    }

    #[tokio::test]
    async fn response_packets_are_ignored() {
        let state = state();
        let query = Packet::query(1, question("example.test."));
        let resp = Packet::response_to(&query, ResponseCode::Ok);

        assert!(handle_query(&state, resp, OnError::ServFail).await.is_none());
        assert_eq!(state.upstream.calls(), 0);
    }

    #[tokio::test]
    async fn query_without_questions_is_format_error() {
        let state = state();
        let mut query = Packet::query(0x0a0a, question("example.test."));
        query.questions.clear();

        let resp = handle_query(&state, query, OnError::Drop).await.unwrap();
        assert_eq!(resp.transaction_id, 0x0a0a);
        assert_eq!(resp.qr, Qr::Response);
        assert_eq!(resp.response_code, ResponseCode::FormatError);
        assert!(resp.questions.is_empty());
        assert!(resp.answers.is_empty());
        assert_eq!(state.upstream.calls(), 0);
    }
}
