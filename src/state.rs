use std::time::Instant;

use crate::cache::{Cache, CacheEntry};
use crate::metrics::Metrics;
use crate::proto::{OpCode, Packet, Question, ResourceRecord, ResponseCode};
use crate::upstream::{Resolver, ResolverError, Upstream};

/// The resolution engine shared by all frontends.
#[derive(Debug)]
pub struct State<U = Resolver> {
    pub cache: Cache,
    pub upstream: U,
    pub metrics: Metrics,
    recursion_available: bool,
}

impl<U> State<U>
where
    U: Upstream,
{
    pub fn new(cache: Cache, upstream: U, recursion_available: bool) -> Self {
        Self {
            cache,
            upstream,
            metrics: Metrics::default(),
            recursion_available,
        }
    }

    pub fn recursion_available(&self) -> bool {
        self.recursion_available
    }

    /// Resolves all questions of `query` in order and builds the response.
    ///
    /// The response always carries the transaction id of `query`. If resolving any
    /// question fails, the whole query fails and no response is built.
    pub async fn resolve(&self, query: &Packet) -> Result<Packet, ResolverError> {
        let mut response = Packet::response_to(query, ResponseCode::Ok);
        response.recursion_available = self.recursion_available;

        if query.opcode != OpCode::Query {
            response.response_code = ResponseCode::NotImplemented;
            return Ok(response);
        }

        if query.questions.is_empty() {
            response.response_code = ResponseCode::FormatError;
            return Ok(response);
        }

        let now = Instant::now();

        for question in &query.questions {
            let resp = self.resolve_question(question).await?;

            // The first failing question decides the code of the whole message.
            if response.response_code == ResponseCode::Ok {
                response.response_code = resp.code;
            }

            response.answers.extend(resp.answers);
            response.authority.extend(resp.authority);
        }

        self.metrics.resolve_time.insert(now.elapsed());

        Ok(response)
    }

    async fn resolve_question(&self, question: &Question) -> Result<Response, ResolverError> {
        if let Some(entry) = self.cache.get(&question.name) {
            tracing::debug!("cache hit for {}", question.name);
            self.metrics.cache_hits.inc();

            return Ok(Response {
                code: entry.response_code,
                answers: entry.answers,
                authority: Vec::new(),
            });
        }

        self.metrics.cache_misses.inc();
        tracing::debug!(
            "cache miss for {}, forwarding to {}",
            question.name,
            self.upstream.addr()
        );

        let resp = match self.upstream.forward(question).await {
            Ok(resp) => resp,
            Err(err) => {
                self.metrics.upstream_failures.inc();
                return Err(err);
            }
        };

        // Only successful responses are cached. NXDOMAIN and friends are
        // passed through to the client as the upstream sent them.
        if resp.response_code == ResponseCode::Ok {
            self.populate(question, &resp);
        }

        Ok(Response {
            code: resp.response_code,
            answers: resp.answers,
            authority: resp.authority,
        })
    }

    fn populate(&self, question: &Question, resp: &Packet) {
        // A missing TTL (no answers) means the cache default applies, which
        // `Cache::set` selects for a TTL of 0. A record TTL of 0 means the
        // authority does not want the answer cached at all.
        let ttl = match cache_ttl(&resp.answers) {
            Some(0) => {
                tracing::debug!("not caching {}: upstream TTL is 0", question.name);
                return;
            }
            Some(ttl) => ttl,
            None => 0,
        };

        let entry = CacheEntry {
            opcode: resp.opcode,
            response_code: resp.response_code,
            answers: resp.answers.clone(),
        };

        self.cache.set(question.name.clone(), &entry, ttl);
    }
}

/// Returns the TTL that a set of answers may be cached for.
///
/// It is possible for each RR to contain a different TTL, but such behavior
/// is deprecated in RFC2181. We choose the lowest TTL value. Returns `None`
/// if there are no answers.
pub fn cache_ttl(answers: &[ResourceRecord]) -> Option<u32> {
    answers.iter().map(|answer| answer.ttl).min()
}

#[derive(Clone, Debug)]
struct Response {
    code: ResponseCode,
    answers: Vec<ResourceRecord>,
    authority: Vec<ResourceRecord>,
}
