use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use reqwest::{Body, Client, ClientBuilder, Method, Request, Url};

use crate::proto::{Packet, Question};

use super::ResolverError;

const DNS_MESSAGE: &str = "application/dns-message";

/// DNS over HTTPS resolver, see [RFC 8484](https://datatracker.ietf.org/doc/html/rfc8484).
#[derive(Debug)]
pub struct HttpsResolver {
    client: Client,
    pub url: Url,
    pub timeout: Duration,
}

impl HttpsResolver {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ResolverError> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub async fn resolve(&self, question: &Question) -> Result<Packet, ResolverError> {
        // RFC 8484 asks for an id of 0 to keep responses cacheable by HTTP caches.
        let packet = Packet::query(0, question.clone());

        let mut buf = Vec::new();
        packet.encode(&mut buf);

        let mut req = Request::new(Method::POST, self.url.clone());
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(DNS_MESSAGE));
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static(DNS_MESSAGE));
        *req.body_mut() = Some(Body::from(buf));

        let resp = self.client.execute(req).await?;
        if !resp.status().is_success() {
            return Err(ResolverError::Status(resp.status()));
        }

        let data = resp.bytes().await?;
        let packet = Packet::decode(&data)?;

        if packet.truncated {
            return Err(ResolverError::Truncated);
        }

        Ok(packet)
    }
}
