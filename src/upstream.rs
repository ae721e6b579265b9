//! Route handlers backed by configuration: HTTP forwarding and canned replies.

use crate::route::{scalar_text, RouteHandler, RouteRequest, RouteResponse};
use anyhow::Context;
use futures_core::future::BoxFuture;
use reqwest::Url;
use serde_json::Value;

/// Forwards the reconstructed request to `base_url` + filled path.
#[derive(Debug, Clone)]
pub struct UpstreamHandler {
    http: reqwest::Client,
    base_url: Url,
}

impl UpstreamHandler {
    pub fn new(http: reqwest::Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid upstream URL: {base_url}"))?;
        Ok(Self { http, base_url })
    }

    fn target(&self, req: &RouteRequest) -> anyhow::Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}{}", req.path))
            .with_context(|| format!("invalid upstream path: {}", req.path))?;
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query {
                pairs.append_pair(k, &scalar_text(v));
            }
        }
        Ok(url)
    }

    async fn forward(&self, req: &RouteRequest, res: &mut RouteResponse) -> anyhow::Result<()> {
        let url = self.target(req)?;
        let method = reqwest::Method::from_bytes(req.method.as_str().as_bytes())
            .context("unsupported HTTP method")?;

        let mut builder = self.http.request(method, url.clone());
        for (k, v) in &req.headers {
            builder = builder.header(k.as_str(), scalar_text(v));
        }
        if req.method.has_body() && !req.body.is_null() {
            builder = builder.json(&req.body);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("upstream request failed: {} {url}", req.method))?;
        let status = resp.status().as_u16();
        let text = resp.text().await.context("failed to read upstream body")?;

        res.status(status);
        match serde_json::from_str::<Value>(&text) {
            Ok(v) => res.json(v),
            Err(_) => res.send(text),
        };
        Ok(())
    }
}

impl RouteHandler for UpstreamHandler {
    fn process<'a>(
        &'a self,
        req: &'a RouteRequest,
        res: &'a mut RouteResponse,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.forward(req, res))
    }
}

/// Replies with a fixed status and body.
#[derive(Debug, Clone)]
pub struct StaticHandler {
    pub status: u16,
    pub body: Value,
}

impl RouteHandler for StaticHandler {
    fn process<'a>(
        &'a self,
        _req: &'a RouteRequest,
        res: &'a mut RouteResponse,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            res.status(self.status).json(self.body.clone());
            Ok(())
        })
    }
}
