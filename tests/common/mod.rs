//! Shared harness: a full `AppState` over the in-memory store, driven
//! through `server::handle` without a socket.

#![allow(dead_code)]

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;

use covenant::clock::{Clock, ManualClock};
use covenant::config::Args;
use covenant::db::schemas::{Metadata, OidcClientDoc, TenantDoc};
use covenant::db::{IdentityStore, MemoryStore};
use covenant::{server, AppState};

pub const SECRET: &str = "integration-secret-0123456789-abcdef";

pub struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every `Set-Cookie` value
    pub fn cookies(&self) -> Vec<String> {
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// Raw value of the refresh cookie, if one was set
    pub fn refresh_cookie(&self) -> Option<String> {
        self.cookies().iter().find_map(|c| {
            c.split(';')
                .next()
                .and_then(|pair| pair.strip_prefix("hos_refresh="))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
    }
}

impl Harness {
    pub async fn new(extra: &[&str]) -> Self {
        let mut argv = vec!["covenant", "--jwt-secret", SECRET, "--dev-mode"];
        argv.extend_from_slice(extra);
        let args = Args::try_parse_from(argv).unwrap();

        let store = Arc::new(MemoryStore::new());
        // 2026-01-01T00:00:00Z
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let state = AppState::new(args, store.clone(), dyn_clock).unwrap();

        Self {
            state: Arc::new(state),
            store,
            clock,
        }
    }

    pub async fn seed_tenant(&self, id: &str, slug: &str) {
        self.store
            .insert_tenant(TenantDoc {
                id: id.into(),
                metadata: Metadata::default(),
                slug: slug.into(),
                name: slug.into(),
            })
            .await
            .unwrap();
    }

    pub async fn seed_client(&self, client_id: &str, redirect: &str) {
        self.store
            .insert_oidc_client(OidcClientDoc {
                id: format!("row-{}", client_id),
                metadata: Metadata::default(),
                client_id: client_id.into(),
                redirect_uris: vec![redirect.into()],
                allowed_worlds: Vec::new(),
            })
            .await
            .unwrap();
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: impl Into<Bytes>,
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let req = builder.body(Full::new(body.into())).unwrap();

        let resp = server::handle(self.state.clone(), req).await;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        Reply {
            status,
            headers,
            body,
        }
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> Reply {
        self.send(
            Method::POST,
            uri,
            &[("content-type", "application/json")],
            body.to_string(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> Reply {
        self.send(Method::GET, uri, &[], Bytes::new()).await
    }
}
