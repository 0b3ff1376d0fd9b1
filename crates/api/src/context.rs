use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, header};

use stockroom_auth::Actor;
use stockroom_infra::audit::RequestMeta;

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware and required by every `/api` route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    actor: Actor,
}

impl ActorContext {
    pub fn new(actor: Actor) -> Self {
        Self { actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }
}

/// Origin address and user agent of a request, for audit entries.
///
/// The first `x-forwarded-for` hop wins over the socket peer address.
pub fn request_meta<B>(req: &Request<B>) -> RequestMeta {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    RequestMeta::new(
        forwarded_for(req.headers()).or(peer),
        header_str(req.headers(), header::USER_AGENT.as_str()),
    )
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")?
        .split(',')
        .map(str::trim)
        .find(|hop| !hop.is_empty())
        .map(str::to_string)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
