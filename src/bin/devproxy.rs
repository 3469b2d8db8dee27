//! Development proxy: forwards `/api/*` requests to the backend with the
//! prefix stripped, so a frontend dev server and the backend can share an
//! origin during local development. The backend origin comes from
//! `PROXY_TARGET` rather than being baked in.

use std::env;

use actix_web::http::StatusCode;
use actix_web::{middleware::Logger, web, App, HttpRequest, HttpResponse, HttpServer, ResponseError};
use url::Url;

#[derive(thiserror::Error, Debug)]
enum ProxyError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Unsupported method: {0}")]
    Method(String),
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

/// Strips a path prefix and re-roots the request on the target origin.
#[derive(Clone, Debug)]
struct RewriteRule {
    prefix: String,
    target: Url,
}

impl RewriteRule {
    fn new(prefix: &str, target: Url) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            target,
        }
    }

    /// `/api/stops/1` becomes `<target>/stops/1`. Paths outside the prefix
    /// are not proxied.
    fn rewrite(&self, path: &str) -> Option<Url> {
        let rest = path.strip_prefix(&self.prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            // "/apiary" is not under "/api"
            return None;
        }

        let mut url = self.target.clone();
        url.set_path(rest);
        Some(url)
    }
}

struct ProxyContext {
    client: reqwest::Client,
    rule: RewriteRule,
}

/// The upstream request mirrors the incoming one: method, query, body and
/// content type.
fn upstream_request(
    client: &reqwest::Client,
    url: Url,
    req: &HttpRequest,
    body: web::Bytes,
) -> Result<reqwest::Request, ProxyError> {
    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|_| ProxyError::Method(req.method().to_string()))?;

    let mut builder = client.request(method, url).body(body.to_vec());
    if let Some(content_type) = req.headers().get(actix_web::http::header::CONTENT_TYPE) {
        builder = builder.header(reqwest::header::CONTENT_TYPE, content_type.as_bytes());
    }

    Ok(builder.build()?)
}

async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    ctx: web::Data<ProxyContext>,
) -> Result<HttpResponse, ProxyError> {
    let Some(mut url) = ctx.rule.rewrite(req.path()) else {
        return Ok(HttpResponse::NotFound().finish());
    };
    if !req.query_string().is_empty() {
        url.set_query(Some(req.query_string()));
    }

    log::debug!("{} {} -> {}", req.method(), req.path(), url);

    let upstream = ctx
        .client
        .execute(upstream_request(&ctx.client, url, &req, body)?)
        .await?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = HttpResponse::build(status);
    if let Some(content_type) = upstream.headers().get(reqwest::header::CONTENT_TYPE) {
        if let Ok(content_type) = content_type.to_str() {
            response.content_type(content_type);
        }
    }

    Ok(response.body(upstream.bytes().await?.to_vec()))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::try_init().ok();

    dotenvy::from_filename(".env").ok();

    let listen_address =
        env::var("PROXY_LISTEN_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let target = env::var("PROXY_TARGET").unwrap_or_else(|_| "http://localhost:6789".to_string());
    let target = Url::parse(&target).expect("PROXY_TARGET must be a valid URL");
    let prefix = env::var("PROXY_PREFIX").unwrap_or_else(|_| "/api".to_string());

    let rule = RewriteRule::new(&prefix, target);
    log::info!(
        "Proxying {}/* on {} to {}",
        rule.prefix,
        listen_address,
        rule.target
    );

    let ctx = web::Data::new(ProxyContext {
        client: reqwest::Client::new(),
        rule,
    });

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(ctx.clone())
            .default_service(web::route().to(forward))
    })
    .bind(listen_address)?
    .run()
    .await
}

#[cfg(test)]
mod test {
    use super::*;

    fn rule() -> RewriteRule {
        RewriteRule::new("/api", Url::parse("http://localhost:6789").unwrap())
    }

    #[test]
    fn strips_prefix_and_targets_backend() {
        let url = rule().rewrite("/api/stops/1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:6789/stops/1");
    }

    #[test]
    fn bare_prefix_maps_to_root() {
        let url = rule().rewrite("/api").unwrap();
        assert_eq!(url.as_str(), "http://localhost:6789/");
    }

    #[test]
    fn non_prefixed_paths_are_not_proxied() {
        assert_eq!(rule().rewrite("/stops/1"), None);
        assert_eq!(rule().rewrite("/apiary/1"), None);
    }

    #[test]
    fn trailing_slash_on_prefix_is_ignored() {
        let rule = RewriteRule::new("/api/", Url::parse("http://localhost:6789").unwrap());
        let url = rule.rewrite("/api/stops/1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:6789/stops/1");
    }

    #[test]
    fn upstream_request_mirrors_method_content_type_and_body() {
        let req = actix_web::test::TestRequest::post()
            .uri("/api/stops")
            .insert_header(("content-type", "application/json"))
            .to_http_request();

        let client = reqwest::Client::new();
        let upstream = upstream_request(
            &client,
            Url::parse("http://localhost:6789/stops").unwrap(),
            &req,
            web::Bytes::from_static(b"{}"),
        )
        .unwrap();

        assert_eq!(upstream.method(), reqwest::Method::POST);
        assert_eq!(
            upstream.headers().get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(upstream.body().unwrap().as_bytes(), Some(&b"{}"[..]));
    }
}
