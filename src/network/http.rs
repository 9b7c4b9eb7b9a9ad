//! HTTP adapter
//!
//! ```text
//! POST   /v1/cs/configs              publish            (?import=true: import JSON archive)
//! GET    /v1/cs/configs              get for caller     (?beta=true, ?show=all, ?search=accurate|blur,
//!                                                        ?export=true, ?clone=true)
//! GET    /v1/cs/configs/catalog      advance info
//! DELETE /v1/cs/configs              delete             (?beta=true: stop beta, ?delType=ids)
//! POST   /v1/cs/configs/listener     long poll
//! GET    /v1/cs/configs/listener     list listeners
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use super::listening::encode_changed_keys;
use super::listening::parse_listening_configs;
use crate::constants::BETA_IPS_HEADER;
use crate::constants::CLIENT_ID_HEADER;
use crate::constants::CONFIG_TAG_HEADER;
use crate::constants::CONTENT_DIGEST_HEADER;
use crate::constants::LISTENING_CONFIGS_PARAM;
use crate::constants::LONG_POLLING_NO_HANGUP_HEADER;
use crate::constants::LONG_POLLING_TIMEOUT_HEADER;
use crate::utils::net::parse_ip_list;
use crate::utils::net::remote_ip;
use crate::AdvanceInfo;
use crate::Archive;
use crate::ConfigKey;
use crate::ConfigService;
use crate::ConflictPolicy;
use crate::Error;
use crate::ErrorKind;
use crate::ExportFilter;
use crate::MatchMode;
use crate::PollRequest;
use crate::PublishRequest;
use crate::Result;
use crate::SearchQuery;
use crate::SystemError;
use crate::Variant;
use crate::VariantSelector;

/// Upper bound of a request body; content size itself is checked on write.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;
const DEFAULT_PAGE_SIZE: usize = 100;

type Params = HashMap<String, String>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    kind: ErrorKind,
    message: String,
}

#[derive(Debug, Serialize)]
struct ListenerStatus {
    key: String,
    listeners: HashMap<String, String>,
}

pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::Namespace => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Overload => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Persistence | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: &Error) -> Response {
    let kind = e.kind();
    let status = status_of(kind);
    if status.is_server_error() {
        warn!("request failed: {:?}", e);
    } else {
        debug!("request rejected: {}", e);
    }
    let body = ErrorBody {
        code: status.as_u16(),
        kind,
        message: e.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn respond(result: Result<Response>) -> std::result::Result<Response, Rejection> {
    Ok(result.unwrap_or_else(|e| error_response(&e)))
}

/// Every route of the adapter, with rejections turned into JSON errors.
pub fn routes(service: Arc<ConfigService>) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone {
    let configs = warp::path!("v1" / "cs" / "configs");
    let listener = warp::path!("v1" / "cs" / "configs" / "listener");
    let catalog = warp::path!("v1" / "cs" / "configs" / "catalog");

    let import_route = configs
        .and(warp::post())
        .and(flag("import"))
        .and(with_service(service.clone()))
        .and(warp::query::<Params>())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json::<Archive>())
        .and_then(|svc: Arc<ConfigService>, params: Params, archive: Archive| async move {
            respond(import_archive(svc, params, archive).await)
        });

    let publish_route = configs
        .and(warp::post())
        .and(with_service(service.clone()))
        .and(warp::header::optional::<String>(BETA_IPS_HEADER))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::form::<Params>())
        .and_then(|svc: Arc<ConfigService>, beta_ips: Option<String>, form: Params| async move {
            respond(publish(svc, beta_ips, form).await)
        });

    let get_route = configs
        .and(warp::get())
        .and(with_service(service.clone()))
        .and(client_ip())
        .and(warp::header::optional::<String>(CONFIG_TAG_HEADER))
        .and(warp::query::<Params>())
        .and_then(
            |svc: Arc<ConfigService>, ip: Option<IpAddr>, tag: Option<String>, params: Params| async move {
                respond(get(svc, ip, tag, params).await)
            },
        );

    let catalog_route = catalog
        .and(warp::get())
        .and(with_service(service.clone()))
        .and(warp::query::<Params>())
        .and_then(|svc: Arc<ConfigService>, params: Params| async move {
            respond(get_catalog(svc, params).await)
        });

    let delete_route = configs
        .and(warp::delete())
        .and(with_service(service.clone()))
        .and(warp::query::<Params>())
        .and_then(|svc: Arc<ConfigService>, params: Params| async move { respond(delete(svc, params).await) });

    let listen_route = listener
        .and(warp::post())
        .and(with_service(service.clone()))
        .and(client_ip())
        .and(warp::header::headers_cloned())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::form::<Params>())
        .and_then(
            |svc: Arc<ConfigService>, ip: Option<IpAddr>, headers: warp::http::HeaderMap, form: Params| async move {
                respond(listen(svc, ip, headers, form).await)
            },
        );

    let listeners_route = listener
        .and(warp::get())
        .and(with_service(service))
        .and(warp::query::<Params>())
        .and_then(|svc: Arc<ConfigService>, params: Params| async move {
            respond(list_listeners(svc, params).await)
        });

    import_route
        .or(publish_route)
        .unify()
        .or(get_route)
        .unify()
        .or(catalog_route)
        .unify()
        .or(delete_route)
        .unify()
        .or(listen_route)
        .unify()
        .or(listeners_route)
        .unify()
        .recover(handle_rejection)
        .unify()
}

/// Serves [`routes`] until `shutdown` fires. Waiting listeners are
/// answered before the server drains.
pub async fn start_server(
    service: Arc<ConfigService>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let svc = service.clone();
    let (bound, server) = warp::serve(routes(service))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown.changed().await;
            svc.shutdown();
        })
        .map_err(|e| SystemError::ServerStartFailed(e.to_string()))?;

    info!("config server listening on {}", bound);
    server.await;
    info!("config server stopped");
    Ok(())
}

fn with_service(service: Arc<ConfigService>) -> impl Filter<Extract = (Arc<ConfigService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

fn client_ip() -> impl Filter<Extract = (Option<IpAddr>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-real-ip")
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(warp::addr::remote())
        .map(|real_ip: Option<String>, forwarded: Option<String>, peer: Option<SocketAddr>| {
            remote_ip(real_ip.as_deref(), forwarded.as_deref(), peer)
        })
}

/// Passes only when query parameter `name` is `true`.
fn flag(name: &'static str) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::query::<Params>()
        .and_then(move |params: Params| async move {
            if is_set(&params, name) {
                Ok::<(), Rejection>(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
}

fn is_set(
    params: &Params,
    name: &str,
) -> bool {
    params.get(name).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

fn param<'a>(
    params: &'a Params,
    name: &str,
) -> Option<&'a str> {
    params.get(name).map(String::as_str).filter(|v| !v.trim().is_empty())
}

fn required<'a>(
    params: &'a Params,
    name: &str,
) -> Result<&'a str> {
    param(params, name).ok_or_else(|| Error::Validation(format!("parameter {name} is required")))
}

fn key_from(params: &Params) -> Result<ConfigKey> {
    Ok(ConfigKey::new(
        required(params, "dataId")?,
        required(params, "group")?,
        param(params, "tenant").unwrap_or_default(),
    ))
}

fn number<T: std::str::FromStr>(
    params: &Params,
    name: &str,
) -> Result<Option<T>> {
    param(params, name)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Validation(format!("parameter {name} must be a number")))
        })
        .transpose()
}

fn ids_from(params: &Params) -> Result<Vec<u64>> {
    required(params, "ids")?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| Error::Validation(format!("invalid id {s:?}"))))
        .collect()
}

fn policy_from(params: &Params) -> Result<ConflictPolicy> {
    param(params, "policy")
        .map(str::parse::<ConflictPolicy>)
        .transpose()
        .map(Option::unwrap_or_default)
}

fn json<T: Serialize>(value: &T) -> Response {
    warp::reply::json(value).into_response()
}

async fn publish(
    svc: Arc<ConfigService>,
    beta_ips: Option<String>,
    form: Params,
) -> Result<Response> {
    let key = key_from(&form)?;
    let content = required(&form, "content")?;

    let variant = match (beta_ips.as_deref().filter(|v| !v.trim().is_empty()), param(&form, "tag")) {
        (Some(ips), _) => Variant::Beta {
            ips: parse_ip_list(ips)?,
        },
        (None, Some(tag)) => Variant::tag(tag),
        (None, None) => Variant::Formal,
    };

    let mut request = PublishRequest::formal(key, content).with_variant(variant);
    request.app_name = param(&form, "appName").map(String::from);
    request.content_type = param(&form, "type").map(String::from);
    request.advance = AdvanceInfo {
        description: param(&form, "desc").map(String::from),
        usage: param(&form, "use").map(String::from),
        effect: param(&form, "effect").map(String::from),
        schema: param(&form, "schema").map(String::from),
        config_tags: param(&form, "config_tags")
            .map(AdvanceInfo::parse_config_tags)
            .unwrap_or_default(),
    };

    svc.publish(request).await?;
    Ok(json(&true))
}

async fn get(
    svc: Arc<ConfigService>,
    ip: Option<IpAddr>,
    tag_header: Option<String>,
    params: Params,
) -> Result<Response> {
    if is_set(&params, "export") {
        let filter = match param(&params, "ids") {
            Some(_) => ExportFilter::Ids(ids_from(&params)?),
            None => ExportFilter::Pattern {
                tenant: param(&params, "tenant").unwrap_or_default().to_string(),
                data_id: param(&params, "dataId").map(String::from),
                group: param(&params, "group").map(String::from),
                app_name: param(&params, "appName").map(String::from),
            },
        };
        return Ok(json(&svc.export(filter).await?));
    }

    if is_set(&params, "clone") {
        let result = svc
            .clone_configs(&ids_from(&params)?, required(&params, "tenant")?, policy_from(&params)?)
            .await?;
        return Ok(json(&result));
    }

    if let Some(mode) = param(&params, "search") {
        let mode = match mode {
            "accurate" => MatchMode::Exact,
            "blur" => MatchMode::Wildcard,
            other => return Err(Error::Validation(format!("unknown search mode {other:?}"))),
        };
        let query = SearchQuery {
            tenant: param(&params, "tenant").unwrap_or_default().to_string(),
            data_id: param(&params, "dataId").map(String::from),
            group: param(&params, "group").map(String::from),
            app_name: param(&params, "appName").map(String::from),
            mode,
        };
        let page_no = number(&params, "pageNo")?.unwrap_or(1);
        let page_size = number(&params, "pageSize")?.unwrap_or(DEFAULT_PAGE_SIZE);
        return Ok(json(&svc.search(query, page_no, page_size).await?));
    }

    let key = key_from(&params)?;
    if is_set(&params, "beta") {
        return Ok(json(&svc.get_beta(&key).await?));
    }
    if param(&params, "show") == Some("all") {
        return Ok(json(&svc.detail(&key).await?));
    }

    let tag = param(&params, "tag").or(tag_header.as_deref().filter(|t| !t.is_empty()));
    let record = svc.get_for_client(&key, ip, tag).await?;
    let reply = warp::reply::with_header(record.content, CONTENT_DIGEST_HEADER, record.digest);
    Ok(warp::reply::with_header(reply, "content-type", "text/plain; charset=utf-8").into_response())
}

async fn get_catalog(
    svc: Arc<ConfigService>,
    params: Params,
) -> Result<Response> {
    let key = key_from(&params)?;
    Ok(json(&svc.catalog(&key).await?))
}

async fn delete(
    svc: Arc<ConfigService>,
    params: Params,
) -> Result<Response> {
    if param(&params, "delType") == Some("ids") {
        let removed = svc.delete_by_ids(&ids_from(&params)?).await?;
        return Ok(json(&removed.len()));
    }

    let key = key_from(&params)?;
    if is_set(&params, "beta") {
        svc.stop_beta(&key).await?;
        return Ok(json(&true));
    }

    let selector = match param(&params, "tag") {
        Some(tag) => VariantSelector::Tag(tag.to_string()),
        None => VariantSelector::Formal,
    };
    svc.delete(&key, &selector).await?;
    Ok(json(&true))
}

async fn import_archive(
    svc: Arc<ConfigService>,
    params: Params,
    archive: Archive,
) -> Result<Response> {
    let result = svc
        .import(archive, param(&params, "namespace"), policy_from(&params)?)
        .await?;
    Ok(json(&result))
}

async fn listen(
    svc: Arc<ConfigService>,
    ip: Option<IpAddr>,
    headers: warp::http::HeaderMap,
    form: Params,
) -> Result<Response> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    let watch_set = parse_listening_configs(required(&form, LISTENING_CONFIGS_PARAM)?)?;
    let timeout_ms = header(LONG_POLLING_TIMEOUT_HEADER)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| Error::Validation(format!("{LONG_POLLING_TIMEOUT_HEADER} must be milliseconds")))
        })
        .transpose()?;
    let no_hangup = header(LONG_POLLING_NO_HANGUP_HEADER).is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let request = PollRequest {
        client_id: header(CLIENT_ID_HEADER).unwrap_or_default(),
        client_ip: ip,
        watch_set,
        requested_tag: header(CONFIG_TAG_HEADER),
        hold: svc.hold_for(timeout_ms, no_hangup),
    };
    let response = svc.poll(request).await?;

    Ok(warp::reply::with_header(
        encode_changed_keys(&response.changed_keys),
        "content-type",
        "text/plain; charset=utf-8",
    )
    .into_response())
}

async fn list_listeners(
    svc: Arc<ConfigService>,
    params: Params,
) -> Result<Response> {
    let key = key_from(&params)?;
    let sample_times = number(&params, "sampleTime")?.unwrap_or(1);
    let listeners = svc.list_listeners(&key, sample_times).await?;
    Ok(json(&ListenerStatus {
        key: key.to_string(),
        listeners,
    }))
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "no such route".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
    } else {
        warn!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };

    let kind = if status.is_server_error() {
        ErrorKind::Internal
    } else {
        ErrorKind::Validation
    };
    let body = ErrorBody {
        code: status.as_u16(),
        kind,
        message,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
