//! HTTP routes for collection data access
//!
//! Every route resolves the caller's credentials into a pooled gateway and
//! applies the matching operation under the configured prefix:
//!
//! - GET    /data/{coll}            - filtered read, optional paging
//! - GET    /data/{coll}/_count     - count matching documents
//! - GET    /data/{coll}/{id}       - read one document
//! - POST   /data/{coll}            - create one document or an array
//! - POST   /data/{coll}/_bulk      - bulk create (or bulk delete when the
//!                                    documents carry a _deleted marker)
//! - POST   /data/{coll}/_copy      - bulk copy into a target collection
//! - POST   /data/{coll}/_index     - create an index
//! - POST   /data/{coll}/_queue     - push onto the collection write queue
//! - POST   /data/{coll}/_flush     - flush the collection write queue
//! - PUT    /data/{coll}/{id}       - merge update by id
//! - PUT    /data/{coll}            - merge update by {select, data} payload
//! - DELETE /data/{coll}/{id}       - delete one document
//! - DELETE /data/{coll}            - drop the collection
//!
//! Selector and projection query parameters carry JSON; malformed values
//! degrade to an empty filter rather than failing the request.

use std::collections::HashMap;
use std::time::Instant;

use bson::Document;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::db::gateway::{
    CreateOutcome, Gateway, PageInfo, PageRequest, ReadOptions, ReadOutcome, ReadSelector,
    UpdateSelector,
};
use crate::db::transfer::{copy_collection, CopyConfig};
use crate::routes::{
    error_response, json_response, not_found, read_json_body, request_credentials, BoxBody,
    ErrorBody,
};
use crate::server::AppState;
use crate::types::{GatehouseError, Result};

#[derive(Serialize)]
struct PageResponse {
    rows: Vec<Document>,
    #[serde(flatten)]
    info: PageInfo,
}

/// Dispatch /data/* requests
pub async fn handle_data_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let params = parse_query(req.uri().query());
    let credentials = request_credentials(&req);

    let segments: Vec<String> = path
        .trim_matches('/')
        .split('/')
        .map(str::to_string)
        .collect();
    // segments[0] is "data"
    let (collection, tail) = match segments.as_slice() {
        [_, collection] => (collection.clone(), None),
        [_, collection, tail] => (collection.clone(), Some(tail.clone())),
        _ => return not_found(&path),
    };

    let (gateway, url) = match state.gateway_for(&credentials).await {
        Ok(bound) => bound,
        Err(e) => return error_response(&e),
    };

    let result = match (method, tail.as_deref()) {
        (Method::GET, None) => read_collection(&gateway, &collection, &params).await,
        (Method::GET, Some("_count")) => count_collection(&gateway, &collection, &params).await,
        (Method::GET, Some(id)) => read_one(&gateway, &collection, id).await,
        (Method::POST, None) => create(req, &gateway, &collection).await,
        (Method::POST, Some("_bulk")) => bulk(req, &gateway, &collection).await,
        (Method::POST, Some("_copy")) => copy(req, state.as_ref(), &gateway, &collection).await,
        (Method::POST, Some("_index")) => create_index(req, &gateway, &collection).await,
        (Method::POST, Some("_queue")) => queue_push(req, &state, &url, &gateway, &collection).await,
        (Method::POST, Some("_flush")) => queue_flush(&state, &url, &gateway, &collection).await,
        (Method::PUT, None) => update_by_selector(req, &gateway, &collection).await,
        (Method::PUT, Some(id)) => update_by_id(req, &gateway, &collection, id).await,
        (Method::DELETE, None) => drop_collection(&gateway, &collection).await,
        (Method::DELETE, Some(id)) => delete_one(&gateway, &collection, id).await,
        _ => return not_found(&path),
    };

    match result {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn read_collection(
    gateway: &Gateway,
    collection: &str,
    params: &HashMap<String, String>,
) -> Result<Response<BoxBody>> {
    let options = ReadOptions {
        projection: json_param(params, "project"),
        limit: params.get("limit").and_then(|raw| raw.parse().ok()),
        page: PageRequest::from_params(
            params.get("page").map(String::as_str),
            params.get("pageSize").map(String::as_str),
        ),
    };

    let outcome = gateway
        .read(
            collection,
            ReadSelector::Filter(selector_param(params)),
            options,
        )
        .await?;

    Ok(match outcome {
        ReadOutcome::Many(rows) => json_response(StatusCode::OK, &rows),
        ReadOutcome::Page(rows, info) => json_response(StatusCode::OK, &PageResponse { rows, info }),
        ReadOutcome::One(_) => {
            return Err(GatehouseError::Internal(
                "filter read returned a single document".into(),
            ))
        }
    })
}

async fn read_one(gateway: &Gateway, collection: &str, id: &str) -> Result<Response<BoxBody>> {
    let outcome = gateway
        .read(
            collection,
            ReadSelector::Id(id.to_string()),
            ReadOptions::default(),
        )
        .await?;

    match outcome {
        ReadOutcome::One(Some(doc)) => Ok(json_response(StatusCode::OK, &doc)),
        ReadOutcome::One(None) => Err(GatehouseError::NotFound),
        _ => Err(GatehouseError::Internal("id read returned a result set".into())),
    }
}

async fn count_collection(
    gateway: &Gateway,
    collection: &str,
    params: &HashMap<String, String>,
) -> Result<Response<BoxBody>> {
    let count = gateway.count(collection, selector_param(params)).await?;
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "count": count }),
    ))
}

async fn create(
    req: Request<hyper::body::Incoming>,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let body = read_json_body(req).await?;

    match body {
        JsonValue::Array(items) => {
            let docs = documents_from_values(items)?;
            let saved = gateway.create_many(collection, docs).await?;
            Ok(json_response(
                StatusCode::CREATED,
                &serde_json::json!({ "ok": true, "saved": saved }),
            ))
        }
        value @ JsonValue::Object(_) => {
            let doc = document_from_value(&value)?;
            match gateway.create(collection, doc).await? {
                CreateOutcome::Created { id } => Ok(json_response(
                    StatusCode::CREATED,
                    &serde_json::json!({ "ok": true, "id": id }),
                )),
                CreateOutcome::DuplicateId { error, reason } => Ok(json_response(
                    StatusCode::BAD_REQUEST,
                    &ErrorBody {
                        ok: false,
                        error,
                        reason,
                    },
                )),
            }
        }
        _ => Err(GatehouseError::InvalidInput(
            "expected a document or an array of documents".into(),
        )),
    }
}

async fn bulk(
    req: Request<hyper::body::Incoming>,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let started = Instant::now();
    let body = read_json_body(req).await?;

    let JsonValue::Array(items) = body else {
        return Err(GatehouseError::InvalidInput(
            "expected an array of documents".into(),
        ));
    };

    if items.is_empty() {
        return Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "ok": false, "message": "nothing to save." }),
        ));
    }

    let docs = documents_from_values(items)?;

    // A _deleted marker anywhere switches the batch to deletions
    if docs.iter().any(|doc| doc.get_bool("_deleted").unwrap_or(false)) {
        let mut deleted = 0u64;
        for doc in &docs {
            let Ok(id) = doc.get_str("_id") else {
                continue;
            };
            deleted += gateway
                .delete_one(collection, UpdateSelector::Id(id.to_string()))
                .await?;
        }
        return Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "ok": true, "deleted": deleted }),
        ));
    }

    let saved = gateway.create_many(collection, docs).await?;
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({
            "ok": true,
            "saved": saved,
            "elapsed": started.elapsed().as_secs_f64(),
        }),
    ))
}

async fn copy(
    req: Request<hyper::body::Incoming>,
    state: &AppState,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let body = read_json_body(req).await?;
    let target = body
        .get("target")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| GatehouseError::InvalidInput("target collection is required".into()))?
        .to_string();
    let window = body
        .get("window")
        .and_then(JsonValue::as_u64)
        .map(|w| w as usize)
        .unwrap_or(state.args.copy_window);

    let report = copy_collection(gateway, collection, gateway, &target, &CopyConfig { window })
        .await?;

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({
            "ok": true,
            "windows": report.windows,
            "copied": report.copied,
        }),
    ))
}

async fn create_index(
    req: Request<hyper::body::Incoming>,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let body = read_json_body(req).await?;
    let keys = body
        .get("keys")
        .and_then(|value| bson::to_document(value).ok())
        .filter(|keys| !keys.is_empty())
        .ok_or_else(|| GatehouseError::InvalidInput("index keys are required".into()))?;
    let unique = body.get("unique").and_then(JsonValue::as_bool).unwrap_or(false);

    gateway.create_index(collection, keys, unique).await?;
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "ok": true })))
}

async fn queue_push(
    req: Request<hyper::body::Incoming>,
    state: &Arc<AppState>,
    url: &str,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let body = read_json_body(req).await?;
    let docs = match body {
        JsonValue::Array(items) => documents_from_values(items)?,
        value @ JsonValue::Object(_) => vec![document_from_value(&value)?],
        _ => {
            return Err(GatehouseError::InvalidInput(
                "expected a document or an array of documents".into(),
            ))
        }
    };

    let queued = docs.len();
    let queue = state.queue_for(url, gateway.clone(), collection);
    queue.push(docs).await?;

    Ok(json_response(
        StatusCode::ACCEPTED,
        &serde_json::json!({ "ok": true, "queued": queued }),
    ))
}

async fn queue_flush(
    state: &Arc<AppState>,
    url: &str,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let queue = state.queue_for(url, gateway.clone(), collection);
    let report = queue.flush().await?;

    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "ok": true, "flushed": report.flushed }),
    ))
}

async fn update_by_id(
    req: Request<hyper::body::Incoming>,
    gateway: &Gateway,
    collection: &str,
    id: &str,
) -> Result<Response<BoxBody>> {
    let body = read_json_body(req).await?;
    let patch = document_from_value(&body)?;

    let matched = gateway
        .update(collection, UpdateSelector::Id(id.to_string()), patch)
        .await?;

    if matched == 0 {
        return Err(GatehouseError::NotFound);
    }
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "ok": true })))
}

/// Update via an explicit `{select, data}` payload when the request context
/// carries no identifier
async fn update_by_selector(
    req: Request<hyper::body::Incoming>,
    gateway: &Gateway,
    collection: &str,
) -> Result<Response<BoxBody>> {
    let body = read_json_body(req).await?;
    let select = body
        .get("select")
        .and_then(|value| bson::to_document(value).ok())
        .filter(|select| !select.is_empty())
        .ok_or_else(|| GatehouseError::InvalidInput("select is required".into()))?;
    let patch = body
        .get("data")
        .map(document_from_value)
        .transpose()?
        .ok_or_else(|| GatehouseError::InvalidInput("data is required".into()))?;

    let matched = gateway
        .update(collection, UpdateSelector::Filter(select), patch)
        .await?;

    if matched == 0 {
        return Err(GatehouseError::NotFound);
    }
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "ok": true })))
}

async fn delete_one(gateway: &Gateway, collection: &str, id: &str) -> Result<Response<BoxBody>> {
    let deleted = gateway
        .delete_one(collection, UpdateSelector::Id(id.to_string()))
        .await?;

    if deleted == 0 {
        return Err(GatehouseError::NotFound);
    }
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({ "ok": true, "deleted": deleted }),
    ))
}

async fn drop_collection(gateway: &Gateway, collection: &str) -> Result<Response<BoxBody>> {
    gateway.drop(collection).await?;
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "ok": true })))
}

/// Decode query parameters, percent-decoding keys and values
fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Some(query) = query else {
        return map;
    };

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| key.to_string());
        let value = urlencoding::decode(value)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| value.to_string());
        map.insert(key, value);
    }
    map
}

/// Read the `select` query parameter as a JSON filter.
///
/// Malformed JSON degrades to an empty filter.
fn selector_param(params: &HashMap<String, String>) -> Document {
    json_param(params, "select").unwrap_or_default()
}

fn json_param(params: &HashMap<String, String>, name: &str) -> Option<Document> {
    params
        .get(name)
        .and_then(|raw| serde_json::from_str::<JsonValue>(raw).ok())
        .and_then(|value| bson::to_document(&value).ok())
}

fn document_from_value(value: &JsonValue) -> Result<Document> {
    bson::to_document(value)
        .map_err(|e| GatehouseError::InvalidInput(format!("expected a JSON object: {e}")))
}

fn documents_from_values(items: Vec<JsonValue>) -> Result<Vec<Document>> {
    items.iter().map(document_from_value).collect()
}
