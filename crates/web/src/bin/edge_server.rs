use edge_web::config::EdgeConfig;
use edge_web::router::{Router, get, post};
use edge_web::{DecodedBody, EdgeRequest, Server, handler_fn, pipeline};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

fn ping(_req: &EdgeRequest) -> BoxFuture<'_, Value> {
    async { json!({ "pong": true }) }.boxed()
}

fn echo(req: &EdgeRequest) -> BoxFuture<'_, Value> {
    async move {
        match req.decoded_body() {
            Some(DecodedBody::Json(value)) => value.clone(),
            Some(DecodedBody::Form(pairs)) => {
                let map = pairs.iter().map(|(key, value)| (key.clone(), Value::from(value.as_str()))).collect::<Map<_, _>>();
                Value::Object(map)
            }
            Some(DecodedBody::Text(text)) => Value::from(text.as_str()),
            Some(DecodedBody::Multipart(form)) => json!({
                "fields": form.fields.iter().map(|(key, value)| json!({ "name": key, "value": value })).collect::<Vec<_>>(),
                "files": form.files.iter().map(|file| json!({
                    "field": file.field_name,
                    "file_name": file.file_name,
                    "size": file.data.len(),
                })).collect::<Vec<_>>(),
            }),
            None => Value::Null,
        }
    }
    .boxed()
}

fn item(req: &EdgeRequest) -> BoxFuture<'_, Value> {
    async move { json!({ "id": req.path_param("id") }) }.boxed()
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match EdgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(config.server.log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    let router = match Router::builder()
        .route("/api/ping", get(handler_fn(ping)))
        .route("/api/echo", post(handler_fn(echo)))
        .route("/api/items/{id}", get(handler_fn(item)))
        .build()
    {
        Ok(router) => router,
        Err(e) => {
            error!(cause = %e, "failed to build router");
            return ExitCode::FAILURE;
        }
    };

    info!(mode = ?config.pipeline.runtime_mode, asset_root = %config.pipeline.asset_root.display(), "starting edge server");
    let handler = pipeline::build(Arc::new(config.pipeline), router);
    let server = match Server::builder().address(config.server.address()).handler(handler).build() {
        Ok(server) => server,
        Err(e) => {
            error!(cause = %e, "failed to build server");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.start() => {
            if let Err(e) = result {
                error!(cause = %e, "server stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
    ExitCode::SUCCESS
}
