//! Unit tests for dispatch, client bookkeeping and registration.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::io::DuplexStream;

use duowire::Binary;
use duowire::Codec;
use duowire::Deferred;
use duowire::ErrorCode;
use duowire::ErrorObject;
use duowire::Format;
use duowire::Json;
use duowire::RequestFrame;
use duowire::ResponseFrame;

use crate::client::Client;
use crate::error::Error;
use crate::methods;
use crate::methods::TypeInfo;
use crate::server::Registrar;
use crate::server::Server;
use crate::server::Service;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A server whose responses go nowhere; the far end is returned to keep the
/// pipe open.
fn server<F: Format + Default>() -> (Server<F>, DuplexStream) {
    let (near, far) = tokio::io::duplex(64 * 1024);
    (Server::new(Arc::new(Codec::new(F::default(), near))), far)
}

fn json(server: &Server<Json>, text: &str) -> Deferred<Json> {
    Deferred::new(server.codec().format().clone(), Some(text.as_bytes().to_vec()))
}

fn request<F: Format>(id: i64, method: &str, params: Vec<Deferred<F>>) -> RequestFrame<F> {
    RequestFrame::new(id, method, params)
}

fn error_of<F>(response: &ResponseFrame<F>) -> &ErrorObject {
    response.error.as_ref().expect("expected an error response")
}

async fn add(a: i64, b: i64) -> anyhow::Result<i64> {
    Ok(a + b)
}

#[tokio::test]
async fn handle_success() {
    init_tracing();
    let (server, _far) = server::<Json>();
    server.register_fn("add", add).unwrap();

    let params = vec![json(&server, "10"), json(&server, "20")];
    let response = server.handle(request(1, "add", params)).await;

    assert_eq!(response.id, 1);
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap().decode::<i64>().unwrap(), 30);
}

#[tokio::test]
async fn handle_unknown_method() {
    let (server, _far) = server::<Json>();
    server.register_fn("add", add).unwrap();

    let response = server.handle(request(2, "sub", vec![])).await;
    assert_eq!(response.id, 2);
    assert!(error_of(&response).is(ErrorCode::MethodNotFound));
}

#[tokio::test]
async fn handle_bad_params() {
    let (server, _far) = server::<Json>();
    server.register_fn("add", add).unwrap();

    let wrong_type = vec![json(&server, r#""ab""#), json(&server, "20")];
    let response = server.handle(request(3, "add", wrong_type)).await;
    let error = error_of(&response);
    assert!(error.is(ErrorCode::InvalidParams));
    assert_eq!(error.message, "invalid params");

    let too_many = vec![json(&server, "1"), json(&server, "2"), json(&server, "3")];
    let response = server.handle(request(4, "add", too_many)).await;
    assert!(error_of(&response).is(ErrorCode::InvalidParams));

    let too_few = vec![json(&server, "1")];
    let response = server.handle(request(5, "add", too_few)).await;
    assert!(error_of(&response).is(ErrorCode::InvalidParams));
}

#[tokio::test]
async fn handle_nil_params_as_zero() {
    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Options {
        verbose: bool,
        depth: u32,
    }

    let (server, _far) = server::<Json>();
    server
        .register_fn("describe", |name: String, opts: Options, n: i64| async move {
            Ok::<_, anyhow::Error>(format!("{}|{}|{}|{}", name, opts.verbose, opts.depth, n))
        })
        .unwrap();

    let format = server.codec().format().clone();
    let params = vec![
        Deferred::nil(format.clone()),
        Deferred::nil(format.clone()),
        Deferred::nil(format),
    ];
    let response = server.handle(request(6, "describe", params)).await;
    assert_eq!(response.result.unwrap().decode::<String>().unwrap(), "|false|0|0");
}

#[tokio::test]
async fn handler_errors_become_function_errors() {
    let (server, _far) = server::<Json>();
    server
        .register_fn("fail", || async { Err::<i64, _>(anyhow::anyhow!("disk on fire")) })
        .unwrap();

    let response = server.handle(request(7, "fail", vec![])).await;
    let error = error_of(&response);
    assert!(error.is(ErrorCode::FunctionError));
    assert!(error.message.contains("disk on fire"));
}

#[tokio::test]
async fn structured_errors_pass_through() {
    let (server, _far) = server::<Json>();
    server
        .register_fn("deny", || async { Err::<(), _>(ErrorObject::new(4001, "denied")) })
        .unwrap();
    server
        .register_fn("forward", || async {
            Err::<(), _>(Error::Rpc(ErrorCode::InvalidParams.into()))
        })
        .unwrap();

    let response = server.handle(request(8, "deny", vec![])).await;
    assert_eq!(error_of(&response), &ErrorObject::new(4001, "denied"));

    let response = server.handle(request(9, "forward", vec![])).await;
    assert!(error_of(&response).is(ErrorCode::InvalidParams));
}

#[tokio::test]
async fn panics_are_contained() {
    let (server, _far) = server::<Json>();
    server
        .register_fn("explode", |n: i64| async move {
            if n > 0 {
                panic!("boom {}", n);
            }
            Ok::<i64, anyhow::Error>(n)
        })
        .unwrap();

    let response = server.handle(request(10, "explode", vec![json(&server, "3")])).await;
    let error = error_of(&response);
    assert!(error.is(ErrorCode::FunctionError));
    assert!(error.message.contains("boom 3"));

    // the server keeps serving
    let response = server.handle(request(11, "explode", vec![json(&server, "0")])).await;
    assert_eq!(response.result.unwrap().decode::<i64>().unwrap(), 0);
}

#[tokio::test]
async fn unit_results_are_null() {
    let (server, _far) = server::<Json>();
    server.register_fn("ping", || async { Ok::<(), anyhow::Error>(()) }).unwrap();

    let response = server.handle(request(12, "ping", vec![])).await;
    let result = response.result.unwrap();
    assert_eq!(result.raw(), Some(&b"null"[..]));
    result.decode::<()>().unwrap();
}

#[tokio::test]
async fn registration_rules() {
    let (server, _far) = server::<Json>();
    server.register_fn("add", add).unwrap();

    let err = server.register_fn("add", add).unwrap_err();
    assert!(matches!(err, methods::Error::Duplicate(name) if name == "add"));

    let err = server.register_fn("", add).unwrap_err();
    assert!(matches!(err, methods::Error::EmptyName));

    let signature = server.signature("add").unwrap();
    assert_eq!(signature.params, vec![TypeInfo::of::<i64>(), TypeInfo::of::<i64>()]);
    assert_eq!(signature.result, Some(TypeInfo::of::<i64>()));

    server.unregister("add").unwrap();
    assert!(server.methods().is_empty());
    assert!(matches!(server.unregister("add"), Err(methods::Error::NotFound(_))));
    server.register_fn("add", add).unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    sku: String,
    qty: u32,
}

#[tokio::test]
async fn binary_handlers_register_their_types() {
    let (server, _far) = server::<Binary>();
    server
        .register_fn("count", |items: Vec<Item>| async move {
            Ok::<_, anyhow::Error>(items.iter().map(|i| i.qty).sum::<u32>())
        })
        .unwrap();

    let registry = server.codec().format().registry();
    assert!(registry.contains::<Vec<Item>>());
    assert!(registry.contains::<u32>());
}

struct Inventory {
    stock: u32,
}

impl Inventory {
    async fn available(&self, sku: String) -> anyhow::Result<Item> {
        Ok(Item { sku, qty: self.stock })
    }
}

impl Service for Inventory {
    fn methods<F: Format>(self: Arc<Self>, registrar: &mut Registrar<F>) {
        let this = self;
        registrar
            .func("available", move |sku: String| {
                let this = this.clone();
                async move { this.available(sku).await }
            })
            .func("restock", |qty: u32| async move { Ok::<_, anyhow::Error>(qty) });
    }
}

struct Empty;

impl Service for Empty {
    fn methods<F: Format>(self: Arc<Self>, _registrar: &mut Registrar<F>) {}
}

#[tokio::test]
async fn services_register_all_or_nothing() {
    let (server, _far) = server::<Json>();
    assert_eq!(server.register_service(Arc::new(Inventory { stock: 5 })).unwrap(), 2);
    assert_eq!(server.methods(), vec!["available".to_string(), "restock".to_string()]);

    let response = server.handle(request(13, "available", vec![json(&server, r#""x1""#)])).await;
    assert_eq!(
        response.result.unwrap().decode::<Item>().unwrap(),
        Item { sku: "x1".into(), qty: 5 }
    );

    assert!(matches!(server.register_service(Arc::new(Empty)), Err(methods::Error::NoMethods)));

    // a clash leaves the table unchanged
    server.unregister("available").unwrap();
    let err = server.register_service(Arc::new(Inventory { stock: 1 })).unwrap_err();
    assert!(matches!(err, methods::Error::Duplicate(name) if name == "restock"));
    assert_eq!(server.methods(), vec!["restock".to_string()]);
}

fn client<F: Format + Default>(timeout: Duration) -> (Client<F>, DuplexStream) {
    let (near, far) = tokio::io::duplex(64 * 1024);
    (Client::new(Arc::new(Codec::new(F::default(), near)), timeout), far)
}

#[tokio::test]
async fn unknown_responses_are_dropped() {
    init_tracing();
    let (client, _far) = client::<Json>(Duration::from_secs(1));

    let format = client.codec().format().clone();
    let stray = ResponseFrame::success(99, Deferred::nil(format));
    assert!(!client.resolve(stray));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn timed_out_calls_leave_no_trace() {
    let (client, _far) = client::<Json>(Duration::from_millis(10));

    let err = client.call::<_, i64>("slow", (1,)).await.unwrap_err();
    assert!(matches!(err, Error::Timeout));
    assert_eq!(client.pending_calls(), 0);

    // the first call used id 1; its late answer finds nobody
    let format = client.codec().format().clone();
    assert!(!client.resolve(ResponseFrame::success(1, Deferred::nil(format))));
}

#[tokio::test]
async fn abandoned_calls_are_removed() {
    let (client, _far) = client::<Json>(Duration::ZERO);

    let call = client.call::<_, i64>("never", ());
    let outcome = tokio::time::timeout(Duration::from_millis(20), call).await;
    assert!(outcome.is_err());
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn closed_codec_means_disconnected() {
    let (client, _far) = client::<Json>(Duration::from_secs(1));
    client.codec().close().await.unwrap();

    let err = client.call::<_, i64>("add", (1, 2)).await.unwrap_err();
    assert!(matches!(err, Error::Disconnected));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn empty_method_names_are_rejected_locally() {
    let (client, _far) = client::<Json>(Duration::from_secs(1));
    let err = client.call::<_, i64>("", ()).await.unwrap_err();
    assert!(err.is(ErrorCode::InvalidRequest));
}

#[tokio::test]
async fn declared_shapes_are_checked() {
    let (client, _far) = client::<Binary>(Duration::from_secs(1));

    let echo = client.declare::<(String,), String>("echo").unwrap();
    assert_eq!(echo.name(), "echo");
    assert!(client.codec().format().registry().contains::<String>());

    let err = client.declare::<(String,), String>("echo").unwrap_err();
    assert!(matches!(err, methods::Error::Duplicate(_)));

    client.method::<(String,), String>("echo").unwrap();
    let err = client.method::<(i64,), String>("echo").unwrap_err();
    assert!(matches!(err, methods::Error::SignatureMismatch { .. }));
    let err = client.method::<(), ()>("missing").unwrap_err();
    assert!(matches!(err, methods::Error::NotFound(_)));

    assert_eq!(client.declared(), vec!["echo".to_string()]);
}
