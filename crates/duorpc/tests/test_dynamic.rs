//! Values whose concrete type is picked by the sender.

use serde::Deserialize;
use serde::Serialize;

use duorpc::duplex;
use duorpc::Binary;
use duorpc::Dynamic;
use duorpc::Error;
use duorpc::ErrorCode;
use duorpc::Json;
use duowire::CodecError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Point {
    x: i32,
    y: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Label(String);

async fn describe(value: Dynamic) -> anyhow::Result<String> {
    if let Some(point) = value.downcast_ref::<Point>() {
        return Ok(format!("point {} {}", point.x, point.y));
    }
    if let Some(Label(text)) = value.downcast_ref::<Label>() {
        return Ok(format!("label {}", text));
    }
    let name = value.type_name().to_owned();
    match value.downcast::<Point>() {
        Ok(point) => Ok(format!("tree point {} {}", point.x, point.y)),
        Err(_) => Err(anyhow::anyhow!("cannot describe {}", name)),
    }
}

#[tokio::test]
async fn test_binary_registered_types() {
    let (a, b) = duplex::pair::<Binary>();
    for session in [&a, &b] {
        session.register_type::<Point>().expect("register Point");
        session.register_type::<Label>().expect("register Label");
    }
    b.server().register_fn("describe", describe).expect("register describe");
    b.server()
        .register_fn("origin", || async { Ok::<_, anyhow::Error>(Dynamic::new(Point { x: 0, y: 0 })) })
        .expect("register origin");
    a.spawn();
    b.spawn();

    let text: String = a.client().call("describe", (Dynamic::new(Point { x: 1, y: 2 }),)).await.expect("point");
    assert_eq!(text, "point 1 2");

    let text: String = a.client().call("describe", (Dynamic::new(Label("hi".into())),)).await.expect("label");
    assert_eq!(text, "label hi");

    let origin: Dynamic = a.client().call("origin", ()).await.expect("origin");
    assert!(origin.is::<Point>());
    assert_eq!(origin.downcast::<Point>().expect("downcast"), Point { x: 0, y: 0 });
}

#[tokio::test]
async fn test_binary_unregistered_send_fails_locally() {
    let (a, b) = duplex::pair::<Binary>();
    b.server().register_fn("describe", describe).expect("register describe");
    a.spawn();
    b.spawn();

    let err = a.client().call::<_, String>("describe", (Dynamic::new(Point { x: 1, y: 2 }),)).await.unwrap_err();
    match err {
        Error::Codec(CodecError::Unregistered(name)) => assert!(name.ends_with("Point"), "{}", name),
        other => panic!("expected an unregistered type, got {}", other),
    }
    assert_eq!(a.client().pending_calls(), 0);
}

#[tokio::test]
async fn test_binary_unregistered_receive_is_invalid_params() {
    let (a, b) = duplex::pair::<Binary>();
    a.register_type::<Point>().expect("register Point");
    b.server().register_fn("describe", describe).expect("register describe");
    a.spawn();
    b.spawn();

    let err = a.client().call::<_, String>("describe", (Dynamic::new(Point { x: 1, y: 2 }),)).await.unwrap_err();
    assert!(err.is(ErrorCode::InvalidParams), "{}", err);
}

#[tokio::test]
async fn test_json_needs_no_registration() {
    let (a, b) = duplex::pair::<Json>();
    b.server().register_fn("describe", describe).expect("register describe");
    a.spawn();
    b.spawn();

    let text: String = a.client().call("describe", (Dynamic::new(Point { x: 3, y: 4 }),)).await.expect("point");
    assert_eq!(text, "tree point 3 4");

    let err = a.client().call::<_, String>("describe", (Dynamic::new(Label("hi".into())),)).await.unwrap_err();
    assert!(err.is(ErrorCode::FunctionError), "{}", err);
}

#[tokio::test]
async fn test_conflicting_names_are_refused() {
    let format = Binary::new();
    format.register_type_as::<Point>("shape").expect("first name");
    format.register_type_as::<Point>("shape").expect("same name again");

    let err = format.register_type_as::<Label>("shape").unwrap_err();
    assert!(matches!(err, CodecError::RegistrationConflict { .. }), "{}", err);
}
