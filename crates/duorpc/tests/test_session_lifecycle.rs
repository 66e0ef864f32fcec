//! Session start, stop, and what the read loop does with odd input.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use duorpc::duplex;
use duorpc::session;
use duorpc::Deferred;
use duorpc::Error;
use duorpc::ErrorCode;
use duorpc::Json;
use duorpc::Session;
use duowire::Codec;
use duowire::CodecError;
use duowire::Frame;
use duowire::RequestFrame;
use duowire::ResponseFrame;

/// A session on one end of a pipe and a bare codec on the other.
fn against_raw_peer() -> (Session<Json>, Codec<Json>) {
    let (left, right) = tokio::io::duplex(duplex::PIPE_CAPACITY);
    (Session::new(Json, left), Codec::new(Json, right))
}

#[tokio::test]
async fn test_unknown_response_is_dropped() {
    let (session, peer) = against_raw_peer();
    session
        .server()
        .register_fn("ping", || async { Ok::<_, anyhow::Error>("pong".to_string()) })
        .expect("register ping");
    session.spawn();

    let stray = ResponseFrame::success(777, Deferred::encode(peer.format(), &1i64).expect("encode"));
    peer.write_response(&stray).await.expect("write stray response");

    // the loop is still serving
    peer.write_request(&RequestFrame::new(1, "ping", vec![])).await.expect("write ping");
    match peer.read().await.expect("read reply") {
        Frame::Response(reply) => {
            assert_eq!(reply.id, 1);
            let text: String = reply.result.expect("result").decode().expect("decode");
            assert_eq!(text, "pong");
        }
        Frame::Request(request) => panic!("unexpected request {}", request.method),
    }
}

#[tokio::test]
async fn test_malformed_frame_ends_session() {
    let (left, mut right) = tokio::io::duplex(duplex::PIPE_CAPACITY);
    let session = Session::new(Json, left);
    let running = session.spawn();

    right.write_all(b"this is not json\n").await.expect("write garbage");

    let outcome = running.await.expect("join");
    assert!(matches!(outcome, Err(session::Error::Read(CodecError::Json(_)))), "{:?}", outcome);
}

#[tokio::test]
async fn test_object_params_are_answered() {
    let (left, right) = tokio::io::duplex(duplex::PIPE_CAPACITY);
    let session = Session::new(Json, left);
    session
        .server()
        .register_fn("add", |a: i64, b: i64| async move { Ok::<_, anyhow::Error>(a + b) })
        .expect("register add");
    let running = session.spawn();

    let (reader, mut writer) = tokio::io::split(right);
    let peer = Codec::from_parts(Json, reader, tokio::io::sink());
    writer
        .write_all(b"{\"id\":1,\"method\":\"add\",\"params\":{\"a\":1}}\n")
        .await
        .expect("write object params");
    writer
        .write_all(b"{\"id\":2,\"method\":\"add\",\"params\":[1,2]}\n")
        .await
        .expect("write array params");

    let mut replies = Vec::new();
    for _ in 0..2 {
        match peer.read().await.expect("read reply") {
            Frame::Response(reply) => replies.push(reply),
            Frame::Request(request) => panic!("unexpected request {}", request.method),
        }
    }
    replies.sort_by_key(|reply| reply.id);

    let rejected = replies[0].error.as_ref().expect("error for object params");
    assert_eq!(replies[0].id, 1);
    assert!(rejected.is(ErrorCode::InvalidParams), "{}", rejected);

    assert_eq!(replies[1].id, 2);
    let sum: i64 = replies[1].result.as_ref().expect("result").decode().expect("decode");
    assert_eq!(sum, 3);
    assert!(!running.is_finished());
}

#[tokio::test]
async fn test_peer_hangup_ends_cleanly() {
    let (session, peer) = against_raw_peer();
    let running = session.spawn();

    drop(peer);
    running.await.expect("join").expect("clean end");
}

#[tokio::test]
async fn test_close_unblocks_loop_and_fails_calls() {
    let (a, b) = duplex::pair::<Json>();
    let running = a.spawn();
    b.spawn();

    a.close().await.expect("close");
    assert!(a.is_closed());

    let outcome = tokio::time::timeout(Duration::from_secs(1), running).await;
    outcome.expect("loop returns after close").expect("join").expect("clean end");

    let err = a.client().call::<_, i64>("anything", ()).await.unwrap_err();
    assert!(matches!(err, Error::Disconnected), "{}", err);
}

#[tokio::test]
async fn test_peer_close_fails_calls_by_timeout() {
    let (a, b) = duplex::pair_with(
        duorpc::SessionBuilder::new(Json).timeout(Duration::from_millis(50)),
        duorpc::SessionBuilder::new(Json),
    );
    a.spawn();
    let b_running = b.spawn();

    b.close().await.expect("close b");
    b_running.await.expect("join").expect("clean end");

    // `a` never learns of pending calls ending; they time out
    let err = a.client().call::<_, i64>("anything", ()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout), "{}", err);
    assert_eq!(a.client().pending_calls(), 0);
}

#[tokio::test]
async fn test_second_loop_is_refused() {
    let (session, _peer) = against_raw_peer();

    let first = session.run();
    tokio::pin!(first);
    assert!(futures::poll!(&mut first).is_pending());

    let second = session.run().await;
    assert!(matches!(second, Err(session::Error::AlreadyRunning)));
}

#[tokio::test]
async fn test_nil_params_reach_handler_as_zero() {
    let (a, b) = duplex::pair::<Json>();
    b.server()
        .register_fn("greet", |name: String, times: u32| async move {
            Ok::<_, anyhow::Error>(format!("[{}]x{}", name, times))
        })
        .expect("register greet");
    a.spawn();
    b.spawn();

    let format = Arc::clone(a.codec().format());
    let params = vec![Deferred::nil(format.clone()), Deferred::nil(format)];
    let reply: String = a.client().call_remote("greet", params).await.expect("greet");
    assert_eq!(reply, "[]x0");
}

#[tokio::test]
async fn test_nil_result_is_zero() {
    let (a, b) = duplex::pair::<Json>();
    b.server()
        .register_fn("nothing", || async { Ok::<(), anyhow::Error>(()) })
        .expect("register nothing");
    a.spawn();
    b.spawn();

    let n: i64 = a.client().call("nothing", ()).await.expect("nothing");
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_result_decode_failure_is_parse_error() {
    let (a, b) = duplex::pair::<Json>();
    b.server()
        .register_fn("word", || async { Ok::<_, anyhow::Error>("seven".to_string()) })
        .expect("register word");
    a.spawn();
    b.spawn();

    let err = a.client().call::<_, i64>("word", ()).await.unwrap_err();
    assert!(err.is(ErrorCode::ParseError), "{}", err);
}
