//! End-to-end session tests over real TCP connections.
//!
//! Each test starts its own server on an ephemeral port and drives it with a
//! framed client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use smppserver::codec::{
    Address, Bind, CommandId, Pdu, PduFrame, ShortMessage, SmppCodec, Status,
    TAG_SC_INTERFACE_VERSION, VERSION_3_4,
};
use smppserver::config::{ServerConfig, SessionConfig};
use smppserver::management::InMemoryRegistry;
use smppserver::{
    Message, ServerStatus, SessionListener, SessionStatus, SmppRequest, SmppServer, SmppSession,
};

type Client = Framed<TcpStream, SmppCodec>;

const WAIT: Duration = Duration::from_secs(5);

fn test_config(name: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        address: "127.0.0.1:0".parse().unwrap(),
        system_id: "smsc".to_string(),
        ..Default::default()
    }
}

async fn start_server(name: &str) -> SmppServer {
    let server = SmppServer::new(test_config(name), SessionConfig::default());
    server.start().await.unwrap();
    server
}

async fn connect(server: &SmppServer) -> Client {
    let stream = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    Framed::new(stream, SmppCodec::new())
}

async fn exchange(client: &mut Client, frame: PduFrame) -> PduFrame {
    client.send(frame).await.unwrap();
    receive(client).await
}

async fn receive(client: &mut Client) -> PduFrame {
    tokio::time::timeout(WAIT, client.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("connection closed")
        .unwrap()
}

async fn expect_closed(client: &mut Client) {
    let next = tokio::time::timeout(WAIT, client.next())
        .await
        .expect("timed out waiting for close");
    assert!(next.is_none() || next.unwrap().is_err());
}

async fn wait_for_sessions(server: &SmppServer, count: usize) {
    tokio::time::timeout(WAIT, async {
        while server.active_sessions().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session count never reached");
}

fn bind_transceiver(sequence: u32) -> PduFrame {
    PduFrame::request(
        sequence,
        Pdu::BindTransceiver(Bind {
            system_id: "esme01".into(),
            password: "secret".into(),
            interface_version: VERSION_3_4,
            ..Default::default()
        }),
    )
}

fn submit_sm(sequence: u32) -> PduFrame {
    PduFrame::request(
        sequence,
        Pdu::SubmitSm(Box::new(ShortMessage {
            source: Address::new(1, 1, "258840000001"),
            destination: Address::new(1, 1, "258840000002"),
            short_message: "hello".into(),
            ..Default::default()
        })),
    )
}

#[tokio::test]
async fn test_bind_submit_and_unbind() {
    let server = start_server("flow").await;
    let mut client = connect(&server).await;

    let resp = exchange(&mut client, bind_transceiver(1)).await;
    assert_eq!(resp.command(), CommandId::BindTransceiverResp);
    assert_eq!(resp.sequence(), 1);
    assert_eq!(resp.status(), Status::Ok);
    match &resp.pdu {
        Pdu::BindTransceiverResp(body) => {
            assert_eq!(body.system_id, "smsc");
            let version = body.tlvs.get(TAG_SC_INTERFACE_VERSION).unwrap();
            assert_eq!(version.value.as_ref(), &[VERSION_3_4]);
        }
        other => panic!("unexpected pdu {:?}", other),
    }

    let sessions = server.sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status(), SessionStatus::Bound);
    assert_eq!(sessions[0].system_id().unwrap(), "esme01");

    let resp = exchange(&mut client, submit_sm(2)).await;
    assert_eq!(resp.command(), CommandId::SubmitSmResp);
    assert_eq!(resp.status(), Status::Ok);
    match &resp.pdu {
        Pdu::SubmitSmResp(body) => assert_eq!(body.message_id, "00000001"),
        other => panic!("unexpected pdu {:?}", other),
    }

    let resp = exchange(&mut client, PduFrame::request(3, Pdu::EnquireLink)).await;
    assert_eq!(resp.command(), CommandId::EnquireLinkResp);
    assert_eq!(resp.sequence(), 3);

    let resp = exchange(&mut client, PduFrame::request(4, Pdu::Unbind)).await;
    assert_eq!(resp.command(), CommandId::UnbindResp);
    assert_eq!(resp.status(), Status::Ok);

    expect_closed(&mut client).await;
    wait_for_sessions(&server, 0).await;
    assert_eq!(server.created_sessions(), 1);
    assert_eq!(server.destroyed_sessions(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_requests_before_bind_are_rejected() {
    let server = start_server("unbound").await;
    let mut client = connect(&server).await;

    let resp = exchange(&mut client, submit_sm(7)).await;
    assert_eq!(resp.command(), CommandId::SubmitSmResp);
    assert_eq!(resp.sequence(), 7);
    assert_eq!(resp.status(), Status::InvalidBindStatus);

    let resp = exchange(&mut client, bind_transceiver(8)).await;
    assert_eq!(resp.status(), Status::Ok);

    let resp = exchange(&mut client, bind_transceiver(9)).await;
    assert_eq!(resp.command(), CommandId::BindTransceiverResp);
    assert_eq!(resp.status(), Status::AlreadyBound);

    server.stop().await;
}

#[tokio::test]
async fn test_server_initiated_deliver_sm() {
    let server = start_server("deliver").await;
    let mut client = connect(&server).await;
    exchange(&mut client, bind_transceiver(1)).await;

    let session = server.sessions().await.remove(0);
    let message = Message::new(
        Address::new(1, 1, "258840000002"),
        Address::new(1, 1, "258840000001"),
        "delivered",
    );
    let pending = tokio::spawn(async move {
        session
            .send_request(SmppRequest::deliver_sm(message), WAIT)
            .await
    });

    let deliver = receive(&mut client).await;
    assert_eq!(deliver.command(), CommandId::DeliverSm);
    assert!(deliver.sequence() >= 1);
    client
        .send(PduFrame::response_for(&deliver, Status::Ok))
        .await
        .unwrap();

    let response = pending.await.unwrap().unwrap();
    assert!(response.is_ok());
    assert_eq!(response.command_id, CommandId::DeliverSmResp);
    assert_eq!(response.sequence_number, deliver.sequence());

    server.stop().await;
}

#[tokio::test]
async fn test_close_sends_unbind_then_disconnects() {
    let server = start_server("close").await;
    let mut client = connect(&server).await;
    exchange(&mut client, bind_transceiver(1)).await;

    let session = server.sessions().await.remove(0);
    let closing = tokio::spawn(async move { session.close().await });

    let unbind = receive(&mut client).await;
    assert_eq!(unbind.command(), CommandId::Unbind);
    client
        .send(PduFrame::response_for(&unbind, Status::Ok))
        .await
        .unwrap();

    closing.await.unwrap().unwrap();
    expect_closed(&mut client).await;
    wait_for_sessions(&server, 0).await;

    server.stop().await;
}

#[tokio::test]
async fn test_stop_disconnects_every_session() {
    let server = start_server("stop").await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        let mut client = connect(&server).await;
        exchange(&mut client, bind_transceiver(1)).await;
        clients.push(client);
    }
    wait_for_sessions(&server, 3).await;

    server.stop().await;

    assert_eq!(server.status(), ServerStatus::Stopped);
    assert_eq!(server.active_sessions().await, 0);
    assert!(server.sessions().await.is_empty());
    assert_eq!(server.destroyed_sessions(), 3);
    for client in clients.iter_mut() {
        expect_closed(client).await;
    }
}

#[derive(Default)]
struct CountingListener {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl SessionListener for CountingListener {
    fn created(&self, _session: &SmppSession) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    fn destroyed(&self, _session: &SmppSession) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_session_listener_and_management_objects() {
    let management = Arc::new(InMemoryRegistry::new());
    let server = SmppServer::with_management(
        test_config("managed"),
        SessionConfig::default(),
        management.clone(),
    );
    let listener = Arc::new(CountingListener::default());
    server.set_session_listener(listener.clone());
    server.start().await.unwrap();

    let mut client = connect(&server).await;
    exchange(&mut client, bind_transceiver(1)).await;

    let session_name = "smppserver:type=Sessions,server=managed,id=session-1";
    assert_eq!(listener.created.load(Ordering::SeqCst), 1);
    let bean = management.get(session_name).unwrap();
    let attributes = bean.attributes().await;
    assert_eq!(attributes["status"], "BOUND");
    assert_eq!(attributes["bindType"], "TRANSCEIVER");
    assert_eq!(attributes["systemId"], "esme01");

    drop(client);
    wait_for_sessions(&server, 0).await;

    assert_eq!(listener.destroyed.load(Ordering::SeqCst), 1);
    assert!(management.get(session_name).is_none());
    assert!(management
        .get("smppserver:type=Server,name=managed")
        .is_some());

    server.stop().await;
}
