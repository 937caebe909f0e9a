//! Integration tests for the live poll server
//!
//! These tests validate cross-component interactions through the session
//! gateway and real WebSocket and HTTP behaviour against a served router.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use server::connection::{ConnectionId, Outbound};
use server::gateway::{GatewayEvent, SessionGateway};
use server::network::{self, CLOSE_BY_SERVER};
use server::poll_engine::PollLimits;
use shared::{ClientEvent, ServerEvent};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

fn participants(names: &[&str]) -> ServerEvent {
    ServerEvent::ParticipantsUpdate(names.iter().map(|n| n.to_string()).collect())
}

fn two_plus_two(teacher: &str) -> ClientEvent {
    ClientEvent::CreatePoll(json!({
        "teacherUsername": teacher,
        "question": "2+2?",
        "timer": 30,
        "options": [{ "text": "3" }, { "text": "4", "correct": true }]
    }))
}

/// GATEWAY SESSION TESTS
mod session_tests {
    use super::*;

    struct Tab {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    impl Tab {
        fn events(&mut self) -> Vec<ServerEvent> {
            let mut events = Vec::new();
            while let Ok(outbound) = self.rx.try_recv() {
                if let Outbound::Frame(frame) = outbound {
                    events.push(ServerEvent::decode(frame.as_str()).unwrap());
                }
            }
            events
        }
    }

    fn open(gateway: &mut SessionGateway, id: u64) -> Tab {
        let (sender, rx) = mpsc::unbounded_channel();
        let id = ConnectionId(id);
        gateway.handle(GatewayEvent::Connected {
            id,
            addr: None,
            sender,
        });
        Tab { id, rx }
    }

    fn send(gateway: &mut SessionGateway, tab: &Tab, event: ClientEvent) {
        gateway.handle(GatewayEvent::Inbound { id: tab.id, event });
    }

    fn close(gateway: &mut SessionGateway, tab: &Tab) {
        gateway.handle(GatewayEvent::Disconnected { id: tab.id });
    }

    /// Presence always equals the usernames with at least one open tab
    #[test]
    fn presence_tracks_join_and_disconnect_sequences() {
        let mut gateway = SessionGateway::new(64, PollLimits::default());
        let mut observer = open(&mut gateway, 100);
        let names = ["u1", "u2", "u3"];
        let mut tabs = Vec::new();

        for (i, name) in names.iter().cycle().take(9).enumerate() {
            let tab = open(&mut gateway, i as u64 + 1);
            send(&mut gateway, &tab, ClientEvent::JoinChat(json!({ "username": name })));
            tabs.push((name.to_string(), tab));
        }
        assert_eq!(observer.events().last(), Some(&participants(&names)));

        while let Some((name, tab)) = tabs.pop() {
            close(&mut gateway, &tab);

            let mut expected: Vec<String> = tabs.iter().map(|(n, _)| n.clone()).collect();
            expected.sort();
            expected.dedup();
            assert_eq!(
                observer.events().last(),
                Some(&ServerEvent::ParticipantsUpdate(expected.clone())),
                "after closing a tab of {}",
                name
            );
        }
    }

    /// Full classroom flow: create, vote, duplicate vote, history
    #[test]
    fn classroom_poll_flow() {
        let mut gateway = SessionGateway::new(64, PollLimits::default());
        let mut teacher = open(&mut gateway, 1);
        let mut student = open(&mut gateway, 2);

        send(&mut gateway, &teacher, two_plus_two("t1"));
        let created = match student.events().as_slice() {
            [ServerEvent::PollCreated(created)] => created.clone(),
            other => panic!("expected pollCreated, got {:?}", other),
        };
        assert_eq!(
            created.options.iter().map(|o| o.correct).collect::<Vec<_>>(),
            vec![false, true]
        );
        teacher.events();

        for _ in 0..2 {
            send(
                &mut gateway,
                &student,
                ClientEvent::SubmitAnswer(json!({ "username": "u1", "pollId": created.id, "option": "4" })),
            );
        }

        let expected: shared::Tally =
            [("3".to_string(), 0), ("4".to_string(), 1)].into_iter().collect();
        assert_eq!(
            teacher.events(),
            vec![
                ServerEvent::PollResults(expected.clone()),
                ServerEvent::PollResults(expected)
            ]
        );

        let history = gateway.polls().store().list_by_teacher("t1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].options[1].votes, 1);
    }

    /// Votes from many students add up to the number of distinct voters
    #[test]
    fn tally_sum_equals_distinct_voters() {
        let mut gateway = SessionGateway::new(64, PollLimits::default());
        let mut teacher = open(&mut gateway, 1);
        send(&mut gateway, &teacher, two_plus_two("t1"));
        let poll_id = match teacher.events().as_slice() {
            [ServerEvent::PollCreated(created)] => created.id.clone(),
            other => panic!("expected pollCreated, got {:?}", other),
        };

        for voter in 0..20 {
            let option = if voter % 3 == 0 { "3" } else { "4" };
            for _ in 0..2 {
                send(
                    &mut gateway,
                    &teacher,
                    ClientEvent::SubmitAnswer(json!({
                        "username": format!("u{}", voter % 10),
                        "pollId": poll_id,
                        "option": option
                    })),
                );
            }
        }

        match teacher.events().last() {
            Some(ServerEvent::PollResults(tally)) => assert_eq!(tally.values().sum::<u64>(), 10),
            other => panic!("expected pollResults, got {:?}", other),
        }
    }
}

/// LIVE SERVER TESTS
mod live_server_tests {
    use super::*;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    struct TestServer {
        addr: SocketAddr,
        _shutdown: oneshot::Sender<()>,
    }

    async fn start_server(max_connections: usize) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (gateway, _task) = SessionGateway::new(max_connections, PollLimits::default()).spawn();
        let (shutdown, signal) = oneshot::channel::<()>();

        tokio::spawn(network::serve(listener, gateway, async move {
            let _ = signal.await;
        }));

        TestServer {
            addr,
            _shutdown: shutdown,
        }
    }

    async fn connect(server: &TestServer) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", server.addr))
            .await
            .unwrap();
        client
    }

    async fn send(client: &mut Client, event: ClientEvent) {
        client
            .send(Message::Text(event.encode().unwrap().into()))
            .await
            .unwrap();
    }

    async fn next_event(client: &mut Client) -> ServerEvent {
        loop {
            let message = timeout(WAIT, client.next())
                .await
                .expect("timed out waiting for an event")
                .expect("socket ended")
                .expect("receive error");
            match message {
                Message::Text(text) => return ServerEvent::decode(text.as_str()).unwrap(),
                Message::Close(frame) => panic!("socket closed: {:?}", frame),
                _ => continue,
            }
        }
    }

    async fn close_code(client: &mut Client) -> Option<u16> {
        loop {
            match timeout(WAIT, client.next())
                .await
                .expect("timed out waiting for close")
            {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| f.code.into()),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    }

    async fn join(client: &mut Client, username: &str) {
        send(client, ClientEvent::JoinChat(json!({ "username": username }))).await;
    }

    /// Tests join, chat, poll and vote over real sockets
    #[tokio::test]
    async fn websocket_session_round_trip() {
        let server = start_server(16).await;
        let mut teacher = connect(&server).await;
        join(&mut teacher, "t1").await;
        assert_eq!(next_event(&mut teacher).await, participants(&["t1"]));

        let mut student = connect(&server).await;
        join(&mut student, "u1").await;
        assert_eq!(next_event(&mut teacher).await, participants(&["t1", "u1"]));
        assert_eq!(next_event(&mut student).await, participants(&["t1", "u1"]));

        let message = json!({ "user": "u1", "text": "hello" });
        send(&mut student, ClientEvent::ChatMessage(message.clone())).await;
        assert_eq!(next_event(&mut teacher).await, ServerEvent::ChatMessage(message.clone()));
        assert_eq!(next_event(&mut student).await, ServerEvent::ChatMessage(message));

        send(&mut teacher, two_plus_two("t1")).await;
        let poll_id = match next_event(&mut student).await {
            ServerEvent::PollCreated(created) => {
                assert_eq!(created.question, "2+2?");
                assert_eq!(created.timer, serde_json::Number::from(30));
                created.id
            }
            other => panic!("expected pollCreated, got {:?}", other),
        };
        assert!(matches!(next_event(&mut teacher).await, ServerEvent::PollCreated(_)));

        send(
            &mut student,
            ClientEvent::SubmitAnswer(json!({ "username": "u1", "pollId": poll_id, "option": "4" })),
        )
        .await;
        match next_event(&mut teacher).await {
            ServerEvent::PollResults(tally) => {
                assert_eq!(tally.get("3"), Some(&0));
                assert_eq!(tally.get("4"), Some(&1));
            }
            other => panic!("expected pollResults, got {:?}", other),
        }
    }

    /// Garbage frames are ignored without closing the socket
    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let server = start_server(16).await;
        let mut client = connect(&server).await;

        client.send(Message::Text("not json".into())).await.unwrap();
        client
            .send(Message::Text(r#"{"event":"danceParty","data":1}"#.into()))
            .await
            .unwrap();
        send(&mut client, ClientEvent::CreatePoll(Value::Null)).await;
        join(&mut client, "u1").await;

        assert_eq!(next_event(&mut client).await, participants(&["u1"]));

        // A payload of the wrong shape still yields a blank poll
        send(&mut client, ClientEvent::CreatePoll(json!("nope"))).await;
        match next_event(&mut client).await {
            ServerEvent::PollCreated(created) => {
                assert_eq!(created.question, "");
                assert!(created.options.is_empty());
            }
            other => panic!("expected pollCreated, got {:?}", other),
        }
    }

    /// Kicking a username closes every one of its tabs
    #[tokio::test]
    async fn kick_closes_all_tabs() {
        let server = start_server(16).await;
        let mut teacher = connect(&server).await;
        join(&mut teacher, "t1").await;
        next_event(&mut teacher).await;

        let mut tab1 = connect(&server).await;
        join(&mut tab1, "u1").await;
        next_event(&mut teacher).await;
        next_event(&mut tab1).await;

        let mut tab2 = connect(&server).await;
        join(&mut tab2, "u1").await;
        next_event(&mut teacher).await;
        next_event(&mut tab1).await;
        next_event(&mut tab2).await;

        send(&mut teacher, ClientEvent::KickOut(json!("u1"))).await;

        for tab in [&mut tab1, &mut tab2] {
            assert_eq!(next_event(tab).await, ServerEvent::KickedOut);
            assert_eq!(close_code(tab).await, Some(CLOSE_BY_SERVER));
        }

        // One update per closed tab; the last no longer lists u1
        assert_eq!(next_event(&mut teacher).await, participants(&["t1", "u1"]));
        assert_eq!(next_event(&mut teacher).await, participants(&["t1"]));
    }

    /// Sockets beyond the connection limit are closed straight away
    #[tokio::test]
    async fn connection_limit_closes_extra_sockets() {
        let server = start_server(1).await;
        let mut first = connect(&server).await;
        join(&mut first, "u1").await;
        assert_eq!(next_event(&mut first).await, participants(&["u1"]));

        let mut second = connect(&server).await;
        assert_eq!(close_code(&mut second).await, Some(CLOSE_BY_SERVER));

        // The refused socket never reached the session
        let message = json!("still here");
        send(&mut first, ClientEvent::ChatMessage(message.clone())).await;
        assert_eq!(next_event(&mut first).await, ServerEvent::ChatMessage(message));
    }

    /// Tests the HTTP endpoints served next to the socket
    #[tokio::test]
    async fn http_endpoints() {
        let server = start_server(16).await;
        let base = format!("http://{}", server.addr);
        let http = reqwest::Client::new();

        let health: Value = http
            .get(format!("{}/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health, json!({ "ok": true }));

        let login: Value = http
            .post(format!("{}/teacher-login", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let teacher = login["username"].as_str().unwrap().to_string();
        assert!(teacher.starts_with("teacher_"));

        let mut socket = connect(&server).await;
        send(&mut socket, two_plus_two(&teacher)).await;
        assert!(matches!(next_event(&mut socket).await, ServerEvent::PollCreated(_)));

        let history: Value = http
            .get(format!("{}/polls/{}", base, teacher))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let polls = history["data"].as_array().unwrap();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0]["question"], "2+2?");
        for option in polls[0]["options"].as_array().unwrap() {
            assert!(option.get("correct").is_none());
            assert_eq!(option["votes"], 0);
        }

        let empty: Value = http
            .get(format!("{}/polls/nobody", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(empty, json!({ "data": [] }));
    }

    /// Browsers on another origin can call the endpoints
    #[tokio::test]
    async fn cors_headers_present() {
        let server = start_server(16).await;
        let response = reqwest::Client::new()
            .get(format!("http://{}/health", server.addr))
            .header("Origin", "http://localhost:5173")
            .send()
            .await
            .unwrap();

        tokio_test::assert_ok!(response.error_for_status_ref());
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
