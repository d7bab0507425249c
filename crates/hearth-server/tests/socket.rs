use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

use hearth_api::notify::DisabledNotifier;
use hearth_api::state::{AppState, AppStateInner};
use hearth_db::Database;
use hearth_db::models::NewUser;
use hearth_gateway::hub::RoomHub;
use hearth_gateway::presence::{PresencePolicy, PresenceTracker};
use hearth_server::build_app;
use hearth_types::api::CreatePollRequest;
use hearth_types::ids::FamilyId;
use hearth_types::models::{Role, SessionUser};

const SECRET: &str = "socket-test-secret";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    state: AppState,
    db: Arc<Database>,
}

async fn spawn_server() -> Server {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let hub = RoomHub::new();
    let presence = PresenceTracker::new(db.clone(), hub.clone(), PresencePolicy::default());
    let state = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret: SECRET.into(),
        broadcaster: Arc::new(hub),
        notifier: Arc::new(DisabledNotifier),
        cookie_secure: false,
    });

    let app = build_app(state.clone(), presence);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Server { addr, state, db }
}

fn seed_user(db: &Database, name: &str) -> SessionUser {
    let id = Uuid::new_v4();
    let created_at = hearth_db::format_timestamp(Utc::now());
    db.create_user(&NewUser {
        id: &id.to_string(),
        name,
        email: &format!("{}@example.com", name.to_lowercase()),
        password_hash: "unused",
        role: "admin",
        parent_id: None,
        family_id: Some("famsock"),
        phone: None,
        created_at: &created_at,
    })
    .unwrap();

    SessionUser {
        id,
        name: name.into(),
        role: Role::Admin,
        family_id: Some(FamilyId::new("famsock")),
        parent_id: None,
    }
}

async fn connect(addr: SocketAddr, cookie: Option<String>) -> Result<Client, tungstenite::Error> {
    let mut req = format!("ws://{}/socket", addr).into_client_request().unwrap();
    if let Some(cookie) = cookie {
        req.headers_mut()
            .insert("cookie", HeaderValue::from_str(&cookie).unwrap());
    }
    connect_async(req).await.map(|(ws, _)| ws)
}

async fn next_event(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for an event")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn is_online(db: &Arc<Database>, user: &SessionUser) -> bool {
    let db = db.clone();
    let id = user.id.to_string();
    tokio::task::spawn_blocking(move || db.get_user_by_id(&id).unwrap().unwrap().is_online)
        .await
        .unwrap()
}

#[tokio::test]
async fn handshake_with_cookie_joins_the_family_room() {
    let server = spawn_server().await;
    let user = seed_user(&server.db, "Nisha");
    let token = hearth_api::auth::create_token(SECRET, user.id, &user.name).unwrap();

    let mut ws = connect(server.addr, Some(format!("token={}", token))).await.unwrap();

    let ready = next_event(&mut ws).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["data"]["userId"], user.id.to_string());

    let presence = next_event(&mut ws).await;
    assert_eq!(presence["type"], "dashboardUpdate");
    assert!(is_online(&server.db, &user).await);

    // REST-side fan-out reaches the socket
    hearth_api::polls::create_poll(
        &server.state,
        &user,
        CreatePollRequest {
            question: "Tea or coffee?".into(),
            options: vec!["Tea".into(), "Coffee".into()],
        },
    )
    .await
    .unwrap();
    let poll = next_event(&mut ws).await;
    assert_eq!(poll["type"], "new_poll");
    assert_eq!(poll["data"]["question"], "Tea or coffee?");

    ws.close(None).await.unwrap();
    let mut offline = false;
    for _ in 0..50 {
        if !is_online(&server.db, &user).await {
            offline = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(offline, "user should be marked offline after disconnect");
}

#[tokio::test]
async fn handshake_without_valid_cookie_is_refused() {
    let server = spawn_server().await;

    match connect(server.addr, None).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("upgrade should have been refused"),
    }

    match connect(server.addr, Some("token=forged".into())).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status(), 401),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}
