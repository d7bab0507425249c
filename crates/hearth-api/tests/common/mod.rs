#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;

use hearth_api::notify::{AlertNotifier, NotifyTarget};
use hearth_api::state::{AppState, AppStateInner};
use hearth_db::Database;
use hearth_db::models::NewUser;
use hearth_gateway::hub::RoomHub;
use hearth_types::api::AlertView;
use hearth_types::events::GatewayEvent;
use hearth_types::ids::FamilyId;
use hearth_types::models::{Role, SessionUser};

pub const JWT_SECRET: &str = "integration-test-secret";

/// Remembers every dispatch instead of sending anything.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Uuid, Vec<NotifyTarget>)>>,
}

impl AlertNotifier for RecordingNotifier {
    fn notify(&self, alert: AlertView, targets: Vec<NotifyTarget>) -> BoxFuture<'static, ()> {
        self.sent.lock().unwrap().push((alert.id, targets));
        Box::pin(async {})
    }
}

pub struct Harness {
    pub state: AppState,
    pub db: Arc<Database>,
    pub hub: RoomHub,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let hub = RoomHub::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(AppStateInner {
            db: db.clone(),
            jwt_secret: JWT_SECRET.into(),
            broadcaster: Arc::new(hub.clone()),
            notifier: notifier.clone(),
            cookie_secure: false,
        });
        Self {
            state,
            db,
            hub,
            notifier,
        }
    }

    /// Insert a user whose account is `age_minutes` old.
    pub fn seed(
        &self,
        name: &str,
        role: Role,
        family: &str,
        parent: Option<&SessionUser>,
        phone: Option<&str>,
        age_minutes: i64,
    ) -> SessionUser {
        let id = Uuid::new_v4();
        let email = format!("{}.{}@example.com", name.to_lowercase(), family);
        let created_at = hearth_db::format_timestamp(Utc::now() - Duration::minutes(age_minutes));
        let parent_id = parent.map(|p| p.id.to_string());
        self.db
            .create_user(&NewUser {
                id: &id.to_string(),
                name,
                email: &email,
                password_hash: "unused",
                role: role.as_str(),
                parent_id: parent_id.as_deref(),
                family_id: Some(family),
                phone,
                created_at: &created_at,
            })
            .unwrap();

        SessionUser {
            id,
            name: name.into(),
            role,
            family_id: Some(FamilyId::new(family)),
            parent_id: parent.map(|p| p.id),
        }
    }

    /// A family with an admin and two children; only the admin has a phone.
    pub fn family(&self, family: &str) -> (SessionUser, SessionUser, SessionUser) {
        let admin = self.seed("Priya", Role::Admin, family, None, Some("+15550100"), 60);
        let first = self.seed("Arjun", Role::Child, family, Some(&admin), None, 50);
        let second = self.seed("Meera", Role::Child, family, Some(&admin), None, 40);
        (admin, first, second)
    }

    /// A test connection seated in the family's room.
    pub fn listen(&self, user: &SessionUser) -> mpsc::UnboundedReceiver<GatewayEvent> {
        let (_membership, rx) = self.hub.connect(user.id, user.family_id.clone());
        rx
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
