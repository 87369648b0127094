use treasury_db::{
    models::{AuditEntry, AuditEntryCreate, User},
    Store, UserWhereUnique,
};

const IP_ADDRESS: &str = "local";
const USER_AGENT: &str = concat!("treasury-admin/", env!("CARGO_PKG_VERSION"));

/// The user on whose behalf the console acts.
#[derive(Clone, Debug)]
pub struct Actor(User);

impl Actor {
    pub async fn load(store: &Store, user_id: i32) -> Result<Self, treasury_db::Error> {
        store
            .user()
            .find_unique_or_throw(UserWhereUnique::Id(user_id))
            .await
            .map(Self)
    }

    pub fn name(&self) -> &str {
        self.0.name.as_deref().unwrap_or(&self.0.email)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Event {
    action: &'static str,
    resource: &'static str,
    resource_id: Option<String>,
    details: String,
    severity: Severity,
}

impl Event {
    pub fn new(action: &'static str, resource: &'static str, details: impl Into<String>) -> Self {
        Self {
            action,
            resource,
            resource_id: None,
            details: details.into(),
            severity: Severity::Info,
        }
    }

    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

pub fn entry(actor: &Actor, event: Event) -> AuditEntryCreate {
    AuditEntryCreate {
        id: None,
        user_id: actor.0.id,
        user_name: actor.name().to_owned(),
        user_email: actor.0.email.clone(),
        action: event.action.to_owned(),
        resource: event.resource.to_owned(),
        resource_id: event.resource_id,
        details: event.details,
        severity: event.severity.as_str().to_owned(),
        ip_address: IP_ADDRESS.to_owned(),
        user_agent: Some(USER_AGENT.to_owned()),
        timestamp: None,
    }
}

/// Appends `event` to the audit trail. Entries need a user, so without an
/// actor the event is only logged.
pub async fn record(
    store: &Store,
    actor: Option<&Actor>,
    event: Event,
) -> Result<Option<AuditEntry>, treasury_db::Error> {
    let Some(actor) = actor else {
        tracing::warn!(
            action = event.action,
            resource = event.resource,
            "no --actor given, audit entry not recorded"
        );
        return Ok(None);
    };
    store.audit_entry().create(entry(actor, event)).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use treasury_db::models::Role;

    fn actor(name: Option<&str>) -> Actor {
        let now = jiff::Timestamp::UNIX_EPOCH;
        Actor(User {
            id: 7,
            email: "ops@bank.test".to_owned(),
            name: name.map(str::to_owned),
            password: String::new(),
            role: Role::Admin,
            is_email_verified: true,
            created_at: now,
            updated_at: now,
        })
    }

    #[test]
    fn entries_carry_the_actor_and_event() {
        let entry = entry(
            &actor(Some("Ops Desk")),
            Event::new("DELETE", "Client", "removed dormant client")
                .resource_id("c-1")
                .severity(Severity::Critical),
        );
        assert_eq!(entry.user_id, 7);
        assert_eq!(entry.user_name, "Ops Desk");
        assert_eq!(entry.user_email, "ops@bank.test");
        assert_eq!(entry.action, "DELETE");
        assert_eq!(entry.resource, "Client");
        assert_eq!(entry.resource_id.as_deref(), Some("c-1"));
        assert_eq!(entry.severity, "CRITICAL");
        assert_eq!(entry.ip_address, "local");
        assert!(entry
            .user_agent
            .as_deref()
            .is_some_and(|agent| agent.starts_with("treasury-admin/")));
        assert!(entry.timestamp.is_none());
    }

    #[test]
    fn unnamed_actors_are_known_by_email() {
        let actor = actor(None);
        assert_eq!(actor.name(), "ops@bank.test");
        let entry = entry(&actor, Event::new("CREATE", "User", "registered"));
        assert_eq!(entry.user_name, "ops@bank.test");
        assert_eq!(entry.severity, "INFO");
        assert_eq!(entry.resource_id, None);
    }
}
