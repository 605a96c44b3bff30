//! Grouping of non-customer messages into participants and resolution of
//! each participant to a remote employee id.

use {
    async_trait::async_trait,
    std::collections::BTreeMap,
    tracing::{error, warn},
};

use envio_normalizer::{ActorType, NormalizedMessage};

/// Lookup of human agents by normalized email.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    /// Remote employee id for a trimmed, lowercased agent email, if known.
    async fn agent_by_email(&self, email: &str) -> envio_common::Result<Option<String>>;
}

/// One distinct non-customer sending identity within a session.
///
/// `BOT` messages collapse to a single participant; `AGENT` messages group
/// by normalized email, with the empty email forming its own key.
#[derive(Debug, Clone)]
pub struct Participant {
    pub key: String,
    pub actor_type: ActorType,
    pub email: Option<String>,
    pub message_count: usize,
    /// Timestamp of the group's earliest message, used as a tie-break.
    pub first_ts_ms: i64,
    pub employee_id: Option<String>,
}

fn normalized_email(email: Option<&str>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

/// Grouping key for a non-customer message; `None` for customer messages.
#[must_use]
pub fn participant_key(actor_type: ActorType, email: Option<&str>) -> Option<String> {
    match actor_type {
        ActorType::Customer => None,
        ActorType::Bot => Some("BOT".to_string()),
        ActorType::Agent => {
            let email = normalized_email(email).unwrap_or_default();
            Some(format!("AGENT|{email}"))
        },
    }
}

async fn resolve_employee_id(
    actor_type: ActorType,
    email: Option<&str>,
    directory: &dyn EmployeeDirectory,
    bot_employee_id: Option<&str>,
    fallback_agent_id: Option<&str>,
    session_id: &str,
) -> envio_common::Result<Option<String>> {
    match actor_type {
        ActorType::Bot => {
            if let Some(id) = bot_employee_id {
                return Ok(Some(id.to_string()));
            }
            if let Some(fallback) = fallback_agent_id {
                warn!(
                    session_id = %session_id,
                    fallback,
                    "no bot employee id configured, using job fallback"
                );
                return Ok(Some(fallback.to_string()));
            }
            error!(session_id = %session_id, "cannot resolve employee id for BOT");
            Ok(None)
        },
        ActorType::Agent => {
            if let Some(email) = normalized_email(email) {
                if let Some(id) = directory.agent_by_email(&email).await? {
                    return Ok(Some(id));
                }
                warn!(session_id = %session_id, email = %email, "agent email not in directory");
            }
            if let Some(fallback) = fallback_agent_id {
                warn!(
                    session_id = %session_id,
                    fallback,
                    "using job fallback for unmapped agent"
                );
                return Ok(Some(fallback.to_string()));
            }
            error!(
                session_id = %session_id,
                email = email.unwrap_or(""),
                "cannot resolve employee id for AGENT"
            );
            Ok(None)
        },
        ActorType::Customer => Ok(None),
    }
}

/// Group a session's messages into participants and resolve each group.
///
/// Unresolved groups stay in the map with `employee_id: None`; their
/// messages are dropped later at batch build, not here.
pub async fn build_participants(
    messages: &[NormalizedMessage],
    directory: &dyn EmployeeDirectory,
    bot_employee_id: Option<&str>,
    fallback_agent_id: Option<&str>,
    session_id: &str,
) -> envio_common::Result<BTreeMap<String, Participant>> {
    let mut participants: BTreeMap<String, Participant> = BTreeMap::new();

    for message in messages {
        let Some(key) = participant_key(message.actor_type, message.actor_email.as_deref()) else {
            continue;
        };
        participants
            .entry(key.clone())
            .and_modify(|p| {
                p.message_count += 1;
                p.first_ts_ms = p.first_ts_ms.min(message.ts_ms);
            })
            .or_insert_with(|| Participant {
                key,
                actor_type: message.actor_type,
                email: normalized_email(message.actor_email.as_deref()),
                message_count: 1,
                first_ts_ms: message.ts_ms,
                employee_id: None,
            });
    }

    for participant in participants.values_mut() {
        participant.employee_id = resolve_employee_id(
            participant.actor_type,
            participant.email.as_deref(),
            directory,
            bot_employee_id,
            fallback_agent_id,
            session_id,
        )
        .await?;
        if participant.employee_id.is_none() {
            warn!(
                session_id = %session_id,
                key = %participant.key,
                "participant excluded from sends: no employee id"
            );
        }
    }

    Ok(participants)
}

/// Pick the main participant among the resolved groups: highest message
/// count, ties broken by earliest first message, then by key order.
#[must_use]
pub fn main_participant(participants: &BTreeMap<String, Participant>) -> Option<&Participant> {
    participants
        .values()
        .filter(|p| p.employee_id.is_some())
        .max_by(|a, b| {
            a.message_count
                .cmp(&b.message_count)
                .then_with(|| b.first_ts_ms.cmp(&a.first_ts_ms))
                .then_with(|| b.key.cmp(&a.key))
        })
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json, std::collections::HashMap};

    struct MapDirectory(HashMap<String, String>);

    impl MapDirectory {
        fn of(entries: &[(&str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl EmployeeDirectory for MapDirectory {
        async fn agent_by_email(&self, email: &str) -> envio_common::Result<Option<String>> {
            Ok(self.0.get(email).cloned())
        }
    }

    fn msg(actor_type: ActorType, email: Option<&str>, ts_ms: i64) -> NormalizedMessage {
        NormalizedMessage {
            ts_ms,
            actor_type,
            actor_email: email.map(str::to_string),
            content: "hola".into(),
            raw: json!({}),
        }
    }

    #[tokio::test]
    async fn bot_messages_collapse_and_agents_group_by_normalized_email() {
        let directory = MapDirectory::of(&[("ana@x.com", "emp-ana")]);
        let messages = vec![
            msg(ActorType::Bot, None, 1),
            msg(ActorType::Bot, None, 2),
            msg(ActorType::Agent, Some(" Ana@X.com "), 3),
            msg(ActorType::Agent, Some("ana@x.com"), 4),
            msg(ActorType::Agent, Some(""), 5),
            msg(ActorType::Customer, None, 6),
        ];

        let participants =
            build_participants(&messages, &directory, Some("emp-bot"), None, "s1")
                .await
                .unwrap();

        let keys: Vec<_> = participants.keys().cloned().collect();
        assert_eq!(keys, ["AGENT|", "AGENT|ana@x.com", "BOT"]);
        assert_eq!(participants["BOT"].message_count, 2);
        assert_eq!(participants["AGENT|ana@x.com"].message_count, 2);
        assert_eq!(
            participants["AGENT|ana@x.com"].employee_id.as_deref(),
            Some("emp-ana")
        );
        // Empty-email agent with no fallback stays unresolved.
        assert!(participants["AGENT|"].employee_id.is_none());
    }

    #[tokio::test]
    async fn bot_resolution_prefers_config_then_fallback() {
        let directory = MapDirectory::of(&[]);
        let messages = vec![msg(ActorType::Bot, None, 1)];

        let with_config =
            build_participants(&messages, &directory, Some("emp-bot"), Some("emp-fb"), "s1")
                .await
                .unwrap();
        assert_eq!(with_config["BOT"].employee_id.as_deref(), Some("emp-bot"));

        let with_fallback = build_participants(&messages, &directory, None, Some("emp-fb"), "s1")
            .await
            .unwrap();
        assert_eq!(with_fallback["BOT"].employee_id.as_deref(), Some("emp-fb"));

        let unresolved = build_participants(&messages, &directory, None, None, "s1")
            .await
            .unwrap();
        assert!(unresolved["BOT"].employee_id.is_none());
    }

    #[tokio::test]
    async fn unknown_agent_email_falls_back_to_job_reference() {
        let directory = MapDirectory::of(&[]);
        let messages = vec![msg(ActorType::Agent, Some("ghost@x.com"), 1)];
        let participants = build_participants(&messages, &directory, None, Some("emp-fb"), "s1")
            .await
            .unwrap();
        assert_eq!(
            participants["AGENT|ghost@x.com"].employee_id.as_deref(),
            Some("emp-fb")
        );
    }

    #[tokio::test]
    async fn main_participant_picks_highest_count_among_resolved() {
        let directory = MapDirectory::of(&[("ana@x.com", "emp-ana")]);
        let messages = vec![
            msg(ActorType::Bot, None, 1),
            msg(ActorType::Agent, Some("ana@x.com"), 2),
            msg(ActorType::Agent, Some("ana@x.com"), 3),
        ];
        let participants = build_participants(&messages, &directory, Some("emp-bot"), None, "s1")
            .await
            .unwrap();
        let main = main_participant(&participants).unwrap();
        assert_eq!(main.key, "AGENT|ana@x.com");
        assert_eq!(main.employee_id.as_deref(), Some("emp-ana"));
    }

    #[tokio::test]
    async fn count_ties_break_on_earliest_first_message_then_key() {
        let directory = MapDirectory::of(&[("ana@x.com", "emp-ana")]);
        let messages = vec![
            msg(ActorType::Agent, Some("ana@x.com"), 5),
            msg(ActorType::Bot, None, 10),
        ];
        let participants = build_participants(&messages, &directory, Some("emp-bot"), None, "s1")
            .await
            .unwrap();
        let main = main_participant(&participants).unwrap();
        assert_eq!(main.key, "AGENT|ana@x.com");

        // Same count and timestamp: key order decides.
        let messages = vec![
            msg(ActorType::Agent, Some("ana@x.com"), 5),
            msg(ActorType::Bot, None, 5),
        ];
        let participants = build_participants(&messages, &directory, Some("emp-bot"), None, "s1")
            .await
            .unwrap();
        assert_eq!(main_participant(&participants).unwrap().key, "AGENT|ana@x.com");
    }

    #[tokio::test]
    async fn unresolved_groups_never_become_main() {
        let directory = MapDirectory::of(&[("ana@x.com", "emp-ana")]);
        let messages = vec![
            msg(ActorType::Bot, None, 1),
            msg(ActorType::Bot, None, 2),
            msg(ActorType::Agent, Some("ana@x.com"), 3),
        ];
        // Bot has more messages but no id anywhere.
        let participants = build_participants(&messages, &directory, None, None, "s1")
            .await
            .unwrap();
        assert_eq!(main_participant(&participants).unwrap().key, "AGENT|ana@x.com");
    }

    #[tokio::test]
    async fn customer_only_sessions_produce_no_participants() {
        let directory = MapDirectory::of(&[]);
        let messages = vec![msg(ActorType::Customer, None, 1)];
        let participants = build_participants(&messages, &directory, None, None, "s1")
            .await
            .unwrap();
        assert!(participants.is_empty());
        assert!(main_participant(&participants).is_none());
    }
}
