// Turn scheduling: pure functions driven by the room's private PRNG

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::types::{AgentSpec, ChatMessage};

/// The fixed sequence of conversation phases: (name, goal).
pub const ACTS: [(&str, &str); 4] = [
    (
        "opening",
        "Align on the premises of the subject and state positions briefly.",
    ),
    (
        "confrontation",
        "Put the differing viewpoints against each other and sharpen the disagreements.",
    ),
    (
        "concretization",
        "Turn the discussion into actionable proposals, steps, and conditions.",
    ),
    (
        "closing",
        "Sort agreed points from open ones and land the discussion.",
    ),
];

/// Act label used once a room's loop has finished.
pub const FINISHED_ACT: &str = "finished";

/// Pick the next speaker, excluding the previous one when possible.
pub fn choose_next_speaker<'a>(
    agents: &'a [AgentSpec],
    last_speaker_id: Option<&str>,
    rng: &mut StdRng,
) -> &'a AgentSpec {
    if agents.len() == 1 {
        return &agents[0];
    }
    let candidates: Vec<&AgentSpec> = agents
        .iter()
        .filter(|agent| Some(agent.agent_id.as_str()) != last_speaker_id)
        .collect();
    let pool = if candidates.is_empty() {
        agents.iter().collect()
    } else {
        candidates
    };
    pool.choose(rng).expect("room always has at least one agent")
}

/// Map progress onto the fixed act sequence. Monotonic non-decreasing in
/// `rounds_completed`; clamped to the last act; first act when max_rounds is 0.
pub fn resolve_act(rounds_completed: u32, max_rounds: u32) -> (&'static str, &'static str) {
    if max_rounds == 0 {
        return ACTS[0];
    }
    let index = ((rounds_completed as usize * ACTS.len()) / max_rounds as usize)
        .min(ACTS.len() - 1);
    ACTS[index]
}

/// The last `limit` messages in original order.
pub fn trim_history(messages: &[ChatMessage], limit: i64) -> &[ChatMessage] {
    let limit = limit.max(0) as usize;
    let start = messages.len().saturating_sub(limit);
    &messages[start..]
}

/// One-shot prompt injected near the midpoint to refresh the discussion.
pub fn build_topic_card(subject: &str, rng: &mut StdRng) -> String {
    let cards = [
        format!("Topic card: if \"{subject}\" had to become a 30-second demo, what would you show first?"),
        format!("Topic card: which part of \"{subject}\" is most likely to backfire, and how do you defuse it now?"),
        format!("Topic card: how would you let people try \"{subject}\" for free?"),
        format!("Topic card: recommend \"{subject}\" to a friend in a single sentence."),
    ];
    cards
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| cards[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageRole, RoleType};
    use rand::SeedableRng;

    fn agent(id: &str) -> AgentSpec {
        AgentSpec {
            agent_id: id.to_string(),
            model: id.to_string(),
            display_name: id.to_string(),
            role_type: RoleType::Character,
            character_profile: String::new(),
            persona_prompt: String::new(),
        }
    }

    fn message(content: &str) -> ChatMessage {
        ChatMessage::new(MessageRole::User, "user", content)
    }

    #[test]
    fn next_speaker_never_repeats_the_last_one() {
        let agents = vec![agent("a1"), agent("a2"), agent("a3")];
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let speaker = choose_next_speaker(&agents, Some("a2"), &mut rng);
            assert_ne!(speaker.agent_id, "a2");
        }
    }

    #[test]
    fn single_agent_always_speaks() {
        let agents = vec![agent("solo")];
        let mut rng = StdRng::seed_from_u64(9);
        let speaker = choose_next_speaker(&agents, Some("solo"), &mut rng);
        assert_eq!(speaker.agent_id, "solo");
    }

    #[test]
    fn speaker_choice_is_reproducible_per_seed() {
        let agents = vec![agent("a1"), agent("a2"), agent("a3"), agent("a4")];
        let pick = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..10)
                .map(|_| choose_next_speaker(&agents, Some("a1"), &mut rng).agent_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(pick(42), pick(42));
    }

    #[test]
    fn resolve_act_walks_the_phases() {
        assert_eq!(resolve_act(0, 8).0, "opening");
        assert_eq!(resolve_act(3, 8).0, "confrontation");
        assert_eq!(resolve_act(5, 8).0, "concretization");
        assert_eq!(resolve_act(7, 8).0, "closing");
    }

    #[test]
    fn resolve_act_is_monotonic_and_clamped() {
        let names: Vec<&str> = ACTS.iter().map(|(name, _)| *name).collect();
        let mut previous_index = 0;
        for rounds in 0..30 {
            let (name, _) = resolve_act(rounds, 10);
            let index = names.iter().position(|n| *n == name).unwrap();
            assert!(index >= previous_index);
            previous_index = index;
        }
        assert_eq!(resolve_act(99, 10).0, "closing");
        assert_eq!(resolve_act(5, 0).0, "opening");
    }

    #[test]
    fn trim_history_keeps_the_most_recent_messages() {
        let messages: Vec<ChatMessage> = (0..6).map(|i| message(&i.to_string())).collect();
        let trimmed = trim_history(&messages, 3);
        let contents: Vec<&str> = trimmed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["3", "4", "5"]);
        assert!(trim_history(&messages, 0).is_empty());
        assert!(trim_history(&messages, -4).is_empty());
        assert_eq!(trim_history(&messages, 100).len(), 6);
    }

    #[test]
    fn topic_card_mentions_the_subject() {
        let mut rng = StdRng::seed_from_u64(5);
        let card = build_topic_card("shared bikes", &mut rng);
        assert!(card.contains("shared bikes"));
        assert!(card.starts_with("Topic card:"));
    }
}
