// Deterministic persona generation
//
// Personas are derived from a seeded PRNG so that the same models + seed
// always yield the same cast. The first model becomes the facilitator; the
// rest draw distinct character archetypes from a fixed library.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::types::{AgentSpec, ConversationMode, RoleType};

struct Archetype {
    name: &'static str,
    focus: &'static str,
    style: &'static str,
}

const CHARACTER_LIBRARY: &[Archetype] = &[
    Archetype {
        name: "Pragmatist",
        focus: "feasibility, cost, and operational load",
        style: "spells out steps, conditions, and trade-offs",
    },
    Archetype {
        name: "Skeptic",
        focus: "blind spots and falsifiability of the claims on the table",
        style: "avoids assertions and asks for supporting evidence",
    },
    Archetype {
        name: "Inventor",
        focus: "novel proposals that raise the value of the experience",
        style: "widens the frame with concrete examples and analogies",
    },
    Archetype {
        name: "User advocate",
        focus: "user feelings, ease of use, and reasons to come back",
        style: "puts clarity of the experience above everything else",
    },
    Archetype {
        name: "Verifier",
        focus: "turning claims into testable checkpoints",
        style: "states hypothesis, checks, and decision criteria together",
    },
];

const FACILITATOR_FOCUS: &str =
    "keeping the discussion on the subject and pulling stray threads back to it";
const FACILITATOR_STYLE: &str = "summarizes briefly and proposes the next point to discuss";

const TURN_RULES: &[&str] = &[
    "Keep each turn to two to four sentences.",
    "React to one other participant before making your own point.",
    "End your turn by naming one point worth examining next.",
    "Never repeat an argument you have already made.",
];

/// Build the ordered cast for a room. Deterministic for a fixed seed;
/// exactly one facilitator (the first model by convention).
pub fn generate_personas(
    models: &[String],
    subject: &str,
    mode: ConversationMode,
    global_instruction: &str,
    seed: u64,
) -> Vec<AgentSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..CHARACTER_LIBRARY.len()).collect();
    order.shuffle(&mut rng);

    let mut agents = Vec::with_capacity(models.len());
    let mut used_names: Vec<String> = Vec::new();
    for (index, model) in models.iter().enumerate() {
        let agent_id = format!("agent-{}", index + 1);
        let display_name = unique_display_name(model, &mut used_names);
        let (role_type, character_profile) = if index == 0 {
            (RoleType::Facilitator, String::new())
        } else {
            let archetype = &CHARACTER_LIBRARY[order[(index - 1) % order.len()]];
            (
                RoleType::Character,
                character_profile(archetype, subject, mode),
            )
        };
        let persona_prompt = build_persona_prompt(
            &display_name,
            role_type,
            &character_profile,
            subject,
            mode,
            global_instruction,
            &mut rng,
        );
        agents.push(AgentSpec {
            agent_id,
            model: model.clone(),
            display_name,
            role_type,
            character_profile,
            persona_prompt,
        });
    }
    agents
}

/// Re-derive persona prompts after setup edits, keeping the (possibly edited)
/// role assignments and profiles. Seeded from the room's original persona
/// seed so the result is repeatable.
pub fn rebuild_persona_prompts(
    agents: &mut [AgentSpec],
    subject: &str,
    mode: ConversationMode,
    global_instruction: &str,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    for agent in agents.iter_mut() {
        agent.persona_prompt = build_persona_prompt(
            &agent.display_name,
            agent.role_type,
            &agent.character_profile,
            subject,
            mode,
            global_instruction,
            &mut rng,
        );
    }
}

fn character_profile(archetype: &Archetype, subject: &str, mode: ConversationMode) -> String {
    format!(
        "{} focused on {}; {}. In this {} on \"{}\" they {}.",
        archetype.name,
        archetype.focus,
        archetype.style,
        mode.label(),
        subject,
        mode.stance(),
    )
}

fn build_persona_prompt(
    display_name: &str,
    role_type: RoleType,
    character_profile: &str,
    subject: &str,
    mode: ConversationMode,
    global_instruction: &str,
    rng: &mut StdRng,
) -> String {
    let turn_rule = TURN_RULES
        .choose(rng)
        .copied()
        .unwrap_or(TURN_RULES[0]);
    let role_block = match role_type {
        RoleType::Facilitator => format!(
            "Role: facilitator\nFocus: {}\nStyle: {}",
            FACILITATOR_FOCUS, FACILITATOR_STYLE
        ),
        RoleType::Character => format!("Role: character\nCharacter: {}", character_profile),
    };
    let mut prompt = format!(
        "You are {display_name}, a participant in a {} about \"{subject}\".\n{role_block}\nTurn rule: {turn_rule}",
        mode.label(),
    );
    let instruction = global_instruction.trim();
    if !instruction.is_empty() {
        prompt.push_str("\nRoom instruction: ");
        prompt.push_str(instruction);
    }
    prompt
}

fn unique_display_name(model: &str, used: &mut Vec<String>) -> String {
    let base = model.rsplit('/').next().unwrap_or(model).to_string();
    let mut candidate = base.clone();
    let mut suffix = 2;
    while used.contains(&candidate) {
        candidate = format!("{base} #{suffix}");
        suffix += 1;
    }
    used.push(candidate.clone());
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn generation_is_deterministic_for_a_fixed_seed() {
        let models = models(&["openai/gpt-4o", "anthropic/claude", "meta/llama"]);
        let first = generate_personas(
            &models,
            "weekend hack ideas",
            ConversationMode::PhilosophyDebate,
            "",
            42,
        );
        let second = generate_personas(
            &models,
            "weekend hack ideas",
            ConversationMode::PhilosophyDebate,
            "",
            42,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn exactly_one_facilitator_and_distinct_profiles() {
        let agents = generate_personas(
            &models(&["m1", "m2", "m3", "m4"]),
            "pizza toppings",
            ConversationMode::ConsensusLab,
            "",
            7,
        );
        let facilitators = agents
            .iter()
            .filter(|agent| agent.role_type == RoleType::Facilitator)
            .count();
        assert_eq!(facilitators, 1);
        assert_eq!(agents[0].role_type, RoleType::Facilitator);
        let profiles: Vec<&String> = agents[1..]
            .iter()
            .map(|agent| &agent.character_profile)
            .collect();
        for (i, profile) in profiles.iter().enumerate() {
            assert!(!profile.is_empty());
            for other in &profiles[i + 1..] {
                assert_ne!(profile, other);
            }
        }
    }

    #[test]
    fn mode_changes_the_character_profiles() {
        let models = models(&["m1", "m2"]);
        let debate = generate_personas(
            &models,
            "city gardens",
            ConversationMode::PhilosophyDebate,
            "",
            3,
        );
        let consensus = generate_personas(
            &models,
            "city gardens",
            ConversationMode::ConsensusLab,
            "",
            3,
        );
        assert_ne!(debate[1].character_profile, consensus[1].character_profile);
    }

    #[test]
    fn duplicate_models_get_unique_display_names() {
        let agents = generate_personas(
            &models(&["x/model", "y/model"]),
            "subject",
            ConversationMode::DevilsAdvocate,
            "",
            1,
        );
        assert_ne!(agents[0].display_name, agents[1].display_name);
    }
}
