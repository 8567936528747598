//! Prompt construction. Pure string formatting: no networking, no state.

use crate::constants::{DEFENDER_MARKER, SIMULATION_MARKER};
use crate::conversation::{ConversationTurn, RedFlag, Role, StyleSample};
use crate::error::{Result, SimulationError};

/// Standing rules sent as prior context with every generation request.
pub fn safety_rules() -> Vec<String> {
    vec![
        "This is an educational catphishing-awareness SIMULATION used for training.".to_string(),
        format!("ALWAYS prefix responses with {}.", SIMULATION_MARKER),
        "NEVER request or accept real passwords, OTPs, bank details, or any personal data.".to_string(),
        "If a request for money or sensitive data would be realistic, append \
         '(SIMULATION - do NOT send money or passwords)' instead of making it real."
            .to_string(),
        "Keep replies short (1-3 sentences) and natural.".to_string(),
    ]
}

/// Builds the instruction for the next turn spoken by `role`.
///
/// `trailing` is the already-windowed tail of the transcript. An empty tail is
/// fine on the first turn as long as the style sample carries some text.
pub fn compose_turn_prompt(
    role: Role,
    trailing: &[ConversationTurn],
    style: &StyleSample,
) -> Result<String> {
    if trailing.is_empty() && style.is_blank() {
        return Err(SimulationError::InvalidConfiguration(
            "cannot compose a prompt without prior turns or a style sample".to_string(),
        ));
    }

    let mut prompt = String::new();
    push_persona(&mut prompt, role);
    push_style_sample(&mut prompt, style);
    push_conversation(&mut prompt, trailing);
    push_reply_cue(&mut prompt, role, trailing.is_empty());
    Ok(prompt)
}

fn push_persona(prompt: &mut String, role: Role) {
    match role {
        Role::Attacker => prompt.push_str(
            "Role: You are roleplaying a fake persona (catphisher) named 'Lizzy' for awareness training only.\n\
             Simulate typical catphishing behaviour: fast affection, flattery, requests to move the chat \
             somewhere private, avoidance of video calls, manufactured urgency.\n\
             Do NOT actually solicit real money, OTPs or passwords.\n\n",
        ),
        Role::Victim => prompt.push_str(
            "Role: You are roleplaying the target of an online conversation with a stranger.\n\
             Respond like an ordinary, friendly person who is sometimes flattered and sometimes cautious.\n\
             Never share real personal data; if asked for money or codes, hesitate or refuse.\n\n",
        ),
    }
}

fn push_style_sample(prompt: &mut String, style: &StyleSample) {
    if style.is_blank() {
        return;
    }
    prompt.push_str("STYLE REFERENCE (emulate the tone, do not copy it):\n");
    prompt.push_str(style.as_str().trim());
    prompt.push_str("\n\n");
}

fn push_conversation(prompt: &mut String, trailing: &[ConversationTurn]) {
    if trailing.is_empty() {
        return;
    }
    prompt.push_str("CONVERSATION SO FAR (keep continuity):\n");
    for turn in trailing {
        prompt.push_str(&turn.transcript_line());
        prompt.push('\n');
    }
    prompt.push('\n');
}

fn push_reply_cue(prompt: &mut String, role: Role, opening: bool) {
    if opening {
        prompt.push_str(&format!(
            "Open the conversation as the {}. Reply with the message text only.\n\n",
            role.label().to_lowercase()
        ));
    } else {
        prompt.push_str(&format!(
            "Respond as the {} to the last message. Reply with the message text only.\n\n",
            role.label().to_lowercase()
        ));
    }
    prompt.push_str(&format!("{}:", role.label()));
}

/// Defender-mode analysis of a message the user received.
pub fn defender_prompt(message: &str, flags: &[RedFlag], few_shots: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Role: You are a Defender Assistant. Analyze the user's incoming message or short chat snippet, \
         list up to 3 red flags with short reasons, propose 2 safe replies the user can send, and give \
         reporting steps (block, report, inform IT/parent). Begin with {}.\n\n",
        DEFENDER_MARKER
    ));

    if !few_shots.trim().is_empty() {
        prompt.push_str("KNOWN CATPHISHING EXAMPLES:\n");
        prompt.push_str(few_shots.trim());
        prompt.push_str("\n\n");
    }

    if !flags.is_empty() {
        prompt.push_str("HEURISTIC RED FLAGS ALREADY DETECTED:\n");
        for flag in flags {
            prompt.push_str(&format!("- {}\n", flag.description));
        }
        prompt.push('\n');
    }

    prompt.push_str("User message:\n");
    prompt.push_str(message.trim());
    prompt.push_str("\n\nResponse:");
    prompt
}

/// Asks the model for synthetic, labelled dialogues in the corpus JSONL shape.
pub fn augmentation_prompt(count: usize) -> String {
    format!(
        "You are a safe generator. Produce {} short synthetic SIMULATION dialogues (3-6 turns each) \
         between 'scammer' and 'target'. Label each with intents like FAST_AFFECTION, ASK_PHOTO, \
         MOVE_PRIVATE, AVOID_VIDEO. Output JSONL lines with fields: dialogue (list of {{speaker,text}}), \
         labels. Do NOT include real names, PII or instructions how to scam. Prefix each message with {}.",
        count, SIMULATION_MARKER
    )
}
