// Terminal front end for a simulation session. Mirrors what the web UI does:
// one turn per Enter press or typed reply, red flags printed under the turn
// that raised them.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::conversation::{AnnotationNote, ConversationTurn, Role};
use crate::error::SimulationError;
use crate::orchestrator::{Orchestrator, Session};

/// Transcript line plus any red-flag block for display.
pub fn render_turn(turn: &ConversationTurn, note: Option<&AnnotationNote>) -> String {
    let icon = match turn.role {
        Role::Attacker => "🎣",
        Role::Victim => "🙂",
    };
    let mut out = format!("#{} {} {}", turn.turn_index, icon, turn.transcript_line());
    if let Some(note) = note {
        out.push_str("\n   🚩 Red flags detected:");
        for cue in &note.cues {
            out.push_str(&format!("\n   - {}", cue.description));
        }
    }
    out
}

/// Runs `turns` turns back to back, stopping at the first failure.
pub async fn run_batch(orchestrator: &Orchestrator, session: &mut Session, turns: usize) -> Result<()> {
    for _ in 0..turns {
        let (turn, note) = orchestrator.step(session).await?;
        println!("{}", render_turn(&turn, note.as_ref()));
    }
    Ok(())
}

/// Interactive loop: Enter advances, typed text is sent as the victim's
/// message and answered by the attacker, `q` ends the session. A failed turn
/// can be retried by pressing Enter again.
pub async fn run_interactive(orchestrator: &Orchestrator, session: &mut Session) -> Result<()> {
    info!("Starting interactive simulation...");
    println!("Educational simulation only. Do NOT share real personal data.");
    println!("Style sample:\n{}\n", session.style_sample().as_str());
    println!("Press Enter for the next turn, type a message to reply as the victim, 'q' then Enter to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.eq_ignore_ascii_case("q") {
            break;
        }
        if !input.is_empty() {
            match orchestrator.submit_turn(session, input) {
                Ok((turn, had_sensitive)) => {
                    if had_sensitive {
                        println!("⚠️  Sensitive words were removed. Never share passwords or codes.");
                    }
                    println!("{}", render_turn(&turn, None));
                }
                Err(e @ SimulationError::InvalidConfiguration(_)) => {
                    println!("⚠️  {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        match orchestrator.step(session).await {
            Ok((turn, note)) => println!("{}", render_turn(&turn, note.as_ref())),
            Err(e) if e.is_retryable() => println!("⚠️  {} (press Enter to retry)", e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::annotate_turn;

    #[test]
    fn test_render_plain_turn() {
        let turn = ConversationTurn {
            role: Role::Victim,
            text: "[SIMULATION] Hi".into(),
            turn_index: 1,
        };
        assert_eq!(render_turn(&turn, None), "#1 🙂 Victim: [SIMULATION] Hi");
    }

    #[test]
    fn test_render_turn_with_flags() {
        let turn = ConversationTurn {
            role: Role::Attacker,
            text: "[SIMULATION] Send me money on WhatsApp".into(),
            turn_index: 0,
        };
        let note = annotate_turn(&turn);
        let rendered = render_turn(&turn, note.as_ref());
        assert!(rendered.starts_with("#0 🎣 Attacker:"));
        assert!(rendered.contains("🚩 Red flags detected:"));
        assert!(rendered.contains("- Asks for money or a transfer"));
        assert!(rendered.contains("- Wants to move the chat somewhere private"));
    }
}
