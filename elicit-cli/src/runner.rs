use anyhow::{Context, Result};
use elicit_core::{
    Action, AnswerMapping, AssembledAnswers, ConversationController, FallbackSupply, FinalizeReason, InterviewSession,
    QuestionSource, SessionMeta,
};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, info};

use crate::state;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub session_path: PathBuf,
    pub answers_path: PathBuf,
    pub answer_timeout: Option<Duration>,
    pub show_progress: bool,
    pub mapping: AnswerMapping,
}

#[derive(Debug)]
pub enum Outcome {
    Finalized {
        reason: FinalizeReason,
        answers: AssembledAnswers,
    },
    /// Input closed mid-interview; the session file holds the pending question.
    Suspended,
}

/// Drive one session until it finalizes or input closes.
///
/// The session is saved before every question is shown, so an interrupted
/// run resumes at the question that was on screen.
pub async fn drive<Q, F, R, W>(
    meta: SessionMeta,
    mut controller: ConversationController<Q, F>,
    input: R,
    out: &mut W,
    opts: &RunOptions,
) -> Result<Outcome>
where
    Q: QuestionSource,
    F: FallbackSupply,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();

    loop {
        if controller.pending().is_none() {
            if let Action::Finalize(reason) = controller.decide_next_action(None)? {
                return finish(&meta, &controller, reason, out, opts);
            }
        }

        show_pending(&controller, out)?;
        save(&meta, &controller, opts)?;

        let Some(answer) = read_answer(&mut lines, opts.answer_timeout).await? else {
            info!(session = %meta.id, "input closed; session suspended");
            writeln!(out, "\nSaved. Resume with: elicit resume --session {}", opts.session_path.display())?;
            return Ok(Outcome::Suspended);
        };

        let action = controller.submit(&answer)?;
        if opts.show_progress {
            let p = controller.progress();
            writeln!(
                out,
                "  ({}/{} topics covered, {:.0}%)",
                p.completed_goals,
                p.total_goals,
                p.overall_completion * 100.0
            )?;
        }
        if let Action::Finalize(reason) = action {
            return finish(&meta, &controller, reason, out, opts);
        }
    }
}

fn show_pending<Q: QuestionSource, F: FallbackSupply, W: Write>(
    controller: &ConversationController<Q, F>,
    out: &mut W,
) -> Result<()> {
    let Some(pending) = controller.pending() else {
        return Ok(());
    };
    let topic = controller
        .registry()
        .get(&pending.goal_id)
        .map(|g| g.name.as_str())
        .unwrap_or("Additional context");

    writeln!(out)?;
    let msg = pending.transition.message();
    if !msg.is_empty() {
        writeln!(out, "{msg}")?;
    }
    writeln!(
        out,
        "[{}] {}: {}",
        controller.context().questions_asked,
        topic,
        pending.question
    )?;
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}

/// `Ok(None)` on end of input. A timeout yields an empty answer.
async fn read_answer<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    timeout: Option<Duration>,
) -> Result<Option<String>> {
    let next = match timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next_line()).await {
            Ok(line) => line,
            Err(_) => {
                debug!(secs = limit.as_secs(), "answer timed out");
                return Ok(Some(String::new()));
            }
        },
        None => lines.next_line().await,
    };
    next.context("read answer")
}

fn save<Q: QuestionSource, F: FallbackSupply>(
    meta: &SessionMeta,
    controller: &ConversationController<Q, F>,
    opts: &RunOptions,
) -> Result<()> {
    let session = InterviewSession::snapshot(meta, controller);
    state::save_session(&opts.session_path, &session)
}

fn finish<Q: QuestionSource, F: FallbackSupply, W: Write>(
    meta: &SessionMeta,
    controller: &ConversationController<Q, F>,
    reason: FinalizeReason,
    out: &mut W,
    opts: &RunOptions,
) -> Result<Outcome> {
    save(meta, controller, opts)?;

    let answers = AssembledAnswers::assemble(controller.registry(), &opts.mapping)
        .with_supplementary(controller.context());
    state::write_answers(&opts.answers_path, &answers)?;

    let headline = match reason {
        FinalizeReason::Satisfied => "Thanks, that covers everything we need.",
        FinalizeReason::TurnCap => "We've reached the question limit for this interview.",
        FinalizeReason::Exhausted => "That's all the questions we have.",
    };
    writeln!(out, "\n{headline}")?;
    writeln!(
        out,
        "Collected {} answers ({:.0}% of topics). Written to {}",
        answers.fields.len(),
        answers.progress.overall_completion * 100.0,
        opts.answers_path.display()
    )?;
    if !answers.missing_priority_goals.is_empty() {
        writeln!(out, "Still missing: {}", answers.missing_priority_goals.join(", "))?;
    }

    Ok(Outcome::Finalized { reason, answers })
}
