//! Escalation and survey state machine.
//!
//! Every inbound message runs through [`handle_inbound`] once, in arrival
//! order per chat. Each step either short-circuits with an [`Outcome`] or
//! falls through to the next:
//!
//! 1. group/broadcast chats and stopped bot: ignored
//! 2. no text: ignored
//! 3. session touch, welcome after expiry
//! 4. buffer append
//! 5. handed off: silent
//! 6. handoff request: holding message, `HandedOff`
//! 7. awaiting survey + rating: record, thank or ask for feedback
//! 8. awaiting feedback: record evaluation, acknowledge
//! 9. gratitude, or closing after a follow-up: survey prompt, unless one
//!    is already open
//! 10. cooldown, measured between arrivals: drop
//! 11. retrieval + generation, with gap logging and follow-up latch
//!
//! Session state is always mutated before the corresponding send.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use ppid_core::ipc::{MediaPayload, OperatorEvent};
use ppid_core::models::{Phase, Role, SurveyResult};

use crate::app::App;
use crate::messages;
use crate::subsystems::intent::{clean_contact, extract_name, parse_rating};
use crate::subsystems::recap;
use crate::transport::{is_group_or_broadcast, mask_chat_id, InboundMessage, Presence, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Stopped,
    Ignored,
    HandedOffSilent,
    HandoffRequested,
    SurveyRecorded { rating: i32, feedback_requested: bool },
    FeedbackRecorded,
    SurveyRequested,
    RateLimited,
    Replied { needs_review: bool },
}

#[derive(Debug, Error)]
pub enum EscalationError {
    #[error("transport not connected")]
    NotConnected,

    #[error("send failed: {0}")]
    Send(#[from] TransportError),
}

/// Send and report. Failures are logged and surfaced to consoles but never
/// roll back state.
async fn send(app: &App, chat_id: &str, text: &str) -> bool {
    match app.transport.send_text(chat_id, text).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(chat = %mask_chat_id(chat_id), error = %e, "Send failed");
            app.emit(OperatorEvent::Error {
                message: format!("Gagal mengirim pesan: {}", e),
            });
            false
        }
    }
}

fn emit_inbound(app: &App, chat_id: &str, name: &str, text: &str, needs_review: bool) {
    app.emit(OperatorEvent::MessageIn {
        chat_id: chat_id.to_string(),
        name: name.to_string(),
        text: text.to_string(),
        needs_review,
    });
}

pub async fn handle_inbound(app: &App, msg: InboundMessage) -> Outcome {
    if !app.is_running() {
        return Outcome::Stopped;
    }
    let chat_id = msg.chat_id.as_str();
    if is_group_or_broadcast(chat_id) {
        return Outcome::Ignored;
    }
    let text = match msg.text_content() {
        Some(t) => t.trim().to_string(),
        None => return Outcome::Ignored,
    };

    let arrived = msg.received_at.unwrap_or_else(Instant::now);
    let now = Utc::now();
    let contact = clean_contact(msg.push_name.as_deref());
    let known = app.sessions.get(chat_id).and_then(|s| s.customer_name);
    let name = extract_name(&text).or(known).or_else(|| contact.clone());

    let expired = app.sessions.touch(chat_id, name.as_deref(), now);
    let display = name.clone().unwrap_or_else(|| messages::DEFAULT_CONTACT.to_string());
    if expired {
        send(app, chat_id, &messages::welcome(&display)).await;
    }

    app.sessions.append_to_buffer(chat_id, Role::User, &text, now);

    let Some(session) = app.sessions.get(chat_id) else {
        return Outcome::Ignored;
    };

    if session.is_handed_off() {
        app.sessions
            .update(chat_id, |s| s.last_question = Some(text.clone()));
        emit_inbound(app, chat_id, &display, &text, false);
        return Outcome::HandedOffSilent;
    }

    if app.intents.is_handoff_request(&text) {
        app.sessions.update(chat_id, |s| s.phase = Phase::HandedOff);
        tracing::info!(chat = %mask_chat_id(chat_id), "Handover requested");
        app.emit(OperatorEvent::HandoverRequest {
            chat_id: chat_id.to_string(),
            name: display.clone(),
            text,
        });
        send(app, chat_id, &messages::handover_holding(&display)).await;
        return Outcome::HandoffRequested;
    }

    if session.is_survey_pending() {
        if let Some(rating) = parse_rating(&text) {
            emit_inbound(app, chat_id, &display, &text, false);
            return record_rating(app, chat_id, session.customer_name, rating).await;
        }
    }

    if session.is_feedback_pending() {
        emit_inbound(app, chat_id, &display, &text, false);
        return record_feedback(app, chat_id, session.customer_name, session.last_rating, &text).await;
    }

    let wants_to_close = app.intents.is_gratitude(&text)
        || (session.follow_up_asked && app.intents.is_closing(&text));
    if wants_to_close && !session.survey_asked {
        app.sessions.update(chat_id, |s| {
            s.phase = Phase::AwaitingSurvey;
            s.survey_asked = true;
        });
        emit_inbound(app, chat_id, &display, &text, false);
        send(app, chat_id, &messages::survey_prompt(&display)).await;
        return Outcome::SurveyRequested;
    }

    if !app.governor.try_acquire_at(chat_id, arrived) {
        emit_inbound(app, chat_id, &display, &text, false);
        tracing::debug!(chat = %mask_chat_id(chat_id), "Cooling down, dropped");
        return Outcome::RateLimited;
    }

    answer(app, chat_id, &display, &text, session.follow_up_asked).await
}

async fn record_rating(app: &App, chat_id: &str, customer_name: Option<String>, rating: i32) -> Outcome {
    let feedback_requested = rating < 3;
    app.sessions.update(chat_id, |s| {
        s.last_rating = Some(rating);
        if feedback_requested {
            s.phase = Phase::AwaitingFeedback;
        } else {
            // Closed; a later thank-you may ask again
            s.phase = Phase::Normal;
            s.survey_asked = false;
        }
    });

    if let Err(e) = app
        .recaps
        .record_survey(SurveyResult {
            chat_id: chat_id.to_string(),
            rating,
            timestamp: Utc::now(),
            customer_name,
        })
        .await
    {
        tracing::error!(error = %e, "Failed to record survey result");
    }
    tracing::info!(chat = %mask_chat_id(chat_id), rating, "Survey recorded");
    app.emit(OperatorEvent::SurveyUpdate {
        chat_id: chat_id.to_string(),
        rating,
    });

    if feedback_requested {
        send(app, chat_id, messages::LOW_RATING_FEEDBACK_REQUEST).await;
    } else {
        send(app, chat_id, &messages::rating_thanks(rating)).await;
        recap::generate_recap(app, chat_id, Some(rating), None).await;
    }

    Outcome::SurveyRecorded {
        rating,
        feedback_requested,
    }
}

async fn record_feedback(
    app: &App,
    chat_id: &str,
    customer_name: Option<String>,
    rating: Option<i32>,
    feedback: &str,
) -> Outcome {
    app.sessions.update(chat_id, |s| {
        s.phase = Phase::Normal;
        s.survey_asked = false;
    });

    if let Err(e) = app
        .curation
        .record_evaluation(chat_id, customer_name, rating, feedback)
        .await
    {
        tracing::error!(error = %e, "Failed to record evaluation");
    }

    send(app, chat_id, messages::FEEDBACK_ACK).await;
    recap::generate_recap(app, chat_id, rating, Some(feedback)).await;
    Outcome::FeedbackRecorded
}

async fn answer(app: &App, chat_id: &str, display: &str, text: &str, follow_up_asked: bool) -> Outcome {
    app.sessions
        .update(chat_id, |s| s.last_question = Some(text.to_string()));

    let context = app.retriever.query(text).await;
    let needs_review = context.is_empty();
    if needs_review {
        match app.curation.log_gap(text, chat_id, display).await {
            Ok(true) => tracing::info!(chat = %mask_chat_id(chat_id), "Knowledge gap logged"),
            Ok(false) => {}
            Err(e) => tracing::error!(error = %e, "Failed to log knowledge gap"),
        }
    }
    emit_inbound(app, chat_id, display, text, needs_review);

    let humor = app.settings().await.humor_level;
    let mut reply = app.responder.generate(text, &context, humor).await;

    let add_follow_up = !follow_up_asked && app.intents.needs_follow_up(&reply);
    if add_follow_up {
        reply.push_str(messages::FOLLOW_UP_QUESTION);
    }

    let now = Utc::now();
    app.sessions.update(chat_id, |s| {
        if add_follow_up {
            s.follow_up_asked = true;
            s.needs_follow_up = true;
        }
    });
    app.sessions
        .append_to_buffer(chat_id, Role::Assistant, &reply, now);

    tokio::time::sleep(app.governor.human_delay()).await;
    if let Err(e) = app.transport.send_presence(chat_id, Presence::Composing).await {
        tracing::debug!(error = %e, "Presence update failed");
    }
    tokio::time::sleep(app.governor.typing_delay(reply.chars().count())).await;

    if send(app, chat_id, &reply).await {
        app.emit(OperatorEvent::MessageOut {
            chat_id: chat_id.to_string(),
            name: display.to_string(),
            text: reply,
        });
    }
    Outcome::Replied { needs_review }
}

/// Operator reply on behalf of the assistant. The pending question, if
/// any, is paired with the reply and learned. Returns whether learning
/// happened. The handover stays in place until released.
pub async fn manual_reply(
    app: &App,
    chat_id: &str,
    text: &str,
    media: Option<&MediaPayload>,
) -> Result<bool, EscalationError> {
    if !app.transport.is_connected() {
        return Err(EscalationError::NotConnected);
    }

    let text = text.trim();
    // What the conversation shows for an attachment sent without a caption
    let logged = match media {
        Some(m) if text.is_empty() => {
            if m.is_image() {
                messages::IMAGE_PLACEHOLDER
            } else {
                messages::DOCUMENT_PLACEHOLDER
            }
        }
        _ => text,
    };

    let now = Utc::now();
    let question = app
        .sessions
        .update(chat_id, |s| {
            s.push_message(Role::Assistant, logged, now, app.config.conversation.buffer_capacity);
            if text.is_empty() {
                None
            } else {
                s.last_question.take()
            }
        })
        .flatten();

    match media {
        Some(m) => {
            let caption = Some(text).filter(|t| !t.is_empty());
            app.transport.send_media(chat_id, m, caption).await?;
        }
        None => app.transport.send_text(chat_id, text).await?,
    }
    app.emit(OperatorEvent::MessageOut {
        chat_id: chat_id.to_string(),
        name: "Operator".to_string(),
        text: logged.to_string(),
    });

    let learned = match question {
        Some(q) => app.retriever.add_learning_data(&q, text).await,
        None => false,
    };
    Ok(learned)
}

/// `HandedOff` back to `Normal`. Returns whether the chat was handed off.
pub fn release_handover(app: &App, chat_id: &str) -> bool {
    app.sessions
        .update(chat_id, |s| {
            if s.phase == Phase::HandedOff {
                s.phase = Phase::Normal;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
}

/// One sweep: purge, latch and send inactivity surveys, snapshot.
pub async fn run_sweep(app: &App) {
    let report = app.sessions.sweep_at(Utc::now());
    for (chat_id, name) in &report.survey_due {
        send(app, chat_id, &messages::inactivity_survey(name.as_deref())).await;
    }
    app.governor.prune();
    if let Err(e) = app.sessions.snapshot().await {
        tracing::error!(error = %e, "Failed to snapshot sessions");
    }
}

pub async fn run_sweep_loop(app: Arc<App>, mut shutdown: broadcast::Receiver<()>) {
    let minutes = app.config.conversation.sweep_interval_minutes.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // First tick fires immediately; nothing is due at startup
    ticker.tick().await;

    tracing::info!("Session sweep loop started (interval: {}min)", minutes);

    loop {
        tokio::select! {
            _ = ticker.tick() => run_sweep(&app).await,
            _ = shutdown.recv() => {
                tracing::info!("Session sweep loop shutting down");
                break;
            }
        }
    }
}
