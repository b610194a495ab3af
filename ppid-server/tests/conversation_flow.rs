//! End-to-end conversation scenarios against in-process doubles.

mod common;

use std::time::Duration;

use chrono::Utc;
use ppid_core::ipc::OperatorEvent;
use ppid_core::models::{Phase, RecapStatus, SurveyResult};
use ppid_server::messages;
use ppid_server::subsystems::escalation::{self, handle_inbound, Outcome};
use ppid_server::InboundMessage;

use common::{harness, harness_with, seed_index, test_config, CHAT};

fn from_budi(text: &str) -> InboundMessage {
    InboundMessage::text(CHAT, "Budi", text)
}

// ===========================================================================
// TEST 1: question, thanks, high rating: survey recorded, recap resolved
// ===========================================================================
#[tokio::test]
async fn test_survey_flow_high_rating() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_index(&config).await;
    let h = harness_with(config, "Jam layanan PPID Senin-Jumat 08.00-16.00.").await;

    let outcome = handle_inbound(&h.app, from_budi("Jam layanan kapan ya?")).await;
    assert_eq!(outcome, Outcome::Replied { needs_review: false });

    let sent = h.transport.sent_to(CHAT);
    assert_eq!(sent.len(), 2, "welcome then answer");
    assert!(sent[0].starts_with("Halo Kak *Budi*!"));
    assert_eq!(sent[1], "Jam layanan PPID Senin-Jumat 08.00-16.00.");
    assert_eq!(h.transport.presence_count(), 1, "composing before the answer");

    let outcome = handle_inbound(&h.app, from_budi("terima kasih")).await;
    assert_eq!(outcome, Outcome::SurveyRequested);
    assert!(h.transport.last_to(CHAT).unwrap().contains("ketik angka 1-5"));
    assert_eq!(h.app.sessions.get(CHAT).unwrap().phase, Phase::AwaitingSurvey);

    let outcome = handle_inbound(&h.app, from_budi("5")).await;
    assert_eq!(
        outcome,
        Outcome::SurveyRecorded {
            rating: 5,
            feedback_requested: false
        }
    );
    assert_eq!(h.transport.last_to(CHAT).unwrap(), messages::rating_thanks(5));

    let stats = h.app.recaps.survey_stats().await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.distribution, [0, 0, 0, 0, 1]);

    let recaps = h.app.recaps.recaps(None).await;
    assert_eq!(recaps.len(), 1);
    assert_eq!(recaps[0].status, RecapStatus::Resolved);
    assert_eq!(recaps[0].category, "Informasi Umum");
    assert_eq!(recaps[0].customer_name.as_deref(), Some("Budi"));

    let session = h.app.sessions.get(CHAT).unwrap();
    assert_eq!(session.phase, Phase::Normal);
    assert!(session.buffer.is_empty(), "buffer cleared after recap");
}

// ===========================================================================
// TEST 2: low rating asks for feedback, feedback becomes an evaluation
// ===========================================================================
#[tokio::test]
async fn test_survey_flow_low_rating_feedback() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "unused").await;

    handle_inbound(&h.app, from_budi("makasih")).await;
    let outcome = handle_inbound(&h.app, from_budi("2")).await;
    assert_eq!(
        outcome,
        Outcome::SurveyRecorded {
            rating: 2,
            feedback_requested: true
        }
    );
    assert_eq!(
        h.transport.last_to(CHAT).unwrap(),
        messages::LOW_RATING_FEEDBACK_REQUEST
    );
    assert_eq!(h.app.sessions.get(CHAT).unwrap().phase, Phase::AwaitingFeedback);

    let outcome = handle_inbound(&h.app, from_budi("Jawabannya kurang jelas")).await;
    assert_eq!(outcome, Outcome::FeedbackRecorded);
    assert_eq!(h.transport.last_to(CHAT).unwrap(), messages::FEEDBACK_ACK);

    let evaluations = h.app.curation.evaluations().await;
    assert_eq!(evaluations.len(), 1);
    assert_eq!(evaluations[0].feedback, "Jawabannya kurang jelas");
    assert_eq!(evaluations[0].rating, Some(2));

    let recaps = h.app.recaps.recaps(None).await;
    assert_eq!(recaps.len(), 1);
    assert_eq!(recaps[0].status, RecapStatus::Alert);
    assert_eq!(recaps[0].evaluation.as_deref(), Some("Jawabannya kurang jelas"));
    assert_eq!(h.app.sessions.get(CHAT).unwrap().phase, Phase::Normal);
}

// ===========================================================================
// TEST 3: empty context answers anyway and logs the gap once
// ===========================================================================
#[tokio::test]
async fn test_empty_context_logs_gap_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "Silakan hubungi kantor kami.").await;
    let mut events = h.app.subscribe();

    let question = "Bagaimana cara mengajukan keberatan?";
    let outcome = handle_inbound(&h.app, from_budi(question)).await;
    assert_eq!(outcome, Outcome::Replied { needs_review: true });
    assert_eq!(
        h.transport.last_to(CHAT).unwrap(),
        "Silakan hubungi kantor kami."
    );

    handle_inbound(&h.app, from_budi(question)).await;
    let gaps = h.app.curation.gaps().await;
    assert_eq!(gaps.len(), 1, "same question is logged once");
    assert_eq!(gaps[0].question, question);
    assert_eq!(gaps[0].contact, "Budi");

    match events.recv().await.unwrap() {
        OperatorEvent::MessageIn { needs_review, text, .. } => {
            assert!(needs_review);
            assert_eq!(text, question);
        }
        other => panic!("expected message_in, got {:?}", other),
    }
}

// ===========================================================================
// TEST 4: generation failure sends the apology
// ===========================================================================
#[tokio::test]
async fn test_empty_generation_sends_apology() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "   ").await;

    handle_inbound(&h.app, from_budi("Ada info beasiswa?")).await;
    assert_eq!(h.transport.last_to(CHAT).unwrap(), messages::APOLOGY);
}

// ===========================================================================
// TEST 5: handoff silences the bot until released; operator reply is learned
// ===========================================================================
#[tokio::test]
async fn test_handoff_manual_reply_and_release() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "Jawaban otomatis").await;
    let mut events = h.app.subscribe();

    let outcome = handle_inbound(&h.app, from_budi("saya mau bicara dengan cs")).await;
    assert_eq!(outcome, Outcome::HandoffRequested);
    assert!(h.transport.last_to(CHAT).unwrap().contains("Kak *Budi*"));
    assert!(h.app.sessions.get(CHAT).unwrap().is_handed_off());

    let before = h.transport.sent_count();
    let outcome = handle_inbound(&h.app, from_budi("minta cs sekarang")).await;
    assert_eq!(outcome, Outcome::HandedOffSilent, "repeat request while handed off");
    let outcome = handle_inbound(&h.app, from_budi("Jam buka kantor kapan?")).await;
    assert_eq!(outcome, Outcome::HandedOffSilent);
    assert_eq!(h.transport.sent_count(), before, "no automatic reply");

    let holding = messages::handover_holding("Budi");
    let holding_sent = h.transport.sent_to(CHAT).iter().filter(|t| **t == holding).count();
    assert_eq!(holding_sent, 1);

    let mut handovers = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let OperatorEvent::HandoverRequest { chat_id, .. } = event {
            handovers.push(chat_id);
        }
    }
    assert_eq!(handovers, vec![CHAT.to_string()]);

    let learned = escalation::manual_reply(&h.app, CHAT, "Senin-Jumat pukul 08.00-16.00", None)
        .await
        .unwrap();
    assert!(learned);
    assert_eq!(
        h.transport.last_to(CHAT).unwrap(),
        "Senin-Jumat pukul 08.00-16.00"
    );
    assert_eq!(h.app.retriever.chunk_count().await, 1);
    assert!(h.app.sessions.get(CHAT).unwrap().last_question.is_none());
    assert!(h.app.sessions.get(CHAT).unwrap().is_handed_off());

    assert!(escalation::release_handover(&h.app, CHAT));
    assert!(!escalation::release_handover(&h.app, CHAT));
    assert_eq!(h.app.sessions.get(CHAT).unwrap().phase, Phase::Normal);

    // Taught pair is now context for the same question
    let outcome = handle_inbound(&h.app, from_budi("Jam buka kantor kapan?")).await;
    assert_eq!(outcome, Outcome::Replied { needs_review: false });
}

// ===========================================================================
// TEST 6: manual reply without a connection is refused
// ===========================================================================
#[tokio::test]
async fn test_manual_reply_requires_connection() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "x").await;
    h.transport.set_connected(false);

    let result = escalation::manual_reply(&h.app, CHAT, "halo", None).await;
    assert!(matches!(
        result,
        Err(escalation::EscalationError::NotConnected)
    ));
}

// ===========================================================================
// TEST 7: cooldown drops a burst, accepts again after the window
// ===========================================================================
#[tokio::test(start_paused = true)]
async fn test_cooldown_drops_burst() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.pacing.cooldown_ms = 2000;
    seed_index(&config).await;
    let h = harness_with(config, "Senin-Jumat.").await;

    assert_eq!(
        handle_inbound(&h.app, from_budi("jam buka?")).await,
        Outcome::Replied { needs_review: false }
    );
    assert_eq!(
        handle_inbound(&h.app, from_budi("jam buka??")).await,
        Outcome::RateLimited
    );

    tokio::time::advance(Duration::from_millis(2001)).await;
    assert_eq!(
        handle_inbound(&h.app, from_budi("jam buka???")).await,
        Outcome::Replied { needs_review: false }
    );
}

// ===========================================================================
// TEST 8: transcript buffer keeps the 30 most recent messages
// ===========================================================================
#[tokio::test]
async fn test_buffer_bound() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "x").await;

    handle_inbound(&h.app, from_budi("hubungi petugas")).await;
    for i in 0..40 {
        handle_inbound(&h.app, from_budi(&format!("pesan {}", i))).await;
    }

    let session = h.app.sessions.get(CHAT).unwrap();
    assert_eq!(session.buffer.len(), 30);
    assert_eq!(session.buffer.front().unwrap().text, "pesan 10");
    assert_eq!(session.buffer.back().unwrap().text, "pesan 39");
}

// ===========================================================================
// TEST 9: inactivity sweep asks for a rating; a late answer still counts
// ===========================================================================
#[tokio::test]
async fn test_inactivity_survey_and_late_rating() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "Baik.").await;

    handle_inbound(&h.app, from_budi("info PPID")).await;
    h.app.sessions.update(CHAT, |s| {
        s.last_activity_at = Utc::now() - chrono::Duration::minutes(31);
    });

    escalation::run_sweep(&h.app).await;
    assert!(h
        .transport
        .last_to(CHAT)
        .unwrap()
        .starts_with("Halo Budi, sepertinya Anda sedang sibuk."));
    let session = h.app.sessions.get(CHAT).unwrap();
    assert_eq!(session.phase, Phase::AwaitingSurvey);
    assert!(session.survey_asked);

    // Sweep latches once
    escalation::run_sweep(&h.app).await;
    let surveys = h
        .transport
        .sent_to(CHAT)
        .iter()
        .filter(|t| t.contains("sepertinya Anda sedang sibuk"))
        .count();
    assert_eq!(surveys, 1);

    // Rating arrives after the session already expired
    h.app.sessions.update(CHAT, |s| {
        s.last_activity_at = Utc::now() - chrono::Duration::minutes(45);
    });
    let outcome = handle_inbound(&h.app, from_budi("4")).await;
    assert_eq!(
        outcome,
        Outcome::SurveyRecorded {
            rating: 4,
            feedback_requested: false
        }
    );
    assert_eq!(h.app.recaps.survey_stats().await.total, 1);
}

// ===========================================================================
// TEST 10: a stopped assistant and group chats stay silent
// ===========================================================================
#[tokio::test]
async fn test_stopped_and_group_messages_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "x").await;

    let group = InboundMessage::text("120363000@g.us", "Grup", "halo semua");
    assert_eq!(handle_inbound(&h.app, group).await, Outcome::Ignored);

    h.app.set_running(false);
    assert_eq!(
        handle_inbound(&h.app, from_budi("halo")).await,
        Outcome::Stopped
    );
    assert_eq!(h.transport.sent_count(), 0);
    assert!(h.app.sessions.is_empty());
}

// ===========================================================================
// TEST 11: self-introduction overrides the push name
// ===========================================================================
#[tokio::test]
async fn test_introduction_sets_name() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "Halo Sari.").await;

    handle_inbound(
        &h.app,
        InboundMessage::text(CHAT, "~ 🌸 ~", "nama saya sari, mau tanya layanan"),
    )
    .await;
    assert_eq!(
        h.app.sessions.get(CHAT).unwrap().customer_name.as_deref(),
        Some("Sari")
    );
    assert!(h.transport.sent_to(CHAT)[0].starts_with("Halo Kak *Sari*!"));
}

// ===========================================================================
// TEST 12: state survives a restart; legacy ratings are clamped in stats
// ===========================================================================
#[tokio::test]
async fn test_persistence_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    {
        let h = harness(dir.path(), "x").await;
        handle_inbound(&h.app, from_budi("terima kasih")).await;
        handle_inbound(&h.app, from_budi("3")).await;
        h.app
            .recaps
            .record_survey(SurveyResult {
                chat_id: "legacy".into(),
                rating: 7,
                timestamp: Utc::now(),
                customer_name: None,
            })
            .await
            .unwrap();
        h.app.sessions.snapshot().await.unwrap();
    }

    let h = harness(dir.path(), "x").await;
    let stats = h.app.recaps.survey_stats().await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.distribution, [0, 0, 1, 0, 1]);
    assert_eq!(h.app.recaps.recaps(None).await.len(), 1);

    let session = h.app.sessions.get(CHAT).expect("session restored");
    assert_eq!(session.last_rating, Some(3));
    assert_eq!(session.customer_name.as_deref(), Some("Budi"));
}

// ===========================================================================
// TEST 13: a second thank-you after a closed survey asks again
// ===========================================================================
#[tokio::test]
async fn test_repeat_close_asks_for_second_survey() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_index(&config).await;
    let h = harness_with(config, "Senin-Jumat.").await;

    assert_eq!(
        handle_inbound(&h.app, from_budi("terima kasih")).await,
        Outcome::SurveyRequested
    );
    assert_eq!(
        handle_inbound(&h.app, from_budi("5")).await,
        Outcome::SurveyRecorded {
            rating: 5,
            feedback_requested: false
        }
    );
    assert!(!h.app.sessions.get(CHAT).unwrap().survey_asked);

    assert_eq!(
        handle_inbound(&h.app, from_budi("jam buka?")).await,
        Outcome::Replied { needs_review: false }
    );
    assert_eq!(
        handle_inbound(&h.app, from_budi("terima kasih")).await,
        Outcome::SurveyRequested
    );
    assert_eq!(h.app.sessions.get(CHAT).unwrap().phase, Phase::AwaitingSurvey);
    assert_eq!(
        handle_inbound(&h.app, from_budi("4")).await,
        Outcome::SurveyRecorded {
            rating: 4,
            feedback_requested: false
        }
    );

    assert_eq!(h.app.recaps.survey_stats().await.total, 2);
    assert_eq!(h.app.recaps.recaps(None).await.len(), 2);
}

// ===========================================================================
// TEST 14: feedback closes the survey too; the next thank-you asks again
// ===========================================================================
#[tokio::test]
async fn test_thanks_after_feedback_asks_again() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "unused").await;

    handle_inbound(&h.app, from_budi("makasih")).await;
    handle_inbound(&h.app, from_budi("1")).await;
    assert_eq!(
        handle_inbound(&h.app, from_budi("Kurang lengkap")).await,
        Outcome::FeedbackRecorded
    );
    assert!(!h.app.sessions.get(CHAT).unwrap().survey_asked);
    assert_eq!(
        handle_inbound(&h.app, from_budi("makasih")).await,
        Outcome::SurveyRequested
    );
    assert_eq!(h.app.sessions.get(CHAT).unwrap().phase, Phase::AwaitingSurvey);
}

// ===========================================================================
// TEST 15: follow-up question is appended once; closing words only end the
// conversation after it was asked
// ===========================================================================
#[tokio::test]
async fn test_follow_up_once_then_closing_opens_survey() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), "Layanan informasi tidak dipungut biaya.").await;

    // No follow-up asked yet: "oke" is just another message
    assert_eq!(
        handle_inbound(&h.app, from_budi("oke")).await,
        Outcome::Replied { needs_review: true }
    );
    assert!(!h.transport.last_to(CHAT).unwrap().ends_with(messages::FOLLOW_UP_QUESTION));
    assert!(!h.app.sessions.get(CHAT).unwrap().follow_up_asked);

    h.generator
        .set_reply("Silakan mengisi formulir permohonan di laman PPID.");
    handle_inbound(&h.app, from_budi("Bagaimana cara mengajukan permohonan?")).await;
    assert_eq!(
        h.transport.last_to(CHAT).unwrap(),
        format!(
            "Silakan mengisi formulir permohonan di laman PPID.{}",
            messages::FOLLOW_UP_QUESTION
        )
    );
    let session = h.app.sessions.get(CHAT).unwrap();
    assert!(session.follow_up_asked);
    assert!(session.needs_follow_up);

    handle_inbound(&h.app, from_budi("Formulirnya di mana?")).await;
    assert_eq!(
        h.transport.last_to(CHAT).unwrap(),
        "Silakan mengisi formulir permohonan di laman PPID."
    );
    let follow_ups = h
        .transport
        .sent_to(CHAT)
        .iter()
        .filter(|t| t.ends_with(messages::FOLLOW_UP_QUESTION))
        .count();
    assert_eq!(follow_ups, 1);

    assert_eq!(
        handle_inbound(&h.app, from_budi("tidak ada")).await,
        Outcome::SurveyRequested
    );
    assert!(h.transport.last_to(CHAT).unwrap().contains("ketik angka 1-5"));
}
