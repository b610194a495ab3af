use ppid_core::ipc::{OperatorCommand, OperatorEvent, OperatorResponse};
use serde_json::json;

use crate::app::App;
use crate::subsystems::curation::{AUTO_GENERATED_CHAT, AUTO_GENERATED_CONTACT};
use crate::subsystems::escalation::{self, EscalationError};
use crate::subsystems::retriever::{Learned, SAMPLE_QUERY};
use crate::transport::{mask_chat_id, remove_credentials};

pub async fn handle_command(command: OperatorCommand, app: &App) -> OperatorResponse {
    match command {
        OperatorCommand::Ping => OperatorResponse::pong(),
        OperatorCommand::Status => status(app).await,
        OperatorCommand::Start => {
            app.set_running(true);
            tracing::info!("Assistant started by operator");
            OperatorResponse::ok(json!({ "running": true }))
        }
        OperatorCommand::Stop => {
            app.set_running(false);
            tracing::info!("Assistant stopped by operator");
            OperatorResponse::ok(json!({ "running": false }))
        }
        OperatorCommand::ManualReply { chat_id, text, media } => {
            if text.trim().is_empty() && media.is_none() {
                return OperatorResponse::err("text or media is required");
            }
            match escalation::manual_reply(app, &chat_id, &text, media.as_ref()).await {
                Ok(learned) => OperatorResponse::ok(json!({ "sent": true, "learned": learned })),
                Err(EscalationError::NotConnected) => OperatorResponse::err("transport not connected"),
                Err(e) => OperatorResponse::err(e.to_string()),
            }
        }
        OperatorCommand::ReleaseHandover { chat_id } => {
            let released = escalation::release_handover(app, &chat_id);
            if released {
                tracing::info!(chat = %mask_chat_id(&chat_id), "Handover released");
            }
            OperatorResponse::ok(json!({ "released": released }))
        }
        OperatorCommand::Train { question, answer } => train(app, &question, &answer).await,
        OperatorCommand::TestPrompt { query } => test_prompt(app, &query).await,
        OperatorCommand::UpdateSettings { settings } => match app.update_settings(settings).await {
            Ok(s) => OperatorResponse::ok(s.masked()),
            Err(e) => OperatorResponse::err(format!("Failed to save settings: {}", e)),
        },
        OperatorCommand::GetSettings => OperatorResponse::ok(app.settings().await.masked()),
        OperatorCommand::Logout => logout(app).await,
        OperatorCommand::GetSurveyStats => to_response(app.recaps.survey_stats().await),
        OperatorCommand::GetRecaps { limit } => to_response(app.recaps.recaps(limit).await),
        OperatorCommand::ExportRecapsCsv => match app.recaps.export_csv().await {
            Some(csv) => OperatorResponse::ok(json!({ "csv": csv })),
            None => OperatorResponse::err("no recaps to export"),
        },
        OperatorCommand::GetEvaluations => to_response(app.curation.evaluations().await),
        OperatorCommand::ResolveEvaluation { id, status } => {
            match app.curation.resolve_evaluation(&id, status).await {
                Ok(true) => OperatorResponse::ok(json!({ "id": id, "status": status })),
                Ok(false) => OperatorResponse::err("ID not found"),
                Err(e) => OperatorResponse::err(e.to_string()),
            }
        }
        OperatorCommand::GetKnowledgeGaps => to_response(app.curation.gaps().await),
        OperatorCommand::DismissKnowledgeGap { question } => {
            match app.curation.dismiss_gap(&question).await {
                Ok(removed) => OperatorResponse::ok(json!({ "removed": removed })),
                Err(e) => OperatorResponse::err(e.to_string()),
            }
        }
        OperatorCommand::GenerateQuestions => generate_questions(app).await,
        OperatorCommand::ListDocuments => {
            match ppid_ingest::list_source_files(&app.config.docs_folder()).await {
                Ok(files) => to_response(files),
                Err(e) => OperatorResponse::err(e.to_string()),
            }
        }
        OperatorCommand::Reindex => {
            match app
                .retriever
                .reindex(&app.config.docs_folder(), &app.splitter())
                .await
            {
                Ok(report) => OperatorResponse::ok(json!({
                    "documents": report.documents,
                    "chunks": report.chunks,
                })),
                Err(e) => OperatorResponse::err(format!("Reindex failed: {}", e)),
            }
        }
        OperatorCommand::Subscribe => {
            OperatorResponse::err("subscribe requires a streaming socket connection")
        }
    }
}

fn to_response<T: serde::Serialize>(value: T) -> OperatorResponse {
    match serde_json::to_value(value) {
        Ok(v) => OperatorResponse::ok(v),
        Err(e) => OperatorResponse::err(format!("Serialization error: {}", e)),
    }
}

async fn status(app: &App) -> OperatorResponse {
    let handed_off: Vec<_> = app
        .sessions
        .handed_off()
        .into_iter()
        .map(|s| json!({ "chat_id": s.chat_id, "name": s.customer_name }))
        .collect();

    OperatorResponse::ok(json!({
        "running": app.is_running(),
        "connected": app.transport.is_connected(),
        "provider": app.responder.provider_name().await,
        "sessions": app.sessions.len(),
        "index_chunks": app.retriever.chunk_count().await,
        "handed_off": handed_off,
    }))
}

async fn train(app: &App, question: &str, answer: &str) -> OperatorResponse {
    if question.trim().is_empty() || answer.trim().is_empty() {
        return OperatorResponse::err("question and answer are required");
    }

    match app
        .retriever
        .learn(question, answer, Some(app.operator_timeout()))
        .await
    {
        Learned::Stored => {
            if let Err(e) = app.curation.dismiss_gap(question).await {
                tracing::warn!(error = %e, "Trained, but the knowledge gap could not be cleared");
            }
            OperatorResponse::ok(json!({ "trained": true }))
        }
        Learned::Failed => OperatorResponse::err("training failed, see server log"),
        Learned::TimedOut => OperatorResponse::err("timed out waiting for training"),
    }
}

async fn test_prompt(app: &App, query: &str) -> OperatorResponse {
    let run = async {
        let context = app.retriever.query(query).await;
        let humor = app.settings().await.humor_level;
        let response = app.responder.generate(query, &context, humor).await;
        (response, !context.is_empty())
    };

    match tokio::time::timeout(app.operator_timeout(), run).await {
        Ok((response, context_found)) => OperatorResponse::ok(json!({
            "response": response,
            "context_found": context_found,
        })),
        Err(_) => OperatorResponse::err("timed out waiting for test prompt"),
    }
}

async fn logout(app: &App) -> OperatorResponse {
    if let Err(e) = app.transport.logout().await {
        tracing::warn!(error = %e, "Gateway logout failed, clearing credentials anyway");
    }
    if let Err(e) = remove_credentials(&app.config.credentials_path()).await {
        return OperatorResponse::err(format!("Failed to remove credentials: {}", e));
    }
    app.emit(OperatorEvent::LoggedOut);
    OperatorResponse::ok(json!({ "logged_out": true }))
}

async fn generate_questions(app: &App) -> OperatorResponse {
    let run = async {
        let sample = app.retriever.query(SAMPLE_QUERY).await;
        app.responder.generate_questions(&sample).await
    };
    let questions = match tokio::time::timeout(app.operator_timeout(), run).await {
        Ok(q) => q,
        Err(_) => return OperatorResponse::err("timed out waiting for question generation"),
    };

    let mut added = 0usize;
    for q in &questions {
        match app
            .curation
            .log_gap(q, AUTO_GENERATED_CHAT, AUTO_GENERATED_CONTACT)
            .await
        {
            Ok(true) => added += 1,
            Ok(false) => {}
            Err(e) => return OperatorResponse::err(e.to_string()),
        }
    }

    OperatorResponse::ok(json!({ "questions": questions, "added": added }))
}
