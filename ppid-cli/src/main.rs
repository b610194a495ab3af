//! ppid-cli: operator CLI for the PPID Assistant
//!
//! Talks to the server's HTTP API: every subcommand becomes one operator
//! command posted as JSON to `POST /command`, except `status`, which also
//! reads `GET /health`.
//!
//! # Subcommands
//! - `status`                            health, connection, handed-off chats
//! - `start` / `stop`                    resume or pause automatic replies
//! - `stats`                             survey rating summary
//! - `recaps [-n N] [--csv [--out F]]`   conversation recaps or CSV export
//! - `gaps` / `dismiss-gap <q>`          unanswered questions
//! - `evaluations` / `resolve <id> <s>`
//! - `train <question> <answer>`         teach an answer
//! - `reply <chat> [text] [--attach F]` / `release <chat>`
//! - `test-prompt <query>`               dry-run an answer
//! - `questions`                         propose likely questions
//! - `documents` / `reindex`
//! - `settings [--humor N] [--temperature T] [--provider P]`

use std::path::Path;

use anyhow::{bail, Context};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8766";
const DEFAULT_RECAP_LIMIT: usize = 20;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "ppid-cli", version, about = "PPID Assistant operator CLI")]
struct Cli {
    /// PPID HTTP server URL (overrides PPID_HTTP_URL env var)
    #[arg(long, env = "PPID_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Print the raw JSON response instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server health and assistant status
    Status,

    /// Resume automatic replies
    Start,

    /// Pause automatic replies
    Stop,

    /// Show survey statistics
    Stats,

    /// List conversation recaps
    Recaps {
        /// Number of recaps to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_RECAP_LIMIT)]
        limit: usize,

        /// Export all recaps as CSV
        #[arg(long)]
        csv: bool,

        /// Write the CSV to a file instead of stdout
        #[arg(long, requires = "csv")]
        out: Option<String>,
    },

    /// List knowledge gaps
    Gaps,

    /// Remove a knowledge gap
    DismissGap { question: String },

    /// List negative-feedback evaluations
    Evaluations,

    /// Mark an evaluation as trained or ignored
    Resolve {
        id: String,
        #[arg(value_parser = ["pending", "trained", "ignored"])]
        status: String,
    },

    /// Teach a question/answer pair
    Train { question: String, answer: String },

    /// Reply to a chat as the operator
    Reply {
        chat_id: String,
        /// Message text; the caption when a file is attached
        #[arg(default_value = "")]
        text: String,
        /// Send a file (image or document) with the reply
        #[arg(long)]
        attach: Option<String>,
    },

    /// Hand a chat back to the assistant
    Release { chat_id: String },

    /// Generate an answer without sending it
    TestPrompt { query: String },

    /// Propose likely questions from the indexed documents
    Questions,

    /// List source documents
    Documents,

    /// Rebuild the vector index from the documents folder
    Reindex,

    /// Show or update runtime settings
    Settings {
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        humor: Option<u8>,

        #[arg(long)]
        temperature: Option<f32>,

        /// auto, groq, gemini or ollama
        #[arg(long)]
        provider: Option<String>,
    },
}

// ============================================================================
// Request building
// ============================================================================

/// MIME type by file extension; unknown types go out as a generic document.
fn mimetype_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// The `media` object of a manual reply for a file's bytes.
fn media_payload(path: &Path, bytes: &[u8]) -> Value {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("lampiran");
    json!({
        "mimetype": mimetype_for(path),
        "filename": filename,
        "data": BASE64.encode(bytes),
    })
}

/// The operator command JSON for a subcommand. `Status` maps to the
/// `status` command; its health half is fetched separately.
fn command_body(command: &Commands) -> Value {
    match command {
        Commands::Status => json!({ "action": "status" }),
        Commands::Start => json!({ "action": "start" }),
        Commands::Stop => json!({ "action": "stop" }),
        Commands::Stats => json!({ "action": "get_survey_stats" }),
        Commands::Recaps { csv: true, .. } => json!({ "action": "export_recaps_csv" }),
        Commands::Recaps { limit, .. } => json!({ "action": "get_recaps", "limit": limit }),
        Commands::Gaps => json!({ "action": "get_knowledge_gaps" }),
        Commands::DismissGap { question } => {
            json!({ "action": "dismiss_knowledge_gap", "question": question })
        }
        Commands::Evaluations => json!({ "action": "get_evaluations" }),
        Commands::Resolve { id, status } => {
            json!({ "action": "resolve_evaluation", "id": id, "status": status })
        }
        Commands::Train { question, answer } => {
            json!({ "action": "train", "question": question, "answer": answer })
        }
        Commands::Reply { chat_id, text, .. } => {
            json!({ "action": "manual_reply", "chat_id": chat_id, "text": text })
        }
        Commands::Release { chat_id } => json!({ "action": "release_handover", "chat_id": chat_id }),
        Commands::TestPrompt { query } => json!({ "action": "test_prompt", "query": query }),
        Commands::Questions => json!({ "action": "generate_questions" }),
        Commands::Documents => json!({ "action": "list_documents" }),
        Commands::Reindex => json!({ "action": "reindex" }),
        Commands::Settings {
            humor: None,
            temperature: None,
            provider: None,
        } => json!({ "action": "get_settings" }),
        Commands::Settings {
            humor,
            temperature,
            provider,
        } => {
            let mut settings = serde_json::Map::new();
            if let Some(h) = humor {
                settings.insert("humor_level".into(), json!(h));
            }
            if let Some(t) = temperature {
                settings.insert("temperature".into(), json!(t));
            }
            if let Some(p) = provider {
                // "auto" clears the preference
                let p = if p == "auto" { "" } else { p.as_str() };
                settings.insert("provider".into(), json!(p));
            }
            json!({ "action": "update_settings", "settings": settings })
        }
    }
}

// ============================================================================
// Output formatting
// ============================================================================

#[derive(Debug, Deserialize)]
struct SurveyStats {
    total: usize,
    average: f64,
    distribution: [usize; 5],
}

fn format_stats(data: &Value) -> anyhow::Result<String> {
    let stats: SurveyStats =
        serde_json::from_value(data.clone()).context("unexpected survey stats shape")?;
    let mut out = format!("Responses: {}\nAverage:   {:.1}/5\n", stats.total, stats.average);
    for (i, count) in stats.distribution.iter().enumerate().rev() {
        out.push_str(&format!("{} {:>5}\n", "⭐".repeat(i + 1), count));
    }
    Ok(out)
}

fn format_recaps(data: &Value) -> String {
    let recaps = data.as_array().cloned().unwrap_or_default();
    if recaps.is_empty() {
        return "No recaps yet.\n".to_string();
    }
    let mut out = String::new();
    for r in &recaps {
        let rating = r["rating"]
            .as_i64()
            .map(|v| format!("{}/5", v))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{}  {}  [{}] {}\n    {}\n",
            r["timestamp"].as_str().unwrap_or("?"),
            r["customer_name"].as_str().unwrap_or("-"),
            r["category"].as_str().unwrap_or("?"),
            rating,
            r["summary"].as_str().unwrap_or(""),
        ));
    }
    out
}

fn format_gaps(data: &Value) -> String {
    let gaps = data.as_array().cloned().unwrap_or_default();
    if gaps.is_empty() {
        return "No knowledge gaps.\n".to_string();
    }
    gaps.iter()
        .map(|g| {
            format!(
                "- {}  ({})\n",
                g["question"].as_str().unwrap_or(""),
                g["contact"].as_str().unwrap_or("?")
            )
        })
        .collect()
}

fn format_evaluations(data: &Value) -> String {
    let evaluations = data.as_array().cloned().unwrap_or_default();
    if evaluations.is_empty() {
        return "No evaluations.\n".to_string();
    }
    evaluations
        .iter()
        .map(|e| {
            format!(
                "{} [{}] {}: {}\n",
                e["id"].as_str().unwrap_or("?"),
                e["status"].as_str().unwrap_or("?"),
                e["customer_name"].as_str().unwrap_or("-"),
                e["feedback"].as_str().unwrap_or(""),
            )
        })
        .collect()
}

fn format_status(health: &Value, status: &Value) -> String {
    let mut out = format!(
        "PPID server:  {}\nVersion:      {}\nSocket:       {}\nConnected:    {}\nRunning:      {}\nProvider:     {}\nSessions:     {}\nIndex chunks: {}\n",
        health["status"].as_str().unwrap_or("unknown"),
        health["version"].as_str().unwrap_or("?"),
        health["socket"].as_str().unwrap_or("?"),
        status["connected"],
        status["running"],
        status["provider"].as_str().unwrap_or("?"),
        status["sessions"],
        status["index_chunks"],
    );
    if let Some(chats) = status["handed_off"].as_array().filter(|c| !c.is_empty()) {
        out.push_str("Handed off:\n");
        for c in chats {
            out.push_str(&format!(
                "  {}  {}\n",
                c["chat_id"].as_str().unwrap_or("?"),
                c["name"].as_str().unwrap_or("-")
            ));
        }
    }
    out
}

/// Human-readable summary for everything without a dedicated formatter.
fn format_generic(command: &Commands, data: &Value) -> String {
    match command {
        Commands::Start | Commands::Stop => format!("Running: {}\n", data["running"]),
        Commands::TestPrompt { .. } => format!(
            "{}\n\n(context found: {})\n",
            data["response"].as_str().unwrap_or(""),
            data["context_found"]
        ),
        Commands::Questions => {
            let mut out = String::new();
            for q in data["questions"].as_array().cloned().unwrap_or_default() {
                out.push_str(&format!("- {}\n", q.as_str().unwrap_or("")));
            }
            out.push_str(&format!("{} new knowledge gap(s) added\n", data["added"]));
            out
        }
        Commands::Documents => data
            .as_array()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|d| {
                format!(
                    "{:<40} {:<14} {:>10} bytes\n",
                    d["name"].as_str().unwrap_or("?"),
                    d["source_type"].as_str().unwrap_or("?"),
                    d["size"]
                )
            })
            .collect(),
        Commands::Reindex => format!(
            "Indexed {} document(s) into {} chunk(s)\n",
            data["documents"], data["chunks"]
        ),
        _ => format!("{}\n", serde_json::to_string_pretty(data).unwrap_or_default()),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    // Training and reindexing run embeddings server-side
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?)
}

/// POST an operator command and return its `data` payload.
fn send_command(client: &reqwest::blocking::Client, server: &str, body: &Value) -> anyhow::Result<Value> {
    let url = format!("{}/command", server);
    let resp = client
        .post(&url)
        .json(body)
        .send()
        .with_context(|| format!("connection failed to {}", url))?;

    let status = resp.status();
    let value: Value = resp.json().unwrap_or(Value::Null);
    if !status.is_success() {
        let msg = value["error"].as_str().unwrap_or("no error message");
        bail!("server returned {}: {}", status, msg);
    }
    Ok(value)
}

fn fetch_health(client: &reqwest::blocking::Client, server: &str) -> anyhow::Result<Value> {
    let url = format!("{}/health", server);
    let resp = client
        .get(&url)
        .send()
        .with_context(|| format!("cannot reach {}", url))?;
    if !resp.status().is_success() {
        bail!("server unhealthy (HTTP {})", resp.status());
    }
    Ok(resp.json()?)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let server = cli.server.trim_end_matches('/').to_string();
    let client = client()?;

    if let Commands::Status = cli.command {
        let health = fetch_health(&client, &server)?;
        let status = send_command(&client, &server, &command_body(&cli.command))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "health": health, "status": status }))?
            );
        } else {
            print!("{}", format_status(&health, &status));
        }
        return Ok(());
    }

    let mut body = command_body(&cli.command);
    if let Commands::Reply { text, attach, .. } = &cli.command {
        match attach {
            Some(file) => {
                let path = Path::new(file);
                let bytes = std::fs::read(path).with_context(|| format!("reading {}", file))?;
                body["media"] = media_payload(path, &bytes);
            }
            None if text.trim().is_empty() => bail!("reply needs text or --attach"),
            None => {}
        }
    }

    let data = send_command(&client, &server, &body)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    match &cli.command {
        Commands::Recaps { csv: true, out, .. } => {
            let csv = data["csv"].as_str().unwrap_or_default();
            match out {
                Some(path) => {
                    std::fs::write(path, csv).with_context(|| format!("writing {}", path))?;
                    eprintln!("Recaps exported to {}", path);
                }
                None => print!("{}", csv),
            }
        }
        Commands::Recaps { .. } => print!("{}", format_recaps(&data)),
        Commands::Stats => print!("{}", format_stats(&data)?),
        Commands::Gaps => print!("{}", format_gaps(&data)),
        Commands::Evaluations => print!("{}", format_evaluations(&data)),
        other => print!("{}", format_generic(other, &data)),
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("ppid-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ppid-cli").chain(args.iter().copied())).unwrap()
    }

    // ========================================================================
    // TEST 1: subcommands map to operator command actions
    // ========================================================================
    #[test]
    fn test_command_body_actions() {
        let cases = [
            (vec!["stats"], "get_survey_stats"),
            (vec!["gaps"], "get_knowledge_gaps"),
            (vec!["evaluations"], "get_evaluations"),
            (vec!["questions"], "generate_questions"),
            (vec!["documents"], "list_documents"),
            (vec!["reindex"], "reindex"),
            (vec!["release", "62811@s.whatsapp.net"], "release_handover"),
            (vec!["settings"], "get_settings"),
        ];
        for (args, action) in cases {
            let cli = parse(&args);
            assert_eq!(command_body(&cli.command)["action"], action, "{:?}", args);
        }
    }

    // ========================================================================
    // TEST 2: recaps uses the limit, --csv switches to export
    // ========================================================================
    #[test]
    fn test_recaps_body() {
        let body = command_body(&parse(&["recaps", "-n", "5"]).command);
        assert_eq!(body, json!({"action": "get_recaps", "limit": 5}));

        let body = command_body(&parse(&["recaps", "--csv"]).command);
        assert_eq!(body["action"], "export_recaps_csv");

        assert!(Cli::try_parse_from(["ppid-cli", "recaps", "--out", "x.csv"]).is_err());
    }

    // ========================================================================
    // TEST 3: reply and train carry their arguments
    // ========================================================================
    #[test]
    fn test_reply_and_train_body() {
        let body = command_body(&parse(&["reply", "62811@s.whatsapp.net", "Baik Kak"]).command);
        assert_eq!(
            body,
            json!({"action": "manual_reply", "chat_id": "62811@s.whatsapp.net", "text": "Baik Kak"})
        );

        let body = command_body(&parse(&["train", "Jam buka?", "08.00-16.00"]).command);
        assert_eq!(body["question"], "Jam buka?");
        assert_eq!(body["answer"], "08.00-16.00");
    }

    // ========================================================================
    // TEST 4: resolve only accepts known statuses
    // ========================================================================
    #[test]
    fn test_resolve_status_validation() {
        let body = command_body(&parse(&["resolve", "abc", "trained"]).command);
        assert_eq!(body["status"], "trained");
        assert!(Cli::try_parse_from(["ppid-cli", "resolve", "abc", "done"]).is_err());
    }

    // ========================================================================
    // TEST 5: settings flags build a partial update; auto clears provider
    // ========================================================================
    #[test]
    fn test_settings_update_body() {
        let body = command_body(&parse(&["settings", "--humor", "40", "--provider", "auto"]).command);
        assert_eq!(body["action"], "update_settings");
        assert_eq!(body["settings"]["humor_level"], 40);
        assert_eq!(body["settings"]["provider"], "");
        assert!(body["settings"].get("temperature").is_none());

        assert!(Cli::try_parse_from(["ppid-cli", "settings", "--humor", "101"]).is_err());
    }

    // ========================================================================
    // TEST 6: survey stats render highest rating first
    // ========================================================================
    #[test]
    fn test_format_stats() {
        let data = json!({
            "total": 3, "average": 4.3, "distribution": [0, 0, 0, 2, 1], "recent": []
        });
        let out = format_stats(&data).unwrap();
        assert!(out.starts_with("Responses: 3\nAverage:   4.3/5\n"));
        let first_row = out.lines().nth(2).unwrap();
        assert!(first_row.starts_with("⭐⭐⭐⭐⭐"));
        assert!(first_row.ends_with('1'));

        assert!(format_stats(&json!({"total": "x"})).is_err());
    }

    // ========================================================================
    // TEST 7: empty lists get a friendly line
    // ========================================================================
    #[test]
    fn test_format_empty_lists() {
        assert_eq!(format_recaps(&json!([])), "No recaps yet.\n");
        assert_eq!(format_gaps(&json!([])), "No knowledge gaps.\n");
        assert_eq!(format_evaluations(&json!([])), "No evaluations.\n");
    }

    // ========================================================================
    // TEST 8: recap lines show rating or a dash
    // ========================================================================
    #[test]
    fn test_format_recaps() {
        let data = json!([
            {"timestamp": "2026-10-01T08:00:00Z", "customer_name": "Budi", "category": "Informasi",
             "rating": 5, "summary": "Tanya jam layanan"},
            {"timestamp": "2026-10-01T09:00:00Z", "customer_name": null, "category": "Keberatan",
             "rating": null, "summary": "Keberatan informasi"}
        ]);
        let out = format_recaps(&data);
        assert!(out.contains("Budi  [Informasi] 5/5"));
        assert!(out.contains("-  [Keberatan] -"));
    }

    // ========================================================================
    // TEST 9: status lists handed-off chats
    // ========================================================================
    #[test]
    fn test_format_status() {
        let health = json!({"status": "healthy", "version": "0.1.0", "socket": "/tmp/ppid.sock"});
        let status = json!({
            "connected": true, "running": false, "provider": "groq", "sessions": 2,
            "index_chunks": 40,
            "handed_off": [{"chat_id": "62811@s.whatsapp.net", "name": "Sari"}]
        });
        let out = format_status(&health, &status);
        assert!(out.contains("Running:      false"));
        assert!(out.contains("Provider:     groq"));
        assert!(out.contains("62811@s.whatsapp.net  Sari"));
    }

    // ========================================================================
    // TEST 10: attachments are typed by extension and base64 encoded
    // ========================================================================
    #[test]
    fn test_reply_attachment_payload() {
        let cli = parse(&["reply", "62811@s.whatsapp.net", "--attach", "Formulir.PDF"]);
        match &cli.command {
            Commands::Reply { text, attach, .. } => {
                assert_eq!(text, "");
                assert_eq!(attach.as_deref(), Some("Formulir.PDF"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let media = media_payload(Path::new("/tmp/Formulir.PDF"), b"%PDF");
        assert_eq!(
            media,
            json!({"mimetype": "application/pdf", "filename": "Formulir.PDF", "data": "JVBERg=="})
        );
        assert_eq!(mimetype_for(Path::new("ktp.jpeg")), "image/jpeg");
        assert_eq!(mimetype_for(Path::new("arsip")), "application/octet-stream");
    }
}
