//! Free-form questions over the extracted table.
//!
//! The whole table is rendered as CSV into the system instruction on every
//! call; prior turns are replayed as-is. [`chat`] never fails: any error is
//! logged and answered with a fixed apology.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::model::{ChatTurn, Column, Document, ExtractionResult};
use crate::pipeline::llm::{resolve_provider, Message, MessageContent, MessageRequest};
use crate::prompts;
use tracing::{debug, error};

/// The table a chat question is asked about.
#[derive(Debug, Clone, Copy)]
pub struct ChatContext<'a> {
    pub documents: &'a [Document],
    pub columns: &'a [Column],
    pub results: &'a ExtractionResult,
}

/// Render the table as CSV: a `Document Name` column, then one per column.
///
/// Commas inside values become spaces; cells never extracted read `N/A`.
pub fn render_table_csv(context: &ChatContext<'_>) -> String {
    let mut out = String::new();
    let header: Vec<&str> = std::iter::once("Document Name")
        .chain(context.columns.iter().map(|c| c.name.as_str()))
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for doc in context.documents {
        let mut row = vec![doc.name.clone()];
        for col in context.columns {
            let value = match context.results.get(&doc.id, &col.id) {
                Some(cell) => cell.value.replace(',', " "),
                None => "N/A".to_string(),
            };
            row.push(value);
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// The `CURRENT EXTRACTION DATA` block embedded in the system instruction.
pub fn data_context(context: &ChatContext<'_>) -> String {
    let documents: Vec<&str> = context.documents.iter().map(|d| d.name.as_str()).collect();
    let columns: Vec<&str> = context.columns.iter().map(|c| c.name.as_str()).collect();
    format!(
        "CURRENT EXTRACTION DATA:\nDocuments: {}\nColumns: {}\n\nDATA TABLE (CSV Format):\n{}",
        documents.join(", "),
        columns.join(", "),
        render_table_csv(context)
    )
}

/// Answer `message` about the table, given the prior `history`.
pub async fn chat(
    message: &str,
    context: &ChatContext<'_>,
    history: &[ChatTurn],
    config: &ExtractionConfig,
) -> String {
    match try_chat(message, context, history, config).await {
        Ok(answer) => answer,
        Err(e) => {
            error!("Chat analysis error: {}", e);
            prompts::CHAT_ERROR_RESPONSE.to_string()
        }
    }
}

async fn try_chat(
    message: &str,
    context: &ChatContext<'_>,
    history: &[ChatTurn],
    config: &ExtractionConfig,
) -> Result<String, ExtractError> {
    let provider = resolve_provider(config)?;

    let mut messages: Vec<Message> = history
        .iter()
        .map(|turn| Message {
            role: turn.role.into(),
            content: MessageContent::Text(turn.content.clone()),
        })
        .collect();
    messages.push(Message::user(message));

    let request = MessageRequest {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        system: Some(prompts::chat_system_prompt(&data_context(context))),
        messages,
    };
    debug!("Chat request with {} prior turns", history.len());

    let reply = provider.create_message(&request).await?;
    Ok(match reply.first_text() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => prompts::CHAT_EMPTY_RESPONSE.to_string(),
    })
}
