//! Prompts for extraction, table chat and the prompt helper.
//!
//! Every string the model sees is built here.

use crate::model::{Column, ColumnType};

/// System instruction for every extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a precise data extraction agent. You must extract data exactly as requested and respond only with valid JSON.";

/// Returned by chat when the model produced no text.
pub const CHAT_EMPTY_RESPONSE: &str = "No response generated.";

/// Returned by chat when anything went wrong.
pub const CHAT_ERROR_RESPONSE: &str =
    "I apologize, but I encountered an error while analyzing the data. Please try again.";

/// Format requirement for a column type. Exactly one instruction per type.
pub fn format_instruction(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Date => "Format the date as YYYY-MM-DD.",
        ColumnType::Boolean => "Return 'true' or 'false' as the value string.",
        ColumnType::Number => "Return a clean number string, removing currency symbols if needed.",
        ColumnType::List => "Return the items as a comma-separated string.",
        ColumnType::Text => "Keep the text concise.",
    }
}

/// Build the per-column extraction prompt with the mandated JSON shape.
pub fn extraction_prompt(column: &Column) -> String {
    format!(
        r#"Task: Extract specific information from the provided document.

Column Name: "{name}"
Extraction Instruction: {instruction}

Format Requirements:
- {format}
- Provide a confidence score (High/Medium/Low).
- Include the exact quote from the text where the answer is found.
- Provide a brief reasoning.

You MUST respond with valid JSON in exactly this format:
{{
  "value": "the extracted answer",
  "confidence": "High/Medium/Low",
  "quote": "exact text from document",
  "page": 1,
  "reasoning": "brief explanation"
}}"#,
        name = column.name,
        instruction = column.prompt,
        format = format_instruction(column.column_type),
    )
}

/// Prefix used when the document travels as text inside the user message.
pub fn inline_document(text: &str, prompt: &str) -> String {
    format!("DOCUMENT CONTENT:\n{text}\n\n{prompt}")
}

/// System instruction for table chat, wrapping the rendered data block.
pub fn chat_system_prompt(data_context: &str) -> String {
    format!(
        "You are an intelligent data analyst assistant.
You have access to a dataset extracted from documents (provided in context).

{data_context}

Instructions:
1. Answer the user's question based strictly on the provided data table.
2. If comparing documents, mention them by name.
3. If the data is missing or N/A, state that clearly.
4. Keep answers professional and concise."
    )
}

/// Ask the model to write an extraction instruction for a field.
pub fn suggest_prompt_request(name: &str, column_type: ColumnType, draft: Option<&str>) -> String {
    let draft_line = match draft.filter(|d| !d.trim().is_empty()) {
        Some(d) => format!("Draft Prompt: \"{d}\""),
        None => String::new(),
    };
    format!(
        r#"I need to configure a Large Language Model to extract a specific data field from business documents.

Field Name: "{name}"
Field Type: "{ty}"
{draft_line}

Please write a clear, effective prompt that I can send to the LLM to get the best extraction results for this field.
The prompt should describe what to look for and how to handle edge cases if applicable.
Return ONLY the prompt text, no conversational filler."#,
        ty = column_type.as_str(),
    )
}

/// Fallback instruction when the prompt helper cannot produce one.
pub fn default_column_prompt(name: &str) -> String {
    format!("Extract the {name} from the document.")
}
