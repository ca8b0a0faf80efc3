//! Free-text clinic note to structured SOAP note conversion

use clinic_core::consultation::SoapNote;

use super::client::AiClient;

const SYSTEM_PROMPT: &str = r#"You are a clinical documentation assistant. Restructure the free-text clinic note you are given into a SOAP note.

Return ONLY a JSON object with these keys:
- "subjective": string (what the patient reports: history, symptoms, concerns)
- "objective": string (examination findings, vitals, test results mentioned)
- "assessment": string (the clinician's impression or diagnosis)
- "plan": string (treatment, prescriptions, follow-up, referrals)

Keep the clinician's wording where possible. Do not invent findings that are not in the note. If a section has no content, use an empty string.

Return ONLY the JSON object, no other text."#;

/// Rewrite a free-text note into SOAP sections.
pub async fn rewrite(
    client: &AiClient,
    text: &str,
    style: Option<&str>,
) -> Result<SoapNote, String> {
    let user_message = match style {
        Some(style) => format!("Style preference: {}\n\nNote:\n{}", style, text),
        None => format!("Note:\n{}", text),
    };

    let response = client.chat(SYSTEM_PROMPT, &user_message).await?;

    // Parse the JSON from the model's response (may be wrapped in markdown)
    let json_str = extract_json(&response)?;

    serde_json::from_str(&json_str).map_err(|e| format!("Failed to parse SOAP sections: {}", e))
}

/// Extract a JSON object from text that might contain markdown code blocks
fn extract_json(text: &str) -> Result<String, String> {
    let trimmed = text.trim();

    // Direct JSON object
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }

    // Wrapped in ```json ... ```
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return Ok(after[..end].trim().to_string());
        }
    }

    // Wrapped in ``` ... ```
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return Ok(after[..end].trim().to_string());
        }
    }

    Err(format!("Could not extract JSON from response: {}", trimmed))
}
