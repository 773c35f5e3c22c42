//! Prompt templates and `{{name}}` substitution.

use std::collections::HashMap;

use super::types::{ChatMessage, Role};
use crate::core::models::DetailLevel;

/// A named pair of system/user text blocks containing `{{name}}` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub system: &'static str,
    pub user: &'static str,
    pub description: &'static str,
}

impl PromptTemplate {
    /// Substitutes `vars` into both blocks. Blocks that end up blank are omitted.
    #[must_use]
    pub fn render(&self, vars: &HashMap<&str, String>) -> Vec<ChatMessage> {
        [(Role::System, self.system), (Role::User, self.user)]
            .into_iter()
            .filter_map(|(role, block)| {
                let content = substitute(block, vars);
                (!content.trim().is_empty()).then(|| ChatMessage::new(role, content))
            })
            .collect()
    }
}

/// Single left-to-right pass. Substituted values are never rescanned, and
/// placeholders without a value are copied through verbatim.
#[must_use]
pub fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after_open[..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

pub const SUMMARY_BRIEF: PromptTemplate = PromptTemplate {
    name: "summary_brief",
    system: "You are an AI assistant that creates brief, concise summaries of team communication.\n\
Your summaries should be short (2-3 sentences) and capture only the most critical points.\n\
Format your response in clear, professional language.",
    user: "Please provide a brief summary of the following {{context_type}} in {{channel}} with {{message_count}} messages.\n\
Timeframe: {{timeframe}}\n\n\
Participants: {{participants}}\n\n\
Messages:\n{{messages}}\n\n\
Provide a 2-3 sentence summary highlighting only the most critical information.",
    description: "Two or three sentences, critical points only.",
};

pub const SUMMARY_STANDARD: PromptTemplate = PromptTemplate {
    name: "summary_standard",
    system: "You are an AI assistant that creates clear, informative summaries of team communication.\n\
Your summaries should be comprehensive but concise, capturing key points, decisions, and action items.\n\
Format your response with clear sections:\n\
- **Overview**: 1-2 sentence summary\n\
- **Key Points**: Bullet list of main discussion points\n\
- **Decisions Made**: Any decisions or conclusions reached\n\
- **Action Items**: Tasks or next steps mentioned (if any)\n\n\
Use Markdown formatting for readability.",
    user: "Please summarize the following {{context_type}} in {{channel}} with {{message_count}} messages.\n\
Timeframe: {{timeframe}}\n\n\
Participants: {{participants}}\n\n\
Messages:\n{{messages}}\n\n\
Provide a structured summary with Overview, Key Points, Decisions Made, and Action Items sections.",
    description: "Structured overview with key points, decisions and action items.",
};

pub const SUMMARY_DETAILED: PromptTemplate = PromptTemplate {
    name: "summary_detailed",
    system: "You are an AI assistant that creates comprehensive, detailed summaries of team communication.\n\
Your summaries should be thorough and capture all important information, context, and nuances.\n\
Format your response with clear sections:\n\
- **Overview**: 2-3 sentence summary\n\
- **Discussion Details**: Detailed breakdown of the conversation flow\n\
- **Key Points**: Comprehensive bullet list of all important points\n\
- **Participants & Roles**: Who contributed what\n\
- **Decisions Made**: All decisions and their rationale\n\
- **Action Items**: Detailed tasks with context\n\
- **Open Questions**: Unresolved issues or questions\n\n\
Use Markdown formatting for readability.",
    user: "Please provide a detailed summary of the following {{context_type}} in {{channel}} with {{message_count}} messages.\n\
Timeframe: {{timeframe}}\n\n\
Participants: {{participants}}\n\n\
Messages:\n{{messages}}\n\n\
Provide a comprehensive summary with all sections: Overview, Discussion Details, Key Points, \
Participants & Roles, Decisions Made, Action Items, and Open Questions.",
    description: "Full breakdown including roles and open questions.",
};

#[must_use]
pub const fn summary_template(detail: DetailLevel) -> &'static PromptTemplate {
    match detail {
        DetailLevel::Brief => &SUMMARY_BRIEF,
        DetailLevel::Standard => &SUMMARY_STANDARD,
        DetailLevel::Detailed => &SUMMARY_DETAILED,
    }
}
