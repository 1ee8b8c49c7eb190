//! System instruction assembly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::ProjectRecord;

/// Substrings (matched case-insensitively) that mark a message as a project inquiry.
pub const LOOKUP_KEYWORDS: &[&str] = &[
    "project",
    "status",
    "progress",
    "installation",
    "my order",
    "timeline",
];

const NOT_SPECIFIED: &str = "Not specified";

pub fn mentions_project(message: &str) -> bool {
    let lowered = message.to_lowercase();
    LOOKUP_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub company: String,
    pub domain: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Ava".into(),
            company: "Aveyo".into(),
            domain: "solar energy".into(),
        }
    }
}

/// Location fields conventionally carried in the upstream payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Location {
    pub fn from_record(record: &ProjectRecord) -> Self {
        let field = |name: &str| {
            record
                .payload_field(name)
                .unwrap_or_else(|| NOT_SPECIFIED.to_string())
        };
        Self {
            address: field("address"),
            city: field("city"),
            state: field("state"),
            zip: field("zip"),
        }
    }

    pub fn one_line(&self) -> String {
        format!("{}, {}, {} {}", self.address, self.city, self.state, self.zip)
    }
}

pub fn build_system_prompt(
    persona: &Persona,
    customer_email: Option<&str>,
    records: &[ProjectRecord],
) -> String {
    let mut out = format!(
        "You are {name}, a knowledgeable and friendly AI assistant for {company}, a {domain} company. \
Your primary role is to help customers with questions about installation, project status, financing, \
maintenance, permits, and general {domain} topics.\n\n\
Key responsibilities:\n\
- Answer questions about the installation process\n\
- Provide project status updates when customers provide their information\n\
- Explain financing options and incentives\n\
- Help with maintenance and troubleshooting questions\n\
- Assist with permit and regulatory questions\n\
- Be friendly, professional, and knowledgeable about {domain}\n",
        name = persona.name,
        company = persona.company,
        domain = persona.domain,
    );

    if let Some(email) = customer_email {
        out.push_str(&format!(
            "\nCUSTOMER CONTEXT: You are currently speaking with a logged-in customer whose email is {email}. \
You can reference this email when they ask about their account or personal information.\n"
        ));
    }

    out.push('\n');
    if records.is_empty() {
        out.push_str(
            "No project records are available for this conversation. If customers ask about specific \
project status, ask them to provide their email address so you can look up their project \
information. Never invent project details.\n",
        );
    } else {
        render_records(&mut out, records);
    }

    out.push_str(&format!(
        "\nAlways be helpful, accurate, and professional in your responses. If asked about topics outside \
of {domain}, politely redirect the conversation back to how {company} can help with their {domain} needs.",
        domain = persona.domain,
        company = persona.company,
    ));
    out
}

fn render_records(out: &mut String, records: &[ProjectRecord]) {
    let summary: Vec<Value> = records
        .iter()
        .map(|r| {
            serde_json::json!({
                "id": r.id,
                "email": r.email,
                "project_id": r.project_id,
                "milestone": r.milestone,
                "raw_payload": r.raw_payload,
                "updated_at": r.updated_at,
            })
        })
        .collect();
    let summary = serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "[]".into());

    out.push_str("IMPORTANT: The customer is asking about project status. Here is the current project data from our database:\n\n");
    out.push_str("PROJECT RECORDS:\n");
    out.push_str(&summary);
    out.push_str("\n\nDETAILED PROJECT DATA:\n");
    let details: Vec<String> = records.iter().map(render_detail).collect();
    out.push_str(&details.join("\n\n"));
    out.push_str(
        "\n\nANALYSIS INSTRUCTIONS:\n\
- Use the milestone field to determine the current project stage (Pre-approvals, Approvals, Construction, Energization)\n\
- Extract address details from the payload fields: address, city, state, zip\n\
- Use the payload for system size, installation dates, permits, and custom project details\n\
- Provide timeline estimates based on the current milestone and location\n\
- NEVER ask for additional customer information when project data is already provided\n\
- Reference project_id when discussing specific project details\n\n\
PROJECT MILESTONE INTERPRETATION:\n\
1. Pre-approvals: Initial permits and approvals before construction\n\
2. Approvals: Final approvals obtained, ready for construction\n\
3. Construction: Physical installation of the system underway\n\
4. Energization: System activation and grid connection complete\n",
    );
}

fn render_detail(record: &ProjectRecord) -> String {
    let Some(payload) = record.parsed_payload.as_ref() else {
        return format!(
            "Project ID: {} - No detailed project data available",
            record.project_id
        );
    };
    let location = Location::from_record(record);
    let payload = serde_json::to_string_pretty(payload).unwrap_or_default();
    format!(
        "Project ID: {}\nCustomer Email: {}\nCurrent Milestone: {}\nCUSTOMER ADDRESS: {}\nLast Updated: {}\nProject Data: {}",
        record.project_id,
        record.email.as_deref().unwrap_or(NOT_SPECIFIED),
        record.milestone.as_deref().unwrap_or(NOT_SPECIFIED),
        location.one_line(),
        record
            .updated_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        payload,
    )
}
