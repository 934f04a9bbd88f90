//! Fault-to-Complaint Mapping

use crate::ports::IncidentDraft;
use serde::{Deserialize, Serialize};
use telemetry::FaultCandidate;

/// Templates and defaults for rendering a fault into a complaint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintMapping {
    /// Title template with `{{Placeholder}}` substitution.
    pub title_template: String,
    pub description_template: String,
    /// Status newly created complaints start in.
    pub default_status: String,
    /// Priority used when the alarm kind maps to nothing.
    pub default_priority: String,
    /// Complaint type used when the rule carries no override.
    pub default_complaint_type: String,
}

impl Default for ComplaintMapping {
    fn default() -> Self {
        Self {
            title_template: "{{Description}} at RTU {{RtuId}}".to_string(),
            description_template:
                "{{Description}}: tag {{TagNumber}} reported {{Value}} ({{AlarmType}})".to_string(),
            default_status: "REGISTERED".to_string(),
            default_priority: "MEDIUM".to_string(),
            default_complaint_type: "Street Lighting".to_string(),
        }
    }
}

/// Renders a candidate into the draft handed to the incident store.
pub fn map_candidate(candidate: &FaultCandidate, mapping: &ComplaintMapping) -> IncidentDraft {
    let title = render(&mapping.title_template, candidate);
    let description = render(&mapping.description_template, candidate);

    let tags = serde_json::json!({
        "rtuId": candidate.unit_id,
        "tag": candidate.tag,
        "rawType": candidate.alarm_kind,
        "value": candidate.value,
    })
    .to_string();

    IncidentDraft {
        title,
        description,
        status: mapping.default_status.clone(),
        priority: map_priority(&candidate.alarm_kind)
            .unwrap_or(&mapping.default_priority)
            .to_string(),
        complaint_type: candidate
            .complaint_type
            .clone()
            .unwrap_or_else(|| mapping.default_complaint_type.clone()),
        tags,
    }
}

fn render(template: &str, candidate: &FaultCandidate) -> String {
    let (fault_count, total_count, percent) = match &candidate.stats {
        Some(s) => (
            s.match_count.to_string(),
            s.sample_count.to_string(),
            s.percent_display(),
        ),
        None => ("0".to_string(), "0".to_string(), "0.00".to_string()),
    };

    let pairs = [
        ("{{Description}}", candidate.description.as_str()),
        ("{{TagNumber}}", candidate.tag.as_str()),
        ("{{AlarmType}}", candidate.alarm_kind.as_str()),
        ("{{RtuId}}", candidate.unit_id.as_str()),
    ];

    let mut out = template.to_string();
    for (needle, value) in pairs {
        out = out.replace(needle, value);
    }
    out = out.replace("{{Value}}", &candidate.value.normalized());
    out = out.replace("{{FaultCount}}", &fault_count);
    out = out.replace("{{TotalCount}}", &total_count);
    out = out.replace("{{Percent}}", &percent);
    out
}

fn map_priority(alarm_kind: &str) -> Option<&'static str> {
    match alarm_kind.to_uppercase().as_str() {
        "CRITICAL" => Some("CRITICAL"),
        "MAJOR" => Some("HIGH"),
        "MINOR" | "WARN" | "WARNING" => Some("MEDIUM"),
        "INFO" | "STATUS" | "LOW" => Some("LOW"),
        _ => None,
    }
}
