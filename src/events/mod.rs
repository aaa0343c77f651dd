//! Business events and the cache patterns they invalidate.
//!
//! Each variant carries exactly the payload other subsystems send for it.
//! Adding a variant forces a pattern list below, so no event can silently
//! invalidate nothing.

use serde_json::{Value, json};

use crate::error::CacheError;

/// Names of every known business event, in declaration order.
pub const EVENT_NAMES: [&str; 9] = [
    "compliance_check_completed",
    "contributor_updated",
    "user_logout",
    "user_login",
    "user_registered",
    "daily_sync",
    "invoice_processed",
    "notification_read",
    "settings_updated",
];

/// A domain occurrence that makes some cached reads stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusinessEvent {
    ComplianceCheckCompleted { cuit: String },
    ContributorUpdated { cuit: String },
    UserLogout,
    UserLogin { user_id: String },
    UserRegistered { email: String },
    DailySync,
    InvoiceProcessed { invoice_id: String, cuit: String },
    NotificationRead { user_id: String },
    SettingsUpdated { user_id: String },
}

impl BusinessEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ComplianceCheckCompleted { .. } => "compliance_check_completed",
            Self::ContributorUpdated { .. } => "contributor_updated",
            Self::UserLogout => "user_logout",
            Self::UserLogin { .. } => "user_login",
            Self::UserRegistered { .. } => "user_registered",
            Self::DailySync => "daily_sync",
            Self::InvoiceProcessed { .. } => "invoice_processed",
            Self::NotificationRead { .. } => "notification_read",
            Self::SettingsUpdated { .. } => "settings_updated",
        }
    }

    /// Cache patterns this event invalidates, in invalidation order.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            Self::ComplianceCheckCompleted { cuit } => vec![
                format!("compliance_{cuit}"),
                "compliance_dashboard".to_string(),
                format!("compliance_check_{cuit}"),
            ],
            Self::ContributorUpdated { cuit } => vec![
                format!("contributor_{cuit}"),
                "contributors_list".to_string(),
                format!("contributors_search_{cuit}"),
            ],
            Self::UserLogout => [
                "user_",
                "session_",
                "compliance_",
                "contributor_",
                "contributors_",
                "invoice_",
                "invoices_",
                "notifications_",
                "dashboard_",
            ]
            .map(String::from)
            .to_vec(),
            Self::UserLogin { user_id } => vec![
                format!("user_{user_id}"),
                "dashboard_data".to_string(),
                format!("notifications_{user_id}"),
            ],
            Self::UserRegistered { email } => {
                vec!["users_list".to_string(), format!("user_check_{email}")]
            }
            Self::DailySync => [
                "compliance_dashboard",
                "contributors_list",
                "invoices_list",
                "dashboard_data",
            ]
            .map(String::from)
            .to_vec(),
            Self::InvoiceProcessed { invoice_id, cuit } => vec![
                format!("invoice_{invoice_id}"),
                "invoices_list".to_string(),
                format!("invoices_{cuit}"),
                format!("compliance_{cuit}"),
                "dashboard_data".to_string(),
            ],
            Self::NotificationRead { user_id } => vec![
                format!("notifications_{user_id}"),
                format!("notifications_count_{user_id}"),
            ],
            Self::SettingsUpdated { user_id } => vec![
                format!("settings_{user_id}"),
                format!("user_settings_{user_id}"),
                format!("user_preferences_{user_id}"),
            ],
        }
    }

    /// The payload in its public JSON shape.
    pub fn payload(&self) -> Value {
        match self {
            Self::ComplianceCheckCompleted { cuit } | Self::ContributorUpdated { cuit } => {
                json!({ "cuit": cuit })
            }
            Self::UserLogout | Self::DailySync => json!({}),
            Self::UserLogin { user_id }
            | Self::NotificationRead { user_id }
            | Self::SettingsUpdated { user_id } => json!({ "userId": user_id }),
            Self::UserRegistered { email } => json!({ "email": email }),
            Self::InvoiceProcessed { invoice_id, cuit } => {
                json!({ "invoiceId": invoice_id, "cuit": cuit })
            }
        }
    }

    /// Build an event from its wire name and JSON payload.
    ///
    /// Identifiers may arrive as strings or numbers. Missing or empty
    /// identifiers are rejected, since an empty id would turn a targeted
    /// pattern such as `compliance_{cuit}` into a prefix over every entry.
    pub fn from_name(name: &str, data: &Value) -> Result<Self, CacheError> {
        let field = |key: &'static str| -> Result<String, CacheError> {
            let value = match data.get(key) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            if value.is_empty() {
                return Err(CacheError::InvalidPayload {
                    event: name.to_string(),
                    field: key,
                });
            }
            Ok(value)
        };

        let event = match name {
            "compliance_check_completed" => Self::ComplianceCheckCompleted { cuit: field("cuit")? },
            "contributor_updated" => Self::ContributorUpdated { cuit: field("cuit")? },
            "user_logout" => Self::UserLogout,
            "user_login" => Self::UserLogin { user_id: field("userId")? },
            "user_registered" => Self::UserRegistered { email: field("email")? },
            "daily_sync" => Self::DailySync,
            "invoice_processed" => Self::InvoiceProcessed {
                invoice_id: field("invoiceId")?,
                cuit: field("cuit")?,
            },
            "notification_read" => Self::NotificationRead { user_id: field("userId")? },
            "settings_updated" => Self::SettingsUpdated { user_id: field("userId")? },
            other => return Err(CacheError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}
