//! Chat transcripts posted by the support widget

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::store::Entity;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTranscript {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visitor_email: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for ChatTranscript {
    const COLLECTION: &'static str = "chatTranscripts";
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StoreTranscript {
    #[validate(length(max = 100))]
    pub visitor_name: Option<String>,
    #[validate(email)]
    pub visitor_email: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub messages: Vec<ChatMessage>,
}

impl StoreTranscript {
    pub fn into_transcript(self, user_id: Option<String>) -> ChatTranscript {
        ChatTranscript {
            id: String::new(),
            user_id,
            visitor_name: self.visitor_name,
            visitor_email: self.visitor_email,
            messages: self.messages,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Public widget settings handed to the storefront.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetConfig {
    pub property_id: Option<String>,
    pub widget_id: Option<String>,
}

impl WidgetConfig {
    /// Embed snippet for the tawk.to widget, or `None` until both ids are set.
    pub fn embed_script(&self) -> Option<String> {
        let (property, widget) = (self.property_id.as_deref()?, self.widget_id.as_deref()?);
        Some(format!(
            "var Tawk_API = Tawk_API || {{}}, Tawk_LoadStart = new Date();\n\
             (function(){{\n\
             var s1 = document.createElement(\"script\"), s0 = document.getElementsByTagName(\"script\")[0];\n\
             s1.async = true;\n\
             s1.src = 'https://embed.tawk.to/{property}/{widget}';\n\
             s1.charset = 'UTF-8';\n\
             s1.setAttribute('crossorigin', '*');\n\
             s0.parentNode.insertBefore(s1, s0);\n\
             }})();\n"
        ))
    }
}
