//! Typed message content model.
//!
//! A `MessageBlock` is one message unit for one channel: the text, optional
//! media links, buttons, list items, variation messages and template
//! metadata. Blocks are immutable once decoded; validation covers the
//! channel-specific ceilings and the placeholder sequence rule.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::error::ValidationError;

pub const WHATSAPP_TEXT_LIMIT: usize = 4096;
pub const WHATSAPP_MEDIA_TEXT_LIMIT: usize = 1024;
pub const SMS_TEXT_LIMIT: usize = 160;
pub const USSD_TEXT_LIMIT: usize = 160;
pub const MESSENGER_TEXT_LIMIT: usize = 2000;
pub const VIBER_TEXT_LIMIT: usize = 7000;

pub const MAX_BUTTONS: usize = 3;
pub const MAX_LIST_ITEMS: usize = 10;
pub const MAX_LIST_ITEM_LENGTH: usize = 24;

/// One messaging surface with its own body content.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Web,
    Whatsapp,
    Sms,
    Ussd,
    Messenger,
    Viber,
}

impl Channel {
    /// The message-bearing channels, in export column order.
    pub const MESSAGING: [Channel; 5] = [
        Channel::Whatsapp,
        Channel::Sms,
        Channel::Ussd,
        Channel::Messenger,
        Channel::Viber,
    ];

    /// Maximum message length for a text-only message.
    pub fn text_limit(self) -> usize {
        match self {
            Channel::Web => usize::MAX,
            Channel::Whatsapp => WHATSAPP_TEXT_LIMIT,
            Channel::Sms | Channel::Ussd => SMS_TEXT_LIMIT,
            Channel::Messenger => MESSENGER_TEXT_LIMIT,
            Channel::Viber => VIBER_TEXT_LIMIT,
        }
    }

    /// Maximum message length when the block carries a media link.
    pub fn media_text_limit(self) -> usize {
        match self {
            Channel::Whatsapp => WHATSAPP_MEDIA_TEXT_LIMIT,
            other => other.text_limit(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Whatsapp => "whatsapp",
            Channel::Sms => "sms",
            Channel::Ussd => "ussd",
            Channel::Messenger => "messenger",
            Channel::Viber => "viber",
        }
    }
}

/// A message button. `NextMessage` advances within the page's message
/// sequence; `GoToPage` jumps to another page by slug.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    NextMessage { title: String },
    GoToPage { title: String, slug: String },
}

impl Button {
    pub fn title(&self) -> &str {
        match self {
            Button::NextMessage { title } => title,
            Button::GoToPage { title, .. } => title,
        }
    }
}

/// A user-segmentation dimension a variation message can be restricted to.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfileDimension {
    Gender,
    Age,
    Relationship,
}

impl ProfileDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileDimension::Gender => "gender",
            ProfileDimension::Age => "age",
            ProfileDimension::Relationship => "relationship",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim() {
            "gender" => Ok(ProfileDimension::Gender),
            "age" => Ok(ProfileDimension::Age),
            "relationship" => Ok(ProfileDimension::Relationship),
            other => Err(ValidationError::new(
                "variation_title",
                format!("unknown profile dimension '{other}'"),
            )),
        }
    }
}

/// Exactly one profile-dimension restriction on a variation message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Restriction {
    pub dimension: ProfileDimension,
    pub value: String,
}

/// An alternate rendering of a message for users matching one restriction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VariationMessage {
    pub restriction: Restriction,
    pub message: String,
}

/// One message unit for one channel.
///
/// Empty strings mean "absent" for the scalar fields; this mirrors the
/// spreadsheet cell representation, where unused cells are empty rather
/// than missing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct MessageBlock {
    pub message: String,
    #[serde(default)]
    pub next_prompt: String,
    #[serde(default)]
    pub buttons: Vec<Button>,
    #[serde(default)]
    pub example_values: Vec<String>,
    #[serde(default)]
    pub variation_messages: Vec<VariationMessage>,
    #[serde(default)]
    pub list_items: Vec<String>,
    #[serde(default)]
    pub footer: String,
    #[serde(default)]
    pub image_link: String,
    #[serde(default)]
    pub doc_link: String,
    #[serde(default)]
    pub media_link: String,
}

impl MessageBlock {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn has_media(&self) -> bool {
        !self.image_link.is_empty() || !self.doc_link.is_empty() || !self.media_link.is_empty()
    }

    /// Validate this block against a channel's ceilings.
    pub fn validate(
        &self,
        channel: Channel,
        profiles: &ProfileFieldConfig,
    ) -> Result<(), ValidationError> {
        let limit = if self.has_media() {
            channel.media_text_limit()
        } else {
            channel.text_limit()
        };
        if self.message.chars().count() > limit {
            return Err(ValidationError::new(
                "message",
                format!(
                    "{} message is too long: {} characters > {} allowed",
                    channel.as_str(),
                    self.message.chars().count(),
                    limit
                ),
            ));
        }

        let placeholder_count = check_placeholders(&self.message)?;
        if !self.example_values.is_empty() && self.example_values.len() != placeholder_count {
            return Err(ValidationError::new(
                "example_values",
                format!(
                    "{} example values given for {} placeholders",
                    self.example_values.len(),
                    placeholder_count
                ),
            ));
        }

        if self.buttons.len() > MAX_BUTTONS {
            return Err(ValidationError::new(
                "buttons",
                format!("too many buttons: {} > {}", self.buttons.len(), MAX_BUTTONS),
            ));
        }

        if self.list_items.len() > MAX_LIST_ITEMS {
            return Err(ValidationError::new(
                "list_items",
                format!(
                    "too many list items: {} > {}",
                    self.list_items.len(),
                    MAX_LIST_ITEMS
                ),
            ));
        }
        for item in &self.list_items {
            if item.chars().count() > MAX_LIST_ITEM_LENGTH {
                return Err(ValidationError::new(
                    "list_items",
                    format!(
                        "list item '{item}' is too long: {} characters > {}",
                        item.chars().count(),
                        MAX_LIST_ITEM_LENGTH
                    ),
                ));
            }
        }

        for variation in &self.variation_messages {
            profiles.validate(&variation.restriction)?;
            if variation.message.chars().count() > channel.text_limit() {
                return Err(ValidationError::new(
                    "variation_body",
                    format!(
                        "variation message is too long: {} characters > {}",
                        variation.message.chars().count(),
                        channel.text_limit()
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\d+)\}\}").unwrap())
}

/// Check that the `{{n}}` tokens in `message` form a contiguous sequence
/// `1..=k` with no gaps or duplicates, and return `k`. Order of first
/// appearance is irrelevant.
pub fn check_placeholders(message: &str) -> Result<usize, ValidationError> {
    let mut seen = BTreeSet::new();
    let mut total = 0usize;
    for cap in placeholder_re().captures_iter(message) {
        let n: u64 = cap[1].parse().map_err(|_| {
            ValidationError::new("message", format!("invalid placeholder token {}", &cap[0]))
        })?;
        if n == 0 {
            return Err(ValidationError::new(
                "message",
                "placeholder numbering starts at {{1}}",
            ));
        }
        if !seen.insert(n) {
            return Err(ValidationError::new(
                "message",
                format!("duplicate placeholder {{{{{n}}}}}"),
            ));
        }
        total += 1;
    }
    if let Some(&max) = seen.iter().next_back() {
        if max as usize != total {
            return Err(ValidationError::new(
                "message",
                format!("placeholder sequence has gaps: expected {{{{1}}}}..{{{{{total}}}}}"),
            ));
        }
    }
    Ok(total)
}

/// Site-configured valid values per profile dimension.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProfileFieldConfig {
    pub gender: Vec<String>,
    pub age: Vec<String>,
    pub relationship: Vec<String>,
}

impl Default for ProfileFieldConfig {
    fn default() -> Self {
        fn values(vals: &[&str]) -> Vec<String> {
            vals.iter().map(|v| v.to_string()).collect()
        }
        Self {
            gender: values(&["male", "female", "non-binary", "empty"]),
            age: values(&["15-18", "19-24", "empty"]),
            relationship: values(&["in_a_relationship", "single", "complicated", "empty"]),
        }
    }
}

impl ProfileFieldConfig {
    pub fn values(&self, dimension: ProfileDimension) -> &[String] {
        match dimension {
            ProfileDimension::Gender => &self.gender,
            ProfileDimension::Age => &self.age,
            ProfileDimension::Relationship => &self.relationship,
        }
    }

    pub fn validate(&self, restriction: &Restriction) -> Result<(), ValidationError> {
        if !self
            .values(restriction.dimension)
            .iter()
            .any(|v| v == &restriction.value)
        {
            return Err(ValidationError::new(
                "variation_title",
                format!(
                    "'{}' is not a valid {} value",
                    restriction.value,
                    restriction.dimension.as_str()
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_contiguous_ok() {
        assert_eq!(check_placeholders("no tokens here").unwrap(), 0);
        assert_eq!(check_placeholders("hi {{1}} bye {{2}}").unwrap(), 2);
        // Order of appearance does not matter.
        assert_eq!(check_placeholders("{{2}} then {{1}}").unwrap(), 2);
    }

    #[test]
    fn placeholders_gap_rejected() {
        let err = check_placeholders("{{1}}{{3}}").unwrap_err();
        assert_eq!(err.field, "message");
        assert!(err.message.contains("gaps"));
    }

    #[test]
    fn placeholders_duplicate_rejected() {
        let err = check_placeholders("{{1}}{{1}}").unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn placeholders_zero_rejected() {
        assert!(check_placeholders("{{0}}").is_err());
    }

    #[test]
    fn whatsapp_length_ceiling() {
        let profiles = ProfileFieldConfig::default();
        let ok = MessageBlock::text("a".repeat(WHATSAPP_TEXT_LIMIT));
        assert!(ok.validate(Channel::Whatsapp, &profiles).is_ok());

        let too_long = MessageBlock::text("a".repeat(WHATSAPP_TEXT_LIMIT + 1));
        let err = too_long.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn whatsapp_media_lowers_ceiling() {
        let profiles = ProfileFieldConfig::default();
        let mut block = MessageBlock::text("a".repeat(WHATSAPP_MEDIA_TEXT_LIMIT));
        block.image_link = "https://example.org/media/1".to_string();
        assert!(block.validate(Channel::Whatsapp, &profiles).is_ok());

        block.message.push('a');
        let err = block.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn sms_length_ceiling() {
        let profiles = ProfileFieldConfig::default();
        assert!(MessageBlock::text("a".repeat(SMS_TEXT_LIMIT))
            .validate(Channel::Sms, &profiles)
            .is_ok());
        assert!(MessageBlock::text("a".repeat(SMS_TEXT_LIMIT + 1))
            .validate(Channel::Ussd, &profiles)
            .is_err());
    }

    #[test]
    fn messenger_length_ceiling() {
        let profiles = ProfileFieldConfig::default();
        assert!(MessageBlock::text("a".repeat(MESSENGER_TEXT_LIMIT))
            .validate(Channel::Messenger, &profiles)
            .is_ok());
        let err = MessageBlock::text("a".repeat(MESSENGER_TEXT_LIMIT + 1))
            .validate(Channel::Messenger, &profiles)
            .unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn viber_length_ceiling() {
        let profiles = ProfileFieldConfig::default();
        assert!(MessageBlock::text("a".repeat(VIBER_TEXT_LIMIT))
            .validate(Channel::Viber, &profiles)
            .is_ok());
        let err = MessageBlock::text("a".repeat(VIBER_TEXT_LIMIT + 1))
            .validate(Channel::Viber, &profiles)
            .unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn button_count_ceiling() {
        let profiles = ProfileFieldConfig::default();
        let button = Button::NextMessage {
            title: "Next".to_string(),
        };
        let mut block = MessageBlock::text("hello");
        block.buttons = vec![button.clone(); MAX_BUTTONS];
        assert!(block.validate(Channel::Whatsapp, &profiles).is_ok());

        block.buttons.push(button);
        let err = block.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "buttons");
    }

    #[test]
    fn list_item_ceilings() {
        let profiles = ProfileFieldConfig::default();
        let mut block = MessageBlock::text("hello");
        block.list_items = (0..MAX_LIST_ITEMS).map(|i| format!("item {i}")).collect();
        assert!(block.validate(Channel::Whatsapp, &profiles).is_ok());

        block.list_items.push("one more".to_string());
        let err = block.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "list_items");

        let mut block = MessageBlock::text("hello");
        block.list_items = vec!["a".repeat(MAX_LIST_ITEM_LENGTH + 1)];
        let err = block.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "list_items");
    }

    #[test]
    fn example_values_must_match_placeholders() {
        let profiles = ProfileFieldConfig::default();
        let mut block = MessageBlock::text("hi {{1}}, meet {{2}}");
        block.example_values = vec!["Thandi".to_string(), "Sipho".to_string()];
        assert!(block.validate(Channel::Whatsapp, &profiles).is_ok());

        block.example_values.pop();
        let err = block.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "example_values");
    }

    #[test]
    fn restriction_values_validated() {
        let profiles = ProfileFieldConfig::default();
        let mut block = MessageBlock::text("hello");
        block.variation_messages.push(VariationMessage {
            restriction: Restriction {
                dimension: ProfileDimension::Gender,
                value: "female".to_string(),
            },
            message: "hello there".to_string(),
        });
        assert!(block.validate(Channel::Whatsapp, &profiles).is_ok());

        block.variation_messages[0].restriction.value = "unknown".to_string();
        let err = block.validate(Channel::Whatsapp, &profiles).unwrap_err();
        assert_eq!(err.field, "variation_title");
    }
}
