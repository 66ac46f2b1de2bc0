//! Block Codec: conversion between `MessageBlock`s and their flattened
//! spreadsheet-cell encoding.
//!
//! `decode_message` and `encode_message` form a round-trip pair: decoding an
//! encoded block yields an equal block, and re-encoding a decoded row yields
//! the same cells. A WhatsApp message spreads over several cells (body,
//! buttons, list items, next prompt, example values, media links, footer);
//! the other channels carry plain text bodies.

use crate::blocks::{
    Channel, MessageBlock, ProfileDimension, ProfileFieldConfig, Restriction, VariationMessage,
};
use crate::error::ValidationError;
use crate::rows::ContentRow;

/// Decode one channel's message from a row, if the row carries one.
/// The decoded block is validated against the channel's ceilings.
pub fn decode_message(
    channel: Channel,
    row: &ContentRow,
    profiles: &ProfileFieldConfig,
) -> Result<Option<MessageBlock>, ValidationError> {
    let block = match channel {
        Channel::Web => return Ok(None),
        Channel::Whatsapp => {
            if row.whatsapp_body.is_empty() {
                return Ok(None);
            }
            MessageBlock {
                message: row.whatsapp_body.clone(),
                next_prompt: row.next_prompt.clone(),
                buttons: row.buttons.clone(),
                example_values: row.example_values.clone(),
                variation_messages: Vec::new(),
                list_items: row.list_items.clone(),
                footer: row.footer.clone(),
                image_link: row.image_link.clone(),
                doc_link: row.doc_link.clone(),
                media_link: row.media_link.clone(),
            }
        }
        Channel::Sms => {
            if row.sms_body.is_empty() {
                return Ok(None);
            }
            MessageBlock::text(row.sms_body.clone())
        }
        Channel::Ussd => {
            if row.ussd_body.is_empty() {
                return Ok(None);
            }
            MessageBlock::text(row.ussd_body.clone())
        }
        Channel::Messenger => {
            if row.messenger_body.is_empty() {
                return Ok(None);
            }
            MessageBlock::text(row.messenger_body.clone())
        }
        Channel::Viber => {
            if row.viber_body.is_empty() {
                return Ok(None);
            }
            MessageBlock::text(row.viber_body.clone())
        }
    };
    block.validate(channel, profiles)?;
    Ok(Some(block))
}

/// Write one channel's message into a row's cells, the inverse of
/// `decode_message`. Variations are encoded separately, one row each.
pub fn encode_message(channel: Channel, block: &MessageBlock, row: &mut ContentRow) {
    match channel {
        Channel::Web => {}
        Channel::Whatsapp => {
            row.whatsapp_body = block.message.clone();
            row.next_prompt = block.next_prompt.clone();
            row.buttons = block.buttons.clone();
            row.example_values = block.example_values.clone();
            row.list_items = block.list_items.clone();
            row.footer = block.footer.clone();
            row.image_link = block.image_link.clone();
            row.doc_link = block.doc_link.clone();
            row.media_link = block.media_link.clone();
        }
        Channel::Sms => row.sms_body = block.message.clone(),
        Channel::Ussd => row.ussd_body = block.message.clone(),
        Channel::Messenger => row.messenger_body = block.message.clone(),
        Channel::Viber => row.viber_body = block.message.clone(),
    }
}

/// Decode a variation row into a `VariationMessage`. The `variation_title`
/// cell must name exactly one profile-dimension restriction.
pub fn decode_variation(
    row: &ContentRow,
    profiles: &ProfileFieldConfig,
) -> Result<VariationMessage, ValidationError> {
    let (dimension, value) = match row.variation_title.as_slice() {
        [(dimension, value)] => (ProfileDimension::parse(dimension)?, value.clone()),
        [] => {
            return Err(ValidationError::new(
                "variation_title",
                "variation message has no restriction",
            ))
        }
        many => {
            return Err(ValidationError::new(
                "variation_title",
                format!(
                    "variation message must carry exactly one restriction, got {}",
                    many.len()
                ),
            ))
        }
    };
    let restriction = Restriction { dimension, value };
    profiles.validate(&restriction)?;
    Ok(VariationMessage {
        restriction,
        message: row.variation_body.clone(),
    })
}

/// Write a variation into a row's cells, the inverse of `decode_variation`.
pub fn encode_variation(variation: &VariationMessage, row: &mut ContentRow) {
    row.variation_title = vec![(
        variation.restriction.dimension.as_str().to_string(),
        variation.restriction.value.clone(),
    )];
    row.variation_body = variation.message.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::Button;

    fn profiles() -> ProfileFieldConfig {
        ProfileFieldConfig::default()
    }

    #[test]
    fn whatsapp_round_trip() {
        let block = MessageBlock {
            message: "Hello {{1}}, welcome".to_string(),
            next_prompt: "More".to_string(),
            buttons: vec![
                Button::NextMessage {
                    title: "Next".to_string(),
                },
                Button::GoToPage {
                    title: "Menu".to_string(),
                    slug: "main-menu".to_string(),
                },
            ],
            example_values: vec!["Thandi".to_string()],
            variation_messages: Vec::new(),
            list_items: vec!["Eat well".to_string(), "Sleep".to_string()],
            footer: "reply STOP to opt out".to_string(),
            image_link: "https://example.org/media/7".to_string(),
            doc_link: String::new(),
            media_link: String::new(),
        };

        let mut row = ContentRow::default();
        encode_message(Channel::Whatsapp, &block, &mut row);
        let decoded = decode_message(Channel::Whatsapp, &row, &profiles())
            .unwrap()
            .unwrap();
        assert_eq!(decoded, block);

        let mut row2 = ContentRow::default();
        encode_message(Channel::Whatsapp, &decoded, &mut row2);
        assert_eq!(row2, row);
    }

    #[test]
    fn plain_channels_round_trip() {
        for channel in [Channel::Sms, Channel::Ussd, Channel::Messenger, Channel::Viber] {
            let block = MessageBlock::text("A short message");
            let mut row = ContentRow::default();
            encode_message(channel, &block, &mut row);
            let decoded = decode_message(channel, &row, &profiles()).unwrap().unwrap();
            assert_eq!(decoded, block);
        }
    }

    #[test]
    fn empty_body_decodes_to_none() {
        let row = ContentRow::default();
        assert_eq!(
            decode_message(Channel::Whatsapp, &row, &profiles()).unwrap(),
            None
        );
        assert_eq!(decode_message(Channel::Sms, &row, &profiles()).unwrap(), None);
    }

    #[test]
    fn decode_applies_ceilings() {
        let row = ContentRow {
            sms_body: "a".repeat(161),
            ..Default::default()
        };
        let err = decode_message(Channel::Sms, &row, &profiles()).unwrap_err();
        assert_eq!(err.field, "message");
    }

    #[test]
    fn variation_round_trip() {
        let variation = VariationMessage {
            restriction: Restriction {
                dimension: ProfileDimension::Relationship,
                value: "single".to_string(),
            },
            message: "Hey single person".to_string(),
        };
        let mut row = ContentRow::default();
        encode_variation(&variation, &mut row);
        assert_eq!(row.variation_title.len(), 1);
        let decoded = decode_variation(&row, &profiles()).unwrap();
        assert_eq!(decoded, variation);
    }

    #[test]
    fn variation_needs_exactly_one_restriction() {
        let mut row = ContentRow {
            variation_body: "hello".to_string(),
            ..Default::default()
        };
        assert!(decode_variation(&row, &profiles()).is_err());

        row.variation_title = vec![
            ("gender".to_string(), "female".to_string()),
            ("age".to_string(), "15-18".to_string()),
        ];
        let err = decode_variation(&row, &profiles()).unwrap_err();
        assert!(err.message.contains("exactly one"));
    }

    #[test]
    fn variation_unknown_dimension_rejected() {
        let row = ContentRow {
            variation_body: "hello".to_string(),
            variation_title: vec![("starsign".to_string(), "leo".to_string())],
            ..Default::default()
        };
        let err = decode_variation(&row, &profiles()).unwrap_err();
        assert_eq!(err.field, "variation_title");
    }
}
