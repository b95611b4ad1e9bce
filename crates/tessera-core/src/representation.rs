//! Masked per-digit projection of a PIN entry buffer

use serde::{Deserialize, Serialize};

/// What the presentation layer draws for one PIN slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "character", rename_all = "camelCase")]
pub enum PinCharacterRepresentation {
    /// Required slot, not yet reached
    Unset,
    /// Required slot that receives the next character
    UnsetActive,
    /// Optional slot beyond the minimum, not yet reached
    UnsetOptional,
    /// Optional slot that receives the next character
    UnsetOptionalActive,
    /// Entered character, masked
    SetHidden,
    /// Entered character, shown in clear
    Set(char),
}

impl PinCharacterRepresentation {
    /// Whether the slot holds an entered character
    pub fn is_set(&self) -> bool {
        matches!(self, Self::SetHidden | Self::Set(_))
    }

    /// Whether the slot discloses the entered character
    pub fn reveals_character(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Terminal glyph for the slot
    pub fn glyph(&self) -> char {
        match self {
            Self::Unset => '○',
            Self::UnsetActive => '◎',
            Self::UnsetOptional => '·',
            Self::UnsetOptionalActive => '◦',
            Self::SetHidden => '●',
            Self::Set(c) => *c,
        }
    }
}

/// Slot rendering options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProjectionOptions {
    pub reveal: bool,
    pub show_optional_slots: bool,
}

/// Project the entry buffer onto slots.
///
/// Every entered character becomes `SetHidden` (or `Set` when revealing).
/// Below the minimum, one `UnsetActive` follows, then `Unset` up to the
/// minimum. Optional slots up to the maximum are only drawn on request.
pub fn project(
    pin: &str,
    min_length: Option<usize>,
    max_length: Option<usize>,
    options: ProjectionOptions,
) -> Vec<PinCharacterRepresentation> {
    let mut slots: Vec<PinCharacterRepresentation> = pin
        .chars()
        .map(|c| {
            if options.reveal {
                PinCharacterRepresentation::Set(c)
            } else {
                PinCharacterRepresentation::SetHidden
            }
        })
        .collect();
    let len = slots.len();

    match (min_length, max_length) {
        (Some(min), _) if len < min => {
            slots.push(PinCharacterRepresentation::UnsetActive);
            slots.extend(std::iter::repeat(PinCharacterRepresentation::Unset).take(min - len - 1));
        }
        (_, Some(max)) if options.show_optional_slots && len < max => {
            slots.push(PinCharacterRepresentation::UnsetOptionalActive);
            slots.extend(
                std::iter::repeat(PinCharacterRepresentation::UnsetOptional).take(max - len - 1),
            );
        }
        _ => {}
    }

    slots
}

/// Render slots as a bracketed terminal string, e.g. `[ ● ● ◎ ○ ]`
pub fn render(slots: &[PinCharacterRepresentation]) -> String {
    let body: Vec<String> = slots.iter().map(|s| s.glyph().to_string()).collect();
    format!("[ {} ]", body.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use PinCharacterRepresentation::*;

    #[test]
    fn test_empty_buffer_fixed_length() {
        let slots = project("", Some(6), Some(6), ProjectionOptions::default());
        assert_eq!(slots, vec![UnsetActive, Unset, Unset, Unset, Unset, Unset]);
    }

    #[test]
    fn test_partial_buffer_masks_digits() {
        let slots = project("12", Some(6), Some(6), ProjectionOptions::default());
        assert_eq!(slots, vec![SetHidden, SetHidden, UnsetActive, Unset, Unset, Unset]);
    }

    #[test]
    fn test_full_buffer_has_no_placeholders() {
        let slots = project("123456", Some(6), Some(6), ProjectionOptions::default());
        assert_eq!(slots, vec![SetHidden; 6]);
        assert!(slots.iter().all(|s| !s.reveals_character()));
    }

    #[test]
    fn test_no_minimum_means_no_placeholders() {
        let slots = project("12", None, Some(6), ProjectionOptions::default());
        assert_eq!(slots, vec![SetHidden, SetHidden]);
    }

    #[test]
    fn test_optional_slots_on_request() {
        let options = ProjectionOptions {
            show_optional_slots: true,
            ..Default::default()
        };
        let slots = project("1234", Some(4), Some(6), options);
        assert_eq!(
            slots,
            vec![SetHidden, SetHidden, SetHidden, SetHidden, UnsetOptionalActive, UnsetOptional]
        );

        // Below the minimum the required placeholders take precedence
        let slots = project("1", Some(4), Some(6), options);
        assert_eq!(slots, vec![SetHidden, UnsetActive, Unset, Unset]);
    }

    #[test]
    fn test_reveal_shows_characters() {
        let options = ProjectionOptions {
            reveal: true,
            ..Default::default()
        };
        let slots = project("42", Some(4), Some(4), options);
        assert_eq!(slots, vec![Set('4'), Set('2'), UnsetActive, Unset]);
    }

    #[test]
    fn test_render() {
        let slots = project("1", Some(3), Some(3), ProjectionOptions::default());
        assert_eq!(render(&slots), "[ ● ◎ ○ ]");
    }

    #[test]
    fn test_serialization_shape() {
        let json = serde_json::to_string(&Set('7')).unwrap();
        assert_eq!(json, r#"{"state":"set","character":"7"}"#);
        let json = serde_json::to_string(&UnsetActive).unwrap();
        assert_eq!(json, r#"{"state":"unsetActive"}"#);
    }
}
