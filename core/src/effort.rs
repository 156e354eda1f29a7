//! Reasoning-effort detection over free-form provider vocabulary.
//!
//! Providers spell effort levels however they like ("x-high", "Very High",
//! "2", "gpt-5/high", "Opus (max)"). This module maps those spellings onto
//! [`ThinkingBudgetLevel`] and answers "which choice do I send for level L"
//! when the provider does not offer L exactly.

use std::mem;

use weft_types::ThinkingBudgetLevel;

use crate::config_options::ConfigChoice;

/// Split on anything that is not alphanumeric and on lower→upper camel
/// boundaries, lowercasing every token.
pub(crate) fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Detect an effort level named anywhere in `text`.
///
/// Extra-high spellings are checked before plain "high" so that
/// "very high" never reads as `High`. A bare integer `0..=4` maps onto the
/// five levels in order.
#[must_use]
pub fn detect_level(text: &str) -> Option<ThinkingBudgetLevel> {
    let trimmed = text.trim();
    if let Ok(rank) = trimmed.parse::<usize>() {
        return ThinkingBudgetLevel::from_rank(rank);
    }

    let words = tokens(trimmed);
    let has = |word: &str| words.iter().any(|w| w == word);
    let has_pair = |first: &str, second: &str| {
        words
            .windows(2)
            .any(|pair| pair[0] == first && pair[1] == second)
    };

    if has("xhigh")
        || has_pair("x", "high")
        || has_pair("extra", "high")
        || has_pair("very", "high")
        || has("max")
        || has("maximum")
    {
        return Some(ThinkingBudgetLevel::XHigh);
    }
    if has("minimal") || has("min") || has("none") || has("off") {
        return Some(ThinkingBudgetLevel::Minimal);
    }
    if has("low") {
        return Some(ThinkingBudgetLevel::Low);
    }
    if has("medium") || has("med") || has("normal") || has("moderate") {
        return Some(ThinkingBudgetLevel::Medium);
    }
    if has("high") {
        return Some(ThinkingBudgetLevel::High);
    }
    None
}

/// Level of a choice, preferring its value over its label.
#[must_use]
pub fn choice_level(choice: &ConfigChoice) -> Option<ThinkingBudgetLevel> {
    detect_level(&choice.value).or_else(|| choice.label.as_deref().and_then(detect_level))
}

/// Pick the best available level for `wanted`: exact, else the nearest lower
/// level, else the nearest higher one.
fn nearest<T>(
    available: impl IntoIterator<Item = (ThinkingBudgetLevel, T)>,
    wanted: ThinkingBudgetLevel,
) -> Option<T> {
    let mut below: Option<(ThinkingBudgetLevel, T)> = None;
    let mut above: Option<(ThinkingBudgetLevel, T)> = None;
    for (level, item) in available {
        if level == wanted {
            return Some(item);
        }
        if level < wanted {
            if below.as_ref().is_none_or(|(best, _)| level > *best) {
                below = Some((level, item));
            }
        } else if above.as_ref().is_none_or(|(best, _)| level < *best) {
            above = Some((level, item));
        }
    }
    below.or(above).map(|(_, item)| item)
}

/// Bidirectional mapping between effort levels and an option's choices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffortMap {
    entries: Vec<(ThinkingBudgetLevel, ConfigChoice)>,
}

impl EffortMap {
    /// The first choice detected for a level claims it; later duplicates are
    /// ignored. Entries are kept in level order.
    #[must_use]
    pub fn from_choices(choices: &[ConfigChoice]) -> Self {
        let mut entries: Vec<(ThinkingBudgetLevel, ConfigChoice)> = Vec::new();
        for choice in choices {
            if let Some(level) = choice_level(choice)
                && !entries.iter().any(|(existing, _)| *existing == level)
            {
                entries.push((level, choice.clone()));
            }
        }
        entries.sort_by_key(|(level, _)| *level);
        Self { entries }
    }

    /// A control needs at least two distinct levels to be worth exposing.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.entries.len() >= 2
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn levels(&self) -> impl Iterator<Item = ThinkingBudgetLevel> + '_ {
        self.entries.iter().map(|(level, _)| *level)
    }

    #[must_use]
    pub fn choice_for(&self, level: ThinkingBudgetLevel) -> Option<&ConfigChoice> {
        nearest(
            self.entries.iter().map(|(level, choice)| (*level, choice)),
            level,
        )
    }

    #[must_use]
    pub fn level_of(&self, value: &str) -> Option<ThinkingBudgetLevel> {
        self.entries
            .iter()
            .find(|(_, choice)| choice.value == value)
            .map(|(level, _)| *level)
    }
}

/// A model choice split into its base model and the effort it encodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVariant {
    /// The choice value to send back to the agent.
    pub value: String,
    pub base_id: String,
    pub effort: Option<ThinkingBudgetLevel>,
}

impl ModelVariant {
    /// Recognizes `base/effort` values and `Label (effort)` labels. Anything
    /// else is its own base with no effort.
    #[must_use]
    pub fn from_choice(choice: &ConfigChoice) -> Self {
        if let Some((base, suffix)) = choice.value.rsplit_once('/')
            && let Some(level) = detect_level(suffix)
        {
            return Self {
                value: choice.value.clone(),
                base_id: base.to_string(),
                effort: Some(level),
            };
        }
        if let Some(label) = choice.label.as_deref()
            && let Some((base, rest)) = label.rsplit_once('(')
            && let Some(inner) = rest.strip_suffix(')')
            && let Some(level) = detect_level(inner)
        {
            return Self {
                value: choice.value.clone(),
                base_id: base.trim().to_string(),
                effort: Some(level),
            };
        }
        Self {
            value: choice.value.clone(),
            base_id: choice.value.clone(),
            effort: None,
        }
    }
}

#[must_use]
pub fn model_variants(choices: &[ConfigChoice]) -> Vec<ModelVariant> {
    choices.iter().map(ModelVariant::from_choice).collect()
}

/// Variants sharing `current`'s base that carry an effort.
fn siblings<'a>(variants: &'a [ModelVariant], current: &str) -> Vec<&'a ModelVariant> {
    let Some(base) = variants
        .iter()
        .find(|variant| variant.value == current)
        .map(|variant| variant.base_id.as_str())
    else {
        return Vec::new();
    };
    variants
        .iter()
        .filter(|variant| variant.base_id == base && variant.effort.is_some())
        .collect()
}

/// Whether the current model has at least two effort variants to move
/// between.
#[must_use]
pub fn has_effort_variants(variants: &[ModelVariant], current: &str) -> bool {
    siblings(variants, current).len() >= 2
}

/// The variant of `current`'s base model closest to `level`.
#[must_use]
pub fn retarget<'a>(
    variants: &'a [ModelVariant],
    current: &str,
    level: ThinkingBudgetLevel,
) -> Option<&'a ModelVariant> {
    nearest(
        siblings(variants, current)
            .into_iter()
            .filter_map(|variant| variant.effort.map(|effort| (effort, variant))),
        level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(value: &str, label: Option<&str>) -> ConfigChoice {
        ConfigChoice {
            value: value.to_string(),
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn detects_spellings() {
        assert_eq!(detect_level("Very High"), Some(ThinkingBudgetLevel::XHigh));
        assert_eq!(detect_level("x-high"), Some(ThinkingBudgetLevel::XHigh));
        assert_eq!(detect_level("maximum"), Some(ThinkingBudgetLevel::XHigh));
        assert_eq!(detect_level("High"), Some(ThinkingBudgetLevel::High));
        assert_eq!(detect_level("normal"), Some(ThinkingBudgetLevel::Medium));
        assert_eq!(detect_level("off"), Some(ThinkingBudgetLevel::Minimal));
        assert_eq!(detect_level("thinkingLow"), Some(ThinkingBudgetLevel::Low));
        assert_eq!(detect_level("0"), Some(ThinkingBudgetLevel::Minimal));
        assert_eq!(detect_level("4"), Some(ThinkingBudgetLevel::XHigh));
        assert_eq!(detect_level("7"), None);
        assert_eq!(detect_level("sonnet"), None);
    }

    #[test]
    fn budget_falls_back_lower_then_higher() {
        let map = EffortMap::from_choices(&[choice("low", None), choice("high", None)]);
        assert_eq!(
            map.choice_for(ThinkingBudgetLevel::Medium).map(|c| c.value.as_str()),
            Some("low")
        );
        assert_eq!(
            map.choice_for(ThinkingBudgetLevel::Minimal).map(|c| c.value.as_str()),
            Some("low")
        );
        assert_eq!(
            map.choice_for(ThinkingBudgetLevel::XHigh).map(|c| c.value.as_str()),
            Some("high")
        );
    }

    #[test]
    fn map_uses_labels_and_ignores_duplicates() {
        let map = EffortMap::from_choices(&[
            choice("a", Some("Quick (low)")),
            choice("b", Some("Deep")),
            choice("c", Some("Thorough - high")),
            choice("d", Some("also low")),
        ]);
        assert_eq!(
            map.levels().collect::<Vec<_>>(),
            vec![ThinkingBudgetLevel::Low, ThinkingBudgetLevel::High]
        );
        assert_eq!(map.level_of("c"), Some(ThinkingBudgetLevel::High));
        assert_eq!(map.level_of("d"), None);
        assert!(map.is_usable());
    }

    #[test]
    fn variants_split_ids_and_labels() {
        let slash = ModelVariant::from_choice(&choice("gpt-5/high", None));
        assert_eq!(slash.base_id, "gpt-5");
        assert_eq!(slash.effort, Some(ThinkingBudgetLevel::High));

        let label = ModelVariant::from_choice(&choice("opus-max", Some("Opus (max)")));
        assert_eq!(label.base_id, "Opus");
        assert_eq!(label.effort, Some(ThinkingBudgetLevel::XHigh));

        let plain = ModelVariant::from_choice(&choice("vendor/model-x", None));
        assert_eq!(plain.base_id, "vendor/model-x");
        assert_eq!(plain.effort, None);
    }

    #[test]
    fn retarget_stays_on_the_same_base() {
        let variants = model_variants(&[
            choice("gpt-5/low", None),
            choice("gpt-5/high", None),
            choice("mini/medium", None),
            choice("mini/high", None),
        ]);
        assert!(has_effort_variants(&variants, "gpt-5/low"));
        let target = retarget(&variants, "gpt-5/low", ThinkingBudgetLevel::Medium).unwrap();
        assert_eq!(target.value, "gpt-5/low");
        let target = retarget(&variants, "gpt-5/low", ThinkingBudgetLevel::XHigh).unwrap();
        assert_eq!(target.value, "gpt-5/high");
        assert!(retarget(&variants, "unknown", ThinkingBudgetLevel::High).is_none());
    }

    #[test]
    fn tokens_split_camel_and_punctuation() {
        assert_eq!(
            tokens("reasoningEffort_level-2"),
            vec!["reasoning", "effort", "level", "2"]
        );
    }
}
