//! Normalization and scoring of agent-advertised configuration options.
//!
//! Agents describe their options in whatever shape they like. Every shape is
//! first normalized into [`ConfigOption`], then each option is scored against
//! the two concepts the controller cares about (model and reasoning effort).
//! Field names are never assumed; an option wins a concept only by
//! accumulating enough evidence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use weft_types::ThinkingBudgetLevel;

use crate::effort::{
    EffortMap, ModelVariant, has_effort_variants, model_variants, retarget, tokens,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigChoice {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ConfigChoice {
    #[must_use]
    pub fn display(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOption {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub choices: Vec<ConfigChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(scalar_string))
}

const CHOICE_LIST_KEYS: &[&str] = &["options", "choices", "values", "enum", "allowedValues"];

fn collect_choices(items: &[Value], out: &mut Vec<ConfigChoice>) {
    for item in items {
        match item {
            Value::Object(obj) => {
                // A nested list marks a group; its members are flattened.
                if let Some(nested) = CHOICE_LIST_KEYS
                    .iter()
                    .find_map(|key| obj.get(*key).and_then(Value::as_array))
                {
                    collect_choices(nested, out);
                    continue;
                }
                let Some(value) = first_string(obj, &["value", "id", "key"]) else {
                    continue;
                };
                let label = first_string(obj, &["name", "label", "title"]);
                if !out.iter().any(|choice| choice.value == value) {
                    out.push(ConfigChoice { value, label });
                }
            }
            other => {
                if let Some(value) = scalar_string(other)
                    && !out.iter().any(|choice| choice.value == value)
                {
                    out.push(ConfigChoice { value, label: None });
                }
            }
        }
    }
}

impl ConfigOption {
    /// Normalize one opaque option object. Returns `None` when no id can be
    /// found.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = first_string(obj, &["id", "key", "configId", "name"])?;

        let mut choices = Vec::new();
        if let Some(items) = CHOICE_LIST_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
        {
            collect_choices(items, &mut choices);
        }

        let current_value = ["currentValue", "current_value", "value", "selected", "default"]
            .iter()
            .find_map(|key| match obj.get(*key) {
                Some(Value::Object(inner)) => first_string(inner, &["value", "id"]),
                Some(other) => scalar_string(other),
                None => None,
            });

        Some(Self {
            id,
            name: first_string(obj, &["name", "label", "title"]),
            description: first_string(obj, &["description", "help"]),
            category: first_string(obj, &["category", "group"]),
            kind: first_string(obj, &["type", "kind"]),
            choices,
            current_value,
        })
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    #[must_use]
    pub fn has_choice(&self, value: &str) -> bool {
        self.choices.iter().any(|choice| choice.value == value)
    }

    /// An option with no declared choices accepts any value.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        self.choices.is_empty() || self.has_choice(value)
    }

    #[must_use]
    pub fn is_enumerable(&self) -> bool {
        !self.choices.is_empty()
            || self
                .kind
                .as_deref()
                .is_some_and(|kind| matches!(kind, "select" | "enum" | "choice" | "dropdown"))
    }
}

/// Normalize a list, dropping shapes without an id. A repeated id replaces
/// the earlier entry in place.
#[must_use]
pub fn normalize_options(values: &[Value]) -> Vec<ConfigOption> {
    let mut options = Vec::new();
    merge_options(&mut options, values);
    options
}

/// Apply option announcements on top of `options`: known ids are replaced,
/// new ids are appended.
pub fn merge_options(options: &mut Vec<ConfigOption>, values: &[Value]) {
    for value in values {
        let Some(option) = ConfigOption::from_value(value) else {
            tracing::debug!(%value, "config option without an id ignored");
            continue;
        };
        match options.iter_mut().find(|existing| existing.id == option.id) {
            Some(existing) => *existing = option,
            None => options.push(option),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Concept {
    Model,
    ReasoningEffort,
}

impl Concept {
    fn words(self) -> &'static [&'static str] {
        match self {
            Self::Model => &["model", "models", "llm"],
            Self::ReasoningEffort => &["effort", "reasoning", "thinking", "thought", "budget"],
        }
    }

    fn categories(self) -> &'static [&'static str] {
        match self {
            Self::Model => &["model"],
            Self::ReasoningEffort => &["thought_level", "reasoning", "effort", "thinking"],
        }
    }
}

/// Scoring weights and acceptance threshold for concept resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverWeights {
    pub id_match: i32,
    pub name_match: i32,
    pub description_match: i32,
    pub category_match: i32,
    pub enumerable: i32,
    pub effort_choices: i32,
    /// Minimum score an option needs to be accepted for a concept.
    pub threshold: i32,
}

impl Default for ResolverWeights {
    fn default() -> Self {
        Self {
            id_match: 4,
            name_match: 3,
            description_match: 1,
            category_match: 6,
            enumerable: 1,
            effort_choices: 3,
            threshold: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Score {
    points: i32,
    signals: u32,
}

fn mentions(text: Option<&str>, words: &[&str]) -> bool {
    text.is_some_and(|text| tokens(text).iter().any(|token| words.contains(&token.as_str())))
}

fn score(option: &ConfigOption, concept: Concept, weights: &ResolverWeights) -> Score {
    let mut points = 0;
    let mut signals = 0;
    let mut add = |hit: bool, weight: i32| {
        if hit {
            points += weight;
            signals += 1;
        }
    };

    let words = concept.words();
    add(mentions(Some(option.id.as_str()), words), weights.id_match);
    add(mentions(option.name.as_deref(), words), weights.name_match);
    add(mentions(option.description.as_deref(), words), weights.description_match);
    add(
        option.category.as_deref().is_some_and(|category| {
            concept
                .categories()
                .contains(&category.to_ascii_lowercase().as_str())
        }),
        weights.category_match,
    );
    add(option.is_enumerable(), weights.enumerable);
    if concept == Concept::ReasoningEffort {
        add(
            EffortMap::from_choices(&option.choices).is_usable(),
            weights.effort_choices,
        );
    }
    Score { points, signals }
}

/// Index of the best option for `concept`, skipping `exclude`.
fn best_for(
    options: &[ConfigOption],
    concept: Concept,
    weights: &ResolverWeights,
    exclude: Option<usize>,
) -> Option<usize> {
    let mut best: Option<(usize, Score)> = None;
    for (idx, option) in options.iter().enumerate() {
        if Some(idx) == exclude {
            continue;
        }
        let candidate = score(option, concept, weights);
        if candidate.points < weights.threshold {
            continue;
        }
        // Strictly better only, so declaration order breaks full ties.
        let better = best.is_none_or(|(_, current)| {
            (candidate.points, candidate.signals) > (current.points, current.signals)
        });
        if better {
            best = Some((idx, candidate));
        }
    }
    best.map(|(idx, _)| idx)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelControl {
    pub option_id: String,
    pub current: Option<String>,
    pub choices: Vec<ConfigChoice>,
    pub variants: Vec<ModelVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffortControl {
    /// A dedicated option whose choices map onto levels.
    Option {
        option_id: String,
        map: EffortMap,
        current: Option<ThinkingBudgetLevel>,
    },
    /// Effort is encoded in the model choice itself (`base/high`).
    ModelVariants {
        option_id: String,
        current: Option<ThinkingBudgetLevel>,
    },
}

impl EffortControl {
    #[must_use]
    pub fn current(&self) -> Option<ThinkingBudgetLevel> {
        match self {
            Self::Option { current, .. } | Self::ModelVariants { current, .. } => *current,
        }
    }
}

/// The model and effort controls found among a session's options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedControls {
    pub model: Option<ModelControl>,
    pub effort: Option<EffortControl>,
}

impl ResolvedControls {
    /// The `(option_id, value)` to send for `level`, or `None` when no effort
    /// control exists.
    #[must_use]
    pub fn effort_request(&self, level: ThinkingBudgetLevel) -> Option<(String, String)> {
        match self.effort.as_ref()? {
            EffortControl::Option { option_id, map, .. } => map
                .choice_for(level)
                .map(|choice| (option_id.clone(), choice.value.clone())),
            EffortControl::ModelVariants { option_id, .. } => {
                let model = self.model.as_ref()?;
                let current = model.current.as_deref()?;
                retarget(&model.variants, current, level)
                    .map(|variant| (option_id.clone(), variant.value.clone()))
            }
        }
    }
}

#[must_use]
pub fn resolve_controls(options: &[ConfigOption], weights: &ResolverWeights) -> ResolvedControls {
    let model_idx = best_for(options, Concept::Model, weights, None);
    let model = model_idx.map(|idx| {
        let option = &options[idx];
        ModelControl {
            option_id: option.id.clone(),
            current: option.current_value.clone(),
            choices: option.choices.clone(),
            variants: model_variants(&option.choices),
        }
    });

    let dedicated = best_for(options, Concept::ReasoningEffort, weights, model_idx)
        .map(|idx| &options[idx])
        .map(|option| (option, EffortMap::from_choices(&option.choices)))
        .filter(|(_, map)| map.is_usable());

    let effort = if let Some((option, map)) = dedicated {
        let current = option
            .current_value
            .as_deref()
            .and_then(|value| map.level_of(value));
        Some(EffortControl::Option {
            option_id: option.id.clone(),
            map,
            current,
        })
    } else {
        model.as_ref().and_then(|model| {
            let current = model.current.as_deref()?;
            has_effort_variants(&model.variants, current).then(|| EffortControl::ModelVariants {
                option_id: model.option_id.clone(),
                current: model
                    .variants
                    .iter()
                    .find(|variant| variant.value == current)
                    .and_then(|variant| variant.effort),
            })
        })
    };

    ResolvedControls { model, effort }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_heterogeneous_shapes() {
        let option = ConfigOption::from_value(&json!({
            "configId": "reasoning_effort",
            "label": "Reasoning",
            "allowedValues": ["low", "medium", {"id": "high", "title": "High"}],
            "current_value": "medium"
        }))
        .unwrap();
        assert_eq!(option.id, "reasoning_effort");
        assert_eq!(option.name.as_deref(), Some("Reasoning"));
        assert_eq!(option.choices.len(), 3);
        assert_eq!(option.choices[2].label.as_deref(), Some("High"));
        assert_eq!(option.current_value.as_deref(), Some("medium"));
    }

    #[test]
    fn grouped_choices_are_flattened() {
        let option = ConfigOption::from_value(&json!({
            "id": "model",
            "options": [
                {"name": "Anthropic", "options": [{"value": "sonnet"}, {"value": "opus"}]},
                {"group": "OpenAI", "choices": ["gpt-5"]},
                {"value": "sonnet"}
            ]
        }))
        .unwrap();
        let values: Vec<_> = option.choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, vec!["sonnet", "opus", "gpt-5"]);
    }

    #[test]
    fn options_without_id_are_dropped_and_repeats_replace() {
        let options = normalize_options(&[
            json!({"label": "nameless"}),
            json!({"id": "mode", "currentValue": "ask"}),
            json!("bare"),
            json!({"id": "mode", "currentValue": "code"}),
        ]);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].current_value.as_deref(), Some("code"));
    }

    #[test]
    fn resolves_model_and_dedicated_effort() {
        let options = normalize_options(&[
            json!({"id": "mode", "name": "Mode", "options": ["ask", "code"]}),
            json!({"id": "model", "name": "Model", "category": "model",
                   "options": ["sonnet", "opus"], "currentValue": "sonnet"}),
            json!({"id": "thought_level", "category": "thought_level",
                   "options": ["low", "medium", "high"], "currentValue": "high"}),
        ]);
        let controls = resolve_controls(&options, &ResolverWeights::default());
        assert_eq!(controls.model.as_ref().unwrap().option_id, "model");
        let effort = controls.effort.as_ref().unwrap();
        assert_eq!(effort.current(), Some(ThinkingBudgetLevel::High));
        assert_eq!(
            controls.effort_request(ThinkingBudgetLevel::XHigh),
            Some(("thought_level".into(), "high".into()))
        );
    }

    #[test]
    fn effort_from_model_variants() {
        let options = normalize_options(&[json!({
            "id": "model",
            "options": ["gpt-5/low", "gpt-5/medium", "gpt-5/high"],
            "currentValue": "gpt-5/medium"
        })]);
        let controls = resolve_controls(&options, &ResolverWeights::default());
        assert!(matches!(
            controls.effort,
            Some(EffortControl::ModelVariants {
                current: Some(ThinkingBudgetLevel::Medium),
                ..
            })
        ));
        assert_eq!(
            controls.effort_request(ThinkingBudgetLevel::High),
            Some(("model".into(), "gpt-5/high".into()))
        );
    }

    #[test]
    fn weak_evidence_is_rejected() {
        let options = normalize_options(&[json!({"id": "theme", "options": ["dark", "light"]})]);
        let controls = resolve_controls(&options, &ResolverWeights::default());
        assert_eq!(controls, ResolvedControls::default());
        assert_eq!(controls.effort_request(ThinkingBudgetLevel::High), None);
    }

    #[test]
    fn ties_prefer_more_signals_then_declaration_order() {
        let weights = ResolverWeights {
            id_match: 5,
            name_match: 4,
            enumerable: 1,
            ..ResolverWeights::default()
        };
        // Both reach 5 points; the second has two signals.
        let options = normalize_options(&[
            json!({"id": "model_a"}),
            json!({"id": "b", "name": "model b", "options": ["x"]}),
        ]);
        let controls = resolve_controls(&options, &weights);
        assert_eq!(controls.model.unwrap().option_id, "b");

        let options = normalize_options(&[json!({"id": "model_a"}), json!({"id": "model_b"})]);
        let controls = resolve_controls(&options, &weights);
        assert_eq!(controls.model.unwrap().option_id, "model_a");
    }
}
