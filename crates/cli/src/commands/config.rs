use std::env;
use std::fs;
use std::path::Path;

use dreampool_core::config::{resolve_config_path, AppConfig, ConfigOverrides};
use toml::Value;

struct Field<'a> {
    key_path: &'static str,
    value: String,
    env_keys: &'a [&'a str],
}

/// Renders the effective configuration with the source of every value.
pub fn run(config: &AppConfig, explicit_path: Option<&Path>, overrides: &ConfigOverrides) -> String {
    let config_file_path = resolve_config_path(explicit_path);
    let config_file_doc = config_file_path.as_deref().and_then(load_config_file_doc);
    let flagged = overridden_keys(overrides);

    let api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let fields = [
        Field {
            key_path: "dialogue.routing",
            value: config.dialogue.routing.as_str().to_string(),
            env_keys: &["DREAMPOOL_DIALOGUE_ROUTING"],
        },
        Field {
            key_path: "dialogue.max_tool_calls_per_turn",
            value: config.dialogue.max_tool_calls_per_turn.to_string(),
            env_keys: &["DREAMPOOL_DIALOGUE_MAX_TOOL_CALLS_PER_TURN"],
        },
        Field {
            key_path: "dialogue.currency_label",
            value: config.dialogue.currency_label.clone(),
            env_keys: &["DREAMPOOL_DIALOGUE_CURRENCY_LABEL"],
        },
        Field {
            key_path: "dialogue.allow_off_route_tools",
            value: config.dialogue.allow_off_route_tools.to_string(),
            env_keys: &["DREAMPOOL_DIALOGUE_ALLOW_OFF_ROUTE_TOOLS"],
        },
        Field {
            key_path: "dialogue.recipient_hint",
            value: config.dialogue.recipient_hint.clone().unwrap_or_else(|| "<unset>".to_string()),
            env_keys: &["DREAMPOOL_DIALOGUE_RECIPIENT_HINT"],
        },
        Field {
            key_path: "llm.provider",
            value: config.llm.provider.as_str().to_string(),
            env_keys: &["DREAMPOOL_LLM_PROVIDER"],
        },
        Field {
            key_path: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["DREAMPOOL_LLM_MODEL"],
        },
        Field {
            key_path: "llm.base_url",
            value: config.llm.effective_base_url(),
            env_keys: &["DREAMPOOL_LLM_BASE_URL"],
        },
        Field {
            key_path: "llm.api_key",
            value: api_key.to_string(),
            env_keys: &["DREAMPOOL_LLM_API_KEY", "OPENAI_API_KEY"],
        },
        Field {
            key_path: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["DREAMPOOL_LLM_TIMEOUT_SECS"],
        },
        Field {
            key_path: "llm.max_retries",
            value: config.llm.max_retries.to_string(),
            env_keys: &["DREAMPOOL_LLM_MAX_RETRIES"],
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["DREAMPOOL_LOGGING_LEVEL", "DREAMPOOL_LOG_LEVEL"],
        },
        Field {
            key_path: "logging.format",
            value: config.logging.format.as_str().to_string(),
            env_keys: &["DREAMPOOL_LOGGING_FORMAT", "DREAMPOOL_LOG_FORMAT"],
        },
    ];

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in &fields {
        let source = if flagged.contains(&field.key_path) {
            "flag".to_string()
        } else {
            field_source(
                field.key_path,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            )
        };
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn overridden_keys(overrides: &ConfigOverrides) -> Vec<&'static str> {
    [
        (overrides.routing.is_some(), "dialogue.routing"),
        (overrides.max_tool_calls_per_turn.is_some(), "dialogue.max_tool_calls_per_turn"),
        (overrides.llm_provider.is_some(), "llm.provider"),
        (overrides.llm_model.is_some(), "llm.model"),
        (overrides.log_level.is_some(), "logging.level"),
    ]
    .into_iter()
    .filter_map(|(set, key)| set.then_some(key))
    .collect()
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use dreampool_core::config::{ConfigOverrides, RoutingMode};

    use super::{contains_path, overridden_keys};

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc = "[dialogue]\nrouting = \"model\"\n".parse::<toml::Value>().expect("toml");
        assert!(contains_path(&doc, "dialogue.routing"));
        assert!(!contains_path(&doc, "dialogue.currency_label"));
        assert!(!contains_path(&doc, "llm.model"));
    }

    #[test]
    fn only_set_overrides_are_attributed_to_flags() {
        let overrides = ConfigOverrides {
            routing: Some(RoutingMode::Model),
            llm_model: Some("gpt-4o-mini".to_string()),
            ..ConfigOverrides::default()
        };
        assert_eq!(overridden_keys(&overrides), vec!["dialogue.routing", "llm.model"]);
    }
}
