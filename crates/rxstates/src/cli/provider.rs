//! Provider selection flags shared by `validate` and `check`.

use clap::{Args, ValueEnum};
use rxstates_core::{Config, ProviderKind};

/// Supported validation backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProviderChoice {
    /// OpenAI deep research (slow, thorough)
    #[value(name = "openai")]
    OpenAi,
    /// Google Gemini with search grounding (fast)
    #[value(alias = "gemini")]
    Google,
}

impl From<ProviderChoice> for ProviderKind {
    fn from(choice: ProviderChoice) -> Self {
        match choice {
            ProviderChoice::OpenAi => ProviderKind::OpenAi,
            ProviderChoice::Google => ProviderKind::Google,
        }
    }
}

/// Flags selecting and tuning the provider.
#[derive(Args, Debug, Clone, Default)]
pub struct ProviderArgs {
    /// Validation backend
    #[arg(long, value_enum, ignore_case = true, env = "AI_PROVIDER")]
    pub provider: Option<ProviderChoice>,

    /// Model name (provider-specific; defaults to OPENAI_MODEL / GOOGLE_MODEL or the config)
    #[arg(long)]
    pub model: Option<String>,

    /// Do not ask the provider to ground answers in web search
    #[arg(long)]
    pub no_search_grounding: bool,

    /// Do not let Gemini read pages by URL
    #[arg(long)]
    pub no_url_grounding: bool,
}

impl ProviderArgs {
    /// Apply provider flags and grounding environment toggles to `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(choice) = self.provider {
            config.provider.selected = choice.into();
        }

        let search = if self.no_search_grounding {
            Some(false)
        } else {
            env_flag("ENABLE_SEARCH_GROUNDING")
        };
        if let Some(enabled) = search {
            config.provider.openai.search_grounding = enabled;
            config.provider.google.search_grounding = enabled;
        }

        let url = if self.no_url_grounding {
            Some(false)
        } else {
            env_flag("ENABLE_URL_GROUNDING")
        };
        if let Some(enabled) = url {
            config.provider.google.url_grounding = enabled;
        }
    }

    /// Model to use instead of the configured one, if any.
    pub fn model_override(&self, kind: ProviderKind) -> Option<String> {
        let env_var = match kind {
            ProviderKind::OpenAi => "OPENAI_MODEL",
            ProviderKind::Google => "GOOGLE_MODEL",
        };
        self.model.clone().or_else(|| {
            std::env::var(env_var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
    }
}

/// Read a boolean environment toggle. Unset or unrecognised values are `None`.
fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    let parsed = parse_flag(&value);
    if parsed.is_none() {
        tracing::warn!("Ignoring {name}={value:?}: expected true or false");
    }
    parsed
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_flag_values() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn flags_override_config() {
        let args = ProviderArgs {
            provider: Some(ProviderChoice::Google),
            model: Some("gemini-2.5-flash".into()),
            no_search_grounding: true,
            no_url_grounding: true,
        };
        let mut config = Config::default();
        args.apply(&mut config);

        assert_eq!(config.provider.selected, ProviderKind::Google);
        assert!(!config.provider.google.search_grounding);
        assert!(!config.provider.google.url_grounding);
        assert!(!config.provider.openai.search_grounding);
        assert_eq!(
            args.model_override(ProviderKind::Google).as_deref(),
            Some("gemini-2.5-flash")
        );
    }

    #[test]
    fn no_flags_keep_provider() {
        let mut config = Config::default();
        ProviderArgs::default().apply(&mut config);
        assert_eq!(config.provider.selected, ProviderKind::OpenAi);
    }
}
