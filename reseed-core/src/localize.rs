use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use unic_langid::LanguageIdentifier;

/// Fluent-based localizer for user-facing messages, with built-in resources.
///
/// Uses the concurrent bundle so the CLI can format messages from signal
/// callbacks running on worker threads.
pub struct FluentLoc {
    bundle: FluentBundle<FluentResource>,
}

impl FluentLoc {
    /// Create a localizer using built-in `.ftl` strings (see ../i18n).
    pub fn builtin(lang: &str) -> Self {
        // Fallback to en-GB if parsing fails.
        let langid: LanguageIdentifier = lang.parse().unwrap_or_else(|_| "en-GB".parse().unwrap());

        let ftl_src = match lang {
            "en-GB" | "en" => include_str!("../i18n/en-GB.ftl"),
            _ => include_str!("../i18n/en-GB.ftl"),
        };

        let res =
            FluentResource::try_new(ftl_src.to_owned()).expect("invalid FTL resource (en-GB.ftl)");

        let mut bundle = FluentBundle::new_concurrent(vec![langid]);
        bundle.add_resource(res).expect("failed to add FTL resource");
        // Keep terminal output free of Unicode isolation marks.
        bundle.set_use_isolating(false);
        Self { bundle }
    }

    /// Format a message by code with named args (("name","value"), ...).
    /// Returns the code itself if not found.
    pub fn msg(&self, code: &str, args: &[(&str, &str)]) -> String {
        let Some(msg) = self.bundle.get_message(code) else {
            return code.to_string();
        };
        let Some(pattern) = msg.value() else {
            return code.to_string();
        };

        let mut fa = FluentArgs::new();
        for (k, v) in args {
            fa.set(*k, FluentValue::from(*v));
        }

        let mut errs = vec![];
        let s = self.bundle.format_pattern(pattern, Some(&fa), &mut errs).to_string();

        if errs.is_empty() {
            s
        } else {
            code.to_string()
        }
    }
}
